// ABOUTME: Constructors and validation for the message envelopes exchanged on streamcall calls.
// ABOUTME: Also owns the human-readable texts of upload confirmations and chat replies.

pub use streamcall_proto::{ChatTurn, FileChunk, StockRequest, StockTick, UploadSummary};

use crate::error::StreamError;

pub fn chat_turn(user: impl Into<String>, text: impl Into<String>) -> ChatTurn {
    ChatTurn {
        user: user.into(),
        text: text.into(),
    }
}

pub fn file_chunk(
    file_name: impl Into<String>,
    sequence_number: u32,
    payload: impl Into<Vec<u8>>,
) -> FileChunk {
    FileChunk {
        file_name: file_name.into(),
        sequence_number,
        payload: payload.into(),
    }
}

pub fn stock_request(symbol: impl Into<String>) -> StockRequest {
    StockRequest {
        symbol: symbol.into(),
    }
}

/// Reject a request whose symbol is empty or blank.
pub fn validate_stock_request(request: &StockRequest) -> Result<(), StreamError> {
    if request.symbol.trim().is_empty() {
        return Err(StreamError::InvalidArgument(
            "stock symbol must not be empty".to_string(),
        ));
    }
    Ok(())
}

/// Confirmation text carried by an [`UploadSummary`].
pub fn upload_message(file_name: &str, total_chunks: u32) -> String {
    if file_name.is_empty() {
        format!("Upload completed with {total_chunks} chunks")
    } else {
        format!("File {file_name} uploaded successfully with {total_chunks} chunks")
    }
}

/// The responder's answer to one chat turn, naming the sender and echoing the text.
pub fn chat_reply(responder: &str, turn: &ChatTurn) -> ChatTurn {
    chat_turn(
        responder,
        format!("Hello {}, you said: {}", turn.user, turn.text),
    )
}
