// ABOUTME: Client-streaming aggregator that folds uploaded file chunks into one UploadSummary.
// ABOUTME: Sends the summary exactly once, after the uploader half-closes, and never on error.

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::envelope::{upload_message, FileChunk, UploadSummary};
use crate::error::StreamError;
use crate::handle::StreamHandle;
use crate::handler::{CallContext, ClientStreamingHandler};

/// Running totals for one upload.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct UploadTally {
    /// First non-empty file name seen.
    pub file_name: Option<String>,
    pub chunks: u32,
    pub bytes: u64,
    /// Chunks whose name differed from `file_name`.
    pub mismatched_names: u32,
    /// Chunks whose sequence number did not follow the previous one.
    pub out_of_sequence: u32,
    last_sequence: Option<u32>,
}

impl UploadTally {
    /// Count one chunk.
    ///
    /// The first non-empty name wins; chunks carrying another name are still
    /// counted. Sequence numbers are not required to be gap-free.
    pub fn record(&mut self, chunk: &FileChunk) {
        self.chunks = self.chunks.saturating_add(1);
        self.bytes = self.bytes.saturating_add(chunk.payload.len() as u64);

        if !chunk.file_name.is_empty() {
            match &self.file_name {
                None => self.file_name = Some(chunk.file_name.clone()),
                Some(name) if *name != chunk.file_name => {
                    self.mismatched_names += 1;
                    warn!(
                        expected = %name,
                        got = %chunk.file_name,
                        sequence = chunk.sequence_number,
                        "chunk names a different file, keeping the first name"
                    );
                }
                Some(_) => {}
            }
        }

        if let Some(last) = self.last_sequence {
            if last.checked_add(1) != Some(chunk.sequence_number) {
                self.out_of_sequence += 1;
                debug!(
                    previous = last,
                    sequence = chunk.sequence_number,
                    "chunk sequence gap"
                );
            }
        }
        self.last_sequence = Some(chunk.sequence_number);
    }

    pub fn summary(&self) -> UploadSummary {
        let file_name = self.file_name.clone().unwrap_or_default();
        UploadSummary {
            message: upload_message(&file_name, self.chunks),
            file_name,
            total_chunks: self.chunks,
        }
    }
}

/// Drives the inbound side of an UploadFile call to completion.
#[derive(Debug, Default, Clone)]
pub struct UploadAggregator;

impl UploadAggregator {
    pub fn new() -> Self {
        Self
    }

    /// Receive chunks until EndOfStream, then send one summary and close.
    pub async fn aggregate(
        &self,
        ctx: &CallContext,
        call: &StreamHandle<UploadSummary, FileChunk>,
    ) -> Result<UploadSummary, StreamError> {
        let mut tally = UploadTally::default();

        loop {
            match call.receive().await {
                Ok(Some(chunk)) => {
                    debug!(
                        call_id = %ctx.call_id,
                        file = %chunk.file_name,
                        sequence = chunk.sequence_number,
                        len = chunk.payload.len(),
                        "Received chunk"
                    );
                    tally.record(&chunk);
                }
                Ok(None) => break,
                Err(err) => {
                    warn!(
                        call_id = %ctx.call_id,
                        chunks = tally.chunks,
                        error = %err,
                        "Upload aborted, discarding partial tally"
                    );
                    return Err(call.close_with_error(err).await);
                }
            }
        }

        let summary = tally.summary();
        if let Err(err) = call.send(summary.clone()).await {
            return Err(call.close_with_error(err).await);
        }
        call.close_send().await;

        info!(
            call_id = %ctx.call_id,
            file = %summary.file_name,
            chunks = summary.total_chunks,
            bytes = tally.bytes,
            "Upload complete"
        );
        Ok(summary)
    }
}

#[async_trait]
impl ClientStreamingHandler<FileChunk, UploadSummary> for UploadAggregator {
    async fn handle(
        &self,
        ctx: &CallContext,
        call: &StreamHandle<UploadSummary, FileChunk>,
    ) -> Result<UploadSummary, StreamError> {
        self.aggregate(ctx, call).await
    }
}
