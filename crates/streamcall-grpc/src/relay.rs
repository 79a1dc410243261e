// ABOUTME: Bidirectional relay: the chat responder loop and the caller-side two-task driver.
// ABOUTME: Each direction of a call runs in its own task; order is kept within a direction only.

use std::sync::Arc;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use tracing::{debug, info, warn};

use crate::envelope::{chat_reply, ChatTurn};
use crate::error::StreamError;
use crate::handle::StreamHandle;
use crate::handler::{BidirectionalHandler, CallContext};
use crate::task::CallTask;

/// Name the responder signs its replies with.
pub const DEFAULT_RESPONDER_NAME: &str = "Witty";

/// Answers every chat turn with one reply, in arrival order.
#[derive(Debug, Clone)]
pub struct ChatResponder {
    display_name: String,
}

impl Default for ChatResponder {
    fn default() -> Self {
        Self::new(DEFAULT_RESPONDER_NAME)
    }
}

impl ChatResponder {
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
        }
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Reply to each turn until the peer half-closes. Returns the number of replies.
    pub async fn respond(
        &self,
        ctx: &CallContext,
        call: &StreamHandle<ChatTurn, ChatTurn>,
    ) -> Result<usize, StreamError> {
        let mut replies = 0;
        loop {
            let turn = match call.receive().await {
                Ok(Some(turn)) => turn,
                Ok(None) => break,
                Err(err) => {
                    warn!(call_id = %ctx.call_id, error = %err, "Chat receive failed");
                    return Err(call.close_with_error(err).await);
                }
            };
            debug!(call_id = %ctx.call_id, user = %turn.user, text = %turn.text, "Received message");

            if let Err(err) = call.send(chat_reply(&self.display_name, &turn)).await {
                warn!(call_id = %ctx.call_id, error = %err, "Chat reply failed");
                return Err(call.close_with_error(err).await);
            }
            replies += 1;
        }

        call.close_send().await;
        info!(call_id = %ctx.call_id, replies, "Chat finished");
        Ok(replies)
    }
}

#[async_trait]
impl BidirectionalHandler<ChatTurn, ChatTurn> for ChatResponder {
    async fn handle(
        &self,
        ctx: &CallContext,
        call: &StreamHandle<ChatTurn, ChatTurn>,
    ) -> Result<usize, StreamError> {
        self.respond(ctx, call).await
    }
}

/// Message counts of a finished caller-side relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayReport {
    pub sent: usize,
    pub received: usize,
}

/// Drive both directions of a bidirectional call from the calling side.
///
/// `outgoing` is sent from a separate task, followed by `close_send`. The
/// current task drains inbound messages into `on_message` until EndOfStream.
/// The sending task is owned by this call: it is joined on success and
/// aborted if draining fails.
pub async fn initiate<Out, In, S, F>(
    call: Arc<StreamHandle<Out, In>>,
    outgoing: S,
    mut on_message: F,
) -> Result<RelayReport, StreamError>
where
    Out: Send + 'static,
    In: Send + 'static,
    S: Stream<Item = Out> + Send + 'static,
    F: FnMut(In) + Send,
{
    let producer = {
        let call = call.clone();
        CallTask::spawn(async move {
            let mut outgoing = Box::pin(outgoing);
            let mut sent = 0;
            while let Some(msg) = outgoing.next().await {
                call.send(msg).await?;
                sent += 1;
            }
            call.close_send().await;
            Ok::<usize, StreamError>(sent)
        })
    };

    let mut received = 0;
    while let Some(msg) = call.receive().await? {
        on_message(msg);
        received += 1;
    }

    let sent = producer.join().await??;
    Ok(RelayReport { sent, received })
}
