// ABOUTME: Capability traits for the three streaming call patterns.
// ABOUTME: Each pattern driver implements one trait so the server can dispatch to it by pattern.

use async_trait::async_trait;

use crate::error::StreamError;
use crate::handle::{CallPattern, StreamHandle};

/// Context provided to call handlers.
///
/// Identifies the accepted call for logging.
#[derive(Debug, Clone)]
pub struct CallContext {
    /// Unique ID assigned when the call was accepted.
    pub call_id: String,
    /// Name of the RPC method, e.g. "UploadFile".
    pub method: &'static str,
    pub pattern: CallPattern,
    /// Remote address, when the transport knows it.
    pub peer: Option<String>,
}

impl CallContext {
    pub fn new(call_id: impl Into<String>, method: &'static str, pattern: CallPattern) -> Self {
        Self {
            call_id: call_id.into(),
            method,
            pattern,
            peer: None,
        }
    }

    pub fn with_peer(mut self, peer: Option<String>) -> Self {
        self.peer = peer;
        self
    }
}

/// Handles a client-streaming call: many messages in, exactly one response out.
///
/// Implementations drain the inbound direction, send the single response on
/// the handle, and return it. On error nothing is sent and the call is closed
/// with the error.
#[async_trait]
pub trait ClientStreamingHandler<In, Out>: Send + Sync
where
    In: Send + 'static,
    Out: Send + 'static,
{
    async fn handle(
        &self,
        ctx: &CallContext,
        call: &StreamHandle<Out, In>,
    ) -> Result<Out, StreamError>;
}

/// Handles a server-streaming call: one request, a sequence of responses.
///
/// The request arrives with the call, so the handle's inbound direction is
/// already half-closed.
#[async_trait]
pub trait ServerStreamingHandler<Req, Out>: Send + Sync
where
    Req: Send + Sync + 'static,
    Out: Send + 'static,
{
    /// Check the request before any response is streamed.
    fn validate(&self, _request: &Req) -> Result<(), StreamError> {
        Ok(())
    }

    /// Stream responses until done. Returns how many were sent.
    async fn handle(
        &self,
        ctx: &CallContext,
        request: Req,
        call: &StreamHandle<Out, Req>,
    ) -> Result<usize, StreamError>;
}

/// Handles a bidirectional call from the responding side.
#[async_trait]
pub trait BidirectionalHandler<In, Out>: Send + Sync
where
    In: Send + 'static,
    Out: Send + 'static,
{
    /// Serve the call until the peer half-closes. Returns how many messages were sent.
    async fn handle(
        &self,
        ctx: &CallContext,
        call: &StreamHandle<Out, In>,
    ) -> Result<usize, StreamError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_context() {
        let ctx = CallContext::new("call-1", "Chat", CallPattern::Bidirectional)
            .with_peer(Some("127.0.0.1:5000".to_string()));
        assert_eq!(ctx.call_id, "call-1");
        assert_eq!(ctx.method, "Chat");
        assert_eq!(ctx.pattern, CallPattern::Bidirectional);
        assert_eq!(ctx.peer.as_deref(), Some("127.0.0.1:5000"));
    }

    #[test]
    fn test_call_context_debug() {
        let ctx = CallContext::new("abc123", "UploadFile", CallPattern::ClientStreaming);
        let debug_str = format!("{:?}", ctx);
        assert!(debug_str.contains("abc123"));
        assert!(debug_str.contains("UploadFile"));
        assert!(debug_str.contains("ClientStreaming"));
    }

    /// A handler that only exercises the default validation.
    struct AcceptAll;

    #[async_trait]
    impl ServerStreamingHandler<String, String> for AcceptAll {
        async fn handle(
            &self,
            _ctx: &CallContext,
            _request: String,
            call: &StreamHandle<String, String>,
        ) -> Result<usize, StreamError> {
            call.close_send().await;
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_default_validate_accepts() {
        let handler = AcceptAll;
        assert!(handler.validate(&String::new()).is_ok());

        let (server, client) =
            crate::memory::duplex::<String, String>(CallPattern::ServerStreaming, 1);
        let ctx = CallContext::new("c", "Test", CallPattern::ServerStreaming);
        assert_eq!(handler.handle(&ctx, "req".to_string(), &server).await, Ok(0));
        assert_eq!(client.receive().await.unwrap(), None);
    }
}
