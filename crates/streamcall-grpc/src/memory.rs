// ABOUTME: In-process transport connecting two stream handles back to back.
// ABOUTME: Used to run the pattern drivers without a network, and by the tests.

use crate::handle::{CallPattern, StreamHandle};
use crate::lane::{response_channel, StreamReceiver};

/// Create two connected handles for one call.
///
/// What the first handle sends, the second receives, and the other way round.
/// Errors passed to `close_with_error` reach the peer as its terminal error.
/// A handle dropped without closing reads as `Cancelled` on the other side,
/// both for its sends and its receives.
pub fn duplex<A, B>(
    pattern: CallPattern,
    buffer_size: usize,
) -> (StreamHandle<A, B>, StreamHandle<B, A>)
where
    A: Send + 'static,
    B: Send + 'static,
{
    let (a_tx, a_rx) = response_channel::<A>(buffer_size);
    let (b_tx, b_rx) = response_channel::<B>(buffer_size);

    let first = StreamHandle::new(pattern, a_tx, StreamReceiver::new(b_rx));
    let second = StreamHandle::new(pattern, b_tx, StreamReceiver::new(a_rx));
    (first, second)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StreamError;

    #[tokio::test]
    async fn test_duplex_carries_both_directions() {
        let (a, b) = duplex::<String, u32>(CallPattern::Bidirectional, 4);

        a.send("ping".to_string()).await.unwrap();
        b.send(1).await.unwrap();

        assert_eq!(b.receive().await.unwrap().as_deref(), Some("ping"));
        assert_eq!(a.receive().await.unwrap(), Some(1));
        assert_eq!(a.pattern(), CallPattern::Bidirectional);
    }

    #[tokio::test]
    async fn test_dropped_peer_looks_like_cancellation() {
        let (a, b) = duplex::<u32, u32>(CallPattern::ServerStreaming, 4);
        drop(b);

        assert!(a.peer_gone().await);
        assert_eq!(a.send(1).await.unwrap_err(), StreamError::Cancelled);
        assert!(a.is_closed());
    }

    #[tokio::test]
    async fn test_dropped_peer_cancels_receive() {
        let (a, b) = duplex::<u32, u32>(CallPattern::Bidirectional, 4);
        b.send(5).await.unwrap();
        drop(b);

        // Messages sent before the drop still arrive, then the call fails.
        assert_eq!(a.receive().await.unwrap(), Some(5));
        assert_eq!(a.receive().await.unwrap_err(), StreamError::Cancelled);
        assert!(a.is_closed());
    }
}
