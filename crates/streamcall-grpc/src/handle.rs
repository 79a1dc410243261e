// ABOUTME: StreamHandle: one logical streaming call with send/receive lanes and termination state.
// ABOUTME: Tracks half-close state, records the first terminal error, and races cancellation and deadlines.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Mutex as AsyncMutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::StreamError;
use crate::lane::{InboundLane, OutboundLane};

/// The interaction pattern of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallPattern {
    ClientStreaming,
    ServerStreaming,
    Bidirectional,
}

impl std::fmt::Display for CallPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CallPattern::ClientStreaming => "client-streaming",
            CallPattern::ServerStreaming => "server-streaming",
            CallPattern::Bidirectional => "bidirectional",
        };
        f.write_str(name)
    }
}

/// Which directions of a call are still open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectionState {
    Open,
    /// We called `close_send`; the peer may still be sending.
    HalfClosedLocal,
    /// The peer half-closed; we may still be sending.
    HalfClosedRemote,
    Closed,
}

impl DirectionState {
    fn close_local(self) -> Self {
        match self {
            DirectionState::Open => DirectionState::HalfClosedLocal,
            DirectionState::HalfClosedRemote => DirectionState::Closed,
            other => other,
        }
    }

    fn close_remote(self) -> Self {
        match self {
            DirectionState::Open => DirectionState::HalfClosedRemote,
            DirectionState::HalfClosedLocal => DirectionState::Closed,
            other => other,
        }
    }

    fn local_open(self) -> bool {
        matches!(self, DirectionState::Open | DirectionState::HalfClosedRemote)
    }

    fn remote_open(self) -> bool {
        matches!(self, DirectionState::Open | DirectionState::HalfClosedLocal)
    }
}

/// Inbound lane plus messages read early while settling a failed send.
struct InboundSlot<In> {
    lane: Box<dyn InboundLane<In>>,
    stash: VecDeque<In>,
    ended: bool,
}

#[derive(Debug)]
struct HandleState {
    direction: DirectionState,
    error: Option<StreamError>,
}

/// One open streaming call.
///
/// `Out` is the type this side sends, `In` the type it receives. All
/// operations take `&self`: share the handle through an `Arc` to drive the two
/// directions from separate tasks. Concurrent sends are serialized against
/// each other; a send and a receive never wait on each other.
///
/// Any failure closes the handle for good. The first error observed is kept and
/// every later operation reports it.
pub struct StreamHandle<Out, In> {
    pattern: CallPattern,
    outbound: AsyncMutex<Box<dyn OutboundLane<Out>>>,
    inbound: AsyncMutex<InboundSlot<In>>,
    state: Mutex<HandleState>,
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl<Out, In> StreamHandle<Out, In>
where
    Out: Send + 'static,
    In: Send + 'static,
{
    pub fn new(
        pattern: CallPattern,
        outbound: impl OutboundLane<Out> + 'static,
        inbound: impl InboundLane<In> + 'static,
    ) -> Self {
        Self {
            pattern,
            outbound: AsyncMutex::new(Box::new(outbound)),
            inbound: AsyncMutex::new(InboundSlot {
                lane: Box::new(inbound),
                stash: VecDeque::new(),
                ended: false,
            }),
            state: Mutex::new(HandleState {
                direction: DirectionState::Open,
                error: None,
            }),
            cancel: CancellationToken::new(),
            deadline: None,
        }
    }

    /// Tie the call to an outer cancellation scope: cancelling `parent` cancels this call.
    pub fn with_parent(mut self, parent: &CancellationToken) -> Self {
        self.cancel = parent.child_token();
        self
    }

    /// Fail every pending and later operation with `Timeout` once `deadline` passes.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Deadline relative to now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn pattern(&self) -> CallPattern {
        self.pattern
    }

    pub fn direction(&self) -> DirectionState {
        self.lock_state().direction
    }

    /// The terminal error, if the call failed.
    pub fn error(&self) -> Option<StreamError> {
        self.lock_state().error.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.direction() == DirectionState::Closed
    }

    /// Token that cancels this call when triggered.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel the call. Pending operations return `Cancelled` promptly.
    pub fn cancel(&self) {
        self.fail(StreamError::Cancelled);
    }

    /// Send one message.
    ///
    /// Fails with the recorded terminal error once the call has failed, and
    /// with `InvalidArgument` after `close_send`. If the peer stopped reading,
    /// the error is the outcome the peer ended the call with.
    pub async fn send(&self, msg: Out) -> Result<(), StreamError> {
        let mut outbound = self.outbound.lock().await;
        {
            let state = self.lock_state();
            if let Some(err) = &state.error {
                return Err(err.clone());
            }
            if !state.direction.local_open() {
                return Err(StreamError::InvalidArgument(
                    "send after close_send".to_string(),
                ));
            }
        }
        match self.race(outbound.send(msg)).await? {
            Ok(()) => Ok(()),
            Err(StreamError::Cancelled) if outbound.is_closed() => {
                drop(outbound);
                Err(self.settle_peer_gone().await)
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    /// Receive the next message. `Ok(None)` is EndOfStream: the peer half-closed.
    ///
    /// Once EndOfStream was seen, later calls keep returning it.
    pub async fn receive(&self) -> Result<Option<In>, StreamError> {
        let mut inbound = self.inbound.lock().await;
        if let Some(msg) = inbound.stash.pop_front() {
            return Ok(Some(msg));
        }
        {
            let state = self.lock_state();
            if let Some(err) = &state.error {
                return Err(err.clone());
            }
            if !state.direction.remote_open() {
                return Ok(None);
            }
        }
        let received = if inbound.ended {
            None
        } else {
            self.guarded(inbound.lane.recv()).await?
        };
        if received.is_none() {
            inbound.ended = true;
            let mut state = self.lock_state();
            state.direction = state.direction.close_remote();
        }
        Ok(received)
    }

    /// Signal that no more messages will be sent. Idempotent.
    pub async fn close_send(&self) {
        let mut outbound = self.outbound.lock().await;
        {
            let mut state = self.lock_state();
            if state.error.is_some() || !state.direction.local_open() {
                return;
            }
            state.direction = state.direction.close_local();
        }
        outbound.close(None).await;
    }

    /// Terminate the call immediately, delivering `err` to the peer.
    ///
    /// If the call already failed, the earlier error is kept and delivered
    /// instead. Returns the error that was delivered.
    pub async fn close_with_error(&self, err: StreamError) -> StreamError {
        let terminal = self.fail(err);
        let mut outbound = self.outbound.lock().await;
        outbound.close(Some(terminal.clone())).await;
        terminal
    }

    /// Sleep for `duration`, returning early with the terminal error if the
    /// call is cancelled or its deadline passes first.
    pub async fn idle(&self, duration: Duration) -> Result<(), StreamError> {
        if let Some(err) = self.error() {
            return Err(err);
        }
        self.guarded(async {
            tokio::time::sleep(duration).await;
            Ok(())
        })
        .await
    }

    /// True once the peer can no longer receive what we send.
    pub async fn peer_gone(&self) -> bool {
        self.outbound.lock().await.is_closed()
    }

    /// Our sends are no longer read. The peer's own outcome, a terminal
    /// status or a clean end, is still queued on the inbound lane, so read up
    /// to it. Messages passed on the way are kept for `receive`.
    async fn settle_peer_gone(&self) -> StreamError {
        {
            let mut state = self.lock_state();
            state.direction = state.direction.close_local();
        }

        // A concurrent receive may already hold the lane and record the outcome.
        let mut inbound = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return self.fail(StreamError::Cancelled),
            inbound = self.inbound.lock() => inbound,
        };

        loop {
            if let Some(err) = self.error() {
                return err;
            }
            if inbound.ended {
                // The peer finished without reading everything; its last
                // messages stay receivable.
                return StreamError::Cancelled;
            }
            match self.race(inbound.lane.recv()).await {
                Err(err) => return err,
                Ok(Ok(Some(msg))) => inbound.stash.push_back(msg),
                Ok(Ok(None)) => inbound.ended = true,
                Ok(Err(err)) => return self.fail(err),
            }
        }
    }

    async fn guarded<T>(
        &self,
        op: impl Future<Output = Result<T, StreamError>>,
    ) -> Result<T, StreamError> {
        self.race(op).await?.map_err(|err| self.fail(err))
    }

    /// Run `op` against cancellation and the deadline. The outer error means
    /// the call was cut short and is already recorded; the inner result is
    /// the operation's own.
    async fn race<T>(
        &self,
        op: impl Future<Output = Result<T, StreamError>>,
    ) -> Result<Result<T, StreamError>, StreamError> {
        let deadline = async {
            match self.deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(self.fail(StreamError::Cancelled)),
            _ = deadline => Err(self.fail(StreamError::Timeout)),
            result = op => Ok(result),
        }
    }

    /// Record `err` unless an error is already recorded, force `Closed`, and
    /// wake every pending operation. Returns the error that won.
    fn fail(&self, err: StreamError) -> StreamError {
        let terminal = {
            let mut state = self.lock_state();
            let terminal = state.error.get_or_insert(err).clone();
            state.direction = DirectionState::Closed;
            terminal
        };
        self.cancel.cancel();
        terminal
    }

    fn lock_state(&self) -> MutexGuard<'_, HandleState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<Out, In> std::fmt::Debug for StreamHandle<Out, In> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("StreamHandle")
            .field("pattern", &self.pattern)
            .field("direction", &state.direction)
            .field("error", &state.error)
            .field("deadline", &self.deadline)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lane::{request_channel, response_channel, NoInbound, StreamReceiver};
    use crate::memory::duplex;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_send_and_receive_in_order() {
        let (a, b) = duplex::<u32, u32>(CallPattern::Bidirectional, 8);

        for i in 0..5 {
            a.send(i).await.unwrap();
        }
        a.close_send().await;

        let mut seen = Vec::new();
        while let Some(v) = b.receive().await.unwrap() {
            seen.push(v);
        }
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
        assert_eq!(b.direction(), DirectionState::HalfClosedRemote);
        assert_eq!(a.direction(), DirectionState::HalfClosedLocal);
    }

    #[tokio::test]
    async fn test_end_of_stream_repeats() {
        let (a, b) = duplex::<u32, u32>(CallPattern::ClientStreaming, 4);
        a.close_send().await;

        assert_eq!(b.receive().await.unwrap(), None);
        assert_eq!(b.receive().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_close_send_is_idempotent() {
        let (a, b) = duplex::<u32, u32>(CallPattern::Bidirectional, 4);

        a.close_send().await;
        let after_first = a.direction();
        a.close_send().await;
        assert_eq!(a.direction(), after_first);
        assert_eq!(a.error(), None);

        assert_eq!(b.receive().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_send_after_close_send_is_rejected() {
        let (a, _b) = duplex::<u32, u32>(CallPattern::Bidirectional, 4);
        a.close_send().await;

        let result = a.send(1).await;
        assert!(matches!(result, Err(StreamError::InvalidArgument(_))));
        // Misuse is reported, not recorded as the call's failure.
        assert_eq!(a.error(), None);
    }

    #[tokio::test]
    async fn test_both_halves_closed() {
        let (a, b) = duplex::<u32, u32>(CallPattern::Bidirectional, 4);

        a.close_send().await;
        b.close_send().await;
        assert_eq!(a.receive().await.unwrap(), None);
        assert_eq!(b.receive().await.unwrap(), None);

        assert!(a.is_closed());
        assert!(b.is_closed());
        assert_eq!(a.error(), None);
    }

    #[tokio::test]
    async fn test_peer_error_is_delivered() {
        let (a, b) = duplex::<u32, u32>(CallPattern::Bidirectional, 4);

        a.close_with_error(StreamError::PeerError("bad input".to_string()))
            .await;
        let err = b.receive().await.unwrap_err();
        assert_eq!(err, StreamError::PeerError("bad input".to_string()));
        assert!(b.is_closed());
    }

    #[tokio::test]
    async fn test_first_error_wins() {
        let (a, _b) = duplex::<u32, u32>(CallPattern::Bidirectional, 4);

        a.close_with_error(StreamError::TransportFailure("first".to_string()))
            .await;
        a.close_with_error(StreamError::PeerError("second".to_string()))
            .await;
        a.cancel();

        assert_eq!(
            a.error(),
            Some(StreamError::TransportFailure("first".to_string()))
        );
        assert_eq!(
            a.send(1).await.unwrap_err(),
            StreamError::TransportFailure("first".to_string())
        );
    }

    #[tokio::test]
    async fn test_closed_is_terminal() {
        let (a, _b) = duplex::<u32, u32>(CallPattern::Bidirectional, 4);
        a.cancel();
        assert!(a.is_closed());

        a.close_send().await;
        assert!(a.is_closed());
        assert_eq!(a.receive().await.unwrap_err(), StreamError::Cancelled);
        assert!(a.is_closed());
    }

    #[tokio::test]
    async fn test_cancel_wakes_blocked_receive() {
        let (a, _b) = duplex::<u32, u32>(CallPattern::Bidirectional, 4);
        let a = Arc::new(a);

        let waiter = {
            let a = a.clone();
            tokio::spawn(async move { a.receive().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        a.cancel();

        let result = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("receive did not return after cancel")
            .unwrap();
        assert_eq!(result.unwrap_err(), StreamError::Cancelled);
    }

    #[tokio::test]
    async fn test_parent_token_cancels_call() {
        let parent = CancellationToken::new();
        let (tx, _rx) = response_channel::<u32>(1);
        let handle: StreamHandle<u32, u32> =
            StreamHandle::new(CallPattern::ServerStreaming, tx, NoInbound).with_parent(&parent);

        parent.cancel();
        assert_eq!(
            handle.idle(Duration::from_secs(30)).await.unwrap_err(),
            StreamError::Cancelled
        );
    }

    #[tokio::test]
    async fn test_deadline_fails_pending_receive_with_timeout() {
        let (_a, b) = duplex::<u32, u32>(CallPattern::Bidirectional, 4);
        let b = b.with_timeout(Duration::from_millis(30));

        let err = b.receive().await.unwrap_err();
        assert_eq!(err, StreamError::Timeout);
        assert!(b.is_closed());
        assert_eq!(b.send(1).await.unwrap_err(), StreamError::Timeout);
    }

    #[tokio::test]
    async fn test_transport_failure_reaches_other_direction() {
        let (sender, _requests) = request_channel::<u32>(4);
        let (inject, rx) = tokio::sync::mpsc::channel::<Result<u32, tonic::Status>>(4);
        let handle = Arc::new(StreamHandle::new(
            CallPattern::Bidirectional,
            sender,
            StreamReceiver::new(tokio_stream::wrappers::ReceiverStream::new(rx)),
        ));

        inject
            .send(Err(tonic::Status::unavailable("connection reset")))
            .await
            .unwrap();
        let err = handle.receive().await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::TransportFailure);
        assert_eq!(handle.send(7).await.unwrap_err(), err);
    }

    /// Caller-side handle over a request stream, with the response side injected by hand.
    fn caller() -> (
        StreamHandle<u32, u32>,
        tokio_stream::wrappers::ReceiverStream<u32>,
        tokio::sync::mpsc::Sender<Result<u32, tonic::Status>>,
    ) {
        let (sender, requests) = request_channel::<u32>(4);
        let (inject, rx) = tokio::sync::mpsc::channel::<Result<u32, tonic::Status>>(4);
        let handle = StreamHandle::new(
            CallPattern::ClientStreaming,
            sender,
            StreamReceiver::new(tokio_stream::wrappers::ReceiverStream::new(rx)),
        );
        (handle, requests, inject)
    }

    #[tokio::test]
    async fn test_send_reports_peer_status_after_peer_stops_reading() {
        let (handle, requests, inject) = caller();
        handle.send(1).await.unwrap();

        // The peer rejects the call: it stops reading and sends its status.
        drop(requests);
        inject
            .send(Err(tonic::Status::internal("quota exceeded")))
            .await
            .unwrap();

        let expected = StreamError::PeerError("quota exceeded".to_string());
        assert_eq!(handle.send(2).await.unwrap_err(), expected);
        assert_eq!(handle.error(), Some(expected.clone()));
        assert_eq!(handle.receive().await.unwrap_err(), expected);
    }

    #[tokio::test]
    async fn test_send_waits_for_late_peer_status() {
        let (handle, requests, inject) = caller();
        drop(requests);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let _ = inject
                .send(Err(tonic::Status::invalid_argument("bad chunk")))
                .await;
        });

        assert_eq!(
            handle.send(1).await.unwrap_err(),
            StreamError::InvalidArgument("bad chunk".to_string())
        );
    }

    #[tokio::test]
    async fn test_concurrent_receive_records_peer_status_first() {
        let (handle, requests, inject) = caller();
        let handle = Arc::new(handle);

        let receiver = {
            let handle = handle.clone();
            tokio::spawn(async move { handle.receive().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        drop(requests);
        let sender = {
            let handle = handle.clone();
            tokio::spawn(async move { handle.send(3).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        inject
            .send(Err(tonic::Status::internal("rejected")))
            .await
            .unwrap();

        let expected = StreamError::PeerError("rejected".to_string());
        assert_eq!(receiver.await.unwrap().unwrap_err(), expected);
        assert_eq!(sender.await.unwrap().unwrap_err(), expected);
    }

    #[tokio::test]
    async fn test_peer_finished_early_keeps_its_reply() {
        let (handle, requests, inject) = caller();
        drop(requests);
        inject.send(Ok(7)).await.unwrap();
        drop(inject);

        assert_eq!(handle.send(1).await.unwrap_err(), StreamError::Cancelled);
        assert_eq!(handle.error(), None);
        assert_eq!(handle.receive().await.unwrap(), Some(7));
        assert_eq!(handle.receive().await.unwrap(), None);
        assert!(handle.is_closed());
    }

    #[tokio::test]
    async fn test_concurrent_send_and_receive() {
        let (a, b) = duplex::<u32, u32>(CallPattern::Bidirectional, 1);
        let a = Arc::new(a);

        // The receive is parked while the other task sends on the same handle.
        let receiver = {
            let a = a.clone();
            tokio::spawn(async move { a.receive().await })
        };
        let sender = {
            let a = a.clone();
            tokio::spawn(async move { a.send(42).await })
        };

        sender.await.unwrap().unwrap();
        assert_eq!(b.receive().await.unwrap(), Some(42));
        b.send(7).await.unwrap();
        assert_eq!(receiver.await.unwrap().unwrap(), Some(7));
    }

    #[test]
    fn test_pattern_display() {
        assert_eq!(CallPattern::ClientStreaming.to_string(), "client-streaming");
        assert_eq!(CallPattern::ServerStreaming.to_string(), "server-streaming");
        assert_eq!(CallPattern::Bidirectional.to_string(), "bidirectional");
    }
}
