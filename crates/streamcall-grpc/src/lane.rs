// ABOUTME: Directional message lanes that connect a stream handle to its transport.
// ABOUTME: Typed sender/receiver wrappers over mpsc channels and tonic streams.

use std::future::Future;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;
use tonic::Status;

use crate::error::StreamError;

/// Default buffer size for outbound message channels.
pub const DEFAULT_CHANNEL_BUFFER: usize = 32;

/// The sending direction of a call.
#[async_trait]
pub trait OutboundLane<T: Send + 'static>: Send {
    /// Send one message. Fails with `Cancelled` once the peer has stopped listening.
    async fn send(&mut self, msg: T) -> Result<(), StreamError>;

    /// Close the lane. With an error, the error is delivered to the peer if the
    /// transport can carry one.
    async fn close(&mut self, error: Option<StreamError>);

    /// True once the lane was closed locally or the peer stopped listening.
    fn is_closed(&self) -> bool;
}

/// The receiving direction of a call.
#[async_trait]
pub trait InboundLane<T: Send + 'static>: Send {
    /// Receive the next message. `Ok(None)` means the peer half-closed.
    async fn recv(&mut self) -> Result<Option<T>, StreamError>;
}

fn closed_lane() -> StreamError {
    StreamError::InvalidArgument("send on a closed lane".to_string())
}

/// Sender feeding a plain item stream, such as a tonic request stream.
///
/// Plain item streams cannot carry an error, so closing with an error only
/// drops the channel; the peer learns about it when the call is torn down.
#[derive(Debug)]
pub struct StreamSender<T> {
    inner: Option<mpsc::Sender<T>>,
}

impl<T> StreamSender<T> {
    /// Create a stream sender from an mpsc sender.
    pub fn new(sender: mpsc::Sender<T>) -> Self {
        Self {
            inner: Some(sender),
        }
    }

    /// Get the capacity of the underlying channel, zero once closed.
    pub fn capacity(&self) -> usize {
        self.inner.as_ref().map(|tx| tx.capacity()).unwrap_or(0)
    }
}

#[async_trait]
impl<T: Send + 'static> OutboundLane<T> for StreamSender<T> {
    async fn send(&mut self, msg: T) -> Result<(), StreamError> {
        let tx = self.inner.as_ref().ok_or_else(closed_lane)?;
        tx.send(msg).await.map_err(|_| StreamError::Cancelled)
    }

    async fn close(&mut self, _error: Option<StreamError>) {
        self.inner.take();
    }

    fn is_closed(&self) -> bool {
        self.inner.as_ref().map(|tx| tx.is_closed()).unwrap_or(true)
    }
}

/// Sender feeding a stream of `Result<T, Status>`, such as a tonic response stream.
///
/// The terminal outcome travels on its own slot, after every buffered item,
/// so a full buffer can never swallow it.
#[derive(Debug)]
pub struct ResponseSender<T> {
    inner: Option<mpsc::Sender<Result<T, Status>>>,
    terminal: Option<oneshot::Sender<Option<Status>>>,
}

#[async_trait]
impl<T: Send + 'static> OutboundLane<T> for ResponseSender<T> {
    async fn send(&mut self, msg: T) -> Result<(), StreamError> {
        let tx = self.inner.as_ref().ok_or_else(closed_lane)?;
        tx.send(Ok(msg)).await.map_err(|_| StreamError::Cancelled)
    }

    async fn close(&mut self, error: Option<StreamError>) {
        self.inner.take();
        let Some(terminal) = self.terminal.take() else {
            return;
        };
        if terminal.send(error.map(Status::from)).is_err() {
            tracing::debug!("peer left before the call's outcome was delivered");
        }
    }

    fn is_closed(&self) -> bool {
        self.inner.as_ref().map(|tx| tx.is_closed()).unwrap_or(true)
    }
}

/// Receiving half of [`response_channel`].
///
/// Yields every item, then the terminal status if the call failed. A sender
/// dropped without closing ends the stream with `Cancelled`.
#[derive(Debug)]
pub struct ResponseStream<T> {
    items: ReceiverStream<Result<T, Status>>,
    terminal: Option<oneshot::Receiver<Option<Status>>>,
}

impl<T> Unpin for ResponseStream<T> {}

impl<T> Stream for ResponseStream<T> {
    type Item = Result<T, Status>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if let Some(item) = ready!(Pin::new(&mut this.items).poll_next(cx)) {
            return Poll::Ready(Some(item));
        }
        let Some(terminal) = this.terminal.as_mut() else {
            return Poll::Ready(None);
        };
        let outcome = ready!(Pin::new(terminal).poll(cx));
        this.terminal = None;
        Poll::Ready(match outcome {
            Ok(None) => None,
            Ok(Some(status)) => Some(Err(status)),
            Err(_) => Some(Err(Status::cancelled("peer dropped the call"))),
        })
    }
}

/// Outbound lane for a call whose caller sent its only message at call start.
#[derive(Debug, Default)]
pub struct NoOutbound;

#[async_trait]
impl<T: Send + 'static> OutboundLane<T> for NoOutbound {
    async fn send(&mut self, _msg: T) -> Result<(), StreamError> {
        Err(StreamError::InvalidArgument(
            "call has no outbound stream".to_string(),
        ))
    }

    async fn close(&mut self, _error: Option<StreamError>) {}

    fn is_closed(&self) -> bool {
        true
    }
}

/// Receiver over any stream of `Result<T, Status>`.
///
/// Wraps a tonic `Streaming` as well as the in-memory [`ResponseStream`]s
/// built by [`response_channel`].
pub struct StreamReceiver<S> {
    inner: S,
}

impl<S> StreamReceiver<S> {
    pub fn new(stream: S) -> Self {
        Self { inner: stream }
    }

    /// Get the raw stream (for advanced use cases).
    pub fn into_inner(self) -> S {
        self.inner
    }
}

#[async_trait]
impl<T, S> InboundLane<T> for StreamReceiver<S>
where
    T: Send + 'static,
    S: Stream<Item = Result<T, Status>> + Unpin + Send,
{
    async fn recv(&mut self) -> Result<Option<T>, StreamError> {
        match self.inner.next().await {
            Some(Ok(msg)) => Ok(Some(msg)),
            Some(Err(status)) => Err(status.into()),
            None => Ok(None),
        }
    }
}

/// Inbound lane for a call whose peer sends nothing after call start.
#[derive(Debug, Default)]
pub struct NoInbound;

#[async_trait]
impl<T: Send + 'static> InboundLane<T> for NoInbound {
    async fn recv(&mut self) -> Result<Option<T>, StreamError> {
        Ok(None)
    }
}

/// Create a request-stream pair: the sender half and the stream to pass to a tonic client method.
pub fn request_channel<T>(buffer_size: usize) -> (StreamSender<T>, ReceiverStream<T>) {
    let (tx, rx) = mpsc::channel(buffer_size);
    (StreamSender::new(tx), ReceiverStream::new(rx))
}

/// Create a response-stream pair: the sender half and the stream to return from a tonic service method.
pub fn response_channel<T>(buffer_size: usize) -> (ResponseSender<T>, ResponseStream<T>) {
    let (tx, rx) = mpsc::channel(buffer_size);
    let (terminal_tx, terminal_rx) = oneshot::channel();
    (
        ResponseSender {
            inner: Some(tx),
            terminal: Some(terminal_tx),
        },
        ResponseStream {
            items: ReceiverStream::new(rx),
            terminal: Some(terminal_rx),
        },
    )
}
