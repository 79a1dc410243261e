// ABOUTME: Caller-side entry points for the three StreamingService calls.
// ABOUTME: Opens tonic calls and wraps them in StreamHandles with the call deadline applied.

use std::sync::Arc;
use std::time::Duration;

use streamcall_proto::client::StreamingServiceClient;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::transport::Channel;
use tonic::{Request, Response};

use crate::channel::ChannelConfig;
use crate::envelope::{
    validate_stock_request, ChatTurn, FileChunk, StockRequest, StockTick, UploadSummary,
};
use crate::error::StreamError;
use crate::handle::{CallPattern, StreamHandle};
use crate::lane::{request_channel, NoOutbound, StreamReceiver, DEFAULT_CHANNEL_BUFFER};
use crate::task::CallTask;

/// Default overall deadline for one call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(50);

/// Per-call settings applied by [`StreamingClient`].
#[derive(Debug, Clone)]
pub struct CallConfig {
    /// Overall deadline for each call. None disables it.
    pub timeout: Option<Duration>,
    /// Buffer size of the outbound message channel.
    pub buffer_size: usize,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            timeout: Some(DEFAULT_CALL_TIMEOUT),
            buffer_size: DEFAULT_CHANNEL_BUFFER,
        }
    }
}

impl CallConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn without_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }
}

/// Client for the StreamingService.
#[derive(Debug, Clone)]
pub struct StreamingClient {
    inner: StreamingServiceClient<Channel>,
    call: CallConfig,
}

impl StreamingClient {
    pub async fn connect(channel: &ChannelConfig, call: CallConfig) -> Result<Self, StreamError> {
        let channel = channel.connect().await?;
        Ok(Self::new(channel, call))
    }

    pub fn new(channel: Channel, call: CallConfig) -> Self {
        Self {
            inner: StreamingServiceClient::new(channel),
            call,
        }
    }

    fn request<T>(&self, message: T) -> Request<T> {
        let mut request = Request::new(message);
        if let Some(timeout) = self.call.timeout {
            request.set_timeout(timeout);
        }
        request
    }

    fn scoped<Out, In>(&self, handle: StreamHandle<Out, In>) -> StreamHandle<Out, In>
    where
        Out: Send + 'static,
        In: Send + 'static,
    {
        match self.call.timeout {
            Some(timeout) => handle.with_timeout(timeout),
            None => handle,
        }
    }

    /// Open an UploadFile call.
    pub fn upload_file(&self) -> UploadCall {
        let (sender, requests) = request_channel(self.call.buffer_size);
        let (summary_tx, summary_rx) = mpsc::channel(1);

        let mut client = self.inner.clone();
        let request = self.request(requests);
        let task = CallTask::spawn(async move {
            let outcome = client
                .upload_file(request)
                .await
                .map(Response::into_inner);
            let _ = summary_tx.send(outcome).await;
        });

        let handle = self.scoped(StreamHandle::new(
            CallPattern::ClientStreaming,
            sender,
            StreamReceiver::new(ReceiverStream::new(summary_rx)),
        ));
        UploadCall {
            handle,
            _task: task,
        }
    }

    /// Open a GetStockPrices call. The request is validated locally first.
    ///
    /// The returned handle is already half-closed locally; drain it with
    /// `receive` until EndOfStream.
    pub async fn get_stock_prices(
        &self,
        request: StockRequest,
    ) -> Result<StreamHandle<StockRequest, StockTick>, StreamError> {
        validate_stock_request(&request)?;

        let mut client = self.inner.clone();
        let ticks = client
            .get_stock_prices(self.request(request))
            .await?
            .into_inner();

        let handle = self.scoped(StreamHandle::new(
            CallPattern::ServerStreaming,
            NoOutbound,
            StreamReceiver::new(ticks),
        ));
        handle.close_send().await;
        Ok(handle)
    }

    /// Open a Chat call. Drive it with [`crate::relay::initiate`] or share the
    /// handle between a sending and a receiving task.
    pub async fn chat(&self) -> Result<Arc<StreamHandle<ChatTurn, ChatTurn>>, StreamError> {
        let (sender, requests) = request_channel(self.call.buffer_size);

        let mut client = self.inner.clone();
        let replies = client.chat(self.request(requests)).await?.into_inner();

        Ok(Arc::new(self.scoped(StreamHandle::new(
            CallPattern::Bidirectional,
            sender,
            StreamReceiver::new(replies),
        ))))
    }
}

/// An open UploadFile call.
///
/// Dropping it before [`UploadCall::finish`] cancels the call.
pub struct UploadCall {
    handle: StreamHandle<FileChunk, UploadSummary>,
    _task: CallTask<()>,
}

impl UploadCall {
    /// Send one chunk. If the server already ended the call, fails with the
    /// server's status.
    pub async fn send(&self, chunk: FileChunk) -> Result<(), StreamError> {
        self.handle.send(chunk).await
    }

    /// Half-close and wait for the single summary.
    pub async fn finish(self) -> Result<UploadSummary, StreamError> {
        self.handle.close_send().await;
        match self.handle.receive().await? {
            Some(summary) => Ok(summary),
            None => Err(StreamError::PeerError(
                "upload ended without a summary".to_string(),
            )),
        }
    }

    pub fn handle(&self) -> &StreamHandle<FileChunk, UploadSummary> {
        &self.handle
    }
}
