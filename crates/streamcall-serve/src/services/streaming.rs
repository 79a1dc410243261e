// ABOUTME: StreamingService gRPC implementation
// ABOUTME: Wraps each accepted call in a StreamHandle and hands it to the pattern's handler

use crate::config::ServeConfig;
use crate::registry::CallRegistry;
use futures::StreamExt;
use std::net::SocketAddr;
use std::sync::Arc;
use streamcall_grpc::{
    response_channel, BidirectionalHandler, CallPattern, ChatResponder, ClientStreamingHandler,
    NoInbound, ResponseStream, ServerStreamingHandler, StockTicker, StreamError, StreamHandle,
    StreamReceiver, UploadAggregator,
};
use streamcall_proto::server::StreamingService;
use streamcall_proto::{ChatTurn, FileChunk, StockRequest, StockTick, UploadSummary};
use tonic::{Request, Response, Status, Streaming};
use tracing::debug;

/// StreamingService implementation
pub struct StreamingServiceImpl {
    registry: CallRegistry,
    buffer_size: usize,
    uploads: Arc<dyn ClientStreamingHandler<FileChunk, UploadSummary>>,
    ticker: Arc<dyn ServerStreamingHandler<StockRequest, StockTick>>,
    chat: Arc<dyn BidirectionalHandler<ChatTurn, ChatTurn>>,
}

impl StreamingServiceImpl {
    /// Service with the built-in handlers, configured from `config`.
    pub fn new(config: &ServeConfig, registry: CallRegistry) -> Self {
        Self::with_handlers(
            registry,
            config.channel_buffer,
            Arc::new(UploadAggregator::new()),
            Arc::new(StockTicker::new(config.ticker.ticker_config())),
            Arc::new(ChatResponder::new(config.chat.display_name.clone())),
        )
    }

    pub fn with_handlers(
        registry: CallRegistry,
        buffer_size: usize,
        uploads: Arc<dyn ClientStreamingHandler<FileChunk, UploadSummary>>,
        ticker: Arc<dyn ServerStreamingHandler<StockRequest, StockTick>>,
        chat: Arc<dyn BidirectionalHandler<ChatTurn, ChatTurn>>,
    ) -> Self {
        Self {
            registry,
            buffer_size: buffer_size.max(1),
            uploads,
            ticker,
            chat,
        }
    }

    pub fn registry(&self) -> &CallRegistry {
        &self.registry
    }
}

fn peer(addr: Option<SocketAddr>) -> Option<String> {
    addr.map(|a| a.to_string())
}

#[tonic::async_trait]
impl StreamingService for StreamingServiceImpl {
    type GetStockPricesStream = ResponseStream<StockTick>;
    type ChatStream = ResponseStream<ChatTurn>;

    async fn upload_file(
        &self,
        request: Request<Streaming<FileChunk>>,
    ) -> Result<Response<UploadSummary>, Status> {
        let ctx = self.registry.open(
            "UploadFile",
            CallPattern::ClientStreaming,
            peer(request.remote_addr()),
        )?;

        // Exactly one summary fits; the handler sends it before half-closing.
        let (sender, mut summaries) = response_channel(1);
        let call = self.registry.attach(StreamHandle::new(
            CallPattern::ClientStreaming,
            sender,
            StreamReceiver::new(request.into_inner()),
        ));

        let uploads = self.uploads.clone();
        self.registry
            .track(&ctx, async { uploads.handle(&ctx, &call).await })
            .await?;
        drop(call);

        match summaries.next().await {
            Some(Ok(summary)) => {
                debug!(call_id = %ctx.call_id, file = %summary.file_name, "Returning upload summary");
                Ok(Response::new(summary))
            }
            Some(Err(status)) => Err(status),
            None => Err(Status::from(StreamError::PeerError(
                "upload finished without a summary".to_string(),
            ))),
        }
    }

    async fn get_stock_prices(
        &self,
        request: Request<StockRequest>,
    ) -> Result<Response<Self::GetStockPricesStream>, Status> {
        let ctx = self.registry.open(
            "GetStockPrices",
            CallPattern::ServerStreaming,
            peer(request.remote_addr()),
        )?;
        let stock_request = request.into_inner();

        // Reject bad requests before any tick is produced.
        self.ticker.validate(&stock_request)?;

        let (sender, ticks) = response_channel(self.buffer_size);
        let call = self.registry.attach(StreamHandle::new(
            CallPattern::ServerStreaming,
            sender,
            NoInbound,
        ));

        let ticker = self.ticker.clone();
        let call_ctx = ctx.clone();
        self.registry.spawn(ctx, async move {
            ticker.handle(&call_ctx, stock_request, &call).await
        });

        Ok(Response::new(ticks))
    }

    async fn chat(
        &self,
        request: Request<Streaming<ChatTurn>>,
    ) -> Result<Response<Self::ChatStream>, Status> {
        let ctx = self.registry.open(
            "Chat",
            CallPattern::Bidirectional,
            peer(request.remote_addr()),
        )?;

        let (sender, replies) = response_channel(self.buffer_size);
        let call = self.registry.attach(StreamHandle::new(
            CallPattern::Bidirectional,
            sender,
            StreamReceiver::new(request.into_inner()),
        ));

        let chat = self.chat.clone();
        let call_ctx = ctx.clone();
        self.registry
            .spawn(ctx, async move { chat.handle(&call_ctx, &call).await });

        Ok(Response::new(replies))
    }
}
