// ABOUTME: Server-streaming generator that emits a bounded run of simulated stock ticks.
// ABOUTME: One tick per interval, stopping at once when the receiver goes away or the call is cancelled.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tracing::{debug, info, warn};

use crate::envelope::{validate_stock_request, StockRequest, StockTick};
use crate::error::StreamError;
use crate::handle::StreamHandle;
use crate::handler::{CallContext, ServerStreamingHandler};

/// Default number of ticks per call.
pub const DEFAULT_TICK_COUNT: u32 = 10;

/// Default delay between ticks.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Exclusive upper bound for generated prices.
pub const DEFAULT_PRICE_CEILING: f32 = 600.0;

/// Shape of the tick sequence.
///
/// The length is fixed when the call starts; there is no unbounded mode.
#[derive(Debug, Clone, PartialEq)]
pub struct TickerConfig {
    /// Ticks per call.
    pub count: u32,
    /// Delay between consecutive ticks. No delay follows the last tick.
    pub interval: Duration,
    /// Prices fall in `[0, price_ceiling)`.
    pub price_ceiling: f32,
}

impl Default for TickerConfig {
    fn default() -> Self {
        Self {
            count: DEFAULT_TICK_COUNT,
            interval: DEFAULT_TICK_INTERVAL,
            price_ceiling: DEFAULT_PRICE_CEILING,
        }
    }
}

impl TickerConfig {
    pub fn with_count(mut self, count: u32) -> Self {
        self.count = count;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_price_ceiling(mut self, ceiling: f32) -> Self {
        self.price_ceiling = ceiling;
        self
    }
}

/// Generates GetStockPrices responses.
#[derive(Debug, Clone, Default)]
pub struct StockTicker {
    config: TickerConfig,
}

impl StockTicker {
    pub fn new(config: TickerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TickerConfig {
        &self.config
    }

    fn quote(&self, symbol: &str) -> StockTick {
        let ceiling = self.config.price_ceiling;
        let price = if ceiling > 0.0 {
            rand::thread_rng().gen_range(0.0..ceiling)
        } else {
            0.0
        };
        StockTick {
            symbol: symbol.to_string(),
            price,
            timestamp_seconds: chrono::Utc::now().timestamp(),
        }
    }

    /// Stream `count` ticks for the requested symbol, then half-close.
    ///
    /// Returns the number of ticks sent. Stops before the next tick once the
    /// receiver is gone, reporting `Cancelled`.
    pub async fn generate(
        &self,
        ctx: &CallContext,
        request: &StockRequest,
        call: &StreamHandle<StockTick, StockRequest>,
    ) -> Result<u32, StreamError> {
        if let Err(err) = validate_stock_request(request) {
            return Err(call.close_with_error(err).await);
        }
        info!(call_id = %ctx.call_id, symbol = %request.symbol, count = self.config.count, "Streaming stock prices");

        for sent in 0..self.config.count {
            if sent > 0 {
                if let Err(err) = call.idle(self.config.interval).await {
                    return Err(self.stop(ctx, call, sent, err).await);
                }
            }
            if call.peer_gone().await {
                return Err(self.stop(ctx, call, sent, StreamError::Cancelled).await);
            }

            let tick = self.quote(&request.symbol);
            debug!(
                call_id = %ctx.call_id,
                symbol = %tick.symbol,
                price = tick.price,
                timestamp = tick.timestamp_seconds,
                "Sending stock price"
            );
            if let Err(err) = call.send(tick).await {
                return Err(self.stop(ctx, call, sent, err).await);
            }
        }

        call.close_send().await;
        Ok(self.config.count)
    }

    async fn stop(
        &self,
        ctx: &CallContext,
        call: &StreamHandle<StockTick, StockRequest>,
        sent: u32,
        err: StreamError,
    ) -> StreamError {
        warn!(call_id = %ctx.call_id, sent, error = %err, "Stopping stock price stream");
        call.close_with_error(err).await
    }
}

#[async_trait]
impl ServerStreamingHandler<StockRequest, StockTick> for StockTicker {
    fn validate(&self, request: &StockRequest) -> Result<(), StreamError> {
        validate_stock_request(request)
    }

    async fn handle(
        &self,
        ctx: &CallContext,
        request: StockRequest,
        call: &StreamHandle<StockTick, StockRequest>,
    ) -> Result<usize, StreamError> {
        self.generate(ctx, &request, call)
            .await
            .map(|sent| sent as usize)
    }
}
