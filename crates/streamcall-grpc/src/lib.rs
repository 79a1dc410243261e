// ABOUTME: Streaming call core for streamcall: stream handles and the three pattern drivers.
// ABOUTME: Provides lanes, StreamHandle, the upload aggregator, tick generator, chat relay, and client.

pub mod aggregator;
pub mod channel;
pub mod client;
pub mod envelope;
pub mod error;
pub mod generator;
pub mod handle;
pub mod handler;
pub mod lane;
pub mod memory;
pub mod relay;
pub mod task;

// Call handles
pub use handle::{CallPattern, DirectionState, StreamHandle};

// Error types
pub use error::{ErrorKind, StreamError};

// Transport lanes
pub use lane::{
    request_channel, response_channel, InboundLane, NoInbound, NoOutbound, OutboundLane,
    ResponseSender, ResponseStream, StreamReceiver, StreamSender, DEFAULT_CHANNEL_BUFFER,
};

// Pattern drivers
pub use aggregator::{UploadAggregator, UploadTally};
pub use generator::{StockTicker, TickerConfig};
pub use handler::{
    BidirectionalHandler, CallContext, ClientStreamingHandler, ServerStreamingHandler,
};
pub use relay::{initiate, ChatResponder, RelayReport};

// Caller side
pub use channel::{ChannelConfig, DEFAULT_CONNECT_TIMEOUT, DEFAULT_KEEP_ALIVE, DEFAULT_SERVER};
pub use client::{CallConfig, StreamingClient, UploadCall};
pub use task::CallTask;

// Re-export proto types for convenience
pub use streamcall_proto;
