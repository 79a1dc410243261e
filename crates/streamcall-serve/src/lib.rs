// ABOUTME: streamcall server: StreamingService over gRPC
// ABOUTME: Upload aggregation, stock tick streaming, and chat relay behind one listener

pub mod config;
pub mod registry;
pub mod server;
pub mod services;

pub use config::{ChatSettings, ConfigError, ServeConfig, TickerSettings, DEFAULT_GRPC_ADDR};
pub use registry::CallRegistry;
pub use server::serve;

use anyhow::Result;

/// Run the streamcall server
pub async fn run(config: ServeConfig) -> Result<()> {
    server::run(config).await
}
