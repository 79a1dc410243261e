// ABOUTME: gRPC server setup and lifecycle for streamcall
// ABOUTME: Binds the listener, serves StreamingService, and cancels in-flight calls on shutdown

use crate::config::ServeConfig;
use crate::registry::CallRegistry;
use crate::services::StreamingServiceImpl;
use anyhow::{Context, Result};
use std::future::Future;
use streamcall_proto::server::StreamingServiceServer;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tracing::{error, info};

/// Run the server until Ctrl+C or SIGTERM.
pub async fn run(config: ServeConfig) -> Result<()> {
    config.validate().context("validating config")?;
    let addr = config.socket_addr()?;

    info!("Starting streamcall server");
    info!("  gRPC address: {}", addr);
    info!("  Tick stream: {} ticks every {}ms", config.ticker.count, config.ticker.interval_ms);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding gRPC address {}", addr))?;

    println!();
    println!("streamcall server running!");
    println!("  gRPC: {}", config.grpc_addr);
    println!();
    println!("Try it with:");
    println!("  streamcall stocks --symbol AAPL");
    println!();
    println!("Press Ctrl+C to stop");

    serve(config, listener, shutdown_signal()).await?;

    println!("\nServer stopped.");
    Ok(())
}

/// Serve on an already bound listener until `shutdown` resolves.
///
/// When `shutdown` fires, every in-flight call is cancelled; the function
/// returns once the transport has drained and all call tasks have ended.
pub async fn serve<F>(config: ServeConfig, listener: TcpListener, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send,
{
    let registry = CallRegistry::new();
    let service = StreamingServiceImpl::new(&config, registry.clone());

    let local = listener.local_addr().context("reading listener address")?;
    info!("StreamingService listening on {}", local);

    let stopping = registry.clone();
    Server::builder()
        .add_service(StreamingServiceServer::new(service))
        .serve_with_incoming_shutdown(TcpListenerStream::new(listener), async move {
            shutdown.await;
            stopping.cancel_all();
        })
        .await
        .context("running gRPC server")?;

    registry.shutdown().await;
    info!("Server shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down...");
        }
    }
}
