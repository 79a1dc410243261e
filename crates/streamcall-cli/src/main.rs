// ABOUTME: CLI entry point for the streamcall binary.
// ABOUTME: Dispatches to serve, stocks, upload and chat subcommands.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use streamcall_cli::commands;
use streamcall_grpc::{CallConfig, ChannelConfig, StreamingClient, DEFAULT_SERVER};

#[derive(Parser)]
#[command(name = "streamcall")]
#[command(about = "gRPC streaming demo: file upload, stock ticks and chat")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct ServerArgs {
    /// Server address
    #[arg(short, long, env = "STREAMCALL_SERVER", default_value = DEFAULT_SERVER)]
    server: String,

    /// Overall deadline for the call, in seconds (0 disables it)
    #[arg(long, default_value_t = 50)]
    timeout: u64,

    /// Connect over TLS even when the address has no https:// scheme
    #[arg(long, env = "STREAMCALL_TLS")]
    tls: bool,

    /// Keep-alive ping interval for idle streams, in seconds (0 disables it)
    #[arg(long, default_value_t = 10)]
    keep_alive: u64,

    /// Limit on establishing the connection, in seconds
    #[arg(long, default_value_t = 30)]
    connect_timeout: u64,
}

impl ServerArgs {
    fn channel(&self) -> ChannelConfig {
        let config = ChannelConfig::new(&self.server)
            .with_keep_alive((self.keep_alive > 0).then(|| Duration::from_secs(self.keep_alive)))
            .with_connect_timeout(Duration::from_secs(self.connect_timeout));
        if self.tls {
            config.with_tls(true)
        } else {
            config
        }
    }

    async fn connect(&self) -> Result<StreamingClient> {
        let call = if self.timeout == 0 {
            CallConfig::default().without_timeout()
        } else {
            CallConfig::default().with_timeout(Duration::from_secs(self.timeout))
        };
        StreamingClient::connect(&self.channel(), call)
            .await
            .with_context(|| format!("connecting to {}", self.server))
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run the streaming server
    Serve {
        /// Path to configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Listen address, overriding the config file
        #[arg(long, env = "STREAMCALL_ADDR")]
        addr: Option<String>,
    },

    /// Stream simulated prices for a stock symbol
    Stocks {
        #[command(flatten)]
        server: ServerArgs,

        /// Stock symbol
        #[arg(long, default_value = "AAPL")]
        symbol: String,
    },

    /// Upload a file in chunks and print the server's summary
    Upload {
        #[command(flatten)]
        server: ServerArgs,

        /// File to upload (ten generated chunks of example.txt if omitted)
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Chunk size in bytes
        #[arg(long, default_value_t = 1024)]
        chunk_size: usize,

        /// File name to report, instead of the file's own name
        #[arg(long)]
        name: Option<String>,

        /// Pause between chunks, in milliseconds
        #[arg(long, default_value_t = 0)]
        pause_ms: u64,
    },

    /// Exchange chat messages with the server
    Chat {
        #[command(flatten)]
        server: ServerArgs,

        /// Sender name
        #[arg(short, long, default_value = commands::DEFAULT_CHAT_USER)]
        user: String,

        /// Message to send; repeat for several (five greetings if omitted)
        #[arg(short, long = "message")]
        messages: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config, addr } => {
            streamcall_log::init();
            let config = commands::load_serve_config(config.as_deref(), addr)?;
            streamcall_serve::run(config).await
        }
        Commands::Stocks { server, symbol } => {
            streamcall_log::init_for("streamcall_cli");
            let client = server.connect().await?;
            commands::stocks(&client, &symbol).await?;
            Ok(())
        }
        Commands::Upload {
            server,
            file,
            chunk_size,
            name,
            pause_ms,
        } => {
            streamcall_log::init_for("streamcall_cli");
            let chunks = match file {
                Some(path) => commands::file_chunks(&path, chunk_size, name.as_deref())?,
                None => commands::synthetic_chunks(),
            };
            let client = server.connect().await?;
            let summary =
                commands::upload(&client, chunks, Duration::from_millis(pause_ms)).await?;
            println!("{}", summary.message);
            Ok(())
        }
        Commands::Chat {
            server,
            user,
            messages,
        } => {
            streamcall_log::init_for("streamcall_cli");
            let client = server.connect().await?;
            commands::chat(&client, commands::chat_turns(&user, &messages)).await?;
            Ok(())
        }
    }
}
