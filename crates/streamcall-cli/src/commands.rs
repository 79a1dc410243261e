// ABOUTME: Implementations of the streamcall subcommands.
// ABOUTME: Builds the messages each client call sends and prints what comes back.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, SecondsFormat};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use streamcall_grpc::envelope::{chat_turn, file_chunk, stock_request};
use streamcall_grpc::{initiate, RelayReport, StreamingClient};
use streamcall_proto::{ChatTurn, FileChunk, StockTick, UploadSummary};
use streamcall_serve::ServeConfig;
use tracing::{debug, info};

/// File name used for generated upload chunks.
pub const SYNTHETIC_FILE_NAME: &str = "example.txt";

/// Number of generated upload chunks.
pub const SYNTHETIC_CHUNK_COUNT: u32 = 10;

/// Default chat sender and message.
pub const DEFAULT_CHAT_USER: &str = "Client";
pub const DEFAULT_CHAT_MESSAGE: &str = "Hello from the client!";
pub const DEFAULT_CHAT_TURNS: usize = 5;

/// Resolve the server config: explicit path, else ~/.config/streamcall/serve.toml
/// when present, else defaults. `addr` overrides the listen address.
pub fn load_serve_config(path: Option<&Path>, addr: Option<String>) -> Result<ServeConfig> {
    let path = path.map(Path::to_path_buf).or_else(|| {
        default_config_path().filter(|p| p.exists())
    });

    let mut config = match path {
        Some(path) => {
            info!("Loading server config from {}", path.display());
            ServeConfig::load(&path)
                .with_context(|| format!("loading config {}", path.display()))?
        }
        None => ServeConfig::default(),
    };

    if let Some(addr) = addr {
        config.grpc_addr = addr;
        config.validate().context("validating --addr")?;
    }
    Ok(config)
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("streamcall").join("serve.toml"))
}

/// One output line per tick.
pub fn format_tick(tick: &StockTick) -> String {
    let time = DateTime::from_timestamp(tick.timestamp_seconds, 0)
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_else(|| tick.timestamp_seconds.to_string());
    format!(
        "Stock: {}, Price: ${:.2}, Time: {}",
        tick.symbol, tick.price, time
    )
}

/// Stream ticks for `symbol` and print each one. Returns the tick count.
pub async fn stocks(client: &StreamingClient, symbol: &str) -> Result<u32> {
    let call = client
        .get_stock_prices(stock_request(symbol))
        .await
        .context("opening stock price stream")?;

    let mut received = 0;
    while let Some(tick) = call
        .receive()
        .await
        .context("receiving stock price")?
    {
        println!("{}", format_tick(&tick));
        received += 1;
    }
    info!(symbol, received, "Stream ended");
    Ok(received)
}

/// The generated upload: ten small text chunks for example.txt.
pub fn synthetic_chunks() -> Vec<FileChunk> {
    (0..SYNTHETIC_CHUNK_COUNT)
        .map(|i| {
            file_chunk(
                SYNTHETIC_FILE_NAME,
                i,
                format!("This is chunk {i}").into_bytes(),
            )
        })
        .collect()
}

/// Split a file into chunks of at most `chunk_size` bytes.
///
/// The chunks carry `name`, or the file's own name when `name` is None.
pub fn file_chunks(path: &Path, chunk_size: usize, name: Option<&str>) -> Result<Vec<FileChunk>> {
    if chunk_size == 0 {
        bail!("chunk size must be at least 1 byte");
    }
    let data = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let name = match name {
        Some(name) => name.to_string(),
        None => path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
    };

    data.chunks(chunk_size)
        .enumerate()
        .map(|(i, payload)| {
            let sequence = u32::try_from(i).context("file has too many chunks")?;
            Ok(file_chunk(name.clone(), sequence, payload.to_vec()))
        })
        .collect()
}

/// Upload `chunks`, pausing `pause` between sends, and return the summary.
pub async fn upload(
    client: &StreamingClient,
    chunks: Vec<FileChunk>,
    pause: Duration,
) -> Result<UploadSummary> {
    let call = client.upload_file();
    for (i, chunk) in chunks.into_iter().enumerate() {
        if i > 0 && !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
        debug!(sequence = chunk.sequence_number, file = %chunk.file_name, "Sent chunk");
        call.send(chunk).await.context("sending chunk")?;
    }
    let summary = call.finish().await.context("finishing upload")?;
    info!(file = %summary.file_name, chunks = summary.total_chunks, "Summary");
    Ok(summary)
}

/// The chat turns to send: one per message, or the default greeting repeated.
pub fn chat_turns(user: &str, messages: &[String]) -> Vec<ChatTurn> {
    if messages.is_empty() {
        (0..DEFAULT_CHAT_TURNS)
            .map(|_| chat_turn(user, DEFAULT_CHAT_MESSAGE))
            .collect()
    } else {
        messages.iter().map(|m| chat_turn(user, m.as_str())).collect()
    }
}

/// Send `turns` while printing every reply as it arrives.
pub async fn chat(client: &StreamingClient, turns: Vec<ChatTurn>) -> Result<RelayReport> {
    let call = client.chat().await.context("opening chat")?;
    let report = initiate(Arc::clone(&call), futures::stream::iter(turns), |reply| {
        println!("{}: {}", reply.user, reply.text)
    })
    .await
    .context("chatting")?;
    info!(sent = report.sent, received = report.received, "Chat ended");
    Ok(report)
}
