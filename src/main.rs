use anyhow::{Context, Result};
use audio_relay::config::DEFAULT_CONFIG_PATH;
use audio_relay::http::{self, AppState};
use audio_relay::{
    ClientOptions, Config, ConnectionStatus, FileCaptureDevice, RecordingClient, RecordingStatus,
    Relay, WsTransport,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "audio-relay", version, about = "Stream recorded audio chunks to a relay over WebSocket")]
struct Cli {
    /// Configuration file (any format the config crate understands)
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the relay server
    Serve {
        /// Listening port (overrides config and PORT)
        #[arg(long)]
        port: Option<u16>,

        /// Directory receiving one file per session
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },

    /// Stream an encoded audio file to a relay as if it were captured live
    Record {
        /// Encoded audio file to replay
        #[arg(long)]
        input: PathBuf,

        /// Relay URL (defaults to client.relay_url)
        #[arg(long)]
        url: Option<String>,

        /// Stop after this many seconds (defaults to the end of the file)
        #[arg(long)]
        seconds: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut cfg = Config::load(&cli.config)?;

    match cli.command {
        Command::Serve { port, output_dir } => {
            if let Some(port) = port {
                cfg.server.port = port;
            }
            if let Some(output_dir) = output_dir {
                cfg.storage.output_dir = output_dir;
            }
            serve(cfg).await
        }
        Command::Record {
            input,
            url,
            seconds,
        } => {
            let url = url.unwrap_or_else(|| cfg.client.relay_url.clone());
            record(cfg, input, url, seconds.map(Duration::from_secs)).await
        }
    }
}

async fn serve(cfg: Config) -> Result<()> {
    info!("Audio relay v{}", env!("CARGO_PKG_VERSION"));

    let relay = Relay::from_storage(&cfg.storage)?;
    let state = AppState::new(relay).with_max_frame_bytes(cfg.server.max_frame_bytes);

    let addr = format!("{}:{}", cfg.server.bind, cfg.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    http::serve(listener, state, http::shutdown_signal()).await
}

async fn record(cfg: Config, input: PathBuf, url: String, limit: Option<Duration>) -> Result<()> {
    let client = RecordingClient::spawn(
        Arc::new(WsTransport::new()),
        Arc::new(FileCaptureDevice::new(&input)),
        ClientOptions::from(&cfg.client),
    );

    client.on_status_change(|status| {
        info!(
            "Status: connection={} recording={}",
            status.connection, status.recording
        );
    });

    let mut status = client.subscribe();
    client.connect(&url).await?;

    tokio::time::timeout(
        Duration::from_secs(10),
        status.wait_for(|s| s.connection == ConnectionStatus::Connected),
    )
    .await
    .with_context(|| format!("Timed out connecting to {}", url))?
    .context("Recording client stopped")?;

    client.start_recording().await?;
    info!("Streaming {} to {}", input.display(), url);

    let finished = status.wait_for(|s| s.recording != RecordingStatus::Recording);
    match limit {
        Some(limit) => {
            if tokio::time::timeout(limit, finished).await.is_err() {
                info!("Time limit reached");
            }
        }
        None => {
            if let Err(e) = finished.await {
                warn!("Status channel closed: {}", e);
            }
        }
    }

    client.stop_recording().await?;
    client.disconnect().await?;
    client.shutdown().await;

    Ok(())
}
