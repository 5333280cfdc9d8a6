use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::client::{Backoff, ReconnectPolicy};
use crate::relay::IdStrategy;

/// Default config file, resolved by the `config` crate with any supported extension
pub const DEFAULT_CONFIG_PATH: &str = "config/audio-relay";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub client: ClientConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    /// Largest WebSocket message the relay will accept
    pub max_frame_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 3001,
            max_frame_bytes: 16 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub output_dir: PathBuf,
    pub file_prefix: String,
    pub file_extension: String,
    pub session_ids: IdStrategy,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("audio-data"),
            file_prefix: "audio".to_string(),
            file_extension: "webm".to_string(),
            session_ids: IdStrategy::Sequential,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Public-facing URL of the relay
    pub relay_url: String,
    pub max_reconnect_attempts: u32,
    pub reconnect_base_delay_ms: u64,
    pub reconnect_max_delay_ms: u64,
    pub backoff: Backoff,
    /// Capture timeslice; each interval yields one encoded chunk
    pub chunk_interval_ms: u64,
    pub audio_bits_per_second: u32,
    pub mime_type: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            relay_url: "ws://localhost:3001".to_string(),
            max_reconnect_attempts: 3,
            reconnect_base_delay_ms: 2000,
            reconnect_max_delay_ms: 30_000,
            backoff: Backoff::Linear,
            chunk_interval_ms: 500,
            audio_bits_per_second: 128_000,
            mime_type: "audio/webm;codecs=opus".to_string(),
        }
    }
}

impl ClientConfig {
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            max_attempts: self.max_reconnect_attempts,
            base_delay: Duration::from_millis(self.reconnect_base_delay_ms),
            max_delay: Duration::from_millis(self.reconnect_max_delay_ms),
            backoff: self.backoff,
        }
    }

    pub fn chunk_interval(&self) -> Duration {
        Duration::from_millis(self.chunk_interval_ms)
    }
}

impl Config {
    /// Load configuration: defaults, then the optional file at `path`, then
    /// `AUDIO_RELAY_*` environment variables, then `PORT`.
    pub fn load(path: &str) -> Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("AUDIO_RELAY")
                    .prefix_separator("_")
                    .separator("__"),
            );

        if let Ok(port) = std::env::var("PORT") {
            let port: u16 = port
                .parse()
                .with_context(|| format!("Invalid PORT value: {}", port))?;
            builder = builder.set_override("server.port", i64::from(port))?;
        }

        let settings = builder.build().context("Failed to build configuration")?;

        Ok(settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?)
    }
}
