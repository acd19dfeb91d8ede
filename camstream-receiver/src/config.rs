//! Receiver configuration.

use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use camstream_core::DEFAULT_MAX_PAYLOAD;

/// Top-level configuration for the receiver.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    /// Listening socket.
    pub network: NetworkConfig,
    /// Where received images go.
    pub output: OutputConfig,
    /// Logging.
    pub logging: LoggingConfig,
}

/// Listening socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address to bind.
    pub bind: String,
    pub port: u16,
    /// Largest accepted payload in bytes. Bigger messages end the session.
    pub max_payload: usize,
}

/// Image output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory for captured stills and the latest video frame.
    pub dir: PathBuf,
    /// Keep the most recent video frame as `latest.jpg`.
    pub save_latest: bool,
    /// Seconds between throughput log lines.
    pub stats_interval_secs: u64,
}

/// Logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level.
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 12345,
            max_payload: DEFAULT_MAX_PAYLOAD,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("captures"),
            save_latest: true,
            stats_interval_secs: 5,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

/// Why a config file could not be used.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no config at {}", .0.display())]
    Missing(PathBuf),

    #[error("cannot read config {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl ReceiverConfig {
    /// Load from a TOML file.
    ///
    /// Nothing is logged here: this runs before the subscriber exists.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                ConfigError::Missing(path.to_path_buf())
            } else {
                ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// [`load`](Self::load), falling back to defaults. The error, if any,
    /// is handed back for logging once tracing is up.
    pub fn load_or_default(path: &Path) -> (Self, Option<ConfigError>) {
        match Self::load(path) {
            Ok(config) => (config, None),
            Err(e) => (Self::default(), Some(e)),
        }
    }

    /// Write default config to a file.
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        let text = toml::to_string_pretty(&Self::default()).map_err(std::io::Error::other)?;
        std::fs::write(path, text)
    }

    /// `bind:port` for the listener.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.network.bind, self.network.port)
    }
}

// ── Tests ────────────────────────────────────────────────────────
