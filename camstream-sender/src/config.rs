//! Configuration for the sender.

use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use camstream_core::pipeline::TestPatternConfig;
use camstream_core::{EncodingConfig, LinkConfig};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SenderConfig {
    /// Receiver address and link tunables.
    pub network: NetworkConfig,
    /// Frame source settings.
    pub camera: TestPatternConfig,
    /// JPEG qualities.
    pub encoding: EncodingConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Receiver host name or IP address.
    pub host: String,
    /// Receiver TCP port.
    pub port: u16,
    /// Connect as soon as the sender starts instead of waiting for `connect`.
    pub connect_on_start: bool,
    pub connect_timeout_ms: u64,
    pub write_timeout_ms: u64,
    pub close_timeout_ms: u64,
    /// Encoded messages allowed to wait for the writer.
    pub outbox_capacity: usize,
    /// Seconds between pipeline statistics log lines. 0 disables them.
    pub stats_interval_secs: u64,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        let link = LinkConfig::default();
        Self {
            host: "127.0.0.1".into(),
            port: 12345,
            connect_on_start: false,
            connect_timeout_ms: link.connect_timeout_ms,
            write_timeout_ms: link.write_timeout_ms,
            close_timeout_ms: link.close_timeout_ms,
            outbox_capacity: link.outbox_capacity,
            stats_interval_secs: 10,
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

impl SenderConfig {
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

    /// Write the default configuration to a file (for bootstrapping).
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        let text = toml::to_string_pretty(&Self::default()).map_err(std::io::Error::other)?;
        std::fs::write(path, text)
    }

    /// Link tunables for the connection manager. Timeouts of zero are
    /// raised to one millisecond.
    pub fn to_link_config(&self) -> LinkConfig {
        LinkConfig {
            connect_timeout_ms: self.network.connect_timeout_ms.max(1),
            write_timeout_ms: self.network.write_timeout_ms.max(1),
            close_timeout_ms: self.network.close_timeout_ms.max(1),
            outbox_capacity: self.network.outbox_capacity.max(1),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let text = toml::to_string_pretty(&SenderConfig::default()).unwrap();
        assert!(text.contains("port = 12345"));
        assert!(text.contains("stream_quality = 80"));
        assert!(text.contains("capture_quality = 90"));
    }

    #[test]
    fn roundtrip_config() {
        let text = toml::to_string_pretty(&SenderConfig::default()).unwrap();
        let parsed: SenderConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.network.port, 12345);
        assert_eq!(parsed.camera.width, 640);
        assert_eq!(parsed.camera.fps, 30);
        assert_eq!(parsed.encoding, EncodingConfig::default());
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let parsed: SenderConfig = toml::from_str(
            r#"
            [network]
            host = "10.0.0.7"

            [encoding]
            capture_quality = 150
            "#,
        )
        .unwrap();
        assert_eq!(parsed.network.host, "10.0.0.7");
        assert_eq!(parsed.network.port, 12345);
        assert_eq!(parsed.encoding.stream_quality.get(), 80);
        assert_eq!(parsed.encoding.capture_quality.get(), 100, "quality is clamped");
    }

    #[test]
    fn to_link_config_floors_zeroes() {
        let mut cfg = SenderConfig::default();
        cfg.network.outbox_capacity = 0;
        cfg.network.write_timeout_ms = 0;
        let link = cfg.to_link_config();
        assert_eq!(link.outbox_capacity, 1);
        assert_eq!(link.write_timeout_ms, 1);
        assert_eq!(link.connect_timeout_ms, 5_000);
    }

    fn scratch_path(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("camstream-sender-{tag}-{}.toml", std::process::id()))
    }

    #[test]
    fn load_missing_file_uses_defaults() {
        let path = Path::new("/nonexistent/camstream-sender.toml");
        assert!(matches!(SenderConfig::load(path), Err(ConfigError::Missing(_))));

        let (cfg, err) = SenderConfig::load_or_default(path);
        assert_eq!(cfg.network.port, 12345);
        assert!(err.unwrap().to_string().starts_with("no config at"));
    }

    #[test]
    fn invalid_file_reports_parse_error() {
        let path = scratch_path("invalid");
        std::fs::write(&path, "[network]\nport = \"not a number\"\n").unwrap();
        let (cfg, err) = SenderConfig::load_or_default(&path);
        let _ = std::fs::remove_file(&path);

        assert_eq!(cfg.network.port, 12345);
        assert!(matches!(err, Some(ConfigError::Parse { .. })));
    }

    #[test]
    fn write_default_then_load() {
        let path = scratch_path("default");
        SenderConfig::write_default(&path).unwrap();
        let cfg = SenderConfig::load(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(cfg.camera.height, 480);
    }
}
