//! Tunables for the link and the encoder.
//!
//! Both structs deserialize with `#[serde(default)]` so binaries can embed
//! them in their TOML files and only override what they need.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::pipeline::encoder::Quality;

/// Timeouts and queue depth for the outbound connection.
///
/// A hung peer never blocks forever: connect, each write+flush, and the
/// graceful close are all bounded, and expiry tears the connection down.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// TCP connect deadline in milliseconds.
    pub connect_timeout_ms: u64,
    /// Deadline for writing and flushing one message, in milliseconds.
    pub write_timeout_ms: u64,
    /// Deadline for draining and closing the stream on disconnect.
    pub close_timeout_ms: u64,
    /// Encoded messages that may wait for the writer before new ones are
    /// dropped. Frames pushed back to back faster than the writer drains
    /// them overflow this; a paced camera keeps it at one or zero.
    pub outbox_capacity: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5_000,
            write_timeout_ms: 5_000,
            close_timeout_ms: 2_000,
            outbox_capacity: 2,
        }
    }
}

impl LinkConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }
}

/// Encoder qualities for the two message kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodingConfig {
    /// Quality for continuously streamed video frames.
    pub stream_quality: Quality,
    /// Quality for single-shot captured stills.
    pub capture_quality: Quality,
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            stream_quality: Quality::STREAM,
            capture_quality: Quality::CAPTURE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let link = LinkConfig::default();
        assert_eq!(link.connect_timeout(), Duration::from_secs(5));
        assert_eq!(link.close_timeout(), Duration::from_secs(2));

        let enc = EncodingConfig::default();
        assert_eq!(enc.stream_quality.get(), 80);
        assert_eq!(enc.capture_quality.get(), 90);
    }
}
