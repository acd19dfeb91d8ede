//! Connection state machine owned by the connection manager.
//!
//! Provides a `ConnectionPhase` enum that models the lifecycle of the
//! single outbound connection, with validated transitions that return
//! `Result` instead of panicking.

use std::net::SocketAddr;
use std::time::Instant;

use crate::error::StreamError;

// ── ConnectionPhase ──────────────────────────────────────────────

/// The current phase of the outbound connection.
///
/// ```text
///  Idle ──► Connecting ──► Connected ──► Disconnecting ──► Idle
///   ▲           │
///   └───────────┘  (connect failed / cancelled)
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionPhase {
    /// No connection. Initial and terminal state.
    #[default]
    Idle,

    /// TCP connect in flight.
    Connecting,

    /// Stream open; frames may be sent.
    Connected {
        /// Remote address of the peer.
        peer: SocketAddr,
        /// When the connection entered the `Connected` state.
        since: Instant,
    },

    /// Teardown in progress: draining, flushing and closing the stream.
    Disconnecting,
}

impl std::fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected { peer, .. } => write!(f, "Connected ({peer})"),
            Self::Disconnecting => write!(f, "Disconnecting"),
        }
    }
}

impl ConnectionPhase {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_connecting(&self) -> bool {
        matches!(self, Self::Connecting)
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    /// How long the connection has been up. `None` in any other phase.
    pub fn connected_duration(&self) -> Option<std::time::Duration> {
        match self {
            Self::Connected { since, .. } => Some(since.elapsed()),
            _ => None,
        }
    }

    // ── Transitions ──────────────────────────────────────────────

    /// Transition to `Connecting`.
    ///
    /// Valid from: `Idle`.
    pub fn begin_connect(&mut self) -> Result<(), StreamError> {
        match self {
            Self::Idle => {
                *self = Self::Connecting;
                Ok(())
            }
            _ => Err(StreamError::InvalidTransition(
                "cannot connect: not in Idle state",
            )),
        }
    }

    /// Transition to `Connected`.
    ///
    /// Valid from: `Connecting`.
    pub fn complete_connect(&mut self, peer: SocketAddr) -> Result<(), StreamError> {
        match self {
            Self::Connecting => {
                *self = Self::Connected {
                    peer,
                    since: Instant::now(),
                };
                Ok(())
            }
            _ => Err(StreamError::InvalidTransition(
                "cannot complete connect: not in Connecting state",
            )),
        }
    }

    /// Transition back to `Idle` after a failed or cancelled attempt.
    ///
    /// Valid from: `Connecting`.
    pub fn fail_connect(&mut self) -> Result<(), StreamError> {
        match self {
            Self::Connecting => {
                *self = Self::Idle;
                Ok(())
            }
            _ => Err(StreamError::InvalidTransition(
                "cannot fail connect: not in Connecting state",
            )),
        }
    }

    /// Transition to `Disconnecting`.
    ///
    /// Valid from: `Connected`.
    pub fn begin_disconnect(&mut self) -> Result<(), StreamError> {
        match self {
            Self::Connected { .. } => {
                *self = Self::Disconnecting;
                Ok(())
            }
            _ => Err(StreamError::InvalidTransition(
                "cannot disconnect: not in Connected state",
            )),
        }
    }

    /// Transition to `Idle`.
    ///
    /// Valid from: `Disconnecting`.
    pub fn finish_disconnect(&mut self) -> Result<(), StreamError> {
        match self {
            Self::Disconnecting => {
                *self = Self::Idle;
                Ok(())
            }
            _ => Err(StreamError::InvalidTransition(
                "cannot finish disconnect: not in Disconnecting state",
            )),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn peer() -> SocketAddr {
        "127.0.0.1:12345".parse().unwrap()
    }

    #[test]
    fn happy_path_lifecycle() {
        let mut phase = ConnectionPhase::Idle;

        phase.begin_connect().unwrap();
        assert_eq!(phase, ConnectionPhase::Connecting);

        phase.complete_connect(peer()).unwrap();
        assert!(phase.is_connected());
        assert!(phase.connected_duration().is_some());

        phase.begin_disconnect().unwrap();
        assert_eq!(phase, ConnectionPhase::Disconnecting);

        phase.finish_disconnect().unwrap();
        assert!(phase.is_idle());
    }

    #[test]
    fn connect_rejected_unless_idle() {
        let mut phase = ConnectionPhase::Connecting;
        assert!(phase.begin_connect().is_err());
        assert!(phase.is_connecting(), "rejection leaves phase untouched");

        let mut phase = ConnectionPhase::Connected {
            peer: peer(),
            since: Instant::now(),
        };
        assert!(phase.begin_connect().is_err());
        assert!(phase.is_connected());
    }

    #[test]
    fn failed_connect_returns_to_idle() {
        let mut phase = ConnectionPhase::Connecting;
        phase.fail_connect().unwrap();
        assert!(phase.is_idle());
    }

    #[test]
    fn disconnect_requires_connected() {
        let mut phase = ConnectionPhase::Idle;
        assert!(phase.begin_disconnect().is_err());
        assert!(phase.finish_disconnect().is_err());

        let mut phase = ConnectionPhase::Connecting;
        assert!(phase.begin_disconnect().is_err());
    }

    #[test]
    fn complete_connect_requires_connecting() {
        let mut phase = ConnectionPhase::Idle;
        assert!(phase.complete_connect(peer()).is_err());
    }

    #[test]
    fn display_format() {
        assert_eq!(ConnectionPhase::Idle.to_string(), "Idle");
        assert_eq!(ConnectionPhase::Connecting.to_string(), "Connecting");
        assert_eq!(
            ConnectionPhase::Connected {
                peer: peer(),
                since: Instant::now()
            }
            .to_string(),
            "Connected (127.0.0.1:12345)"
        );
        assert_eq!(ConnectionPhase::Disconnecting.to_string(), "Disconnecting");
    }

    #[test]
    fn default_phase_is_idle() {
        assert!(ConnectionPhase::default().is_idle());
    }
}
