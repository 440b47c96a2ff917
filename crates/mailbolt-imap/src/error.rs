//! Error types for the IMAP connection engine.
//!
//! Every failure mode of the connection lifecycle maps to one variant;
//! callers recover locally only from specific variants (an optional
//! STARTTLS refused by the server, a SASL failure with LOGIN fallback
//! enabled) and treat everything else as fatal for the connection.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur on an IMAP connection.
#[derive(Debug, Error)]
pub enum Error {
    /// `connect()` was called on a live connection.
    #[error("already connected")]
    AlreadyConnected,

    /// The server greeted us with BYE.
    #[error("connection refused by server greeting: {0}")]
    Greeting(String),

    /// A command was refused with a tagged BAD, or its exchange broke down.
    #[error("{command} failed: {text}")]
    Command {
        /// The command that was being executed (e.g. "STARTTLS", "LOGIN").
        command: String,
        /// The server's response text.
        text: String,
        /// Trailing bytes received before the failure, for diagnostics.
        log: String,
    },

    /// Authentication failed (LOGIN NO, SASL mechanisms exhausted, or no
    /// usable mechanism). Carries the accumulated server diagnostics.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The server response violated the IMAP grammar.
    #[error("parse error at byte {position}: {message}")]
    Parse {
        /// Offset into the received byte stream where parsing failed.
        position: usize,
        /// Description of what went wrong.
        message: String,
        /// Trailing bytes received before the failure, for diagnostics.
        log: String,
    },

    /// The transport closed mid-response.
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// The idle time-out fired; the connection must be discarded.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// I/O error during network operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TLS handshake or encryption error.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// Invalid DNS name for TLS.
    #[error("invalid DNS name: {0}")]
    InvalidDnsName(#[from] rustls::pki_types::InvalidDnsNameError),

    /// The operation is not valid in the connection's current state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Protocol violation or unexpected data.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A SASL mechanism failed outside the per-mechanism retry loop.
    #[error("SASL error: {0}")]
    Sasl(#[from] mailbolt_sasl::SaslError),
}

impl Error {
    /// True if this error means the connection is unusable.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Io(_)
                | Self::Tls(_)
                | Self::ConnectionLost(_)
                | Self::Timeout(_)
                | Self::Parse { .. }
                | Self::Greeting(_)
        )
    }
}

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_classification() {
        assert!(Error::ConnectionLost("eof".to_string()).is_fatal());
        assert!(Error::Timeout(Duration::from_secs(1)).is_fatal());
        assert!(!Error::AlreadyConnected.is_fatal());
        assert!(
            !Error::Command {
                command: "STARTTLS".to_string(),
                text: "not supported".to_string(),
                log: String::new(),
            }
            .is_fatal()
        );
    }

    #[test]
    fn display_includes_command() {
        let err = Error::Command {
            command: "LIST".to_string(),
            text: "bad response".to_string(),
            log: String::new(),
        };
        assert_eq!(err.to_string(), "LIST failed: bad response");
    }
}
