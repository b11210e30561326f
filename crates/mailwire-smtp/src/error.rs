//! Error types for SMTP submission.

use std::io;
use std::time::Duration;

/// Result type alias for SMTP operations.
pub type Result<T> = std::result::Result<T, Error>;

/// SMTP error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Reading a reply failed.
    #[error("Read failed: {0}")]
    Read(#[source] io::Error),

    /// Writing a command failed.
    #[error("Write failed: {0}")]
    Write(#[source] io::Error),

    /// A step or the whole dialogue ran out of time.
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// The server rejected the credentials.
    #[error("Authentication failed at {step}: {code} {message}")]
    Auth {
        /// Dialogue step label.
        step: &'static str,
        /// Reply code.
        code: u16,
        /// Reply text.
        message: String,
    },

    /// The server rejected a step of the transaction.
    #[error("SMTP error at {step}: {code} {message}")]
    Rejected {
        /// Dialogue step label.
        step: &'static str,
        /// Reply code.
        code: u16,
        /// Reply text.
        message: String,
    },

    /// Protocol error (malformed reply).
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl Error {
    /// Returns true if this is a permanent rejection (5xx).
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(
            self,
            Self::Auth { code, .. } | Self::Rejected { code, .. } if *code >= 500 && *code < 600
        )
    }

    /// Returns true if this is a transient rejection (4xx).
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Auth { code, .. } | Self::Rejected { code, .. } if *code >= 400 && *code < 500
        )
    }
}
