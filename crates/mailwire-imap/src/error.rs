//! Error types for the IMAP session.

use std::time::Duration;

use thiserror::Error;

/// Failure of a retrieval session.
#[derive(Debug, Error)]
pub enum Error {
    /// The TCP connect failed or timed out.
    #[error("Connection failed: {0}")]
    Connect(#[source] std::io::Error),

    /// The TLS handshake failed.
    #[error("TLS error: {0}")]
    Tls(#[source] std::io::Error),

    /// The host is not a valid TLS server name.
    #[error("Invalid DNS name: {0}")]
    InvalidDnsName(#[from] rustls::pki_types::InvalidDnsNameError),

    /// Reading a response failed.
    #[error("Read failed: {0}")]
    Read(#[source] std::io::Error),

    /// Sending a command failed.
    #[error("Write failed: {0}")]
    Write(#[source] std::io::Error),

    /// No completion line within the read policy.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// The lexer rejected a response.
    #[error("Protocol error at position {position}: {message}")]
    Parse {
        /// Offset into the response.
        position: usize,
        /// What was expected.
        message: String,
    },

    /// LOGIN was not accepted.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// A command completed with NO.
    #[error("Server returned NO: {0}")]
    No(String),

    /// A command completed with BAD.
    #[error("Server returned BAD: {0}")]
    Bad(String),

    /// The server closed the session with BYE.
    #[error("Server sent BYE: {0}")]
    Bye(String),

    /// A response exceeded the read budget.
    #[error("Response exceeded {0} bytes")]
    ResponseTooLarge(usize),

    /// The server broke framing or sent something unusable.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl Error {
    /// Whether the stream itself failed, leaving the session unusable.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Connect(_) | Self::Tls(_) | Self::Read(_) | Self::Write(_) | Self::Timeout(_)
        )
    }
}

/// Session result.
pub type Result<T> = std::result::Result<T, Error>;
