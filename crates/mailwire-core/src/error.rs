//! Error types for the engine.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur in engine operations.
#[derive(Debug, Error)]
pub enum Error {
    /// No server configuration has been supplied.
    #[error("Mail server is not configured")]
    NotConfigured,

    /// The connection or TLS handshake failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The server rejected the credentials.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Writing to the server failed.
    #[error("Write failed: {0}")]
    WriteFailed(String),

    /// Reading from the server failed, or the server refused a command.
    #[error("Read failed: {0}")]
    ReadFailed(String),

    /// No response within the allowed window.
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// The submission server rejected the message.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// An attachment could not be retrieved.
    #[error("Attachment failed: {0}")]
    AttachmentFailed(String),

    /// The message has no part with that locator.
    #[error("Attachment {locator} not found in message {uid}")]
    AttachmentNotFound {
        /// Message UID.
        uid: u32,
        /// Requested part locator.
        locator: String,
    },

    /// The request cannot be served as given.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Reading or writing the local cache failed.
    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Storage(e.into())
    }
}

impl From<mailwire_imap::Error> for Error {
    fn from(e: mailwire_imap::Error) -> Self {
        use mailwire_imap::Error as Imap;

        match e {
            Imap::Connect(_) | Imap::Tls(_) | Imap::InvalidDnsName(_) => {
                Self::ConnectionFailed(e.to_string())
            }
            Imap::Auth(text) => Self::AuthenticationFailed(text),
            Imap::Write(_) => Self::WriteFailed(e.to_string()),
            Imap::Timeout(after) => Self::Timeout(after),
            Imap::Read(_)
            | Imap::Parse { .. }
            | Imap::No(_)
            | Imap::Bad(_)
            | Imap::Bye(_)
            | Imap::ResponseTooLarge(_)
            | Imap::Protocol(_) => Self::ReadFailed(e.to_string()),
        }
    }
}

impl From<mailwire_smtp::Error> for Error {
    fn from(e: mailwire_smtp::Error) -> Self {
        use mailwire_smtp::Error as Smtp;

        match e {
            Smtp::Read(_) => Self::ReadFailed(e.to_string()),
            Smtp::Write(_) => Self::WriteFailed(e.to_string()),
            Smtp::Timeout(after) => Self::Timeout(after),
            Smtp::Auth { .. } => Self::AuthenticationFailed(e.to_string()),
            Smtp::Rejected { .. } | Smtp::Protocol(_) => Self::SendFailed(e.to_string()),
        }
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
