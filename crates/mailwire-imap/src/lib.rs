//! # mailwire-imap
//!
//! The retrieval side of the mailwire engine: a small IMAP client that
//! speaks just enough of RFC 3501 to log in, select a mailbox, search it and
//! fetch message summaries, full bodies and individual MIME parts.
//!
//! ## Features
//!
//! - **Tagged command/response correlation**: monotonically increasing tags
//!   (`A0000`, `A0001`, ...) with reads that stop at the matching tagged line
//! - **Literal-aware framing**: `{n}` literals are consumed verbatim, so
//!   message bodies may contain anything, including lines that look tagged
//! - **Tolerant parsing**: structured FETCH parsing with a raw fallback, and
//!   a recursive-descent BODYSTRUCTURE parser that assigns part locators
//! - **TLS via rustls**: implicit TLS only, no OpenSSL dependency
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailwire_imap::{Session, connection};
//!
//! #[tokio::main]
//! async fn main() -> mailwire_imap::Result<()> {
//!     let stream = connection::connect_tls("imap.example.com", 993, connection::CONNECT_TIMEOUT).await?;
//!     let mut session = Session::from_stream(stream).await?;
//!     session.login("user@example.com", "password").await?;
//!
//!     let total = session.select("INBOX").await?;
//!     let summaries = session.fetch_recent(total, 10).await?;
//!     for message in &summaries {
//!         println!("{} {}", message.uid, message.subject);
//!     }
//!
//!     session.logout().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`command`]: command serialization and tag generation
//! - [`connection`]: TLS connection setup and framed I/O
//! - [`parser`]: lexer and FETCH response parsing

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod connection;
pub mod parser;

mod error;
mod message;
mod session;

pub use error::{Error, Result};
pub use message::{Attachment, Message};
pub use session::{FULL_BODY_LIMIT, PREVIEW_LIMIT, Session, recent_range};
