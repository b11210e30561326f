//! # mailwire-core
//!
//! The mail engine behind mailwire.
//!
//! This crate provides:
//! - Server configuration and engine tuning
//! - Summary, full, search and thread retrieval over IMAP
//! - Attachment download and decoding
//! - Submission of new messages, replies and forwards over SMTP
//! - A mailbox cache persisted across restarts
//! - A background sync loop with new-mail notification
//!
//! Every operation opens its own connection through a [`Connector`] and
//! closes it before returning.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod attachments;
pub mod cache;
pub mod config;
pub mod connector;
mod engine;
mod error;
pub mod request;

pub use attachments::DownloadedAttachment;
pub use cache::{Cache, CacheSnapshot, CacheStore, NewMessageHandler};
pub use config::{EngineOptions, ServerConfig};
pub use connector::{Connector, TlsConnector};
pub use engine::{MailEngine, SUMMARY_LIMIT};
pub use error::{Error, Result};
pub use request::{ForwardMail, ForwardedMessage, OutgoingMail, ReplyMail, SEARCH_LIMIT, SearchQuery};

pub use mailwire_imap::{Attachment, Message};
pub use mailwire_mime::Attachment as OutgoingAttachment;
