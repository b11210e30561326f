//! # mailwire-mime
//!
//! MIME composition and decoding helpers for the mailwire engine.
//!
//! ## Features
//!
//! - **Message composition**: plain text and `multipart/mixed` messages with
//!   base64 attachments, threading headers for replies
//! - **Transfer encodings**: Base64 (wrapped and lenient/partial decoding),
//!   Quoted-Printable, RFC 2047 encoded words
//! - **Media types**: extension lookup and magic-byte sniffing
//!
//! ## Quick Start
//!
//! ```
//! use mailwire_mime::{Attachment, Mailbox, OutgoingMessage};
//!
//! let message = OutgoingMessage::new(
//!     Mailbox::new(Some("Ada"), "ada@example.com"),
//!     "Report",
//!     "See attached.",
//! )
//! .to("grace@example.com")
//! .attach(Attachment::new("report.pdf", b"%PDF-1.7".to_vec()));
//!
//! let rendered = message.render();
//! assert!(rendered.contains("Content-Type: multipart/mixed"));
//! assert!(rendered.contains("application/pdf"));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod compose;
mod error;

pub mod encoding;
pub mod media_type;

pub use compose::{
    Attachment, Mailbox, OutgoingMessage, Threading, forward_subject, generate_boundary,
    generate_message_id, reply_subject,
};
pub use encoding::TransferEncoding;
pub use error::{Error, Result};
