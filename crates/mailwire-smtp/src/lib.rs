//! # mailwire-smtp
//!
//! The submission side of the mailwire engine: a table-driven SMTP dialogue
//! that authenticates with `AUTH LOGIN` and delivers one message.
//!
//! The crate does not open connections. The caller hands [`Dialogue::run`] a
//! connected (normally TLS) stream; the dialogue owns it from then on and
//! closes it when done.
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailwire_smtp::{Dialogue, Submission};
//!
//! async fn deliver(stream: impl tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin) -> mailwire_smtp::Result<()> {
//!     let submission = Submission {
//!         username: "user@example.com".into(),
//!         password: "password".into(),
//!         sender: "user@example.com".into(),
//!         recipients: vec!["friend@example.com".into()],
//!         message: b"Subject: Test\r\n\r\nHello, World!\r\n".to_vec(),
//!     };
//!     Dialogue::submission(&submission).run(stream).await
//! }
//! ```
//!
//! ## Modules
//!
//! - [`dialogue`]: the step table and its sequencer
//! - [`reply`]: reply parsing
//! - [`stream`]: line-oriented reads and writes

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod dialogue;
mod error;
pub mod reply;
pub mod stream;

pub use dialogue::{DIALOGUE_TIMEOUT, Dialogue, STEP_TIMEOUT, Step, Submission};
pub use error::{Error, Result};
pub use reply::{Reply, ReplyCode};
