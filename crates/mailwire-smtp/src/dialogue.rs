//! The submission dialogue.
//!
//! A submission is a fixed table of [`Step`]s: one optional write followed by
//! one reply read, checked against an expected code prefix. The sequencer
//! stops at the first unexpected reply, except for steps marked tolerant.
//!
//! ```text
//! greeting 220 → EHLO 250 → AUTH LOGIN 334 → user 334 → secret 235
//!   → MAIL FROM 250 → RCPT TO 25x (per recipient) → DATA 354
//!   → body 250 → QUIT 221 (tolerated)
//! ```

use std::collections::HashSet;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::stream::SmtpStream;

/// Default bound on the whole dialogue.
pub const DIALOGUE_TIMEOUT: Duration = Duration::from_secs(60);

/// Default bound on each reply.
pub const STEP_TIMEOUT: Duration = Duration::from_secs(30);

/// Hostname announced in `EHLO`.
const EHLO_HOSTNAME: &str = "localhost";

/// How an unexpected reply is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    /// [`Error::Auth`].
    Auth,
    /// [`Error::Rejected`].
    Send,
}

/// One write-then-read exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    /// Name used in logs and errors.
    pub label: &'static str,
    /// Bytes to write first, if any.
    pub send: Option<Vec<u8>>,
    /// Expected reply code prefix.
    pub expect: &'static str,
    /// Error class on an unexpected reply.
    pub failure: Failure,
    /// An unexpected reply or I/O error is logged, not returned.
    pub tolerant: bool,
    /// The written bytes are never logged.
    pub secret: bool,
}

impl Step {
    fn new(label: &'static str, send: Option<Vec<u8>>, expect: &'static str) -> Self {
        Self {
            label,
            send,
            expect,
            failure: Failure::Send,
            tolerant: false,
            secret: false,
        }
    }

    fn command(label: &'static str, line: &str, expect: &'static str) -> Self {
        Self::new(label, Some(format!("{line}\r\n").into_bytes()), expect)
    }

    const fn auth(mut self) -> Self {
        self.failure = Failure::Auth;
        self
    }

    const fn secret(mut self) -> Self {
        self.secret = true;
        self
    }

    const fn tolerant(mut self) -> Self {
        self.tolerant = true;
        self
    }

    fn describe(&self) -> String {
        match &self.send {
            None => String::new(),
            Some(_) if self.secret => "<redacted>".to_string(),
            Some(bytes) if self.label == "body" => format!("<{} bytes>", bytes.len()),
            Some(bytes) => String::from_utf8_lossy(bytes).trim_end().to_string(),
        }
    }
}

/// What to submit.
#[derive(Debug, Clone)]
pub struct Submission {
    /// Account id for `AUTH LOGIN`.
    pub username: String,
    /// Secret for `AUTH LOGIN`.
    pub password: String,
    /// Envelope sender.
    pub sender: String,
    /// Envelope recipients, primary first. Duplicates are removed.
    pub recipients: Vec<String>,
    /// Rendered message.
    pub message: Vec<u8>,
}

/// An ordered table of steps.
#[derive(Debug, Clone)]
pub struct Dialogue {
    steps: Vec<Step>,
    step_timeout: Duration,
    deadline: Duration,
}

impl Dialogue {
    /// Builds the submission dialogue for `submission`.
    #[must_use]
    pub fn submission(submission: &Submission) -> Self {
        let mut steps = vec![
            Step::new("greeting", None, "220"),
            Step::command("EHLO", &format!("EHLO {EHLO_HOSTNAME}"), "250"),
            Step::command("AUTH", "AUTH LOGIN", "334").auth(),
            Step::command("username", &STANDARD.encode(&submission.username), "334")
                .auth()
                .secret(),
            Step::command("password", &STANDARD.encode(&submission.password), "235")
                .auth()
                .secret(),
            Step::command("MAIL FROM", &format!("MAIL FROM:<{}>", submission.sender), "250"),
        ];

        for recipient in dedup_recipients(&submission.recipients) {
            steps.push(Step::command("RCPT TO", &format!("RCPT TO:<{recipient}>"), "25"));
        }

        steps.push(Step::command("DATA", "DATA", "354"));
        steps.push(Step::new("body", Some(encode_data(&submission.message)), "250"));
        steps.push(Step::command("QUIT", "QUIT", "221").tolerant());

        Self {
            steps,
            step_timeout: STEP_TIMEOUT,
            deadline: DIALOGUE_TIMEOUT,
        }
    }

    /// Overrides the per-step and whole-dialogue bounds.
    #[must_use]
    pub const fn with_timeouts(mut self, step_timeout: Duration, deadline: Duration) -> Self {
        self.step_timeout = step_timeout;
        self.deadline = deadline;
        self
    }

    /// The steps in order.
    #[must_use]
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Runs every step over `stream`, then closes it.
    ///
    /// The deadline covers the steps up to the last one that must succeed.
    /// The tolerant steps after it (`QUIT`) are bounded only by the step
    /// timeout, so a message the server has accepted is never reported as
    /// failed. The stream is shut down exactly once, whatever the outcome.
    ///
    /// # Errors
    ///
    /// Returns the error of the first non-tolerant step that fails, or
    /// [`Error::Timeout`] when the deadline passes.
    pub async fn run<S>(&self, stream: S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let (required, closing) = self.steps.split_at(self.required_len());
        let mut stream = SmtpStream::new(stream);

        let mut outcome = tokio::time::timeout(self.deadline, self.drive(&mut stream, required))
            .await
            .unwrap_or(Err(Error::Timeout(self.deadline)));
        if outcome.is_ok() {
            outcome = self.drive(&mut stream, closing).await;
        }

        stream.shutdown().await;
        outcome
    }

    /// Number of leading steps up to and including the last non-tolerant one.
    fn required_len(&self) -> usize {
        self.steps
            .iter()
            .rposition(|step| !step.tolerant)
            .map_or(0, |last| last + 1)
    }

    async fn drive<S>(&self, stream: &mut SmtpStream<S>, steps: &[Step]) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        for step in steps {
            match self.exchange(stream, step).await {
                Ok(()) => {}
                Err(e) if step.tolerant => {
                    warn!(step = step.label, error = %e, "SMTP step failed, ignoring");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    async fn exchange<S>(&self, stream: &mut SmtpStream<S>, step: &Step) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        if let Some(bytes) = &step.send {
            debug!(step = step.label, command = %step.describe(), "SMTP >");
            stream.write_all(bytes).await?;
        }

        let reply = stream.read_reply(self.step_timeout).await?;
        debug!(step = step.label, code = reply.code.as_u16(), "SMTP <");

        if reply.matches(step.expect) {
            return Ok(());
        }

        let code = reply.code.as_u16();
        let message = reply.message_text();
        Err(match step.failure {
            Failure::Auth => Error::Auth {
                step: step.label,
                code,
                message,
            },
            Failure::Send => Error::Rejected {
                step: step.label,
                code,
                message,
            },
        })
    }
}

/// Removes duplicate recipients, ignoring case and keeping first occurrences.
#[must_use]
pub fn dedup_recipients(recipients: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    recipients
        .iter()
        .map(|r| r.trim())
        .filter(|r| !r.is_empty() && seen.insert(r.to_ascii_lowercase()))
        .map(ToString::to_string)
        .collect()
}

/// Prepares a message for `DATA`.
///
/// Line endings become CRLF, lines starting with `.` are dot-stuffed and the
/// terminating `.` line is appended.
#[must_use]
pub fn encode_data(message: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(message.len() + message.len() / 64 + 5);
    let body = message.strip_suffix(b"\n").unwrap_or(message);

    if !body.is_empty() {
        for line in body.split(|&b| b == b'\n') {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            if line.first() == Some(&b'.') {
                out.push(b'.');
            }
            out.extend_from_slice(line);
            out.extend_from_slice(b"\r\n");
        }
    }

    out.extend_from_slice(b".\r\n");
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    fn submission(recipients: &[&str]) -> Submission {
        Submission {
            username: "ada@example.com".to_string(),
            password: "hunter2".to_string(),
            sender: "ada@example.com".to_string(),
            recipients: recipients.iter().map(ToString::to_string).collect(),
            message: b"Subject: hi\r\n\r\nHello\r\n".to_vec(),
        }
    }

    #[test]
    fn test_dedup_recipients() {
        let recipients = vec![
            "bob@example.com".to_string(),
            "carol@example.com".to_string(),
            "BOB@example.com".to_string(),
            " ".to_string(),
            "dave@example.com".to_string(),
        ];
        assert_eq!(
            dedup_recipients(&recipients),
            vec!["bob@example.com", "carol@example.com", "dave@example.com"]
        );
    }

    #[test]
    fn test_encode_data_normalizes_and_stuffs() {
        assert_eq!(
            encode_data(b"a\nb\r\n.hidden\r\n..two"),
            b"a\r\nb\r\n..hidden\r\n...two\r\n.\r\n".to_vec()
        );
        assert_eq!(encode_data(b"line\r\n"), b"line\r\n.\r\n".to_vec());
        assert_eq!(encode_data(b""), b".\r\n".to_vec());
    }

    #[test]
    fn test_submission_table() {
        let dialogue = Dialogue::submission(&submission(&["bob@example.com", "Bob@Example.com", "eve@example.com"]));
        let labels: Vec<&str> = dialogue.steps().iter().map(|s| s.label).collect();
        assert_eq!(
            labels,
            vec![
                "greeting", "EHLO", "AUTH", "username", "password", "MAIL FROM", "RCPT TO",
                "RCPT TO", "DATA", "body", "QUIT"
            ]
        );

        let steps = dialogue.steps();
        assert_eq!(steps[3].send.as_deref(), Some(&b"YWRhQGV4YW1wbGUuY29t\r\n"[..]));
        assert_eq!(steps[4].failure, Failure::Auth);
        assert_eq!(steps[4].expect, "235");
        assert_eq!(steps[6].expect, "25");
        assert!(steps[10].tolerant);
        assert!(!steps[9].tolerant);
    }

    #[test]
    fn test_secrets_are_redacted() {
        let dialogue = Dialogue::submission(&submission(&["bob@example.com"]));
        let steps = dialogue.steps();
        assert_eq!(steps[3].describe(), "<redacted>");
        assert_eq!(steps[4].describe(), "<redacted>");
        assert_eq!(steps[5].describe(), "MAIL FROM:<ada@example.com>");
        assert!(steps[8].describe().ends_with("bytes>"));
    }
}
