//! Outgoing message composition.

use std::fmt::{self, Write};

use chrono::{DateTime, FixedOffset, Local};

use crate::encoding::{BASE64_LINE_WIDTH, encode_base64_lines, encode_rfc2047};
use crate::media_type;

/// A sender or recipient with an optional display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mailbox {
    /// Display name.
    pub name: Option<String>,
    /// Email address (`local@domain`).
    pub address: String,
}

impl Mailbox {
    /// Creates a mailbox. Empty display names are dropped.
    #[must_use]
    pub fn new(name: Option<&str>, address: impl Into<String>) -> Self {
        Self {
            name: name
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(ToString::to_string),
            address: address.into(),
        }
    }

    /// Returns the domain part of the address, if any.
    #[must_use]
    pub fn domain(&self) -> Option<&str> {
        self.address
            .rsplit_once('@')
            .map(|(_, domain)| domain.trim_end_matches('>'))
            .filter(|d| !d.is_empty())
    }
}

impl fmt::Display for Mailbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) if name.is_ascii() => {
                let escaped = name.replace('\\', "\\\\").replace('"', "\\\"");
                write!(f, "\"{escaped}\" <{}>", self.address)
            }
            Some(name) => write!(f, "{} <{}>", encode_rfc2047(name), self.address),
            None => write!(f, "{}", self.address),
        }
    }
}

/// A file attached to an outgoing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Filename shown to the recipient.
    pub filename: String,
    /// Raw content.
    pub content: Vec<u8>,
    /// Media type; derived from the filename extension when absent.
    pub media_type: Option<String>,
}

impl Attachment {
    /// Creates an attachment typed by its filename extension.
    #[must_use]
    pub fn new(filename: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            content,
            media_type: None,
        }
    }

    /// Overrides the media type.
    #[must_use]
    pub fn with_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = Some(media_type.into());
        self
    }

    /// The effective media type.
    #[must_use]
    pub fn media_type(&self) -> &str {
        self.media_type
            .as_deref()
            .unwrap_or_else(|| media_type::from_extension(&self.filename))
    }
}

/// Threading headers for a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Threading {
    /// Parent message identifier, angle brackets included.
    pub in_reply_to: String,
    /// Ancestor chain including the parent.
    pub references: String,
}

impl Threading {
    /// Builds threading headers for a reply to `parent`, whose own
    /// References header was `chain`.
    #[must_use]
    pub fn reply_to(parent: &str, chain: Option<&str>) -> Self {
        let parent = parent.trim();
        let references = match chain.map(str::trim).filter(|c| !c.is_empty()) {
            Some(chain) => format!("{chain} {parent}"),
            None => parent.to_string(),
        };
        Self {
            in_reply_to: parent.to_string(),
            references,
        }
    }
}

/// Prefixes `Re: ` unless the subject already carries it.
#[must_use]
pub fn reply_subject(subject: &str) -> String {
    prefixed_subject("Re:", subject)
}

/// Prefixes `Fwd: ` unless the subject already carries it.
#[must_use]
pub fn forward_subject(subject: &str) -> String {
    prefixed_subject("Fwd:", subject)
}

fn prefixed_subject(prefix: &str, subject: &str) -> String {
    let trimmed = subject.trim();
    let already = trimmed
        .get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix));
    if already {
        trimmed.to_string()
    } else {
        format!("{prefix} {trimmed}")
    }
}

/// An email message ready to be rendered for submission.
#[derive(Debug, Clone)]
pub struct OutgoingMessage {
    /// Sender.
    pub from: Mailbox,
    /// Primary recipients.
    pub to: Vec<String>,
    /// Carbon-copy recipients.
    pub cc: Vec<String>,
    /// Blind-copy recipients; never rendered as a header.
    pub bcc: Vec<String>,
    /// Subject line.
    pub subject: String,
    /// Plain text body.
    pub body: String,
    /// Reply threading headers.
    pub threading: Option<Threading>,
    /// Attachments, rendered in order after the text part.
    pub attachments: Vec<Attachment>,
    /// Date header; the current local time when absent.
    pub date: Option<DateTime<FixedOffset>>,
    /// Message-ID header; generated from the sender's domain when absent.
    pub message_id: Option<String>,
}

impl OutgoingMessage {
    /// Creates a new outgoing message.
    #[must_use]
    pub fn new(from: Mailbox, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            from,
            to: Vec::new(),
            cc: Vec::new(),
            bcc: Vec::new(),
            subject: subject.into(),
            body: body.into(),
            threading: None,
            attachments: Vec::new(),
            date: None,
            message_id: None,
        }
    }

    /// Adds a recipient.
    #[must_use]
    pub fn to(mut self, recipient: impl Into<String>) -> Self {
        self.to.push(recipient.into());
        self
    }

    /// Adds a CC recipient.
    #[must_use]
    pub fn cc(mut self, recipient: impl Into<String>) -> Self {
        self.cc.push(recipient.into());
        self
    }

    /// Adds a BCC recipient.
    #[must_use]
    pub fn bcc(mut self, recipient: impl Into<String>) -> Self {
        self.bcc.push(recipient.into());
        self
    }

    /// Sets reply threading headers.
    #[must_use]
    pub fn threading(mut self, threading: Threading) -> Self {
        self.threading = Some(threading);
        self
    }

    /// Adds an attachment.
    #[must_use]
    pub fn attach(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Fixes the Date header.
    #[must_use]
    pub const fn with_date(mut self, date: DateTime<FixedOffset>) -> Self {
        self.date = Some(date);
        self
    }

    /// Fixes the Message-ID header.
    #[must_use]
    pub fn message_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = Some(id.into());
        self
    }

    /// All envelope recipients in to, cc, bcc order.
    #[must_use]
    pub fn envelope_recipients(&self) -> Vec<&str> {
        self.to
            .iter()
            .chain(&self.cc)
            .chain(&self.bcc)
            .map(String::as_str)
            .collect()
    }

    /// Renders the message with a random multipart boundary.
    #[must_use]
    pub fn render(&self) -> String {
        self.render_with_boundary(&generate_boundary())
    }

    /// Renders the message as RFC 5322 text with CRLF line endings.
    ///
    /// `boundary` is only used when the message has attachments.
    #[must_use]
    pub fn render_with_boundary(&self, boundary: &str) -> String {
        let mut out = String::new();

        let _ = write!(out, "From: {}\r\n", self.from);
        if !self.to.is_empty() {
            let _ = write!(out, "To: {}\r\n", self.to.join(", "));
        }
        if !self.cc.is_empty() {
            let _ = write!(out, "Cc: {}\r\n", self.cc.join(", "));
        }
        let _ = write!(out, "Subject: {}\r\n", encode_rfc2047(&self.subject));

        let date = self
            .date
            .unwrap_or_else(|| Local::now().fixed_offset())
            .to_rfc2822();
        let _ = write!(out, "Date: {date}\r\n");

        let message_id = self.message_id.clone().unwrap_or_else(|| {
            generate_message_id(self.from.domain().unwrap_or("localhost"))
        });
        let _ = write!(out, "Message-ID: {message_id}\r\n");

        if let Some(threading) = &self.threading {
            let _ = write!(out, "In-Reply-To: {}\r\n", threading.in_reply_to);
            let _ = write!(out, "References: {}\r\n", threading.references);
        }
        out.push_str("MIME-Version: 1.0\r\n");

        let body = normalize_crlf(&self.body);

        if self.attachments.is_empty() {
            out.push_str("Content-Type: text/plain; charset=utf-8\r\n");
            out.push_str("Content-Transfer-Encoding: 8bit\r\n");
            out.push_str("\r\n");
            out.push_str(&body);
            return out;
        }

        let _ = write!(
            out,
            "Content-Type: multipart/mixed; boundary=\"{boundary}\"\r\n"
        );
        out.push_str("\r\n");
        out.push_str("This is a multi-part message in MIME format.\r\n");

        let _ = write!(out, "\r\n--{boundary}\r\n");
        out.push_str("Content-Type: text/plain; charset=utf-8\r\n");
        out.push_str("Content-Transfer-Encoding: 8bit\r\n");
        out.push_str("\r\n");
        out.push_str(&body);

        for attachment in &self.attachments {
            let filename = header_filename(&attachment.filename);
            let _ = write!(out, "\r\n--{boundary}\r\n");
            let _ = write!(
                out,
                "Content-Type: {}; name=\"{filename}\"\r\n",
                attachment.media_type()
            );
            out.push_str("Content-Transfer-Encoding: base64\r\n");
            let _ = write!(
                out,
                "Content-Disposition: attachment; filename=\"{filename}\"\r\n"
            );
            out.push_str("\r\n");
            out.push_str(&encode_base64_lines(&attachment.content, BASE64_LINE_WIDTH));
        }

        let _ = write!(out, "\r\n--{boundary}--\r\n");
        out
    }
}

/// Converts bare `\n` and `\r` line endings to CRLF.
fn normalize_crlf(text: &str) -> String {
    let unified = text.replace("\r\n", "\n").replace('\r', "\n");
    unified.replace('\n', "\r\n")
}

fn header_filename(filename: &str) -> String {
    let cleaned: String = filename
        .chars()
        .filter(|c| *c != '"' && *c != '\\' && !c.is_control())
        .collect();
    encode_rfc2047(&cleaned)
}

/// Generates a random multipart boundary.
#[must_use]
pub fn generate_boundary() -> String {
    format!(
        "=_mailwire_{:016x}{:016x}",
        rand::random::<u64>(),
        rand::random::<u64>()
    )
}

/// Generates a random Message-ID for `domain`, angle brackets included.
#[must_use]
pub fn generate_message_id(domain: &str) -> String {
    format!(
        "<{:x}.{:016x}@{domain}>",
        chrono::Utc::now().timestamp_millis(),
        rand::random::<u64>()
    )
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use crate::encoding::decode_base64;

    fn fixed_date() -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc2822("Tue, 1 Jul 2025 10:52:37 +0200").unwrap()
    }

    fn sample() -> OutgoingMessage {
        OutgoingMessage::new(
            Mailbox::new(Some("Ada Lovelace"), "ada@example.com"),
            "Status",
            "Line one\nLine two",
        )
        .to("grace@example.com")
        .with_date(fixed_date())
        .message_id("<fixed@example.com>")
    }

    #[test]
    fn test_mailbox_display() {
        let mailbox = Mailbox::new(Some("Ada"), "ada@example.com");
        assert_eq!(mailbox.to_string(), "\"Ada\" <ada@example.com>");

        let bare = Mailbox::new(Some("  "), "ada@example.com");
        assert_eq!(bare.to_string(), "ada@example.com");

        let unicode = Mailbox::new(Some("Zoë"), "zoe@example.com");
        assert!(unicode.to_string().starts_with("=?utf-8?B?"));
        assert_eq!(unicode.domain(), Some("example.com"));
    }

    #[test]
    fn test_render_plain() {
        let rendered = sample().cc("linus@example.com").bcc("hidden@example.com").render();

        assert!(rendered.starts_with("From: \"Ada Lovelace\" <ada@example.com>\r\n"));
        assert!(rendered.contains("To: grace@example.com\r\n"));
        assert!(rendered.contains("Cc: linus@example.com\r\n"));
        assert!(!rendered.contains("hidden@example.com"));
        assert!(rendered.contains("Date: Tue, 1 Jul 2025 10:52:37 +0200\r\n"));
        assert!(rendered.contains("Message-ID: <fixed@example.com>\r\n"));
        assert!(rendered.contains("Content-Type: text/plain; charset=utf-8\r\n"));
        assert!(rendered.ends_with("\r\n\r\nLine one\r\nLine two"));
        assert!(!rendered.contains("In-Reply-To"));
    }

    #[test]
    fn test_render_non_ascii_subject() {
        let mut message = sample();
        message.subject = "Résumé".to_string();
        let rendered = message.render();
        assert!(rendered.contains("Subject: =?utf-8?B?"));
    }

    #[test]
    fn test_threading_headers() {
        let threading = Threading::reply_to("<m@x>", Some("<r1@x> <r2@x>"));
        assert_eq!(threading.in_reply_to, "<m@x>");
        assert_eq!(threading.references, "<r1@x> <r2@x> <m@x>");

        let first = Threading::reply_to("<m@x>", None);
        assert_eq!(first.references, "<m@x>");

        let rendered = sample().threading(threading).render();
        assert!(rendered.contains("In-Reply-To: <m@x>\r\n"));
        assert!(rendered.contains("References: <r1@x> <r2@x> <m@x>\r\n"));
    }

    #[test]
    fn test_subject_prefixes() {
        assert_eq!(reply_subject("Lunch"), "Re: Lunch");
        assert_eq!(reply_subject("Re: Lunch"), "Re: Lunch");
        assert_eq!(reply_subject("RE: Lunch"), "RE: Lunch");
        assert_eq!(forward_subject("Lunch"), "Fwd: Lunch");
        assert_eq!(forward_subject("fwd: Lunch"), "fwd: Lunch");
        assert_eq!(reply_subject(""), "Re: ");
    }

    #[test]
    fn test_render_with_attachment_round_trip() {
        let payload: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        let rendered = sample()
            .attach(Attachment::new("blob.bin", payload.clone()))
            .attach(Attachment::new("notes.txt", b"hi".to_vec()))
            .render_with_boundary("BOUNDARY");

        assert!(rendered.contains("Content-Type: multipart/mixed; boundary=\"BOUNDARY\"\r\n"));
        assert!(rendered.contains("Content-Type: application/octet-stream; name=\"blob.bin\""));
        assert!(rendered.contains("Content-Type: text/plain; name=\"notes.txt\""));
        assert!(rendered.ends_with("\r\n--BOUNDARY--\r\n"));

        let parts: Vec<&str> = rendered.split("\r\n--BOUNDARY").collect();
        // preamble, text, blob, notes, closing
        assert_eq!(parts.len(), 5);

        let blob = parts[2];
        let (_, encoded) = blob.split_once("\r\n\r\n").unwrap();
        for line in encoded.split("\r\n") {
            assert!(line.len() <= BASE64_LINE_WIDTH);
        }
        assert_eq!(decode_base64(encoded).unwrap(), payload);
    }

    #[test]
    fn test_attachment_media_type_override() {
        let attachment = Attachment::new("scan", vec![1, 2, 3]).with_media_type("image/png");
        assert_eq!(attachment.media_type(), "image/png");
        assert_eq!(Attachment::new("a.pdf", vec![]).media_type(), "application/pdf");
    }

    #[test]
    fn test_envelope_recipients_order() {
        let message = sample().cc("c@example.com").bcc("b@example.com");
        assert_eq!(
            message.envelope_recipients(),
            vec!["grace@example.com", "c@example.com", "b@example.com"]
        );
    }

    #[test]
    fn test_generated_ids_are_unique() {
        assert_ne!(generate_boundary(), generate_boundary());
        let id = generate_message_id("example.com");
        assert!(id.starts_with('<'));
        assert!(id.ends_with("@example.com>"));
    }
}
