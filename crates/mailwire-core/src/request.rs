//! Request types for engine operations.

use std::fmt::Write;

use chrono::NaiveDate;
use mailwire_imap::Message;
use mailwire_imap::command::SearchCriteria;
use mailwire_mime::{Attachment, Mailbox, OutgoingMessage, Threading, forward_subject, reply_subject};

/// Most results a search or thread lookup returns.
pub const SEARCH_LIMIT: usize = 50;

/// Search parameters. At least one criterion or a folder is required.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchQuery {
    /// Full-text match.
    pub text: Option<String>,
    /// Sender match.
    pub sender: Option<String>,
    /// Received on or after this day.
    pub since: Option<NaiveDate>,
    /// Received before this day.
    pub before: Option<NaiveDate>,
    /// Mailbox to search; the engine's mailbox when absent.
    pub folder: Option<String>,
    /// Result cap; zero means the maximum.
    pub limit: usize,
}

impl SearchQuery {
    /// Full-text search.
    #[must_use]
    pub fn text(query: impl Into<String>) -> Self {
        Self {
            text: Some(query.into()),
            ..Self::default()
        }
    }

    /// Restricts to a sender.
    #[must_use]
    pub fn sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    /// Restricts to a date window.
    #[must_use]
    pub const fn between(mut self, since: Option<NaiveDate>, before: Option<NaiveDate>) -> Self {
        self.since = since;
        self.before = before;
        self
    }

    /// Searches `folder` instead of the default mailbox.
    #[must_use]
    pub fn folder(mut self, folder: impl Into<String>) -> Self {
        self.folder = Some(folder.into());
        self
    }

    /// Caps the result count.
    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Effective result cap.
    #[must_use]
    pub fn effective_limit(&self) -> usize {
        match self.limit {
            0 => SEARCH_LIMIT,
            n => n.min(SEARCH_LIMIT),
        }
    }

    /// Search criteria, or `None` if nothing but a folder was given.
    #[must_use]
    pub fn criteria(&self) -> Option<SearchCriteria> {
        let mut criteria = SearchCriteria::new();
        if let Some(text) = self.text.as_deref().filter(|t| !t.trim().is_empty()) {
            criteria = criteria.text(text.trim());
        }
        if let Some(sender) = self.sender.as_deref().filter(|s| !s.trim().is_empty()) {
            criteria = criteria.from(sender.trim());
        }
        if let Some(since) = self.since {
            criteria = criteria.since(&imap_date(since));
        }
        if let Some(before) = self.before {
            criteria = criteria.before(&imap_date(before));
        }
        (!criteria.is_empty()).then_some(criteria)
    }
}

/// Formats a day as an IMAP search date (`1-Feb-2025`).
fn imap_date(date: NaiveDate) -> String {
    date.format("%-d-%b-%Y").to_string()
}

/// Criteria matching every message that names `id` as itself, its parent or
/// an ancestor.
pub(crate) fn thread_criteria(id: &str) -> SearchCriteria {
    SearchCriteria::new().or(
        SearchCriteria::new().header("Message-ID", id),
        SearchCriteria::new().or(
            SearchCriteria::new().header("In-Reply-To", id),
            SearchCriteria::new().header("References", id),
        ),
    )
}

/// Wraps a bare identifier in angle brackets.
pub(crate) fn bracketed(id: &str) -> String {
    let id = id.trim();
    if id.starts_with('<') && id.ends_with('>') {
        id.to_string()
    } else {
        format!("<{}>", id.trim_matches(|c| c == '<' || c == '>'))
    }
}

/// A new message.
#[derive(Debug, Clone, Default)]
pub struct OutgoingMail {
    /// Primary recipients.
    pub to: Vec<String>,
    /// Carbon-copy recipients.
    pub cc: Vec<String>,
    /// Blind-copy recipients.
    pub bcc: Vec<String>,
    /// Subject line.
    pub subject: String,
    /// Plain text body.
    pub body: String,
    /// Attachments.
    pub attachments: Vec<Attachment>,
}

impl OutgoingMail {
    pub(crate) fn compose(self, from: Mailbox) -> OutgoingMessage {
        let mut message = OutgoingMessage::new(from, self.subject, self.body);
        message.to = self.to;
        message.cc = self.cc;
        message.bcc = self.bcc;
        message.attachments = self.attachments;
        message
    }
}

/// A reply to an existing message.
#[derive(Debug, Clone, Default)]
pub struct ReplyMail {
    /// Primary recipients.
    pub to: Vec<String>,
    /// Carbon-copy recipients.
    pub cc: Vec<String>,
    /// Subject of the parent; gains a single `Re: ` prefix.
    pub subject: String,
    /// Plain text body.
    pub body: String,
    /// Parent `Message-ID`.
    pub in_reply_to: String,
    /// Parent `References` chain, if it had one.
    pub references: Option<String>,
    /// Attachments.
    pub attachments: Vec<Attachment>,
}

impl ReplyMail {
    pub(crate) fn compose(self, from: Mailbox) -> OutgoingMessage {
        let threading = Threading::reply_to(&self.in_reply_to, self.references.as_deref());
        let mut message = OutgoingMessage::new(from, reply_subject(&self.subject), self.body)
            .threading(threading);
        message.to = self.to;
        message.cc = self.cc;
        message.attachments = self.attachments;
        message
    }
}

/// Header summary of a forwarded message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForwardedMessage {
    /// Original sender.
    pub from: String,
    /// Original date.
    pub date: String,
    /// Original subject.
    pub subject: String,
    /// Original body text.
    pub body: String,
}

impl From<&Message> for ForwardedMessage {
    fn from(message: &Message) -> Self {
        Self {
            from: message.from.clone(),
            date: message.date.clone(),
            subject: message.subject.clone(),
            body: message.body.clone(),
        }
    }
}

/// A forward of an existing message.
#[derive(Debug, Clone, Default)]
pub struct ForwardMail {
    /// Primary recipients.
    pub to: Vec<String>,
    /// Carbon-copy recipients.
    pub cc: Vec<String>,
    /// Text placed above the forwarded message.
    pub note: String,
    /// The message being forwarded.
    pub original: ForwardedMessage,
    /// Attachments, usually those of the original.
    pub attachments: Vec<Attachment>,
}

impl ForwardMail {
    pub(crate) fn compose(self, from: Mailbox) -> OutgoingMessage {
        let body = forward_body(&self.note, &self.original);
        let mut message = OutgoingMessage::new(from, forward_subject(&self.original.subject), body);
        message.to = self.to;
        message.cc = self.cc;
        message.attachments = self.attachments;
        message
    }
}

/// Body of a forward: the note, a separator block with the original
/// headers, then the original text.
#[must_use]
pub fn forward_body(note: &str, original: &ForwardedMessage) -> String {
    let mut body = String::new();
    let note = note.trim_end();
    if !note.is_empty() {
        body.push_str(note);
        body.push_str("\n\n");
    }
    body.push_str("---------- Forwarded message ----------\n");
    let _ = writeln!(body, "From: {}", original.from);
    let _ = writeln!(body, "Date: {}", original.date);
    let _ = write!(body, "Subject: {}\n\n", original.subject);
    body.push_str(&original.body);
    body
}
