//! One IMAP session over one connection.
//!
//! A [`Session`] owns its stream for its whole life. Commands are strictly
//! sequential: each is tagged, written, and read back until its tagged
//! completion line. There is no pipelining.

#![allow(clippy::missing_errors_doc)]

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, warn};

use crate::command::{Command, FetchAttribute, SearchCriteria, TagGenerator, uid_set};
use crate::connection::{FramedStream, ReadPolicy, ResponseAccumulator};
use crate::message::Message;
use crate::parser::{
    self, BodyPart, BodyText, Completion, FetchRecord, decode_text, parse_fetch_responses,
};
use crate::{Error, Result};

/// Character cap for summary previews.
pub const PREVIEW_LIMIT: usize = 300;

/// Character cap for full bodies.
pub const FULL_BODY_LIMIT: usize = 50_000;

/// Bytes requested for a preview fetch.
const PREVIEW_BYTES: u32 = 2048;

/// Sequence range holding the last `count` messages of a mailbox of `total`.
///
/// Returns `None` when there is nothing to fetch.
#[must_use]
pub fn recent_range(total: u32, count: u32) -> Option<(u32, u32)> {
    if total == 0 || count == 0 {
        return None;
    }
    Some((total - count.min(total) + 1, total))
}

/// An IMAP session.
pub struct Session<S> {
    stream: FramedStream<S>,
    tags: TagGenerator,
    standard: ReadPolicy,
    large: ReadPolicy,
}

impl<S> std::fmt::Debug for Session<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("tags", &self.tags)
            .field("standard", &self.standard)
            .field("large", &self.large)
            .finish_non_exhaustive()
    }
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps a connected stream and reads the server greeting.
    ///
    /// `* OK` and `* PREAUTH` are accepted; `* BYE` fails with [`Error::Bye`].
    pub async fn from_stream(stream: S) -> Result<Self> {
        let mut session = Self {
            stream: FramedStream::new(stream),
            tags: TagGenerator::default(),
            standard: ReadPolicy::standard(),
            large: ReadPolicy::large(),
        };
        session.read_greeting().await?;
        Ok(session)
    }

    /// Replaces the read policies.
    #[must_use]
    pub fn with_timeouts(mut self, standard: ReadPolicy, large: ReadPolicy) -> Self {
        self.standard = standard;
        self.large = large;
        self
    }

    async fn read_greeting(&mut self) -> Result<()> {
        let timeout = self.standard.timeout;
        let greeting = tokio::time::timeout(timeout, self.stream.read_response())
            .await
            .map_err(|_| Error::Timeout(timeout))??;

        let text = String::from_utf8_lossy(&greeting);
        let mut words = text.split_whitespace();
        if words.next() != Some("*") {
            return Err(Error::Protocol(format!("unexpected greeting: {}", text.trim())));
        }
        match words.next().map(str::to_ascii_uppercase).as_deref() {
            Some("OK" | "PREAUTH") => {
                debug!(greeting = %text.trim(), "IMAP greeting");
                Ok(())
            }
            Some("BYE") => Err(Error::Bye(words.collect::<Vec<_>>().join(" "))),
            _ => Err(Error::Protocol(format!("unexpected greeting: {}", text.trim()))),
        }
    }

    /// Sends `command` and reads until its completion.
    ///
    /// Returns every response line, the tagged one last. NO and BAD
    /// completions become [`Error::No`] and [`Error::Bad`].
    async fn execute(&mut self, command: &Command, policy: ReadPolicy) -> Result<Vec<Vec<u8>>> {
        let tag = self.tags.next_tag();
        debug!(tag = %tag, command = %command.redacted(), "IMAP command");

        self.stream.write_command(&command.serialize(&tag)).await?;
        let responses = ResponseAccumulator::new(tag.as_str())
            .read_until_tagged(&mut self.stream, policy)
            .await?;

        let completion = responses.last().and_then(|line| parser::parse_completion(line));
        match completion {
            Some(Completion::Ok(_)) => Ok(responses),
            Some(Completion::No(text)) => Err(Error::No(text)),
            Some(Completion::Bad(text)) => Err(Error::Bad(text)),
            None => match parser::find_bye(&responses) {
                Some(text) => Err(Error::Bye(text)),
                None => Err(Error::Protocol(format!("no completion status for {tag}"))),
            },
        }
    }

    /// Logs in with `LOGIN`.
    ///
    /// A NO or BAD completion is reported as [`Error::Auth`].
    pub async fn login(&mut self, username: &str, password: &str) -> Result<()> {
        let command = Command::Login {
            username: username.to_string(),
            password: password.to_string(),
        };
        match self.execute(&command, self.standard).await {
            Ok(_) => Ok(()),
            Err(Error::No(text) | Error::Bad(text)) => Err(Error::Auth(text)),
            Err(e) => Err(e),
        }
    }

    /// Selects `mailbox` and returns its message count.
    pub async fn select(&mut self, mailbox: &str) -> Result<u32> {
        let command = Command::Select {
            mailbox: mailbox.to_string(),
        };
        let responses = self.execute(&command, self.standard).await?;
        let total = responses
            .iter()
            .filter_map(|line| parser::parse_exists(line))
            .last()
            .unwrap_or(0);
        debug!(mailbox, total, "mailbox selected");
        Ok(total)
    }

    /// Fetches previews of the last `count` messages, newest first.
    pub async fn fetch_recent(&mut self, total: u32, count: u32) -> Result<Vec<Message>> {
        let Some((start, end)) = recent_range(total, count) else {
            return Ok(Vec::new());
        };

        let command = Command::Fetch {
            sequence: format!("{start}:{end}"),
            items: summary_items(),
        };
        let responses = self.execute(&command, self.standard).await?;
        let mut records = parse_fetch_responses(&responses);
        records.sort_by(|a, b| b.seq.cmp(&a.seq));

        self.complete(records, false).await
    }

    /// Fetches messages by UID, in the order given.
    ///
    /// With `full` the bodies are fetched whole under the large read policy;
    /// otherwise they are previews. UIDs the server does not return are
    /// skipped.
    pub async fn fetch_uids(&mut self, uids: &[u32], full: bool) -> Result<Vec<Message>> {
        if uids.is_empty() {
            return Ok(Vec::new());
        }

        let command = Command::UidFetch {
            uids: uid_set(uids),
            items: summary_items(),
        };
        let responses = self.execute(&command, self.standard).await?;
        let mut records = parse_fetch_responses(&responses);

        let mut ordered = Vec::with_capacity(uids.len());
        for uid in uids {
            if let Some(index) = records.iter().position(|r| r.uid == Some(*uid)) {
                ordered.push(records.swap_remove(index));
            } else {
                debug!(uid, "UID not returned by server");
            }
        }

        self.complete(ordered, full).await
    }

    /// Runs `UID SEARCH` and returns the matching UIDs.
    pub async fn search(&mut self, criteria: SearchCriteria) -> Result<Vec<u32>> {
        let command = Command::UidSearch { criteria };
        let responses = self.execute(&command, self.standard).await?;
        Ok(parser::parse_search(&responses))
    }

    /// Fetches the part tree of one message.
    pub async fn fetch_structure(&mut self, uid: u32) -> Result<Option<BodyPart>> {
        let command = Command::UidFetch {
            uids: uid.to_string(),
            items: vec![FetchAttribute::Uid, FetchAttribute::BodyStructure],
        };
        let responses = self.execute(&command, self.standard).await?;
        Ok(parse_fetch_responses(&responses)
            .into_iter()
            .find(|r| r.uid == Some(uid))
            .and_then(|r| r.structure))
    }

    /// Fetches the raw, still-encoded content of one part.
    pub async fn fetch_part(&mut self, uid: u32, locator: &str) -> Result<Vec<u8>> {
        let command = Command::UidFetch {
            uids: uid.to_string(),
            items: vec![
                FetchAttribute::Uid,
                FetchAttribute::Section {
                    section: locator.to_string(),
                    partial: None,
                },
            ],
        };
        let responses = self.execute(&command, self.large).await?;
        parse_fetch_responses(&responses)
            .into_iter()
            .find(|r| r.uid == Some(uid))
            .and_then(|record| section_data(&record, locator))
            .ok_or_else(|| Error::Protocol(format!("part {locator} of UID {uid} not returned")))
    }

    /// Sends `LOGOUT` and closes the stream. Failures are logged and ignored.
    pub async fn logout(mut self) {
        if let Err(e) = self.execute(&Command::Logout, self.standard).await {
            warn!(error = %e, "LOGOUT failed");
        }
        self.stream.shutdown().await;
    }

    /// Turns parsed records into messages, fetching one body per record.
    async fn complete(&mut self, records: Vec<FetchRecord>, full: bool) -> Result<Vec<Message>> {
        let mut messages = Vec::with_capacity(records.len());
        for record in records {
            let Some(uid) = record.uid else { continue };
            let body = self.fetch_body(uid, record.structure.as_ref(), full).await?;
            messages.push(assemble(&record, uid, body));
        }
        Ok(messages)
    }

    /// Fetches and decodes the readable body of one message.
    ///
    /// A NO or BAD from the server leaves the body empty. Transport errors
    /// propagate.
    async fn fetch_body(&mut self, uid: u32, structure: Option<&BodyPart>, full: bool) -> Result<BodyText> {
        let part = structure.and_then(BodyPart::text_part);
        let section = part.map_or("TEXT", |p| p.locator.as_str()).to_string();
        let encoding = part.map_or("7bit", |p| p.encoding.as_str()).to_string();
        let html = part.is_some_and(|p| p.media_type == "text/html");

        let (partial, policy, limit) = if full {
            (None, self.large, FULL_BODY_LIMIT)
        } else {
            (Some((0, PREVIEW_BYTES)), self.standard, PREVIEW_LIMIT)
        };

        let command = Command::UidFetch {
            uids: uid.to_string(),
            items: vec![
                FetchAttribute::Uid,
                FetchAttribute::Section {
                    section: section.clone(),
                    partial,
                },
            ],
        };

        let responses = match self.execute(&command, policy).await {
            Ok(responses) => responses,
            Err(e @ (Error::No(_) | Error::Bad(_))) => {
                warn!(uid, section = %section, error = %e, "body fetch refused");
                return Ok(BodyText::default());
            }
            Err(e) => return Err(e),
        };

        let raw = parse_fetch_responses(&responses)
            .into_iter()
            .find(|r| r.uid == Some(uid))
            .and_then(|record| section_data(&record, &section))
            .unwrap_or_default();

        let cut_short = !full
            && part.map_or(raw.len() >= PREVIEW_BYTES as usize, |p| {
                p.size as usize > raw.len()
            });
        let mut body = decode_text(&raw, &encoding, cut_short, html, limit);
        body.truncated |= cut_short;
        Ok(body)
    }
}

fn summary_items() -> Vec<FetchAttribute> {
    vec![
        FetchAttribute::Uid,
        FetchAttribute::Envelope,
        FetchAttribute::BodyStructure,
        FetchAttribute::thread_headers(),
    ]
}

/// Content of the section named `name`, else of the first section with data.
fn section_data(record: &FetchRecord, name: &str) -> Option<Vec<u8>> {
    record
        .sections
        .iter()
        .find(|s| s.name.eq_ignore_ascii_case(name) && s.data.is_some())
        .or_else(|| record.sections.iter().find(|s| s.data.is_some()))
        .and_then(|s| s.data.clone())
}

fn assemble(record: &FetchRecord, uid: u32, body: BodyText) -> Message {
    let envelope = record.envelope.clone().unwrap_or_default();
    let headers = record.thread_headers();

    let message_id = headers
        .message_id
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| Message::synthetic_id(uid));
    let thread_id = Message::thread_root(
        &message_id,
        headers.in_reply_to.as_deref(),
        headers.references.as_deref(),
    );

    Message {
        uid,
        message_id,
        thread_id,
        in_reply_to: headers.in_reply_to,
        references: headers.references,
        from: envelope.from,
        subject: envelope.subject,
        date: envelope.date,
        body: body.text,
        truncated: body.truncated,
        attachments: record
            .structure
            .as_ref()
            .map(BodyPart::attachments)
            .unwrap_or_default(),
    }
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
    use tokio_test::io::Builder;

    #[test]
    fn test_recent_range() {
        assert_eq!(recent_range(12, 5), Some((8, 12)));
        assert_eq!(recent_range(3, 20), Some((1, 3)));
        assert_eq!(recent_range(0, 20), None);
        assert_eq!(recent_range(5, 0), None);
    }

    #[tokio::test]
    async fn test_greeting_bye() {
        let mock = Builder::new().read(b"* BYE too many connections\r\n").build();
        let err = Session::from_stream(mock).await.unwrap_err();
        assert!(matches!(err, Error::Bye(text) if text == "too many connections"));
    }

    #[tokio::test]
    async fn test_login_rejected() {
        let mock = Builder::new()
            .read(b"* OK IMAP4rev1 ready\r\n")
            .write(b"A0000 LOGIN \"ada\" \"wrong\"\r\n")
            .read(b"A0000 NO [AUTHENTICATIONFAILED] Invalid credentials\r\n")
            .build();

        let mut session = Session::from_stream(mock).await.unwrap();
        let err = session.login("ada", "wrong").await.unwrap_err();
        assert!(matches!(err, Error::Auth(text) if text.contains("Invalid credentials")));
    }

    #[tokio::test]
    async fn test_select_reports_exists() {
        let mock = Builder::new()
            .read(b"* PREAUTH ready\r\n")
            .write(b"A0000 SELECT \"INBOX\"\r\n")
            .read(b"* FLAGS (\\Seen)\r\n* 0 EXISTS\r\n* 172 EXISTS\r\n* OK [UIDVALIDITY 1]\r\n")
            .read(b"A0000 OK [READ-WRITE] SELECT completed\r\n")
            .build();

        let mut session = Session::from_stream(mock).await.unwrap();
        assert_eq!(session.select("INBOX").await.unwrap(), 172);
    }

    #[tokio::test]
    async fn test_search_no_is_error() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"A0000 UID SEARCH TEXT \"x\"\r\n")
            .read(b"A0000 BAD unsupported\r\n")
            .build();

        let mut session = Session::from_stream(mock).await.unwrap();
        let err = session
            .search(SearchCriteria::new().text("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Bad(_)));
    }

    #[tokio::test]
    async fn test_fetch_part_with_literal() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"A0000 UID FETCH 7 (UID BODY.PEEK[2])\r\n")
            .read(b"* 3 FETCH (UID 7 BODY[2] {23}\r\nA0000 OK fake\r\nSGVsbG8=)\r\n")
            .read(b"A0000 OK FETCH completed\r\n")
            .build();

        let mut session = Session::from_stream(mock).await.unwrap();
        let raw = session.fetch_part(7, "2").await.unwrap();
        assert_eq!(raw, b"A0000 OK fake\r\nSGVsbG8=");
    }

    #[tokio::test]
    async fn test_logout_tolerates_failure() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"A0000 LOGOUT\r\n")
            .read(b"A0000 BAD whatever\r\n")
            .build();

        let session = Session::from_stream(mock).await.unwrap();
        session.logout().await;
    }

    #[test]
    fn test_assemble_synthetic_id() {
        let record = FetchRecord {
            seq: 1,
            uid: Some(9),
            ..FetchRecord::default()
        };
        let message = assemble(&record, 9, BodyText::default());
        assert_eq!(message.message_id, "<uid-9@mailwire.invalid>");
        assert_eq!(message.thread_id, message.message_id);
        assert!(message.attachments.is_empty());
    }
}
