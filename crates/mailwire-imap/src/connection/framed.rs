//! Line and literal framing for a retrieval session.
//!
//! A server response is a CRLF line that may end in a `{n}` marker, in which
//! case exactly `n` raw bytes follow before the line continues. Those bytes
//! are passed through untouched, so a CRLF or a tagged-looking line inside
//! them never ends the response.

#![allow(clippy::missing_errors_doc)]

use std::io;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::{Error, Result};

const READ_CAPACITY: usize = 16 * 1024;

/// Longest line accepted outside a literal.
const LINE_LIMIT: usize = 1024 * 1024;

/// Largest single literal accepted.
const LITERAL_LIMIT: usize = 100 * 1024 * 1024;

/// Time and size budget for reading one command's responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadPolicy {
    /// Bound on the wait for the tagged completion line.
    pub timeout: Duration,
    /// Bound on the total bytes accumulated for the command.
    pub max_bytes: usize,
}

impl ReadPolicy {
    /// Budget for ordinary commands.
    #[must_use]
    pub const fn standard() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_bytes: 8 * 1024 * 1024,
        }
    }

    /// Budget for full-body and attachment fetches.
    #[must_use]
    pub const fn large() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            max_bytes: LITERAL_LIMIT,
        }
    }

    /// Replaces the timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for ReadPolicy {
    fn default() -> Self {
        Self::standard()
    }
}

/// Buffered stream that yields whole responses, literals included.
pub struct FramedStream<S> {
    reader: BufReader<S>,
    outgoing: BytesMut,
}

impl<S> FramedStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps `stream`.
    pub fn new(stream: S) -> Self {
        Self {
            reader: BufReader::with_capacity(READ_CAPACITY, stream),
            outgoing: BytesMut::with_capacity(READ_CAPACITY),
        }
    }

    /// Reads one response: a line plus any literals it announces.
    pub async fn read_response(&mut self) -> Result<Vec<u8>> {
        let mut response = Vec::new();

        loop {
            let line = self.read_line().await?;
            response.extend_from_slice(&line);

            let Some(size) = literal_size(&line) else {
                return Ok(response);
            };
            if size > LITERAL_LIMIT {
                return Err(Error::Protocol(format!(
                    "announced literal of {size} bytes exceeds {LITERAL_LIMIT}"
                )));
            }
            let start = response.len();
            response.resize(start + size, 0);
            self.reader
                .read_exact(&mut response[start..])
                .await
                .map_err(Error::Read)?;
        }
    }

    async fn read_line(&mut self) -> Result<Vec<u8>> {
        let mut line = Vec::new();

        loop {
            let buf = self.reader.fill_buf().await.map_err(Error::Read)?;
            if buf.is_empty() {
                return Err(Error::Read(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed",
                )));
            }

            // A CR at the end of the previous chunk pairs with an LF here
            if line.last() == Some(&b'\r') && buf[0] == b'\n' {
                line.push(b'\n');
                self.reader.consume(1);
                break;
            }

            if let Some(at) = find_crlf(buf) {
                let end = at + 2;
                line.extend_from_slice(&buf[..end]);
                self.reader.consume(end);
                break;
            }

            let taken = buf.len();
            line.extend_from_slice(buf);
            self.reader.consume(taken);

            if line.len() > LINE_LIMIT {
                return Err(Error::Protocol(format!("line exceeds {LINE_LIMIT} bytes")));
            }
        }

        Ok(line)
    }

    /// Sends one serialized command and flushes it.
    pub async fn write_command(&mut self, command: &[u8]) -> Result<()> {
        self.outgoing.clear();
        self.outgoing.extend_from_slice(command);

        let inner = self.reader.get_mut();
        inner.write_all(&self.outgoing).await.map_err(Error::Write)?;
        inner.flush().await.map_err(Error::Write)
    }

    /// Shuts down the write half, ignoring errors.
    pub async fn shutdown(&mut self) {
        let _ = self.reader.get_mut().shutdown().await;
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

/// Size announced by a trailing `{n}` or `{n+}` marker.
fn literal_size(line: &[u8]) -> Option<usize> {
    let line = line.strip_suffix(b"\r\n")?;
    let brace = line.iter().rposition(|&b| b == b'{')?;
    let inner = line.get(brace + 1..)?.strip_suffix(b"}")?;
    let digits = inner.strip_suffix(b"+").unwrap_or(inner);

    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(digits).ok()?.parse().ok()
}

/// Returns true if `response` is the completion line for `tag`.
fn is_tagged(response: &[u8], tag: &str) -> bool {
    response
        .get(..tag.len())
        .is_some_and(|prefix| prefix == tag.as_bytes())
        && response.get(tag.len()).is_some_and(|&b| b == b' ')
}

/// Collects the responses to one tagged command.
pub struct ResponseAccumulator {
    tag: String,
    responses: Vec<Vec<u8>>,
    total: usize,
}

impl ResponseAccumulator {
    /// Collector for the command tagged `tag`.
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            responses: Vec::new(),
            total: 0,
        }
    }

    /// Reads until the completion line for the tag arrives.
    ///
    /// The whole exchange is bounded by `policy`. The tagged line is the last
    /// element of the returned vector.
    pub async fn read_until_tagged<S>(
        &mut self,
        framed: &mut FramedStream<S>,
        policy: ReadPolicy,
    ) -> Result<Vec<Vec<u8>>>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        tokio::time::timeout(policy.timeout, self.accumulate(framed, policy.max_bytes))
            .await
            .map_err(|_| Error::Timeout(policy.timeout))??;

        Ok(std::mem::take(&mut self.responses))
    }

    async fn accumulate<S>(&mut self, framed: &mut FramedStream<S>, max_bytes: usize) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        loop {
            let response = framed.read_response().await?;
            self.total += response.len();
            if self.total > max_bytes {
                return Err(Error::ResponseTooLarge(max_bytes));
            }

            let done = is_tagged(&response, &self.tag);
            self.responses.push(response);

            if done {
                return Ok(());
            }
        }
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
    fn test_find_crlf() {
        assert_eq!(find_crlf(b"hello\r\n"), Some(5));
        assert_eq!(find_crlf(b"\r\n"), Some(0));
        assert_eq!(find_crlf(b"no newline"), None);
        assert_eq!(find_crlf(b"just\n"), None);
        assert_eq!(find_crlf(b"just\r"), None);
    }

    #[test]
    fn test_literal_size() {
        assert_eq!(literal_size(b"BODY {123}\r\n"), Some(123));
        assert_eq!(literal_size(b"BODY {123+}\r\n"), Some(123));
        assert_eq!(literal_size(b"{0}\r\n"), Some(0));
        assert_eq!(literal_size(b"{999999}\r\n"), Some(999_999));
        assert_eq!(literal_size(b"no literal\r\n"), None);
        assert_eq!(literal_size(b"incomplete {123"), None);
        assert_eq!(literal_size(b"wrong {abc}\r\n"), None);
        assert_eq!(literal_size(b"empty {}\r\n"), None);
    }

    #[test]
    fn test_is_tagged() {
        assert!(is_tagged(b"A0001 OK done\r\n", "A0001"));
        assert!(!is_tagged(b"A00011 OK done\r\n", "A0001"));
        assert!(!is_tagged(b"* OK done\r\n", "A0001"));
    }

    #[tokio::test]
    async fn test_framed_read_simple_line() {
        let mock = Builder::new().read(b"* OK ready\r\n").build();
        let mut framed = FramedStream::new(mock);

        let response = framed.read_response().await.unwrap();
        assert_eq!(response, b"* OK ready\r\n");
    }

    #[tokio::test]
    async fn test_framed_read_with_literal() {
        let mock = Builder::new()
            .read(b"* 1 FETCH (BODY {5}\r\n")
            .read(b"hello)\r\n")
            .build();
        let mut framed = FramedStream::new(mock);

        let response = framed.read_response().await.unwrap();
        assert_eq!(response, b"* 1 FETCH (BODY {5}\r\nhello)\r\n");
    }

    #[tokio::test]
    async fn test_crlf_split_across_reads() {
        let mock = Builder::new().read(b"* OK ready\r").read(b"\n").build();
        let mut framed = FramedStream::new(mock);

        let response = framed.read_response().await.unwrap();
        assert_eq!(response, b"* OK ready\r\n");
    }

    #[tokio::test]
    async fn test_framed_write_command() {
        let mock = Builder::new().write(b"A0001 SELECT INBOX\r\n").build();
        let mut framed = FramedStream::new(mock);

        framed.write_command(b"A0001 SELECT INBOX\r\n").await.unwrap();
    }

    #[tokio::test]
    async fn test_response_accumulator() {
        let mock = Builder::new()
            .read(b"* 3 EXISTS\r\n")
            .read(b"* OK [UIDVALIDITY 1] ok\r\n")
            .read(b"A0001 OK Success\r\n")
            .build();

        let mut framed = FramedStream::new(mock);
        let mut accumulator = ResponseAccumulator::new("A0001");

        let responses = accumulator
            .read_until_tagged(&mut framed, ReadPolicy::standard())
            .await
            .unwrap();

        assert_eq!(responses.len(), 3);
        assert_eq!(responses[0], b"* 3 EXISTS\r\n");
        assert_eq!(responses[2], b"A0001 OK Success\r\n");
    }

    #[tokio::test]
    async fn test_literal_containing_tagged_line_is_not_terminal() {
        let body = b"first line\r\nA0002 OK fake\r\nlast";
        let header = format!("* 1 FETCH (UID 9 BODY[1] {{{}}}\r\n", body.len());
        let mock = Builder::new()
            .read(header.as_bytes())
            .read(body)
            .read(b")\r\n")
            .read(b"A0002 OK FETCH completed\r\n")
            .build();

        let mut framed = FramedStream::new(mock);
        let mut accumulator = ResponseAccumulator::new("A0002");
        let responses = accumulator
            .read_until_tagged(&mut framed, ReadPolicy::large())
            .await
            .unwrap();

        assert_eq!(responses.len(), 2);
        assert!(responses[0].ends_with(b"last)\r\n"));
        assert_eq!(responses[1], b"A0002 OK FETCH completed\r\n");
    }

    #[tokio::test]
    async fn test_response_budget_enforced() {
        let mock = Builder::new()
            .read(b"* 1 FETCH (BODY {20}\r\n")
            .read(b"01234567890123456789")
            .read(b")\r\n")
            .build();

        let mut framed = FramedStream::new(mock);
        let mut accumulator = ResponseAccumulator::new("A0001");
        let policy = ReadPolicy {
            timeout: Duration::from_secs(5),
            max_bytes: 16,
        };

        let result = accumulator.read_until_tagged(&mut framed, policy).await;
        assert!(matches!(result, Err(Error::ResponseTooLarge(16))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_timeout() {
        let mock = Builder::new()
            .read(b"* 1 EXISTS\r\n")
            .wait(Duration::from_secs(60))
            .build();

        let mut framed = FramedStream::new(mock);
        let mut accumulator = ResponseAccumulator::new("A0001");
        let policy = ReadPolicy::standard().with_timeout(Duration::from_secs(1));

        let result = accumulator.read_until_tagged(&mut framed, policy).await;
        assert!(matches!(result, Err(Error::Timeout(_))));
    }

    #[tokio::test]
    async fn test_eof_is_read_error() {
        let mock = Builder::new().read(b"* OK partial").build();
        let mut framed = FramedStream::new(mock);

        let result = framed.read_response().await;
        assert!(matches!(result, Err(Error::Read(_))));
    }

    #[tokio::test]
    async fn test_literal_size_validation() {
        let oversized = LITERAL_LIMIT + 1;
        let header = format!("* 1 FETCH (BODY {{{oversized}}}\r\n");

        let mock = Builder::new().read(header.as_bytes()).build();
        let mut framed = FramedStream::new(mock);

        let result = framed.read_response().await;
        let message = result.unwrap_err().to_string();
        assert!(message.contains(&oversized.to_string()));
    }

    #[tokio::test]
    async fn test_line_length_limit() {
        let long_line = "A".repeat(LINE_LIMIT + 100);
        let mock = Builder::new().read(long_line.as_bytes()).build();
        let mut framed = FramedStream::new(mock);

        let result = framed.read_response().await;
        assert!(result.unwrap_err().to_string().contains("line exceeds"));
    }
}
