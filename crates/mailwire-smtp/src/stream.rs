//! Line-oriented SMTP stream.
//!
//! The stream is generic so the dialogue can run over TLS in production and
//! over in-memory mocks in tests.

use std::io;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use crate::error::{Error, Result};
use crate::reply::{Reply, is_last_reply_line, parse_reply};

/// Longest reply line accepted.
const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Buffered SMTP stream.
#[derive(Debug)]
pub struct SmtpStream<S> {
    reader: BufReader<S>,
}

impl<S> SmtpStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps a connected stream.
    pub fn new(stream: S) -> Self {
        Self {
            reader: BufReader::new(stream),
        }
    }

    /// Reads a line without its line ending.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails or the peer closed the stream.
    pub async fn read_line(&mut self) -> Result<String> {
        let mut line = String::new();
        let read = self.reader.read_line(&mut line).await.map_err(Error::Read)?;
        if read == 0 {
            return Err(Error::Read(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed",
            )));
        }
        if line.len() > MAX_LINE_LENGTH {
            return Err(Error::Protocol(format!("reply line longer than {MAX_LINE_LENGTH} bytes")));
        }
        Ok(line.trim_end().to_string())
    }

    /// Reads a whole, possibly multi-line, reply within `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] if the reply does not complete in time.
    pub async fn read_reply(&mut self, timeout: Duration) -> Result<Reply> {
        tokio::time::timeout(timeout, self.read_reply_lines())
            .await
            .map_err(|_| Error::Timeout(timeout))?
    }

    async fn read_reply_lines(&mut self) -> Result<Reply> {
        let mut lines = Vec::new();
        loop {
            let line = self.read_line().await?;
            if line.is_empty() {
                continue;
            }

            let is_last = is_last_reply_line(&line);
            lines.push(line);

            if is_last {
                break;
            }
        }

        parse_reply(&lines)
    }

    /// Writes data to the stream and flushes it.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.reader.get_mut();
        stream.write_all(data).await.map_err(Error::Write)?;
        stream.flush().await.map_err(Error::Write)
    }

    /// Shuts down the write half, ignoring errors.
    pub async fn shutdown(&mut self) {
        let _ = self.reader.get_mut().shutdown().await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn test_read_multi_line_reply() {
        let mock = Builder::new()
            .read(b"250-smtp.example.com\r\n250-AUTH LOGIN\r\n")
            .read(b"250 SIZE 35882577\r\n")
            .build();
        let mut stream = SmtpStream::new(mock);

        let reply = stream.read_reply(Duration::from_secs(5)).await.unwrap();
        assert_eq!(reply.code.as_u16(), 250);
        assert_eq!(reply.message.len(), 3);
    }

    #[tokio::test]
    async fn test_eof_is_read_error() {
        let mock = Builder::new().read(b"250-partial\r\n").build();
        let mut stream = SmtpStream::new(mock);

        let err = stream.read_reply(Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, Error::Read(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reply_timeout() {
        let mock = Builder::new().wait(Duration::from_secs(60)).build();
        let mut stream = SmtpStream::new(mock);

        let err = stream.read_reply(Duration::from_secs(30)).await.unwrap_err();
        assert!(matches!(err, Error::Timeout(d) if d == Duration::from_secs(30)));
    }
}
