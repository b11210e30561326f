//! Server replies: a three-digit code plus one or more text lines.

use std::fmt;

use crate::error::{Error, Result};

/// One complete reply, continuation lines included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Three-digit status.
    pub code: ReplyCode,
    /// Text after the code, one entry per line.
    pub message: Vec<String>,
}

impl Reply {
    /// Builds a reply from its parts.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn new(code: ReplyCode, message: Vec<String>) -> Self {
        Self { code, message }
    }

    /// Whether the code's decimal form starts with `prefix`.
    ///
    /// `"25"` accepts 250 and 251; `"235"` only 235.
    #[must_use]
    pub fn matches(&self, prefix: &str) -> bool {
        self.code.to_string().starts_with(prefix)
    }

    /// Text lines joined with `\n`, for error reports.
    #[must_use]
    pub fn message_text(&self) -> String {
        self.message.join("\n")
    }
}

/// Three-digit status of a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ReplyCode(u16);

impl ReplyCode {
    /// Wraps a raw status.
    #[must_use]
    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    /// The raw status.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }
}

impl fmt::Display for ReplyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03}", self.0)
    }
}

/// Assembles a reply from the lines read for it.
///
/// Every line carries the same code; all but the last have `-` in the
/// fourth column (`250-first`, `250 last`).
pub fn parse_reply(lines: &[String]) -> Result<Reply> {
    let Some(first) = lines.first() else {
        return Err(Error::Protocol("no reply lines".into()));
    };

    let digits = first
        .get(..3)
        .filter(|d| d.bytes().all(|b| b.is_ascii_digit()))
        .ok_or_else(|| Error::Protocol(format!("reply without a status code: {first}")))?;
    let code = digits
        .parse::<u16>()
        .map_err(|_| Error::Protocol(format!("reply without a status code: {first}")))?;

    let message = lines
        .iter()
        .map(|line| match line.len() {
            3 => Ok(String::new()),
            n if n > 3 => Ok(line.get(4..).unwrap_or_default().to_string()),
            _ => Err(Error::Protocol(format!("truncated reply line: {line}"))),
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Reply::new(ReplyCode::new(code), message))
}

/// Whether `line` ends its reply (a space or nothing after the code).
#[must_use]
pub fn is_last_reply_line(line: &str) -> bool {
    match line.as_bytes().get(3) {
        Some(&b) => b == b' ',
        None => line.len() == 3,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_line_reply() {
        let lines = vec!["250 OK".to_string()];
        let reply = parse_reply(&lines).unwrap();
        assert_eq!(reply.code.as_u16(), 250);
        assert_eq!(reply.message, vec!["OK"]);
        assert_eq!(reply.message_text(), "OK");
    }

    #[test]
    fn test_parse_multi_line_reply() {
        let lines = vec![
            "250-smtp.example.com".to_string(),
            "250-AUTH LOGIN PLAIN".to_string(),
            "250 8BITMIME".to_string(),
        ];
        let reply = parse_reply(&lines).unwrap();
        assert_eq!(reply.code.as_u16(), 250);
        assert_eq!(
            reply.message,
            vec!["smtp.example.com", "AUTH LOGIN PLAIN", "8BITMIME"]
        );
    }

    #[test]
    fn test_matches_prefix() {
        let reply = parse_reply(&["251 forwarding".to_string()]).unwrap();
        assert!(reply.matches("25"));
        assert!(reply.matches("251"));
        assert!(!reply.matches("250"));
        assert!(!reply.matches("354"));
    }

    #[test]
    fn test_is_last_reply_line() {
        assert!(is_last_reply_line("250 OK"));
        assert!(!is_last_reply_line("250-Continuing"));
        assert!(is_last_reply_line("250"));
        assert!(!is_last_reply_line("25"));
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_reply(&[]).is_err());
        assert!(parse_reply(&["25".to_string()]).is_err());
        assert!(parse_reply(&["ABC OK".to_string()]).is_err());
    }

    #[test]
    fn test_code_display() {
        assert_eq!(ReplyCode::new(354).to_string(), "354");
    }
}
