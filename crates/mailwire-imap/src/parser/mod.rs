//! Response parsing.
//!
//! Parsing never fails a command: anything that cannot be interpreted is
//! logged and degraded to an empty value. Only framing errors (handled by
//! [`crate::connection`]) are fatal.

pub mod body;
pub mod envelope;
pub mod fetch;
pub mod headers;
pub mod lexer;
pub mod structure;
pub mod value;

pub use body::{BodyText, decode_text};
pub use envelope::Envelope;
pub use fetch::{FetchRecord, Section, parse_fetch_responses};
pub use headers::ThreadHeaders;
pub use structure::BodyPart;

use lexer::{Lexer, Token};

/// Completion status of a tagged response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// `OK`.
    Ok(String),
    /// `NO`.
    No(String),
    /// `BAD`.
    Bad(String),
}

/// Parses `TAG OK|NO|BAD text`.
#[must_use]
pub fn parse_completion(line: &[u8]) -> Option<Completion> {
    let mut lexer = Lexer::new(line);
    lexer.read_atom_string().ok()?;
    lexer.expect_space().ok()?;
    let status = lexer.read_atom_string().ok()?.to_ascii_uppercase();
    lexer.skip_spaces();
    let text = lexer.read_text_until_crlf();
    match status.as_str() {
        "OK" => Some(Completion::Ok(text)),
        "NO" => Some(Completion::No(text)),
        "BAD" => Some(Completion::Bad(text)),
        _ => None,
    }
}

/// Reads `N` from a `* N EXISTS` line.
#[must_use]
pub fn parse_exists(line: &[u8]) -> Option<u32> {
    let mut lexer = Lexer::new(line);
    lexer.expect(Token::Asterisk).ok()?;
    lexer.expect_space().ok()?;
    let count = lexer.read_number().ok()?;
    lexer.expect_space().ok()?;
    lexer
        .read_atom_string()
        .ok()
        .filter(|word| word.eq_ignore_ascii_case("EXISTS"))
        .map(|_| count)
}

/// Collects the numbers from `* SEARCH n n n` lines.
#[must_use]
pub fn parse_search(responses: &[Vec<u8>]) -> Vec<u32> {
    let mut ids = Vec::new();
    for response in responses {
        let text = String::from_utf8_lossy(response);
        let mut words = text.split_whitespace();
        if words.next() != Some("*") {
            continue;
        }
        if !words.next().is_some_and(|w| w.eq_ignore_ascii_case("SEARCH")) {
            continue;
        }
        ids.extend(words.filter_map(|w| w.parse::<u32>().ok()));
    }
    ids
}

/// Returns the text of an untagged `* BYE`, if present.
#[must_use]
pub fn find_bye(responses: &[Vec<u8>]) -> Option<String> {
    responses.iter().find_map(|response| {
        let text = String::from_utf8_lossy(response);
        let rest = text.strip_prefix("* ")?;
        let (word, message) = rest.split_once(' ').unwrap_or((rest.trim(), ""));
        word.eq_ignore_ascii_case("BYE")
            .then(|| message.trim().to_string())
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_completion() {
        assert_eq!(
            parse_completion(b"A0001 OK LOGIN completed\r\n"),
            Some(Completion::Ok("LOGIN completed".to_string()))
        );
        assert_eq!(
            parse_completion(b"A0002 NO [AUTHENTICATIONFAILED] Invalid credentials\r\n"),
            Some(Completion::No(
                "[AUTHENTICATIONFAILED] Invalid credentials".to_string()
            ))
        );
        assert_eq!(
            parse_completion(b"A0003 bad parse error\r\n"),
            Some(Completion::Bad("parse error".to_string()))
        );
        assert_eq!(parse_completion(b"A0004 PREAUTH\r\n"), None);
    }

    #[test]
    fn test_parse_exists() {
        assert_eq!(parse_exists(b"* 172 EXISTS\r\n"), Some(172));
        assert_eq!(parse_exists(b"* 1 RECENT\r\n"), None);
        assert_eq!(parse_exists(b"* OK [UIDVALIDITY 3857529045]\r\n"), None);
    }

    #[test]
    fn test_parse_search() {
        let responses = vec![
            b"* SEARCH 2 84 882\r\n".to_vec(),
            b"* SEARCH\r\n".to_vec(),
            b"A0005 OK SEARCH completed\r\n".to_vec(),
        ];
        assert_eq!(parse_search(&responses), vec![2, 84, 882]);
    }

    #[test]
    fn test_find_bye() {
        let responses = vec![b"* BYE Autologout; idle too long\r\n".to_vec()];
        assert_eq!(
            find_bye(&responses).as_deref(),
            Some("Autologout; idle too long")
        );
        assert_eq!(find_bye(&[b"* OK\r\n".to_vec()]), None);
    }
}
