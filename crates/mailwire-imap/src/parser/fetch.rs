//! FETCH response parsing.
//!
//! Each `* n FETCH (...)` response is parsed on its own. When the structured
//! parse fails, a raw fallback recovers what it can: the UID by pattern, the
//! envelope by the tolerant scanner and the threading headers by scanning
//! the response text.

use tracing::{debug, warn};

use super::envelope::{self, Envelope};
use super::headers::ThreadHeaders;
use super::lexer::{Lexer, Token};
use super::structure::BodyPart;
use super::value::{Value, parse_value};
use crate::Result;

/// A `BODY[section]<origin>` item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// Section specifier, e.g. `1.2` or `HEADER.FIELDS (MESSAGE-ID)`.
    pub name: String,
    /// Partial-fetch origin.
    pub origin: Option<u32>,
    /// Content; `None` for NIL.
    pub data: Option<Vec<u8>>,
}

/// Everything parsed from one FETCH response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchRecord {
    /// Message sequence number.
    pub seq: u32,
    /// UID, if returned.
    pub uid: Option<u32>,
    /// Envelope fields.
    pub envelope: Option<Envelope>,
    /// Part tree.
    pub structure: Option<BodyPart>,
    /// Body sections in response order.
    pub sections: Vec<Section>,
    /// Threading headers, set by the raw fallback.
    pub headers: Option<ThreadHeaders>,
}

impl FetchRecord {
    /// Returns the first section whose name starts with `prefix` (case-insensitive).
    #[must_use]
    pub fn section(&self, prefix: &str) -> Option<&Section> {
        self.sections.iter().find(|s| {
            s.name
                .get(..prefix.len())
                .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
        })
    }

    /// Threading headers from the header section or the raw fallback.
    #[must_use]
    pub fn thread_headers(&self) -> ThreadHeaders {
        if let Some(headers) = &self.headers {
            return headers.clone();
        }
        self.section("HEADER")
            .and_then(|s| s.data.as_deref())
            .map(|data| ThreadHeaders::parse(&String::from_utf8_lossy(data)))
            .unwrap_or_default()
    }
}

/// Parses every FETCH response in a command's output.
///
/// Non-FETCH lines are skipped. Responses whose structured parse fails go
/// through the raw fallback; responses yielding no UID are dropped.
#[must_use]
pub fn parse_fetch_responses(responses: &[Vec<u8>]) -> Vec<FetchRecord> {
    responses
        .iter()
        .filter(|r| is_fetch_response(r))
        .filter_map(|response| match parse_fetch(response) {
            Ok(record) if record.uid.is_some() => Some(record),
            Ok(_) => {
                debug!("FETCH response without UID dropped");
                None
            }
            Err(e) => {
                warn!(error = %e, "structured FETCH parse failed, using raw fallback");
                parse_fetch_raw(response)
            }
        })
        .collect()
}

fn is_fetch_response(response: &[u8]) -> bool {
    let line_end = response
        .iter()
        .position(|&b| b == b'(' || b == b'\r')
        .unwrap_or(response.len());
    let head = String::from_utf8_lossy(&response[..line_end]);
    let mut words = head.split_whitespace();
    words.next() == Some("*")
        && words.next().is_some_and(|n| n.parse::<u32>().is_ok())
        && words.next().is_some_and(|w| w.eq_ignore_ascii_case("FETCH"))
}

/// Parses one FETCH response.
pub fn parse_fetch(response: &[u8]) -> Result<FetchRecord> {
    let mut lexer = Lexer::new(response);
    lexer.expect(Token::Asterisk)?;
    lexer.expect_space()?;
    let seq = lexer.read_number()?;
    lexer.expect_space()?;
    let keyword = lexer.read_atom_string()?;
    if !keyword.eq_ignore_ascii_case("FETCH") {
        return Err(lexer.error(&format!("wanted FETCH, found {keyword}")));
    }
    lexer.expect_space()?;
    lexer.expect(Token::LParen)?;

    let mut record = FetchRecord {
        seq,
        ..FetchRecord::default()
    };

    loop {
        match lexer.next_token()? {
            Token::RParen => break,
            Token::Space => {}
            Token::Atom(name) => {
                let upper = name.to_ascii_uppercase();
                match upper.as_str() {
                    "UID" => {
                        lexer.expect_space()?;
                        record.uid = Some(lexer.read_number()?);
                    }
                    "ENVELOPE" => {
                        let value = parse_value(&mut lexer)?;
                        record.envelope = Envelope::from_value(&value);
                    }
                    "BODYSTRUCTURE" => {
                        let value = parse_value(&mut lexer)?;
                        record.structure = BodyPart::from_value(&value);
                        if record.structure.is_none() {
                            warn!(seq, "unrecognized BODYSTRUCTURE ignored");
                        }
                    }
                    "BODY" | "BODY.PEEK" | "RFC822" | "RFC822.HEADER" | "RFC822.TEXT" => {
                        let (section, origin) = parse_body_section_and_origin(&mut lexer);
                        let name = match upper.as_str() {
                            "RFC822.HEADER" => "HEADER".to_string(),
                            "RFC822.TEXT" => "TEXT".to_string(),
                            _ => section.unwrap_or_default(),
                        };
                        let data = match parse_value(&mut lexer)? {
                            Value::Bytes(data) => Some(data),
                            Value::Atom(text) => Some(text.into_bytes()),
                            _ => None,
                        };
                        record.sections.push(Section { name, origin, data });
                    }
                    _ => {
                        // FLAGS, RFC822.SIZE, INTERNALDATE, MODSEQ...
                        parse_value(&mut lexer)?;
                    }
                }
            }
            token => return Err(lexer.error(&format!("Unexpected token in FETCH: {token:?}"))),
        }
    }

    Ok(record)
}

/// Parses `[section]<origin>` directly after a BODY keyword.
fn parse_body_section_and_origin(lexer: &mut Lexer<'_>) -> (Option<String>, Option<u32>) {
    let mut section = None;
    let mut origin = None;

    if lexer.peek() == Some(b'[') {
        lexer.advance();
        let mut section_buf = String::new();
        while let Some(b) = lexer.advance() {
            if b == b']' {
                break;
            }
            section_buf.push(char::from(b));
        }
        section = Some(section_buf);
    }

    if lexer.peek() == Some(b'<') {
        lexer.advance();
        let mut origin_buf = String::new();
        while let Some(b) = lexer.peek() {
            lexer.advance();
            if b == b'>' {
                break;
            }
            origin_buf.push(char::from(b));
        }
        origin = origin_buf.parse().ok();
    }

    (section, origin)
}

/// Recovers a record from a response the structured parser rejected.
#[must_use]
pub fn parse_fetch_raw(response: &[u8]) -> Option<FetchRecord> {
    let text = String::from_utf8_lossy(response);
    let uid = find_number_after(&text, "UID ")?;
    let seq = text
        .strip_prefix("* ")
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|n| n.parse().ok())
        .unwrap_or(0);

    let envelope = find_case_insensitive(response, b"ENVELOPE (")
        .map(|pos| envelope::scan(&response[pos + "ENVELOPE ".len()..]));

    Some(FetchRecord {
        seq,
        uid: Some(uid),
        envelope,
        structure: None,
        sections: Vec::new(),
        headers: Some(raw_header_block(&text).map(ThreadHeaders::parse).unwrap_or_default()),
    })
}

/// Locates the header section content following `BODY[HEADER...]`.
fn raw_header_block(text: &str) -> Option<&str> {
    let start = find_case_insensitive(text.as_bytes(), b"BODY[HEADER")?;
    let close = text[start..].find(']')? + start;
    let rest = text[close + 1..].trim_start();
    if rest.starts_with('{') {
        rest.split_once('\n').map(|(_, block)| block)
    } else {
        Some(rest.strip_prefix('"').unwrap_or(rest))
    }
}

fn find_case_insensitive(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|w| w.eq_ignore_ascii_case(needle))
}

fn find_number_after(text: &str, marker: &str) -> Option<u32> {
    let mut offset = 0;
    while let Some(pos) = find_case_insensitive(&text.as_bytes()[offset..], marker.as_bytes()) {
        let start = offset + pos;
        // Must be a whole word: preceded by '(' or ' '
        let boundary = start == 0 || matches!(text.as_bytes()[start - 1], b'(' | b' ');
        let digits: String = text[start + marker.len()..]
            .chars()
            .take_while(char::is_ascii_digit)
            .collect();
        if boundary && !digits.is_empty() {
            return digits.parse().ok();
        }
        offset = start + marker.len();
    }
    None
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

    fn summary_response() -> Vec<u8> {
        let headers = b"Message-ID: <m2@example.com>\r\nIn-Reply-To: <m1@example.com>\r\nReferences: <m0@example.com> <m1@example.com>\r\n\r\n";
        let mut response = format!(
            "* 12 FETCH (UID 4821 FLAGS (\\Seen) ENVELOPE (\"Tue, 1 Jul 2025 10:52:37 +0200\" \"Re: Lunch\" ((\"Ada\" NIL \"ada\" \"example.com\")) NIL NIL NIL NIL NIL NIL NIL) \
             BODYSTRUCTURE ((\"TEXT\" \"PLAIN\" (\"CHARSET\" \"utf-8\") NIL NIL \"7BIT\" 42 2 NIL NIL NIL NIL)(\"IMAGE\" \"PNG\" (\"NAME\" \"a.png\") NIL NIL \"BASE64\" 100 NIL NIL NIL NIL) \"MIXED\" NIL NIL NIL) \
             BODY[HEADER.FIELDS (MESSAGE-ID IN-REPLY-TO REFERENCES)] {{{}}}\r\n",
            headers.len()
        )
        .into_bytes();
        response.extend_from_slice(headers);
        response.extend_from_slice(b")\r\n");
        response
    }

    #[test]
    fn test_parse_summary_fetch() {
        let record = parse_fetch(&summary_response()).unwrap();
        assert_eq!(record.seq, 12);
        assert_eq!(record.uid, Some(4821));

        let envelope = record.envelope.as_ref().unwrap();
        assert_eq!(envelope.subject, "Re: Lunch");
        assert_eq!(envelope.from, "Ada");

        let structure = record.structure.as_ref().unwrap();
        assert_eq!(structure.text_part().unwrap().locator, "1");
        assert_eq!(structure.attachments()[0].filename, "a.png");

        let headers = record.thread_headers();
        assert_eq!(headers.message_id.as_deref(), Some("<m2@example.com>"));
        assert_eq!(headers.in_reply_to.as_deref(), Some("<m1@example.com>"));
        assert_eq!(
            headers.references.as_deref(),
            Some("<m0@example.com> <m1@example.com>")
        );
    }

    #[test]
    fn test_parse_partial_body_section() {
        let response = b"* 3 FETCH (UID 77 BODY[1]<0> {5}\r\nhello)\r\n";
        let record = parse_fetch(response).unwrap();
        let section = record.section("1").unwrap();
        assert_eq!(section.name, "1");
        assert_eq!(section.origin, Some(0));
        assert_eq!(section.data.as_deref(), Some(&b"hello"[..]));
    }

    #[test]
    fn test_parse_nil_body() {
        let record = parse_fetch(b"* 3 FETCH (UID 77 BODY[2] NIL)\r\n").unwrap();
        assert_eq!(record.sections[0].data, None);
    }

    #[test]
    fn test_parse_body_section_and_origin() {
        let mut lexer = Lexer::new(b"[HEADER.FIELDS (A B)]<10> rest");
        let (section, origin) = parse_body_section_and_origin(&mut lexer);
        assert_eq!(section.as_deref(), Some("HEADER.FIELDS (A B)"));
        assert_eq!(origin, Some(10));
    }

    #[test]
    fn test_raw_fallback() {
        // The unterminated header string makes the structured parse fail
        let response = b"* 5 FETCH (UID 99 ENVELOPE (\"Mon, 2 Jun 2025\" \"Broken ((\" ((\"Eve\" NIL \"eve\" \"example.net\")) NIL) BODY[HEADER.FIELDS (MESSAGE-ID)] \"Message-ID: <e@x>\r\n)\r\n";
        assert!(parse_fetch(response).is_err());

        let records = parse_fetch_responses(&[response.to_vec()]);
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.uid, Some(99));
        assert_eq!(record.seq, 5);
        let envelope = record.envelope.as_ref().unwrap();
        assert_eq!(envelope.subject, "Broken ((");
        assert_eq!(envelope.from, "Eve");
        assert_eq!(
            record.thread_headers().message_id.as_deref(),
            Some("<e@x>")
        );
    }

    #[test]
    fn test_records_without_uid_are_dropped() {
        let responses = vec![
            b"* 1 FETCH (FLAGS (\\Seen))\r\n".to_vec(),
            b"* 2 EXISTS\r\n".to_vec(),
            b"A0003 OK FETCH completed\r\n".to_vec(),
        ];
        assert!(parse_fetch_responses(&responses).is_empty());
    }

    #[test]
    fn test_find_number_after_requires_word_boundary() {
        assert_eq!(find_number_after("(XUID 5 UID 7)", "UID "), Some(7));
        assert_eq!(find_number_after("(uid 12)", "UID "), Some(12));
        assert_eq!(find_number_after("(FLAGS ())", "UID "), None);
    }
}
