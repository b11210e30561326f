//! ENVELOPE interpretation.
//!
//! Only date, subject and sender are used. The structured path reads them
//! from a parsed [`Value`]; [`scan`] is the tolerant fallback for responses
//! the lexer rejects.

use mailwire_mime::encoding::decode_encoded_words;

use super::value::Value;

/// The envelope fields the engine keeps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Envelope {
    /// Date header text.
    pub date: String,
    /// Decoded subject.
    pub subject: String,
    /// Sender display text: name, else `mailbox@host`.
    pub from: String,
}

impl Envelope {
    /// Interprets a parsed ENVELOPE list.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        let items = value.as_list()?;
        let field = |i: usize| items.get(i).map(Value::text_or_empty).unwrap_or_default();

        let from = items
            .get(2)
            .and_then(first_address)
            .or_else(|| items.get(3).and_then(first_address))
            .unwrap_or_default();

        Some(Self {
            date: field(0).trim().to_string(),
            subject: decode_encoded_words(field(1).trim()),
            from,
        })
    }
}

/// Display text for the first address in an address list value.
fn first_address(list: &Value) -> Option<String> {
    let address = list.as_list()?.first()?.as_list()?;
    let part = |i: usize| {
        address
            .get(i)
            .and_then(Value::as_text)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    };
    display_text(part(0), part(2), part(3))
}

fn display_text(
    name: Option<String>,
    mailbox: Option<String>,
    host: Option<String>,
) -> Option<String> {
    if let Some(name) = name {
        return Some(decode_encoded_words(&name));
    }
    match (mailbox, host) {
        (Some(mailbox), Some(host)) => Some(format!("{mailbox}@{host}")),
        (Some(mailbox), None) => Some(mailbox),
        _ => None,
    }
}

/// Tolerantly scans an envelope starting at its opening parenthesis.
///
/// Tracks quoting, escapes, literals and paren depth, splits the first four
/// top-level components and falls back to an address-looking substring for
/// the sender.
#[must_use]
pub fn scan(raw: &[u8]) -> Envelope {
    let components = split_components(raw, 4);
    let text = |i: usize| {
        components
            .get(i)
            .and_then(|c| scalar(c))
            .unwrap_or_default()
    };

    let from = components
        .get(2)
        .and_then(|c| address_from_group(c))
        .or_else(|| components.get(3).and_then(|c| address_from_group(c)))
        .or_else(|| find_address(raw))
        .unwrap_or_default();

    Envelope {
        date: text(0).trim().to_string(),
        subject: decode_encoded_words(text(1).trim()),
        from,
    }
}

/// Splits the top-level components of a parenthesized list.
fn split_components(raw: &[u8], limit: usize) -> Vec<&[u8]> {
    let mut components = Vec::new();
    let Some(open) = raw.iter().position(|&b| b == b'(') else {
        return components;
    };

    let mut depth = 0usize;
    let mut in_quote = false;
    let mut escaped = false;
    let mut start = None;
    let mut i = open;

    while i < raw.len() && components.len() < limit {
        let b = raw[i];

        if in_quote {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_quote = false;
            }
            i += 1;
            continue;
        }

        match b {
            b'"' => {
                in_quote = true;
                if depth == 1 && start.is_none() {
                    start = Some(i);
                }
            }
            b'(' => {
                depth += 1;
                if depth == 2 && start.is_none() {
                    start = Some(i);
                }
            }
            b')' => {
                if depth == 2 || depth == 1 {
                    if let Some(s) = start.take() {
                        let end = if depth == 2 { i + 1 } else { i };
                        components.push(&raw[s..end]);
                    }
                }
                if depth <= 1 {
                    break;
                }
                depth -= 1;
            }
            b' ' if depth == 1 => {
                if let Some(s) = start.take() {
                    components.push(&raw[s..i]);
                }
            }
            b'{' => {
                if let Some((len, skip)) = literal_prefix(&raw[i..]) {
                    if depth == 1 && start.is_none() {
                        start = Some(i);
                    }
                    i += skip + len;
                    continue;
                }
            }
            _ => {
                if depth == 1 && start.is_none() {
                    start = Some(i);
                }
            }
        }
        i += 1;
    }

    components
}

/// Parses `{n}\r\n` and returns `(n, prefix length)`.
fn literal_prefix(raw: &[u8]) -> Option<(usize, usize)> {
    let close = raw.iter().position(|&b| b == b'}')?;
    let digits = std::str::from_utf8(raw.get(1..close)?).ok()?;
    let len = digits.trim_end_matches('+').parse().ok()?;
    let rest = raw.get(close + 1..)?;
    let newline = if rest.starts_with(b"\r\n") {
        2
    } else if rest.starts_with(b"\n") {
        1
    } else {
        return None;
    };
    Some((len, close + 1 + newline))
}

/// Interprets a scalar component: quoted string, literal, NIL or atom.
fn scalar(component: &[u8]) -> Option<String> {
    let trimmed = component.trim_ascii();
    if trimmed.eq_ignore_ascii_case(b"NIL") {
        return None;
    }
    if let Some(inner) = trimmed.strip_prefix(b"\"") {
        let inner = inner.strip_suffix(b"\"").unwrap_or(inner);
        return Some(unescape(inner));
    }
    if let Some((len, skip)) = literal_prefix(trimmed) {
        let end = (skip + len).min(trimmed.len());
        return Some(String::from_utf8_lossy(&trimmed[skip..end]).into_owned());
    }
    Some(String::from_utf8_lossy(trimmed).into_owned())
}

fn unescape(bytes: &[u8]) -> String {
    let mut out = Vec::with_capacity(bytes.len());
    let mut escaped = false;
    for &b in bytes {
        if escaped {
            out.push(b);
            escaped = false;
        } else if b == b'\\' {
            escaped = true;
        } else {
            out.push(b);
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Reads `(("name" adl "mailbox" "host") ...)` without a full parse.
fn address_from_group(group: &[u8]) -> Option<String> {
    let fields = quoted_fields(group, 4);
    if fields.len() < 4 {
        return None;
    }
    let mut fields = fields.into_iter();
    let name = fields.next().flatten();
    let _adl = fields.next();
    let mailbox = fields.next().flatten();
    let host = fields.next().flatten();
    display_text(name, mailbox, host)
}

/// Collects quoted strings and NILs in order, at any depth.
fn quoted_fields(raw: &[u8], limit: usize) -> Vec<Option<String>> {
    let mut fields = Vec::new();
    let mut i = 0;

    while i < raw.len() && fields.len() < limit {
        match raw[i] {
            b'"' => {
                let start = i + 1;
                let mut j = start;
                let mut escaped = false;
                while j < raw.len() {
                    match raw[j] {
                        _ if escaped => escaped = false,
                        b'\\' => escaped = true,
                        b'"' => break,
                        _ => {}
                    }
                    j += 1;
                }
                let value = unescape(&raw[start..j.min(raw.len())]);
                fields.push(Some(value).filter(|v| !v.trim().is_empty()));
                i = j + 1;
            }
            b'N' | b'n' if raw.get(i..i + 3).is_some_and(|w| w.eq_ignore_ascii_case(b"NIL")) => {
                fields.push(None);
                i += 3;
            }
            _ => i += 1,
        }
    }

    fields
}

/// Finds the first `local@domain` looking substring.
fn find_address(raw: &[u8]) -> Option<String> {
    let is_local = |b: u8| b.is_ascii_alphanumeric() || b"._%+-".contains(&b);
    let is_domain = |b: u8| b.is_ascii_alphanumeric() || b".-".contains(&b);

    let at = raw.iter().enumerate().find_map(|(i, &b)| {
        let before = i.checked_sub(1).and_then(|p| raw.get(p)).copied();
        let after = raw.get(i + 1).copied();
        (b == b'@' && before.is_some_and(is_local) && after.is_some_and(is_domain)).then_some(i)
    })?;

    let start = raw[..at]
        .iter()
        .rposition(|&b| !is_local(b))
        .map_or(0, |p| p + 1);
    let end = raw[at + 1..]
        .iter()
        .position(|&b| !is_domain(b))
        .map_or(raw.len(), |p| at + 1 + p);

    let candidate = String::from_utf8_lossy(&raw[start..end]);
    let candidate = candidate.trim_end_matches('.');
    candidate
        .split_once('@')
        .is_some_and(|(_, domain)| domain.contains('.'))
        .then(|| candidate.to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::parser::lexer::Lexer;
    use crate::parser::value::parse_value;

    const ENVELOPE: &[u8] = b"(\"Tue, 1 Jul 2025 10:52:37 +0200\" \"Quarterly (draft) report\" ((\"Ada Lovelace\" NIL \"ada\" \"example.com\")) ((NIL NIL \"ada\" \"example.com\")) NIL ((NIL NIL \"grace\" \"example.com\")) NIL NIL NIL \"<m1@example.com>\")";

    #[test]
    fn test_structured_envelope() {
        let value = parse_value(&mut Lexer::new(ENVELOPE)).unwrap();
        let envelope = Envelope::from_value(&value).unwrap();
        assert_eq!(envelope.date, "Tue, 1 Jul 2025 10:52:37 +0200");
        assert_eq!(envelope.subject, "Quarterly (draft) report");
        assert_eq!(envelope.from, "Ada Lovelace");
    }

    #[test]
    fn test_structured_envelope_without_name() {
        let raw = b"(NIL \"Hi\" ((NIL NIL \"bob\" \"example.org\")) NIL NIL NIL NIL NIL NIL NIL)";
        let value = parse_value(&mut Lexer::new(raw)).unwrap();
        let envelope = Envelope::from_value(&value).unwrap();
        assert_eq!(envelope.date, "");
        assert_eq!(envelope.from, "bob@example.org");
    }

    #[test]
    fn test_scan_matches_structured() {
        let envelope = scan(ENVELOPE);
        assert_eq!(envelope.date, "Tue, 1 Jul 2025 10:52:37 +0200");
        assert_eq!(envelope.subject, "Quarterly (draft) report");
        assert_eq!(envelope.from, "Ada Lovelace");
    }

    #[test]
    fn test_scan_escaped_quote_in_subject() {
        let raw = b"(\"d\" \"say \\\"hi\\\" (now)\" ((NIL NIL \"x\" \"y.com\")))";
        let envelope = scan(raw);
        assert_eq!(envelope.subject, "say \"hi\" (now)");
        assert_eq!(envelope.from, "x@y.com");
    }

    #[test]
    fn test_scan_literal_subject() {
        let raw = b"(\"d\" {9}\r\nA (b) \"c\" ((\"N\" NIL \"n\" \"z.io\")))";
        let envelope = scan(raw);
        assert_eq!(envelope.subject, "A (b) \"c\"");
        assert_eq!(envelope.from, "N");
    }

    #[test]
    fn test_scan_encoded_subject() {
        let raw = b"(\"d\" \"=?utf-8?Q?caf=C3=A9?=\" NIL)";
        assert_eq!(scan(raw).subject, "café");
    }

    #[test]
    fn test_scan_address_pattern_fallback() {
        let raw = b"(\"d\" \"s\" garbage mail from bob.smith@example.co.uk here";
        assert_eq!(scan(raw).from, "bob.smith@example.co.uk");
    }

    #[test]
    fn test_scan_garbage() {
        assert_eq!(scan(b"no envelope here"), Envelope::default());
    }
}
