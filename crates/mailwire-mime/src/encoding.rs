//! MIME encoding and decoding utilities.
//!
//! Supports Base64, Quoted-Printable, and RFC 2047 header encoding.
//! Decoders are lenient: mail servers in the wild emit unpadded Base64,
//! stray whitespace and malformed `=XX` escapes.

use std::fmt;

use base64::Engine;
use base64::alphabet;
use base64::engine::general_purpose::STANDARD;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};

use crate::error::{Error, Result};

/// Line width used for Base64 bodies (RFC 2045 limit).
pub const BASE64_LINE_WIDTH: usize = 76;

/// Decoder accepting both padded and unpadded input.
const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// Transfer encoding types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEncoding {
    /// 7-bit ASCII.
    SevenBit,
    /// 8-bit binary.
    EightBit,
    /// Base64 encoding.
    Base64,
    /// Quoted-Printable encoding.
    QuotedPrintable,
    /// Binary (no encoding).
    Binary,
}

impl TransferEncoding {
    /// Parses a transfer encoding name, returning `None` for names we do not know.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "7bit" => Some(Self::SevenBit),
            "8bit" => Some(Self::EightBit),
            "base64" => Some(Self::Base64),
            "quoted-printable" => Some(Self::QuotedPrintable),
            "binary" => Some(Self::Binary),
            _ => None,
        }
    }

    /// Decodes a complete body in this encoding.
    ///
    /// # Errors
    ///
    /// Returns an error if Base64 input is malformed. Quoted-Printable never
    /// fails; identity encodings return the input unchanged.
    pub fn decode(self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            Self::Base64 => decode_base64(&String::from_utf8_lossy(data)),
            Self::QuotedPrintable => Ok(decode_quoted_printable(data)),
            Self::SevenBit | Self::EightBit | Self::Binary => Ok(data.to_vec()),
        }
    }

    /// Decodes a leading slice of a body (as returned by a partial fetch).
    ///
    /// Incomplete trailing Base64 groups are dropped. Falls back to the raw
    /// bytes if decoding fails.
    #[must_use]
    pub fn decode_prefix(self, data: &[u8]) -> Vec<u8> {
        match self {
            Self::Base64 => decode_base64_prefix(data).unwrap_or_else(|_| data.to_vec()),
            Self::QuotedPrintable => decode_quoted_printable(data),
            Self::SevenBit | Self::EightBit | Self::Binary => data.to_vec(),
        }
    }
}

impl fmt::Display for TransferEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SevenBit => write!(f, "7bit"),
            Self::EightBit => write!(f, "8bit"),
            Self::Base64 => write!(f, "base64"),
            Self::QuotedPrintable => write!(f, "quoted-printable"),
            Self::Binary => write!(f, "binary"),
        }
    }
}

/// Encodes data as Base64.
#[must_use]
pub fn encode_base64(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Encodes data as Base64 split into CRLF-separated lines of `width` characters.
///
/// The result has no trailing line break.
#[must_use]
pub fn encode_base64_lines(data: &[u8], width: usize) -> String {
    let encoded = STANDARD.encode(data);
    let width = width.max(4);
    let mut out = String::with_capacity(encoded.len() + encoded.len() / width * 2);

    // Base64 output is pure ASCII, so byte chunks are valid char boundaries.
    for (i, chunk) in encoded.as_bytes().chunks(width).enumerate() {
        if i > 0 {
            out.push_str("\r\n");
        }
        out.push_str(&String::from_utf8_lossy(chunk));
    }
    out
}

/// Decodes Base64 data, ignoring whitespace and missing padding.
///
/// # Errors
///
/// Returns an error if the input is not valid Base64.
pub fn decode_base64(data: &str) -> Result<Vec<u8>> {
    let cleaned: String = data.chars().filter(|c| !c.is_whitespace()).collect();
    LENIENT.decode(cleaned).map_err(Into::into)
}

/// Decodes the longest complete prefix of a Base64 stream.
///
/// # Errors
///
/// Returns an error if the complete groups are not valid Base64.
pub fn decode_base64_prefix(data: &[u8]) -> Result<Vec<u8>> {
    let mut cleaned: Vec<u8> = data
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    cleaned.truncate(cleaned.len() - cleaned.len() % 4);
    LENIENT.decode(cleaned).map_err(Into::into)
}

/// Decodes Quoted-Printable data (RFC 2045).
///
/// Soft line breaks are removed; malformed escapes are kept verbatim.
#[must_use]
pub fn decode_quoted_printable(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut i = 0;

    while i < data.len() {
        let byte = data[i];
        if byte == b'=' {
            match (data.get(i + 1).copied(), data.get(i + 2).copied()) {
                (Some(b'\r'), Some(b'\n')) => {
                    i += 3;
                    continue;
                }
                (Some(b'\n'), _) => {
                    i += 2;
                    continue;
                }
                (Some(hi), Some(lo)) => {
                    if let (Some(hi), Some(lo)) = (hex_value(hi), hex_value(lo)) {
                        out.push((hi << 4) | lo);
                        i += 3;
                        continue;
                    }
                }
                _ => {}
            }
        }
        out.push(byte);
        i += 1;
    }

    out
}

const fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'A'..=b'F' => Some(b - b'A' + 10),
        b'a'..=b'f' => Some(b - b'a' + 10),
        _ => None,
    }
}

/// Encodes a header value using RFC 2047 B-encoding when it is not plain ASCII.
#[must_use]
pub fn encode_rfc2047(text: &str) -> String {
    if text.chars().all(|c| c.is_ascii() && !c.is_ascii_control()) {
        return text.to_string();
    }
    format!("=?utf-8?B?{}?=", encode_base64(text.as_bytes()))
}

/// Decodes every RFC 2047 encoded word in a header value.
///
/// Whitespace between two adjacent encoded words is dropped, as the RFC
/// requires. Unknown charsets are decoded as UTF-8 lossily; ISO-8859-1 and
/// windows-1252 map bytes straight to code points.
#[must_use]
pub fn decode_encoded_words(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    let mut previous_was_word = false;

    while let Some(start) = rest.find("=?") {
        let (before, candidate) = rest.split_at(start);
        if let Some((decoded, consumed)) = decode_encoded_word(candidate) {
            if !(previous_was_word && before.trim().is_empty()) {
                out.push_str(before);
            }
            out.push_str(&decoded);
            rest = &candidate[consumed..];
            previous_was_word = true;
        } else {
            out.push_str(before);
            out.push_str("=?");
            rest = &candidate[2..];
            previous_was_word = false;
        }
    }

    out.push_str(rest);
    out
}

/// Decodes one `=?charset?enc?text?=` word at the start of `s`.
///
/// Returns the decoded text and the number of bytes consumed.
fn decode_encoded_word(s: &str) -> Option<(String, usize)> {
    let inner = s.strip_prefix("=?")?;
    let (charset, after) = inner.split_once('?')?;
    let (encoding, after) = after.split_once('?')?;
    let end = after.find("?=")?;
    let payload = &after[..end];
    if payload.contains(char::is_whitespace) {
        return None;
    }

    let bytes = match encoding {
        "B" | "b" => LENIENT.decode(payload).ok()?,
        "Q" | "q" => decode_quoted_printable(payload.replace('_', " ").as_bytes()),
        _ => return None,
    };

    let consumed = 2 + charset.len() + 1 + encoding.len() + 1 + end + 2;
    Some((decode_charset(charset, &bytes), consumed))
}

fn decode_charset(charset: &str, bytes: &[u8]) -> String {
    let charset = charset.split('*').next().unwrap_or_default();
    if charset.eq_ignore_ascii_case("iso-8859-1")
        || charset.eq_ignore_ascii_case("latin1")
        || charset.eq_ignore_ascii_case("windows-1252")
    {
        bytes.iter().map(|&b| char::from(b)).collect()
    } else {
        String::from_utf8_lossy(bytes).into_owned()
    }
}

/// Ensures a decoded byte buffer is valid UTF-8.
///
/// # Errors
///
/// Returns an error if the bytes are not UTF-8.
pub fn into_utf8(bytes: Vec<u8>) -> Result<String> {
    String::from_utf8(bytes).map_err(Error::from)
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
    use proptest::prelude::*;

    #[test]
    fn test_base64_encode_decode() {
        let data = b"Hello, World!";
        let encoded = encode_base64(data);
        assert_eq!(encoded, "SGVsbG8sIFdvcmxkIQ==");

        let decoded = decode_base64(&encoded).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn test_base64_lines_width() {
        let data = vec![0xAB; 200];
        let encoded = encode_base64_lines(&data, BASE64_LINE_WIDTH);
        for line in encoded.split("\r\n") {
            assert!(line.len() <= BASE64_LINE_WIDTH);
        }
        assert!(!encoded.ends_with("\r\n"));
        assert_eq!(decode_base64(&encoded).unwrap(), data);
    }

    #[test]
    fn test_base64_unpadded() {
        assert_eq!(decode_base64("SGk").unwrap(), b"Hi");
    }

    #[test]
    fn test_base64_prefix_drops_partial_group() {
        // "Hello, World!" cut in the middle of a group
        let decoded = decode_base64_prefix(b"SGVsbG8sIFdvc").unwrap();
        assert_eq!(decoded, b"Hello, Wo");
    }

    #[test]
    fn test_quoted_printable_decode() {
        assert_eq!(decode_quoted_printable(b"Hello, World!"), b"Hello, World!");
        assert_eq!(
            String::from_utf8(decode_quoted_printable(b"H=C3=A9llo")).unwrap(),
            "Héllo"
        );
    }

    #[test]
    fn test_quoted_printable_soft_line_break() {
        assert_eq!(decode_quoted_printable(b"Hello=\r\nWorld"), b"HelloWorld");
        assert_eq!(decode_quoted_printable(b"Hello=\nWorld"), b"HelloWorld");
    }

    #[test]
    fn test_quoted_printable_malformed_escape_kept() {
        assert_eq!(decode_quoted_printable(b"100=ZZ%"), b"100=ZZ%");
        assert_eq!(decode_quoted_printable(b"trailing="), b"trailing=");
    }

    #[test]
    fn test_rfc2047_encode() {
        assert_eq!(encode_rfc2047("Hello"), "Hello");

        let encoded = encode_rfc2047("Héllo");
        assert!(encoded.starts_with("=?utf-8?B?"));
        assert!(encoded.ends_with("?="));
        assert_eq!(decode_encoded_words(&encoded), "Héllo");
    }

    #[test]
    fn test_decode_encoded_words() {
        assert_eq!(decode_encoded_words("Hello"), "Hello");
        assert_eq!(decode_encoded_words("=?utf-8?B?SMOpbGxv?="), "Héllo");
        assert_eq!(decode_encoded_words("=?UTF-8?Q?H=C3=A9llo_there?="), "Héllo there");
        assert_eq!(
            decode_encoded_words("Re: =?utf-8?Q?caf=C3=A9?= =?utf-8?Q?_noir?= today"),
            "Re: café noir today"
        );
        assert_eq!(decode_encoded_words("=?iso-8859-1?Q?caf=E9?="), "café");
    }

    #[test]
    fn test_decode_encoded_words_invalid_left_alone() {
        assert_eq!(decode_encoded_words("1 =? 2"), "1 =? 2");
        assert_eq!(decode_encoded_words("=?utf-8?X?abc?="), "=?utf-8?X?abc?=");
    }

    #[test]
    fn test_transfer_encoding_from_name() {
        assert_eq!(TransferEncoding::from_name("BASE64"), Some(TransferEncoding::Base64));
        assert_eq!(
            TransferEncoding::from_name(" quoted-printable "),
            Some(TransferEncoding::QuotedPrintable)
        );
        assert_eq!(TransferEncoding::from_name("x-uuencode"), None);
        assert_eq!(TransferEncoding::Base64.to_string(), "base64");
    }

    #[test]
    fn test_decode_prefix_falls_back_to_raw() {
        let raw = b"not*base64!";
        assert_eq!(TransferEncoding::Base64.decode_prefix(raw), raw.to_vec());
    }

    proptest! {
        #[test]
        fn prop_base64_lines_round_trip(data in proptest::collection::vec(any::<u8>(), 0..2048)) {
            let encoded = encode_base64_lines(&data, BASE64_LINE_WIDTH);
            prop_assert_eq!(decode_base64(&encoded).unwrap(), data);
        }
    }
}
