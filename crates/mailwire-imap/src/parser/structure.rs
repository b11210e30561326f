//! BODYSTRUCTURE part tree.
//!
//! The structure is read by recursive descent over the parsed [`Value`]
//! tree. Every part receives the locator the server itself would use for
//! `BODY[...]`:
//!
//! - a single-part message is part `1`
//! - children of a multipart are numbered `1..n` under their parent
//! - the body of an attached `message/rfc822` is addressed under the
//!   attachment's own locator (`2.1`, or `2.1`..`2.n` if multipart)

use super::value::Value;
use crate::message::Attachment;

/// One node of a message's MIME tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BodyPart {
    /// Part locator for `BODY[...]`; empty for the multipart root of the
    /// message, `N.TEXT` for the multipart body of a nested message.
    pub locator: String,
    /// Lowercase `type/subtype`.
    pub media_type: String,
    /// Content-Type parameters, names lowercased.
    pub params: Vec<(String, String)>,
    /// Content-Transfer-Encoding, lowercased.
    pub encoding: String,
    /// Encoded size in bytes.
    pub size: u32,
    /// Disposition type, lowercased (`attachment`, `inline`).
    pub disposition: Option<String>,
    /// Disposition parameters, names lowercased.
    pub disposition_params: Vec<(String, String)>,
    /// Child parts (multipart children, or the body of a `message/rfc822`).
    pub children: Vec<BodyPart>,
}

impl BodyPart {
    /// Parses a BODYSTRUCTURE value into a tree rooted at the message.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        root(value, "")
    }

    /// True for `multipart/*`.
    #[must_use]
    pub fn is_multipart(&self) -> bool {
        self.media_type.starts_with("multipart/")
    }

    /// True for `message/rfc822` and friends carrying a nested message.
    #[must_use]
    pub fn is_message(&self) -> bool {
        self.media_type == "message/rfc822" || self.media_type == "message/global"
    }

    /// Returns a content-type parameter by lowercase name.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        lookup(&self.params, name)
    }

    /// The filename from the disposition or the content-type `name`.
    #[must_use]
    pub fn filename(&self) -> Option<String> {
        lookup(&self.disposition_params, "filename")
            .or_else(|| lookup(&self.disposition_params, "filename*"))
            .or_else(|| self.param("name"))
            .or_else(|| self.param("name*"))
            .map(decode_filename)
            .filter(|name| !name.is_empty())
    }

    /// True when this part is something the user would call an attachment.
    #[must_use]
    pub fn is_attachment(&self) -> bool {
        if self.is_multipart() {
            return false;
        }
        self.filename().is_some()
            || self.disposition.as_deref() == Some("attachment")
            || !self.media_type.starts_with("text/")
    }

    /// Finds a part by locator.
    #[must_use]
    pub fn find(&self, locator: &str) -> Option<&Self> {
        if self.locator == locator {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(locator))
    }

    /// Lists attachments in tree order.
    ///
    /// Nested messages are reported as one attachment and not descended into.
    #[must_use]
    pub fn attachments(&self) -> Vec<Attachment> {
        let mut found = Vec::new();
        self.collect_attachments(&mut found);
        found
    }

    fn collect_attachments(&self, found: &mut Vec<Attachment>) {
        if self.is_multipart() {
            for child in &self.children {
                child.collect_attachments(found);
            }
        } else if self.is_attachment() {
            found.push(Attachment {
                locator: self.locator.clone(),
                filename: self
                    .filename()
                    .unwrap_or_else(|| format!("attachment-{}", self.locator)),
                media_type: self.media_type.clone(),
                size: self.size,
                encoding: self.encoding.clone(),
            });
        }
    }

    /// The part holding the readable body: first inline `text/plain`, else
    /// first inline `text/html`.
    #[must_use]
    pub fn text_part(&self) -> Option<&Self> {
        self.first_inline("text/plain")
            .or_else(|| self.first_inline("text/html"))
    }

    fn first_inline(&self, media_type: &str) -> Option<&Self> {
        if self.is_multipart() {
            return self
                .children
                .iter()
                .find_map(|child| child.first_inline(media_type));
        }
        let inline = self.filename().is_none() && self.disposition.as_deref() != Some("attachment");
        (self.media_type == media_type && inline).then_some(self)
    }
}

fn lookup<'a>(params: &'a [(String, String)], name: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
}

fn decode_filename(raw: &str) -> String {
    // RFC 2231: charset'language'percent-encoded
    if let Some((_, encoded)) = raw.split_once("''") {
        return percent_decode(encoded);
    }
    mailwire_mime::encoding::decode_encoded_words(raw.trim())
}

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            if let Some(byte) = s
                .get(i + 1..i + 3)
                .and_then(|hex| u8::from_str_radix(hex, 16).ok())
            {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn join(prefix: &str, index: usize) -> String {
    if prefix.is_empty() {
        index.to_string()
    } else {
        format!("{prefix}.{index}")
    }
}

fn is_multipart_value(items: &[Value]) -> bool {
    items.first().is_some_and(Value::is_list)
}

/// Parses a body at a "message root" position: the top level or the body of
/// a nested message. A single part there is numbered `prefix.1`.
fn root(value: &Value, prefix: &str) -> Option<BodyPart> {
    let items = value.as_list()?;
    if is_multipart_value(items) {
        let locator = if prefix.is_empty() {
            String::new()
        } else {
            format!("{prefix}.TEXT")
        };
        multipart(items, locator, prefix)
    } else {
        single(items, join(prefix, 1))
    }
}

fn node(value: &Value, locator: String) -> Option<BodyPart> {
    let items = value.as_list()?;
    if is_multipart_value(items) {
        let prefix = locator.clone();
        multipart(items, locator, &prefix)
    } else {
        single(items, locator)
    }
}

fn multipart(items: &[Value], locator: String, child_prefix: &str) -> Option<BodyPart> {
    let child_count = items.iter().take_while(|v| v.is_list()).count();
    let children: Vec<BodyPart> = items[..child_count]
        .iter()
        .enumerate()
        .filter_map(|(i, child)| node(child, join(child_prefix, i + 1)))
        .collect();

    let subtype = items
        .get(child_count)
        .map(Value::text_or_empty)
        .unwrap_or_else(|| "mixed".to_string())
        .to_ascii_lowercase();

    let params = items.get(child_count + 1).map(params).unwrap_or_default();
    let (disposition, disposition_params) = items
        .get(child_count + 2)
        .map(disposition)
        .unwrap_or_default();

    Some(BodyPart {
        locator,
        media_type: format!("multipart/{subtype}"),
        params,
        encoding: String::new(),
        size: 0,
        disposition,
        disposition_params,
        children,
    })
}

fn single(items: &[Value], locator: String) -> Option<BodyPart> {
    let kind = items.first()?.as_text()?.to_ascii_lowercase();
    let subtype = items
        .get(1)
        .map(Value::text_or_empty)
        .unwrap_or_default()
        .to_ascii_lowercase();
    let media_type = format!("{kind}/{subtype}");

    let params = items.get(2).map(params).unwrap_or_default();
    let encoding = items
        .get(5)
        .map(Value::text_or_empty)
        .unwrap_or_default()
        .to_ascii_lowercase();
    let size = items.get(6).and_then(Value::as_number).unwrap_or(0);

    let is_message = media_type == "message/rfc822" || media_type == "message/global";

    // Extension fields start after the type-specific fields.
    let extension_start = if kind == "text" {
        8
    } else if is_message {
        10
    } else {
        7
    };
    let (disposition, disposition_params) = items
        .get(extension_start + 1)
        .map(disposition)
        .unwrap_or_default();

    let children = if is_message {
        items
            .get(8)
            .and_then(|body| root(body, &locator))
            .into_iter()
            .collect()
    } else {
        Vec::new()
    };

    Some(BodyPart {
        locator,
        media_type,
        params,
        encoding,
        size,
        disposition,
        disposition_params,
        children,
    })
}

fn params(value: &Value) -> Vec<(String, String)> {
    let Some(items) = value.as_list() else {
        return Vec::new();
    };
    items
        .chunks(2)
        .filter_map(|pair| {
            let key = pair.first()?.as_text()?.to_ascii_lowercase();
            let value = pair.get(1).map(Value::text_or_empty).unwrap_or_default();
            Some((key, value))
        })
        .collect()
}

fn disposition(value: &Value) -> (Option<String>, Vec<(String, String)>) {
    let Some(items) = value.as_list() else {
        return (None, Vec::new());
    };
    let kind = items
        .first()
        .and_then(Value::as_text)
        .map(|s| s.to_ascii_lowercase());
    let params = items.get(1).map(params).unwrap_or_default();
    (kind, params)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::parser::lexer::Lexer;
    use crate::parser::value::parse_value;

    fn parse(raw: &str) -> BodyPart {
        let value = parse_value(&mut Lexer::new(raw.as_bytes())).unwrap();
        BodyPart::from_value(&value).unwrap()
    }

    #[test]
    fn test_single_part_is_one() {
        let part = parse(r#"("TEXT" "PLAIN" ("CHARSET" "utf-8") NIL NIL "7BIT" 120 4 NIL NIL NIL NIL)"#);
        assert_eq!(part.locator, "1");
        assert_eq!(part.media_type, "text/plain");
        assert_eq!(part.param("charset"), Some("utf-8"));
        assert_eq!(part.encoding, "7bit");
        assert_eq!(part.size, 120);
        assert!(part.attachments().is_empty());
        assert_eq!(part.text_part().unwrap().locator, "1");
    }

    #[test]
    fn test_mixed_with_attachment() {
        let part = parse(concat!(
            r#"(("TEXT" "PLAIN" ("CHARSET" "utf-8") NIL NIL "QUOTED-PRINTABLE" 300 10 NIL NIL NIL NIL)"#,
            r#"("APPLICATION" "PDF" ("NAME" "report.pdf") NIL NIL "BASE64" 4096 NIL ("ATTACHMENT" ("FILENAME" "report.pdf")) NIL NIL)"#,
            r#" "MIXED" ("BOUNDARY" "b1") NIL NIL NIL)"#
        ));
        assert_eq!(part.locator, "");
        assert_eq!(part.media_type, "multipart/mixed");
        assert_eq!(part.children.len(), 2);

        let attachments = part.attachments();
        assert_eq!(attachments.len(), 1);
        assert_eq!(attachments[0].locator, "2");
        assert_eq!(attachments[0].filename, "report.pdf");
        assert_eq!(attachments[0].media_type, "application/pdf");
        assert_eq!(attachments[0].encoding, "base64");
        assert_eq!(attachments[0].size, 4096);

        assert_eq!(part.text_part().unwrap().locator, "1");
        assert_eq!(part.find("2").unwrap().media_type, "application/pdf");
        assert!(part.find("3").is_none());
    }

    #[test]
    fn test_nested_alternative_locators() {
        let part = parse(concat!(
            r#"((("TEXT" "PLAIN" ("CHARSET" "utf-8") NIL NIL "7BIT" 10 1 NIL NIL NIL NIL)"#,
            r#"("TEXT" "HTML" ("CHARSET" "utf-8") NIL NIL "7BIT" 20 1 NIL NIL NIL NIL) "ALTERNATIVE" NIL NIL NIL)"#,
            r#"("IMAGE" "PNG" NIL "<img1>" NIL "BASE64" 800 NIL NIL NIL NIL)"#,
            r#" "MIXED" NIL NIL NIL)"#
        ));
        assert_eq!(part.children[0].locator, "1");
        assert_eq!(part.children[0].children[0].locator, "1.1");
        assert_eq!(part.children[0].children[1].locator, "1.2");
        assert_eq!(part.text_part().unwrap().locator, "1.1");

        let attachments = part.attachments();
        assert_eq!(attachments.len(), 1);
        assert_eq!(attachments[0].locator, "2");
        assert_eq!(attachments[0].filename, "attachment-2");
    }

    #[test]
    fn test_attached_message_locators() {
        let part = parse(concat!(
            r#"(("TEXT" "PLAIN" NIL NIL NIL "7BIT" 10 1 NIL NIL NIL NIL)"#,
            r#"("MESSAGE" "RFC822" NIL NIL NIL "7BIT" 500 "#,
            r#"("d" "inner" NIL NIL NIL NIL NIL NIL NIL NIL) "#,
            r#"(("TEXT" "PLAIN" NIL NIL NIL "7BIT" 5 1 NIL NIL NIL NIL)("APPLICATION" "ZIP" ("NAME" "a.zip") NIL NIL "BASE64" 50 NIL NIL NIL NIL) "MIXED" NIL NIL NIL) "#,
            r#"20 NIL NIL NIL NIL)"#,
            r#" "MIXED" NIL NIL NIL)"#
        ));
        let message = part.find("2").unwrap();
        assert!(message.is_message());
        assert_eq!(message.children[0].locator, "2.TEXT");
        assert_eq!(message.children[0].children[0].locator, "2.1");
        assert_eq!(message.children[0].children[1].locator, "2.2");
        assert!(part.find("2.2").is_some());

        let attachments = part.attachments();
        assert_eq!(attachments.len(), 1);
        assert_eq!(attachments[0].locator, "2");
        assert_eq!(attachments[0].media_type, "message/rfc822");
    }

    #[test]
    fn test_text_attachment_with_filename() {
        let part = parse(concat!(
            r#"(("TEXT" "PLAIN" NIL NIL NIL "7BIT" 10 1 NIL NIL NIL NIL)"#,
            r#"("TEXT" "CSV" ("NAME" "data.csv") NIL NIL "BASE64" 64 2 NIL ("ATTACHMENT" NIL) NIL NIL)"#,
            r#" "MIXED" NIL NIL NIL)"#
        ));
        let attachments = part.attachments();
        assert_eq!(attachments.len(), 1);
        assert_eq!(attachments[0].filename, "data.csv");
    }

    #[test]
    fn test_encoded_filenames() {
        let part = parse(
            r#"("APPLICATION" "PDF" ("NAME*" "utf-8''r%C3%A9sum%C3%A9.pdf") NIL NIL "BASE64" 10 NIL NIL NIL NIL)"#,
        );
        assert_eq!(part.filename().as_deref(), Some("résumé.pdf"));

        let part = parse(
            r#"("APPLICATION" "PDF" ("NAME" "=?utf-8?B?w6kucGRm?=") NIL NIL "BASE64" 10 NIL NIL NIL NIL)"#,
        );
        assert_eq!(part.filename().as_deref(), Some("é.pdf"));
    }

    #[test]
    fn test_not_a_structure() {
        let value = parse_value(&mut Lexer::new(b"NIL")).unwrap();
        assert!(BodyPart::from_value(&value).is_none());
    }
}
