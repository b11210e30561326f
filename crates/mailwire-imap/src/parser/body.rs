//! Body text decoding.

use mailwire_mime::TransferEncoding;

/// Decoded body text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BodyText {
    /// Normalized text, at most `limit` characters.
    pub text: String,
    /// True if the text was cut.
    pub truncated: bool,
}

/// Decodes raw part bytes into display text.
///
/// `partial` marks a byte-range fetch: an incomplete trailing Base64 group is
/// dropped and a split multi-byte character at the end is discarded. Line
/// endings become `\n`; HTML is reduced to text.
#[must_use]
pub fn decode_text(raw: &[u8], encoding: &str, partial: bool, html: bool, limit: usize) -> BodyText {
    let encoding = TransferEncoding::from_name(encoding).unwrap_or(TransferEncoding::SevenBit);
    let bytes = if partial {
        encoding.decode_prefix(raw)
    } else {
        encoding.decode(raw).unwrap_or_else(|_| raw.to_vec())
    };

    let mut text = String::from_utf8_lossy(&bytes).into_owned();
    if partial {
        while text.ends_with('\u{fffd}') {
            text.pop();
        }
    }

    let text = text.replace("\r\n", "\n").replace('\r', "\n");
    let text = if html { html_to_text(&text) } else { text };
    cap(text.trim(), limit)
}

/// Cuts `text` to `limit` characters.
#[must_use]
pub fn cap(text: &str, limit: usize) -> BodyText {
    match text.char_indices().nth(limit) {
        Some((index, _)) => BodyText {
            text: text[..index].trim_end().to_string(),
            truncated: true,
        },
        None => BodyText {
            text: text.to_string(),
            truncated: false,
        },
    }
}

/// Strips tags and decodes the common entities.
fn html_to_text(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut rest = html;

    while let Some(open) = rest.find('<') {
        out.push_str(&rest[..open]);
        let after = &rest[open..];
        let Some(close) = after.find('>') else {
            rest = "";
            break;
        };
        let tag = after[1..close].trim().to_ascii_lowercase();
        let name = tag
            .trim_start_matches('/')
            .split(|c: char| c.is_whitespace() || c == '/')
            .next()
            .unwrap_or_default();

        if name == "style" || name == "script" {
            if !tag.starts_with('/') {
                let end = format!("</{name}");
                let body = &after[close + 1..];
                rest = body
                    .to_ascii_lowercase()
                    .find(&end)
                    .map_or("", |p| &body[p..]);
                continue;
            }
        } else if matches!(name, "br" | "p" | "div" | "tr" | "li" | "h1" | "h2" | "h3") {
            out.push('\n');
        }
        rest = &after[close + 1..];
    }
    out.push_str(rest);

    let decoded = out
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");

    let mut lines: Vec<&str> = Vec::new();
    for line in decoded.lines().map(str::trim) {
        if line.is_empty() && lines.last().is_none_or(|l| l.is_empty()) {
            continue;
        }
        lines.push(line);
    }
    lines.join("\n")
}
