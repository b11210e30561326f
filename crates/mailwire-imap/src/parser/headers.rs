//! Threading header extraction.

/// Identifier headers used for threading.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThreadHeaders {
    /// `Message-ID`.
    pub message_id: Option<String>,
    /// `In-Reply-To`.
    pub in_reply_to: Option<String>,
    /// `References`, whitespace collapsed.
    pub references: Option<String>,
}

impl ThreadHeaders {
    /// Extracts the headers from a header block.
    ///
    /// Names match case-insensitively, folded lines are joined and the first
    /// occurrence of each header wins. Any header may be absent.
    #[must_use]
    pub fn parse(block: &str) -> Self {
        let mut headers = Self::default();

        for (name, value) in unfold(block) {
            let slot = if name.eq_ignore_ascii_case("Message-ID") {
                &mut headers.message_id
            } else if name.eq_ignore_ascii_case("In-Reply-To") {
                &mut headers.in_reply_to
            } else if name.eq_ignore_ascii_case("References") {
                &mut headers.references
            } else {
                continue;
            };

            if slot.is_none() {
                let collapsed = value.split_whitespace().collect::<Vec<_>>().join(" ");
                if !collapsed.is_empty() {
                    *slot = Some(collapsed);
                }
            }
        }

        headers.message_id = headers.message_id.map(|v| first_id(&v).to_string());
        headers.in_reply_to = headers.in_reply_to.map(|v| first_id(&v).to_string());
        headers
    }
}

/// Joins folded lines and splits `Name: value` pairs.
fn unfold(block: &str) -> Vec<(String, String)> {
    let mut fields: Vec<(String, String)> = Vec::new();

    for line in block.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.starts_with([' ', '\t']) {
            if let Some((_, value)) = fields.last_mut() {
                value.push(' ');
                value.push_str(line.trim());
            }
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            let name = name.trim();
            if !name.is_empty() && !name.contains(' ') {
                fields.push((name.to_string(), value.trim().to_string()));
            }
        }
    }

    fields
}

/// Returns the first `<...>` identifier in `value`, or the trimmed value.
#[must_use]
pub fn first_id(value: &str) -> &str {
    if let Some(start) = value.find('<') {
        if let Some(len) = value[start..].find('>') {
            return &value[start..=start + len];
        }
    }
    value.split_whitespace().next().unwrap_or_default()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_all_headers() {
        let block = "Message-ID: <m3@example.com>\r\n\
                     In-Reply-To: <m2@example.com>\r\n\
                     References: <m1@example.com>\r\n <m2@example.com>\r\n\r\n";
        let headers = ThreadHeaders::parse(block);
        assert_eq!(headers.message_id.as_deref(), Some("<m3@example.com>"));
        assert_eq!(headers.in_reply_to.as_deref(), Some("<m2@example.com>"));
        assert_eq!(
            headers.references.as_deref(),
            Some("<m1@example.com> <m2@example.com>")
        );
    }

    #[test]
    fn test_case_insensitive_and_missing() {
        let headers = ThreadHeaders::parse("message-id:   <a@b>\n");
        assert_eq!(headers.message_id.as_deref(), Some("<a@b>"));
        assert_eq!(headers.in_reply_to, None);
        assert_eq!(headers.references, None);
    }

    #[test]
    fn test_in_reply_to_with_comment() {
        let headers = ThreadHeaders::parse("In-Reply-To: <p@x> (Ada's message of Tuesday)\r\n");
        assert_eq!(headers.in_reply_to.as_deref(), Some("<p@x>"));
    }

    #[test]
    fn test_empty_block() {
        assert_eq!(ThreadHeaders::parse(""), ThreadHeaders::default());
    }

    #[test]
    fn test_first_id() {
        assert_eq!(first_id("<a@b> <c@d>"), "<a@b>");
        assert_eq!(first_id("  bare@id  "), "bare@id");
        assert_eq!(first_id(""), "");
    }
}
