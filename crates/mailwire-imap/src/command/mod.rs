//! IMAP commands.
//!
//! Only the handful of commands the engine issues are modelled. Strings are
//! always sent quoted, with `\` and `"` escaped.

mod tag;

use std::fmt::Write;

pub use tag::TagGenerator;

/// Header fields requested alongside every message fetch.
pub const THREAD_HEADER_FIELDS: &[&str] = &["MESSAGE-ID", "IN-REPLY-TO", "REFERENCES"];

/// An item in a FETCH attribute list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchAttribute {
    /// `UID`.
    Uid,
    /// `ENVELOPE`.
    Envelope,
    /// `BODYSTRUCTURE`.
    BodyStructure,
    /// `BODY.PEEK[HEADER.FIELDS (...)]`.
    HeaderFields(Vec<String>),
    /// `BODY.PEEK[section]`, optionally `<origin.count>`.
    Section {
        /// Part locator, or `TEXT`.
        section: String,
        /// Byte range `(origin, count)`.
        partial: Option<(u32, u32)>,
    },
}

impl FetchAttribute {
    /// Header fields used for threading.
    #[must_use]
    pub fn thread_headers() -> Self {
        Self::HeaderFields(THREAD_HEADER_FIELDS.iter().map(ToString::to_string).collect())
    }

    fn write(&self, out: &mut String) {
        match self {
            Self::Uid => out.push_str("UID"),
            Self::Envelope => out.push_str("ENVELOPE"),
            Self::BodyStructure => out.push_str("BODYSTRUCTURE"),
            Self::HeaderFields(fields) => {
                let _ = write!(out, "BODY.PEEK[HEADER.FIELDS ({})]", fields.join(" "));
            }
            Self::Section { section, partial } => {
                let _ = write!(out, "BODY.PEEK[{section}]");
                if let Some((origin, count)) = partial {
                    let _ = write!(out, "<{origin}.{count}>");
                }
            }
        }
    }
}

/// Search criteria for `UID SEARCH`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchCriteria {
    keys: Vec<String>,
}

impl SearchCriteria {
    /// Creates empty criteria (rendered as `ALL`).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Matches every message.
    #[must_use]
    pub fn all() -> Self {
        Self {
            keys: vec!["ALL".to_string()],
        }
    }

    /// Full-text match.
    #[must_use]
    pub fn text(mut self, query: &str) -> Self {
        self.keys.push(format!("TEXT {}", quote(query)));
        self
    }

    /// Sender match.
    #[must_use]
    pub fn from(mut self, sender: &str) -> Self {
        self.keys.push(format!("FROM {}", quote(sender)));
        self
    }

    /// Internal date on or after `date` (`1-Feb-2025`).
    #[must_use]
    pub fn since(mut self, date: &str) -> Self {
        self.keys.push(format!("SINCE {date}"));
        self
    }

    /// Internal date before `date` (`1-Feb-2025`).
    #[must_use]
    pub fn before(mut self, date: &str) -> Self {
        self.keys.push(format!("BEFORE {date}"));
        self
    }

    /// Header match.
    #[must_use]
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.keys
            .push(format!("HEADER {} {}", quote(name), quote(value)));
        self
    }

    /// Matches either of two criteria.
    #[must_use]
    pub fn or(mut self, left: Self, right: Self) -> Self {
        self.keys
            .push(format!("OR {} {}", left.grouped(), right.grouped()));
        self
    }

    /// True when no key was added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    fn grouped(&self) -> String {
        match self.keys.len() {
            0 => "ALL".to_string(),
            1 => self.keys[0].clone(),
            _ => format!("({})", self.keys.join(" ")),
        }
    }

    /// Renders the criteria.
    #[must_use]
    pub fn render(&self) -> String {
        if self.keys.is_empty() {
            "ALL".to_string()
        } else {
            self.keys.join(" ")
        }
    }
}

/// A command the session can send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `LOGIN user secret`.
    Login {
        /// Account id.
        username: String,
        /// Secret.
        password: String,
    },
    /// `SELECT mailbox`.
    Select {
        /// Mailbox name.
        mailbox: String,
    },
    /// `FETCH set (items)` by sequence number.
    Fetch {
        /// Sequence set, e.g. `8:12`.
        sequence: String,
        /// Attributes to fetch.
        items: Vec<FetchAttribute>,
    },
    /// `UID FETCH set (items)`.
    UidFetch {
        /// UID set, e.g. `4821` or `1,5,9`.
        uids: String,
        /// Attributes to fetch.
        items: Vec<FetchAttribute>,
    },
    /// `UID SEARCH criteria`.
    UidSearch {
        /// Criteria.
        criteria: SearchCriteria,
    },
    /// `LOGOUT`.
    Logout,
}

impl Command {
    /// Serializes the command with its tag and trailing CRLF.
    #[must_use]
    pub fn serialize(&self, tag: &str) -> Vec<u8> {
        let mut out = format!("{tag} ");
        self.write_body(&mut out, false);
        out.push_str("\r\n");
        out.into_bytes()
    }

    /// Renders the command for logs, with secrets replaced.
    #[must_use]
    pub fn redacted(&self) -> String {
        let mut out = String::new();
        self.write_body(&mut out, true);
        out
    }

    fn write_body(&self, out: &mut String, redact: bool) {
        match self {
            Self::Login { username, password } => {
                let secret = if redact { "\"***\"".to_string() } else { quote(password) };
                let _ = write!(out, "LOGIN {} {secret}", quote(username));
            }
            Self::Select { mailbox } => {
                let _ = write!(out, "SELECT {}", quote(mailbox));
            }
            Self::Fetch { sequence, items } => {
                let _ = write!(out, "FETCH {sequence} ");
                write_items(out, items);
            }
            Self::UidFetch { uids, items } => {
                let _ = write!(out, "UID FETCH {uids} ");
                write_items(out, items);
            }
            Self::UidSearch { criteria } => {
                let _ = write!(out, "UID SEARCH {}", criteria.render());
            }
            Self::Logout => out.push_str("LOGOUT"),
        }
    }
}

fn write_items(out: &mut String, items: &[FetchAttribute]) {
    out.push('(');
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        item.write(out);
    }
    out.push(')');
}

/// Renders a quoted string. CR and LF cannot be quoted and are dropped.
#[must_use]
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            '\r' | '\n' => {}
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Formats a UID list as a comma-separated set.
#[must_use]
pub fn uid_set(uids: &[u32]) -> String {
    uids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
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

    #[test]
    fn test_quote_escapes() {
        assert_eq!(quote("plain"), "\"plain\"");
        assert_eq!(quote(r#"a"b\c"#), r#""a\"b\\c""#);
        assert_eq!(quote("line\r\nbreak"), "\"linebreak\"");
    }

    #[test]
    fn test_login_serialize_and_redact() {
        let command = Command::Login {
            username: "ada@example.com".to_string(),
            password: "p\"w".to_string(),
        };
        assert_eq!(
            command.serialize("A0000"),
            b"A0000 LOGIN \"ada@example.com\" \"p\\\"w\"\r\n"
        );
        assert_eq!(command.redacted(), "LOGIN \"ada@example.com\" \"***\"");
    }

    #[test]
    fn test_summary_fetch() {
        let command = Command::Fetch {
            sequence: "8:12".to_string(),
            items: vec![
                FetchAttribute::Uid,
                FetchAttribute::Envelope,
                FetchAttribute::BodyStructure,
                FetchAttribute::thread_headers(),
            ],
        };
        assert_eq!(
            String::from_utf8(command.serialize("A0002")).unwrap(),
            "A0002 FETCH 8:12 (UID ENVELOPE BODYSTRUCTURE BODY.PEEK[HEADER.FIELDS (MESSAGE-ID IN-REPLY-TO REFERENCES)])\r\n"
        );
    }

    #[test]
    fn test_partial_section_fetch() {
        let command = Command::UidFetch {
            uids: uid_set(&[4821]),
            items: vec![
                FetchAttribute::Uid,
                FetchAttribute::Section {
                    section: "1.1".to_string(),
                    partial: Some((0, 2048)),
                },
            ],
        };
        assert_eq!(
            String::from_utf8(command.serialize("A0003")).unwrap(),
            "A0003 UID FETCH 4821 (UID BODY.PEEK[1.1]<0.2048>)\r\n"
        );
    }

    #[test]
    fn test_search_criteria() {
        assert_eq!(SearchCriteria::new().render(), "ALL");
        assert_eq!(
            SearchCriteria::new()
                .from("ada")
                .text("budget")
                .since("1-Feb-2025")
                .render(),
            "FROM \"ada\" TEXT \"budget\" SINCE 1-Feb-2025"
        );

        let id = "<m1@example.com>";
        let thread = SearchCriteria::new().or(
            SearchCriteria::new().header("Message-ID", id),
            SearchCriteria::new().or(
                SearchCriteria::new().header("In-Reply-To", id),
                SearchCriteria::new().header("References", id),
            ),
        );
        assert_eq!(
            thread.render(),
            "OR HEADER \"Message-ID\" \"<m1@example.com>\" OR HEADER \"In-Reply-To\" \"<m1@example.com>\" HEADER \"References\" \"<m1@example.com>\""
        );
    }

    #[test]
    fn test_uid_set() {
        assert_eq!(uid_set(&[1, 5, 9]), "1,5,9");
        assert_eq!(uid_set(&[]), "");
    }

    proptest::proptest! {
        #[test]
        fn prop_quote_reads_back(s in "(\\PC|[\"\\\\\r\n])*") {
            let quoted = quote(&s);
            proptest::prop_assert!(!quoted.contains(['\r', '\n']));

            let mut lexer = crate::parser::lexer::Lexer::new(quoted.as_bytes());
            let token = lexer.next_token().unwrap();
            let expected: String = s.chars().filter(|c| !matches!(c, '\r' | '\n')).collect();
            proptest::prop_assert_eq!(token, crate::parser::lexer::Token::QuotedString(expected));
        }
    }
}
