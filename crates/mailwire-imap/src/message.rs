//! Message model shared by the engine, the cache and the CLI.

use serde::{Deserialize, Serialize};

use crate::parser::headers::first_id;

/// Attachment metadata, as listed in a message's part structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Part locator (`"2"`, `"1.3"`).
    pub locator: String,
    /// Filename.
    pub filename: String,
    /// Declared media type.
    pub media_type: String,
    /// Encoded size in bytes.
    pub size: u32,
    /// Transfer-encoding name.
    pub encoding: String,
}

/// A retrieved message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Server-assigned UID.
    pub uid: u32,
    /// `Message-ID`, synthetic when the message has none.
    pub message_id: String,
    /// Thread identifier.
    pub thread_id: String,
    /// `In-Reply-To`.
    #[serde(default)]
    pub in_reply_to: Option<String>,
    /// `References`.
    #[serde(default)]
    pub references: Option<String>,
    /// Sender display text.
    pub from: String,
    /// Subject.
    pub subject: String,
    /// Date header text.
    pub date: String,
    /// Preview or full body text.
    pub body: String,
    /// True if `body` is not the complete text.
    pub truncated: bool,
    /// Attachments in part order.
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl Message {
    /// Identifier used for messages without a `Message-ID`.
    #[must_use]
    pub fn synthetic_id(uid: u32) -> String {
        format!("<uid-{uid}@mailwire.invalid>")
    }

    /// Thread identifier: first id of `References`, else `In-Reply-To`, else
    /// the message's own id.
    #[must_use]
    pub fn thread_root(message_id: &str, in_reply_to: Option<&str>, references: Option<&str>) -> String {
        references
            .map(first_id)
            .filter(|id| !id.is_empty())
            .or_else(|| in_reply_to.map(first_id).filter(|id| !id.is_empty()))
            .unwrap_or(message_id)
            .to_string()
    }

    /// Finds an attachment by locator.
    #[must_use]
    pub fn attachment(&self, locator: &str) -> Option<&Attachment> {
        self.attachments.iter().find(|a| a.locator == locator)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_root() {
        assert_eq!(
            Message::thread_root("<c@x>", Some("<b@x>"), Some("<a@x> <b@x>")),
            "<a@x>"
        );
        assert_eq!(Message::thread_root("<c@x>", Some("<b@x>"), None), "<b@x>");
        assert_eq!(Message::thread_root("<c@x>", None, Some("  ")), "<c@x>");
        assert_eq!(Message::thread_root("<c@x>", None, None), "<c@x>");
    }

    #[test]
    fn test_synthetic_id() {
        assert_eq!(Message::synthetic_id(42), "<uid-42@mailwire.invalid>");
    }
}
