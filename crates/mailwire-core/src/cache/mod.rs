//! Mailbox cache.
//!
//! The cache holds the most recent summary fetch, when it happened and the
//! ids seen so far. It is replaced wholesale by every sync cycle and
//! persisted as three independent files by [`CacheStore`].

mod store;
pub(crate) mod sync;

use std::collections::BTreeSet;
use std::time::Duration;

use mailwire_imap::Message;

pub use store::CacheStore;
pub use sync::{NewMessageHandler, diff_new_ids};

/// Cached mailbox state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cache {
    /// Messages, most recent first.
    pub messages: Vec<Message>,
    /// Unix seconds of the last successful fetch.
    pub last_fetch: Option<i64>,
    /// Message ids seen by the last cycle.
    pub known_ids: BTreeSet<String>,
}

impl Cache {
    /// True if the cache can be served without refetching.
    ///
    /// A non-empty cache with no recorded fetch time counts as fresh.
    #[must_use]
    pub fn is_fresh(&self, now: i64, poll_interval: Duration) -> bool {
        match self.last_fetch {
            None => !self.messages.is_empty(),
            Some(at) => {
                let max_age = i64::try_from(poll_interval.as_secs().saturating_mul(2)).unwrap_or(i64::MAX);
                now.saturating_sub(at) <= max_age
            }
        }
    }

    /// True until the first fetch has been recorded.
    ///
    /// An empty known set after a fetch means the mailbox was empty, not
    /// that nothing has been seen.
    #[must_use]
    pub fn never_synced(&self) -> bool {
        self.last_fetch.is_none() && self.known_ids.is_empty()
    }

    /// Replaces the contents with a fresh fetch and returns the new arrivals.
    ///
    /// The first cycle reports nothing: everything already present counts as
    /// seen.
    pub fn replace(&mut self, fresh: Vec<Message>, now: i64) -> Vec<Message> {
        let arrivals: Vec<Message> = if self.never_synced() {
            Vec::new()
        } else {
            diff_new_ids(&self.known_ids, &fresh)
                .into_iter()
                .cloned()
                .collect()
        };
        self.known_ids = fresh.iter().map(|m| m.message_id.clone()).collect();
        self.messages = fresh;
        self.last_fetch = Some(now);
        arrivals
    }
}

/// A read-only view of the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSnapshot {
    /// Messages, most recent first.
    pub messages: Vec<Message>,
    /// Unix seconds of the last successful fetch.
    pub last_fetch: Option<i64>,
    /// Whether the cache is within its freshness window.
    pub fresh: bool,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn message(uid: u32, id: &str) -> Message {
        Message {
            uid,
            message_id: id.to_string(),
            thread_id: id.to_string(),
            in_reply_to: None,
            references: None,
            from: "Ada".to_string(),
            subject: format!("message {uid}"),
            date: "Mon, 3 Feb 2025 10:00:00 +0000".to_string(),
            body: "preview".to_string(),
            truncated: true,
            attachments: Vec::new(),
        }
    }

    #[test]
    fn test_freshness() {
        let interval = Duration::from_secs(300);
        let mut cache = Cache::default();
        assert!(!cache.is_fresh(1_000, interval));

        cache.messages.push(message(1, "<a@x>"));
        assert!(cache.is_fresh(1_000, interval));

        cache.last_fetch = Some(1_000);
        assert!(cache.is_fresh(1_600, interval));
        assert!(!cache.is_fresh(1_601, interval));
    }

    #[test]
    fn test_replace_reports_and_rotates() {
        let mut cache = Cache::default();
        cache.known_ids = ["<a@x>", "<b@x>"].iter().map(ToString::to_string).collect();

        let arrivals = cache.replace(vec![message(3, "<c@x>"), message(2, "<b@x>")], 50);
        let ids: Vec<&str> = arrivals.iter().map(|m| m.message_id.as_str()).collect();
        assert_eq!(ids, vec!["<c@x>"]);

        let known: Vec<&str> = cache.known_ids.iter().map(String::as_str).collect();
        assert_eq!(known, vec!["<b@x>", "<c@x>"]);
        assert_eq!(cache.messages.len(), 2);
        assert_eq!(cache.last_fetch, Some(50));
    }

    #[test]
    fn test_first_cycle_reports_nothing() {
        let mut cache = Cache::default();
        let arrivals = cache.replace(vec![message(1, "<a@x>")], 10);
        assert!(arrivals.is_empty());
        assert_eq!(cache.known_ids.len(), 1);
    }

    #[test]
    fn test_first_delivery_into_empty_mailbox() {
        let mut cache = Cache::default();
        assert!(cache.replace(Vec::new(), 10).is_empty());
        assert!(!cache.never_synced());

        let arrivals = cache.replace(vec![message(1, "<new@x>")], 20);
        assert_eq!(arrivals.len(), 1);
        assert_eq!(arrivals[0].message_id, "<new@x>");
    }

    #[test]
    fn test_known_ids_without_timestamp_still_diff() {
        let mut cache = Cache::default();
        cache.known_ids.insert("<a@x>".to_string());

        let arrivals = cache.replace(vec![message(2, "<b@x>"), message(1, "<a@x>")], 10);
        assert_eq!(arrivals.len(), 1);
        assert_eq!(arrivals[0].message_id, "<b@x>");
    }

    #[test]
    fn test_unchanged_poll_reports_nothing() {
        let mut cache = Cache::default();
        cache.replace(vec![message(1, "<a@x>")], 10);
        assert!(cache.replace(vec![message(1, "<a@x>")], 20).is_empty());
        assert!(cache.replace(vec![message(1, "<a@x>")], 30).is_empty());
    }
}
