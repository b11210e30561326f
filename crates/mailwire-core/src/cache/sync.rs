//! Background synchronization loop.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use mailwire_imap::Message;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::MailEngine;
use crate::connector::Connector;

/// Callback invoked with newly arrived messages.
pub type NewMessageHandler = Arc<dyn Fn(&[Message]) + Send + Sync>;

/// Messages in `fresh` whose id is not in `known`.
#[must_use]
pub fn diff_new_ids<'a>(known: &BTreeSet<String>, fresh: &'a [Message]) -> Vec<&'a Message> {
    fresh
        .iter()
        .filter(|m| !known.contains(&m.message_id))
        .collect()
}

/// A running sync loop.
#[derive(Debug)]
pub(crate) struct SyncHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl SyncHandle {
    /// Spawns the loop on the current runtime.
    pub(crate) fn spawn<C: Connector>(engine: MailEngine<C>, interval: Duration) -> Self {
        let token = CancellationToken::new();
        let task = tokio::spawn(run(engine, interval, token.clone()));
        Self { token, task }
    }

    pub(crate) fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Requests a stop and waits for the current iteration to finish.
    pub(crate) async fn stop(self) {
        self.token.cancel();
        if let Err(e) = self.task.await {
            warn!(error = %e, "sync task ended abnormally");
        }
    }
}

async fn run<C: Connector>(engine: MailEngine<C>, interval: Duration, token: CancellationToken) {
    info!(?interval, "background sync started");
    let mut cycles = 0u64;

    loop {
        cycles += 1;
        match engine.sync_now().await {
            Ok(arrivals) => debug!(cycle = cycles, arrivals, "sync cycle complete"),
            Err(e) => warn!(cycle = cycles, error = %e, "sync cycle failed"),
        }

        tokio::select! {
            () = token.cancelled() => break,
            () = tokio::time::sleep(interval) => {}
        }
    }

    info!(cycles, "background sync stopped");
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::cache::tests::message;

    fn known(ids: &[&str]) -> BTreeSet<String> {
        ids.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_diff_reports_only_unknown() {
        let fresh = vec![message(3, "<c@x>"), message(2, "<b@x>")];
        let new = diff_new_ids(&known(&["<a@x>", "<b@x>"]), &fresh);
        assert_eq!(new.len(), 1);
        assert_eq!(new[0].message_id, "<c@x>");
    }

    #[test]
    fn test_diff_empty_known_reports_everything() {
        let fresh = vec![message(2, "<b@x>"), message(1, "<a@x>")];
        assert_eq!(diff_new_ids(&BTreeSet::new(), &fresh).len(), 2);
    }

    #[test]
    fn test_diff_all_known() {
        let fresh = vec![message(1, "<a@x>")];
        assert!(diff_new_ids(&known(&["<a@x>"]), &fresh).is_empty());
    }
}
