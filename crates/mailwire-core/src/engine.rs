//! The engine facade.
//!
//! [`MailEngine`] owns the configuration, the cache and the background sync
//! task behind one async mutex. Every operation copies the configuration
//! out, opens its own connection and re-enters the lock only to publish
//! results; the lock is never held across network I/O.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use mailwire_imap::connection::ReadPolicy;
use mailwire_imap::{Message, Session};
use mailwire_mime::OutgoingMessage;
use mailwire_smtp::{Dialogue, Submission};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::attachments::{self, DownloadedAttachment};
use crate::cache::sync::SyncHandle;
use crate::cache::{Cache, CacheSnapshot, CacheStore, NewMessageHandler};
use crate::config::{EngineOptions, ServerConfig};
use crate::connector::{Connector, TlsConnector};
use crate::request::{
    ForwardMail, ForwardedMessage, OutgoingMail, ReplyMail, SEARCH_LIMIT, SearchQuery, bracketed,
    thread_criteria,
};
use crate::{Error, Result};

/// Most messages a summary fetch returns.
pub const SUMMARY_LIMIT: usize = 20;

/// The mail engine.
///
/// Cloning is cheap; clones share state.
pub struct MailEngine<C: Connector = TlsConnector> {
    inner: Arc<Inner<C>>,
}

impl<C: Connector> Clone for MailEngine<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Connector> std::fmt::Debug for MailEngine<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailEngine")
            .field("options", &self.inner.options)
            .finish_non_exhaustive()
    }
}

struct Inner<C> {
    connector: C,
    options: EngineOptions,
    store: CacheStore,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    config: Option<ServerConfig>,
    cache: Option<Cache>,
    sync: Option<SyncHandle>,
    handler: Option<NewMessageHandler>,
}

impl MailEngine<TlsConnector> {
    /// Creates an engine that connects over implicit TLS.
    #[must_use]
    pub fn tls(options: EngineOptions) -> Self {
        let connector = TlsConnector::new(options.connect_timeout);
        Self::new(connector, options)
    }
}

impl<C: Connector> MailEngine<C> {
    /// Creates an engine using `connector` for every connection.
    #[must_use]
    pub fn new(connector: C, options: EngineOptions) -> Self {
        let store = CacheStore::new(options.resolved_cache_dir());
        Self {
            inner: Arc::new(Inner {
                connector,
                options,
                store,
                state: Mutex::new(State::default()),
            }),
        }
    }

    /// Engine options.
    #[must_use]
    pub fn options(&self) -> &EngineOptions {
        &self.inner.options
    }

    /// Sets the server configuration, replacing any previous one.
    pub async fn configure(&self, config: ServerConfig) {
        let mut state = self.inner.state.lock().await;
        if state.config.as_ref() == Some(&config) {
            return;
        }
        info!(
            imap = %config.imap_host,
            smtp = %config.smtp_host,
            username = %config.username,
            "engine configured"
        );
        state.config = Some(config);
    }

    /// True once [`configure`](Self::configure) has been called.
    pub async fn is_configured(&self) -> bool {
        self.inner.state.lock().await.config.is_some()
    }

    async fn config(&self) -> Result<ServerConfig> {
        self.inner
            .state
            .lock()
            .await
            .config
            .clone()
            .ok_or(Error::NotConfigured)
    }

    // ---- Retrieval ----

    /// Fetches previews of the most recent messages, newest first.
    ///
    /// At most [`SUMMARY_LIMIT`] messages are returned.
    ///
    /// # Errors
    ///
    /// Returns `NotConfigured` before any I/O, or the connection, login or
    /// read failure.
    pub async fn fetch_summaries(&self, count: usize) -> Result<Vec<Message>> {
        let config = self.config().await?;
        self.summaries(&config, count).await
    }

    async fn summaries(&self, config: &ServerConfig, count: usize) -> Result<Vec<Message>> {
        let count = u32::try_from(count.min(SUMMARY_LIMIT)).unwrap_or(0);
        if count == 0 {
            return Ok(Vec::new());
        }

        let mut session = self.open_imap(config).await?;
        let result = async {
            let total = session.select(&self.inner.options.mailbox).await?;
            session.fetch_recent(total, count).await
        }
        .await;
        finish(session, result).await
    }

    /// Fetches complete messages by UID, in the order given.
    ///
    /// # Errors
    ///
    /// Returns `NotConfigured` before any I/O, or the connection, login or
    /// read failure.
    pub async fn fetch_full(&self, uids: &[u32]) -> Result<Vec<Message>> {
        let config = self.config().await?;
        self.full(&config, uids).await
    }

    async fn full(&self, config: &ServerConfig, uids: &[u32]) -> Result<Vec<Message>> {
        if uids.is_empty() {
            return Ok(Vec::new());
        }

        let mut session = self.open_imap(config).await?;
        let result = async {
            session.select(&self.inner.options.mailbox).await?;
            session.fetch_uids(uids, true).await
        }
        .await;
        finish(session, result).await
    }

    /// Searches a mailbox, newest first.
    ///
    /// A query with only a folder lists that folder.
    ///
    /// # Errors
    ///
    /// Returns `NotConfigured` before any I/O, `InvalidRequest` for a query
    /// with neither criteria nor folder, or the connection, login or read
    /// failure.
    pub async fn search(&self, query: &SearchQuery) -> Result<Vec<Message>> {
        let config = self.config().await?;
        let criteria = match (query.criteria(), &query.folder) {
            (Some(criteria), _) => criteria,
            (None, Some(_)) => mailwire_imap::command::SearchCriteria::all(),
            (None, None) => {
                return Err(Error::InvalidRequest(
                    "search needs a criterion or a folder".to_string(),
                ));
            }
        };
        let mailbox = query
            .folder
            .clone()
            .unwrap_or_else(|| self.inner.options.mailbox.clone());
        let limit = query.effective_limit();

        let mut session = self.open_imap(&config).await?;
        let result = async {
            session.select(&mailbox).await?;
            let mut uids = session.search(criteria).await?;
            uids.sort_unstable_by(|a, b| b.cmp(a));
            uids.truncate(limit);
            debug!(mailbox = %mailbox, hits = uids.len(), "search complete");
            session.fetch_uids(&uids, false).await
        }
        .await;
        finish(session, result).await
    }

    /// Fetches every message linked to `message_id`, oldest first.
    ///
    /// Linked means the message itself, messages naming it as parent or
    /// ancestor, and the same for its thread root.
    ///
    /// # Errors
    ///
    /// Returns `NotConfigured` before any I/O, or the connection, login or
    /// read failure.
    pub async fn fetch_thread(&self, message_id: &str) -> Result<Vec<Message>> {
        let config = self.config().await?;
        let id = bracketed(message_id);

        let mut session = self.open_imap(&config).await?;
        let result = async {
            session.select(&self.inner.options.mailbox).await?;
            let mut uids: BTreeSet<u32> = session.search(thread_criteria(&id)).await?.into_iter().collect();
            let mut messages = session.fetch_uids(&newest(&uids), true).await?;

            let root = messages
                .iter()
                .find(|m| m.message_id == id)
                .map(|m| m.thread_id.clone())
                .filter(|root| *root != id);
            if let Some(root) = root {
                let extra: Vec<u32> = session
                    .search(thread_criteria(&root))
                    .await?
                    .into_iter()
                    .filter(|uid| uids.insert(*uid))
                    .collect();
                if !extra.is_empty() {
                    messages.extend(session.fetch_uids(&extra, true).await?);
                }
            }

            messages.sort_by_key(|m| m.uid);
            let excess = messages.len().saturating_sub(SEARCH_LIMIT);
            messages.drain(..excess);
            Ok::<_, mailwire_imap::Error>(messages)
        }
        .await;
        let messages = finish(session, result).await?;
        debug!(id = %id, messages = messages.len(), "thread fetched");
        Ok(messages)
    }

    // ---- Attachments ----

    /// Downloads and decodes one attachment.
    ///
    /// # Errors
    ///
    /// Returns `NotConfigured` before any I/O, `AttachmentNotFound` for an
    /// unknown locator, or the retrieval failure.
    pub async fn download_attachment(&self, uid: u32, locator: &str) -> Result<DownloadedAttachment> {
        let mut parts = self.download(uid, &[locator.to_string()]).await?;
        parts.pop().unwrap_or_else(|| {
            Err(Error::AttachmentNotFound {
                uid,
                locator: locator.to_string(),
            })
        })
    }

    /// Downloads several attachments of one message over one connection.
    ///
    /// Parts that fail are logged and left out.
    ///
    /// # Errors
    ///
    /// Returns `NotConfigured` before any I/O, or a failure that prevents
    /// every part from being fetched.
    pub async fn download_all_attachments(
        &self,
        uid: u32,
        locators: &[String],
    ) -> Result<Vec<DownloadedAttachment>> {
        let parts = self.download(uid, locators).await?;
        Ok(parts
            .into_iter()
            .filter_map(|part| {
                part.inspect_err(|e| warn!(uid, error = %e, "attachment skipped"))
                    .ok()
            })
            .collect())
    }

    async fn download(&self, uid: u32, locators: &[String]) -> Result<Vec<Result<DownloadedAttachment>>> {
        let config = self.config().await?;
        if locators.is_empty() {
            return Ok(Vec::new());
        }

        let mut session = self.open_imap(&config).await?;
        let result = match session.select(&self.inner.options.mailbox).await {
            Ok(_) => attachments::fetch_parts(&mut session, uid, locators).await,
            Err(e) => Err(e.into()),
        };

        let broken = match &result {
            Ok(parts) => parts.iter().any(|p| p.as_ref().is_err_and(breaks_session)),
            Err(e) => breaks_session(e),
        };
        release(session, !broken).await;
        result
    }

    // ---- Submission ----

    /// Sends a new message.
    ///
    /// # Errors
    ///
    /// Returns `NotConfigured` before any I/O, `InvalidRequest` without
    /// recipients, or the submission failure.
    pub async fn send(&self, mail: OutgoingMail) -> Result<()> {
        let config = self.config().await?;
        let message = mail.compose(config.sender());
        self.submit(&config, &message).await
    }

    /// Sends a reply carrying threading headers.
    ///
    /// # Errors
    ///
    /// As for [`send`](Self::send).
    pub async fn reply(&self, mail: ReplyMail) -> Result<()> {
        let config = self.config().await?;
        let message = mail.compose(config.sender());
        self.submit(&config, &message).await
    }

    /// Sends a forward.
    ///
    /// # Errors
    ///
    /// As for [`send`](Self::send).
    pub async fn forward(&self, mail: ForwardMail) -> Result<()> {
        let config = self.config().await?;
        let message = mail.compose(config.sender());
        self.submit(&config, &message).await
    }

    /// Forwards a stored message with its attachments.
    ///
    /// # Errors
    ///
    /// Returns `NotConfigured` before any I/O, `InvalidRequest` if no
    /// message has that UID, or the retrieval or submission failure.
    pub async fn forward_message(&self, uid: u32, to: Vec<String>, note: &str) -> Result<()> {
        let config = self.config().await?;

        let mut session = self.open_imap(&config).await?;
        let result = async {
            session.select(&self.inner.options.mailbox).await?;
            let original = session
                .fetch_uids(&[uid], true)
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| Error::InvalidRequest(format!("no message with UID {uid}")))?;
            let locators: Vec<String> = original
                .attachments
                .iter()
                .map(|a| a.locator.clone())
                .collect();
            let parts = if locators.is_empty() {
                Vec::new()
            } else {
                attachments::fetch_parts(&mut session, uid, &locators).await?
            };
            Ok::<_, Error>((original, parts))
        }
        .await;
        let broken = result.as_ref().is_err_and(breaks_session);
        release(session, !broken).await;
        let (original, parts) = result?;

        let attachments = parts
            .into_iter()
            .filter_map(|part| match part {
                Ok(part) => Some(part.into_outgoing()),
                Err(e) => {
                    warn!(uid, error = %e, "attachment left out of forward");
                    None
                }
            })
            .collect();

        let mail = ForwardMail {
            to,
            cc: Vec::new(),
            note: note.to_string(),
            original: ForwardedMessage::from(&original),
            attachments,
        };
        self.submit(&config, &mail.compose(config.sender())).await
    }

    async fn submit(&self, config: &ServerConfig, message: &OutgoingMessage) -> Result<()> {
        reject_line_breaks(message)?;
        let recipients: Vec<String> = message
            .envelope_recipients()
            .into_iter()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(ToString::to_string)
            .collect();
        if recipients.is_empty() {
            return Err(Error::InvalidRequest("message has no recipients".to_string()));
        }

        let submission = Submission {
            username: config.username.clone(),
            password: config.password.clone(),
            sender: config.username.clone(),
            recipients,
            message: message.render().into_bytes(),
        };
        let options = &self.inner.options;
        let dialogue = Dialogue::submission(&submission)
            .with_timeouts(options.smtp_step_timeout, options.smtp_deadline);

        let stream = self
            .inner
            .connector
            .connect(&config.smtp_host, config.smtp_port)
            .await?;
        dialogue.run(stream).await?;

        info!(recipients = submission.recipients.len(), "message submitted");
        Ok(())
    }

    // ---- Cache and background sync ----

    /// Starts the background sync loop. Does nothing if it is running.
    ///
    /// # Errors
    ///
    /// Returns `NotConfigured` if no configuration has been set.
    pub async fn start_background_sync(&self) -> Result<()> {
        self.config().await?;
        self.ensure_cache().await;

        let mut state = self.inner.state.lock().await;
        if state.sync.as_ref().is_some_and(SyncHandle::is_running) {
            debug!("background sync already running");
            return Ok(());
        }
        state.sync = Some(SyncHandle::spawn(self.clone(), self.inner.options.poll_interval));
        Ok(())
    }

    /// Stops the background sync loop, waiting for the current cycle to
    /// finish. Does nothing if it is not running.
    pub async fn stop_background_sync(&self) {
        let handle = self.inner.state.lock().await.sync.take();
        if let Some(handle) = handle {
            handle.stop().await;
        }
    }

    /// True while the background loop is running.
    pub async fn is_syncing(&self) -> bool {
        self.inner
            .state
            .lock()
            .await
            .sync
            .as_ref()
            .is_some_and(SyncHandle::is_running)
    }

    /// Sets the callback for newly arrived messages, replacing any previous one.
    pub async fn set_new_message_handler<F>(&self, handler: F)
    where
        F: Fn(&[Message]) + Send + Sync + 'static,
    {
        self.inner.state.lock().await.handler = Some(Arc::new(handler));
    }

    /// Runs one sync cycle and returns the number of new arrivals.
    ///
    /// The cache is replaced with a fresh summary fetch. New arrivals are
    /// refetched whole and passed to the handler, then the cache is saved.
    ///
    /// # Errors
    ///
    /// Returns `NotConfigured`, the retrieval failure, or a `Storage` error
    /// from saving.
    pub async fn sync_now(&self) -> Result<usize> {
        let config = self.config().await?;
        let fresh = self.summaries(&config, SUMMARY_LIMIT).await?;
        let now = Utc::now().timestamp();

        self.ensure_cache().await;
        let (arrivals, snapshot, handler) = {
            let mut state = self.inner.state.lock().await;
            let cache = state.cache.get_or_insert_with(Cache::default);
            let arrivals = cache.replace(fresh, now);
            (arrivals, cache.clone(), state.handler.clone())
        };

        let count = arrivals.len();
        if count > 0 {
            info!(count, "new messages");
            if let Some(handler) = handler {
                let delivered = self.complete_arrivals(&config, arrivals).await;
                handler(delivered.as_slice());
            }
        }

        self.inner.store.save_async(snapshot).await?;
        Ok(count)
    }

    /// Refetches arrivals whole, keeping the previews if that fails.
    async fn complete_arrivals(&self, config: &ServerConfig, arrivals: Vec<Message>) -> Vec<Message> {
        let uids: Vec<u32> = arrivals.iter().map(|m| m.uid).collect();
        match self.full(config, &uids).await {
            Ok(full) if !full.is_empty() => full,
            Ok(_) => arrivals,
            Err(e) => {
                warn!(error = %e, "full fetch of new messages failed, delivering previews");
                arrivals
            }
        }
    }

    /// Cached messages, loading the cache from disk on first use.
    pub async fn cached_messages(&self) -> Vec<Message> {
        self.cache_snapshot().await.messages
    }

    /// A view of the cache, loading it from disk on first use.
    pub async fn cache_snapshot(&self) -> CacheSnapshot {
        self.ensure_cache().await;
        let mut state = self.inner.state.lock().await;
        let cache = state.cache.get_or_insert_with(Cache::default);
        CacheSnapshot {
            messages: cache.messages.clone(),
            last_fetch: cache.last_fetch,
            fresh: cache.is_fresh(Utc::now().timestamp(), self.inner.options.poll_interval),
        }
    }

    /// Loads the cache from disk unless it is already in memory.
    ///
    /// The disk read runs without holding the state lock.
    async fn ensure_cache(&self) {
        if self.inner.state.lock().await.cache.is_some() {
            return;
        }
        let loaded = self.inner.store.load_async().await.unwrap_or_else(|e| {
            warn!(error = %e, "cache unreadable, starting empty");
            Cache::default()
        });
        self.inner.state.lock().await.cache.get_or_insert(loaded);
    }

    // ---- Connections ----

    /// Connects, reads the greeting and logs in.
    async fn open_imap(&self, config: &ServerConfig) -> Result<Session<C::Stream>> {
        let options = &self.inner.options;
        let stream = self
            .inner
            .connector
            .connect(&config.imap_host, config.imap_port)
            .await?;
        let mut session = Session::from_stream(stream).await?.with_timeouts(
            ReadPolicy::standard().with_timeout(options.read_timeout),
            ReadPolicy::large().with_timeout(options.large_read_timeout),
        );

        if let Err(e) = session.login(&config.username, &config.password).await {
            release(session, !e.is_transport()).await;
            return Err(e.into());
        }
        Ok(session)
    }
}

/// Logs out unless the stream is broken, then passes `result` through.
async fn finish<S, T>(session: Session<S>, result: mailwire_imap::Result<T>) -> Result<T>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let healthy = !result.as_ref().is_err_and(mailwire_imap::Error::is_transport);
    release(session, healthy).await;
    result.map_err(Into::into)
}

async fn release<S>(session: Session<S>, healthy: bool)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if healthy {
        session.logout().await;
    } else {
        debug!("dropping IMAP session without LOGOUT");
    }
}

/// Rejects addresses and threading ids that would split an SMTP command
/// or a header line.
fn reject_line_breaks(message: &OutgoingMessage) -> Result<()> {
    let has_break = |value: &str| value.contains(['\r', '\n']);
    if let Some(bad) = message.envelope_recipients().into_iter().find(|r| has_break(*r)) {
        return Err(Error::InvalidRequest(format!(
            "recipient {bad:?} contains a line break"
        )));
    }
    if let Some(threading) = &message.threading {
        if has_break(&threading.in_reply_to) || has_break(&threading.references) {
            return Err(Error::InvalidRequest(
                "threading headers contain a line break".to_string(),
            ));
        }
    }
    Ok(())
}

/// Errors after which the stream cannot carry a LOGOUT.
const fn breaks_session(e: &Error) -> bool {
    matches!(
        e,
        Error::Timeout(_) | Error::WriteFailed(_) | Error::ConnectionFailed(_)
    )
}

/// The newest [`SEARCH_LIMIT`] UIDs, ascending.
fn newest(uids: &BTreeSet<u32>) -> Vec<u32> {
    let skip = uids.len().saturating_sub(SEARCH_LIMIT);
    uids.iter().skip(skip).copied().collect()
}
