//! Server configuration and engine options.

use std::path::PathBuf;
use std::time::Duration;

use mailwire_mime::Mailbox;
use serde::{Deserialize, Serialize};

/// Default retrieval port (implicit TLS).
pub const DEFAULT_IMAP_PORT: u16 = 993;

/// Default submission port (implicit TLS).
pub const DEFAULT_SMTP_PORT: u16 = 465;

const fn default_imap_port() -> u16 {
    DEFAULT_IMAP_PORT
}

const fn default_smtp_port() -> u16 {
    DEFAULT_SMTP_PORT
}

/// Connection details for one account.
///
/// The values are used as given; nothing is validated until a connection is
/// attempted.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Retrieval server hostname.
    pub imap_host: String,
    /// Retrieval server port.
    #[serde(default = "default_imap_port")]
    pub imap_port: u16,
    /// Submission server hostname.
    pub smtp_host: String,
    /// Submission server port.
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    /// Account id; also the sender address.
    pub username: String,
    /// Account secret.
    pub password: String,
    /// Sender display name.
    #[serde(default)]
    pub display_name: Option<String>,
}

impl ServerConfig {
    /// Creates a configuration with the default ports.
    #[must_use]
    pub fn new(
        imap_host: impl Into<String>,
        smtp_host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            imap_host: imap_host.into(),
            imap_port: DEFAULT_IMAP_PORT,
            smtp_host: smtp_host.into(),
            smtp_port: DEFAULT_SMTP_PORT,
            username: username.into(),
            password: password.into(),
            display_name: None,
        }
    }

    /// Sets both ports.
    #[must_use]
    pub const fn with_ports(mut self, imap_port: u16, smtp_port: u16) -> Self {
        self.imap_port = imap_port;
        self.smtp_port = smtp_port;
        self
    }

    /// Sets the sender display name.
    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// The `From` mailbox for outgoing mail.
    #[must_use]
    pub fn sender(&self) -> Mailbox {
        Mailbox::new(self.display_name.as_deref(), self.username.clone())
    }
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("imap_host", &self.imap_host)
            .field("imap_port", &self.imap_port)
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("display_name", &self.display_name)
            .finish()
    }
}

/// Engine tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    /// Pause between background sync cycles.
    pub poll_interval: Duration,
    /// Cache directory; `None` uses the platform data directory.
    pub cache_dir: Option<PathBuf>,
    /// Bound on connect plus TLS handshake.
    pub connect_timeout: Duration,
    /// Bound on ordinary IMAP commands.
    pub read_timeout: Duration,
    /// Bound on full-body and attachment fetches.
    pub large_read_timeout: Duration,
    /// Bound on each SMTP reply.
    pub smtp_step_timeout: Duration,
    /// Bound on the whole SMTP dialogue.
    pub smtp_deadline: Duration,
    /// Mailbox used for summaries, sync and attachments.
    pub mailbox: String,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(300),
            cache_dir: None,
            connect_timeout: mailwire_imap::connection::CONNECT_TIMEOUT,
            read_timeout: Duration::from_secs(30),
            large_read_timeout: Duration::from_secs(120),
            smtp_step_timeout: mailwire_smtp::STEP_TIMEOUT,
            smtp_deadline: mailwire_smtp::DIALOGUE_TIMEOUT,
            mailbox: "INBOX".to_string(),
        }
    }
}

impl EngineOptions {
    /// Sets the background sync interval.
    #[must_use]
    pub const fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the cache directory.
    #[must_use]
    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    /// Sets the connect timeout.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the IMAP read timeouts.
    #[must_use]
    pub const fn read_timeouts(mut self, standard: Duration, large: Duration) -> Self {
        self.read_timeout = standard;
        self.large_read_timeout = large;
        self
    }

    /// Sets the SMTP timeouts.
    #[must_use]
    pub const fn smtp_timeouts(mut self, step: Duration, deadline: Duration) -> Self {
        self.smtp_step_timeout = step;
        self.smtp_deadline = deadline;
        self
    }

    /// Resolved cache directory.
    #[must_use]
    pub fn resolved_cache_dir(&self) -> PathBuf {
        self.cache_dir.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("mailwire")
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_secret() {
        let config = ServerConfig::new("imap.example.com", "smtp.example.com", "ada@example.com", "hunter2");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_deserialize_defaults_ports() {
        let config: ServerConfig = serde_json::from_str(
            r#"{"imap_host":"imap.example.com","smtp_host":"smtp.example.com","username":"ada@example.com","password":"pw"}"#,
        )
        .unwrap();
        assert_eq!(config.imap_port, 993);
        assert_eq!(config.smtp_port, 465);
        assert_eq!(config.display_name, None);
    }

    #[test]
    fn test_sender() {
        let config = ServerConfig::new("i", "s", "ada@example.com", "pw").with_display_name("Ada");
        let sender = config.sender();
        assert_eq!(sender.address, "ada@example.com");
        assert_eq!(sender.name.as_deref(), Some("Ada"));
    }

    #[test]
    fn test_options_builder() {
        let options = EngineOptions::default()
            .poll_interval(Duration::from_secs(60))
            .cache_dir("/tmp/mailwire-test");
        assert_eq!(options.poll_interval, Duration::from_secs(60));
        assert_eq!(options.resolved_cache_dir(), PathBuf::from("/tmp/mailwire-test"));
        assert_eq!(options.mailbox, "INBOX");
    }
}
