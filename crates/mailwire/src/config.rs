//! Configuration file handling.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use mailwire_core::{EngineOptions, ServerConfig};
use serde::Deserialize;

/// Contents of the JSON configuration file.
///
/// The server fields sit at the top level next to the optional engine
/// settings:
///
/// ```json
/// {
///   "imap_host": "imap.example.com",
///   "smtp_host": "smtp.example.com",
///   "username": "ada@example.com",
///   "password": "app-password",
///   "poll_interval_secs": 120
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct CliConfig {
    /// Account and server details.
    #[serde(flatten)]
    pub server: ServerConfig,
    /// Background sync interval.
    #[serde(default)]
    pub poll_interval_secs: Option<u64>,
    /// Cache directory override.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
}

impl CliConfig {
    /// Reads and parses `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("parsing config file {}", path.display()))
    }

    /// Engine options derived from the file.
    pub fn options(&self) -> EngineOptions {
        let mut options = EngineOptions::default();
        if let Some(secs) = self.poll_interval_secs {
            options = options.poll_interval(Duration::from_secs(secs.max(1)));
        }
        if let Some(dir) = &self.cache_dir {
            options = options.cache_dir(dir);
        }
        options
    }
}

/// `<config dir>/mailwire/config.json`.
pub fn default_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mailwire")
        .join("config.json")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_flattened_server_fields() {
        let config: CliConfig = serde_json::from_str(
            r#"{
                "imap_host": "imap.example.com",
                "imap_port": 1993,
                "smtp_host": "smtp.example.com",
                "username": "ada@example.com",
                "password": "pw",
                "poll_interval_secs": 60,
                "cache_dir": "/tmp/mailwire-cli"
            }"#,
        )
        .unwrap();
        assert_eq!(config.server.imap_port, 1993);
        assert_eq!(config.server.smtp_port, 465);

        let options = config.options();
        assert_eq!(options.poll_interval, Duration::from_secs(60));
        assert_eq!(options.resolved_cache_dir(), PathBuf::from("/tmp/mailwire-cli"));
    }

    #[test]
    fn test_load_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{").unwrap();
        let err = CliConfig::load(&path).unwrap_err();
        assert!(format!("{err:#}").contains("config.json"));
    }
}
