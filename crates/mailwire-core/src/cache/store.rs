//! On-disk cache storage.

use std::collections::BTreeSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use mailwire_imap::Message;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::Cache;
use crate::Result;

const MESSAGES_FILE: &str = "messages.json";
const LAST_FETCH_FILE: &str = "last_fetch";
const KNOWN_IDS_FILE: &str = "known_ids.json";

/// Reads and writes the cache as three independent files.
///
/// Each file is replaced atomically, so an interrupted save leaves every
/// file either old or new, never half-written.
#[derive(Debug, Clone)]
pub struct CacheStore {
    dir: PathBuf,
}

impl CacheStore {
    /// Creates a store rooted at `dir`. Nothing is touched until a save.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The directory holding the cache files.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Loads the cache.
    ///
    /// Missing files load as empty; unreadable contents are discarded with a
    /// warning.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if a file exists but cannot be read.
    pub fn load(&self) -> Result<Cache> {
        let messages: Vec<Message> = self.read_json(MESSAGES_FILE)?.unwrap_or_default();
        let known_ids: BTreeSet<String> = self.read_json(KNOWN_IDS_FILE)?.unwrap_or_default();
        let last_fetch = self.read_text(LAST_FETCH_FILE)?.and_then(|text| {
            text.trim()
                .parse::<i64>()
                .inspect_err(|e| warn!(error = %e, "discarding unreadable fetch timestamp"))
                .ok()
        });

        debug!(
            dir = %self.dir.display(),
            messages = messages.len(),
            known = known_ids.len(),
            "cache loaded"
        );
        Ok(Cache {
            messages,
            last_fetch,
            known_ids,
        })
    }

    /// Saves the cache.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the directory or any file cannot be written.
    pub fn save(&self, cache: &Cache) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        self.write_atomic(MESSAGES_FILE, &serde_json::to_vec(&cache.messages)?)?;
        if let Some(at) = cache.last_fetch {
            self.write_atomic(LAST_FETCH_FILE, at.to_string().as_bytes())?;
        }
        self.write_atomic(KNOWN_IDS_FILE, &serde_json::to_vec(&cache.known_ids)?)?;
        Ok(())
    }

    /// [`load`](Self::load) on the blocking thread pool.
    ///
    /// # Errors
    ///
    /// As for [`load`](Self::load), or `Storage` if the blocking task dies.
    pub async fn load_async(&self) -> Result<Cache> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.load())
            .await
            .map_err(io::Error::other)?
    }

    /// [`save`](Self::save) on the blocking thread pool.
    ///
    /// # Errors
    ///
    /// As for [`save`](Self::save), or `Storage` if the blocking task dies.
    pub async fn save_async(&self, cache: Cache) -> Result<()> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.save(&cache))
            .await
            .map_err(io::Error::other)?
    }

    fn read_text(&self, name: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.dir.join(name)) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn read_json<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        let Some(text) = self.read_text(name)? else {
            return Ok(None);
        };
        match serde_json::from_str(&text) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!(file = name, error = %e, "discarding unreadable cache file");
                Ok(None)
            }
        }
    }

    fn write_atomic(&self, name: &str, data: &[u8]) -> Result<()> {
        let mut file = tempfile::NamedTempFile::new_in(&self.dir)?;
        file.write_all(data)?;
        file.as_file().sync_all()?;
        file.persist(self.dir.join(name)).map_err(|e| e.error)?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::cache::tests::message;

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path().join("cache"));

        let mut cache = Cache::default();
        cache.replace(vec![message(2, "<b@x>"), message(1, "<a@x>")], 1_700_000_000);
        store.save(&cache).unwrap();

        assert_eq!(store.load().unwrap(), cache);
        let stamp = fs::read_to_string(store.dir().join(LAST_FETCH_FILE)).unwrap();
        assert_eq!(stamp, "1700000000");
    }

    #[test]
    fn test_missing_directory_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path().join("absent"));
        assert_eq!(store.load().unwrap(), Cache::default());
    }

    #[test]
    fn test_corrupt_files_are_independent() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path());

        let mut cache = Cache::default();
        cache.replace(vec![message(1, "<a@x>")], 42);
        store.save(&cache).unwrap();

        fs::write(dir.path().join(MESSAGES_FILE), b"[{\"uid\":").unwrap();
        fs::write(dir.path().join(LAST_FETCH_FILE), b"yesterday").unwrap();

        let loaded = store.load().unwrap();
        assert!(loaded.messages.is_empty());
        assert_eq!(loaded.last_fetch, None);
        assert_eq!(loaded.known_ids, cache.known_ids);
    }

    #[test]
    fn test_save_replaces_previous() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path());

        let mut cache = Cache::default();
        cache.replace(vec![message(1, "<a@x>")], 1);
        store.save(&cache).unwrap();
        cache.replace(vec![message(2, "<b@x>")], 2);
        store.save(&cache).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.messages.len(), 1);
        assert_eq!(loaded.messages[0].uid, 2);
        assert_eq!(loaded.last_fetch, Some(2));
        // no temporary files left behind
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 3);
    }

    #[tokio::test]
    async fn test_async_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path().join("cache"));

        let mut cache = Cache::default();
        cache.replace(vec![message(1, "<a@x>")], 7);
        store.save_async(cache.clone()).await.unwrap();

        assert_eq!(store.load_async().await.unwrap(), cache);
        assert_eq!(store.load().unwrap(), cache);
    }
}
