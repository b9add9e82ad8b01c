//! File-backed key-value store.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use crate::error::{Error, ErrorKind, Result};
use crate::store::KeyValueStore;

/// Stores each key as one file under a base directory.
///
/// Files are written with mode 0600 on Unix since they hold session tokens.
#[derive(Debug, Clone)]
pub struct FileStore {
    base_path: PathBuf,
}

impl FileStore {
    /// Store under the default directory for the given application id.
    ///
    /// Default path: `~/.parse/<application id>/`
    pub fn for_application(application_id: &str) -> Result<Self> {
        Ok(Self {
            base_path: default_store_dir()?.join(sanitize(application_id)),
        })
    }

    /// Store under a custom directory.
    pub fn with_path(path: impl AsRef<Path>) -> Self {
        Self {
            base_path: path.as_ref().to_path_buf(),
        }
    }

    /// The directory holding the stored values.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.base_path.join(format!("{}.json", sanitize(key)))
    }

    /// List stored keys (sanitized form).
    pub async fn keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.base_path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(keys),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().map(|e| e == "json").unwrap_or(false) {
                if let Some(stem) = path.file_stem() {
                    keys.push(stem.to_string_lossy().to_string());
                }
            }
        }
        Ok(keys)
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        match tokio::fs::read(self.entry_path(key)).await {
            Ok(bytes) => Ok(Some(Bytes::from(bytes))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: Bytes) -> Result<()> {
        tokio::fs::create_dir_all(&self.base_path).await?;

        let path = self.entry_path(key);
        tokio::fs::write(&path, &value).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            tokio::fs::set_permissions(&path, perms).await?;
        }

        debug!(key, bytes = value.len(), "Stored value");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        match tokio::fs::remove_file(self.entry_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn clear(&self) -> Result<()> {
        for key in self.keys().await? {
            self.delete(&key).await?;
        }
        Ok(())
    }
}

/// Map a key to a safe file name.
fn sanitize(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// The default base directory for file stores.
pub fn default_store_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| {
        Error::new(ErrorKind::Config(
            "Could not find home directory".to_string(),
        ))
    })?;

    Ok(home.join(".parse"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_file_store_set_get() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::with_path(temp_dir.path());

        store
            .set("_currentUser", Bytes::from_static(br#"{"objectId":"u1"}"#))
            .await
            .unwrap();

        let loaded = store.get("_currentUser").await.unwrap().unwrap();
        assert_eq!(loaded.as_ref(), br#"{"objectId":"u1"}"#);
    }

    #[tokio::test]
    async fn test_file_store_missing_and_delete() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::with_path(temp_dir.path().join("nested"));

        assert!(store.get("missing").await.unwrap().is_none());
        store.delete("missing").await.unwrap();

        store.set("k", Bytes::from_static(b"v")).await.unwrap();
        store.delete("k").await.unwrap();
        assert!(store.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_store_keys_and_clear() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::with_path(temp_dir.path());

        store.set("a", Bytes::from_static(b"1")).await.unwrap();
        store.set("b", Bytes::from_static(b"2")).await.unwrap();

        let mut keys = store.keys().await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);

        store.clear().await.unwrap();
        assert!(store.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_key_sanitization() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::with_path(temp_dir.path());

        store
            .set("../escape/attempt", Bytes::from_static(b"x"))
            .await
            .unwrap();

        let path = store.entry_path("../escape/attempt");
        assert_eq!(path.parent().unwrap(), temp_dir.path());
        assert!(path
            .file_name()
            .unwrap()
            .to_str()
            .unwrap()
            .contains("___escape_attempt"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_file_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::with_path(temp_dir.path());
        store.set("secret", Bytes::from_static(b"r:token")).await.unwrap();

        let mode = std::fs::metadata(store.entry_path("secret"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
