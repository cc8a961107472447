//! SQLite-backed key-value store.

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use super::storage::KeyValueStore;
use crate::error::{Error, Result};

/// SQLite-based key-value store implementation.
///
/// Statements run on the blocking pool so a slow disk never stalls the runtime.
pub struct SqliteStore {
  conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
  /// Open the store at `path`, or at the default location when `None`.
  pub fn open(path: Option<&Path>) -> Result<Self> {
    let path = match path {
      Some(p) => p.to_path_buf(),
      None => Self::default_path()?,
    };

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| Error::storage(format!("failed to create store directory: {}", e)))?;
    }

    let conn = Connection::open(&path).map_err(|e| {
      Error::storage(format!(
        "failed to open store at {}: {}",
        path.display(),
        e
      ))
    })?;

    Self::with_connection(conn)
  }

  /// Open a throwaway store that lives only as long as this value.
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory().map_err(Error::storage)?;
    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    let store = Self {
      conn: Arc::new(Mutex::new(conn)),
    };
    store.run_migrations()?;
    Ok(store)
  }

  /// Get the default database path.
  fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| Error::storage("could not determine data directory"))?;

    Ok(data_dir.join("moteles").join("store.db"))
  }

  fn run_migrations(&self) -> Result<()> {
    lock(&self.conn)?
      .execute_batch(STORE_SCHEMA)
      .map_err(|e| Error::storage(format!("failed to run store migrations: {}", e)))
  }

  async fn with_conn<T, F>(&self, f: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
  {
    let conn = self.conn.clone();
    tokio::task::spawn_blocking(move || f(&mut *lock(&conn)?))
      .await
      .map_err(|e| Error::storage(format!("store task failed: {}", e)))?
  }
}

fn lock(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>> {
  conn
    .lock()
    .map_err(|e| Error::storage(format!("lock poisoned: {}", e)))
}

const STORE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv_store (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

#[async_trait]
impl KeyValueStore for SqliteStore {
  async fn get_item(&self, key: &str) -> Result<Option<String>> {
    let key = key.to_string();
    self
      .with_conn(move |conn| {
        conn
          .query_row(
            "SELECT value FROM kv_store WHERE key = ?",
            params![key],
            |row| row.get(0),
          )
          .optional()
          .map_err(|e| Error::storage(format!("failed to read {}: {}", key, e)))
      })
      .await
  }

  async fn set_item(&self, key: &str, value: &str) -> Result<()> {
    let (key, value) = (key.to_string(), value.to_string());
    self
      .with_conn(move |conn| {
        conn
          .execute(
            "INSERT OR REPLACE INTO kv_store (key, value) VALUES (?, ?)",
            params![key, value],
          )
          .map_err(|e| Error::storage(format!("failed to write {}: {}", key, e)))?;
        Ok(())
      })
      .await
  }

  async fn remove_item(&self, key: &str) -> Result<()> {
    let key = key.to_string();
    self
      .with_conn(move |conn| {
        conn
          .execute("DELETE FROM kv_store WHERE key = ?", params![key])
          .map_err(|e| Error::storage(format!("failed to remove {}: {}", key, e)))?;
        Ok(())
      })
      .await
  }

  async fn multi_remove(&self, keys: &[String]) -> Result<()> {
    let keys = keys.to_vec();
    self
      .with_conn(move |conn| {
        let tx = conn.transaction().map_err(Error::storage)?;
        {
          let mut stmt = tx
            .prepare("DELETE FROM kv_store WHERE key = ?")
            .map_err(Error::storage)?;
          for key in &keys {
            stmt
              .execute(params![key])
              .map_err(|e| Error::storage(format!("failed to remove {}: {}", key, e)))?;
          }
        }
        tx.commit().map_err(Error::storage)
      })
      .await
  }

  async fn get_all_keys(&self) -> Result<Vec<String>> {
    self
      .with_conn(|conn| {
        let mut stmt = conn
          .prepare("SELECT key FROM kv_store ORDER BY key")
          .map_err(Error::storage)?;

        let keys = stmt
          .query_map([], |row| row.get(0))
          .map_err(Error::storage)?
          .collect::<rusqlite::Result<Vec<String>>>()
          .map_err(Error::storage)?;

        Ok(keys)
      })
      .await
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_set_get_overwrite() {
    let store = SqliteStore::open_in_memory().unwrap();
    assert_eq!(store.get_item("a").await.unwrap(), None);

    store.set_item("a", "1").await.unwrap();
    store.set_item("a", "2").await.unwrap();
    assert_eq!(store.get_item("a").await.unwrap().as_deref(), Some("2"));
  }

  #[tokio::test]
  async fn test_multi_remove_and_keys() {
    let store = SqliteStore::open_in_memory().unwrap();
    for key in ["x", "y", "z"] {
      store.set_item(key, "v").await.unwrap();
    }

    store
      .multi_remove(&["x".to_string(), "z".to_string(), "missing".to_string()])
      .await
      .unwrap();

    assert_eq!(store.get_all_keys().await.unwrap(), vec!["y".to_string()]);
  }

  #[tokio::test]
  async fn test_file_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("store.db");

    {
      let store = SqliteStore::open(Some(&path)).unwrap();
      store.set_item("@favorites:items", "[\"a\"]").await.unwrap();
    }

    let store = SqliteStore::open(Some(&path)).unwrap();
    assert_eq!(
      store.get_item("@favorites:items").await.unwrap().as_deref(),
      Some("[\"a\"]")
    );
  }

  #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
  async fn test_concurrent_writes_all_land() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let writes = (0..32).map(|i| {
      let store = store.clone();
      tokio::spawn(async move { store.set_item(&format!("k{:02}", i), "v").await })
    });

    for result in futures::future::join_all(writes).await {
      result.unwrap().unwrap();
    }
    assert_eq!(store.get_all_keys().await.unwrap().len(), 32);
  }
}
