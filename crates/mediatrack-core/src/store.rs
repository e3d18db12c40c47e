//! Persistent hit storage for offline sessions
//!
//! Hits are stored as their persisted JSON strings, keyed by client session
//! id, and always read back in insertion order.

use crate::error::Result;
use std::sync::{Arc, Mutex, MutexGuard};

/// Append-only hit store keyed by session id
pub trait HitStore: Send {
    /// Distinct session ids in first-insertion order
    fn session_ids(&self) -> Result<Vec<String>>;

    fn append(&mut self, session_id: &str, hit: &str) -> Result<()>;

    /// Hits for one session in insertion order
    fn hits(&self, session_id: &str) -> Result<Vec<String>>;

    fn delete(&mut self, session_id: &str) -> Result<()>;

    fn delete_all(&mut self) -> Result<()>;
}

// =============================================================================
// In-memory store
// =============================================================================

/// Volatile store. Clones share the same rows.
#[derive(Debug, Clone, Default)]
pub struct MemoryHitStore {
    rows: Arc<Mutex<Vec<(String, String)>>>,
}

impl MemoryHitStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn rows(&self) -> MutexGuard<'_, Vec<(String, String)>> {
        match self.rows.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Total stored hits across sessions
    pub fn len(&self) -> usize {
        self.rows().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows().is_empty()
    }
}

impl HitStore for MemoryHitStore {
    fn session_ids(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = Vec::new();
        for (id, _) in self.rows().iter() {
            if !ids.contains(id) {
                ids.push(id.clone());
            }
        }
        Ok(ids)
    }

    fn append(&mut self, session_id: &str, hit: &str) -> Result<()> {
        self.rows().push((session_id.to_string(), hit.to_string()));
        Ok(())
    }

    fn hits(&self, session_id: &str) -> Result<Vec<String>> {
        Ok(self
            .rows()
            .iter()
            .filter(|(id, _)| id == session_id)
            .map(|(_, hit)| hit.clone())
            .collect())
    }

    fn delete(&mut self, session_id: &str) -> Result<()> {
        self.rows().retain(|(id, _)| id != session_id);
        Ok(())
    }

    fn delete_all(&mut self) -> Result<()> {
        self.rows().clear();
        Ok(())
    }
}

// =============================================================================
// SQLite store
// =============================================================================

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteHitStore;

#[cfg(feature = "sqlite")]
mod sqlite {
    use super::HitStore;
    use crate::error::Result;
    use rusqlite::{params, Connection};
    use std::path::Path;
    use tracing::debug;

    const CREATE_TABLE: &str = r#"
        CREATE TABLE IF NOT EXISTS MEDIAHITS (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id TEXT NOT NULL,
            hit TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_mediahits_session ON MEDIAHITS(session_id);
    "#;

    /// Store backed by a SQLite database file
    #[derive(Debug)]
    pub struct SqliteHitStore {
        conn: Connection,
    }

    impl SqliteHitStore {
        /// Open or create the database, keeping rows from earlier runs
        /// Opens or creates the database, creating missing parent directories
        pub fn open(path: &Path) -> Result<Self> {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let conn = Connection::open(path)?;
            conn.execute_batch(
                "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;",
            )?;
            conn.execute_batch(CREATE_TABLE)?;
            debug!(path = %path.display(), "Opened hit store");
            Ok(Self { conn })
        }

        pub fn in_memory() -> Result<Self> {
            let conn = Connection::open_in_memory()?;
            conn.execute_batch(CREATE_TABLE)?;
            Ok(Self { conn })
        }
    }

    impl HitStore for SqliteHitStore {
        fn session_ids(&self) -> Result<Vec<String>> {
            let mut stmt = self.conn.prepare(
                "SELECT session_id FROM MEDIAHITS GROUP BY session_id ORDER BY MIN(id)",
            )?;
            let ids = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(ids)
        }

        fn append(&mut self, session_id: &str, hit: &str) -> Result<()> {
            self.conn.execute(
                "INSERT INTO MEDIAHITS (session_id, hit) VALUES (?, ?)",
                params![session_id, hit],
            )?;
            Ok(())
        }

        fn hits(&self, session_id: &str) -> Result<Vec<String>> {
            let mut stmt = self
                .conn
                .prepare("SELECT hit FROM MEDIAHITS WHERE session_id = ? ORDER BY id")?;
            let hits = stmt
                .query_map(params![session_id], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(hits)
        }

        fn delete(&mut self, session_id: &str) -> Result<()> {
            let removed = self
                .conn
                .execute("DELETE FROM MEDIAHITS WHERE session_id = ?", params![session_id])?;
            debug!(session_id, removed, "Deleted persisted hits");
            Ok(())
        }

        fn delete_all(&mut self) -> Result<()> {
            self.conn.execute("DELETE FROM MEDIAHITS", [])?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    fn exercise(store: &mut dyn HitStore) {
        assert_ok!(store.append("b", "b1"));
        assert_ok!(store.append("a", "a1"));
        assert_ok!(store.append("b", "b2"));

        assert_eq!(assert_ok!(store.session_ids()), vec!["b", "a"]);
        assert_eq!(assert_ok!(store.hits("b")), vec!["b1", "b2"]);
        assert!(assert_ok!(store.hits("missing")).is_empty());

        assert_ok!(store.delete("b"));
        assert_eq!(assert_ok!(store.session_ids()), vec!["a"]);

        assert_ok!(store.delete_all());
        assert!(assert_ok!(store.session_ids()).is_empty());
    }

    #[test]
    fn test_memory_store() {
        let mut store = MemoryHitStore::new();
        exercise(&mut store);
        assert!(store.is_empty());
    }

    #[test]
    fn test_memory_store_clones_share_rows() {
        let store = MemoryHitStore::new();
        let mut writer = store.clone();
        assert_ok!(writer.append("s", "h"));
        assert_eq!(store.len(), 1);
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn test_sqlite_store() {
        let mut store = assert_ok!(SqliteHitStore::in_memory());
        exercise(&mut store);
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn test_sqlite_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("offline").join("hits.db");
        {
            let mut store = assert_ok!(SqliteHitStore::open(&path));
            assert_ok!(store.append("s1", "first"));
            assert_ok!(store.append("s1", "second"));
        }
        let store = assert_ok!(SqliteHitStore::open(&path));
        assert_eq!(assert_ok!(store.session_ids()), vec!["s1"]);
        assert_eq!(assert_ok!(store.hits("s1")), vec!["first", "second"]);
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn test_sqlite_store_parent_is_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();

        let err = assert_err!(SqliteHitStore::open(&blocker.join("hits.db")));
        assert_eq!(err.error_code(), "IO");
    }
}
