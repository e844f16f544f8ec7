use fs2::FileExt;
use fray_types::ReadTo;
use rusqlite::Connection;
use std::fs::File;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::queries;
use crate::schema;

/// Handle to the derived cache. SQLite (WAL) serializes writers; the
/// separate `WriterLock` exists for whole-cache operations (rebuild,
/// supervisor) that must not run twice concurrently.
pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;

        let db = Self { conn };
        schema::init_schema(&db.conn)?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        schema::init_schema(&db.conn)?;
        Ok(db)
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn conn_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    /// Snapshot the non-replicable local state before tearing the cache
    /// down for a rebuild.
    pub fn snapshot_local_state(&self) -> Result<LocalState> {
        Ok(LocalState {
            read_to: queries::read_state::list_read_to(&self.conn)?,
            config: queries::config::list(&self.conn)?,
        })
    }

    /// Re-insert preserved local state after a rebuild.
    pub fn restore_local_state(&self, state: &LocalState) -> Result<()> {
        for row in &state.read_to {
            queries::read_state::upsert_read_to(&self.conn, row)?;
        }
        for (key, value) in &state.config {
            queries::config::set(&self.conn, key, value)?;
        }
        Ok(())
    }

    /// Drop every derived table and recreate the schema, keeping `read_to`
    /// and `config` rows in place.
    pub fn reset_derived(&self) -> Result<()> {
        schema::drop_derived_tables(&self.conn)?;
        schema::init_schema(&self.conn)?;
        Ok(())
    }
}

/// Local rows that survive cache rebuilds.
#[derive(Debug, Clone, Default)]
pub struct LocalState {
    pub read_to: Vec<ReadTo>,
    pub config: Vec<(String, String)>,
}

/// Advisory lock for single-writer cache maintenance. Held for the duration
/// of a rebuild or a supervisor run; dropped on scope exit.
pub struct WriterLock {
    _file: File,
    path: PathBuf,
}

impl WriterLock {
    /// Try to acquire; `None` when another process holds the lock.
    pub fn try_acquire(db_path: &Path) -> Result<Option<WriterLock>> {
        let path = lock_path(db_path);
        let file = File::create(&path)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(WriterLock { _file: file, path })),
            Err(_) => Ok(None),
        }
    }

    /// Whether some other process currently holds the lock.
    pub fn is_held(db_path: &Path) -> bool {
        let path = lock_path(db_path);
        if !path.exists() {
            return false;
        }
        match File::open(&path) {
            Ok(file) => match file.try_lock_exclusive() {
                Ok(()) => {
                    let _ = FileExt::unlock(&file);
                    false
                }
                Err(_) => true,
            },
            Err(_) => false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn lock_path(db_path: &Path) -> PathBuf {
    let mut name = db_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "fray.db".to_string());
    name.push_str(".lock");
    db_path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_creates_schema() {
        let db = Database::open_in_memory().unwrap();
        let agents = queries::agents::list(db.conn()).unwrap();
        assert!(agents.is_empty());
    }

    #[test]
    fn test_writer_lock_exclusive() {
        let temp = TempDir::new().unwrap();
        let db_path = temp.path().join("fray.db");

        let held = WriterLock::try_acquire(&db_path).unwrap();
        assert!(held.is_some());

        // Same-process relock succeeds on some platforms, so only assert
        // that release makes the lock observably free.
        drop(held);
        assert!(!WriterLock::is_held(&db_path));
        let reheld = WriterLock::try_acquire(&db_path).unwrap();
        assert!(reheld.is_some());
    }

    #[test]
    fn test_local_state_round_trip() {
        let db = Database::open_in_memory().unwrap();
        let row = ReadTo {
            agent_id: "alice".to_string(),
            home: "room".to_string(),
            message_guid: "msg-1".to_string(),
            ts: 10,
            set_at: 11,
        };
        queries::read_state::upsert_read_to(db.conn(), &row).unwrap();
        queries::config::set(db.conn(), "channel_name", "dev").unwrap();

        let state = db.snapshot_local_state().unwrap();
        assert_eq!(state.read_to.len(), 1);
        assert_eq!(state.config, vec![("channel_name".to_string(), "dev".to_string())]);

        db.reset_derived().unwrap();
        db.restore_local_state(&state).unwrap();

        let restored = db.snapshot_local_state().unwrap();
        assert_eq!(restored.read_to, state.read_to);
        assert_eq!(restored.config, state.config);
    }
}
