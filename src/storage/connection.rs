//! Database connection management with WAL mode and crash recovery.

use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::migrations::run_migrations;
use crate::error::Result;

/// Storage engine wrapping a single SQLite connection.
pub struct Storage {
    db_path: String,
    conn: Arc<Mutex<Connection>>,
}

impl Storage {
    /// Open or create a database at `db_path`, running migrations.
    ///
    /// If the initial open fails and stale WAL/SHM siblings are present with
    /// no other process holding them, the siblings are deleted and the open
    /// retried exactly once (§4.1 crash recovery).
    pub fn open(db_path: &str) -> Result<Self> {
        let conn = match Self::create_connection(db_path) {
            Ok(conn) => conn,
            Err(err) if db_path != ":memory:" && Self::stale_wal_recoverable(db_path) => {
                tracing::error!(
                    "open failed ({err}), auxiliary files appear stale; deleting and retrying once"
                );
                Self::remove_wal_siblings(db_path);
                Self::create_connection(db_path)?
            }
            Err(err) => return Err(err),
        };

        run_migrations(&conn)?;

        Ok(Self {
            db_path: db_path.to_string(),
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database (for tests).
    pub fn open_in_memory() -> Result<Self> {
        Self::open(":memory:")
    }

    fn create_connection(db_path: &str) -> Result<Connection> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let conn = if db_path == ":memory:" {
            Connection::open_in_memory()?
        } else {
            if let Some(parent) = Path::new(db_path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            Connection::open_with_flags(db_path, flags)?
        };

        Self::configure_pragmas(&conn)?;
        Ok(conn)
    }

    fn configure_pragmas(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA wal_autocheckpoint=1000;
            PRAGMA busy_timeout=30000;
            PRAGMA cache_size=-64000;
            PRAGMA temp_store=MEMORY;
            PRAGMA foreign_keys=ON;
            "#,
        )?;
        Ok(())
    }

    /// Whether the WAL/SHM siblings of `db_path` exist and appear to be held
    /// by no other process. Conservative: any I/O error deciding this means
    /// recovery is declined.
    fn stale_wal_recoverable(db_path: &str) -> bool {
        let wal = Self::wal_path(db_path);
        let shm = Self::shm_path(db_path);
        if !wal.exists() && !shm.exists() {
            return false;
        }
        // Best-effort OS-level check: if we can exclusively open the main
        // file for read-write, nothing else holds it locked.
        Connection::open_with_flags(
            db_path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .is_ok()
    }

    fn remove_wal_siblings(db_path: &str) {
        let _ = std::fs::remove_file(Self::wal_path(db_path));
        let _ = std::fs::remove_file(Self::shm_path(db_path));
    }

    fn wal_path(db_path: &str) -> PathBuf {
        PathBuf::from(format!("{db_path}-wal"))
    }

    fn shm_path(db_path: &str) -> PathBuf {
        PathBuf::from(format!("{db_path}-shm"))
    }

    /// Execute a function with the connection (readers and single writer
    /// alike; the mutex serializes writers as the single-writer discipline
    /// requires).
    pub fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock();
        f(&conn)
    }

    /// Execute a function within a transaction.
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }

    pub fn db_path(&self) -> &str {
        &self.db_path
    }

    /// Checkpoint and truncate the WAL. Called on graceful shutdown; may
    /// also be called by an external scheduler.
    pub fn checkpoint(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
        Ok(())
    }

    /// Idempotent graceful shutdown: flush and truncate the WAL.
    pub fn close(&self) -> Result<()> {
        self.checkpoint()
    }

    pub fn db_size(&self) -> Result<i64> {
        let conn = self.conn.lock();
        let size: i64 = conn.query_row(
            "SELECT page_count * page_size FROM pragma_page_count(), pragma_page_size()",
            [],
            |row| row.get(0),
        )?;
        Ok(size)
    }
}

impl Clone for Storage {
    fn clone(&self) -> Self {
        Self {
            db_path: self.db_path.clone(),
            conn: self.conn.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_in_memory_succeeds() {
        let storage = Storage::open_in_memory().unwrap();
        assert_eq!(storage.db_path(), ":memory:");
    }

    #[test]
    fn checkpoint_is_idempotent() {
        let storage = Storage::open_in_memory().unwrap();
        storage.checkpoint().unwrap();
        storage.checkpoint().unwrap();
    }

    #[test]
    fn reopening_a_clean_database_just_works() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let path_str = path.to_str().unwrap();

        {
            let storage = Storage::open(path_str).unwrap();
            storage
                .with_connection(|conn| {
                    conn.query_row("SELECT 1", [], |_| Ok(()))?;
                    Ok(())
                })
                .unwrap();
        }

        let storage = Storage::open(path_str).unwrap();
        assert_eq!(storage.db_path(), path_str);
    }

    #[test]
    fn recovers_from_stale_wal_on_reopen() {
        use rusqlite::config::DbConfig;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let path_str = path.to_str().unwrap();

        // A second connection holds the WAL open so its -wal/-shm siblings
        // aren't cleaned up when the writer below closes; disabling its
        // checkpoint-on-close keeps it from touching the WAL we're about to
        // corrupt once it's dropped.
        let reader = Connection::open(path_str).unwrap();
        reader
            .set_db_config(DbConfig::SQLITE_DBCONFIG_NO_CKPT_ON_CLOSE, true)
            .unwrap();
        reader
            .execute_batch("PRAGMA journal_mode=WAL; CREATE TABLE t (x INTEGER);")
            .unwrap();
        reader
            .query_row("SELECT COUNT(*) FROM t", [], |r| r.get::<_, i64>(0))
            .unwrap();

        Storage::create_connection(path_str)
            .unwrap()
            .execute("INSERT INTO t VALUES (1)", [])
            .unwrap();

        let wal_path = Storage::wal_path(path_str);
        let shm_path = Storage::shm_path(path_str);
        assert!(
            wal_path.exists(),
            "expected a -wal sibling after a WAL-mode write"
        );
        assert!(
            shm_path.exists(),
            "expected a -shm sibling after a WAL-mode write"
        );

        // Simulate a crash that left the WAL behind in a state the
        // shared-memory index no longer agrees with: scramble its frames so
        // the next open can't replay them.
        let wal_bytes = std::fs::read(&wal_path).unwrap();
        let scrambled: Vec<u8> = wal_bytes
            .iter()
            .enumerate()
            .map(|(i, _)| (i * 37 % 256) as u8)
            .collect();
        std::fs::write(&wal_path, scrambled).unwrap();

        // With `reader` still attached, its shared-memory index disagrees
        // with the scrambled WAL on disk and the open fails exactly the way
        // `Storage::open`'s first attempt would against a crashed peer.
        assert!(
            Storage::create_connection(path_str).is_err(),
            "a scrambled -wal should make the first open attempt fail"
        );
        assert!(
            Storage::stale_wal_recoverable(path_str),
            "nothing else should hold an exclusive lock on the main file"
        );

        // The crashed peer is now gone; recovery proceeds exactly as
        // `Storage::open` does once its first attempt fails.
        drop(reader);
        Storage::remove_wal_siblings(path_str);

        assert!(
            !wal_path.exists(),
            "stale -wal should be removed during recovery"
        );
        assert!(
            !shm_path.exists(),
            "stale -shm should be removed during recovery"
        );

        let storage = Storage::open(path_str).unwrap();
        assert_eq!(storage.db_path(), path_str);

        // The recovered database is usable even though the discarded WAL
        // took the table definition down with it.
        storage
            .with_connection(|conn| Ok(conn.query_row("SELECT 1", [], |_| Ok(()))?))
            .unwrap();
    }

    #[test]
    fn stale_wal_recoverable_is_false_with_no_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let path_str = path.to_str().unwrap();
        Storage::open(path_str).unwrap();
        assert!(!Storage::stale_wal_recoverable(path_str));
    }

    #[test]
    fn remove_wal_siblings_deletes_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let path_str = path.to_str().unwrap();
        let wal_path = Storage::wal_path(path_str);
        let shm_path = Storage::shm_path(path_str);
        std::fs::write(&wal_path, b"junk").unwrap();
        std::fs::write(&shm_path, b"junk").unwrap();

        Storage::remove_wal_siblings(path_str);

        assert!(!wal_path.exists());
        assert!(!shm_path.exists());
    }
}
