use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use log::info;
use rusqlite::Connection;

use crate::error::WaxPulseError;
use crate::schema::Migrator;

const DB_FILENAME: &str = "waxpulse.db";

/// Owns the SQLite connection. All writes happen on the coordinating
/// thread; worker threads never touch the database.
pub struct Database {
    pub(crate) conn: Connection,
}

impl Database {
    /// Opens (or creates) the database at `db_path`, falling back to the
    /// platform data directory, and brings the schema up to date.
    pub fn open(db_path: Option<&Path>) -> Result<Self, WaxPulseError> {
        let db_file = match db_path {
            Some(path) => path.to_path_buf(),
            None => Self::default_path()?,
        };

        if let Some(parent) = db_file.parent() {
            fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&db_file)?;
        info!("Database opened at: {}", db_file.display());

        let db = Self { conn };
        db.init_schema()?;
        Ok(db)
    }

    /// In-memory database for tests.
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, WaxPulseError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<(), WaxPulseError> {
        // FK discipline is enforced at write time, not deferred
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        let migrator = Migrator::new(&self.conn);
        migrator.ensure_ledger()?;
        let applied = migrator.apply_pending()?;
        if applied > 0 {
            info!("Applied {} schema migration(s)", applied);
        }
        Ok(())
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    fn default_path() -> Result<PathBuf, WaxPulseError> {
        let project_dirs = ProjectDirs::from("", "", "waxpulse").ok_or_else(|| {
            WaxPulseError::Error("Unable to determine the platform data directory".to_string())
        })?;
        Ok(project_dirs.data_local_dir().join(DB_FILENAME))
    }
}
