mod v1_initial;
mod v2_collection;
mod v3_indexes;

use chrono::Utc;
use log::{info, warn};
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::WaxPulseError;

use v1_initial::{DOWN_V1_SQL, UP_V1_SQL};
use v2_collection::{DOWN_V2_SQL, UP_V2_SQL};
use v3_indexes::{DOWN_V3_SQL, UP_V3_SQL};

/// One versioned schema change. `up_sql` must be safe to re-run for the
/// same version (IF NOT EXISTS guards); `down_sql` is optional - a
/// migration without one is silently skipped during rollback.
pub struct Migration {
    pub version: i64,
    pub name: &'static str,
    pub up_sql: &'static str,
    pub down_sql: Option<&'static str>,
}

/// The known migrations, ascending by version. The applied-versions ledger
/// must always be a contiguous prefix of this list unless a rollback
/// removed the tail.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "initial_schema",
        up_sql: UP_V1_SQL,
        down_sql: Some(DOWN_V1_SQL),
    },
    Migration {
        version: 2,
        name: "collection_tracking",
        up_sql: UP_V2_SQL,
        down_sql: Some(DOWN_V2_SQL),
    },
    Migration {
        version: 3,
        name: "history_indexes",
        up_sql: UP_V3_SQL,
        down_sql: Some(DOWN_V3_SQL),
    },
];

/// A row of `migrate --status` output.
#[derive(Debug, Clone)]
pub struct MigrationStatus {
    pub version: i64,
    pub name: String,
    pub applied_at: Option<i64>,
}

/// Applies and rolls back migrations against the same connection handle the
/// rest of the store uses; injected at construction rather than reached
/// through the store's wrapper.
pub struct Migrator<'a> {
    conn: &'a Connection,
}

impl<'a> Migrator<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Migrator { conn }
    }

    /// Creates the ledger table. Called unconditionally before any version
    /// check so `status` works on a fresh database.
    pub fn ensure_ledger(&self) -> Result<(), WaxPulseError> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at INTEGER NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    /// Highest applied version, or 0 for an empty ledger.
    pub fn current_version(&self) -> Result<i64, WaxPulseError> {
        self.ensure_ledger()?;
        let version: Option<i64> = self
            .conn
            .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
                row.get(0)
            })
            .optional()?
            .flatten();
        Ok(version.unwrap_or(0))
    }

    /// Applies every migration newer than the current version, in ascending
    /// order. The first script failure stops the run; versions applied
    /// before the failure stay applied. Returns the number applied, so
    /// running twice in a row returns 0 the second time.
    pub fn apply_pending(&self) -> Result<usize, WaxPulseError> {
        self.apply_list(MIGRATIONS)
    }

    fn apply_list(&self, migrations: &[Migration]) -> Result<usize, WaxPulseError> {
        let current = self.current_version()?;
        let mut applied = 0;

        for migration in migrations.iter().filter(|m| m.version > current) {
            info!(
                "Applying migration v{} ({})",
                migration.version, migration.name
            );
            self.conn.execute_batch(migration.up_sql)?;
            self.conn.execute(
                "INSERT INTO schema_migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
                params![
                    migration.version,
                    migration.name,
                    Utc::now().timestamp()
                ],
            )?;
            applied += 1;
        }

        Ok(applied)
    }

    /// Rolls back applied migrations with version in `(target, current]`,
    /// newest first. A missing reverse script is skipped silently but the
    /// ledger row is still removed; reverse scripts are trusted, not
    /// verified. Returns the number of versions removed from the ledger.
    pub fn rollback(&self, target: i64) -> Result<usize, WaxPulseError> {
        let current = self.current_version()?;
        if target > current {
            return Err(WaxPulseError::Error(format!(
                "Cannot roll back to v{}: current version is v{}",
                target, current
            )));
        }

        let mut removed = 0;

        for migration in MIGRATIONS
            .iter()
            .rev()
            .filter(|m| m.version > target && m.version <= current)
        {
            match migration.down_sql {
                Some(down_sql) => {
                    info!(
                        "Rolling back migration v{} ({})",
                        migration.version, migration.name
                    );
                    self.conn.execute_batch(down_sql)?;
                }
                None => {
                    warn!(
                        "Migration v{} ({}) has no reverse script; removing ledger entry only",
                        migration.version, migration.name
                    );
                }
            }
            self.conn.execute(
                "DELETE FROM schema_migrations WHERE version = ?1",
                params![migration.version],
            )?;
            removed += 1;
        }

        Ok(removed)
    }

    /// Known migrations with their applied-at timestamps, for `migrate --status`.
    pub fn status(&self) -> Result<Vec<MigrationStatus>, WaxPulseError> {
        self.ensure_ledger()?;
        let mut statuses = Vec::with_capacity(MIGRATIONS.len());

        for migration in MIGRATIONS {
            let applied_at: Option<i64> = self
                .conn
                .query_row(
                    "SELECT applied_at FROM schema_migrations WHERE version = ?1",
                    params![migration.version],
                    |row| row.get(0),
                )
                .optional()?;

            statuses.push(MigrationStatus {
                version: migration.version,
                name: migration.name.to_string(),
                applied_at,
            });
        }

        Ok(statuses)
    }
}
