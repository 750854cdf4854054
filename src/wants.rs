use rusqlite::{params, OptionalExtension};

use crate::{database::Database, error::WaxPulseError};

/// A wantlist entry. At most one per release; re-syncing updates in place.
#[derive(Clone, Debug, PartialEq)]
pub struct WantEntry {
    release_id: i64,
    notes: Option<String>,
    added_date: Option<String>,
}

impl WantEntry {
    pub fn new(release_id: i64, notes: Option<String>, added_date: Option<String>) -> Self {
        WantEntry {
            release_id,
            notes,
            added_date,
        }
    }

    pub fn release_id(&self) -> i64 {
        self.release_id
    }
    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }
    pub fn added_date(&self) -> Option<&str> {
        self.added_date.as_deref()
    }

    pub fn upsert(&self, db: &Database) -> Result<(), WaxPulseError> {
        db.conn.execute(
            "INSERT INTO wants (release_id, notes, added_date)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(release_id) DO UPDATE SET
                notes = excluded.notes,
                added_date = excluded.added_date",
            params![self.release_id, self.notes, self.added_date],
        )?;
        Ok(())
    }

    pub fn get_by_release(db: &Database, release_id: i64) -> Result<Option<Self>, WaxPulseError> {
        db.conn
            .query_row(
                "SELECT release_id, notes, added_date FROM wants WHERE release_id = ?1",
                params![release_id],
                |row| {
                    Ok(WantEntry {
                        release_id: row.get(0)?,
                        notes: row.get(1)?,
                        added_date: row.get(2)?,
                    })
                },
            )
            .optional()
            .map_err(WaxPulseError::Database)
    }

    pub fn count(db: &Database) -> Result<i64, WaxPulseError> {
        let count = db
            .conn
            .query_row("SELECT COUNT(*) FROM wants", [], |row| row.get(0))?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::releases::Release;

    #[test]
    fn upsert_replaces_existing_entry() {
        let db = Database::open_in_memory().unwrap();
        Release::new(5, "Low".to_string(), "David Bowie".to_string(), None, None, None)
            .upsert(&db)
            .unwrap();

        WantEntry::new(5, Some("original pressing".to_string()), None)
            .upsert(&db)
            .unwrap();
        WantEntry::new(5, Some("any pressing".to_string()), Some("2024-02-02".to_string()))
            .upsert(&db)
            .unwrap();

        assert_eq!(WantEntry::count(&db).unwrap(), 1);
        let entry = WantEntry::get_by_release(&db, 5).unwrap().unwrap();
        assert_eq!(entry.notes(), Some("any pressing"));
        assert_eq!(entry.added_date(), Some("2024-02-02"));
    }
}
