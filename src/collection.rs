use rusqlite::params;

use crate::{database::Database, error::WaxPulseError};

/// The canonical Discogs folder that contains every collected item. Demand
/// analysis filters on membership here to avoid double-counting copies that
/// are also filed elsewhere.
pub const ALL_FOLDER_ID: i64 = 0;

#[derive(Clone, Debug, PartialEq)]
pub struct Folder {
    folder_id: i64,
    name: String,
    item_count: i64,
}

impl Folder {
    pub fn new(folder_id: i64, name: String, item_count: i64) -> Self {
        Folder {
            folder_id,
            name,
            item_count,
        }
    }

    pub fn folder_id(&self) -> i64 {
        self.folder_id
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn item_count(&self) -> i64 {
        self.item_count
    }

    pub fn upsert(&self, db: &Database) -> Result<(), WaxPulseError> {
        db.conn.execute(
            "INSERT INTO collection_folders (folder_id, name, item_count)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(folder_id) DO UPDATE SET
                name = excluded.name,
                item_count = excluded.item_count",
            params![self.folder_id, self.name, self.item_count],
        )?;
        Ok(())
    }

    pub fn all(db: &Database) -> Result<Vec<Self>, WaxPulseError> {
        let mut stmt = db.conn.prepare(
            "SELECT folder_id, name, item_count
             FROM collection_folders
             ORDER BY folder_id ASC",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok(Folder {
                folder_id: row.get(0)?,
                name: row.get(1)?,
                item_count: row.get(2)?,
            })
        })?;

        let mut folders = Vec::new();
        for row in rows {
            folders.push(row?);
        }
        Ok(folders)
    }
}

/// Ties a release to a folder. `instance_id` identifies the physical copy,
/// so re-syncing the same copy updates its row instead of duplicating it.
pub struct Membership;

impl Membership {
    pub fn upsert(
        db: &Database,
        release_id: i64,
        folder_id: i64,
        instance_id: i64,
        added_date: Option<&str>,
    ) -> Result<(), WaxPulseError> {
        db.conn.execute(
            "INSERT INTO collection_items (release_id, folder_id, instance_id, added_date)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(folder_id, instance_id) DO UPDATE SET
                release_id = excluded.release_id,
                added_date = excluded.added_date",
            params![release_id, folder_id, instance_id, added_date],
        )?;
        Ok(())
    }

    /// Distinct release ids with at least one membership row. This is the
    /// universe the sync pipeline considers for price refresh.
    pub fn collected_release_ids(db: &Database) -> Result<Vec<i64>, WaxPulseError> {
        let mut stmt = db.conn.prepare(
            "SELECT DISTINCT release_id FROM collection_items ORDER BY release_id ASC",
        )?;

        let rows = stmt.query_map([], |row| row.get(0))?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }
        Ok(ids)
    }

    pub fn release_in_folder(
        db: &Database,
        release_id: i64,
        folder_id: i64,
    ) -> Result<bool, WaxPulseError> {
        let count: i64 = db.conn.query_row(
            "SELECT COUNT(*) FROM collection_items WHERE release_id = ?1 AND folder_id = ?2",
            params![release_id, folder_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn count(db: &Database) -> Result<i64, WaxPulseError> {
        let count = db
            .conn
            .query_row("SELECT COUNT(*) FROM collection_items", [], |row| {
                row.get(0)
            })?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::releases::Release;

    fn seed_release(db: &Database, id: i64) {
        Release::new(id, format!("Release {}", id), "Artist".to_string(), None, None, None)
            .upsert(db)
            .unwrap();
    }

    #[test]
    fn folder_upsert_roundtrips() {
        let db = Database::open_in_memory().unwrap();
        Folder::new(0, "All".to_string(), 10).upsert(&db).unwrap();
        Folder::new(1, "Uncategorized".to_string(), 4)
            .upsert(&db)
            .unwrap();
        Folder::new(0, "All".to_string(), 11).upsert(&db).unwrap();

        let folders = Folder::all(&db).unwrap();
        assert_eq!(folders.len(), 2);
        assert_eq!(folders[0].item_count(), 11);
    }

    #[test]
    fn membership_is_unique_per_instance() {
        let db = Database::open_in_memory().unwrap();
        seed_release(&db, 1);

        Membership::upsert(&db, 1, 0, 555, Some("2023-01-01")).unwrap();
        Membership::upsert(&db, 1, 0, 555, Some("2023-01-01")).unwrap();
        assert_eq!(Membership::count(&db).unwrap(), 1);

        // A second physical copy of the same release is a second row
        Membership::upsert(&db, 1, 0, 556, None).unwrap();
        assert_eq!(Membership::count(&db).unwrap(), 2);
        assert_eq!(Membership::collected_release_ids(&db).unwrap(), vec![1]);
    }

    #[test]
    fn release_may_belong_to_multiple_folders() {
        let db = Database::open_in_memory().unwrap();
        seed_release(&db, 7);

        Membership::upsert(&db, 7, 0, 100, None).unwrap();
        Membership::upsert(&db, 7, 3, 101, None).unwrap();

        assert!(Membership::release_in_folder(&db, 7, 0).unwrap());
        assert!(Membership::release_in_folder(&db, 7, 3).unwrap());
        assert!(!Membership::release_in_folder(&db, 7, 9).unwrap());
    }
}
