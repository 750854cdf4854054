use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use crate::{database::Database, error::WaxPulseError};

/// One catalog entry tracked for price and demand. Upserted by Discogs
/// release id; title/artist/format may be corrected on re-sync; rows are
/// never deleted.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Release {
    release_id: i64,
    title: String,
    artist: String,
    year: Option<i64>,
    format: Option<String>,
    thumb_url: Option<String>,
    first_seen: i64,
}

impl Release {
    pub fn new(
        release_id: i64,
        title: String,
        artist: String,
        year: Option<i64>,
        format: Option<String>,
        thumb_url: Option<String>,
    ) -> Self {
        Release {
            release_id,
            title,
            artist,
            year,
            format,
            thumb_url,
            first_seen: Utc::now().timestamp(),
        }
    }

    pub fn release_id(&self) -> i64 {
        self.release_id
    }
    pub fn title(&self) -> &str {
        &self.title
    }
    pub fn artist(&self) -> &str {
        &self.artist
    }
    pub fn year(&self) -> Option<i64> {
        self.year
    }
    pub fn format(&self) -> Option<&str> {
        self.format.as_deref()
    }
    pub fn thumb_url(&self) -> Option<&str> {
        self.thumb_url.as_deref()
    }
    pub fn first_seen(&self) -> i64 {
        self.first_seen
    }

    /// Inserts or updates by release id. The catalog fields are refreshed;
    /// `first_seen` survives re-syncs.
    pub fn upsert(&self, db: &Database) -> Result<(), WaxPulseError> {
        db.conn.execute(
            "INSERT INTO releases (release_id, title, artist, year, format, thumb_url, first_seen, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(release_id) DO UPDATE SET
                title = excluded.title,
                artist = excluded.artist,
                year = excluded.year,
                format = excluded.format,
                thumb_url = excluded.thumb_url,
                updated_at = excluded.updated_at",
            params![
                self.release_id,
                self.title,
                self.artist,
                self.year,
                self.format,
                self.thumb_url,
                self.first_seen,
                Utc::now().timestamp(),
            ],
        )?;
        Ok(())
    }

    pub fn get_by_id(db: &Database, release_id: i64) -> Result<Option<Self>, WaxPulseError> {
        db.conn
            .query_row(
                "SELECT release_id, title, artist, year, format, thumb_url, first_seen
                 FROM releases
                 WHERE release_id = ?1",
                params![release_id],
                Self::from_row,
            )
            .optional()
            .map_err(WaxPulseError::Database)
    }

    /// All releases, optionally narrowed by a title/artist search term and a
    /// format substring. Ordered by artist then title.
    pub fn all(
        db: &Database,
        search: Option<&str>,
        format: Option<&str>,
    ) -> Result<Vec<Self>, WaxPulseError> {
        let search_pattern = search.map(|s| format!("%{}%", s));
        let format_pattern = format.map(|f| format!("%{}%", f));

        let mut stmt = db.conn.prepare(
            "SELECT release_id, title, artist, year, format, thumb_url, first_seen
             FROM releases
             WHERE (?1 IS NULL OR title LIKE ?1 OR artist LIKE ?1)
               AND (?2 IS NULL OR format LIKE ?2)
             ORDER BY artist ASC, title ASC",
        )?;

        let rows = stmt.query_map(params![search_pattern, format_pattern], Self::from_row)?;

        let mut releases = Vec::new();
        for row in rows {
            releases.push(row?);
        }
        Ok(releases)
    }

    pub fn count(db: &Database) -> Result<i64, WaxPulseError> {
        let count =
            db.conn
                .query_row("SELECT COUNT(*) FROM releases", [], |row| row.get(0))?;
        Ok(count)
    }

    fn from_row(row: &rusqlite::Row) -> Result<Self, rusqlite::Error> {
        Ok(Release {
            release_id: row.get(0)?,
            title: row.get(1)?,
            artist: row.get(2)?,
            year: row.get(3)?,
            format: row.get(4)?,
            thumb_url: row.get(5)?,
            first_seen: row.get(6)?,
        })
    }
}
