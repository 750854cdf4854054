use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use crate::{database::Database, error::WaxPulseError};

/// One timestamped marketplace snapshot for a release. Append-only: rows
/// are created by successful fetch results and never mutated or deleted.
#[derive(Clone, Debug, PartialEq)]
pub struct Observation {
    obs_id: Option<i64>,
    release_id: i64,
    price: f64,
    currency: String,
    condition: String,
    listing_count: i64,
    wants_count: i64,
    observed_at: i64,
}

impl Observation {
    pub fn new(
        release_id: i64,
        price: f64,
        currency: String,
        condition: String,
        listing_count: i64,
        wants_count: i64,
    ) -> Self {
        Observation {
            obs_id: None,
            release_id,
            price,
            currency,
            condition,
            listing_count,
            wants_count,
            observed_at: Utc::now().timestamp(),
        }
    }

    /// Test/backfill constructor with an explicit timestamp.
    pub fn new_at(
        release_id: i64,
        price: f64,
        currency: String,
        wants_count: i64,
        observed_at: i64,
    ) -> Self {
        Observation {
            obs_id: None,
            release_id,
            price,
            currency,
            condition: "Various".to_string(),
            listing_count: 0,
            wants_count,
            observed_at,
        }
    }

    pub fn release_id(&self) -> i64 {
        self.release_id
    }
    pub fn price(&self) -> f64 {
        self.price
    }
    pub fn currency(&self) -> &str {
        &self.currency
    }
    pub fn condition(&self) -> &str {
        &self.condition
    }
    pub fn listing_count(&self) -> i64 {
        self.listing_count
    }
    pub fn wants_count(&self) -> i64 {
        self.wants_count
    }
    pub fn observed_at(&self) -> i64 {
        self.observed_at
    }

    pub fn observed_at_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.observed_at, 0)
    }

    /// Appends the observation. The referenced release must already exist;
    /// the foreign key rejects orphan observations at write time.
    pub fn append(&self, db: &Database) -> Result<(), WaxPulseError> {
        db.conn.execute(
            "INSERT INTO price_history
                (release_id, price, currency, condition, listing_count, wants_count, observed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                self.release_id,
                self.price,
                self.currency,
                self.condition,
                self.listing_count,
                self.wants_count,
                self.observed_at,
            ],
        )?;
        Ok(())
    }

    /// Most recent observation for a release. Ties on `observed_at` break
    /// on insertion order, so duplicate timestamps across restarts are
    /// tolerated.
    pub fn latest_for_release(
        db: &Database,
        release_id: i64,
    ) -> Result<Option<Self>, WaxPulseError> {
        db.conn
            .query_row(
                "SELECT obs_id, release_id, price, currency, condition, listing_count, wants_count, observed_at
                 FROM price_history
                 WHERE release_id = ?1
                 ORDER BY observed_at DESC, obs_id DESC
                 LIMIT 1",
                params![release_id],
                Self::from_row,
            )
            .optional()
            .map_err(WaxPulseError::Database)
    }

    /// The two most recent observations, newest first. Trend analysis needs
    /// exactly this pair; releases with fewer than two return a short vec.
    pub fn latest_two(db: &Database, release_id: i64) -> Result<Vec<Self>, WaxPulseError> {
        let mut stmt = db.conn.prepare(
            "SELECT obs_id, release_id, price, currency, condition, listing_count, wants_count, observed_at
             FROM price_history
             WHERE release_id = ?1
             ORDER BY observed_at DESC, obs_id DESC
             LIMIT 2",
        )?;

        let rows = stmt.query_map(params![release_id], Self::from_row)?;
        let mut observations = Vec::with_capacity(2);
        for row in rows {
            observations.push(row?);
        }
        Ok(observations)
    }

    /// Observations within the trailing window, oldest first.
    pub fn history_since(
        db: &Database,
        release_id: i64,
        window_days: i64,
    ) -> Result<Vec<Self>, WaxPulseError> {
        let cutoff = Utc::now().timestamp() - window_days * 86_400;

        let mut stmt = db.conn.prepare(
            "SELECT obs_id, release_id, price, currency, condition, listing_count, wants_count, observed_at
             FROM price_history
             WHERE release_id = ?1 AND observed_at >= ?2
             ORDER BY observed_at ASC, obs_id ASC",
        )?;

        let rows = stmt.query_map(params![release_id, cutoff], Self::from_row)?;
        let mut observations = Vec::new();
        for row in rows {
            observations.push(row?);
        }
        Ok(observations)
    }

    pub fn count(db: &Database) -> Result<i64, WaxPulseError> {
        let count = db
            .conn
            .query_row("SELECT COUNT(*) FROM price_history", [], |row| row.get(0))?;
        Ok(count)
    }

    fn from_row(row: &rusqlite::Row) -> Result<Self, rusqlite::Error> {
        Ok(Observation {
            obs_id: row.get(0)?,
            release_id: row.get(1)?,
            price: row.get(2)?,
            currency: row.get(3)?,
            condition: row.get(4)?,
            listing_count: row.get(5)?,
            wants_count: row.get(6)?,
            observed_at: row.get(7)?,
        })
    }
}
