//! v1: releases and their price/demand observation history.

pub const UP_V1_SQL: &str = r#"
-- Releases are upserted from the Discogs catalog and never deleted
CREATE TABLE IF NOT EXISTS releases (
    release_id INTEGER PRIMARY KEY,    -- Discogs release id
    title TEXT NOT NULL,
    artist TEXT NOT NULL,
    year INTEGER,
    format TEXT,
    thumb_url TEXT,
    first_seen INTEGER NOT NULL,       -- Timestamp when first synced (UTC)
    updated_at INTEGER NOT NULL        -- Timestamp of last upsert (UTC)
);

-- Append-only marketplace observations, one row per successful fetch
CREATE TABLE IF NOT EXISTS price_history (
    obs_id INTEGER PRIMARY KEY AUTOINCREMENT,
    release_id INTEGER NOT NULL,
    price REAL NOT NULL,               -- Lowest listed price
    currency TEXT NOT NULL,
    condition TEXT NOT NULL,
    listing_count INTEGER NOT NULL DEFAULT 0,
    wants_count INTEGER NOT NULL DEFAULT 0,
    observed_at INTEGER NOT NULL,      -- Timestamp of the observation (UTC)
    FOREIGN KEY (release_id) REFERENCES releases(release_id)
);
"#;

pub const DOWN_V1_SQL: &str = r#"
DROP TABLE IF EXISTS price_history;
DROP TABLE IF EXISTS releases;
"#;
