//! v2: collection folders, folder membership, and the wantlist.

pub const UP_V2_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS collection_folders (
    folder_id INTEGER PRIMARY KEY,     -- Discogs folder id (0 = "All")
    name TEXT NOT NULL,
    item_count INTEGER NOT NULL DEFAULT 0
);

-- One row per physical copy; instance_id keeps re-syncs from duplicating
CREATE TABLE IF NOT EXISTS collection_items (
    membership_id INTEGER PRIMARY KEY AUTOINCREMENT,
    release_id INTEGER NOT NULL,
    folder_id INTEGER NOT NULL DEFAULT 0,
    instance_id INTEGER NOT NULL,
    added_date TEXT,
    FOREIGN KEY (release_id) REFERENCES releases(release_id),
    UNIQUE (folder_id, instance_id)
);

CREATE TABLE IF NOT EXISTS wants (
    release_id INTEGER PRIMARY KEY,    -- At most one want entry per release
    notes TEXT,
    added_date TEXT,
    FOREIGN KEY (release_id) REFERENCES releases(release_id)
);
"#;

pub const DOWN_V2_SQL: &str = r#"
DROP TABLE IF EXISTS wants;
DROP TABLE IF EXISTS collection_items;
DROP TABLE IF EXISTS collection_folders;
"#;
