//! v3: indexes for the staleness check and windowed history queries.

pub const UP_V3_SQL: &str = r#"
CREATE INDEX IF NOT EXISTS idx_price_history_release ON price_history (release_id);
CREATE INDEX IF NOT EXISTS idx_price_history_observed ON price_history (observed_at);
CREATE INDEX IF NOT EXISTS idx_collection_items_release ON collection_items (release_id);
"#;

pub const DOWN_V3_SQL: &str = r#"
DROP INDEX IF EXISTS idx_collection_items_release;
DROP INDEX IF EXISTS idx_price_history_observed;
DROP INDEX IF EXISTS idx_price_history_release;
"#;
