//! SQLite database migrations

use crate::error::Result;
use rusqlite::Connection;

/// Run all database migrations
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS migrations (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    run_migration(conn, "001_vendors", CREATE_VENDORS_TABLE)?;
    run_migration(conn, "002_canonical_fields", CREATE_CANONICAL_FIELDS_TABLE)?;
    run_migration(conn, "003_canonical_data_types", CREATE_CANONICAL_DATA_TYPES_TABLE)?;
    run_migration(conn, "004_data_type_fields", CREATE_DATA_TYPE_FIELDS_TABLE)?;
    run_migration(conn, "005_field_mappings", CREATE_FIELD_MAPPINGS_TABLE)?;

    tracing::info!("Database migrations completed");
    Ok(())
}

fn run_migration(conn: &Connection, name: &str, sql: &str) -> Result<()> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM migrations WHERE name = ?)",
        [name],
        |row| row.get(0),
    )?;

    if !exists {
        tracing::info!("Running migration: {}", name);
        conn.execute_batch(sql)?;
        conn.execute("INSERT INTO migrations (name) VALUES (?)", [name])?;
    }

    Ok(())
}

const CREATE_VENDORS_TABLE: &str = r#"
CREATE TABLE vendors (
    vendor_id INTEGER PRIMARY KEY AUTOINCREMENT,
    vendor_name TEXT NOT NULL UNIQUE,
    display_name TEXT,
    status TEXT NOT NULL DEFAULT 'active',
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

const CREATE_CANONICAL_FIELDS_TABLE: &str = r#"
CREATE TABLE canonical_fields (
    canonical_field_id INTEGER PRIMARY KEY AUTOINCREMENT,
    field_name TEXT NOT NULL UNIQUE,
    description TEXT,
    data_type TEXT NOT NULL,
    category TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

const CREATE_CANONICAL_DATA_TYPES_TABLE: &str = r#"
CREATE TABLE canonical_data_types (
    data_type_id INTEGER PRIMARY KEY AUTOINCREMENT,
    data_type_name TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

const CREATE_DATA_TYPE_FIELDS_TABLE: &str = r#"
CREATE TABLE data_type_fields (
    data_type_id INTEGER NOT NULL REFERENCES canonical_data_types(data_type_id),
    canonical_field_id INTEGER NOT NULL REFERENCES canonical_fields(canonical_field_id),
    is_required INTEGER NOT NULL DEFAULT 0,
    field_order INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (data_type_id, canonical_field_id)
);
"#;

const CREATE_FIELD_MAPPINGS_TABLE: &str = r#"
CREATE TABLE field_mappings (
    mapping_id INTEGER PRIMARY KEY AUTOINCREMENT,
    vendor_id INTEGER NOT NULL REFERENCES vendors(vendor_id),
    canonical_field_id INTEGER NOT NULL REFERENCES canonical_fields(canonical_field_id),
    vendor_field_path TEXT NOT NULL,
    transformation_spec TEXT,
    default_value TEXT,
    priority INTEGER NOT NULL DEFAULT 0,
    is_active INTEGER NOT NULL DEFAULT 1,
    source_type TEXT NOT NULL DEFAULT 'websocket' CHECK (source_type IN ('rest', 'websocket', 'both')),
    entity_type TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
CREATE INDEX IF NOT EXISTS idx_field_mappings_vendor ON field_mappings(vendor_id, entity_type);
CREATE INDEX IF NOT EXISTS idx_field_mappings_field ON field_mappings(canonical_field_id);
"#;
