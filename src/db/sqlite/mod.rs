//! SQLite mapping store
//!
//! Holds the canonical catalog and the authored mapping rules. The engine
//! only ever reads rules from here as a validated snapshot.

pub mod models;
mod catalog;
mod mappings;
mod migrations;

use crate::catalog::Catalog;
use crate::error::Result;
use crate::mapping::RawMappingRule;
pub use models::{NewMappingRule, Vendor};
use parking_lot::Mutex;
use rusqlite::Connection;
use std::path::Path;

/// SQLite database wrapper
pub struct SqliteDb {
    conn: Mutex<Connection>,
}

impl SqliteDb {
    /// Open (or create) the database file
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        // Enable WAL mode for better concurrent access
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        Self::with_connection(conn)
    }

    /// Private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.run_migrations()?;

        Ok(db)
    }

    /// Run database migrations
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn.lock();
        migrations::run_migrations(&conn)
    }

    // ========== Catalog Methods ==========

    /// Store a catalog's fields and templates, keeping existing rows
    pub fn seed_catalog(&self, catalog: &Catalog) -> Result<usize> {
        let mut conn = self.conn.lock();
        catalog::seed_catalog(&mut conn, catalog)
    }

    /// Whether any canonical field has been stored
    pub fn has_catalog(&self) -> Result<bool> {
        let conn = self.conn.lock();
        Ok(catalog::count_canonical_fields(&conn)? > 0)
    }

    /// Load the stored catalog
    pub fn load_catalog(&self) -> Result<Catalog> {
        let conn = self.conn.lock();
        catalog::load_catalog(&conn)
    }

    // ========== Mapping Methods ==========

    /// Validate and insert a mapping rule, returning its id
    pub fn insert_mapping_rule(&self, rule: &NewMappingRule) -> Result<i64> {
        let conn = self.conn.lock();
        mappings::insert_mapping_rule(&conn, rule)
    }

    /// Activate or deactivate a mapping rule
    pub fn set_mapping_active(&self, mapping_id: i64, is_active: bool) -> Result<()> {
        let conn = self.conn.lock();
        mappings::set_mapping_active(&conn, mapping_id, is_active)
    }

    /// Load stored rules, optionally for a single vendor
    pub fn load_mapping_rules(&self, vendor: Option<&str>) -> Result<Vec<RawMappingRule>> {
        let conn = self.conn.lock();
        mappings::load_mapping_rules(&conn, vendor)
    }

    /// Get all vendors
    pub fn get_vendors(&self) -> Result<Vec<Vendor>> {
        let conn = self.conn.lock();
        mappings::get_vendors(&conn)
    }
}
