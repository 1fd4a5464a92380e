//! Field mapping rules and vendors

use super::models::{NewMappingRule, Vendor};
use crate::error::{EngineError, Result};
use crate::mapping::{MappingRule, RawMappingRule};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

/// Get or create a vendor, returning its id
pub fn ensure_vendor(conn: &Connection, vendor_name: &str) -> Result<i64> {
    conn.execute(
        "INSERT OR IGNORE INTO vendors (vendor_name) VALUES (?)",
        [vendor_name],
    )?;
    let id = conn.query_row(
        "SELECT vendor_id FROM vendors WHERE vendor_name = ?",
        [vendor_name],
        |row| row.get(0),
    )?;
    Ok(id)
}

/// Get all vendors
pub fn get_vendors(conn: &Connection) -> Result<Vec<Vendor>> {
    let mut stmt = conn.prepare(
        "SELECT vendor_id, vendor_name, display_name, status FROM vendors ORDER BY vendor_name",
    )?;

    let vendors = stmt
        .query_map([], |row| {
            Ok(Vendor {
                vendor_id: row.get(0)?,
                vendor_name: row.get(1)?,
                display_name: row.get(2)?,
                status: row.get(3)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(vendors)
}

/// Insert a mapping rule. The rule is validated first, so a malformed path
/// or transformation spec never reaches the table.
pub fn insert_mapping_rule(conn: &Connection, rule: &NewMappingRule) -> Result<i64> {
    MappingRule::from_raw(rule.to_raw(0))?;

    let field_id: i64 = conn
        .query_row(
            "SELECT canonical_field_id FROM canonical_fields WHERE field_name = ?",
            [&rule.canonical_field],
            |row| row.get(0),
        )
        .optional()?
        .ok_or_else(|| {
            EngineError::NotFound(format!("Canonical field not found: {}", rule.canonical_field))
        })?;
    let vendor_id = ensure_vendor(conn, &rule.vendor)?;

    conn.execute(
        "INSERT INTO field_mappings
         (vendor_id, canonical_field_id, vendor_field_path, transformation_spec, default_value,
          priority, is_active, source_type, entity_type)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            vendor_id,
            field_id,
            rule.vendor_field_path,
            json_column(&rule.transformation_spec)?,
            rule.default_value.as_ref().map(json_column).transpose()?.flatten(),
            rule.priority,
            rule.is_active as i32,
            rule.source_type.as_str(),
            rule.entity_type.as_str(),
        ],
    )?;

    let id = conn.last_insert_rowid();
    tracing::info!(
        "Inserted mapping {} ({}.{} <- {})",
        id,
        rule.vendor,
        rule.canonical_field,
        rule.vendor_field_path
    );
    Ok(id)
}

/// Activate or deactivate a mapping rule
pub fn set_mapping_active(conn: &Connection, mapping_id: i64, is_active: bool) -> Result<()> {
    let rows = conn.execute(
        "UPDATE field_mappings SET is_active = ?, updated_at = datetime('now') WHERE mapping_id = ?",
        params![is_active as i32, mapping_id],
    )?;

    if rows == 0 {
        return Err(EngineError::NotFound(format!("Mapping not found: {}", mapping_id)));
    }

    Ok(())
}

/// Load mapping rules (active or not), optionally for one vendor, ordered by id
pub fn load_mapping_rules(conn: &Connection, vendor: Option<&str>) -> Result<Vec<RawMappingRule>> {
    let mut stmt = conn.prepare(
        "SELECT fm.mapping_id, v.vendor_name, cf.field_name, fm.vendor_field_path,
                fm.transformation_spec, fm.default_value, fm.priority, fm.is_active,
                fm.source_type, fm.entity_type
         FROM field_mappings fm
         JOIN vendors v ON fm.vendor_id = v.vendor_id
         JOIN canonical_fields cf ON fm.canonical_field_id = cf.canonical_field_id
         WHERE ?1 IS NULL OR v.vendor_name = ?1
         ORDER BY fm.mapping_id",
    )?;

    let rows = stmt
        .query_map([vendor], |row| {
            Ok(MappingRow {
                mapping_id: row.get(0)?,
                vendor: row.get(1)?,
                canonical_field: row.get(2)?,
                vendor_field_path: row.get(3)?,
                transformation_spec: row.get(4)?,
                default_value: row.get(5)?,
                priority: row.get(6)?,
                is_active: row.get::<_, i32>(7)? == 1,
                source_type: row.get(8)?,
                entity_type: row.get(9)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.into_iter().map(MappingRow::into_raw).collect()
}

/// Column values as stored, before JSON and enum parsing
struct MappingRow {
    mapping_id: i64,
    vendor: String,
    canonical_field: String,
    vendor_field_path: String,
    transformation_spec: Option<String>,
    default_value: Option<String>,
    priority: i32,
    is_active: bool,
    source_type: String,
    entity_type: String,
}

impl MappingRow {
    fn into_raw(self) -> Result<RawMappingRule> {
        let id = self.mapping_id;
        let invalid = |e: EngineError| EngineError::invalid_spec(id, e.to_string());

        Ok(RawMappingRule {
            mapping_id: id,
            transformation_spec: parse_json(id, self.transformation_spec.as_deref())?,
            default_value: match parse_json(id, self.default_value.as_deref())? {
                Value::Null => None,
                value => Some(value),
            },
            source_type: self.source_type.parse().map_err(invalid)?,
            entity_type: self.entity_type.parse().map_err(invalid)?,
            vendor: self.vendor,
            canonical_field: self.canonical_field,
            vendor_field_path: self.vendor_field_path,
            priority: self.priority,
            is_active: self.is_active,
        })
    }
}

fn parse_json(mapping_id: i64, text: Option<&str>) -> Result<Value> {
    match text.map(str::trim) {
        None | Some("") => Ok(Value::Null),
        Some(raw) => serde_json::from_str(raw)
            .map_err(|e| EngineError::invalid_spec(mapping_id, format!("stored JSON is invalid: {}", e))),
    }
}

/// JSON text for a nullable column
fn json_column(value: &Value) -> Result<Option<String>> {
    if value.is_null() {
        return Ok(None);
    }
    Ok(Some(serde_json::to_string(value)?))
}
