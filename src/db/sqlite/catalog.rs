//! Canonical field catalog tables

use crate::catalog::{CanonicalField, Catalog, DataType};
use crate::error::Result;
use rusqlite::{params, Connection, OptionalExtension};

/// Write a catalog's fields and templates. Existing rows are left alone.
///
/// Returns the number of canonical fields inserted.
pub fn seed_catalog(conn: &mut Connection, catalog: &Catalog) -> Result<usize> {
    let tx = conn.transaction()?;
    let mut inserted = 0;

    {
        let mut insert_field = tx.prepare(
            "INSERT OR IGNORE INTO canonical_fields (field_name, description, data_type, category)
             VALUES (?, ?, ?, ?)",
        )?;
        for field in catalog.fields() {
            inserted += insert_field.execute(params![
                field.field_name,
                field.description,
                field.data_type.as_str(),
                field.category.as_str(),
            ])?;
        }

        let mut insert_type =
            tx.prepare("INSERT OR IGNORE INTO canonical_data_types (data_type_name) VALUES (?)")?;
        let mut insert_link = tx.prepare(
            "INSERT OR IGNORE INTO data_type_fields (data_type_id, canonical_field_id, is_required, field_order)
             SELECT dt.data_type_id, cf.canonical_field_id, ?, ?
             FROM canonical_data_types dt, canonical_fields cf
             WHERE dt.data_type_name = ? AND cf.field_name = ?",
        )?;

        for template in catalog.templates() {
            insert_type.execute([template.data_type.as_str()])?;
            for (order, entry) in template.fields.iter().enumerate() {
                insert_link.execute(params![
                    entry.is_required as i32,
                    order as i64,
                    template.data_type.as_str(),
                    entry.field.field_name,
                ])?;
            }
        }
    }

    tx.commit()?;
    tracing::info!("Seeded catalog: {} canonical fields inserted", inserted);
    Ok(inserted)
}

/// Number of canonical fields stored
pub fn count_canonical_fields(conn: &Connection) -> Result<i64> {
    let count = conn.query_row("SELECT COUNT(*) FROM canonical_fields", [], |row| row.get(0))?;
    Ok(count)
}

/// Build a catalog from the stored fields and templates
pub fn load_catalog(conn: &Connection) -> Result<Catalog> {
    let mut catalog = Catalog::new();

    let mut stmt = conn.prepare(
        "SELECT field_name, data_type, category, description
         FROM canonical_fields ORDER BY canonical_field_id",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    for (name, data_type, category, description) in rows {
        let mut field = CanonicalField::new(&name, data_type.parse()?, category.parse()?);
        field.description = description;
        catalog.add_field(field);
    }

    let mut stmt = conn.prepare(
        "SELECT cf.field_name, dtf.is_required
         FROM data_type_fields dtf
         JOIN canonical_fields cf ON dtf.canonical_field_id = cf.canonical_field_id
         WHERE dtf.data_type_id = ?
         ORDER BY dtf.field_order, cf.field_name",
    )?;

    for data_type in DataType::ALL {
        let id: Option<i64> = conn
            .query_row(
                "SELECT data_type_id FROM canonical_data_types WHERE data_type_name = ?",
                [data_type.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        let Some(id) = id else { continue };

        let entries = stmt
            .query_map([id], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i32>(1)? == 1)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let entries: Vec<(&str, bool)> = entries.iter().map(|(name, required)| (name.as_str(), *required)).collect();

        catalog.set_template(data_type, &entries)?;
    }

    tracing::info!(
        "Loaded catalog: {} fields, {} templates",
        catalog.field_count(),
        catalog.templates().len()
    );
    Ok(catalog)
}
