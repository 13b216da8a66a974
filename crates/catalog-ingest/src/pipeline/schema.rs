//! SQLite schema for the product store.

use rusqlite::Connection;

use crate::{Error, Result};

/// Current schema version. Increment when making breaking changes.
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema.
///
/// Creates all tables on a fresh database. Opening a database written by a
/// newer schema version is refused.
pub fn init_schema(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        create_tables(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if current_version > SCHEMA_VERSION {
        return Err(Error::Store(format!(
            "database schema version {current_version} is newer than supported version {SCHEMA_VERSION}"
        )));
    }

    Ok(())
}

/// Get the current schema version (0 if not initialized).
fn get_schema_version(conn: &Connection) -> rusqlite::Result<i32> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER NOT NULL
        )",
        [],
    )?;

    let version: Option<i32> = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .ok();

    Ok(version.unwrap_or(0))
}

fn set_schema_version(conn: &Connection, version: i32) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?)", [version])?;
    Ok(())
}

fn create_tables(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS products (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            code INTEGER NOT NULL UNIQUE,
            status TEXT NOT NULL DEFAULT 'published'
                CHECK (status IN ('draft', 'trash', 'published')),
            imported_t TEXT NOT NULL,
            url TEXT,
            creator TEXT,
            created_t INTEGER,
            last_modified_t INTEGER,
            product_name TEXT,
            quantity TEXT,
            brands TEXT,
            categories TEXT,
            labels TEXT,
            cities TEXT,
            purchase_places TEXT,
            stores TEXT,
            ingredients_text TEXT,
            traces TEXT,
            serving_size TEXT,
            serving_quantity REAL,
            nutriscore_score INTEGER,
            nutriscore_grade TEXT,
            main_category TEXT,
            image_url TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_products_status ON products(status);
        CREATE INDEX IF NOT EXISTS idx_products_imported_t ON products(imported_t);
        "#,
    )
}
