//! Catalog database schema and migration framework.
//!
//! ## Versioning strategy
//!
//! The catalog stores its schema version in the `config` table under the
//! `schema_version` key. On every open, [`migrate`] compares the stored
//! version against [`SCHEMA_VERSION`]:
//!
//! - **DB version == code version** → no-op.
//! - **DB version < code version** → run pending migrations in a transaction.
//! - **DB version > code version** → fail with [`Error::SchemaTooNew`] so the
//!   user knows to upgrade omnidupe.
//! - **No version key** (pre-versioning DB) → auto-set to 1.
//!
//! ## Adding a migration
//!
//! 1. Increment [`SCHEMA_VERSION`].
//! 2. Write a `fn(conn: &Connection) -> Result<()>` that performs the DDL/DML.
//! 3. Append it to [`MIGRATIONS`]. The array index maps to the transition:
//!    `MIGRATIONS[0]` = v1→v2, `MIGRATIONS[1]` = v2→v3, etc.

use rusqlite::{params, Connection};

use crate::error::{Error, Result};

/// Current schema version. Bump when adding a migration.
pub const SCHEMA_VERSION: i64 = 1;

/// Ordered list of migrations. `MIGRATIONS[i]` migrates from version `i+1` to `i+2`.
pub const MIGRATIONS: &[fn(&Connection) -> Result<()>] = &[];

pub fn initialize(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS images (
            id                  INTEGER PRIMARY KEY AUTOINCREMENT,
            file_path           TEXT NOT NULL UNIQUE,
            file_size           INTEGER NOT NULL,
            content_hash        TEXT NOT NULL,
            width               INTEGER NOT NULL,
            height              INTEGER NOT NULL,
            format              TEXT NOT NULL,
            timestamp           TEXT,
            camera_make         TEXT NOT NULL DEFAULT '',
            camera_model        TEXT NOT NULL DEFAULT '',
            gps_latitude        REAL,
            gps_longitude       REAL,
            perceptual_hash     TEXT,
            average_hash        TEXT,
            difference_hash     TEXT,
            wavelet_hash        TEXT,
            creation_time       TEXT NOT NULL,
            modification_time   TEXT NOT NULL,
            processed_at        TEXT NOT NULL,
            marked_for_removal  INTEGER NOT NULL DEFAULT 0,
            is_protected        INTEGER NOT NULL DEFAULT 0,
            removal_reason      TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_images_content_hash ON images(content_hash);
        CREATE INDEX IF NOT EXISTS idx_images_timestamp ON images(timestamp);
        CREATE INDEX IF NOT EXISTS idx_images_perceptual_hash ON images(perceptual_hash);
        CREATE INDEX IF NOT EXISTS idx_images_dimensions ON images(width, height);
        CREATE INDEX IF NOT EXISTS idx_images_camera ON images(camera_make, camera_model);
        CREATE INDEX IF NOT EXISTS idx_images_marked ON images(marked_for_removal, is_protected);

        CREATE TABLE IF NOT EXISTS duplicate_groups (
            id                  INTEGER PRIMARY KEY AUTOINCREMENT,
            kind                TEXT NOT NULL,
            similarity_score    REAL,
            created_at          TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS group_images (
            group_id    INTEGER NOT NULL REFERENCES duplicate_groups(id),
            image_id    INTEGER NOT NULL REFERENCES images(id),
            is_keeper   INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (group_id, image_id)
        );

        CREATE INDEX IF NOT EXISTS idx_group_images_image ON group_images(image_id);

        CREATE TABLE IF NOT EXISTS config (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        ",
    )?;
    Ok(())
}

/// Read the schema version from the config table. Returns 0 if the key is absent
/// (pre-versioning database).
fn get_schema_version(conn: &Connection) -> Result<i64> {
    let version: Option<String> = conn
        .query_row(
            "SELECT value FROM config WHERE key = 'schema_version'",
            [],
            |row| row.get(0),
        )
        .ok();
    Ok(version.and_then(|v| v.parse().ok()).unwrap_or(0))
}

/// Write the schema version into the config table.
fn set_schema_version(conn: &Connection, version: i64) -> Result<()> {
    conn.execute(
        "INSERT INTO config (key, value) VALUES ('schema_version', ?1)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![version.to_string()],
    )?;
    Ok(())
}

/// Run pending migrations and update the stored schema version.
///
/// Must be called **after** [`initialize`] so the config table exists.
pub fn migrate(conn: &Connection) -> Result<()> {
    let db_version = get_schema_version(conn);

    // Treat version 0 (no key) as pre-versioning — set to 1 (initial schema).
    let db_version = match db_version {
        Ok(0) => {
            set_schema_version(conn, 1)?;
            1
        }
        Ok(v) => v,
        Err(e) => return Err(e),
    };

    if db_version > SCHEMA_VERSION {
        return Err(Error::SchemaTooNew {
            db: db_version,
            code: SCHEMA_VERSION,
        });
    }

    // Run pending migrations inside a transaction.
    if db_version < SCHEMA_VERSION {
        let tx = conn.unchecked_transaction()?;
        for migration in MIGRATIONS.iter().skip(db_version as usize) {
            migration(&tx)?;
        }
        set_schema_version(&tx, SCHEMA_VERSION)?;
        tx.commit()?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_mem() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        conn
    }

    #[test]
    fn initialize_creates_expected_tables() {
        let conn = open_mem();
        let count: i64 = conn
            .query_row(
                "SELECT count(*) FROM sqlite_master WHERE type='table' AND name='images'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn migrate_sets_version_on_fresh_db() {
        let conn = open_mem();
        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn migrate_is_idempotent() {
        let conn = open_mem();
        migrate(&conn).unwrap();
        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn migrate_rejects_future_schema_version() {
        let conn = open_mem();
        set_schema_version(&conn, SCHEMA_VERSION + 1).unwrap();
        let err = migrate(&conn).unwrap_err();
        assert!(matches!(err, Error::SchemaTooNew { .. }));
    }
}
