//! Versioned schema migrations, applied on every open before the engine
//! exposes any operation. `PRAGMA user_version` tracks the last applied
//! step; the version only ever increases.
//!
//! The step numbering mirrors the vault's history: v1 records only,
//! v2 adds the metadata singleton, v3 adds attachments. Synthesizing
//! metadata for a pre-v2 vault needs the passphrase and therefore
//! happens during unlock, not here.

use rusqlite::Connection;

use crate::error::VaultError;

pub const SCHEMA_VERSION: u32 = 3;

pub fn run(conn: &Connection) -> Result<(), VaultError> {
    let version: u32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if version > SCHEMA_VERSION {
        return Err(VaultError::VaultCorrupt(format!(
            "vault schema v{version} is newer than supported v{SCHEMA_VERSION}"
        )));
    }
    if version == SCHEMA_VERSION {
        return Ok(());
    }

    if version < 1 {
        conn.execute_batch(
            "CREATE TABLE records (
                id            TEXT PRIMARY KEY,
                title         TEXT NOT NULL,
                username      TEXT NOT NULL DEFAULT '',
                website       TEXT NOT NULL DEFAULT '',
                category      TEXT NOT NULL DEFAULT 'General',
                tags          TEXT NOT NULL DEFAULT '[]',
                strength      INTEGER NOT NULL DEFAULT 0,
                pwned_count   INTEGER NOT NULL DEFAULT 0,
                updated_at    TEXT NOT NULL,
                deleted_at    TEXT,
                secret_cipher TEXT,
                secret_nonce  TEXT,
                secret_lost   INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX idx_records_category ON records(category);",
        )?;
    }

    if version < 2 {
        conn.execute_batch(
            "CREATE TABLE vault_meta (
                id              INTEGER PRIMARY KEY CHECK (id = 1),
                main_salt       BLOB NOT NULL,
                schema_version  INTEGER NOT NULL,
                created_at      TEXT NOT NULL,
                auth_hash       BLOB,
                auth_salt       BLOB,
                auth_iterations INTEGER
            );",
        )?;
    }

    if version < 3 {
        conn.execute_batch(
            "CREATE TABLE attachments (
                id        TEXT PRIMARY KEY,
                record_id TEXT NOT NULL REFERENCES records(id) ON DELETE CASCADE,
                name      TEXT NOT NULL,
                mime_type TEXT NOT NULL,
                size      INTEGER NOT NULL,
                nonce     BLOB NOT NULL,
                data      BLOB NOT NULL
            );
            CREATE INDEX idx_attachments_record ON attachments(record_id);",
        )?;
    }

    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    Ok(())
}
