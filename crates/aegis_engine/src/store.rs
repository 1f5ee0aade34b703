//! Persistent keyed store: one metadata row, records by id, attachment
//! blobs by id with a secondary index on the owning record.
//!
//! SQLite does not natively encrypt. Secret payloads arrive here already
//! sealed (ciphertext + nonce); everything needed for listing and
//! filtering (titles, categories, timestamps) is plaintext so queries
//! stay cheap. The store is exclusively owned by the engine process —
//! no external writer is assumed.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use aegis_crypto::auth::StoredCredential;

use crate::error::VaultError;
use crate::migrations;
use crate::models::{AttachmentMeta, EncryptedSecret, Record, VaultMetadata};

pub struct Store {
    pub(crate) conn: Connection,
}

impl Store {
    /// Open (or create) the vault database and bring its schema up to
    /// date. WAL and foreign-key enforcement are configured at
    /// connection time, not inside a migration — SQLite forbids changing
    /// `journal_mode` inside a transaction.
    pub fn open(db_path: &Path) -> Result<Self, VaultError> {
        let conn = Connection::open(db_path)?;
        conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))?;
        conn.pragma_update(None, "foreign_keys", true)?;
        migrations::run(&conn)?;
        Ok(Self { conn })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, VaultError> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", true)?;
        migrations::run(&conn)?;
        Ok(Self { conn })
    }

    // ── Metadata ─────────────────────────────────────────────────────────

    pub fn metadata(&self) -> Result<Option<VaultMetadata>, VaultError> {
        self.conn
            .query_row(
                "SELECT main_salt, schema_version, created_at, auth_hash, auth_salt, auth_iterations
                 FROM vault_meta WHERE id = 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, Vec<u8>>(0)?,
                        row.get::<_, u32>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<Vec<u8>>>(3)?,
                        row.get::<_, Option<Vec<u8>>>(4)?,
                        row.get::<_, Option<u32>>(5)?,
                    ))
                },
            )
            .optional()?
            .map(|(main_salt, schema_version, created_at, hash, salt, iterations)| {
                let credential = match (hash, salt, iterations) {
                    (Some(verification_hash), Some(auth_salt), Some(iterations)) => {
                        Some(StoredCredential {
                            verification_hash,
                            iterations,
                            auth_salt,
                        })
                    }
                    _ => None,
                };
                Ok(VaultMetadata {
                    main_salt,
                    schema_version,
                    created_at: parse_timestamp(&created_at)?,
                    credential,
                })
            })
            .transpose()
    }

    pub fn write_metadata(&self, metadata: &VaultMetadata) -> Result<(), VaultError> {
        write_metadata_on(&self.conn, metadata)
    }

    // ── Records ──────────────────────────────────────────────────────────

    pub fn upsert_record(&self, record: &Record) -> Result<(), VaultError> {
        upsert_record_on(&self.conn, record)
    }

    pub fn record(&self, id: Uuid) -> Result<Option<Record>, VaultError> {
        let record = self
            .conn
            .query_row(
                &format!("SELECT {RECORD_COLUMNS} FROM records WHERE id = ?1"),
                [id.to_string()],
                row_to_record,
            )
            .optional()?;
        match record {
            Some(mut record) => {
                record.attachments = self.attachments_for(id)?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// Every record, attachment metadata attached, trashed included.
    pub fn all_records(&self) -> Result<Vec<Record>, VaultError> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {RECORD_COLUMNS} FROM records"))?;
        let mut records: Vec<Record> = stmt
            .query_map([], row_to_record)?
            .collect::<Result<_, _>>()?;

        let mut by_record: HashMap<Uuid, Vec<AttachmentMeta>> = HashMap::new();
        let mut stmt = self
            .conn
            .prepare("SELECT id, record_id, name, mime_type, size FROM attachments")?;
        for meta in stmt.query_map([], row_to_attachment_meta)? {
            let meta = meta?;
            by_record.entry(meta.record_id).or_default().push(meta);
        }
        for record in &mut records {
            if let Some(attachments) = by_record.remove(&record.id) {
                record.attachments = attachments;
            }
        }
        Ok(records)
    }

    pub fn count_records(&self) -> Result<u64, VaultError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Returns false when no such record exists. Attachments go with it
    /// via the FK cascade.
    pub fn delete_record(&self, id: Uuid) -> Result<bool, VaultError> {
        let changed = self
            .conn
            .execute("DELETE FROM records WHERE id = ?1", [id.to_string()])?;
        Ok(changed > 0)
    }

    pub fn set_deleted_at(
        &self,
        id: Uuid,
        deleted_at: Option<DateTime<Utc>>,
    ) -> Result<bool, VaultError> {
        let changed = self.conn.execute(
            "UPDATE records SET deleted_at = ?1 WHERE id = ?2",
            params![deleted_at.map(|t| t.to_rfc3339()), id.to_string()],
        )?;
        Ok(changed > 0)
    }

    /// Ids and trash timestamps of every trashed record.
    pub fn trashed_records(&self) -> Result<Vec<(Uuid, DateTime<Utc>)>, VaultError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, deleted_at FROM records WHERE deleted_at IS NOT NULL")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut trashed = Vec::new();
        for row in rows {
            let (id, deleted_at) = row?;
            trashed.push((parse_uuid(&id)?, parse_timestamp(&deleted_at)?));
        }
        Ok(trashed)
    }

    // ── Attachments ──────────────────────────────────────────────────────

    pub fn insert_attachment(
        &self,
        meta: &AttachmentMeta,
        nonce: &[u8],
        data: &[u8],
    ) -> Result<(), VaultError> {
        insert_attachment_on(&self.conn, meta, nonce, data)
    }

    pub fn attachment(
        &self,
        id: Uuid,
    ) -> Result<Option<(AttachmentMeta, Vec<u8>, Vec<u8>)>, VaultError> {
        self.conn
            .query_row(
                "SELECT id, record_id, name, mime_type, size, nonce, data
                 FROM attachments WHERE id = ?1",
                [id.to_string()],
                |row| {
                    Ok((
                        row_to_attachment_meta(row)?,
                        row.get::<_, Vec<u8>>(5)?,
                        row.get::<_, Vec<u8>>(6)?,
                    ))
                },
            )
            .optional()
            .map_err(VaultError::from)
    }

    pub fn delete_attachment(&self, id: Uuid) -> Result<bool, VaultError> {
        let changed = self
            .conn
            .execute("DELETE FROM attachments WHERE id = ?1", [id.to_string()])?;
        Ok(changed > 0)
    }

    pub fn attachments_for(&self, record_id: Uuid) -> Result<Vec<AttachmentMeta>, VaultError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, record_id, name, mime_type, size FROM attachments WHERE record_id = ?1",
        )?;
        let metas = stmt
            .query_map([record_id.to_string()], row_to_attachment_meta)?
            .collect::<Result<_, _>>()?;
        Ok(metas)
    }

    /// Every attachment with its ciphertext, for rotation.
    pub fn all_attachment_blobs(
        &self,
    ) -> Result<Vec<(AttachmentMeta, Vec<u8>, Vec<u8>)>, VaultError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, record_id, name, mime_type, size, nonce, data FROM attachments")?;
        let blobs = stmt
            .query_map([], |row| {
                Ok((
                    row_to_attachment_meta(row)?,
                    row.get::<_, Vec<u8>>(5)?,
                    row.get::<_, Vec<u8>>(6)?,
                ))
            })?
            .collect::<Result<_, _>>()?;
        Ok(blobs)
    }

    // ── Atomic multi-table writes ────────────────────────────────────────

    /// Commit a completed rotation in one transaction: new metadata,
    /// every re-encrypted record, every re-encrypted attachment blob,
    /// and removal of attachments rotation had to abandon. Either all of
    /// it lands or none of it does.
    pub fn commit_rotation(
        &mut self,
        metadata: &VaultMetadata,
        records: &[Record],
        attachments: &[(Uuid, Vec<u8>, Vec<u8>)],
        dropped_attachments: &[Uuid],
    ) -> Result<(), VaultError> {
        let tx = self.conn.transaction()?;
        write_metadata_on(&tx, metadata)?;
        for record in records {
            upsert_record_on(&tx, record)?;
        }
        for (id, nonce, data) in attachments {
            tx.execute(
                "UPDATE attachments SET nonce = ?1, data = ?2 WHERE id = ?3",
                params![nonce, data, id.to_string()],
            )?;
        }
        for id in dropped_attachments {
            tx.execute("DELETE FROM attachments WHERE id = ?1", [id.to_string()])?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Wholesale replacement of the vault contents (encrypted import).
    pub fn replace_all(
        &mut self,
        metadata: &VaultMetadata,
        records: &[Record],
        attachments: &[(AttachmentMeta, Vec<u8>, Vec<u8>)],
    ) -> Result<(), VaultError> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM attachments", [])?;
        tx.execute("DELETE FROM records", [])?;
        write_metadata_on(&tx, metadata)?;
        for record in records {
            upsert_record_on(&tx, record)?;
        }
        for (meta, nonce, data) in attachments {
            insert_attachment_on(&tx, meta, nonce, data)?;
        }
        tx.commit()?;
        Ok(())
    }
}

const RECORD_COLUMNS: &str = "id, title, username, website, category, tags, strength, \
     pwned_count, updated_at, deleted_at, secret_cipher, secret_nonce, secret_lost";

fn write_metadata_on(conn: &Connection, metadata: &VaultMetadata) -> Result<(), VaultError> {
    let (hash, salt, iterations) = match &metadata.credential {
        Some(cred) => (
            Some(cred.verification_hash.clone()),
            Some(cred.auth_salt.clone()),
            Some(cred.iterations),
        ),
        None => (None, None, None),
    };
    conn.execute(
        "INSERT OR REPLACE INTO vault_meta
         (id, main_salt, schema_version, created_at, auth_hash, auth_salt, auth_iterations)
         VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            metadata.main_salt,
            metadata.schema_version,
            metadata.created_at.to_rfc3339(),
            hash,
            salt,
            iterations,
        ],
    )?;
    Ok(())
}

fn upsert_record_on(conn: &Connection, record: &Record) -> Result<(), VaultError> {
    let tags = serde_json::to_string(&record.tags)?;
    conn.execute(
        "INSERT OR REPLACE INTO records
         (id, title, username, website, category, tags, strength, pwned_count,
          updated_at, deleted_at, secret_cipher, secret_nonce, secret_lost)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            record.id.to_string(),
            record.title,
            record.username,
            record.website,
            record.category,
            tags,
            record.strength,
            record.pwned_count,
            record.updated_at.to_rfc3339(),
            record.deleted_at.map(|t| t.to_rfc3339()),
            record.secret.as_ref().map(|s| s.ciphertext.clone()),
            record.secret.as_ref().map(|s| s.nonce.clone()),
            record.secret_lost,
        ],
    )?;
    Ok(())
}

fn insert_attachment_on(
    conn: &Connection,
    meta: &AttachmentMeta,
    nonce: &[u8],
    data: &[u8],
) -> Result<(), VaultError> {
    conn.execute(
        "INSERT INTO attachments (id, record_id, name, mime_type, size, nonce, data)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            meta.id.to_string(),
            meta.record_id.to_string(),
            meta.name,
            meta.mime_type,
            meta.size as i64,
            nonce,
            data,
        ],
    )?;
    Ok(())
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<Record> {
    let id: String = row.get(0)?;
    let tags: String = row.get(5)?;
    let updated_at: String = row.get(8)?;
    let deleted_at: Option<String> = row.get(9)?;
    let secret_cipher: Option<String> = row.get(10)?;
    let secret_nonce: Option<String> = row.get(11)?;

    let secret = match (secret_cipher, secret_nonce) {
        (Some(ciphertext), Some(nonce)) => Some(EncryptedSecret { ciphertext, nonce }),
        _ => None,
    };

    Ok(Record {
        id: parse_uuid(&id).map_err(invalid_row)?,
        title: row.get(1)?,
        username: row.get(2)?,
        website: row.get(3)?,
        category: row.get(4)?,
        tags: serde_json::from_str(&tags).map_err(|e| invalid_row(VaultError::from(e)))?,
        strength: row.get::<_, i64>(6)?.clamp(0, 100) as u8,
        pwned_count: row.get(7)?,
        updated_at: parse_timestamp(&updated_at).map_err(invalid_row)?,
        deleted_at: deleted_at
            .map(|t| parse_timestamp(&t))
            .transpose()
            .map_err(invalid_row)?,
        secret,
        secret_lost: row.get(12)?,
        attachments: Vec::new(),
    })
}

fn row_to_attachment_meta(row: &Row<'_>) -> rusqlite::Result<AttachmentMeta> {
    let id: String = row.get(0)?;
    let record_id: String = row.get(1)?;
    Ok(AttachmentMeta {
        id: parse_uuid(&id).map_err(invalid_row)?,
        record_id: parse_uuid(&record_id).map_err(invalid_row)?,
        name: row.get(2)?,
        mime_type: row.get(3)?,
        size: row.get::<_, i64>(4)? as u64,
    })
}

fn parse_uuid(text: &str) -> Result<Uuid, VaultError> {
    Uuid::parse_str(text).map_err(|_| VaultError::VaultCorrupt(format!("malformed id: {text}")))
}

fn parse_timestamp(text: &str) -> Result<DateTime<Utc>, VaultError> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| VaultError::VaultCorrupt(format!("malformed timestamp: {text}")))
}

fn invalid_row(e: VaultError) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
}
