//! Vault data model: metadata singleton, records, attachments, drafts
//! and listing filters.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use zeroize::Zeroizing;

use aegis_crypto::aead::NONCE_LEN;
use aegis_crypto::auth::StoredCredential;

use crate::codec;
use crate::error::VaultError;

/// Singleton per vault. `main_salt` feeds key derivation; the credential
/// gates unlock independently of the key.
#[derive(Debug, Clone)]
pub struct VaultMetadata {
    pub main_salt: Vec<u8>,
    pub schema_version: u32,
    pub created_at: DateTime<Utc>,
    pub credential: Option<StoredCredential>,
}

/// A record's secret payload as persisted: encoded ciphertext plus the
/// AEAD nonce it was sealed with. See [`crate::codec`] for why these are
/// text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EncryptedSecret {
    pub ciphertext: String,
    pub nonce: String,
}

impl EncryptedSecret {
    pub fn from_parts(ciphertext: &[u8], nonce: &[u8; NONCE_LEN]) -> Self {
        Self {
            ciphertext: codec::encode(ciphertext),
            nonce: codec::encode(nonce),
        }
    }

    pub fn decode(&self) -> Result<(Vec<u8>, [u8; NONCE_LEN]), VaultError> {
        codec::decode_pair(&self.ciphertext, &self.nonce)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub id: Uuid,
    pub title: String,
    pub username: String,
    pub website: String,
    pub category: String,
    pub tags: BTreeSet<String>,
    /// Display heuristic, not a security property.
    pub strength: u8,
    /// External breach-check annotation. Informational only.
    pub pwned_count: u32,
    pub updated_at: DateTime<Utc>,
    /// Present while the record sits in the trash.
    pub deleted_at: Option<DateTime<Utc>>,
    pub secret: Option<EncryptedSecret>,
    /// Set when rotation found this record undecryptable and cleared its
    /// ciphertext rather than abort.
    pub secret_lost: bool,
    /// Synthesized from the attachments table on read; never written
    /// back from here.
    #[serde(default)]
    pub attachments: Vec<AttachmentMeta>,
}

impl Record {
    pub fn is_trashed(&self) -> bool {
        self.deleted_at.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttachmentMeta {
    pub id: Uuid,
    pub record_id: Uuid,
    pub name: String,
    pub mime_type: String,
    pub size: u64,
}

/// Plain-record input from the host (or from an external importer that
/// has already mapped its format). The secret travels as plaintext only
/// inside this transient value.
#[derive(Default, Clone)]
pub struct RecordDraft {
    pub title: String,
    pub username: String,
    pub website: String,
    pub category: String,
    pub tags: BTreeSet<String>,
    pub secret: Option<Zeroizing<String>>,
    pub pwned_count: u32,
}

/// A record as handed to the host: stored fields plus the decrypted
/// secret. `secret: None` with `decrypt_failed: true` marks a record
/// whose ciphertext could not be opened; the rest of the batch is
/// unaffected.
pub struct DecryptedRecord {
    pub record: Record,
    pub secret: Option<Zeroizing<String>>,
    pub decrypt_failed: bool,
}

impl std::fmt::Debug for DecryptedRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecryptedRecord")
            .field("record", &self.record)
            .field("secret", &self.secret.as_ref().map(|_| "[REDACTED]"))
            .field("decrypt_failed", &self.decrypt_failed)
            .finish()
    }
}

/// Listing filter. `query` is a free-text subsequence match over
/// title/username/website/category/tags; `category` and `tag` are
/// equality filters; `trashed` selects the trash or the active
/// partition.
#[derive(Debug, Default, Clone)]
pub struct ListFilter {
    pub query: Option<String>,
    pub category: Option<String>,
    pub tag: Option<String>,
    pub trashed: bool,
}

/// Outcome of a bulk import of drafts.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub total: usize,
    pub weak: usize,
    pub missing_fields: usize,
    pub weak_ids: Vec<Uuid>,
}

/// Display strength metric: 8 points per character, capped at 100.
pub fn secret_strength(secret: &str) -> u8 {
    secret.chars().count().saturating_mul(8).min(100) as u8
}

/// Whether `record` passes `filter`. Trash partitioning applies first;
/// filters then narrow within the partition.
pub fn matches(record: &Record, filter: &ListFilter) -> bool {
    if record.is_trashed() != filter.trashed {
        return false;
    }
    if let Some(category) = &filter.category {
        if &record.category != category {
            return false;
        }
    }
    if let Some(tag) = &filter.tag {
        if !record.tags.contains(tag) {
            return false;
        }
    }
    if let Some(query) = &filter.query {
        let needle: String = query
            .chars()
            .filter(|c| !c.is_whitespace())
            .flat_map(char::to_lowercase)
            .collect();
        if !needle.is_empty() {
            let mut haystack = String::new();
            for part in [
                &record.title,
                &record.username,
                &record.website,
                &record.category,
            ] {
                haystack.push_str(&part.to_lowercase());
            }
            for tag in &record.tags {
                haystack.push_str(&tag.to_lowercase());
            }
            if !is_subsequence(&needle, &haystack) {
                return false;
            }
        }
    }
    true
}

/// True when every char of `needle` appears in `haystack` in order,
/// not necessarily contiguously.
fn is_subsequence(needle: &str, haystack: &str) -> bool {
    let mut chars = needle.chars().peekable();
    for c in haystack.chars() {
        if chars.peek() == Some(&c) {
            chars.next();
        }
        if chars.peek().is_none() {
            return true;
        }
    }
    chars.peek().is_none()
}
