//! The vault engine: one explicit handle per vault file, owning the
//! single session and exposing the whole operation surface to the host.
//!
//! Everything is synchronous-blocking. `unlock` runs the memory-hard
//! KDF and is slow by design — hosts should dispatch it off the
//! interaction thread. There is no internal cancellation; a caller that
//! gives up simply discards the eventual result.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;
use zeroize::Zeroizing;

use aegis_crypto::{aead, auth, kdf};

use crate::config::EngineConfig;
use crate::error::VaultError;
use crate::export;
use crate::lifecycle;
use crate::migrations;
use crate::models::{
    self, DecryptedRecord, EncryptedSecret, ImportReport, ListFilter, Record, RecordDraft,
    VaultMetadata,
};
use crate::rotation;
use crate::session::{OpenSession, SessionKey, SessionKeyManager};
use crate::store::Store;

/// Salt used by vaults that predate versioned metadata. Their records
/// were keyed off this fixed string; migration writes it into the
/// metadata row so those records keep decrypting.
const LEGACY_MAIN_SALT: &[u8] = b"aegis-premium-salt-v4";

const WEAK_SECRET_CHARS: usize = 8;

/// Title fallback for bulk-imported drafts that arrive without one.
const IMPORTED_TITLE: &str = "Imported Entry";

pub struct VaultEngine {
    path: PathBuf,
    config: EngineConfig,
    session: SessionKeyManager,
}

impl VaultEngine {
    /// A handle for the vault database at `path`. Nothing is opened or
    /// created until the first `unlock`.
    pub fn new(path: impl AsRef<Path>, config: EngineConfig) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            config,
            session: SessionKeyManager::new(),
        }
    }

    pub fn is_locked(&self) -> bool {
        self.session.is_locked()
    }

    /// Open the store, migrate it, verify (or first-register) the
    /// passphrase, derive the key and open the session. Re-unlocking an
    /// already open vault re-authenticates from scratch.
    pub fn unlock(&self, passphrase: &str, device_secret: &str) -> Result<(), VaultError> {
        self.session.close();
        let store = Store::open(&self.path)?;
        let existing = store.metadata()?;
        let now = Utc::now();

        let (main_salt, created_at) = match &existing {
            Some(meta) => (meta.main_salt.clone(), meta.created_at),
            None if store.count_records()? > 0 => {
                info!("legacy vault detected; synthesizing versioned metadata");
                (LEGACY_MAIN_SALT.to_vec(), now)
            }
            None => (kdf::generate_salt().to_vec(), now),
        };

        // Cheap verification gate first; Argon2 work only after it passes.
        let credential = match existing.as_ref().and_then(|m| m.credential.clone()) {
            Some(credential) => {
                if !auth::verify(passphrase.as_bytes(), &credential) {
                    return Err(VaultError::AuthenticationFailed);
                }
                credential
            }
            None => auth::register(passphrase.as_bytes(), self.config.auth_iterations),
        };

        let key = kdf::derive_key(
            passphrase.as_bytes(),
            device_secret.as_bytes(),
            &main_salt,
            &self.config.kdf,
        )?;

        store.write_metadata(&VaultMetadata {
            main_salt,
            schema_version: migrations::SCHEMA_VERSION,
            created_at,
            credential: Some(credential),
        })?;

        lifecycle::auto_purge(&store, now)?;

        self.session.install(OpenSession {
            key: SessionKey::new(key),
            store,
        });
        info!("vault unlocked");
        Ok(())
    }

    /// Idempotent. Overwrites the key with random bytes, zeroizes it and
    /// closes the store connection. Called mid-rotation it waits for the
    /// rotation's commit point.
    pub fn lock(&self) {
        self.session.close();
        debug!("vault locked");
    }

    // ── Records ──────────────────────────────────────────────────────────

    pub fn create_record(&self, draft: &RecordDraft) -> Result<Uuid, VaultError> {
        self.session.with_session(|session| {
            let record = build_record(Uuid::new_v4(), draft, None, &session.key)?;
            session.store.upsert_record(&record)?;
            debug!(id = %record.id, "record created");
            Ok(record.id)
        })
    }

    /// Replace a record's fields from a draft. A draft without a secret
    /// keeps the stored ciphertext untouched.
    pub fn update_record(&self, id: Uuid, draft: &RecordDraft) -> Result<(), VaultError> {
        self.session.with_session(|session| {
            let existing = session
                .store
                .record(id)?
                .ok_or_else(|| VaultError::NotFound(id.to_string()))?;
            let record = build_record(id, draft, Some(&existing), &session.key)?;
            session.store.upsert_record(&record)?;
            debug!(%id, "record updated");
            Ok(())
        })
    }

    /// Filtered listing with decrypted secrets. A record whose
    /// ciphertext cannot be opened (either encoding) is surfaced with
    /// `secret: None` and `decrypt_failed` set; the batch never aborts.
    pub fn list_records(&self, filter: &ListFilter) -> Result<Vec<DecryptedRecord>, VaultError> {
        self.session.with_session(|session| {
            let mut listed = Vec::new();
            for record in session.store.all_records()? {
                if !models::matches(&record, filter) {
                    continue;
                }
                let (secret, decrypt_failed) = match &record.secret {
                    None => (None, false),
                    Some(encrypted) => match open_secret(encrypted, &session.key) {
                        Ok(secret) => (Some(secret), false),
                        Err(_) => (None, true),
                    },
                };
                listed.push(DecryptedRecord {
                    record,
                    secret,
                    decrypt_failed,
                });
            }
            Ok(listed)
        })
    }

    /// Bulk insertion of importer-produced drafts, reporting weak and
    /// incomplete entries. Drafts without a secret are counted but not
    /// stored.
    pub fn bulk_add_records(&self, drafts: &[RecordDraft]) -> Result<ImportReport, VaultError> {
        self.session.with_session(|session| {
            let mut report = ImportReport {
                total: drafts.len(),
                ..Default::default()
            };
            for draft in drafts {
                if draft.title.is_empty() || draft.secret.is_none() {
                    report.missing_fields += 1;
                }
                let Some(secret) = &draft.secret else { continue };
                let mut draft = draft.clone();
                if draft.title.is_empty() {
                    draft.title = IMPORTED_TITLE.into();
                }
                let record = build_record(Uuid::new_v4(), &draft, None, &session.key)?;
                if secret.chars().count() < WEAK_SECRET_CHARS {
                    report.weak += 1;
                    report.weak_ids.push(record.id);
                }
                session.store.upsert_record(&record)?;
            }
            debug!(total = report.total, weak = report.weak, "bulk import finished");
            Ok(report)
        })
    }

    /// Store the external breach-check result for a record. Informational
    /// only; nothing in the engine depends on it.
    pub fn annotate_breach_count(&self, id: Uuid, count: u32) -> Result<(), VaultError> {
        self.session.with_session(|session| {
            let mut record = session
                .store
                .record(id)?
                .ok_or_else(|| VaultError::NotFound(id.to_string()))?;
            record.pwned_count = count;
            session.store.upsert_record(&record)
        })
    }

    // ── Trash lifecycle ──────────────────────────────────────────────────

    pub fn move_to_trash(&self, id: Uuid) -> Result<(), VaultError> {
        self.session
            .with_session(|session| lifecycle::move_to_trash(&session.store, id, Utc::now()))
    }

    pub fn restore(&self, id: Uuid) -> Result<(), VaultError> {
        self.session
            .with_session(|session| lifecycle::restore(&session.store, id))
    }

    pub fn purge(&self, id: Uuid) -> Result<(), VaultError> {
        self.session
            .with_session(|session| lifecycle::purge(&session.store, id))
    }

    pub fn empty_trash(&self) -> Result<usize, VaultError> {
        self.session
            .with_session(|session| lifecycle::empty_trash(&session.store))
    }

    pub fn auto_purge(&self, now: DateTime<Utc>) -> Result<usize, VaultError> {
        self.session
            .with_session(|session| lifecycle::auto_purge(&session.store, now))
    }

    // ── Attachments ──────────────────────────────────────────────────────

    pub fn add_attachment(
        &self,
        record_id: Uuid,
        bytes: &[u8],
        name: &str,
        mime_type: &str,
    ) -> Result<Uuid, VaultError> {
        self.session.with_session(|session| {
            // Size gate before any encryption work.
            lifecycle::ensure_attachment_size(bytes.len() as u64)?;
            if session.store.record(record_id)?.is_none() {
                return Err(VaultError::NotFound(record_id.to_string()));
            }
            let (ciphertext, nonce) = aead::seal(session.key.bytes(), bytes)?;
            let meta = models::AttachmentMeta {
                id: Uuid::new_v4(),
                record_id,
                name: name.to_string(),
                mime_type: mime_type.to_string(),
                size: bytes.len() as u64,
            };
            session.store.insert_attachment(&meta, &nonce, &ciphertext)?;
            debug!(id = %meta.id, %record_id, size = meta.size, "attachment added");
            Ok(meta.id)
        })
    }

    pub fn read_attachment(&self, id: Uuid) -> Result<Zeroizing<Vec<u8>>, VaultError> {
        self.session.with_session(|session| {
            let (_, nonce, data) = session
                .store
                .attachment(id)?
                .ok_or_else(|| VaultError::NotFound(id.to_string()))?;
            let nonce: [u8; aead::NONCE_LEN] = nonce
                .as_slice()
                .try_into()
                .map_err(|_| VaultError::DecryptionFailed)?;
            Ok(aead::open(session.key.bytes(), &nonce, &data)?)
        })
    }

    pub fn remove_attachment(&self, id: Uuid) -> Result<(), VaultError> {
        self.session.with_session(|session| {
            if !session.store.delete_attachment(id)? {
                return Err(VaultError::NotFound(id.to_string()));
            }
            Ok(())
        })
    }

    // ── Rotation, export, destruction ────────────────────────────────────

    /// Change the master passphrase: fresh salts, fresh credential, the
    /// whole corpus re-encrypted, committed atomically. Holds the
    /// session for its full duration, so no other operation interleaves.
    pub fn rotate_passphrase(
        &self,
        old_passphrase: &str,
        new_passphrase: &str,
        device_secret: &str,
    ) -> Result<(), VaultError> {
        self.session.with_session(|session| {
            rotation::rotate(
                session,
                &self.config,
                old_passphrase,
                new_passphrase,
                device_secret,
            )
        })
    }

    /// Still-encrypted dump of the whole vault, safe to hand to a
    /// transport.
    pub fn export_encrypted(&self) -> Result<Vec<u8>, VaultError> {
        self.session
            .with_session(|session| export::export(&session.store))
    }

    /// Replace the vault contents with a previously exported dump. The
    /// engine ends locked; the host re-unlocks against the imported
    /// metadata.
    pub fn import_encrypted(&self, bytes: &[u8]) -> Result<(), VaultError> {
        self.session.close();
        let mut store = Store::open(&self.path)?;
        export::import(&mut store, bytes)?;
        info!("encrypted vault imported");
        Ok(())
    }

    /// Lock, then delete the vault database files. Irreversible.
    pub fn wipe(&self) -> Result<(), VaultError> {
        self.session.close();
        for path in [
            self.path.clone(),
            sibling(&self.path, "-wal"),
            sibling(&self.path, "-shm"),
        ] {
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        info!("vault wiped");
        Ok(())
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

fn build_record(
    id: Uuid,
    draft: &RecordDraft,
    existing: Option<&Record>,
    key: &SessionKey,
) -> Result<Record, VaultError> {
    let (secret, strength, secret_lost) = match &draft.secret {
        Some(plaintext) => {
            let (ciphertext, nonce) = aead::seal(key.bytes(), plaintext.as_bytes())?;
            (
                Some(EncryptedSecret::from_parts(&ciphertext, &nonce)),
                models::secret_strength(plaintext),
                false,
            )
        }
        None => match existing {
            Some(e) => (e.secret.clone(), e.strength, e.secret_lost),
            None => (None, 0, false),
        },
    };

    Ok(Record {
        id,
        title: non_empty_or(&draft.title, "Untitled"),
        username: draft.username.clone(),
        website: draft.website.clone(),
        category: non_empty_or(&draft.category, "General"),
        tags: draft.tags.clone(),
        strength,
        pwned_count: draft.pwned_count,
        updated_at: Utc::now(),
        deleted_at: existing.and_then(|e| e.deleted_at),
        secret,
        secret_lost,
        attachments: existing.map(|e| e.attachments.clone()).unwrap_or_default(),
    })
}

fn non_empty_or(value: &str, fallback: &str) -> String {
    if value.is_empty() {
        fallback.to_string()
    } else {
        value.to_string()
    }
}

fn open_secret(
    encrypted: &EncryptedSecret,
    key: &SessionKey,
) -> Result<Zeroizing<String>, VaultError> {
    let (ciphertext, nonce) = encrypted.decode()?;
    let plaintext = aead::open(key.bytes(), &nonce, &ciphertext)?;
    let text = String::from_utf8(plaintext.to_vec()).map_err(|_| VaultError::DecryptionFailed)?;
    Ok(Zeroizing::new(text))
}
