//! Master-passphrase rotation: new salts, new verification credential,
//! decrypt-then-re-encrypt of the whole corpus, one atomic swap.
//!
//! The caller holds the session mutex for the entire run, so no record
//! write, trash operation or lock can interleave; a `lock()` issued
//! mid-rotation blocks until the commit lands and then retires the *new*
//! key. A failure before the commit leaves the vault bit-for-bit in its
//! pre-rotation state.

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;
use zeroize::Zeroizing;

use aegis_crypto::{aead, auth, kdf};

use crate::config::EngineConfig;
use crate::error::VaultError;
use crate::models::EncryptedSecret;
use crate::session::{OpenSession, SessionKey};

pub fn rotate(
    session: &mut OpenSession,
    config: &EngineConfig,
    old_passphrase: &str,
    new_passphrase: &str,
    device_secret: &str,
) -> Result<(), VaultError> {
    // 1. Gate on the old passphrase before any expensive work.
    let metadata = session
        .store
        .metadata()?
        .ok_or_else(|| VaultError::VaultCorrupt("vault has no metadata".into()))?;
    let credential = metadata
        .credential
        .as_ref()
        .ok_or_else(|| VaultError::VaultCorrupt("vault has no credential".into()))?;
    if !auth::verify(old_passphrase.as_bytes(), credential) {
        return Err(VaultError::AuthenticationFailed);
    }

    // 2. Decrypt the full corpus under the current key — every record,
    //    trashed included, and every attachment. A record that fails to
    //    decrypt is carried forward with its ciphertext cleared and
    //    flagged, so pre-existing corruption cannot block rotation.
    let mut records = session.store.all_records()?;
    let mut plaintexts: Vec<Option<Zeroizing<Vec<u8>>>> = Vec::with_capacity(records.len());
    for record in &records {
        let plaintext = match &record.secret {
            Some(secret) => match secret
                .decode()
                .and_then(|(ct, nonce)| Ok(aead::open(session.key.bytes(), &nonce, &ct)?))
            {
                Ok(pt) => Some(pt),
                Err(_) => {
                    warn!(id = %record.id, "record undecryptable during rotation; clearing secret");
                    None
                }
            },
            None => None,
        };
        plaintexts.push(plaintext);
    }

    let attachment_blobs = session.store.all_attachment_blobs()?;
    let mut attachment_plaintexts: Vec<(Uuid, Zeroizing<Vec<u8>>)> = Vec::new();
    let mut dropped_attachments: Vec<Uuid> = Vec::new();
    for (meta, nonce, data) in &attachment_blobs {
        let nonce: Result<[u8; aead::NONCE_LEN], _> = nonce.as_slice().try_into();
        let opened = nonce
            .ok()
            .and_then(|n| aead::open(session.key.bytes(), &n, data).ok());
        match opened {
            Some(pt) => attachment_plaintexts.push((meta.id, pt)),
            None => {
                warn!(id = %meta.id, "attachment undecryptable during rotation; dropping");
                dropped_attachments.push(meta.id);
            }
        }
    }

    // 3. Fresh salt, fresh key, fresh credential.
    let new_salt = kdf::generate_salt();
    let new_key = kdf::derive_key(
        new_passphrase.as_bytes(),
        device_secret.as_bytes(),
        &new_salt,
        &config.kdf,
    )?;
    let new_credential = auth::register(new_passphrase.as_bytes(), config.auth_iterations);

    // 4. Re-encrypt everything under the new key with fresh nonces.
    let now = Utc::now();
    for (record, plaintext) in records.iter_mut().zip(&plaintexts) {
        let had_secret = record.secret.is_some();
        match plaintext {
            Some(pt) => {
                let (ct, nonce) = aead::seal(&new_key, pt)?;
                record.secret = Some(EncryptedSecret::from_parts(&ct, &nonce));
            }
            None => {
                record.secret = None;
                record.secret_lost = had_secret || record.secret_lost;
            }
        }
        record.updated_at = now;
    }

    let mut new_attachment_blobs = Vec::with_capacity(attachment_plaintexts.len());
    for (id, pt) in &attachment_plaintexts {
        let (ct, nonce) = aead::seal(&new_key, pt)?;
        new_attachment_blobs.push((*id, nonce.to_vec(), ct));
    }

    // 5. Atomic swap: metadata, records and attachments land in one
    //    transaction; only then does the session key change hands.
    let new_metadata = crate::models::VaultMetadata {
        main_salt: new_salt.to_vec(),
        schema_version: metadata.schema_version,
        created_at: metadata.created_at,
        credential: Some(new_credential),
    };
    session.store.commit_rotation(
        &new_metadata,
        &records,
        &new_attachment_blobs,
        &dropped_attachments,
    )?;

    session.key.retire();
    session.key = SessionKey::new(new_key);
    info!(
        records = records.len(),
        attachments = new_attachment_blobs.len(),
        "passphrase rotated"
    );
    Ok(())
}
