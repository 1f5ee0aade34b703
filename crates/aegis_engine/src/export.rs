//! Encrypted vault dump and restore.
//!
//! The export is a JSON document of everything the store persists —
//! metadata (salts and verification hash included; none of it is
//! secret), records with their ciphertext, and attachment blobs. No key
//! material and no plaintext ever enters the dump, so it is safe to hand
//! to a transport such as the QR sync collaborator. Import is a
//! wholesale transactional replacement of the vault contents.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use aegis_crypto::auth::StoredCredential;

use crate::error::VaultError;
use crate::models::{AttachmentMeta, Record, VaultMetadata};
use crate::store::Store;

const EXPORT_FORMAT: u32 = 1;

#[derive(Serialize, Deserialize)]
struct VaultExport {
    format: u32,
    metadata: MetadataDump,
    records: Vec<Record>,
    attachments: Vec<AttachmentDump>,
}

#[derive(Serialize, Deserialize)]
struct MetadataDump {
    main_salt: String,
    schema_version: u32,
    created_at: chrono::DateTime<chrono::Utc>,
    credential: Option<CredentialDump>,
}

#[derive(Serialize, Deserialize)]
struct CredentialDump {
    verification_hash: String,
    iterations: u32,
    auth_salt: String,
}

#[derive(Serialize, Deserialize)]
struct AttachmentDump {
    id: Uuid,
    record_id: Uuid,
    name: String,
    mime_type: String,
    size: u64,
    nonce: String,
    data: String,
}

pub fn export(store: &Store) -> Result<Vec<u8>, VaultError> {
    let metadata = store
        .metadata()?
        .ok_or_else(|| VaultError::VaultCorrupt("vault has no metadata".into()))?;

    let mut records = store.all_records()?;
    for record in &mut records {
        // Attachment metadata is synthesized from the attachments table;
        // the dump carries it there instead.
        record.attachments.clear();
    }

    let attachments = store
        .all_attachment_blobs()?
        .into_iter()
        .map(|(meta, nonce, data)| AttachmentDump {
            id: meta.id,
            record_id: meta.record_id,
            name: meta.name,
            mime_type: meta.mime_type,
            size: meta.size,
            nonce: hex::encode(nonce),
            data: hex::encode(data),
        })
        .collect();

    let dump = VaultExport {
        format: EXPORT_FORMAT,
        metadata: MetadataDump {
            main_salt: hex::encode(&metadata.main_salt),
            schema_version: metadata.schema_version,
            created_at: metadata.created_at,
            credential: metadata.credential.as_ref().map(|cred| CredentialDump {
                verification_hash: hex::encode(&cred.verification_hash),
                iterations: cred.iterations,
                auth_salt: hex::encode(&cred.auth_salt),
            }),
        },
        records,
        attachments,
    };
    Ok(serde_json::to_vec(&dump)?)
}

pub fn import(store: &mut Store, bytes: &[u8]) -> Result<(), VaultError> {
    let dump: VaultExport = serde_json::from_slice(bytes)?;
    if dump.format != EXPORT_FORMAT {
        return Err(VaultError::VaultCorrupt(format!(
            "unsupported export format {}",
            dump.format
        )));
    }

    let metadata = VaultMetadata {
        main_salt: decode_hex(&dump.metadata.main_salt)?,
        schema_version: dump.metadata.schema_version,
        created_at: dump.metadata.created_at,
        credential: dump
            .metadata
            .credential
            .as_ref()
            .map(|cred| {
                Ok::<_, VaultError>(StoredCredential {
                    verification_hash: decode_hex(&cred.verification_hash)?,
                    iterations: cred.iterations,
                    auth_salt: decode_hex(&cred.auth_salt)?,
                })
            })
            .transpose()?,
    };

    let mut attachments = Vec::with_capacity(dump.attachments.len());
    for att in &dump.attachments {
        let meta = AttachmentMeta {
            id: att.id,
            record_id: att.record_id,
            name: att.name.clone(),
            mime_type: att.mime_type.clone(),
            size: att.size,
        };
        attachments.push((meta, decode_hex(&att.nonce)?, decode_hex(&att.data)?));
    }

    store.replace_all(&metadata, &dump.records, &attachments)
}

fn decode_hex(text: &str) -> Result<Vec<u8>, VaultError> {
    hex::decode(text).map_err(|_| VaultError::VaultCorrupt("malformed hex in export".into()))
}
