//! End-to-end engine tests against a real on-disk vault database.

use std::path::PathBuf;

use base64::Engine as _;
use chrono::{Duration, Utc};
use tempfile::TempDir;
use uuid::Uuid;
use zeroize::Zeroizing;

use aegis_crypto::{aead, kdf};
use aegis_engine::models::EncryptedSecret;
use aegis_engine::store::Store;
use aegis_engine::{EngineConfig, ListFilter, Record, RecordDraft, VaultEngine, VaultError};

const PASSPHRASE: &str = "Tr0ub4dor&3";
const DEVICE_SECRET: &str = "dev-abc";

fn vault_path(dir: &TempDir) -> PathBuf {
    dir.path().join("vault.db")
}

fn open_engine(dir: &TempDir) -> VaultEngine {
    VaultEngine::new(vault_path(dir), EngineConfig::cheap())
}

fn draft(title: &str, secret: &str) -> RecordDraft {
    RecordDraft {
        title: title.into(),
        secret: Some(Zeroizing::new(secret.into())),
        ..Default::default()
    }
}

#[test]
fn unlock_store_lock_unlock_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let engine = open_engine(&dir);

    assert!(engine.is_locked());
    engine.unlock(PASSPHRASE, DEVICE_SECRET).unwrap();
    assert!(!engine.is_locked());

    let id = engine.create_record(&draft("Github", "token_123")).unwrap();
    engine.lock();
    assert!(engine.is_locked());
    assert!(matches!(
        engine.list_records(&ListFilter::default()),
        Err(VaultError::VaultLocked)
    ));

    engine.unlock(PASSPHRASE, DEVICE_SECRET).unwrap();
    let records = engine.list_records(&ListFilter::default()).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].record.id, id);
    assert_eq!(records[0].record.title, "Github");
    assert_eq!(records[0].secret.as_deref().map(String::as_str), Some("token_123"));
    assert!(!records[0].decrypt_failed);
}

#[test]
fn wrong_passphrase_is_rejected_and_vault_stays_locked() {
    let dir = tempfile::tempdir().unwrap();
    let engine = open_engine(&dir);
    engine.unlock(PASSPHRASE, DEVICE_SECRET).unwrap();
    engine.lock();

    assert!(matches!(
        engine.unlock("not-the-passphrase", DEVICE_SECRET),
        Err(VaultError::AuthenticationFailed)
    ));
    assert!(engine.is_locked());
}

#[test]
fn update_without_secret_keeps_stored_ciphertext() {
    let dir = tempfile::tempdir().unwrap();
    let engine = open_engine(&dir);
    engine.unlock(PASSPHRASE, DEVICE_SECRET).unwrap();

    let id = engine.create_record(&draft("Github", "token_123")).unwrap();
    engine
        .update_record(
            id,
            &RecordDraft {
                title: "Github (work)".into(),
                ..Default::default()
            },
        )
        .unwrap();

    let records = engine.list_records(&ListFilter::default()).unwrap();
    assert_eq!(records[0].record.title, "Github (work)");
    assert_eq!(records[0].secret.as_deref().map(String::as_str), Some("token_123"));
}

#[test]
fn rotation_preserves_plaintexts_and_invalidates_old_passphrase() {
    let dir = tempfile::tempdir().unwrap();
    let engine = open_engine(&dir);
    engine.unlock(PASSPHRASE, DEVICE_SECRET).unwrap();

    let active = engine.create_record(&draft("Github", "token_123")).unwrap();
    let trashed = engine.create_record(&draft("OldMail", "hunter22")).unwrap();
    engine.move_to_trash(trashed).unwrap();

    let att = engine
        .add_attachment(active, b"recovery codes", "codes.txt", "text/plain")
        .unwrap();

    let before = Store::open(&vault_path(&dir)).unwrap().metadata().unwrap().unwrap();

    assert!(matches!(
        engine.rotate_passphrase("wrong", "NewPass!234", DEVICE_SECRET),
        Err(VaultError::AuthenticationFailed)
    ));
    engine
        .rotate_passphrase(PASSPHRASE, "NewPass!234", DEVICE_SECRET)
        .unwrap();

    // Session stays usable under the new key without re-unlocking.
    assert_eq!(&*engine.read_attachment(att).unwrap(), b"recovery codes");

    engine.lock();
    assert!(matches!(
        engine.unlock(PASSPHRASE, DEVICE_SECRET),
        Err(VaultError::AuthenticationFailed)
    ));
    engine.unlock("NewPass!234", DEVICE_SECRET).unwrap();

    let records = engine.list_records(&ListFilter::default()).unwrap();
    assert_eq!(records[0].secret.as_deref().map(String::as_str), Some("token_123"));

    // Trashed records were re-encrypted too.
    let trash = engine
        .list_records(&ListFilter {
            trashed: true,
            ..Default::default()
        })
        .unwrap();
    assert_eq!(trash[0].secret.as_deref().map(String::as_str), Some("hunter22"));

    engine.lock();
    let after = Store::open(&vault_path(&dir)).unwrap().metadata().unwrap().unwrap();
    assert_ne!(before.main_salt, after.main_salt);
    assert_ne!(
        before.credential.unwrap().verification_hash,
        after.credential.unwrap().verification_hash
    );
    assert_eq!(before.created_at, after.created_at);
}

#[test]
fn trash_restore_and_purge_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let engine = open_engine(&dir);
    engine.unlock(PASSPHRASE, DEVICE_SECRET).unwrap();

    let id = engine.create_record(&draft("Github", "token_123")).unwrap();
    let att = engine
        .add_attachment(id, b"blob", "scan.pdf", "application/pdf")
        .unwrap();

    engine.move_to_trash(id).unwrap();
    assert!(engine.list_records(&ListFilter::default()).unwrap().is_empty());
    let trash_filter = ListFilter {
        trashed: true,
        ..Default::default()
    };
    assert_eq!(engine.list_records(&trash_filter).unwrap().len(), 1);

    engine.restore(id).unwrap();
    assert_eq!(engine.list_records(&ListFilter::default()).unwrap().len(), 1);

    engine.move_to_trash(id).unwrap();
    engine.purge(id).unwrap();
    assert!(engine.list_records(&trash_filter).unwrap().is_empty());
    assert!(matches!(
        engine.read_attachment(att),
        Err(VaultError::NotFound(_))
    ));
}

#[test]
fn auto_purge_removes_expired_trash_only() {
    let dir = tempfile::tempdir().unwrap();
    let engine = open_engine(&dir);
    engine.unlock(PASSPHRASE, DEVICE_SECRET).unwrap();

    let id = engine.create_record(&draft("Github", "token_123")).unwrap();
    engine.move_to_trash(id).unwrap();

    assert_eq!(engine.auto_purge(Utc::now()).unwrap(), 0);
    assert_eq!(engine.auto_purge(Utc::now() + Duration::days(31)).unwrap(), 1);
    let trash = engine
        .list_records(&ListFilter {
            trashed: true,
            ..Default::default()
        })
        .unwrap();
    assert!(trash.is_empty());
}

#[test]
fn oversized_attachment_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let engine = open_engine(&dir);
    engine.unlock(PASSPHRASE, DEVICE_SECRET).unwrap();

    let id = engine.create_record(&draft("Github", "token_123")).unwrap();
    let oversized = vec![0u8; 60 * 1024 * 1024];
    assert!(matches!(
        engine.add_attachment(id, &oversized, "huge.bin", "application/octet-stream"),
        Err(VaultError::AttachmentTooLarge { .. })
    ));
    assert!(engine
        .list_records(&ListFilter::default())
        .unwrap()[0]
        .record
        .attachments
        .is_empty());
}

#[test]
fn attachment_roundtrip_and_removal() {
    let dir = tempfile::tempdir().unwrap();
    let engine = open_engine(&dir);
    engine.unlock(PASSPHRASE, DEVICE_SECRET).unwrap();

    let id = engine.create_record(&draft("Github", "token_123")).unwrap();
    let att = engine
        .add_attachment(id, b"hello attachment", "note.txt", "text/plain")
        .unwrap();
    assert_eq!(&*engine.read_attachment(att).unwrap(), b"hello attachment");

    let listed = &engine.list_records(&ListFilter::default()).unwrap()[0];
    assert_eq!(listed.record.attachments.len(), 1);
    assert_eq!(listed.record.attachments[0].name, "note.txt");
    assert_eq!(listed.record.attachments[0].size, 16);

    engine.remove_attachment(att).unwrap();
    assert!(matches!(
        engine.read_attachment(att),
        Err(VaultError::NotFound(_))
    ));
}

fn seal_record(key: &[u8; 32], title: &str, secret: &str) -> Record {
    let (ciphertext, nonce) = aead::seal(key, secret.as_bytes()).unwrap();
    Record {
        id: Uuid::new_v4(),
        title: title.into(),
        username: String::new(),
        website: String::new(),
        category: "General".into(),
        tags: Default::default(),
        strength: 0,
        pwned_count: 0,
        updated_at: Utc::now(),
        deleted_at: None,
        secret: Some(EncryptedSecret::from_parts(&ciphertext, &nonce)),
        secret_lost: false,
        attachments: vec![],
    }
}

#[test]
fn legacy_vault_without_metadata_migrates_on_unlock() {
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig::cheap();

    // A pre-versioning vault: records keyed off the fixed legacy salt,
    // no metadata row at all.
    let legacy_key = kdf::derive_key(
        PASSPHRASE.as_bytes(),
        DEVICE_SECRET.as_bytes(),
        b"aegis-premium-salt-v4",
        &config.kdf,
    )
    .unwrap();
    {
        let store = Store::open(&vault_path(&dir)).unwrap();
        store
            .upsert_record(&seal_record(&legacy_key, "Github", "token_123"))
            .unwrap();
        assert!(store.metadata().unwrap().is_none());
    }

    let engine = open_engine(&dir);
    engine.unlock(PASSPHRASE, DEVICE_SECRET).unwrap();
    let records = engine.list_records(&ListFilter::default()).unwrap();
    assert_eq!(records[0].secret.as_deref().map(String::as_str), Some("token_123"));
    engine.lock();

    let migrated = Store::open(&vault_path(&dir)).unwrap().metadata().unwrap().unwrap();
    assert_eq!(migrated.main_salt, b"aegis-premium-salt-v4".to_vec());
    assert!(migrated.credential.is_some());
}

#[test]
fn base64_encoded_legacy_secret_still_decrypts() {
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig::cheap();
    let engine = open_engine(&dir);
    engine.unlock(PASSPHRASE, DEVICE_SECRET).unwrap();
    engine.lock();

    let meta = Store::open(&vault_path(&dir)).unwrap().metadata().unwrap().unwrap();
    let key = kdf::derive_key(
        PASSPHRASE.as_bytes(),
        DEVICE_SECRET.as_bytes(),
        &meta.main_salt,
        &config.kdf,
    )
    .unwrap();

    let (ciphertext, nonce) = aead::seal(&key, b"token_123").unwrap();
    let mut record = seal_record(&key, "Github", "placeholder");
    record.secret = Some(EncryptedSecret {
        ciphertext: base64::engine::general_purpose::STANDARD.encode(&ciphertext),
        nonce: base64::engine::general_purpose::STANDARD.encode(nonce),
    });
    Store::open(&vault_path(&dir)).unwrap().upsert_record(&record).unwrap();

    engine.unlock(PASSPHRASE, DEVICE_SECRET).unwrap();
    let records = engine.list_records(&ListFilter::default()).unwrap();
    assert_eq!(records[0].secret.as_deref().map(String::as_str), Some("token_123"));
}

#[test]
fn undecryptable_record_is_flagged_without_aborting_the_listing() {
    let dir = tempfile::tempdir().unwrap();
    let engine = open_engine(&dir);
    engine.unlock(PASSPHRASE, DEVICE_SECRET).unwrap();

    let good = engine.create_record(&draft("Github", "token_123")).unwrap();
    let bad = engine.create_record(&draft("Broken", "secret")).unwrap();
    engine.lock();

    // Corrupt the second record's ciphertext on disk.
    {
        let store = Store::open(&vault_path(&dir)).unwrap();
        let mut record = store.record(bad).unwrap().unwrap();
        record.secret = Some(EncryptedSecret {
            ciphertext: "deadbeefdeadbeefdeadbeefdeadbeefdead".into(),
            nonce: record.secret.unwrap().nonce,
        });
        store.upsert_record(&record).unwrap();
    }

    engine.unlock(PASSPHRASE, DEVICE_SECRET).unwrap();
    let records = engine.list_records(&ListFilter::default()).unwrap();
    assert_eq!(records.len(), 2);
    for listed in &records {
        if listed.record.id == good {
            assert!(!listed.decrypt_failed);
            assert!(listed.secret.is_some());
        } else {
            assert!(listed.decrypt_failed);
            assert!(listed.secret.is_none());
        }
    }
}

#[test]
fn export_then_import_reproduces_the_vault() {
    let source_dir = tempfile::tempdir().unwrap();
    let engine = open_engine(&source_dir);
    engine.unlock(PASSPHRASE, DEVICE_SECRET).unwrap();
    let id = engine.create_record(&draft("Github", "token_123")).unwrap();
    engine
        .add_attachment(id, b"recovery codes", "codes.txt", "text/plain")
        .unwrap();
    let dump = engine.export_encrypted().unwrap();

    let target_dir = tempfile::tempdir().unwrap();
    let target = open_engine(&target_dir);
    target.import_encrypted(&dump).unwrap();
    assert!(target.is_locked());

    target.unlock(PASSPHRASE, DEVICE_SECRET).unwrap();
    let records = target.list_records(&ListFilter::default()).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].secret.as_deref().map(String::as_str), Some("token_123"));
    assert_eq!(records[0].record.attachments.len(), 1);
    let att = records[0].record.attachments[0].id;
    assert_eq!(&*target.read_attachment(att).unwrap(), b"recovery codes");
}

#[test]
fn import_rejects_garbage_and_unknown_formats() {
    let dir = tempfile::tempdir().unwrap();
    let engine = open_engine(&dir);
    assert!(matches!(
        engine.import_encrypted(b"not json"),
        Err(VaultError::Serialisation(_))
    ));
    assert!(matches!(
        engine.import_encrypted(br#"{"format":99,"metadata":{"main_salt":"00","schema_version":3,"created_at":"2026-01-01T00:00:00Z","credential":null},"records":[],"attachments":[]}"#),
        Err(VaultError::VaultCorrupt(_))
    ));
}

#[test]
fn bulk_add_reports_weak_and_incomplete_entries() {
    let dir = tempfile::tempdir().unwrap();
    let engine = open_engine(&dir);
    engine.unlock(PASSPHRASE, DEVICE_SECRET).unwrap();

    let drafts = vec![
        draft("Github", "a-long-enough-secret"),
        draft("Weak", "short"),
        RecordDraft {
            title: "NoSecret".into(),
            ..Default::default()
        },
        draft("", "another-long-secret"),
    ];
    let report = engine.bulk_add_records(&drafts).unwrap();
    assert_eq!(report.total, 4);
    assert_eq!(report.weak, 1);
    assert_eq!(report.weak_ids.len(), 1);
    // One draft lacks a secret, one lacks a title.
    assert_eq!(report.missing_fields, 2);

    // The secret-less draft was not stored; the title-less one got the
    // import fallback title.
    let records = engine.list_records(&ListFilter::default()).unwrap();
    assert_eq!(records.len(), 3);
    assert!(records
        .iter()
        .any(|listed| listed.record.title == "Imported Entry"));
}

#[test]
fn breach_annotation_is_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let engine = open_engine(&dir);
    engine.unlock(PASSPHRASE, DEVICE_SECRET).unwrap();

    let id = engine.create_record(&draft("Github", "token_123")).unwrap();
    engine.annotate_breach_count(id, 7).unwrap();
    let records = engine.list_records(&ListFilter::default()).unwrap();
    assert_eq!(records[0].record.pwned_count, 7);
}

#[test]
fn wipe_destroys_the_vault_completely() {
    let dir = tempfile::tempdir().unwrap();
    let engine = open_engine(&dir);
    engine.unlock(PASSPHRASE, DEVICE_SECRET).unwrap();
    engine.create_record(&draft("Github", "token_123")).unwrap();

    engine.wipe().unwrap();
    assert!(engine.is_locked());
    assert!(!vault_path(&dir).exists());

    // A fresh vault accepts any new passphrase.
    engine.unlock("completely-new-pass", DEVICE_SECRET).unwrap();
    assert!(engine.list_records(&ListFilter::default()).unwrap().is_empty());
}

#[test]
fn filters_narrow_by_query_category_and_tag() {
    let dir = tempfile::tempdir().unwrap();
    let engine = open_engine(&dir);
    engine.unlock(PASSPHRASE, DEVICE_SECRET).unwrap();

    engine
        .create_record(&RecordDraft {
            title: "Github".into(),
            category: "Work".into(),
            tags: ["dev".to_string()].into_iter().collect(),
            secret: Some(Zeroizing::new("token_123".into())),
            ..Default::default()
        })
        .unwrap();
    engine.create_record(&draft("Netflix", "binge")).unwrap();

    let by_query = engine
        .list_records(&ListFilter {
            query: Some("git hub".into()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(by_query.len(), 1);
    assert_eq!(by_query[0].record.title, "Github");

    let by_category = engine
        .list_records(&ListFilter {
            category: Some("Work".into()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(by_category.len(), 1);

    let by_tag = engine
        .list_records(&ListFilter {
            tag: Some("dev".into()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(by_tag.len(), 1);
}
