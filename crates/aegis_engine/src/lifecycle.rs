//! Soft-delete lifecycle: trash, restore, permanent purge, and
//! retention-based auto-purge. Trashing is a visibility flag only — the
//! record stays fully encrypted and searchable; nothing here touches the
//! cipher.

use chrono::{DateTime, Duration, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::error::VaultError;
use crate::store::Store;

/// Attachment cap, enforced before any encryption work is attempted.
pub const MAX_ATTACHMENT_BYTES: u64 = 50 * 1024 * 1024;

/// Trashed records older than this are removed by [`auto_purge`].
pub const TRASH_RETENTION_DAYS: i64 = 30;

pub fn move_to_trash(store: &Store, id: Uuid, now: DateTime<Utc>) -> Result<(), VaultError> {
    if !store.set_deleted_at(id, Some(now))? {
        return Err(VaultError::NotFound(id.to_string()));
    }
    debug!(%id, "record moved to trash");
    Ok(())
}

pub fn restore(store: &Store, id: Uuid) -> Result<(), VaultError> {
    if !store.set_deleted_at(id, None)? {
        return Err(VaultError::NotFound(id.to_string()));
    }
    debug!(%id, "record restored from trash");
    Ok(())
}

/// Permanently delete a record and, by cascade, all its attachments.
/// Irreversible.
pub fn purge(store: &Store, id: Uuid) -> Result<(), VaultError> {
    if !store.delete_record(id)? {
        return Err(VaultError::NotFound(id.to_string()));
    }
    debug!(%id, "record purged");
    Ok(())
}

/// Purge every currently trashed record. Returns how many went.
pub fn empty_trash(store: &Store) -> Result<usize, VaultError> {
    let trashed = store.trashed_records()?;
    for (id, _) in &trashed {
        store.delete_record(*id)?;
    }
    debug!(count = trashed.len(), "trash emptied");
    Ok(trashed.len())
}

/// Purge trashed records whose `deleted_at` lies beyond the retention
/// window. Run once per vault open.
pub fn auto_purge(store: &Store, now: DateTime<Utc>) -> Result<usize, VaultError> {
    let cutoff = now - Duration::days(TRASH_RETENTION_DAYS);
    let mut purged = 0;
    for (id, deleted_at) in store.trashed_records()? {
        if deleted_at < cutoff {
            store.delete_record(id)?;
            purged += 1;
        }
    }
    if purged > 0 {
        debug!(count = purged, "expired trash auto-purged");
    }
    Ok(purged)
}

pub fn ensure_attachment_size(size: u64) -> Result<(), VaultError> {
    if size > MAX_ATTACHMENT_BYTES {
        return Err(VaultError::AttachmentTooLarge {
            size,
            max: MAX_ATTACHMENT_BYTES,
        });
    }
    Ok(())
}
