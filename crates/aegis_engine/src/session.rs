//! The live session: key material plus the open store connection.
//!
//! Exactly one session may be open per vault handle. The key lives in a
//! fixed 32-byte buffer that is overwritten with random bytes on
//! retirement and zeroized on drop; locking also closes the store
//! connection. Every operation funnels through [`SessionKeyManager::with_session`],
//! which is the single `VaultLocked` precondition check.

use parking_lot::Mutex;
use rand::RngCore;
use zeroize::{Zeroizing, ZeroizeOnDrop};

use crate::error::VaultError;
use crate::store::Store;

/// The derived vault key. Not `Clone`, never serialized.
#[derive(ZeroizeOnDrop)]
pub struct SessionKey {
    key: [u8; 32],
}

impl SessionKey {
    pub fn new(material: Zeroizing<[u8; 32]>) -> Self {
        Self { key: *material }
    }

    pub fn bytes(&self) -> &[u8; 32] {
        &self.key
    }

    /// Overwrite the key bytes with random data. The zeroize-on-drop
    /// pass still runs afterwards; the overwrite guarantees the real key
    /// is gone even while the buffer is technically alive.
    pub fn retire(&mut self) {
        rand::rngs::OsRng.fill_bytes(&mut self.key);
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKey").field("key", &"[REDACTED]").finish()
    }
}

pub struct OpenSession {
    pub key: SessionKey,
    pub store: Store,
}

/// Owner of the single session slot. Holding the inner mutex for the
/// whole of an operation gives rotation its stable snapshot: a `lock()`
/// arriving mid-rotation waits for the commit point instead of zeroizing
/// a key still in use.
pub struct SessionKeyManager {
    slot: Mutex<Option<OpenSession>>,
}

impl SessionKeyManager {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    /// Install a freshly unlocked session, retiring any previous one.
    pub fn install(&self, session: OpenSession) {
        let mut guard = self.slot.lock();
        if let Some(mut old) = guard.take() {
            old.key.retire();
        }
        *guard = Some(session);
    }

    /// Idempotent: locking an already locked vault does nothing.
    pub fn close(&self) {
        let mut guard = self.slot.lock();
        if let Some(mut session) = guard.take() {
            session.key.retire();
            // Dropping the session closes the store connection.
        }
    }

    pub fn is_locked(&self) -> bool {
        self.slot.lock().is_none()
    }

    pub fn with_session<R>(
        &self,
        f: impl FnOnce(&mut OpenSession) -> Result<R, VaultError>,
    ) -> Result<R, VaultError> {
        let mut guard = self.slot.lock();
        match guard.as_mut() {
            Some(session) => f(session),
            None => Err(VaultError::VaultLocked),
        }
    }
}

impl Default for SessionKeyManager {
    fn default() -> Self {
        Self::new()
    }
}
