//! Passphrase verification credential.
//!
//! A salted PBKDF2-HMAC-SHA256 hash, independent of the encryption key,
//! lets the engine reject a wrong passphrase before spending Argon2 work
//! or attempting any decryption. Iterated-hash only — the memory-hard
//! function is reserved for the key itself.

use std::num::NonZeroU32;

use rand::RngCore;
use ring::pbkdf2;

/// Default PBKDF2 iteration count for new credentials.
pub const DEFAULT_ITERATIONS: u32 = 100_000;

const HASH_LEN: usize = 32;
const SALT_LEN: usize = 16;

/// Stored verification record. Holds no key material: the hash cannot be
/// turned back into the passphrase or the vault key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCredential {
    pub verification_hash: Vec<u8>,
    pub iterations: u32,
    pub auth_salt: Vec<u8>,
}

/// Create a fresh credential for `passphrase` with a new random salt.
pub fn register(passphrase: &[u8], iterations: u32) -> StoredCredential {
    let iterations = iterations.max(1);
    let mut auth_salt = vec![0u8; SALT_LEN];
    rand::rngs::OsRng.fill_bytes(&mut auth_salt);

    let mut verification_hash = vec![0u8; HASH_LEN];
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA256,
        NonZeroU32::new(iterations).unwrap_or(NonZeroU32::MIN),
        &auth_salt,
        passphrase,
        &mut verification_hash,
    );

    StoredCredential {
        verification_hash,
        iterations,
        auth_salt,
    }
}

/// Recompute and compare in constant time. Returns `false` for a wrong
/// passphrase and for an unverifiable (corrupted) credential alike —
/// callers must not be able to tell the two apart.
pub fn verify(passphrase: &[u8], credential: &StoredCredential) -> bool {
    let Some(iterations) = NonZeroU32::new(credential.iterations) else {
        return false;
    };
    if credential.verification_hash.len() != HASH_LEN {
        return false;
    }
    pbkdf2::verify(
        pbkdf2::PBKDF2_HMAC_SHA256,
        iterations,
        &credential.auth_salt,
        passphrase,
        &credential.verification_hash,
    )
    .is_ok()
}
