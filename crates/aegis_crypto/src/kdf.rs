//! Memory-hard key derivation.
//!
//! `derive_key` — Argon2id, turns (passphrase, device secret, salt) into
//! the 32-byte symmetric key that encrypts every record and attachment.
//!
//! The passphrase and device secret are joined with a `:` separator
//! before hashing, so the passphrase alone is never sufficient to derive
//! the vault key. Deterministic for identical inputs; there is no "wrong
//! input" failure at this layer — wrongness is detected by the
//! verification credential in [`crate::auth`], never here.

use rand::RngCore;
use zeroize::Zeroizing;

use crate::error::CryptoError;

/// Argon2id cost parameters.
///
/// Defaults are tuned for interactive desktop use: 64 MiB working
/// memory, 3 passes, single lane. Tests swap in [`KdfParams::cheap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    /// Working memory in KiB (`m_cost`).
    pub memory_cost_kib: u32,
    /// Number of passes over memory (`t_cost`).
    pub time_cost: u32,
    /// Lanes (`p_cost`).
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_cost_kib: 64 * 1024,
            time_cost: 3,
            parallelism: 1,
        }
    }
}

impl KdfParams {
    /// Low-cost profile for tests. Never use for a real vault.
    pub fn cheap() -> Self {
        Self {
            memory_cost_kib: 8 * 1024,
            time_cost: 1,
            parallelism: 1,
        }
    }
}

/// Separator between passphrase and device secret in the KDF input.
const SECRET_SEPARATOR: &[u8] = b":";

/// Derive the 32-byte vault key. The salt is stored alongside the
/// encrypted vault (not secret) and may be any length ≥ 8 bytes — legacy
/// vaults carry a fixed 21-byte string salt rather than the 16 random
/// bytes new vaults get from [`generate_salt`].
pub fn derive_key(
    passphrase: &[u8],
    device_secret: &[u8],
    salt: &[u8],
    params: &KdfParams,
) -> Result<Zeroizing<[u8; 32]>, CryptoError> {
    let argon_params = argon2::Params::new(
        params.memory_cost_kib,
        params.time_cost,
        params.parallelism,
        Some(32),
    )
    .map_err(|e| CryptoError::InvalidParams(e.to_string()))?;

    let argon2 = argon2::Argon2::new(
        argon2::Algorithm::Argon2id,
        argon2::Version::V0x13,
        argon_params,
    );

    let mut material = Zeroizing::new(
        Vec::with_capacity(passphrase.len() + SECRET_SEPARATOR.len() + device_secret.len()),
    );
    material.extend_from_slice(passphrase);
    material.extend_from_slice(SECRET_SEPARATOR);
    material.extend_from_slice(device_secret);

    let mut output = Zeroizing::new([0u8; 32]);
    argon2
        .hash_password_into(&material, salt, output.as_mut())
        .map_err(|e| CryptoError::ResourceExhausted(e.to_string()))?;

    Ok(output)
}

/// Generate a fresh random 16-byte salt (store alongside the vault).
pub fn generate_salt() -> [u8; 16] {
    let mut salt = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    salt
}
