//! Ciphertext text encoding at the storage boundary.
//!
//! Record ciphertext and nonces are persisted as text. The canonical
//! encoding is hex; vaults written by older releases hold base64. Old
//! rows carry no version flag, so the encoding is detected structurally:
//! a well-formed hex string (even length, hex digits only) is decoded as
//! hex, anything else falls back to base64. Transitional — a base64
//! string made only of hex digits would be misread, which is why the
//! caller treats a failed AEAD open after a "hex-looking" decode as
//! `DecryptionFailed` rather than proof of corruption.
//!
//! TODO: retire the base64 fallback in the schema migration that
//! re-encodes every surviving row to hex.

use base64::{engine::general_purpose, Engine as _};

use crate::error::VaultError;
use aegis_crypto::aead::NONCE_LEN;

/// Canonical encoding for newly written ciphertext fields.
pub fn encode(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

/// Decode a stored (ciphertext, nonce) pair. The two fields were always
/// written together, so the encoding decision is made jointly, exactly
/// as the legacy reader did.
pub fn decode_pair(ciphertext: &str, nonce: &str) -> Result<(Vec<u8>, [u8; NONCE_LEN]), VaultError> {
    let decoded = if looks_like_hex(ciphertext) && looks_like_hex(nonce) {
        match (hex::decode(ciphertext), hex::decode(nonce)) {
            (Ok(ct), Ok(n)) => Some((ct, n)),
            _ => None,
        }
    } else {
        None
    };

    let (ct, n) = match decoded {
        Some(pair) => pair,
        None => {
            let ct = general_purpose::STANDARD
                .decode(ciphertext)
                .map_err(|_| VaultError::DecryptionFailed)?;
            let n = general_purpose::STANDARD
                .decode(nonce)
                .map_err(|_| VaultError::DecryptionFailed)?;
            (ct, n)
        }
    };

    let nonce_bytes: [u8; NONCE_LEN] = n.try_into().map_err(|_| VaultError::DecryptionFailed)?;
    Ok((ct, nonce_bytes))
}

fn looks_like_hex(s: &str) -> bool {
    !s.is_empty() && s.len() % 2 == 0 && s.bytes().all(|b| b.is_ascii_hexdigit())
}
