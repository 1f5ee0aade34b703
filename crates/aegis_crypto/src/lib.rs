//! aegis_crypto — cryptographic primitives for the Aegis vault engine
//!
//! Three concerns live here, all pure and stateless:
//! - `kdf`  — Argon2id derivation of the 32-byte vault key from
//!   (passphrase, device secret, salt).
//! - `auth` — PBKDF2-HMAC-SHA256 passphrase verification credential,
//!   independent of the encryption key, so a wrong passphrase is rejected
//!   before any Argon2 work or decryption is attempted.
//! - `aead` — AES-256-GCM seal/open for record secrets and attachment
//!   blobs.
//!
//! Storage, sessions and lifecycle are the engine's business
//! (`aegis_engine`); nothing in this crate touches disk.

pub mod aead;
pub mod auth;
pub mod error;
pub mod kdf;

pub use error::CryptoError;
