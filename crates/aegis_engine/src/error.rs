use thiserror::Error;

use aegis_crypto::CryptoError;

#[derive(Debug, Error)]
pub enum VaultError {
    /// Wrong passphrase or an unverifiable credential record. Callers
    /// cannot tell which — that is deliberate.
    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("vault is locked — unlock with passphrase first")]
    VaultLocked,

    /// Per-record tag or format mismatch. Batch reads surface this on
    /// the offending record only and keep going.
    #[error("decryption failed — tag mismatch or corrupted ciphertext")]
    DecryptionFailed,

    #[error("attachment of {size} bytes exceeds the {max} byte limit")]
    AttachmentTooLarge { size: u64, max: u64 },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage failure: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("storage failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("key derivation could not allocate its working memory: {0}")]
    ResourceExhausted(String),

    #[error("vault corrupt: {0}")]
    VaultCorrupt(String),

    #[error("serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),
}

impl From<CryptoError> for VaultError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::AeadDecrypt => VaultError::DecryptionFailed,
            CryptoError::AeadEncrypt => VaultError::VaultCorrupt("AEAD encryption failed".into()),
            CryptoError::ResourceExhausted(msg) => VaultError::ResourceExhausted(msg),
            CryptoError::InvalidParams(msg) => VaultError::VaultCorrupt(msg),
        }
    }
}
