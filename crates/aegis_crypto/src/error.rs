use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("AEAD encryption failed")]
    AeadEncrypt,

    #[error("AEAD decryption failed (authentication tag mismatch — possible tampering)")]
    AeadDecrypt,

    #[error("key derivation could not allocate its working memory: {0}")]
    ResourceExhausted(String),

    #[error("invalid key derivation parameters: {0}")]
    InvalidParams(String),
}
