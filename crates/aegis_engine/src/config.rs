//! Engine configuration.

use aegis_crypto::auth;
use aegis_crypto::kdf::KdfParams;

/// Cost parameters for the two passphrase-processing functions. One
/// value per vault handle; persisted iteration counts in stored
/// credentials always win over this at verification time.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Argon2id cost for the vault key.
    pub kdf: KdfParams,
    /// PBKDF2 iterations for newly registered verification credentials.
    pub auth_iterations: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            kdf: KdfParams::default(),
            auth_iterations: auth::DEFAULT_ITERATIONS,
        }
    }
}

impl EngineConfig {
    /// Low-cost profile for tests. Never use for a real vault.
    pub fn cheap() -> Self {
        Self {
            kdf: KdfParams::cheap(),
            auth_iterations: 1_000,
        }
    }
}
