//! Zero-knowledge local vault engine.
//!
//! A single [`VaultEngine`] handle owns one vault database and the one
//! session that may be open on it. All secret payloads are sealed with a
//! key derived from the user's passphrase and device secret; the store
//! itself never sees plaintext. The engine is synchronous and blocking;
//! hosts run it off their interaction thread.
//!
//! ```no_run
//! use aegis_engine::{EngineConfig, ListFilter, RecordDraft, VaultEngine};
//! use zeroize::Zeroizing;
//!
//! # fn main() -> Result<(), aegis_engine::VaultError> {
//! let engine = VaultEngine::new("vault.db", EngineConfig::default());
//! engine.unlock("Tr0ub4dor&3", "device-secret")?;
//! engine.create_record(&RecordDraft {
//!     title: "Github".into(),
//!     secret: Some(Zeroizing::new("token_123".into())),
//!     ..Default::default()
//! })?;
//! let records = engine.list_records(&ListFilter::default())?;
//! engine.lock();
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod migrations;
pub mod models;
pub mod rotation;
pub mod session;
pub mod store;

mod export;

pub use config::EngineConfig;
pub use engine::VaultEngine;
pub use error::VaultError;
pub use lifecycle::{MAX_ATTACHMENT_BYTES, TRASH_RETENTION_DAYS};
pub use models::{
    AttachmentMeta, DecryptedRecord, EncryptedSecret, ImportReport, ListFilter, Record,
    RecordDraft, VaultMetadata,
};
