//! At-rest encryption for Skiff cluster credentials.
//!
//! Cluster kubeconfigs are persisted as colon-joined hex payloads:
//!
//! - `iv:tag:ciphertext` — AES-256-GCM (current format)
//! - `iv:ciphertext` — AES-256-CBC (legacy records, decode only)
//!
//! The key is derived once from a configured master secret with scrypt,
//! so no key material is stored alongside the data. Callers construct an
//! [`EncryptionService`] explicitly with an [`EncryptionConfig`]; there
//! is no process-wide instance.

pub mod error;
pub mod payload;
pub mod service;

pub use error::CryptoError;
pub use payload::EncryptedPayload;
pub use service::{EncryptionConfig, EncryptionService};
