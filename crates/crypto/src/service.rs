//! AES-256-GCM encryption service with scrypt key derivation.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, KeyIvInit};
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use scrypt::{scrypt, Params};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::CryptoError;
use crate::payload::EncryptedPayload;

type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// AEAD nonce length in bytes.
const NONCE_LEN: usize = 12;
/// AEAD authentication tag length in bytes.
const TAG_LEN: usize = 16;
/// Legacy CBC IV length in bytes.
const LEGACY_IV_LEN: usize = 16;

/// Configuration for [`EncryptionService`].
///
/// The same master secret and salt always derive the same key, so no
/// key material needs to be stored next to the encrypted records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptionConfig {
    /// Master secret the key is derived from.
    pub master_secret: String,

    /// Derived key length in bytes. Must be 32 (AES-256).
    #[serde(default = "default_key_length")]
    pub key_length: usize,

    /// Key derivation salt.
    #[serde(default = "default_salt")]
    pub salt: String,

    /// scrypt cost parameter (log2 of N).
    #[serde(default = "default_scrypt_log_n")]
    pub scrypt_log_n: u8,

    /// scrypt block size parameter.
    #[serde(default = "default_scrypt_r")]
    pub scrypt_r: u32,

    /// scrypt parallelism parameter.
    #[serde(default = "default_scrypt_p")]
    pub scrypt_p: u32,
}

fn default_key_length() -> usize {
    32
}

fn default_salt() -> String {
    "skiff-cluster-credentials".to_string()
}

fn default_scrypt_log_n() -> u8 {
    15
}

fn default_scrypt_r() -> u32 {
    8
}

fn default_scrypt_p() -> u32 {
    1
}

impl EncryptionConfig {
    /// Create a config with default derivation parameters.
    #[must_use]
    pub fn new(master_secret: impl Into<String>) -> Self {
        Self {
            master_secret: master_secret.into(),
            key_length: default_key_length(),
            salt: default_salt(),
            scrypt_log_n: default_scrypt_log_n(),
            scrypt_r: default_scrypt_r(),
            scrypt_p: default_scrypt_p(),
        }
    }

    /// Validate the configuration.
    ///
    /// # Errors
    /// Returns an error if the master secret is empty, the salt is
    /// empty, or the key length is not 32 bytes.
    pub fn validate(&self) -> Result<(), CryptoError> {
        if self.master_secret.is_empty() {
            return Err(CryptoError::Config("master secret must not be empty".to_string()));
        }
        if self.salt.is_empty() {
            return Err(CryptoError::Config("salt must not be empty".to_string()));
        }
        if self.key_length != 32 {
            return Err(CryptoError::Config(format!(
                "key length must be 32 bytes for AES-256, got {}",
                self.key_length
            )));
        }
        Ok(())
    }
}

/// Symmetric at-rest encryption for credential blobs.
///
/// Owns the derived key; callers never see raw key material.
pub struct EncryptionService {
    key: Vec<u8>,
}

impl EncryptionService {
    /// Build a service from the given configuration, deriving the key
    /// once up front.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid or key
    /// derivation fails.
    pub fn new(config: &EncryptionConfig) -> Result<Self, CryptoError> {
        config.validate()?;
        let key = Self::derive_key(config)?;
        Ok(Self { key })
    }

    /// Deterministic scrypt key derivation from the master secret.
    fn derive_key(config: &EncryptionConfig) -> Result<Vec<u8>, CryptoError> {
        let params = Params::new(
            config.scrypt_log_n,
            config.scrypt_r,
            config.scrypt_p,
            config.key_length,
        )
        .map_err(|e| CryptoError::KeyDerivation(format!("invalid scrypt parameters: {e}")))?;

        let mut key = vec![0u8; config.key_length];
        scrypt(
            config.master_secret.as_bytes(),
            config.salt.as_bytes(),
            &params,
            &mut key,
        )
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;

        Ok(key)
    }

    /// Encrypt a plaintext into an AEAD payload.
    ///
    /// A fresh random IV is generated per call, so two encryptions of
    /// the same plaintext produce different payloads.
    ///
    /// # Errors
    /// Returns an error if the cipher rejects the input.
    pub fn encrypt(&self, plaintext: &str) -> Result<EncryptedPayload, CryptoError> {
        let mut iv = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut iv);

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key));
        let mut sealed = cipher
            .encrypt(Nonce::from_slice(&iv), plaintext.as_bytes())
            .map_err(|_| CryptoError::Encryption("AEAD seal failed".to_string()))?;

        // aes-gcm appends the tag to the ciphertext; the wire format
        // carries it as a separate segment.
        let tag = sealed.split_off(sealed.len() - TAG_LEN);

        Ok(EncryptedPayload::Aead {
            iv: iv.to_vec(),
            tag,
            ciphertext: sealed,
        })
    }

    /// Decrypt a payload produced by [`encrypt`](Self::encrypt) or by
    /// the legacy non-AEAD writer.
    ///
    /// # Errors
    /// Returns an error on tag mismatch, truncation, or any cipher
    /// failure. Never returns partial plaintext.
    pub fn decrypt(&self, payload: &EncryptedPayload) -> Result<String, CryptoError> {
        let plain = match payload {
            EncryptedPayload::Aead {
                iv,
                tag,
                ciphertext,
            } => self.decrypt_aead(iv, tag, ciphertext)?,
            EncryptedPayload::Legacy { iv, ciphertext } => self.decrypt_legacy(iv, ciphertext)?,
        };

        String::from_utf8(plain)
            .map_err(|_| CryptoError::Decryption("plaintext is not valid UTF-8".to_string()))
    }

    /// Parse and decrypt a wire-format payload string.
    ///
    /// # Errors
    /// Returns a format error for unparseable payloads and a
    /// decryption error for cipher failures.
    pub fn decrypt_str(&self, payload: &str) -> Result<String, CryptoError> {
        let parsed: EncryptedPayload = payload.parse()?;
        self.decrypt(&parsed)
    }

    fn decrypt_aead(&self, iv: &[u8], tag: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if iv.len() != NONCE_LEN {
            return Err(CryptoError::Decryption(format!(
                "unexpected IV length {} (want {NONCE_LEN})",
                iv.len()
            )));
        }
        if tag.len() != TAG_LEN {
            return Err(CryptoError::Decryption(format!(
                "unexpected tag length {} (want {TAG_LEN})",
                tag.len()
            )));
        }

        let mut sealed = ciphertext.to_vec();
        sealed.extend_from_slice(tag);

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key));
        cipher
            .decrypt(Nonce::from_slice(iv), sealed.as_ref())
            .map_err(|_| {
                CryptoError::Decryption("authentication tag mismatch or corrupted ciphertext".to_string())
            })
    }

    fn decrypt_legacy(&self, iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if iv.len() != LEGACY_IV_LEN {
            return Err(CryptoError::Decryption(format!(
                "unexpected legacy IV length {} (want {LEGACY_IV_LEN})",
                iv.len()
            )));
        }

        tracing::debug!("decrypting legacy non-AEAD payload");

        Aes256CbcDec::new_from_slices(&self.key, iv)
            .map_err(|e| CryptoError::Decryption(e.to_string()))?
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| CryptoError::Decryption("bad padding in legacy ciphertext".to_string()))
    }

    /// One-way digest for equality checks. Not used for credential
    /// storage.
    #[must_use]
    pub fn hash(value: &str) -> String {
        hex::encode(Sha256::digest(value.as_bytes()))
    }

    /// Verify a value against a digest produced by [`hash`](Self::hash).
    #[must_use]
    pub fn verify_hash(value: &str, digest: &str) -> bool {
        Self::hash(value).eq_ignore_ascii_case(digest)
    }
}

#[cfg(test)]
mod tests {
    use aes::cipher::BlockEncryptMut;

    use super::*;

    type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;

    /// Cheap scrypt parameters so tests stay fast.
    fn test_service() -> EncryptionService {
        let config = EncryptionConfig {
            scrypt_log_n: 4,
            ..EncryptionConfig::new("test-master-secret")
        };
        EncryptionService::new(&config).unwrap()
    }

    fn legacy_payload(service: &EncryptionService, plaintext: &str) -> EncryptedPayload {
        let mut iv = [0u8; LEGACY_IV_LEN];
        OsRng.fill_bytes(&mut iv);
        let ciphertext = Aes256CbcEnc::new_from_slices(&service.key, &iv)
            .unwrap()
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());
        EncryptedPayload::Legacy {
            iv: iv.to_vec(),
            ciphertext,
        }
    }

    #[test]
    fn test_encrypt_decrypt_round_trip() {
        let service = test_service();
        for plaintext in ["kubeconfig contents", "", "multi\nline\nyaml: true"] {
            let payload = service.encrypt(plaintext).unwrap();
            assert!(payload.is_aead());
            assert_eq!(service.decrypt(&payload).unwrap(), plaintext);
        }
    }

    #[test]
    fn test_round_trip_through_wire_format() {
        let service = test_service();
        let wire = service.encrypt("apiVersion: v1").unwrap().to_string();
        assert_eq!(wire.split(':').count(), 3);
        assert_eq!(service.decrypt_str(&wire).unwrap(), "apiVersion: v1");
    }

    #[test]
    fn test_encrypt_is_nondeterministic() {
        let service = test_service();
        let a = service.encrypt("same plaintext").unwrap();
        let b = service.encrypt("same plaintext").unwrap();
        assert_ne!(a.to_string(), b.to_string());
        assert_eq!(service.decrypt(&a).unwrap(), "same plaintext");
        assert_eq!(service.decrypt(&b).unwrap(), "same plaintext");
    }

    #[test]
    fn test_legacy_round_trip() {
        let service = test_service();
        let payload = legacy_payload(&service, "pre-encryption record");
        assert_eq!(service.decrypt(&payload).unwrap(), "pre-encryption record");
    }

    #[test]
    fn test_tampered_tag_fails_closed() {
        let service = test_service();
        let wire = service.encrypt("do not alter").unwrap().to_string();

        // Flip one hex character inside the tag segment.
        let tag_start = wire.find(':').unwrap() + 1;
        let mut bytes = wire.into_bytes();
        bytes[tag_start] = if bytes[tag_start] == b'0' { b'1' } else { b'0' };
        let tampered = String::from_utf8(bytes).unwrap();

        assert!(service.decrypt_str(&tampered).is_err());
    }

    #[test]
    fn test_truncated_ciphertext_fails_closed() {
        let service = test_service();
        let wire = service.encrypt("truncate me please").unwrap().to_string();
        let truncated = &wire[..wire.len() - 2];
        assert!(service.decrypt_str(truncated).is_err());
    }

    #[test]
    fn test_wrong_key_fails_closed() {
        let service = test_service();
        let other = EncryptionService::new(&EncryptionConfig {
            scrypt_log_n: 4,
            ..EncryptionConfig::new("different-secret")
        })
        .unwrap();

        let wire = service.encrypt("secret").unwrap().to_string();
        assert!(other.decrypt_str(&wire).is_err());
    }

    #[test]
    fn test_config_validation() {
        assert!(EncryptionConfig::new("").validate().is_err());

        let mut config = EncryptionConfig::new("ok");
        config.key_length = 16;
        assert!(config.validate().is_err());

        config = EncryptionConfig::new("ok");
        config.salt = String::new();
        assert!(config.validate().is_err());

        assert!(EncryptionConfig::new("ok").validate().is_ok());
    }

    #[test]
    fn test_hash_and_verify() {
        let digest = EncryptionService::hash("value");
        assert_eq!(digest.len(), 64);
        assert!(EncryptionService::verify_hash("value", &digest));
        assert!(EncryptionService::verify_hash("value", &digest.to_uppercase()));
        assert!(!EncryptionService::verify_hash("other", &digest));
    }

    #[test]
    fn test_same_secret_same_key() {
        let config = EncryptionConfig {
            scrypt_log_n: 4,
            ..EncryptionConfig::new("stable-secret")
        };
        let a = EncryptionService::new(&config).unwrap();
        let b = EncryptionService::new(&config).unwrap();
        let wire = a.encrypt("cross-instance").unwrap().to_string();
        assert_eq!(b.decrypt_str(&wire).unwrap(), "cross-instance");
    }
}
