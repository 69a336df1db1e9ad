//! Wire format for encrypted credential payloads.
//!
//! Payloads are ASCII, colon-joined hex fields. Three segments mean the
//! current AEAD format, two mean a legacy non-AEAD record. The legacy
//! form is retained permanently as a decode path; nothing new is ever
//! written in it.

use std::fmt;
use std::str::FromStr;

use crate::error::CryptoError;

/// A parsed encrypted payload.
///
/// `Display` re-emits the exact colon-joined hex form, so payloads are
/// byte-stable across parse/format round trips.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncryptedPayload {
    /// AES-256-GCM: `iv:tag:ciphertext`.
    Aead {
        iv: Vec<u8>,
        tag: Vec<u8>,
        ciphertext: Vec<u8>,
    },
    /// AES-256-CBC (legacy): `iv:ciphertext`.
    Legacy { iv: Vec<u8>, ciphertext: Vec<u8> },
}

impl EncryptedPayload {
    /// Whether this payload carries an authentication tag.
    #[must_use]
    pub fn is_aead(&self) -> bool {
        matches!(self, EncryptedPayload::Aead { .. })
    }
}

fn decode_segment(segment: &str, name: &str) -> Result<Vec<u8>, CryptoError> {
    hex::decode(segment)
        .map_err(|e| CryptoError::InvalidFormat(format!("{name} segment is not valid hex: {e}")))
}

impl FromStr for EncryptedPayload {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let segments: Vec<&str> = s.split(':').collect();
        match segments.as_slice() {
            [iv, tag, ciphertext] => Ok(EncryptedPayload::Aead {
                iv: decode_segment(iv, "iv")?,
                tag: decode_segment(tag, "tag")?,
                ciphertext: decode_segment(ciphertext, "ciphertext")?,
            }),
            [iv, ciphertext] => Ok(EncryptedPayload::Legacy {
                iv: decode_segment(iv, "iv")?,
                ciphertext: decode_segment(ciphertext, "ciphertext")?,
            }),
            other => Err(CryptoError::InvalidFormat(format!(
                "expected 2 or 3 colon-separated segments, got {}",
                other.len()
            ))),
        }
    }
}

impl fmt::Display for EncryptedPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncryptedPayload::Aead {
                iv,
                tag,
                ciphertext,
            } => write!(
                f,
                "{}:{}:{}",
                hex::encode(iv),
                hex::encode(tag),
                hex::encode(ciphertext)
            ),
            EncryptedPayload::Legacy { iv, ciphertext } => {
                write!(f, "{}:{}", hex::encode(iv), hex::encode(ciphertext))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_aead_payload() {
        let payload: EncryptedPayload = "00112233:aabb:deadbeef".parse().unwrap();
        match payload {
            EncryptedPayload::Aead {
                iv,
                tag,
                ciphertext,
            } => {
                assert_eq!(iv, vec![0x00, 0x11, 0x22, 0x33]);
                assert_eq!(tag, vec![0xaa, 0xbb]);
                assert_eq!(ciphertext, vec![0xde, 0xad, 0xbe, 0xef]);
            }
            EncryptedPayload::Legacy { .. } => panic!("expected AEAD variant"),
        }
    }

    #[test]
    fn test_parse_legacy_payload() {
        let payload: EncryptedPayload = "0011:deadbeef".parse().unwrap();
        assert!(!payload.is_aead());
    }

    #[test]
    fn test_round_trip_is_byte_stable() {
        for raw in ["00112233:aabb:deadbeef", "0011:deadbeef"] {
            let payload: EncryptedPayload = raw.parse().unwrap();
            assert_eq!(payload.to_string(), raw);
        }
    }

    #[test]
    fn test_rejects_wrong_segment_count() {
        assert!("deadbeef".parse::<EncryptedPayload>().is_err());
        assert!("aa:bb:cc:dd".parse::<EncryptedPayload>().is_err());
        assert!("".parse::<EncryptedPayload>().is_err());
    }

    #[test]
    fn test_rejects_non_hex_segment() {
        let err = "zzzz:deadbeef".parse::<EncryptedPayload>().unwrap_err();
        assert!(err.is_format_error());
        assert!("0011:not-hex!".parse::<EncryptedPayload>().is_err());
        assert!("0011:aabb:nope".parse::<EncryptedPayload>().is_err());
    }
}
