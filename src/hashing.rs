//! Fingerprint Deriver - SHA-256 multihash, base58 encoded
//!
//! A fingerprint is computed over the canonical JSON form of a value. The same
//! canonical string is what gets embedded into generated source, so the
//! embedded payload and the hash input never drift apart.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{to_string, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Multihash code for sha2-256.
const MULTIHASH_SHA2_256: u8 = 0x12;
/// Digest length prefix for a 32 byte digest.
const MULTIHASH_SHA2_256_LEN: u8 = 0x20;

/// Base58 alphabet used for fingerprints. Excludes `0`, `O`, `I` and `l`.
pub const FINGERPRINT_ALPHABET: &str =
    "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

#[derive(Debug, Error)]
pub enum FingerprintError {
    #[error("Specification is not serializable: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Short, content-derived identifier for a specification.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Fingerprint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Compute SHA-256 digest of bytes
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Wrap a SHA-256 digest of `data` in a multihash envelope and base58 it.
pub fn multihash_base58(data: &[u8]) -> String {
    let digest = sha256(data);
    let mut multihash = Vec::with_capacity(2 + digest.len());
    multihash.push(MULTIHASH_SHA2_256);
    multihash.push(MULTIHASH_SHA2_256_LEN);
    multihash.extend_from_slice(&digest);
    bs58::encode(multihash).into_string()
}

/// Convert to canonical JSON (sorted keys, no whitespace)
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let v: Value = serde_json::to_value(value)?;
    let sorted = sort_value(&v);
    to_string(&sorted)
}

fn sort_value(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut sorted: Vec<_> = map.iter().collect();
            sorted.sort_by(|a, b| a.0.cmp(b.0));
            let sorted_map: serde_json::Map<String, Value> = sorted
                .into_iter()
                .map(|(k, v)| (k.clone(), sort_value(v)))
                .collect();
            Value::Object(sorted_map)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_value).collect()),
        _ => v.clone(),
    }
}

/// Fingerprint of already-canonical bytes.
pub fn fingerprint_bytes(canonical: &[u8]) -> Fingerprint {
    Fingerprint(multihash_base58(canonical))
}

/// Derive the fingerprint of a serializable specification.
pub fn derive_fingerprint<T: Serialize>(spec: &T) -> Result<Fingerprint, FingerprintError> {
    let (fingerprint, _) = derive_with_payload(spec)?;
    Ok(fingerprint)
}

/// Derive the fingerprint together with the canonical payload it was hashed
/// from. Callers that embed the payload must use this one.
pub fn derive_with_payload<T: Serialize>(
    spec: &T,
) -> Result<(Fingerprint, String), FingerprintError> {
    let canonical = canonical_json(spec)?;
    let fingerprint = fingerprint_bytes(canonical.as_bytes());
    Ok((fingerprint, canonical))
}
