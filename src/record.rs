//! The wallet's locked blob.
//!
//! Stored as a JSON object whose binary fields are base58 strings:
//! ```text
//! { "encrypted": b58, "nonce": b58, "salt": b58, "iterations": int, "digest": "sha256" }
//! ```

use anyhow::Result;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::credential::RecoveredCredential;
use crate::crypto::{self, KEY_LEN, KdfParams, NONCE_LEN};
use crate::error::{AuthenticationFailed, MalformedRecord};

/// Encrypted key material located in a store.
///
/// Immutable once parsed; decrypting does not consume it, so one record
/// can be tried against any number of passphrases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WireRecord", into = "WireRecord")]
pub struct CiphertextRecord {
    encrypted: Vec<u8>,
    nonce: [u8; NONCE_LEN],
    salt: Vec<u8>,
    kdf: KdfParams,
}

#[derive(Serialize, Deserialize)]
struct WireRecord {
    encrypted: String,
    nonce: String,
    salt: String,
    iterations: u64,
    digest: String,
}

impl CiphertextRecord {
    /// Parses the JSON payload of a stored record.
    pub fn from_json(payload: &[u8]) -> Result<Self, MalformedRecord> {
        serde_json::from_slice(payload).map_err(|e| MalformedRecord(e.to_string()))
    }

    /// Encrypts `plaintext` the way the wallet locks a seed: fresh salt, fresh nonce.
    pub fn seal(plaintext: &[u8], password: &str, kdf: KdfParams) -> Result<Self> {
        let salt = crypto::generate_salt()?;
        let key = crypto::derive_key(password, &salt, kdf, KEY_LEN);
        let (encrypted, nonce) = crypto::seal(&key, plaintext)?;

        Ok(Self {
            encrypted,
            nonce,
            salt: salt.to_vec(),
            kdf,
        })
    }

    /// Derives the key for `password` and opens the ciphertext.
    pub fn open(&self, password: &str) -> Result<Zeroizing<Vec<u8>>, AuthenticationFailed> {
        let key = crypto::derive_key(password, &self.salt, self.kdf, KEY_LEN);
        crypto::open(&key, &self.nonce, &self.encrypted)
    }

    /// Opens the ciphertext and parses the plaintext as a wallet credential.
    pub fn decrypt(&self, password: &str) -> Result<RecoveredCredential, AuthenticationFailed> {
        self.open(password).map(RecoveredCredential::from_plaintext)
    }

    pub fn encrypted(&self) -> &[u8] {
        &self.encrypted
    }

    pub fn nonce(&self) -> &[u8; NONCE_LEN] {
        &self.nonce
    }

    pub fn salt(&self) -> &[u8] {
        &self.salt
    }

    pub fn kdf(&self) -> &KdfParams {
        &self.kdf
    }
}

impl TryFrom<WireRecord> for CiphertextRecord {
    type Error = MalformedRecord;

    fn try_from(wire: WireRecord) -> Result<Self, Self::Error> {
        let encrypted = decode_b58("encrypted", &wire.encrypted)?;
        let nonce: [u8; NONCE_LEN] = decode_b58("nonce", &wire.nonce)?
            .try_into()
            .map_err(|v: Vec<u8>| {
                MalformedRecord(format!("nonce must be {NONCE_LEN} bytes, got {}", v.len()))
            })?;
        let salt = decode_b58("salt", &wire.salt)?;

        let kdf = KdfParams::new(wire.iterations, wire.digest.parse()?)?;

        Ok(Self {
            encrypted,
            nonce,
            salt,
            kdf,
        })
    }
}

impl From<CiphertextRecord> for WireRecord {
    fn from(record: CiphertextRecord) -> Self {
        Self {
            encrypted: bs58::encode(&record.encrypted).into_string(),
            nonce: bs58::encode(record.nonce).into_string(),
            salt: bs58::encode(&record.salt).into_string(),
            iterations: record.kdf.iterations(),
            digest: record.kdf.digest().to_string(),
        }
    }
}

fn decode_b58(field: &str, value: &str) -> Result<Vec<u8>, MalformedRecord> {
    bs58::decode(value)
        .into_vec()
        .map_err(|e| MalformedRecord(format!("field '{field}' is not valid base58: {e}")))
}
