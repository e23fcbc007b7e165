use std::fmt;

use serde::Deserialize;
use tracing::debug;
use zeroize::Zeroizing;

/// Decrypted wallet secret.
///
/// The wallet stores `{ "mnemonic": ..., "seed": <hex>, "derivationPath": ... }`.
/// Fields that are absent or fail to parse are `None`; the raw plaintext is
/// always available.
pub struct RecoveredCredential {
    plaintext: Zeroizing<Vec<u8>>,
    mnemonic: Option<Zeroizing<String>>,
    seed: Option<Zeroizing<Vec<u8>>>,
    derivation_path: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Payload {
    mnemonic: Option<String>,
    seed: Option<String>,
    derivation_path: Option<String>,
}

impl RecoveredCredential {
    pub fn from_plaintext(plaintext: Zeroizing<Vec<u8>>) -> Self {
        let payload = match serde_json::from_slice::<Payload>(&plaintext) {
            Ok(payload) => Some(payload),
            Err(e) => {
                debug!("decrypted payload is not a wallet object: {e}");
                None
            }
        };

        let (mnemonic, seed, derivation_path) = match payload {
            Some(p) => {
                let seed = p.seed.map(Zeroizing::new).and_then(|s| {
                    hex::decode(s.as_str()).map(Zeroizing::new).ok()
                });
                (p.mnemonic.map(Zeroizing::new), seed, p.derivation_path)
            }
            None => (None, None, None),
        };

        Self {
            plaintext,
            mnemonic,
            seed,
            derivation_path,
        }
    }

    pub fn mnemonic(&self) -> Option<&str> {
        self.mnemonic.as_deref().map(String::as_str)
    }

    pub fn seed(&self) -> Option<&[u8]> {
        self.seed.as_deref().map(Vec::as_slice)
    }

    pub fn derivation_path(&self) -> Option<&str> {
        self.derivation_path.as_deref()
    }

    pub fn plaintext(&self) -> &[u8] {
        &self.plaintext
    }
}

impl fmt::Debug for RecoveredCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecoveredCredential")
            .field("mnemonic", &self.mnemonic.as_ref().map(|_| "[REDACTED]"))
            .field("seed", &self.seed.as_ref().map(|_| "[REDACTED]"))
            .field("derivation_path", &self.derivation_path)
            .finish_non_exhaustive()
    }
}
