use std::fmt;
use std::str::FromStr;

use hmac::digest::{KeyInit, OutputSizeUser};
use hmac::{Hmac, Mac};
use pbkdf2::pbkdf2_hmac;
use sha1::Sha1;
use sha2::{Sha256, Sha384, Sha512};
use zeroize::Zeroizing;

use crate::error::MalformedRecord;

/// Hash function driving PBKDF2, named the way Node's `crypto` names it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Digest {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl Digest {
    fn as_str(&self) -> &'static str {
        match self {
            Digest::Sha1 => "sha1",
            Digest::Sha256 => "sha256",
            Digest::Sha384 => "sha384",
            Digest::Sha512 => "sha512",
        }
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Digest {
    type Err = MalformedRecord;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sha1" => Ok(Digest::Sha1),
            "sha256" => Ok(Digest::Sha256),
            "sha384" => Ok(Digest::Sha384),
            "sha512" => Ok(Digest::Sha512),
            other => Err(MalformedRecord(format!("unsupported digest '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    iterations: u64,
    digest: Digest,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            // what the wallet uses when it locks a new seed
            iterations: 100_000,
            digest: Digest::Sha256,
        }
    }
}

impl KdfParams {
    pub fn new(iterations: u64, digest: Digest) -> Result<Self, MalformedRecord> {
        let params = Self { iterations, digest };
        params.validate()?;
        Ok(params)
    }

    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    pub fn digest(&self) -> Digest {
        self.digest
    }

    pub fn validate(&self) -> Result<(), MalformedRecord> {
        if self.iterations < 1 {
            return Err(MalformedRecord("iteration count must be >= 1".into()));
        }
        Ok(())
    }
}

/// Key material produced by [`derive_key`]. Wiped on drop.
pub struct DerivedKey(Zeroizing<Vec<u8>>);

impl DerivedKey {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub(crate) fn len(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DerivedKey([REDACTED; {}])", self.0.len())
    }
}

/// Derive `output_len` bytes of key material with PBKDF2-HMAC.
///
/// The iteration count is used as given; callers that need a time limit
/// must run this on a thread they can abandon.
pub fn derive_key(password: &str, salt: &[u8], kdf: KdfParams, output_len: usize) -> DerivedKey {
    let mut key = Zeroizing::new(vec![0u8; output_len]);
    let password = password.as_bytes();

    match (kdf.digest, u32::try_from(kdf.iterations)) {
        (Digest::Sha1, Ok(rounds)) => pbkdf2_hmac::<Sha1>(password, salt, rounds, &mut key),
        (Digest::Sha256, Ok(rounds)) => pbkdf2_hmac::<Sha256>(password, salt, rounds, &mut key),
        (Digest::Sha384, Ok(rounds)) => pbkdf2_hmac::<Sha384>(password, salt, rounds, &mut key),
        (Digest::Sha512, Ok(rounds)) => pbkdf2_hmac::<Sha512>(password, salt, rounds, &mut key),
        (Digest::Sha1, Err(_)) => {
            pbkdf2_wide::<Hmac<Sha1>>(password, salt, kdf.iterations, &mut key)
        }
        (Digest::Sha256, Err(_)) => {
            pbkdf2_wide::<Hmac<Sha256>>(password, salt, kdf.iterations, &mut key)
        }
        (Digest::Sha384, Err(_)) => {
            pbkdf2_wide::<Hmac<Sha384>>(password, salt, kdf.iterations, &mut key)
        }
        (Digest::Sha512, Err(_)) => {
            pbkdf2_wide::<Hmac<Sha512>>(password, salt, kdf.iterations, &mut key)
        }
    }

    DerivedKey(key)
}

/// PBKDF2 (RFC 8018 §5.2) with a 64-bit round count, for counts `pbkdf2_hmac` cannot take.
fn pbkdf2_wide<M>(password: &[u8], salt: &[u8], rounds: u64, out: &mut [u8])
where
    M: Mac + KeyInit + Clone,
{
    let Ok(prf) = <M as KeyInit>::new_from_slice(password) else {
        unreachable!("HMAC takes keys of any length");
    };

    for (block, chunk) in out.chunks_mut(<M as OutputSizeUser>::output_size()).enumerate() {
        let mut mac = prf.clone();
        mac.update(salt);
        mac.update(&(block as u32 + 1).to_be_bytes());
        let mut u = Zeroizing::new(mac.finalize().into_bytes().to_vec());
        let mut t = u.clone();

        for _ in 1..rounds {
            let mut mac = prf.clone();
            mac.update(&u);
            u = Zeroizing::new(mac.finalize().into_bytes().to_vec());
            t.iter_mut().zip(u.iter()).for_each(|(t, u)| *t ^= u);
        }
        chunk.copy_from_slice(&t[..chunk.len()]);
    }
}
