use super::{DerivedKey, NONCE_LEN, SALT_LEN};
use anyhow::{Result, anyhow};
use crypto_secretbox::{
    XSalsa20Poly1305,
    aead::{Aead, KeyInit, Nonce},
};
use getrandom::fill;
use zeroize::Zeroizing;

use crate::error::AuthenticationFailed;

/// Fill buffer with cryptographically secure random bytes
fn secure_random(buf: &mut [u8]) -> Result<()> {
    fill(buf).map_err(|_| anyhow!("OS random generator unavailable"))
}

/// Generate salt
pub fn generate_salt() -> Result<[u8; SALT_LEN]> {
    let mut salt = [0u8; SALT_LEN];
    secure_random(&mut salt)?;
    Ok(salt)
}

/// Encrypt plaintext under a fresh random nonce.
///
/// Output layout matches NaCl `secretbox`: tag first, then ciphertext.
pub fn seal(key: &DerivedKey, plaintext: &[u8]) -> Result<(Vec<u8>, [u8; NONCE_LEN])> {
    let cipher = XSalsa20Poly1305::new_from_slice(key.as_bytes())
        .map_err(|_| anyhow!("invalid secretbox key length {}", key.len()))?;

    let mut nonce = [0u8; NONCE_LEN];
    secure_random(&mut nonce)?;

    let ciphertext = cipher
        .encrypt(Nonce::<XSalsa20Poly1305>::from_slice(&nonce), plaintext)
        .map_err(|_| anyhow!("encryption failed"))?;

    Ok((ciphertext, nonce))
}

/// Decrypt and authenticate a secretbox ciphertext.
pub fn open(
    key: &DerivedKey,
    nonce: &[u8; NONCE_LEN],
    ciphertext: &[u8],
) -> Result<Zeroizing<Vec<u8>>, AuthenticationFailed> {
    let cipher =
        XSalsa20Poly1305::new_from_slice(key.as_bytes()).map_err(|_| AuthenticationFailed)?;

    let plaintext = cipher
        .decrypt(Nonce::<XSalsa20Poly1305>::from_slice(nonce), ciphertext)
        .map_err(|_| AuthenticationFailed)?;
    Ok(Zeroizing::new(plaintext))
}
