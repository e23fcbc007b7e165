//! Cryptographic primitives for opening the wallet's locked blob.
//!
//! Provides PBKDF2 key derivation and NaCl secretbox encryption.

pub mod kdf;
pub mod secretbox;

pub use kdf::{DerivedKey, Digest, KdfParams, derive_key};
pub use secretbox::{generate_salt, open, seal};

/// Length of the salt the wallet generates (16 bytes).
pub const SALT_LEN: usize = 16;
/// Length of the nonce (24 bytes for XSalsa20-Poly1305).
pub const NONCE_LEN: usize = 24;
/// Length of the secretbox key (32 bytes / 256 bits).
pub const KEY_LEN: usize = 32;
/// Length of the Poly1305 tag prepended to every ciphertext.
pub const TAG_LEN: usize = 16;
