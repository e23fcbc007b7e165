//! Offline recovery of the Sollet wallet's encrypted seed from browser
//! Local Storage.
//!
//! A store is scanned with [`scan_store`] (or many at once with [`scan_all`]),
//! which yields the wallet's [`CiphertextRecord`] if one is present. The
//! record can then be tried against passphrases through [`StoreWorkflow`].

pub mod crypto;
pub mod discover;
pub mod leveldb;
pub mod locator;

mod credential;
mod error;
mod record;
mod workflow;

pub use crate::credential::RecoveredCredential;
pub use crate::crypto::{Digest, KdfParams};
pub use crate::error::{AuthenticationFailed, MalformedRecord, StoreError};
pub use crate::leveldb::{RawEntry, Store};
pub use crate::locator::{LOCKED_KEY_PATTERN, Lookup};
pub use crate::record::CiphertextRecord;
pub use crate::workflow::{Outcome, Skip, StoreWorkflow, Unlock, scan_all, scan_store};
