//! Per-store recovery: open → locate → close → decrypt.
//!
//! Every store is handled on its own; a failure in one never reaches another.

use std::fmt;
use std::path::{Path, PathBuf};
use std::thread;

use tracing::{error, info, warn};

use crate::credential::RecoveredCredential;
use crate::error::{MalformedRecord, StoreError};
use crate::leveldb::Store;
use crate::locator::{self, LOCKED_KEY_PATTERN, Lookup};
use crate::record::CiphertextRecord;

/// Why a store produced no record.
#[derive(Debug)]
pub enum Skip {
    OpenFailed(StoreError),
    NotFound,
    Malformed(MalformedRecord),
    /// Reading or closing the store failed after it was opened.
    Io(StoreError),
    Panicked,
}

impl fmt::Display for Skip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Skip::OpenFailed(e) => write!(f, "{e}"),
            Skip::NotFound => f.write_str("no wallet data found"),
            Skip::Malformed(e) => write!(f, "{e}"),
            Skip::Io(e) => write!(f, "{e}"),
            Skip::Panicked => f.write_str("scan aborted unexpectedly"),
        }
    }
}

/// Where a store's workflow currently stands.
#[derive(Debug)]
pub enum Outcome {
    Skipped(Skip),
    /// Located but not yet decrypted.
    Found(CiphertextRecord),
    Decrypted(RecoveredCredential),
}

/// Result of one passphrase attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unlock {
    Decrypted,
    /// Wrong passphrase or damaged ciphertext; the record is kept for another try.
    AuthFailed,
    /// The store was skipped, so there is nothing to decrypt.
    NothingToUnlock,
}

/// Opens `path`, looks for the locked blob and closes the store again.
pub fn scan_store(path: &Path) -> Outcome {
    info!(path = %path.display(), "opening local storage database");
    let store = match Store::open(path) {
        Ok(store) => store,
        Err(e) => {
            warn!("could not open database: {e}");
            return Outcome::Skipped(Skip::OpenFailed(e));
        }
    };

    let lookup = locator::try_find(store.entries(), LOCKED_KEY_PATTERN);
    if let Err(e) = store.close() {
        warn!(path = %path.display(), "failed to close database: {e}");
        return Outcome::Skipped(Skip::Io(e));
    }

    match lookup {
        Ok(Lookup::Found(record)) => {
            info!(path = %path.display(), "found wallet data");
            Outcome::Found(record)
        }
        Ok(Lookup::NotFound) => {
            info!(path = %path.display(), "no wallet data found");
            Outcome::Skipped(Skip::NotFound)
        }
        Ok(Lookup::Malformed(e)) => {
            warn!(path = %path.display(), "{e}");
            Outcome::Skipped(Skip::Malformed(e))
        }
        Err(e) => {
            warn!(path = %path.display(), "error while reading database: {e}");
            Outcome::Skipped(Skip::Io(e))
        }
    }
}

/// Recovery state for one store.
#[derive(Debug)]
pub struct StoreWorkflow {
    path: PathBuf,
    outcome: Outcome,
}

impl StoreWorkflow {
    /// Runs the scan for `path`; the store is closed when this returns.
    pub fn scan(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let outcome = scan_store(&path);
        Self { path, outcome }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn outcome(&self) -> &Outcome {
        &self.outcome
    }

    pub fn into_outcome(self) -> Outcome {
        self.outcome
    }

    pub fn record(&self) -> Option<&CiphertextRecord> {
        match &self.outcome {
            Outcome::Found(record) => Some(record),
            _ => None,
        }
    }

    pub fn credential(&self) -> Option<&RecoveredCredential> {
        match &self.outcome {
            Outcome::Decrypted(credential) => Some(credential),
            _ => None,
        }
    }

    /// Tries one passphrase against the located record.
    ///
    /// Blocks for the whole key derivation. Calling this again after a
    /// success is a no-op that reports [`Unlock::Decrypted`].
    pub fn try_passphrase(&mut self, passphrase: &str) -> Unlock {
        let record = match &self.outcome {
            Outcome::Found(record) => record,
            Outcome::Decrypted(_) => return Unlock::Decrypted,
            Outcome::Skipped(_) => return Unlock::NothingToUnlock,
        };

        match record.decrypt(passphrase) {
            Ok(credential) => {
                info!(path = %self.path.display(), "decrypted wallet data");
                self.outcome = Outcome::Decrypted(credential);
                Unlock::Decrypted
            }
            Err(_) => Unlock::AuthFailed,
        }
    }

    /// Tries each passphrase in turn until one works or the list runs out.
    pub fn drive<I, S>(&mut self, passphrases: I) -> Unlock
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut last = match self.outcome {
            Outcome::Skipped(_) => return Unlock::NothingToUnlock,
            Outcome::Decrypted(_) => return Unlock::Decrypted,
            Outcome::Found(_) => Unlock::AuthFailed,
        };
        for passphrase in passphrases {
            last = self.try_passphrase(passphrase.as_ref());
            if last == Unlock::Decrypted {
                break;
            }
        }
        last
    }
}

/// Scans every path concurrently; results come back in input order.
pub fn scan_all(paths: &[PathBuf]) -> Vec<StoreWorkflow> {
    thread::scope(|scope| {
        let handles: Vec<_> = paths
            .iter()
            .map(|path| (path, scope.spawn(move || scan_store(path))))
            .collect();

        handles
            .into_iter()
            .map(|(path, handle)| {
                let outcome = handle.join().unwrap_or_else(|_| {
                    error!(path = %path.display(), "store scan panicked");
                    Outcome::Skipped(Skip::Panicked)
                });
                StoreWorkflow {
                    path: path.clone(),
                    outcome,
                }
            })
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{Digest, KdfParams};

    fn found(password: &str) -> StoreWorkflow {
        let kdf = KdfParams::new(100, Digest::Sha256).unwrap();
        let record =
            CiphertextRecord::seal(br#"{"mnemonic":"abandon"}"#, password, kdf).unwrap();
        StoreWorkflow {
            path: PathBuf::from("/nowhere"),
            outcome: Outcome::Found(record),
        }
    }

    #[test]
    fn wrong_then_right_passphrase() {
        let mut workflow = found("test1234");

        assert_eq!(workflow.try_passphrase("wrong"), Unlock::AuthFailed);
        assert!(workflow.record().is_some());

        assert_eq!(workflow.try_passphrase("test1234"), Unlock::Decrypted);
        assert!(workflow.record().is_none());
        assert_eq!(workflow.credential().unwrap().mnemonic(), Some("abandon"));

        assert_eq!(workflow.try_passphrase("anything"), Unlock::Decrypted);
    }

    #[test]
    fn drive_stops_at_first_success() {
        let mut workflow = found("pw");
        assert_eq!(workflow.drive(["a", "b", "pw", "c"]), Unlock::Decrypted);
        assert!(workflow.credential().is_some());
    }

    #[test]
    fn drive_exhausts_script() {
        let mut workflow = found("pw");
        assert_eq!(workflow.drive(vec!["a".to_string(), "b".to_string()]), Unlock::AuthFailed);
        assert_eq!(workflow.drive(Vec::<String>::new()), Unlock::AuthFailed);
        assert!(workflow.record().is_some());
    }

    #[test]
    fn skipped_store_has_nothing_to_unlock() {
        let mut workflow = StoreWorkflow {
            path: PathBuf::from("/nowhere"),
            outcome: Outcome::Skipped(Skip::NotFound),
        };
        assert_eq!(workflow.try_passphrase("pw"), Unlock::NothingToUnlock);
        assert_eq!(workflow.drive(["pw"]), Unlock::NothingToUnlock);
    }

    #[test]
    fn missing_directory_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let workflow = StoreWorkflow::scan(dir.path().join("missing"));

        assert!(matches!(
            workflow.outcome(),
            Outcome::Skipped(Skip::OpenFailed(_))
        ));
    }

    #[test]
    fn scan_all_keeps_input_order() {
        let dir = tempfile::tempdir().unwrap();
        let paths: Vec<_> = (0..4).map(|i| dir.path().join(format!("s{i}"))).collect();

        let results = scan_all(&paths);

        let got: Vec<_> = results.iter().map(|w| w.path().to_path_buf()).collect();
        assert_eq!(got, paths);
    }
}
