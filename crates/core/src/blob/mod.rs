//! Blob store contract and the per-run existence checker.

pub mod fs;
#[cfg(feature = "s3")]
pub mod s3;

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Error, Result};

/// Remote object storage as seen by the pipeline. Implementations must be
/// safe to call from every worker at once.
pub trait BlobStore: Send + Sync {
    /// Whether an object exists under `key`.
    fn exists(&self, key: &str) -> Result<bool>;

    /// Store `content` under `key`, replacing any previous object.
    /// Returns the object's URL.
    fn put(&self, key: &str, content: &[u8], content_type: &str) -> Result<String>;

    /// Every key currently in the store. Backends without a cheap listing
    /// keep the default, which makes the listing strategy unavailable.
    fn list_keys(&self) -> Result<Vec<String>> {
        Err(Error::BlobListFailed(format!(
            "{} backend does not support listing",
            self.backend_name()
        )))
    }

    fn backend_name(&self) -> &'static str;
}

/// How existence is answered during a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExistenceCheck {
    /// One `exists` call per object.
    Probe,
    /// One full listing per run, then lookups in the sorted snapshot.
    #[default]
    Listing,
}

/// Answers existence queries for one pipeline run.
///
/// In listing mode the first caller takes the snapshot under a lock; later
/// callers reuse it. A failed listing is remembered too, so every later check
/// in the run fails fast and the next run lists again. Objects uploaded after
/// the snapshot are not reflected; at worst a variant is uploaded twice.
pub struct ExistenceChecker {
    store: Arc<dyn BlobStore>,
    strategy: ExistenceCheck,
    snapshot: Mutex<Option<std::result::Result<Arc<Vec<String>>, String>>>,
}

impl ExistenceChecker {
    pub fn new(store: Arc<dyn BlobStore>, strategy: ExistenceCheck) -> Self {
        Self {
            store,
            strategy,
            snapshot: Mutex::new(None),
        }
    }

    pub fn strategy(&self) -> ExistenceCheck {
        self.strategy
    }

    pub fn exists(&self, key: &str) -> Result<bool> {
        match self.strategy {
            ExistenceCheck::Probe => {
                self.store
                    .exists(key)
                    .map_err(|e| Error::BlobCheckFailed {
                        key: key.to_string(),
                        message: e.to_string(),
                    })
            }
            ExistenceCheck::Listing => {
                let keys = self.snapshot().map_err(|e| Error::BlobCheckFailed {
                    key: key.to_string(),
                    message: e.to_string(),
                })?;
                Ok(keys.binary_search_by(|k| k.as_str().cmp(key)).is_ok())
            }
        }
    }

    fn snapshot(&self) -> Result<Arc<Vec<String>>> {
        let mut guard = self
            .snapshot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match guard.as_ref() {
            Some(Ok(keys)) => return Ok(Arc::clone(keys)),
            Some(Err(message)) => return Err(Error::BlobListFailed(message.clone())),
            None => {}
        }

        info!(backend = self.store.backend_name(), "listing existing objects");
        match self.store.list_keys() {
            Ok(mut keys) => {
                keys.sort_unstable();
                keys.dedup();
                info!(count = keys.len(), "existing objects listed");
                let keys = Arc::new(keys);
                *guard = Some(Ok(Arc::clone(&keys)));
                Ok(keys)
            }
            Err(e) => {
                warn!(error = %e, "listing failed, existence checks fail for the rest of the run");
                let message = e.to_string();
                *guard = Some(Err(message.clone()));
                Err(Error::BlobListFailed(message))
            }
        }
    }
}
