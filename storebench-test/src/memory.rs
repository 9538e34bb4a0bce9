//! In-memory storage client for tests.
//!
//! This provides a [`StorageClient`] backed by a `HashMap`, so the benchmark harness can be
//! exercised without any real backend. The client is [`Clone`]: clones share their store, so a
//! test can keep a handle for inspection while the harness owns a boxed copy.
//!
//! [`Faults`] inject the failure modes the harness has to cope with.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use storebench_backends::{StorageClient, StorageError, StorageResult};

/// Failure modes injected into an [`InMemoryClient`].
#[derive(Clone, Copy, Debug, Default)]
pub struct Faults {
    /// Reject every upload with a `503` status.
    pub reject_uploads: bool,
    /// Drop this many bytes from the end of every retrieved object.
    pub truncate_retrievals: usize,
    /// Fail every cleanup with a `500` status.
    pub fail_cleanup: bool,
}

#[derive(Debug, Default)]
struct Shared {
    objects: Mutex<HashMap<String, Bytes>>,
    cleanups: AtomicUsize,
}

/// A [`StorageClient`] keeping objects in memory.
#[derive(Clone, Debug)]
pub struct InMemoryClient {
    name: String,
    faults: Faults,
    shared: Arc<Shared>,
}

impl InMemoryClient {
    /// Creates an empty client reporting the given backend name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            faults: Faults::default(),
            shared: Arc::default(),
        }
    }

    /// Injects the given failure modes.
    pub fn with_faults(mut self, faults: Faults) -> Self {
        self.faults = faults;
        self
    }

    /// Returns the stored bytes of an object, if present.
    pub fn get(&self, object_name: &str) -> Option<Bytes> {
        self.shared.objects.lock().unwrap().get(object_name).cloned()
    }

    /// Returns the names of all stored objects, sorted.
    pub fn object_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.shared.objects.lock().unwrap().keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns `true` if no objects are stored.
    pub fn is_empty(&self) -> bool {
        self.shared.objects.lock().unwrap().is_empty()
    }

    /// Returns how often [`StorageClient::cleanup`] has been called, including failed calls.
    pub fn cleanup_count(&self) -> usize {
        self.shared.cleanups.load(Ordering::Relaxed)
    }
}

#[async_trait::async_trait]
impl StorageClient for InMemoryClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn upload(&self, local_path: &Path, object_name: &str) -> StorageResult<()> {
        if self.faults.reject_uploads {
            return Err(StorageError::Rejected {
                context: "put object".into(),
                status: 503,
            });
        }

        let contents = tokio::fs::read(local_path).await?;
        self.shared
            .objects
            .lock()
            .unwrap()
            .insert(object_name.to_owned(), contents.into());
        Ok(())
    }

    async fn retrieve(&self, object_name: &str, local_path: &Path) -> StorageResult<()> {
        let contents = self.get(object_name).ok_or_else(|| StorageError::NotFound {
            object: object_name.to_owned(),
        })?;

        let keep = contents.len().saturating_sub(self.faults.truncate_retrievals);
        tokio::fs::write(local_path, &contents[..keep]).await?;
        Ok(())
    }

    async fn cleanup(&self) -> StorageResult<()> {
        self.shared.cleanups.fetch_add(1, Ordering::Relaxed);
        if self.faults.fail_cleanup {
            return Err(StorageError::Rejected {
                context: "delete objects".into(),
                status: 500,
            });
        }

        self.shared.objects.lock().unwrap().clear();
        Ok(())
    }
}
