//! Read-modify-write against the document store with optimistic concurrency
//! (§4.6). Five attempts, retrying only on `StorageError::PreconditionFailed`
//! — any other error, including one raised by `mutate`, short-circuits.

use crate::error::{EngineError, Result};
use ipam_core::Space;
use ipam_storage::{DocStore, StorageError};
use std::sync::Arc;
use tracing::{debug, warn};

const MAX_ATTEMPTS: u32 = 5;

pub struct TxnRunner {
    store: Arc<dyn DocStore>,
}

impl TxnRunner {
    pub fn new(store: Arc<dyn DocStore>) -> Self {
        Self { store }
    }

    /// Read the Space stored at `key`, deserializing from its document form.
    pub fn read(&self, key: &str) -> Result<Space> {
        let stored = self
            .store
            .get(key)?
            .ok_or_else(|| EngineError::BadRequest("Invalid space name.".to_string()))?;
        Ok(serde_json::from_value(stored.value)?)
    }

    /// Create a brand-new Space document. Fails if `key` is already taken.
    pub fn create(&self, key: &str, space: Space) -> Result<Space> {
        let value = serde_json::to_value(&space)?;
        match self.store.create(key, value) {
            Ok(_) => Ok(space),
            Err(StorageError::PreconditionFailed { .. }) => {
                Err(EngineError::BadRequest("A space with that name already exists.".to_string()))
            }
            Err(other) => Err(other.into()),
        }
    }

    /// Delete the Space document unconditionally (callers gate on `force`
    /// and child-emptiness before reaching here).
    pub fn delete(&self, key: &str) -> Result<()> {
        Ok(self.store.delete(key)?)
    }

    /// List every Space document whose key starts with `prefix` — used for
    /// tenant-wide scans (name-uniqueness checks, cross-block vnet exclusion)
    /// that a single-key read can't answer.
    pub fn query_prefix(&self, prefix: &str) -> Result<Vec<Space>> {
        self.store
            .query_prefix(prefix)?
            .into_iter()
            .map(|doc| Ok(serde_json::from_value(doc.value)?))
            .collect()
    }

    /// Read, apply `mutate`, and conditionally replace, retrying on
    /// conflicting concurrent writes. `mutate` must be pure over its input
    /// — it runs again, from a freshly re-read document, on every retry.
    pub fn run_mutation<F>(&self, key: &str, mut mutate: F) -> Result<Space>
    where
        F: FnMut(Space) -> Result<Space>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            debug!(key, attempt, "reading document for mutation");
            let stored = self
                .store
                .get(key)?
                .ok_or_else(|| EngineError::BadRequest("Invalid space name.".to_string()))?;
            let current: Space = serde_json::from_value(stored.value.clone())?;
            let mutated = mutate(current)?;
            let value = serde_json::to_value(&mutated)?;

            match self.store.replace(key, &stored.etag, value) {
                Ok(_) => return Ok(mutated),
                Err(StorageError::PreconditionFailed { .. }) if attempt < MAX_ATTEMPTS => {
                    warn!(key, attempt, "conditional replace conflicted, retrying");
                    continue;
                }
                Err(StorageError::PreconditionFailed { .. }) => {
                    warn!(key, attempt, "retry budget exhausted");
                    return Err(EngineError::ConflictExhausted(
                        "Document was modified concurrently; retry budget exhausted.".to_string(),
                    ));
                }
                Err(other) => return Err(other.into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ipam_storage::InMemoryDocStore;

    fn space() -> Space {
        Space::new("tenant-a", "corp", "main")
    }

    #[test]
    fn create_then_read_roundtrips() {
        let store: Arc<dyn DocStore> = Arc::new(InMemoryDocStore::default());
        let runner = TxnRunner::new(store);
        let created = runner.create("space/tenant-a/corp", space()).unwrap();
        let read_back = runner.read("space/tenant-a/corp").unwrap();
        assert_eq!(created.name, read_back.name);
    }

    #[test]
    fn create_twice_is_bad_request() {
        let store: Arc<dyn DocStore> = Arc::new(InMemoryDocStore::default());
        let runner = TxnRunner::new(store);
        runner.create("space/tenant-a/corp", space()).unwrap();
        let err = runner.create("space/tenant-a/corp", space()).unwrap_err();
        assert!(matches!(err, EngineError::BadRequest(_)));
    }

    #[test]
    fn mutation_persists_and_is_visible_on_next_read() {
        let store: Arc<dyn DocStore> = Arc::new(InMemoryDocStore::default());
        let runner = TxnRunner::new(store);
        runner.create("space/tenant-a/corp", space()).unwrap();

        runner
            .run_mutation("space/tenant-a/corp", |mut s| {
                s.desc = "updated".to_string();
                Ok(s)
            })
            .unwrap();

        let read_back = runner.read("space/tenant-a/corp").unwrap();
        assert_eq!(read_back.desc, "updated");
    }

    #[test]
    fn mutation_error_short_circuits_without_persisting() {
        let store: Arc<dyn DocStore> = Arc::new(InMemoryDocStore::default());
        let runner = TxnRunner::new(store);
        runner.create("space/tenant-a/corp", space()).unwrap();

        let err = runner
            .run_mutation("space/tenant-a/corp", |_| {
                Err(EngineError::BadRequest("nope".to_string()))
            })
            .unwrap_err();
        assert!(matches!(err, EngineError::BadRequest(_)));

        let read_back = runner.read("space/tenant-a/corp").unwrap();
        assert_eq!(read_back.desc, "main");
    }

    #[test]
    fn concurrent_writer_forces_a_retry_with_fresh_state() {
        let store: Arc<dyn DocStore> = Arc::new(InMemoryDocStore::default());
        let runner = TxnRunner::new(store.clone());
        runner.create("space/tenant-a/corp", space()).unwrap();

        // Simulate a concurrent writer racing ahead between our read and
        // replace by bumping the stored etag out from under the first
        // attempt; run_mutation must re-read and succeed on retry.
        let mut first_attempt = true;
        let result = runner.run_mutation("space/tenant-a/corp", move |mut s| {
            if first_attempt {
                first_attempt = false;
                let stolen = store.get("space/tenant-a/corp").unwrap().unwrap();
                store
                    .replace("space/tenant-a/corp", &stolen.etag, stolen.value)
                    .unwrap();
            }
            s.desc = "raced".to_string();
            Ok(s)
        });

        assert!(result.is_ok());
        assert_eq!(result.unwrap().desc, "raced");
    }
}
