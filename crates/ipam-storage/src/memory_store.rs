use crate::doc_store::{DocStore, StoredDoc};
use crate::error::StorageError;
use crate::Result;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

/// An in-memory `DocStore`, for engine/service unit tests that don't need a
/// real on-disk database — the teacher has no equivalent file, but follows
/// the same trait-impl shape as its `RedbBackend`.
#[derive(Default)]
pub struct InMemoryDocStore {
    docs: RwLock<BTreeMap<String, StoredDoc>>,
}

impl InMemoryDocStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DocStore for InMemoryDocStore {
    fn get(&self, key: &str) -> Result<Option<StoredDoc>> {
        Ok(self.docs.read().get(key).cloned())
    }

    fn create(&self, key: &str, value: Value) -> Result<StoredDoc> {
        let mut docs = self.docs.write();
        if docs.contains_key(key) {
            return Err(StorageError::precondition_failed(key));
        }
        let doc = StoredDoc {
            etag: Uuid::new_v4().to_string(),
            value,
        };
        docs.insert(key.to_string(), doc.clone());
        Ok(doc)
    }

    fn replace(&self, key: &str, expected_etag: &str, value: Value) -> Result<StoredDoc> {
        let mut docs = self.docs.write();
        match docs.get(key) {
            None => Err(StorageError::not_found(key)),
            Some(current) if current.etag != expected_etag => Err(StorageError::precondition_failed(key)),
            Some(_) => {
                let doc = StoredDoc {
                    etag: Uuid::new_v4().to_string(),
                    value,
                };
                docs.insert(key.to_string(), doc.clone());
                Ok(doc)
            }
        }
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.docs.write().remove(key);
        Ok(())
    }

    fn query_prefix(&self, prefix: &str) -> Result<Vec<StoredDoc>> {
        Ok(self
            .docs
            .read()
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(_, v)| v.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn create_get_replace_delete_roundtrip() {
        let store = InMemoryDocStore::new();
        let created = store.create("space/t1/corp", json!({"v": 1})).unwrap();
        assert_eq!(store.get("space/t1/corp").unwrap().unwrap().value, json!({"v": 1}));

        let replaced = store.replace("space/t1/corp", &created.etag, json!({"v": 2})).unwrap();
        assert_ne!(replaced.etag, created.etag);

        assert!(store.replace("space/t1/corp", &created.etag, json!({"v": 3})).is_err());

        store.delete("space/t1/corp").unwrap();
        assert!(store.get("space/t1/corp").unwrap().is_none());
    }

    #[test]
    fn query_prefix_scopes_by_tenant() {
        let store = InMemoryDocStore::new();
        store.create("space/t1/a", json!({})).unwrap();
        store.create("space/t1/b", json!({})).unwrap();
        store.create("space/t2/c", json!({})).unwrap();

        assert_eq!(store.query_prefix("space/t1/").unwrap().len(), 2);
        assert_eq!(store.query_prefix("space/t2/").unwrap().len(), 1);
    }
}
