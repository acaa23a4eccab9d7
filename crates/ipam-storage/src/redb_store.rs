use crate::doc_store::{DocStore, StoredDoc};
use crate::error::StorageError;
use crate::Result;
use redb::{Database, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

const DOCUMENTS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("documents");

#[derive(Serialize, Deserialize)]
struct Envelope {
    etag: String,
    value: Value,
}

/// redb-backed `DocStore`.
pub struct RedbDocStore {
    db: Arc<Database>,
}

impl RedbDocStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        info!("Opening redb document store at: {}", path.as_ref().display());

        let db = Database::create(path.as_ref())
            .map_err(|e| StorageError::database_error(format!("failed to create database: {}", e), Some(Box::new(e))))?;

        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(DOCUMENTS_TABLE)?;
        }
        write_txn.commit()?;

        Ok(Self { db: Arc::new(db) })
    }

    fn read_envelope(&self, key: &str) -> Result<Option<Envelope>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(DOCUMENTS_TABLE)?;
        match table.get(key)? {
            Some(v) => {
                let env: Envelope = serde_json::from_slice(v.value())?;
                Ok(Some(env))
            }
            None => Ok(None),
        }
    }

    fn write_envelope(&self, key: &str, env: &Envelope) -> Result<()> {
        let bytes = serde_json::to_vec(env)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(DOCUMENTS_TABLE)?;
            table.insert(key, bytes.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }
}

impl DocStore for RedbDocStore {
    fn get(&self, key: &str) -> Result<Option<StoredDoc>> {
        debug!("doc_store get: {}", key);
        Ok(self.read_envelope(key)?.map(|e| StoredDoc {
            etag: e.etag,
            value: e.value,
        }))
    }

    fn create(&self, key: &str, value: Value) -> Result<StoredDoc> {
        if self.read_envelope(key)?.is_some() {
            return Err(StorageError::precondition_failed(key));
        }
        let etag = Uuid::new_v4().to_string();
        let env = Envelope { etag: etag.clone(), value };
        self.write_envelope(key, &env)?;
        debug!("doc_store create: {}", key);
        Ok(StoredDoc { etag, value: env.value })
    }

    fn replace(&self, key: &str, expected_etag: &str, value: Value) -> Result<StoredDoc> {
        let current = self
            .read_envelope(key)?
            .ok_or_else(|| StorageError::not_found(key))?;
        if current.etag != expected_etag {
            return Err(StorageError::precondition_failed(key));
        }
        let etag = Uuid::new_v4().to_string();
        let env = Envelope { etag: etag.clone(), value };
        self.write_envelope(key, &env)?;
        debug!("doc_store replace: {}", key);
        Ok(StoredDoc { etag, value: env.value })
    }

    fn delete(&self, key: &str) -> Result<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(DOCUMENTS_TABLE)?;
            table.remove(key)?;
        }
        write_txn.commit()?;
        debug!("doc_store delete: {}", key);
        Ok(())
    }

    fn query_prefix(&self, prefix: &str) -> Result<Vec<StoredDoc>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(DOCUMENTS_TABLE)?;

        let mut out = Vec::new();
        for entry in table.iter()? {
            let (k, v) = entry?;
            if k.value().starts_with(prefix) {
                let env: Envelope = serde_json::from_slice(v.value())?;
                out.push(StoredDoc {
                    etag: env.etag,
                    value: env.value,
                });
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn store() -> RedbDocStore {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.redb");
        std::mem::forget(dir);
        RedbDocStore::new(&path).unwrap()
    }

    #[test]
    fn create_then_get_roundtrips() {
        let store = store();
        let created = store.create("space/t1/corp", json!({"name": "corp"})).unwrap();
        let fetched = store.get("space/t1/corp").unwrap().unwrap();
        assert_eq!(fetched.etag, created.etag);
        assert_eq!(fetched.value, json!({"name": "corp"}));
    }

    #[test]
    fn create_twice_fails() {
        let store = store();
        store.create("space/t1/corp", json!({})).unwrap();
        assert!(store.create("space/t1/corp", json!({})).is_err());
    }

    #[test]
    fn replace_with_stale_etag_fails() {
        let store = store();
        let created = store.create("space/t1/corp", json!({"v": 1})).unwrap();
        store.replace("space/t1/corp", &created.etag, json!({"v": 2})).unwrap();

        // retry with the now-stale etag
        let result = store.replace("space/t1/corp", &created.etag, json!({"v": 3}));
        assert!(matches!(result, Err(StorageError::PreconditionFailed { .. })));
    }

    #[test]
    fn query_prefix_filters_by_tenant() {
        let store = store();
        store.create("space/t1/corp", json!({})).unwrap();
        store.create("space/t2/other", json!({})).unwrap();

        let docs = store.query_prefix("space/t1/").unwrap();
        assert_eq!(docs.len(), 1);
    }

    #[test]
    fn delete_removes_document() {
        let store = store();
        store.create("space/t1/corp", json!({})).unwrap();
        store.delete("space/t1/corp").unwrap();
        assert!(store.get("space/t1/corp").unwrap().is_none());
    }
}
