use crate::Result;
use serde_json::Value;

/// A document as read from the store: the JSON value plus the opaque
/// version token (`etag`) used for optimistic concurrency.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDoc {
    pub etag: String,
    pub value: Value,
}

/// The per-tenant document store (§6, "Document store (consumed)").
///
/// There is exactly one document kind in this engine (the Space document),
/// so `DocStore` is narrower than the teacher's generic `KVStore`: no
/// transactions (spec §5 — no cross-document transactions are needed since
/// a tenant's whole hierarchy is one document), just conditional
/// read/create/replace/delete keyed by a single string.
pub trait DocStore: Send + Sync {
    /// Fetch a document by key.
    fn get(&self, key: &str) -> Result<Option<StoredDoc>>;

    /// Insert a new document. Fails with `StorageError::PreconditionFailed`
    /// if the key already exists (maps to the `upsert` of a brand-new
    /// document — the "already exists" case is a create-vs-replace decision
    /// made by the caller, not this trait).
    fn create(&self, key: &str, value: Value) -> Result<StoredDoc>;

    /// Conditionally replace a document: succeeds only if the stored
    /// document's current `etag` equals `expected_etag`; otherwise returns
    /// `StorageError::PreconditionFailed`.
    fn replace(&self, key: &str, expected_etag: &str, value: Value) -> Result<StoredDoc>;

    /// Delete a document unconditionally.
    fn delete(&self, key: &str) -> Result<()>;

    /// List every document whose key starts with `prefix`.
    fn query_prefix(&self, prefix: &str) -> Result<Vec<StoredDoc>>;
}
