//! IPAM Storage - document store abstraction and redb backend
//!
//! This crate provides:
//! - `DocStore` trait for per-tenant Space document persistence
//! - An ETag-based conditional-replace CAS, matching the "document store"
//!   external interface (no cross-document transactions — see TxnRunner)
//! - A redb-backed implementation and an in-memory one for tests

pub mod doc_store;
pub mod encoding;
pub mod error;
pub mod memory_store;
pub mod redb_store;

pub use doc_store::{DocStore, StoredDoc};
pub use encoding::KeyEncoder;
pub use error::{Result, StorageError};
pub use memory_store::InMemoryDocStore;
pub use redb_store::RedbDocStore;
