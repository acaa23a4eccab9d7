//! IPAM Inventory - the external "network inventory" collaborator (§6)
//!
//! This crate provides only the interface the engine needs
//! (`NetworkInventory::get_network`) plus an in-memory implementation
//! used both by tests and as the default wiring when no real cloud
//! provider is configured — the small-trait-plus-mock split the teacher
//! uses for its own environment-agnostic collaborators.

pub mod error;

use async_trait::async_trait;
use ipam_core::Prefix;
use parking_lot::RwLock;
use std::collections::HashMap;

pub use error::{InventoryError, Result};

/// A subnet inside a vnet, as reported by the inventory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubnetInfo {
    pub name: String,
    pub prefix: Prefix,
}

/// A single cloud-managed virtual network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VNetInfo {
    pub id: String,
    pub prefixes: Vec<Prefix>,
    pub subnets: Option<Vec<SubnetInfo>>,
}

/// `get_network(auth, adminScope) -> [{id, prefixes[], subnets?}]` (§6).
#[async_trait]
pub trait NetworkInventory: Send + Sync {
    /// List every vnet visible to `tenant_id`. `admin_scope` widens the
    /// listing the same way the source's admin gate does — callers that are
    /// not admins only see vnets scoped to their own tenant regardless of
    /// this flag; the flag exists for parity with the external interface,
    /// since the admin/tenant scoping policy itself lives in `AuthContext`
    /// and `SpaceService`, not here.
    async fn get_network(&self, tenant_id: &str, admin_scope: bool) -> Result<Vec<VNetInfo>>;
}

/// A fixed, in-memory vnet registry, keyed by tenant.
#[derive(Default)]
pub struct InMemoryInventory {
    by_tenant: RwLock<HashMap<String, Vec<VNetInfo>>>,
}

impl InMemoryInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, tenant_id: impl Into<String>, vnet: VNetInfo) {
        self.by_tenant
            .write()
            .entry(tenant_id.into())
            .or_default()
            .push(vnet);
    }
}

#[async_trait]
impl NetworkInventory for InMemoryInventory {
    async fn get_network(&self, tenant_id: &str, _admin_scope: bool) -> Result<Vec<VNetInfo>> {
        Ok(self.by_tenant.read().get(tenant_id).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_network_scopes_by_tenant() {
        let inv = InMemoryInventory::new();
        inv.insert(
            "t1",
            VNetInfo {
                id: "vnet-a".to_string(),
                prefixes: vec![Prefix::parse("10.0.1.0/24").unwrap()],
                subnets: None,
            },
        );
        inv.insert(
            "t2",
            VNetInfo {
                id: "vnet-b".to_string(),
                prefixes: vec![Prefix::parse("10.0.2.0/24").unwrap()],
                subnets: None,
            },
        );

        let t1 = inv.get_network("t1", false).await.unwrap();
        assert_eq!(t1.len(), 1);
        assert_eq!(t1[0].id, "vnet-a");

        let unknown = inv.get_network("unknown", false).await.unwrap();
        assert!(unknown.is_empty());
    }
}
