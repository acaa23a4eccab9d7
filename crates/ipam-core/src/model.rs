//! The Space document schema (§3) and in-memory navigation helpers (§4.4).

use crate::algebra::{Prefix, PrefixSet};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const STATUS_WAIT: &str = "wait";
pub const STATUS_CANCELLED_BY_USER: &str = "cancelledByUser";

/// A single IPv4 host endpoint inside an external subnet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalEndpoint {
    pub name: String,
    pub desc: String,
    pub ip: String,
}

/// A prefix carved inside an external network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalSubnet {
    pub name: String,
    pub desc: String,
    pub cidr: String,
    #[serde(default)]
    pub endpoints: Vec<ExternalEndpoint>,
}

/// A block-contained prefix managed entirely inside the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalNetwork {
    pub name: String,
    pub desc: String,
    pub cidr: String,
    #[serde(default)]
    pub subnets: Vec<ExternalSubnet>,
}

/// A weak reference to a cloud-managed virtual network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VNetRef {
    pub id: String,
    pub active: bool,
}

/// A soft claim on a prefix inside a block, pending settlement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: String,
    pub cidr: String,
    pub desc: String,
    #[serde(rename = "createdOn")]
    pub created_on: f64,
    #[serde(rename = "createdBy")]
    pub created_by: String,
    #[serde(rename = "settledOn", default, skip_serializing_if = "Option::is_none")]
    pub settled_on: Option<f64>,
    #[serde(rename = "settledBy", default, skip_serializing_if = "Option::is_none")]
    pub settled_by: Option<String>,
    pub status: String,
}

impl Reservation {
    /// I8: unsettled iff `settledOn` is null.
    pub fn is_settled(&self) -> bool {
        self.settled_on.is_some()
    }
}

/// A single IPv4 prefix owned by a space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub name: String,
    pub cidr: String,
    #[serde(default)]
    pub vnets: Vec<VNetRef>,
    #[serde(default)]
    pub externals: Vec<ExternalNetwork>,
    #[serde(default)]
    pub resv: Vec<Reservation>,
}

impl Block {
    pub fn find_external(&self, name: &str) -> Option<&ExternalNetwork> {
        find_by_name(&self.externals, name)
    }

    pub fn find_external_mut(&mut self, name: &str) -> Option<&mut ExternalNetwork> {
        find_by_name_mut(&mut self.externals, name)
    }

    pub fn find_reservation(&self, id: &str) -> Option<&Reservation> {
        self.resv.iter().find(|r| r.id == id)
    }

    pub fn find_reservation_mut(&mut self, id: &str) -> Option<&mut Reservation> {
        self.resv.iter_mut().find(|r| r.id == id)
    }

    pub fn unsettled_reservation_set(&self) -> PrefixSet {
        PrefixSet::from_prefixes(
            self.resv
                .iter()
                .filter(|r| !r.is_settled())
                .filter_map(|r| Prefix::parse(&r.cidr).ok()),
        )
    }

    pub fn external_set(&self) -> PrefixSet {
        PrefixSet::from_prefixes(self.externals.iter().filter_map(|e| Prefix::parse(&e.cidr).ok()))
    }
}

impl ExternalNetwork {
    pub fn find_subnet(&self, name: &str) -> Option<&ExternalSubnet> {
        find_by_name(&self.subnets, name)
    }

    pub fn find_subnet_mut(&mut self, name: &str) -> Option<&mut ExternalSubnet> {
        find_by_name_mut(&mut self.subnets, name)
    }

    /// I5: union of subnet CIDRs.
    pub fn reserved_set(&self) -> PrefixSet {
        PrefixSet::from_prefixes(self.subnets.iter().filter_map(|s| Prefix::parse(&s.cidr).ok()))
    }
}

impl ExternalSubnet {
    pub fn find_endpoint(&self, name: &str) -> Option<&ExternalEndpoint> {
        find_by_name(&self.endpoints, name)
    }

    pub fn find_endpoint_mut(&mut self, name: &str) -> Option<&mut ExternalEndpoint> {
        find_by_name_mut(&mut self.endpoints, name)
    }

    /// I6: set of endpoint IPs in use.
    pub fn used_ips(&self) -> std::collections::HashSet<std::net::Ipv4Addr> {
        self.endpoints
            .iter()
            .filter_map(|e| e.ip.parse().ok())
            .collect()
    }
}

/// The root of a tenant's address namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Space {
    pub id: Uuid,
    pub tenant_id: String,
    pub name: String,
    pub desc: String,
    #[serde(default)]
    pub blocks: Vec<Block>,
}

impl Space {
    pub fn new(tenant_id: impl Into<String>, name: impl Into<String>, desc: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.into(),
            name: name.into(),
            desc: desc.into(),
            blocks: Vec::new(),
        }
    }

    pub fn find_block(&self, name: &str) -> Option<&Block> {
        find_by_name(&self.blocks, name)
    }

    pub fn find_block_mut(&mut self, name: &str) -> Option<&mut Block> {
        find_by_name_mut(&mut self.blocks, name)
    }

    /// I4: the union of every block's CIDR.
    pub fn block_set(&self) -> PrefixSet {
        PrefixSet::from_prefixes(self.blocks.iter().filter_map(|b| Prefix::parse(&b.cidr).ok()))
    }
}

/// Trait implemented by every named child collection element, giving
/// `find_by_name`/`find_by_name_mut` a single case-insensitive lookup (I4.4:
/// "never on id").
trait Named {
    fn name(&self) -> &str;
}

impl Named for Block {
    fn name(&self) -> &str {
        &self.name
    }
}
impl Named for ExternalNetwork {
    fn name(&self) -> &str {
        &self.name
    }
}
impl Named for ExternalSubnet {
    fn name(&self) -> &str {
        &self.name
    }
}
impl Named for ExternalEndpoint {
    fn name(&self) -> &str {
        &self.name
    }
}

fn find_by_name<'a, T: Named>(items: &'a [T], name: &str) -> Option<&'a T> {
    items.iter().find(|i| i.name().eq_ignore_ascii_case(name))
}

fn find_by_name_mut<'a, T: Named>(items: &'a mut [T], name: &str) -> Option<&'a mut T> {
    items.iter_mut().find(|i| i.name().eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_space() -> Space {
        let mut space = Space::new("tenant-a", "corp", "main");
        space.blocks.push(Block {
            name: "Blk1".to_string(),
            cidr: "10.0.0.0/16".to_string(),
            vnets: Vec::new(),
            externals: Vec::new(),
            resv: Vec::new(),
        });
        space
    }

    #[test]
    fn find_block_is_case_insensitive() {
        let space = sample_space();
        assert!(space.find_block("blk1").is_some());
        assert!(space.find_block("BLK1").is_some());
        assert!(space.find_block("blk2").is_none());
    }

    #[test]
    fn find_reservation_is_case_sensitive_on_id() {
        let mut block = Block {
            name: "blk1".to_string(),
            cidr: "10.0.0.0/16".to_string(),
            vnets: Vec::new(),
            externals: Vec::new(),
            resv: vec![Reservation {
                id: "AbC123".to_string(),
                cidr: "10.0.0.0/24".to_string(),
                desc: String::new(),
                created_on: 0.0,
                created_by: "alice".to_string(),
                settled_on: None,
                settled_by: None,
                status: STATUS_WAIT.to_string(),
            }],
        };
        assert!(block.find_reservation("AbC123").is_some());
        assert!(block.find_reservation("abc123").is_none());
        assert!(block.find_reservation_mut("AbC123").is_some());
    }

    #[test]
    fn unsettled_reservation_set_excludes_settled() {
        let block = Block {
            name: "blk1".to_string(),
            cidr: "10.0.0.0/16".to_string(),
            vnets: Vec::new(),
            externals: Vec::new(),
            resv: vec![
                Reservation {
                    id: "a".to_string(),
                    cidr: "10.0.0.0/24".to_string(),
                    desc: String::new(),
                    created_on: 0.0,
                    created_by: "alice".to_string(),
                    settled_on: None,
                    settled_by: None,
                    status: STATUS_WAIT.to_string(),
                },
                Reservation {
                    id: "b".to_string(),
                    cidr: "10.0.1.0/24".to_string(),
                    desc: String::new(),
                    created_on: 0.0,
                    created_by: "alice".to_string(),
                    settled_on: Some(1.0),
                    settled_by: Some("alice".to_string()),
                    status: STATUS_CANCELLED_BY_USER.to_string(),
                },
            ],
        };

        let set = block.unsettled_reservation_set();
        assert_eq!(set.total_size(), 256);
    }

    #[test]
    fn serde_roundtrip_uses_camel_case_timestamps() {
        let resv = Reservation {
            id: "r1".to_string(),
            cidr: "10.0.0.0/24".to_string(),
            desc: String::new(),
            created_on: 123.0,
            created_by: "alice".to_string(),
            settled_on: None,
            settled_by: None,
            status: STATUS_WAIT.to_string(),
        };
        let json = serde_json::to_string(&resv).unwrap();
        assert!(json.contains("\"createdOn\":123.0"));
        assert!(!json.contains("settledOn"));
    }
}
