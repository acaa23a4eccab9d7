//! Pure size/used rollup at space/block scope (§4.8).
//!
//! Vnet prefixes live in an external inventory, so the caller resolves and
//! intersects them against each block's CIDR first (§4.4's
//! `block_reserved_set` cross-reference step) and hands in the result as a
//! `PrefixSet` per block name; this module only sums sizes, and is
//! independent of block/vnet ordering (P6).

use crate::algebra::{Prefix, PrefixSet};
use crate::model::{Block, Space};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Utilization {
    pub size: u64,
    pub used: u64,
}

#[derive(Debug, Clone, Default)]
pub struct SpaceUtilization {
    pub total: Utilization,
    pub blocks: BTreeMap<String, Utilization>,
}

/// `size := |block.cidr|`; `used := Σ(vnet prefixes inside block) + Σ(external sizes)`.
pub fn block_utilization(block: &Block, vnets_in_block: &PrefixSet) -> Utilization {
    let size = Prefix::parse(&block.cidr).map(|p| p.size()).unwrap_or(0);
    let used = vnets_in_block.total_size() + block.external_set().total_size();
    Utilization { size, used }
}

/// Aggregate `block_utilization` across every block of a space. `vnets_by_block`
/// maps block name (as stored, not case-folded) to its already-resolved,
/// already-block-intersected vnet prefix set.
pub fn space_utilization(space: &Space, vnets_by_block: &BTreeMap<String, PrefixSet>) -> SpaceUtilization {
    let empty = PrefixSet::new();
    let mut out = SpaceUtilization::default();
    for block in &space.blocks {
        let vnets = vnets_by_block.get(&block.name).unwrap_or(&empty);
        let u = block_utilization(block, vnets);
        out.total.size += u.size;
        out.total.used += u.used;
        out.blocks.insert(block.name.clone(), u);
    }
    out
}

/// Sum of prefix sizes — used when expanding a vnet's inventory prefixes
/// (whole, not just the in-block portion) or a subnet's endpoint-bearing
/// size for the `expand=true` response shape.
pub fn sum_sizes(prefixes: &[Prefix]) -> u64 {
    prefixes.iter().map(|p| p.size()).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ExternalNetwork;

    fn block_with_external(cidr: &str, ext_cidr: &str) -> Block {
        Block {
            name: "blk1".to_string(),
            cidr: cidr.to_string(),
            vnets: Vec::new(),
            externals: vec![ExternalNetwork {
                name: "x".to_string(),
                desc: String::new(),
                cidr: ext_cidr.to_string(),
                subnets: Vec::new(),
            }],
            resv: Vec::new(),
        }
    }

    #[test]
    fn block_utilization_sums_vnets_and_externals() {
        let block = block_with_external("10.0.0.0/16", "10.0.1.0/24");
        let vnets = PrefixSet::from_prefixes([Prefix::parse("10.0.2.0/24").unwrap()]);
        let u = block_utilization(&block, &vnets);
        assert_eq!(u.size, 65536);
        assert_eq!(u.used, 256 + 256);
    }

    #[test]
    fn space_utilization_is_order_independent() {
        let mut space = Space::new("t", "corp", "");
        space.blocks.push(block_with_external("10.0.0.0/16", "10.0.1.0/24"));
        space.blocks.push(block_with_external("10.1.0.0/16", "10.1.1.0/24"));

        let by_block = BTreeMap::new();
        let forward = space_utilization(&space, &by_block);

        space.blocks.reverse();
        let reversed = space_utilization(&space, &by_block);

        assert_eq!(forward.total.size, reversed.total.size);
        assert_eq!(forward.total.used, reversed.total.used);
    }
}
