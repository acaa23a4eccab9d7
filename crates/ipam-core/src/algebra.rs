//! IPv4 prefix algebra: single prefixes and maximal, coalesced prefix sets.
//!
//! Individual addresses and prefix boundaries are tracked as `u64` so that a
//! set of ranges can represent the full `0.0.0.0/0` space (`2^32` addresses)
//! without overflow, the same way the teacher's IPAM keeps `u32` math exact
//! by never wrapping past the broadcast address.

use crate::error::{CoreError, Result};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// A single canonical IPv4 prefix: a network address together with a
/// prefix length, where the address has had its host bits masked off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Prefix {
    base: u32,
    len: u8,
}

impl Prefix {
    /// Build a canonical prefix, masking off any host bits in `base`.
    pub fn new(base: Ipv4Addr, len: u8) -> Result<Self> {
        if len > 32 {
            return Err(CoreError::invalid_prefix_len(len));
        }
        let masked = u32::from(base) & mask_for(len);
        Ok(Self { base: masked, len })
    }

    /// Parse a CIDR string, masking off host bits (non-canonical input is
    /// accepted here; callers that must reject non-canonical strings use
    /// `crate::validation::cidr_canonical`).
    pub fn parse(s: &str) -> Result<Self> {
        let (addr_part, len_part) = s
            .split_once('/')
            .ok_or_else(|| CoreError::invalid_cidr_format(s))?;

        let addr: Ipv4Addr = addr_part
            .parse()
            .map_err(|_| CoreError::invalid_cidr_format(s))?;
        let len: u8 = len_part
            .parse()
            .map_err(|_| CoreError::invalid_cidr_format(s))?;
        if len > 32 {
            return Err(CoreError::invalid_cidr_format(s));
        }

        Self::new(addr, len)
    }

    pub fn network(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.base)
    }

    pub fn len(&self) -> u8 {
        self.len
    }

    pub fn broadcast(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.end_inclusive())
    }

    /// First address, as a `u64` offset into the address space.
    pub fn start(&self) -> u64 {
        self.base as u64
    }

    /// One past the last address (half-open range end).
    pub fn end(&self) -> u64 {
        self.start() + self.size()
    }

    fn end_inclusive(&self) -> u32 {
        (self.end() - 1) as u32
    }

    /// Number of addresses covered, `2^(32-len)`.
    pub fn size(&self) -> u64 {
        1u64 << (32 - self.len as u32)
    }

    /// `self ⊇ other`.
    pub fn contains(&self, other: &Prefix) -> bool {
        self.len <= other.len && self.start() <= other.start() && other.end() <= self.end()
    }

    /// Whether `self` and `other` share any address.
    pub fn overlaps(&self, other: &Prefix) -> bool {
        self.start() < other.end() && other.start() < self.end()
    }

    /// Usable host addresses, per the source's historical /31 and /32
    /// handling: `/32` yields the address itself, `/31` yields nothing,
    /// everything else excludes the network and broadcast address.
    pub fn iter_hosts(&self) -> Vec<Ipv4Addr> {
        match self.len {
            32 => vec![self.network()],
            31 => Vec::new(),
            _ => {
                let first = self.start() + 1;
                let last = self.end() - 1; // exclusive end - 1 - 1 = broadcast - 1
                (first..last).map(|a| Ipv4Addr::from(a as u32)).collect()
            }
        }
    }

    /// Split this prefix into all subnets of length `new_len`.
    pub fn iter_subnets(&self, new_len: u8) -> Result<Vec<Prefix>> {
        if new_len < self.len || new_len > 32 {
            return Err(CoreError::invalid_prefix_len(new_len));
        }
        let step = 1u64 << (32 - new_len as u32);
        let mut out = Vec::new();
        let mut cur = self.start();
        while cur < self.end() {
            out.push(Prefix {
                base: cur as u32,
                len: new_len,
            });
            cur += step;
        }
        Ok(out)
    }

    /// The first subnet of length `new_len` inside this prefix.
    pub fn first_subnet(&self, new_len: u8) -> Result<Prefix> {
        if new_len < self.len || new_len > 32 {
            return Err(CoreError::invalid_prefix_len(new_len));
        }
        Ok(Prefix {
            base: self.base,
            len: new_len,
        })
    }

    /// The last subnet of length `new_len` inside this prefix.
    pub fn last_subnet(&self, new_len: u8) -> Result<Prefix> {
        if new_len < self.len || new_len > 32 {
            return Err(CoreError::invalid_prefix_len(new_len));
        }
        let step = 1u64 << (32 - new_len as u32);
        let base = self.end() - step;
        Ok(Prefix {
            base: base as u32,
            len: new_len,
        })
    }
}

fn mask_for(len: u8) -> u32 {
    if len == 0 {
        0
    } else {
        (!0u32) << (32 - len as u32)
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network(), self.len)
    }
}

impl FromStr for Prefix {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// A set of IPv4 prefixes, always kept as a sorted, merged list of
/// half-open ranges `[start, end)`. `iter_cidrs` converts each merged range
/// back to the maximal ordered list of CIDR blocks that exactly covers it —
/// a range need not itself be CIDR-aligned (e.g. a union of two adjacent
/// /25s is a /24, but a union of a /24 and the following /25 is not a
/// single block and yields two).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrefixSet {
    ranges: Vec<(u64, u64)>,
}

impl PrefixSet {
    pub fn new() -> Self {
        Self { ranges: Vec::new() }
    }

    pub fn from_prefixes<I: IntoIterator<Item = Prefix>>(iter: I) -> Self {
        let ranges: Vec<(u64, u64)> = iter.into_iter().map(|p| (p.start(), p.end())).collect();
        Self {
            ranges: merge_ranges(ranges),
        }
    }

    pub fn insert(&mut self, p: Prefix) {
        self.ranges.push((p.start(), p.end()));
        self.ranges = merge_ranges(std::mem::take(&mut self.ranges));
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn union(&self, other: &PrefixSet) -> PrefixSet {
        let mut ranges = self.ranges.clone();
        ranges.extend_from_slice(&other.ranges);
        PrefixSet {
            ranges: merge_ranges(ranges),
        }
    }

    pub fn intersect(&self, other: &PrefixSet) -> PrefixSet {
        PrefixSet {
            ranges: intersect_ranges(&self.ranges, &other.ranges),
        }
    }

    /// `self - other`.
    pub fn difference(&self, other: &PrefixSet) -> PrefixSet {
        PrefixSet {
            ranges: subtract_ranges(&self.ranges, &other.ranges),
        }
    }

    /// Symmetric difference (XOR): addresses in exactly one of the two sets.
    pub fn symmetric_difference(&self, other: &PrefixSet) -> PrefixSet {
        self.difference(other).union(&other.difference(self))
    }

    pub fn is_subset(&self, other: &PrefixSet) -> bool {
        self.difference(other).is_empty()
    }

    pub fn contains_prefix(&self, p: &Prefix) -> bool {
        let singleton = PrefixSet::from_prefixes([*p]);
        singleton.is_subset(self)
    }

    pub fn overlaps_prefix(&self, p: &Prefix) -> bool {
        !intersect_ranges(&self.ranges, &[(p.start(), p.end())]).is_empty()
    }

    pub fn total_size(&self) -> u64 {
        self.ranges.iter().map(|(s, e)| e - s).sum()
    }

    /// Ascending, maximal, non-overlapping CIDR blocks covering this set.
    pub fn iter_cidrs(&self) -> Vec<Prefix> {
        self.ranges
            .iter()
            .flat_map(|&(s, e)| range_to_prefixes(s, e))
            .collect()
    }
}

fn merge_ranges(mut ranges: Vec<(u64, u64)>) -> Vec<(u64, u64)> {
    ranges.sort_unstable();
    let mut out: Vec<(u64, u64)> = Vec::with_capacity(ranges.len());
    for (s, e) in ranges {
        if s >= e {
            continue;
        }
        if let Some(last) = out.last_mut() {
            if s <= last.1 {
                if e > last.1 {
                    last.1 = e;
                }
                continue;
            }
        }
        out.push((s, e));
    }
    out
}

fn intersect_ranges(a: &[(u64, u64)], b: &[(u64, u64)]) -> Vec<(u64, u64)> {
    let mut out = Vec::new();
    let (mut i, mut j) = (0usize, 0usize);
    while i < a.len() && j < b.len() {
        let (s1, e1) = a[i];
        let (s2, e2) = b[j];
        let s = s1.max(s2);
        let e = e1.min(e2);
        if s < e {
            out.push((s, e));
        }
        if e1 < e2 {
            i += 1;
        } else {
            j += 1;
        }
    }
    out
}

fn subtract_ranges(a: &[(u64, u64)], b: &[(u64, u64)]) -> Vec<(u64, u64)> {
    let mut out = Vec::new();
    for &(s0, e0) in a {
        let mut cur = s0;
        for &(s, e) in b {
            if e <= cur || s >= e0 {
                continue;
            }
            if s > cur {
                out.push((cur, s.min(e0)));
            }
            cur = cur.max(e);
            if cur >= e0 {
                break;
            }
        }
        if cur < e0 {
            out.push((cur, e0));
        }
    }
    out
}

/// Decompose a half-open address range into the maximal ordered list of
/// CIDR-aligned blocks that exactly tile it.
fn range_to_prefixes(mut start: u64, end: u64) -> Vec<Prefix> {
    let mut out = Vec::new();
    while start < end {
        let remaining = end - start;
        let align_bits = if start == 0 { 32 } else { start.trailing_zeros() };
        let align_size = 1u64 << align_bits.min(32);

        let mut size_by_remaining = 1u64;
        while size_by_remaining * 2 <= remaining {
            size_by_remaining *= 2;
        }

        let block_size = align_size.min(size_by_remaining);
        let exp = block_size.trailing_zeros() as u8;
        let len = 32 - exp;

        out.push(Prefix {
            base: start as u32,
            len,
        });
        start += block_size;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display_roundtrip() {
        let p = Prefix::parse("10.0.0.0/16").unwrap();
        assert_eq!(p.to_string(), "10.0.0.0/16");
        assert_eq!(p.size(), 65536);
    }

    #[test]
    fn parse_masks_host_bits() {
        let p = Prefix::parse("10.0.0.5/24").unwrap();
        assert_eq!(p.to_string(), "10.0.0.0/24");
    }

    #[test]
    fn contains_and_overlaps() {
        let block = Prefix::parse("10.0.0.0/16").unwrap();
        let inner = Prefix::parse("10.0.1.0/24").unwrap();
        let outer = Prefix::parse("10.1.0.0/24").unwrap();
        assert!(block.contains(&inner));
        assert!(!block.contains(&outer));
        assert!(block.overlaps(&inner));
        assert!(!block.overlaps(&outer));
    }

    #[test]
    fn iter_hosts_matches_source_edge_cases() {
        let slash24 = Prefix::parse("10.0.0.0/24").unwrap();
        assert_eq!(slash24.iter_hosts().len(), 254);

        let slash31 = Prefix::parse("10.0.0.0/31").unwrap();
        assert!(slash31.iter_hosts().is_empty());

        let slash32 = Prefix::parse("10.0.0.5/32").unwrap();
        assert_eq!(slash32.iter_hosts(), vec![Ipv4Addr::new(10, 0, 0, 5)]);
    }

    #[test]
    fn iter_subnets_subdivides() {
        let block = Prefix::parse("10.0.0.0/24").unwrap();
        let subnets = block.iter_subnets(26).unwrap();
        assert_eq!(subnets.len(), 4);
        assert_eq!(subnets[0].to_string(), "10.0.0.0/26");
        assert_eq!(subnets[3].to_string(), "10.0.0.192/26");
    }

    #[test]
    fn first_and_last_subnet() {
        let block = Prefix::parse("10.0.0.0/16").unwrap();
        assert_eq!(block.first_subnet(24).unwrap().to_string(), "10.0.0.0/24");
        assert_eq!(block.last_subnet(24).unwrap().to_string(), "10.0.255.0/24");
    }

    #[test]
    fn prefix_set_union_coalesces_adjacent_blocks() {
        let set = PrefixSet::from_prefixes([
            Prefix::parse("10.0.0.0/25").unwrap(),
            Prefix::parse("10.0.0.128/25").unwrap(),
        ]);
        let cidrs = set.iter_cidrs();
        assert_eq!(cidrs, vec![Prefix::parse("10.0.0.0/24").unwrap()]);
    }

    #[test]
    fn prefix_set_union_non_coalescable_stays_two_blocks() {
        // a /24 followed by the next /25: union is not itself CIDR-aligned
        let set = PrefixSet::from_prefixes([
            Prefix::parse("10.0.0.0/24").unwrap(),
            Prefix::parse("10.0.1.0/25").unwrap(),
        ]);
        let cidrs = set.iter_cidrs();
        assert_eq!(cidrs.len(), 2);
        assert_eq!(cidrs[0].to_string(), "10.0.0.0/24");
        assert_eq!(cidrs[1].to_string(), "10.0.1.0/25");
    }

    #[test]
    fn difference_and_xor() {
        let whole = PrefixSet::from_prefixes([Prefix::parse("10.0.0.0/24").unwrap()]);
        let reserved = PrefixSet::from_prefixes([Prefix::parse("10.0.0.0/25").unwrap()]);
        let free = whole.difference(&reserved);
        assert_eq!(free.iter_cidrs(), vec![Prefix::parse("10.0.0.128/25").unwrap()]);

        let xor = whole.symmetric_difference(&reserved);
        assert_eq!(xor.iter_cidrs(), vec![Prefix::parse("10.0.0.128/25").unwrap()]);
    }

    #[test]
    fn is_subset_and_overlaps() {
        let whole = PrefixSet::from_prefixes([Prefix::parse("10.0.0.0/24").unwrap()]);
        let inner = PrefixSet::from_prefixes([Prefix::parse("10.0.0.0/25").unwrap()]);
        assert!(inner.is_subset(&whole));
        assert!(!whole.is_subset(&inner));

        assert!(whole.overlaps_prefix(&Prefix::parse("10.0.0.128/25").unwrap()));
        assert!(!whole.overlaps_prefix(&Prefix::parse("10.1.0.0/25").unwrap()));
    }

    #[test]
    fn total_size_sums_ranges() {
        let set = PrefixSet::from_prefixes([
            Prefix::parse("10.0.0.0/25").unwrap(),
            Prefix::parse("10.0.1.0/25").unwrap(),
        ]);
        assert_eq!(set.total_size(), 256);
    }

    #[test]
    fn iter_cidrs_ascending_and_maximal() {
        let set = PrefixSet::from_prefixes([
            Prefix::parse("10.0.1.0/24").unwrap(),
            Prefix::parse("10.0.0.0/24").unwrap(),
        ]);
        let cidrs = set.iter_cidrs();
        assert_eq!(cidrs, vec![Prefix::parse("10.0.0.0/23").unwrap()]);
    }
}
