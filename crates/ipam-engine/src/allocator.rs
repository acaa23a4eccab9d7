//! Given a container's free set and a request, pick a prefix or report
//! unavailable (§4.3).

use crate::error::{EngineError, Result};
use ipam_core::validation::cidr_canonical;
use ipam_core::{Prefix, PrefixSet};

/// An allocation request against some container's free set.
#[derive(Debug, Clone)]
pub struct AllocRequest {
    /// Explicit CIDR mode when set; otherwise by-size.
    pub cidr: Option<String>,
    pub size: Option<u8>,
    pub reverse: bool,
    pub smallest: bool,
}

impl AllocRequest {
    pub fn by_size(size: u8) -> Self {
        Self {
            cidr: None,
            size: Some(size),
            reverse: false,
            smallest: false,
        }
    }

    pub fn explicit(cidr: impl Into<String>) -> Self {
        Self {
            cidr: Some(cidr.into()),
            size: None,
            reverse: false,
            smallest: false,
        }
    }

    pub fn reverse(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }

    pub fn smallest(mut self, smallest: bool) -> Self {
        self.smallest = smallest;
        self
    }
}

/// Allocate a prefix from `free` per `req`.
///
/// `container` bounds the explicit-CIDR mode's containment check (the
/// candidate must lie inside it); `unavailable_message` lets callers match
/// the source's per-endpoint wording ("...target block." vs
/// "...target block(s)." for the multi-block fallback).
pub fn allocate(
    free: &PrefixSet,
    container: &Prefix,
    req: &AllocRequest,
    unavailable_message: &str,
) -> Result<Prefix> {
    if let Some(cidr) = &req.cidr {
        return allocate_explicit(free, container, cidr);
    }

    let size = req
        .size
        .ok_or_else(|| EngineError::BadRequest("Either size or cidr must be supplied.".to_string()))?;

    let ascending = free.iter_cidrs();
    let ordered: Vec<Prefix> = if req.reverse {
        ascending.into_iter().rev().collect()
    } else {
        ascending
    };

    let fitting: Vec<Prefix> = ordered.into_iter().filter(|p| p.len() <= size).collect();
    if fitting.is_empty() {
        return Err(EngineError::InternalUnavailable(unavailable_message.to_string()));
    }

    let chosen = if req.smallest {
        best_fit(&fitting)
    } else {
        fitting[0]
    };

    let carved = if req.reverse {
        chosen.last_subnet(size)?
    } else {
        chosen.first_subnet(size)?
    };
    Ok(carved)
}

/// Among candidates already filtered to `prefixLen <= size`, pick the one
/// with the largest `prefixLen` (smallest address block), breaking ties by
/// keeping the first occurrence in `candidates`' order (P4).
fn best_fit(candidates: &[Prefix]) -> Prefix {
    let mut best = candidates[0];
    for &p in &candidates[1..] {
        if p.len() > best.len() {
            best = p;
        }
    }
    best
}

fn allocate_explicit(free: &PrefixSet, container: &Prefix, cidr: &str) -> Result<Prefix> {
    let requested = cidr_canonical(cidr)?;
    if !container.contains(&requested) {
        return Err(EngineError::BadRequest(format!(
            "Requested CIDR {} is not within container {}.",
            requested, container
        )));
    }
    if !free.contains_prefix(&requested) {
        return Err(EngineError::Conflict("Requested CIDR overlaps existing network(s).".to_string()));
    }
    Ok(requested)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block() -> Prefix {
        Prefix::parse("10.0.0.0/16").unwrap()
    }

    #[test]
    fn first_fit_ascending() {
        let free = PrefixSet::from_prefixes([block()]);
        let req = AllocRequest::by_size(24);
        let p = allocate(&free, &block(), &req, "unavailable").unwrap();
        assert_eq!(p.to_string(), "10.0.0.0/24");
    }

    #[test]
    fn first_fit_reverse_search() {
        let free = PrefixSet::from_prefixes([block()]);
        let req = AllocRequest::by_size(24).reverse(true);
        let p = allocate(&free, &block(), &req, "unavailable").unwrap();
        assert_eq!(p.to_string(), "10.0.255.0/24");
    }

    #[test]
    fn smallest_cidr_best_fit() {
        // already reserved 10.0.0.0/17, free is 10.0.128.0/17
        let free = PrefixSet::from_prefixes([Prefix::parse("10.0.128.0/17").unwrap()]);
        let req = AllocRequest::by_size(24).smallest(true);
        let p = allocate(&free, &block(), &req, "unavailable").unwrap();
        assert_eq!(p.to_string(), "10.0.128.0/24");
    }

    #[test]
    fn explicit_cidr_overlap_is_conflict() {
        let free = PrefixSet::from_prefixes([Prefix::parse("10.0.1.0/24").unwrap()]);
        let req = AllocRequest::explicit("10.0.0.0/24");
        let err = allocate(&free, &block(), &req, "unavailable").unwrap_err();
        assert!(matches!(err, EngineError::Conflict(_)));
    }

    #[test]
    fn explicit_cidr_outside_container_is_bad_request() {
        let free = PrefixSet::from_prefixes([block()]);
        let req = AllocRequest::explicit("10.1.0.0/24");
        let err = allocate(&free, &block(), &req, "unavailable").unwrap_err();
        assert!(matches!(err, EngineError::BadRequest(_)));
    }

    #[test]
    fn exhausted_pool_is_internal_unavailable() {
        let free = PrefixSet::new();
        let req = AllocRequest::by_size(24);
        let err = allocate(&free, &block(), &req, "Network of requested size unavailable in target block.").unwrap_err();
        assert_eq!(
            err,
            EngineError::InternalUnavailable("Network of requested size unavailable in target block.".to_string())
        );
    }
}
