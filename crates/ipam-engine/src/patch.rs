//! Allow-listed JSON-Patch application (§4.5).
//!
//! The source dispatches against a per-entity table of `(op, path) ->
//! validator` at runtime. Here the allow-list is the type system: parsing a
//! wire patch into one of these enums *is* the allow-list check, and any
//! operation outside it (wrong verb, wrong path, non-string value) is
//! rejected at parse time rather than looked up in a table.

use crate::error::{EngineError, Result};
use json_patch::{PatchOperation, ReplaceOperation};
use serde_json::Value;

fn string_value(op: &ReplaceOperation) -> Result<String> {
    op.value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| EngineError::BadRequest("Patch value must be a string.".to_string()))
}

/// Parse one patch array against `allowed` paths, requiring every entry to
/// be a `replace` on one of them. Returns the accepted `(path, value)` pairs
/// in request order, or the first validation failure — the source rejects
/// the whole patch on the first bad entry rather than applying a prefix.
fn parse_replace_only(ops: &[PatchOperation], allowed: &[&str]) -> Result<Vec<(String, String)>> {
    let mut out = Vec::with_capacity(ops.len());
    for op in ops {
        match op {
            PatchOperation::Replace(r) => {
                let path = r.path.as_str();
                if !allowed.contains(&path) {
                    return Err(EngineError::BadRequest(format!(
                        "Patch path '{path}' is not permitted on this resource."
                    )));
                }
                out.push((path.to_string(), string_value(r)?));
            }
            _ => {
                return Err(EngineError::BadRequest(
                    "Only 'replace' operations are permitted.".to_string(),
                ));
            }
        }
    }
    Ok(out)
}

/// Space patch: `/name`, `/desc` (§6 `PATCH /{s}`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpacePatch {
    Name(String),
    Desc(String),
}

impl SpacePatch {
    pub fn parse(ops: &[PatchOperation]) -> Result<Vec<Self>> {
        parse_replace_only(ops, &["/name", "/desc"])?
            .into_iter()
            .map(|(path, value)| match path.as_str() {
                "/name" => Ok(SpacePatch::Name(value)),
                "/desc" => Ok(SpacePatch::Desc(value)),
                _ => unreachable!(),
            })
            .collect()
    }
}

/// Block patch: `/name`, `/cidr` (§6 `PATCH /{s}/blocks/{b}`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockPatch {
    Name(String),
    Cidr(String),
}

impl BlockPatch {
    pub fn parse(ops: &[PatchOperation]) -> Result<Vec<Self>> {
        parse_replace_only(ops, &["/name", "/cidr"])?
            .into_iter()
            .map(|(path, value)| match path.as_str() {
                "/name" => Ok(BlockPatch::Name(value)),
                "/cidr" => Ok(BlockPatch::Cidr(value)),
                _ => unreachable!(),
            })
            .collect()
    }
}

/// External-network patch: `/name`, `/desc`, `/cidr`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExternalPatch {
    Name(String),
    Desc(String),
    Cidr(String),
}

impl ExternalPatch {
    pub fn parse(ops: &[PatchOperation]) -> Result<Vec<Self>> {
        parse_replace_only(ops, &["/name", "/desc", "/cidr"])?
            .into_iter()
            .map(|(path, value)| match path.as_str() {
                "/name" => Ok(ExternalPatch::Name(value)),
                "/desc" => Ok(ExternalPatch::Desc(value)),
                "/cidr" => Ok(ExternalPatch::Cidr(value)),
                _ => unreachable!(),
            })
            .collect()
    }
}

/// Subnet patch: `/name`, `/desc`, `/cidr`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubnetPatch {
    Name(String),
    Desc(String),
    Cidr(String),
}

impl SubnetPatch {
    pub fn parse(ops: &[PatchOperation]) -> Result<Vec<Self>> {
        parse_replace_only(ops, &["/name", "/desc", "/cidr"])?
            .into_iter()
            .map(|(path, value)| match path.as_str() {
                "/name" => Ok(SubnetPatch::Name(value)),
                "/desc" => Ok(SubnetPatch::Desc(value)),
                "/cidr" => Ok(SubnetPatch::Cidr(value)),
                _ => unreachable!(),
            })
            .collect()
    }
}

/// Endpoint patch: `/name`, `/desc`, `/ip`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointPatch {
    Name(String),
    Desc(String),
    Ip(String),
}

impl EndpointPatch {
    pub fn parse(ops: &[PatchOperation]) -> Result<Vec<Self>> {
        parse_replace_only(ops, &["/name", "/desc", "/ip"])?
            .into_iter()
            .map(|(path, value)| match path.as_str() {
                "/name" => Ok(EndpointPatch::Name(value)),
                "/desc" => Ok(EndpointPatch::Desc(value)),
                "/ip" => Ok(EndpointPatch::Ip(value)),
                _ => unreachable!(),
            })
            .collect()
    }
}

/// True when `new_cidr` covers every prefix already carved out of the
/// container being shrunk/grown (the "replace /cidr must be a superset of
/// existing children" rule, §4.5). Equal-value replace always passes (P5).
pub fn cidr_replace_covers_children(new: &ipam_core::Prefix, children: &ipam_core::PrefixSet) -> bool {
    children.is_subset(&ipam_core::PrefixSet::from_prefixes([*new]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ipam_core::Prefix;
    use json_patch::{AddOperation, ReplaceOperation};
    use jsonptr::PointerBuf;

    fn replace(path: &str, value: &str) -> PatchOperation {
        PatchOperation::Replace(ReplaceOperation {
            path: PointerBuf::parse(path).unwrap(),
            value: Value::String(value.to_string()),
        })
    }

    #[test]
    fn space_patch_accepts_name_and_desc() {
        let ops = vec![replace("/name", "new-name"), replace("/desc", "new desc")];
        let parsed = SpacePatch::parse(&ops).unwrap();
        assert_eq!(parsed, vec![SpacePatch::Name("new-name".to_string()), SpacePatch::Desc("new desc".to_string())]);
    }

    #[test]
    fn space_patch_rejects_unlisted_path() {
        let ops = vec![replace("/tenant_id", "evil")];
        assert!(SpacePatch::parse(&ops).is_err());
    }

    #[test]
    fn block_patch_rejects_non_replace_ops() {
        let ops = vec![PatchOperation::Add(AddOperation {
            path: PointerBuf::parse("/name").unwrap(),
            value: Value::String("x".to_string()),
        })];
        assert!(BlockPatch::parse(&ops).is_err());
    }

    #[test]
    fn cidr_replace_covering_children_passes() {
        let child = Prefix::parse("10.0.200.0/24").unwrap();
        let children = ipam_core::PrefixSet::from_prefixes([child]);
        let bigger = Prefix::parse("10.0.0.0/16").unwrap();
        assert!(cidr_replace_covers_children(&bigger, &children));

        let smaller = Prefix::parse("10.0.0.0/17").unwrap();
        assert!(!cidr_replace_covers_children(&smaller, &children));
    }

    #[test]
    fn cidr_replace_equal_value_passes() {
        let child = Prefix::parse("10.0.0.0/16").unwrap();
        let children = ipam_core::PrefixSet::from_prefixes([child]);
        assert!(cidr_replace_covers_children(&child, &children));
    }
}
