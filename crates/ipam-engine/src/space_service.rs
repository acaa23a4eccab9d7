//! The SpaceService (§4.7): every Space/Block/External/Subnet/Endpoint/
//! Reservation operation in §6's HTTP surface, transport-agnostic. Each
//! mutating method composes `TxnRunner::run_mutation` with validation drawn
//! from `ipam_core::validation`, allocation from `allocator`, and allow-listed
//! patches from `patch`. Reads go straight through `TxnRunner::read` /
//! `query_prefix` and are reshaped into `*View` types that fold in the
//! inventory snapshot and the caller's admin scope.

use crate::allocator::{allocate, AllocRequest};
use crate::auth::AuthContext;
use crate::error::{EngineError, Result};
use crate::patch::{
    cidr_replace_covers_children, BlockPatch, EndpointPatch, ExternalPatch, SpacePatch, SubnetPatch,
};
use crate::txn::TxnRunner;
use ipam_core::utilization::{block_utilization, space_utilization, sum_sizes, SpaceUtilization, Utilization};
use ipam_core::validation::{cidr_canonical, host_ok, validate_desc, validate_name};
use ipam_core::{
    Block, ExternalEndpoint, ExternalNetwork, ExternalSubnet, Prefix, PrefixSet, Reservation, Space,
    VNetRef, STATUS_CANCELLED_BY_USER, STATUS_WAIT,
};
use ipam_inventory::{NetworkInventory, VNetInfo};
use ipam_storage::{DocStore, KeyEncoder};
use json_patch::PatchOperation;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

const BASE57_ALPHABET: &[u8] = b"23456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// A short, URL-friendly reservation id (§6: "short-UUID, ~22 chars"):
/// a v4 UUID's 128 bits, base57-encoded.
fn short_uuid() -> String {
    let mut num = Uuid::new_v4().as_u128();
    if num == 0 {
        return (BASE57_ALPHABET[0] as char).to_string();
    }
    let base = BASE57_ALPHABET.len() as u128;
    let mut out = Vec::new();
    while num > 0 {
        out.push(BASE57_ALPHABET[(num % base) as usize]);
        num /= base;
    }
    out.reverse();
    String::from_utf8(out).expect("alphabet is ASCII")
}

fn now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// The prefixes of vnets attached to `block` that actually fall within it,
/// resolved against the inventory snapshot taken for this request (§4.4).
/// A vnet id with no matching inventory entry contributes nothing — the
/// source treats a stale/unknown attachment as an empty set rather than an
/// error.
fn vnet_prefixes_in_block(block: &Block, all_vnets: &[VNetInfo]) -> PrefixSet {
    let Ok(block_cidr) = Prefix::parse(&block.cidr) else {
        return PrefixSet::new();
    };
    let mut set = PrefixSet::new();
    for vref in &block.vnets {
        if let Some(info) = all_vnets.iter().find(|v| v.id == vref.id) {
            for p in info.prefixes.iter().filter(|p| block_cidr.contains(p)) {
                set.insert(*p);
            }
        }
    }
    set
}

/// Everything already claimed inside a block: attached vnets, external
/// networks, and unsettled reservations (the set any new allocation or
/// attachment must avoid).
fn block_claimed_set(block: &Block, all_vnets: &[VNetInfo]) -> PrefixSet {
    vnet_prefixes_in_block(block, all_vnets)
        .union(&block.external_set())
        .union(&block.unsettled_reservation_set())
}

/// Request body for `POST .../resv` (single block).
#[derive(Debug, Clone, Deserialize)]
pub struct ReservationRequest {
    pub size: Option<u8>,
    pub cidr: Option<String>,
    pub desc: String,
    #[serde(default)]
    pub reverse_search: bool,
    #[serde(default)]
    pub smallest_cidr: bool,
}

/// Request body for `POST /{s}/resv` (candidate blocks tried in order).
#[derive(Debug, Clone, Deserialize)]
pub struct MultiBlockReservationRequest {
    pub blocks: Vec<String>,
    pub size: Option<u8>,
    pub cidr: Option<String>,
    pub desc: String,
    #[serde(default)]
    pub reverse_search: bool,
    #[serde(default)]
    pub smallest_cidr: bool,
}

fn allocate_reservation(
    block: &Block,
    all_vnets: &[VNetInfo],
    req: &ReservationRequest,
    user_name: &str,
    created_on: f64,
    unavailable_message: &str,
) -> Result<Reservation> {
    let block_cidr = Prefix::parse(&block.cidr)?;
    let free = PrefixSet::from_prefixes([block_cidr]).difference(&block_claimed_set(block, all_vnets));
    let alloc_req = AllocRequest {
        cidr: req.cidr.clone(),
        size: req.size,
        reverse: req.reverse_search,
        smallest: req.smallest_cidr,
    };
    let allocated = allocate(&free, &block_cidr, &alloc_req, unavailable_message)?;

    Ok(Reservation {
        id: short_uuid(),
        cidr: allocated.to_string(),
        desc: req.desc.clone(),
        created_on,
        created_by: user_name.to_string(),
        settled_on: None,
        settled_by: None,
        status: STATUS_WAIT.to_string(),
    })
}

/// A vnet as shown to a caller: bare `{id, active}` normally, or — with
/// `expand` — its in-block prefixes, subnets, and (with `utilization`)
/// size/used figures (§4.8).
#[derive(Debug, Clone, Serialize)]
pub struct VNetView {
    pub id: String,
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefixes: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subnets: Option<Vec<SubnetView>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub used: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubnetView {
    pub name: String,
    pub prefix: String,
    pub size: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BlockView {
    pub name: String,
    pub cidr: String,
    pub vnets: Vec<VNetView>,
    pub externals: Vec<ExternalNetwork>,
    pub resv: Vec<Reservation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utilization: Option<Utilization>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SpaceView {
    pub id: Uuid,
    pub tenant_id: String,
    pub name: String,
    pub desc: String,
    pub blocks: Vec<BlockView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utilization: Option<SpaceUtilization>,
}

fn build_vnet_view(vref: &VNetRef, all_vnets: &[VNetInfo], expand: bool, utilization: bool) -> VNetView {
    if !expand {
        return VNetView {
            id: vref.id.clone(),
            active: vref.active,
            prefixes: None,
            subnets: None,
            size: None,
            used: None,
        };
    }
    let info = all_vnets.iter().find(|v| v.id == vref.id);
    let prefixes: Vec<String> = info.map(|i| i.prefixes.iter().map(|p| p.to_string()).collect()).unwrap_or_default();
    let size_val = info.map(|i| sum_sizes(&i.prefixes)).unwrap_or(0);
    let subnets: Option<Vec<SubnetView>> = info.and_then(|i| i.subnets.as_ref()).map(|subs| {
        subs.iter()
            .map(|s| SubnetView {
                name: s.name.clone(),
                prefix: s.prefix.to_string(),
                size: s.prefix.size(),
            })
            .collect()
    });
    let used_val = subnets.as_ref().map(|s| s.iter().map(|x| x.size).sum()).unwrap_or(size_val);
    VNetView {
        id: vref.id.clone(),
        active: vref.active,
        prefixes: Some(prefixes),
        subnets,
        size: if utilization { Some(size_val) } else { None },
        used: if utilization { Some(used_val) } else { None },
    }
}

/// Non-admin callers only ever see their own reservations on any
/// block-returning read path (SPEC_FULL.md §B).
fn visible_reservations(resv: &[Reservation], auth: &AuthContext) -> Vec<Reservation> {
    if auth.is_admin {
        resv.to_vec()
    } else {
        resv.iter().filter(|r| r.created_by == auth.user_name).cloned().collect()
    }
}

fn build_block_view(block: &Block, all_vnets: &[VNetInfo], expand: bool, utilization: bool, auth: &AuthContext) -> BlockView {
    let vnets = block.vnets.iter().map(|v| build_vnet_view(v, all_vnets, expand, utilization)).collect();
    let util = if utilization {
        Some(block_utilization(block, &vnet_prefixes_in_block(block, all_vnets)))
    } else {
        None
    };
    BlockView {
        name: block.name.clone(),
        cidr: block.cidr.clone(),
        vnets,
        externals: block.externals.clone(),
        resv: visible_reservations(&block.resv, auth),
        utilization: util,
    }
}

fn build_space_view(space: &Space, all_vnets: &[VNetInfo], expand: bool, utilization: bool, auth: &AuthContext) -> SpaceView {
    let blocks: Vec<BlockView> = space
        .blocks
        .iter()
        .map(|b| build_block_view(b, all_vnets, expand, utilization, auth))
        .collect();
    // A fresh accumulator per call: the source's `GET /{s}` utilization
    // rollup aliases one dict across blocks and double-counts past the
    // first; this rewrite can't reproduce that by construction (SPEC_FULL.md
    // §B, DESIGN.md Open Question decisions).
    let utilization_val = if utilization {
        let by_block: BTreeMap<String, PrefixSet> = space
            .blocks
            .iter()
            .map(|b| (b.name.clone(), vnet_prefixes_in_block(b, all_vnets)))
            .collect();
        Some(space_utilization(space, &by_block))
    } else {
        None
    };
    SpaceView {
        id: space.id,
        tenant_id: space.tenant_id.clone(),
        name: space.name.clone(),
        desc: space.desc.clone(),
        blocks,
        utilization: utilization_val,
    }
}

/// Every vnet id attached to any block in the tenant other than
/// `(exclude_space_id, exclude_block)`. Used to keep `available` from
/// offering a vnet that's already claimed elsewhere — by direct id
/// membership rather than the source's index-zero-only check (§9(c),
/// DESIGN.md Open Question decisions).
fn vnet_ids_attached_elsewhere(spaces: &[Space], exclude_space_id: Uuid, exclude_block: &str) -> HashSet<String> {
    let mut ids = HashSet::new();
    for space in spaces {
        for block in &space.blocks {
            if space.id == exclude_space_id && block.name.eq_ignore_ascii_case(exclude_block) {
                continue;
            }
            for v in &block.vnets {
                ids.insert(v.id.clone());
            }
        }
    }
    ids
}

pub struct SpaceService {
    txn: TxnRunner,
    inventory: Arc<dyn NetworkInventory>,
}

impl SpaceService {
    pub fn new(store: Arc<dyn DocStore>, inventory: Arc<dyn NetworkInventory>) -> Self {
        Self {
            txn: TxnRunner::new(store),
            inventory,
        }
    }

    fn require_admin(&self, auth: &AuthContext) -> Result<()> {
        if auth.is_admin {
            Ok(())
        } else {
            Err(EngineError::Forbidden("This operation requires admin scope.".to_string()))
        }
    }

    // ---------------------------------------------------------------- spaces

    pub async fn list_spaces(&self, auth: &AuthContext, expand: bool, utilization: bool) -> Result<Vec<SpaceView>> {
        if expand {
            self.require_admin(auth)?;
        }
        let spaces = self.txn.query_prefix(&KeyEncoder::tenant_prefix(&auth.tenant_id))?;
        let all_vnets = self.inventory.get_network(&auth.tenant_id, auth.is_admin).await?;
        Ok(spaces.iter().map(|s| build_space_view(s, &all_vnets, expand, utilization, auth)).collect())
    }

    pub async fn create_space(&self, auth: &AuthContext, name: String, desc: String) -> Result<Space> {
        self.require_admin(auth)?;
        validate_name(&name)?;
        validate_desc(&desc)?;
        let space = Space::new(auth.tenant_id.clone(), name.clone(), desc);
        self.txn.create(&KeyEncoder::space_key(&auth.tenant_id, &name), space)
    }

    pub async fn get_space(&self, auth: &AuthContext, space: &str, expand: bool, utilization: bool) -> Result<SpaceView> {
        if expand {
            self.require_admin(auth)?;
        }
        let doc = self.txn.read(&KeyEncoder::space_key(&auth.tenant_id, space))?;
        let all_vnets = self.inventory.get_network(&auth.tenant_id, auth.is_admin).await?;
        Ok(build_space_view(&doc, &all_vnets, expand, utilization, auth))
    }

    /// A name change moves the document to a new storage key (§3: spaces are
    /// keyed by lower-cased name). That move isn't wrapped in the same
    /// single-key OCC loop as the rest of `patch_*`: it reads, validates, and
    /// performs a create-at-new-key-then-delete-old-key pair, so a racing
    /// writer on the old document sees a plain "already exists" rather than
    /// a retried merge.
    pub async fn patch_space(&self, auth: &AuthContext, space: &str, ops: &[PatchOperation]) -> Result<Space> {
        self.require_admin(auth)?;
        let patches = SpacePatch::parse(ops)?;
        let old_key = KeyEncoder::space_key(&auth.tenant_id, space);

        let renamed_to = patches.iter().find_map(|p| if let SpacePatch::Name(n) = p { Some(n.clone()) } else { None });

        if let Some(new_name) = renamed_to {
            validate_name(&new_name)?;
            let mut current = self.txn.read(&old_key)?;
            for patch in &patches {
                match patch {
                    SpacePatch::Name(n) => current.name = n.clone(),
                    SpacePatch::Desc(d) => {
                        validate_desc(d)?;
                        current.desc = d.clone();
                    }
                }
            }
            let new_key = KeyEncoder::space_key(&auth.tenant_id, &new_name);
            let created = self.txn.create(&new_key, current)?;
            self.txn.delete(&old_key)?;
            return Ok(created);
        }

        self.txn.run_mutation(&old_key, move |mut doc| {
            for patch in &patches {
                if let SpacePatch::Desc(d) = patch {
                    validate_desc(d)?;
                    doc.desc = d.clone();
                }
            }
            Ok(doc)
        })
    }

    pub async fn delete_space(&self, auth: &AuthContext, space: &str, force: bool) -> Result<()> {
        self.require_admin(auth)?;
        let key = KeyEncoder::space_key(&auth.tenant_id, space);
        let doc = self.txn.read(&key)?;
        if !force && !doc.blocks.is_empty() {
            return Err(EngineError::BadRequest(
                "Space contains block(s); pass force to delete anyway.".to_string(),
            ));
        }
        self.txn.delete(&key)
    }

    // ---------------------------------------------------------------- blocks

    pub async fn list_blocks(&self, auth: &AuthContext, space: &str, utilization: bool) -> Result<Vec<BlockView>> {
        let doc = self.txn.read(&KeyEncoder::space_key(&auth.tenant_id, space))?;
        let all_vnets = self.inventory.get_network(&auth.tenant_id, auth.is_admin).await?;
        Ok(doc.blocks.iter().map(|b| build_block_view(b, &all_vnets, false, utilization, auth)).collect())
    }

    pub async fn create_block(&self, auth: &AuthContext, space: &str, name: String, cidr: String) -> Result<Block> {
        self.require_admin(auth)?;
        validate_name(&name)?;
        let parsed_cidr = cidr_canonical(&cidr)?;
        let lookup_name = name.clone();
        let mutated = self.txn.run_mutation(&KeyEncoder::space_key(&auth.tenant_id, space), move |mut doc| {
            if doc.find_block(&name).is_some() {
                return Err(EngineError::BadRequest(
                    "A block with that name already exists in this space.".to_string(),
                ));
            }
            if doc.block_set().overlaps_prefix(&parsed_cidr) {
                return Err(EngineError::BadRequest(
                    "Block CIDR overlaps an existing block in this space.".to_string(),
                ));
            }
            doc.blocks.push(Block {
                name: name.clone(),
                cidr: parsed_cidr.to_string(),
                vnets: Vec::new(),
                externals: Vec::new(),
                resv: Vec::new(),
            });
            Ok(doc)
        })?;
        mutated.find_block(&lookup_name).cloned().ok_or_else(|| EngineError::InternalUnavailable("block vanished".to_string()))
    }

    pub async fn get_block(&self, auth: &AuthContext, space: &str, block_name: &str, utilization: bool) -> Result<BlockView> {
        let doc = self.txn.read(&KeyEncoder::space_key(&auth.tenant_id, space))?;
        let block = doc.find_block(block_name).ok_or_else(|| EngineError::BadRequest("Invalid block name.".to_string()))?;
        let all_vnets = self.inventory.get_network(&auth.tenant_id, auth.is_admin).await?;
        Ok(build_block_view(block, &all_vnets, false, utilization, auth))
    }

    pub async fn patch_block(&self, auth: &AuthContext, space: &str, block_name: &str, ops: &[PatchOperation]) -> Result<Block> {
        self.require_admin(auth)?;
        let patches = BlockPatch::parse(ops)?;
        let final_name = patches
            .iter()
            .find_map(|p| if let BlockPatch::Name(n) = p { Some(n.clone()) } else { None })
            .unwrap_or_else(|| block_name.to_string());
        let all_vnets = self.inventory.get_network(&auth.tenant_id, auth.is_admin).await?;
        let block_name_owned = block_name.to_string();
        let mutated = self.txn.run_mutation(&KeyEncoder::space_key(&auth.tenant_id, space), move |mut doc| {
            let other_blocks = PrefixSet::from_prefixes(
                doc.blocks
                    .iter()
                    .filter(|b| !b.name.eq_ignore_ascii_case(&block_name_owned))
                    .filter_map(|b| Prefix::parse(&b.cidr).ok()),
            );
            let block = doc.find_block_mut(&block_name_owned).ok_or_else(|| EngineError::BadRequest("Invalid block name.".to_string()))?;
            for patch in &patches {
                match patch {
                    BlockPatch::Name(n) => {
                        validate_name(n)?;
                        block.name = n.clone();
                    }
                    BlockPatch::Cidr(c) => {
                        let new_cidr = cidr_canonical(c)?;
                        let children = block_claimed_set(block, &all_vnets);
                        if !cidr_replace_covers_children(&new_cidr, &children) {
                            return Err(EngineError::BadRequest(
                                "Updated CIDR does not cover this block's existing allocations.".to_string(),
                            ));
                        }
                        if other_blocks.overlaps_prefix(&new_cidr) {
                            return Err(EngineError::BadRequest(
                                "Updated CIDR cannot overlap other Block CIDRs within the Space.".to_string(),
                            ));
                        }
                        block.cidr = new_cidr.to_string();
                    }
                }
            }
            Ok(doc)
        })?;
        mutated.find_block(&final_name).cloned().ok_or_else(|| EngineError::InternalUnavailable("block vanished".to_string()))
    }

    pub async fn delete_block(&self, auth: &AuthContext, space: &str, block_name: &str, force: bool) -> Result<()> {
        self.require_admin(auth)?;
        let block_name_owned = block_name.to_string();
        self.txn.run_mutation(&KeyEncoder::space_key(&auth.tenant_id, space), move |mut doc| {
            let idx = doc
                .blocks
                .iter()
                .position(|b| b.name.eq_ignore_ascii_case(&block_name_owned))
                .ok_or_else(|| EngineError::BadRequest("Invalid block name.".to_string()))?;
            let block = &doc.blocks[idx];
            let non_empty = !block.vnets.is_empty() || !block.externals.is_empty() || block.resv.iter().any(|r| !r.is_settled());
            if non_empty && !force {
                return Err(EngineError::BadRequest("Block is not empty; pass force to delete anyway.".to_string()));
            }
            doc.blocks.remove(idx);
            Ok(doc)
        })?;
        Ok(())
    }

    // ------------------------------------------------------------- networks

    pub async fn available_block_nets(&self, auth: &AuthContext, space: &str, block_name: &str, expand: bool) -> Result<Vec<VNetView>> {
        let doc = self.txn.read(&KeyEncoder::space_key(&auth.tenant_id, space))?;
        let block = doc.find_block(block_name).ok_or_else(|| EngineError::BadRequest("Invalid block name.".to_string()))?;
        let block_cidr = Prefix::parse(&block.cidr)?;
        let reserved = block.external_set().union(&block.unsettled_reservation_set());

        let all_vnets = self.inventory.get_network(&auth.tenant_id, auth.is_admin).await?;
        let all_spaces = self.txn.query_prefix(&KeyEncoder::tenant_prefix(&auth.tenant_id))?;
        let attached_elsewhere = vnet_ids_attached_elsewhere(&all_spaces, doc.id, block_name);

        let mut out = Vec::new();
        for v in &all_vnets {
            if attached_elsewhere.contains(&v.id) {
                continue;
            }
            let in_block = PrefixSet::from_prefixes(v.prefixes.iter().filter(|p| block_cidr.contains(p)).cloned());
            if in_block.is_empty() || in_block.intersect(&reserved).total_size() > 0 {
                continue;
            }
            out.push(build_vnet_view(&VNetRef { id: v.id.clone(), active: true }, &all_vnets, expand, false));
        }
        Ok(out)
    }

    pub async fn list_block_networks(&self, auth: &AuthContext, space: &str, block_name: &str, expand: bool) -> Result<Vec<VNetView>> {
        self.require_admin(auth)?;
        let doc = self.txn.read(&KeyEncoder::space_key(&auth.tenant_id, space))?;
        let block = doc.find_block(block_name).ok_or_else(|| EngineError::BadRequest("Invalid block name.".to_string()))?;
        let all_vnets = self.inventory.get_network(&auth.tenant_id, auth.is_admin).await?;
        Ok(block.vnets.iter().map(|v| build_vnet_view(v, &all_vnets, expand, false)).collect())
    }

    pub async fn attach_network(&self, auth: &AuthContext, space: &str, block_name: &str, vnet_id: String) -> Result<Block> {
        self.require_admin(auth)?;
        let all_vnets = self.inventory.get_network(&auth.tenant_id, auth.is_admin).await?;
        let block_name_owned = block_name.to_string();
        let mutated = self.txn.run_mutation(&KeyEncoder::space_key(&auth.tenant_id, space), move |mut doc| {
            let block = doc.find_block_mut(&block_name_owned).ok_or_else(|| EngineError::BadRequest("Invalid block name.".to_string()))?;
            if block.vnets.iter().any(|v| v.id == vnet_id) {
                return Err(EngineError::BadRequest("Network is already attached to this block.".to_string()));
            }
            let info = all_vnets
                .iter()
                .find(|v| v.id == vnet_id)
                .ok_or_else(|| EngineError::BadRequest("Unknown vnet id.".to_string()))?;
            let block_cidr = Prefix::parse(&block.cidr)?;
            let candidate = PrefixSet::from_prefixes(info.prefixes.iter().filter(|p| block_cidr.contains(p)).cloned());
            if candidate.is_empty() {
                return Err(EngineError::BadRequest("Network has no prefix within this block.".to_string()));
            }
            let claimed = block_claimed_set(block, &all_vnets);
            if candidate.intersect(&claimed).total_size() > 0 {
                return Err(EngineError::BadRequest("Network overlaps existing block allocation(s).".to_string()));
            }
            block.vnets.push(VNetRef { id: vnet_id.clone(), active: true });
            Ok(doc)
        })?;
        mutated.find_block(block_name).cloned().ok_or_else(|| EngineError::InternalUnavailable("block vanished".to_string()))
    }

    pub async fn replace_networks(&self, auth: &AuthContext, space: &str, block_name: &str, vnet_ids: Vec<String>) -> Result<Block> {
        self.require_admin(auth)?;
        let all_vnets = self.inventory.get_network(&auth.tenant_id, auth.is_admin).await?;
        let block_name_owned = block_name.to_string();
        let mutated = self.txn.run_mutation(&KeyEncoder::space_key(&auth.tenant_id, space), move |mut doc| {
            let block = doc.find_block_mut(&block_name_owned).ok_or_else(|| EngineError::BadRequest("Invalid block name.".to_string()))?;
            let block_cidr = Prefix::parse(&block.cidr)?;

            let mut combined = PrefixSet::new();
            for id in &vnet_ids {
                let info = all_vnets
                    .iter()
                    .find(|v| &v.id == id)
                    .ok_or_else(|| EngineError::BadRequest(format!("Unknown vnet id '{id}'.")))?;
                let in_block: Vec<Prefix> = info.prefixes.iter().filter(|p| block_cidr.contains(p)).cloned().collect();
                if in_block.len() != 1 {
                    return Err(EngineError::BadRequest(format!(
                        "Network '{id}' must contribute exactly one prefix within this block."
                    )));
                }
                if combined.overlaps_prefix(&in_block[0]) {
                    return Err(EngineError::BadRequest("Supplied networks overlap each other.".to_string()));
                }
                combined.insert(in_block[0]);
            }
            let claimed = block.external_set().union(&block.unsettled_reservation_set());
            if combined.intersect(&claimed).total_size() > 0 {
                return Err(EngineError::BadRequest(
                    "Supplied networks overlap existing reservations or external networks.".to_string(),
                ));
            }
            block.vnets = vnet_ids.iter().map(|id| VNetRef { id: id.clone(), active: true }).collect();
            Ok(doc)
        })?;
        mutated.find_block(block_name).cloned().ok_or_else(|| EngineError::InternalUnavailable("block vanished".to_string()))
    }

    /// §9(d): the source computes `invalid_nets` after an unconditional
    /// error that always fires first, so the membership check never runs.
    /// This implements it once, as the only check.
    pub async fn detach_networks(&self, auth: &AuthContext, space: &str, block_name: &str, vnet_ids: Vec<String>) -> Result<Block> {
        self.require_admin(auth)?;
        let block_name_owned = block_name.to_string();
        let mutated = self.txn.run_mutation(&KeyEncoder::space_key(&auth.tenant_id, space), move |mut doc| {
            let block = doc.find_block_mut(&block_name_owned).ok_or_else(|| EngineError::BadRequest("Invalid block name.".to_string()))?;
            let invalid: Vec<&str> = vnet_ids.iter().filter(|id| !block.vnets.iter().any(|v| &v.id == *id)).map(String::as_str).collect();
            if !invalid.is_empty() {
                return Err(EngineError::BadRequest(format!(
                    "Block does not have the following network(s) attached: {}.",
                    invalid.join(", ")
                )));
            }
            block.vnets.retain(|v| !vnet_ids.contains(&v.id));
            Ok(doc)
        })?;
        mutated.find_block(block_name).cloned().ok_or_else(|| EngineError::InternalUnavailable("block vanished".to_string()))
    }

    // ------------------------------------------------------------ externals

    pub async fn list_externals(&self, auth: &AuthContext, space: &str, block_name: &str) -> Result<Vec<ExternalNetwork>> {
        let doc = self.txn.read(&KeyEncoder::space_key(&auth.tenant_id, space))?;
        let block = doc.find_block(block_name).ok_or_else(|| EngineError::BadRequest("Invalid block name.".to_string()))?;
        Ok(block.externals.clone())
    }

    pub async fn get_external(&self, auth: &AuthContext, space: &str, block_name: &str, ext_name: &str) -> Result<ExternalNetwork> {
        let doc = self.txn.read(&KeyEncoder::space_key(&auth.tenant_id, space))?;
        let block = doc.find_block(block_name).ok_or_else(|| EngineError::BadRequest("Invalid block name.".to_string()))?;
        block
            .find_external(ext_name)
            .cloned()
            .ok_or_else(|| EngineError::BadRequest("Invalid external network name.".to_string()))
    }

    pub async fn create_external(
        &self,
        auth: &AuthContext,
        space: &str,
        block_name: &str,
        name: String,
        desc: String,
        cidr: Option<String>,
        size: Option<u8>,
    ) -> Result<ExternalNetwork> {
        self.require_admin(auth)?;
        validate_name(&name)?;
        validate_desc(&desc)?;
        let all_vnets = self.inventory.get_network(&auth.tenant_id, auth.is_admin).await?;
        let lookup_name = name.clone();
        let block_name_owned = block_name.to_string();
        let mutated = self.txn.run_mutation(&KeyEncoder::space_key(&auth.tenant_id, space), move |mut doc| {
            let block = doc.find_block_mut(&block_name_owned).ok_or_else(|| EngineError::BadRequest("Invalid block name.".to_string()))?;
            if block.find_external(&name).is_some() {
                return Err(EngineError::BadRequest(
                    "An external network with that name already exists in this block.".to_string(),
                ));
            }
            let block_cidr = Prefix::parse(&block.cidr)?;
            let free = PrefixSet::from_prefixes([block_cidr]).difference(&block_claimed_set(block, &all_vnets));

            let req = match (&cidr, size) {
                (Some(c), _) => AllocRequest::explicit(c.clone()),
                (None, Some(s)) => AllocRequest::by_size(s),
                (None, None) => return Err(EngineError::BadRequest("Either size or cidr must be supplied.".to_string())),
            };
            // §9/scenario 4: an explicit-CIDR overlap on an *external network*
            // create is a 400, unlike the 409 a subnet create returns for the
            // same collision — the allocator's generic Conflict needs
            // remapping here, not inside `allocate` itself.
            let allocated = allocate(&free, &block_cidr, &req, "Network of requested size unavailable in target block.").map_err(|e| match e {
                EngineError::Conflict(_) => {
                    EngineError::BadRequest("Block contains external network(s) which overlap the requested CIDR.".to_string())
                }
                other => other,
            })?;

            block.externals.push(ExternalNetwork {
                name: name.clone(),
                desc: desc.clone(),
                cidr: allocated.to_string(),
                subnets: Vec::new(),
            });
            Ok(doc)
        })?;
        let block = mutated.find_block(block_name).ok_or_else(|| EngineError::InternalUnavailable("block vanished".to_string()))?;
        block
            .find_external(&lookup_name)
            .cloned()
            .ok_or_else(|| EngineError::InternalUnavailable("external vanished".to_string()))
    }

    pub async fn patch_external(
        &self,
        auth: &AuthContext,
        space: &str,
        block_name: &str,
        ext_name: &str,
        ops: &[PatchOperation],
    ) -> Result<ExternalNetwork> {
        self.require_admin(auth)?;
        let patches = ExternalPatch::parse(ops)?;
        let final_name = patches
            .iter()
            .find_map(|p| if let ExternalPatch::Name(n) = p { Some(n.clone()) } else { None })
            .unwrap_or_else(|| ext_name.to_string());
        let all_vnets = self.inventory.get_network(&auth.tenant_id, auth.is_admin).await?;
        let (block_name_owned, ext_name_owned) = (block_name.to_string(), ext_name.to_string());
        let mutated = self.txn.run_mutation(&KeyEncoder::space_key(&auth.tenant_id, space), move |mut doc| {
            let block = doc.find_block_mut(&block_name_owned).ok_or_else(|| EngineError::BadRequest("Invalid block name.".to_string()))?;
            let block_cidr = Prefix::parse(&block.cidr)?;
            let vnets_in_block = vnet_prefixes_in_block(block, &all_vnets);
            let resv_set = block.unsettled_reservation_set();
            let other_externals = PrefixSet::from_prefixes(
                block
                    .externals
                    .iter()
                    .filter(|e| !e.name.eq_ignore_ascii_case(&ext_name_owned))
                    .filter_map(|e| Prefix::parse(&e.cidr).ok()),
            );
            let ext = block.find_external_mut(&ext_name_owned).ok_or_else(|| EngineError::BadRequest("Invalid external network name.".to_string()))?;

            for patch in &patches {
                match patch {
                    ExternalPatch::Name(n) => {
                        validate_name(n)?;
                        ext.name = n.clone();
                    }
                    ExternalPatch::Desc(d) => {
                        validate_desc(d)?;
                        ext.desc = d.clone();
                    }
                    ExternalPatch::Cidr(c) => {
                        let new_cidr = cidr_canonical(c)?;
                        if !block_cidr.contains(&new_cidr) {
                            return Err(EngineError::BadRequest("Updated CIDR must lie within the block's CIDR.".to_string()));
                        }
                        let children = PrefixSet::from_prefixes(ext.subnets.iter().filter_map(|s| Prefix::parse(&s.cidr).ok()));
                        if !cidr_replace_covers_children(&new_cidr, &children) {
                            return Err(EngineError::BadRequest(
                                "Updated CIDR does not cover this network's existing subnets.".to_string(),
                            ));
                        }
                        let claimed = vnets_in_block.union(&resv_set).union(&other_externals);
                        if claimed.overlaps_prefix(&new_cidr) {
                            return Err(EngineError::BadRequest("Updated CIDR overlaps other Block allocation(s).".to_string()));
                        }
                        ext.cidr = new_cidr.to_string();
                    }
                }
            }
            Ok(doc)
        })?;
        let block = mutated.find_block(block_name).ok_or_else(|| EngineError::InternalUnavailable("block vanished".to_string()))?;
        block
            .find_external(&final_name)
            .cloned()
            .ok_or_else(|| EngineError::InternalUnavailable("external vanished".to_string()))
    }

    pub async fn delete_external(&self, auth: &AuthContext, space: &str, block_name: &str, ext_name: &str) -> Result<()> {
        self.require_admin(auth)?;
        let (block_name_owned, ext_name_owned) = (block_name.to_string(), ext_name.to_string());
        self.txn.run_mutation(&KeyEncoder::space_key(&auth.tenant_id, space), move |mut doc| {
            let block = doc.find_block_mut(&block_name_owned).ok_or_else(|| EngineError::BadRequest("Invalid block name.".to_string()))?;
            let idx = block
                .externals
                .iter()
                .position(|e| e.name.eq_ignore_ascii_case(&ext_name_owned))
                .ok_or_else(|| EngineError::BadRequest("Invalid external network name.".to_string()))?;
            block.externals.remove(idx);
            Ok(doc)
        })?;
        Ok(())
    }

    // --------------------------------------------------------------- subnets

    pub async fn list_subnets(&self, auth: &AuthContext, space: &str, block_name: &str, ext_name: &str) -> Result<Vec<ExternalSubnet>> {
        let doc = self.txn.read(&KeyEncoder::space_key(&auth.tenant_id, space))?;
        let block = doc.find_block(block_name).ok_or_else(|| EngineError::BadRequest("Invalid block name.".to_string()))?;
        let ext = block.find_external(ext_name).ok_or_else(|| EngineError::BadRequest("Invalid external network name.".to_string()))?;
        Ok(ext.subnets.clone())
    }

    pub async fn get_subnet(&self, auth: &AuthContext, space: &str, block_name: &str, ext_name: &str, subnet_name: &str) -> Result<ExternalSubnet> {
        let doc = self.txn.read(&KeyEncoder::space_key(&auth.tenant_id, space))?;
        let block = doc.find_block(block_name).ok_or_else(|| EngineError::BadRequest("Invalid block name.".to_string()))?;
        let ext = block.find_external(ext_name).ok_or_else(|| EngineError::BadRequest("Invalid external network name.".to_string()))?;
        ext.find_subnet(subnet_name).cloned().ok_or_else(|| EngineError::BadRequest("Invalid subnet name.".to_string()))
    }

    pub async fn create_subnet(
        &self,
        auth: &AuthContext,
        space: &str,
        block_name: &str,
        ext_name: &str,
        name: String,
        desc: String,
        cidr: Option<String>,
        size: Option<u8>,
    ) -> Result<ExternalSubnet> {
        self.require_admin(auth)?;
        validate_name(&name)?;
        validate_desc(&desc)?;
        let lookup_name = name.clone();
        let (block_name_owned, ext_name_owned) = (block_name.to_string(), ext_name.to_string());
        let mutated = self.txn.run_mutation(&KeyEncoder::space_key(&auth.tenant_id, space), move |mut doc| {
            let block = doc.find_block_mut(&block_name_owned).ok_or_else(|| EngineError::BadRequest("Invalid block name.".to_string()))?;
            let ext = block.find_external_mut(&ext_name_owned).ok_or_else(|| EngineError::BadRequest("Invalid external network name.".to_string()))?;
            if ext.find_subnet(&name).is_some() {
                return Err(EngineError::BadRequest(
                    "A subnet with that name already exists in this external network.".to_string(),
                ));
            }
            let ext_cidr = Prefix::parse(&ext.cidr)?;
            let free = PrefixSet::from_prefixes([ext_cidr]).difference(&ext.reserved_set());

            let req = match (&cidr, size) {
                (Some(c), _) => AllocRequest::explicit(c.clone()),
                (None, Some(s)) => AllocRequest::by_size(s),
                (None, None) => return Err(EngineError::BadRequest("Either size or cidr must be supplied.".to_string())),
            };
            let allocated = allocate(&free, &ext_cidr, &req, "Network of requested size unavailable in target external network.")?;

            ext.subnets.push(ExternalSubnet {
                name: name.clone(),
                desc: desc.clone(),
                cidr: allocated.to_string(),
                endpoints: Vec::new(),
            });
            Ok(doc)
        })?;
        let block = mutated.find_block(block_name).ok_or_else(|| EngineError::InternalUnavailable("block vanished".to_string()))?;
        let ext = block.find_external(ext_name).ok_or_else(|| EngineError::InternalUnavailable("external vanished".to_string()))?;
        ext.find_subnet(&lookup_name).cloned().ok_or_else(|| EngineError::InternalUnavailable("subnet vanished".to_string()))
    }

    pub async fn patch_subnet(
        &self,
        auth: &AuthContext,
        space: &str,
        block_name: &str,
        ext_name: &str,
        subnet_name: &str,
        ops: &[PatchOperation],
    ) -> Result<ExternalSubnet> {
        self.require_admin(auth)?;
        let patches = SubnetPatch::parse(ops)?;
        let final_name = patches
            .iter()
            .find_map(|p| if let SubnetPatch::Name(n) = p { Some(n.clone()) } else { None })
            .unwrap_or_else(|| subnet_name.to_string());
        let (block_name_owned, ext_name_owned, subnet_name_owned) = (block_name.to_string(), ext_name.to_string(), subnet_name.to_string());
        let mutated = self.txn.run_mutation(&KeyEncoder::space_key(&auth.tenant_id, space), move |mut doc| {
            let block = doc.find_block_mut(&block_name_owned).ok_or_else(|| EngineError::BadRequest("Invalid block name.".to_string()))?;
            let ext = block.find_external_mut(&ext_name_owned).ok_or_else(|| EngineError::BadRequest("Invalid external network name.".to_string()))?;
            let ext_cidr = Prefix::parse(&ext.cidr)?;
            let other_subnets = PrefixSet::from_prefixes(
                ext.subnets
                    .iter()
                    .filter(|s| !s.name.eq_ignore_ascii_case(&subnet_name_owned))
                    .filter_map(|s| Prefix::parse(&s.cidr).ok()),
            );
            let subnet = ext.find_subnet_mut(&subnet_name_owned).ok_or_else(|| EngineError::BadRequest("Invalid subnet name.".to_string()))?;

            for patch in &patches {
                match patch {
                    SubnetPatch::Name(n) => {
                        validate_name(n)?;
                        subnet.name = n.clone();
                    }
                    SubnetPatch::Desc(d) => {
                        validate_desc(d)?;
                        subnet.desc = d.clone();
                    }
                    SubnetPatch::Cidr(c) => {
                        let new_cidr = cidr_canonical(c)?;
                        if !ext_cidr.contains(&new_cidr) {
                            return Err(EngineError::BadRequest(
                                "Updated CIDR must lie within the external network's CIDR.".to_string(),
                            ));
                        }
                        let mut children = PrefixSet::new();
                        for e in &subnet.endpoints {
                            if let Ok(ip) = e.ip.parse::<Ipv4Addr>() {
                                children.insert(Prefix::new(ip, 32)?);
                            }
                        }
                        if !cidr_replace_covers_children(&new_cidr, &children) {
                            return Err(EngineError::BadRequest(
                                "Updated CIDR does not cover this subnet's existing endpoints.".to_string(),
                            ));
                        }
                        if other_subnets.overlaps_prefix(&new_cidr) {
                            return Err(EngineError::BadRequest(
                                "Updated CIDR overlaps other subnets in this external network.".to_string(),
                            ));
                        }
                        subnet.cidr = new_cidr.to_string();
                    }
                }
            }
            Ok(doc)
        })?;
        let block = mutated.find_block(block_name).ok_or_else(|| EngineError::InternalUnavailable("block vanished".to_string()))?;
        let ext = block.find_external(ext_name).ok_or_else(|| EngineError::InternalUnavailable("external vanished".to_string()))?;
        ext.find_subnet(&final_name).cloned().ok_or_else(|| EngineError::InternalUnavailable("subnet vanished".to_string()))
    }

    pub async fn delete_subnet(&self, auth: &AuthContext, space: &str, block_name: &str, ext_name: &str, subnet_name: &str) -> Result<()> {
        self.require_admin(auth)?;
        let (block_name_owned, ext_name_owned, subnet_name_owned) = (block_name.to_string(), ext_name.to_string(), subnet_name.to_string());
        self.txn.run_mutation(&KeyEncoder::space_key(&auth.tenant_id, space), move |mut doc| {
            let block = doc.find_block_mut(&block_name_owned).ok_or_else(|| EngineError::BadRequest("Invalid block name.".to_string()))?;
            let ext = block.find_external_mut(&ext_name_owned).ok_or_else(|| EngineError::BadRequest("Invalid external network name.".to_string()))?;
            let idx = ext
                .subnets
                .iter()
                .position(|s| s.name.eq_ignore_ascii_case(&subnet_name_owned))
                .ok_or_else(|| EngineError::BadRequest("Invalid subnet name.".to_string()))?;
            ext.subnets.remove(idx);
            Ok(doc)
        })?;
        Ok(())
    }

    // ------------------------------------------------------------- endpoints

    pub async fn list_endpoints(
        &self,
        auth: &AuthContext,
        space: &str,
        block_name: &str,
        ext_name: &str,
        subnet_name: &str,
    ) -> Result<Vec<ExternalEndpoint>> {
        let doc = self.txn.read(&KeyEncoder::space_key(&auth.tenant_id, space))?;
        let block = doc.find_block(block_name).ok_or_else(|| EngineError::BadRequest("Invalid block name.".to_string()))?;
        let ext = block.find_external(ext_name).ok_or_else(|| EngineError::BadRequest("Invalid external network name.".to_string()))?;
        let subnet = ext.find_subnet(subnet_name).ok_or_else(|| EngineError::BadRequest("Invalid subnet name.".to_string()))?;
        Ok(subnet.endpoints.clone())
    }

    pub async fn get_endpoint(
        &self,
        auth: &AuthContext,
        space: &str,
        block_name: &str,
        ext_name: &str,
        subnet_name: &str,
        endpoint_name: &str,
    ) -> Result<ExternalEndpoint> {
        let doc = self.txn.read(&KeyEncoder::space_key(&auth.tenant_id, space))?;
        let block = doc.find_block(block_name).ok_or_else(|| EngineError::BadRequest("Invalid block name.".to_string()))?;
        let ext = block.find_external(ext_name).ok_or_else(|| EngineError::BadRequest("Invalid external network name.".to_string()))?;
        let subnet = ext.find_subnet(subnet_name).ok_or_else(|| EngineError::BadRequest("Invalid subnet name.".to_string()))?;
        subnet.find_endpoint(endpoint_name).cloned().ok_or_else(|| EngineError::BadRequest("Invalid endpoint name.".to_string()))
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn create_endpoint(
        &self,
        auth: &AuthContext,
        space: &str,
        block_name: &str,
        ext_name: &str,
        subnet_name: &str,
        name: String,
        desc: String,
        ip: Option<String>,
    ) -> Result<ExternalEndpoint> {
        self.require_admin(auth)?;
        validate_name(&name)?;
        validate_desc(&desc)?;
        let lookup_name = name.clone();
        let (block_name_owned, ext_name_owned, subnet_name_owned) = (block_name.to_string(), ext_name.to_string(), subnet_name.to_string());
        let mutated = self.txn.run_mutation(&KeyEncoder::space_key(&auth.tenant_id, space), move |mut doc| {
            let block = doc.find_block_mut(&block_name_owned).ok_or_else(|| EngineError::BadRequest("Invalid block name.".to_string()))?;
            let ext = block.find_external_mut(&ext_name_owned).ok_or_else(|| EngineError::BadRequest("Invalid external network name.".to_string()))?;
            let subnet = ext.find_subnet_mut(&subnet_name_owned).ok_or_else(|| EngineError::BadRequest("Invalid subnet name.".to_string()))?;
            if subnet.find_endpoint(&name).is_some() {
                return Err(EngineError::BadRequest("An endpoint with that name already exists in this subnet.".to_string()));
            }
            let subnet_cidr = Prefix::parse(&subnet.cidr)?;
            let used = subnet.used_ips();

            let chosen_ip = match &ip {
                Some(raw) => {
                    let addr = host_ok(raw)?;
                    if !subnet_cidr.contains(&Prefix::new(addr, 32)?) {
                        return Err(EngineError::BadRequest("IP address is not within this subnet's CIDR.".to_string()));
                    }
                    if used.contains(&addr) {
                        return Err(EngineError::BadRequest("IP address is already in use within this subnet.".to_string()));
                    }
                    addr
                }
                None => subnet_cidr
                    .iter_hosts()
                    .into_iter()
                    .find(|a| !used.contains(a))
                    .ok_or_else(|| EngineError::InternalUnavailable("No available host address in this subnet.".to_string()))?,
            };

            subnet.endpoints.push(ExternalEndpoint { name: name.clone(), desc: desc.clone(), ip: chosen_ip.to_string() });
            Ok(doc)
        })?;
        let block = mutated.find_block(block_name).ok_or_else(|| EngineError::InternalUnavailable("block vanished".to_string()))?;
        let ext = block.find_external(ext_name).ok_or_else(|| EngineError::InternalUnavailable("external vanished".to_string()))?;
        let subnet = ext.find_subnet(subnet_name).ok_or_else(|| EngineError::InternalUnavailable("subnet vanished".to_string()))?;
        subnet.find_endpoint(&lookup_name).cloned().ok_or_else(|| EngineError::InternalUnavailable("endpoint vanished".to_string()))
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn patch_endpoint(
        &self,
        auth: &AuthContext,
        space: &str,
        block_name: &str,
        ext_name: &str,
        subnet_name: &str,
        endpoint_name: &str,
        ops: &[PatchOperation],
    ) -> Result<ExternalEndpoint> {
        self.require_admin(auth)?;
        let patches = EndpointPatch::parse(ops)?;
        let final_name = patches
            .iter()
            .find_map(|p| if let EndpointPatch::Name(n) = p { Some(n.clone()) } else { None })
            .unwrap_or_else(|| endpoint_name.to_string());
        let (block_name_owned, ext_name_owned, subnet_name_owned, endpoint_name_owned) =
            (block_name.to_string(), ext_name.to_string(), subnet_name.to_string(), endpoint_name.to_string());
        let mutated = self.txn.run_mutation(&KeyEncoder::space_key(&auth.tenant_id, space), move |mut doc| {
            let block = doc.find_block_mut(&block_name_owned).ok_or_else(|| EngineError::BadRequest("Invalid block name.".to_string()))?;
            let ext = block.find_external_mut(&ext_name_owned).ok_or_else(|| EngineError::BadRequest("Invalid external network name.".to_string()))?;
            let subnet = ext.find_subnet_mut(&subnet_name_owned).ok_or_else(|| EngineError::BadRequest("Invalid subnet name.".to_string()))?;
            let subnet_cidr = Prefix::parse(&subnet.cidr)?;
            let other_ips: HashSet<Ipv4Addr> = subnet
                .endpoints
                .iter()
                .filter(|e| !e.name.eq_ignore_ascii_case(&endpoint_name_owned))
                .filter_map(|e| e.ip.parse().ok())
                .collect();
            let endpoint = subnet.find_endpoint_mut(&endpoint_name_owned).ok_or_else(|| EngineError::BadRequest("Invalid endpoint name.".to_string()))?;

            for patch in &patches {
                match patch {
                    EndpointPatch::Name(n) => {
                        validate_name(n)?;
                        endpoint.name = n.clone();
                    }
                    EndpointPatch::Desc(d) => {
                        validate_desc(d)?;
                        endpoint.desc = d.clone();
                    }
                    EndpointPatch::Ip(ip) => {
                        let addr = host_ok(ip)?;
                        if !subnet_cidr.contains(&Prefix::new(addr, 32)?) {
                            return Err(EngineError::BadRequest("IP address is not within this subnet's CIDR.".to_string()));
                        }
                        if other_ips.contains(&addr) {
                            return Err(EngineError::BadRequest("IP address is already in use within this subnet.".to_string()));
                        }
                        endpoint.ip = addr.to_string();
                    }
                }
            }
            Ok(doc)
        })?;
        let block = mutated.find_block(block_name).ok_or_else(|| EngineError::InternalUnavailable("block vanished".to_string()))?;
        let ext = block.find_external(ext_name).ok_or_else(|| EngineError::InternalUnavailable("external vanished".to_string()))?;
        let subnet = ext.find_subnet(subnet_name).ok_or_else(|| EngineError::InternalUnavailable("subnet vanished".to_string()))?;
        subnet.find_endpoint(&final_name).cloned().ok_or_else(|| EngineError::InternalUnavailable("endpoint vanished".to_string()))
    }

    pub async fn delete_endpoint(
        &self,
        auth: &AuthContext,
        space: &str,
        block_name: &str,
        ext_name: &str,
        subnet_name: &str,
        endpoint_name: &str,
    ) -> Result<()> {
        self.require_admin(auth)?;
        let (block_name_owned, ext_name_owned, subnet_name_owned, endpoint_name_owned) =
            (block_name.to_string(), ext_name.to_string(), subnet_name.to_string(), endpoint_name.to_string());
        self.txn.run_mutation(&KeyEncoder::space_key(&auth.tenant_id, space), move |mut doc| {
            let block = doc.find_block_mut(&block_name_owned).ok_or_else(|| EngineError::BadRequest("Invalid block name.".to_string()))?;
            let ext = block.find_external_mut(&ext_name_owned).ok_or_else(|| EngineError::BadRequest("Invalid external network name.".to_string()))?;
            let subnet = ext.find_subnet_mut(&subnet_name_owned).ok_or_else(|| EngineError::BadRequest("Invalid subnet name.".to_string()))?;
            let idx = subnet
                .endpoints
                .iter()
                .position(|e| e.name.eq_ignore_ascii_case(&endpoint_name_owned))
                .ok_or_else(|| EngineError::BadRequest("Invalid endpoint name.".to_string()))?;
            subnet.endpoints.remove(idx);
            Ok(doc)
        })?;
        Ok(())
    }

    // ---------------------------------------------------------- reservations

    pub async fn list_space_reservations(&self, auth: &AuthContext, space: &str, settled: bool) -> Result<Vec<Reservation>> {
        let doc = self.txn.read(&KeyEncoder::space_key(&auth.tenant_id, space))?;
        let mut out = Vec::new();
        for block in &doc.blocks {
            out.extend(filter_reservations(&block.resv, auth, settled));
        }
        Ok(out)
    }

    pub async fn list_block_reservations(&self, auth: &AuthContext, space: &str, block_name: &str, settled: bool) -> Result<Vec<Reservation>> {
        let doc = self.txn.read(&KeyEncoder::space_key(&auth.tenant_id, space))?;
        let block = doc.find_block(block_name).ok_or_else(|| EngineError::BadRequest("Invalid block name.".to_string()))?;
        Ok(filter_reservations(&block.resv, auth, settled))
    }

    pub async fn get_reservation(&self, auth: &AuthContext, space: &str, block_name: &str, id: &str) -> Result<Reservation> {
        let doc = self.txn.read(&KeyEncoder::space_key(&auth.tenant_id, space))?;
        let block = doc.find_block(block_name).ok_or_else(|| EngineError::BadRequest("Invalid block name.".to_string()))?;
        let reservation = block.find_reservation(id).ok_or_else(|| EngineError::BadRequest("Invalid reservation id.".to_string()))?;
        if !auth.is_admin && reservation.created_by != auth.user_name {
            return Err(EngineError::Forbidden("You do not have access to this reservation.".to_string()));
        }
        Ok(reservation.clone())
    }

    pub async fn create_block_reservation(&self, auth: &AuthContext, space: &str, block_name: &str, req: ReservationRequest) -> Result<Reservation> {
        validate_desc(&req.desc)?;
        let all_vnets = self.inventory.get_network(&auth.tenant_id, auth.is_admin).await?;
        let block_name_owned = block_name.to_string();
        let user_name = auth.user_name.clone();
        let created_on = now();
        let mutated = self.txn.run_mutation(&KeyEncoder::space_key(&auth.tenant_id, space), move |mut doc| {
            let block = doc.find_block_mut(&block_name_owned).ok_or_else(|| EngineError::BadRequest("Invalid block name.".to_string()))?;
            let reservation = allocate_reservation(
                block,
                &all_vnets,
                &req,
                &user_name,
                created_on,
                "Network of requested size unavailable in target block.",
            )?;
            block.resv.push(reservation);
            Ok(doc)
        })?;
        let block = mutated.find_block(block_name).ok_or_else(|| EngineError::InternalUnavailable("block vanished".to_string()))?;
        block.resv.last().cloned().ok_or_else(|| EngineError::InternalUnavailable("reservation vanished".to_string()))
    }

    /// Tries `req.blocks` in order and keeps the first one that can satisfy
    /// the request (§9(b): the source only ever examines the first block in
    /// the list; this rewrite tries every candidate, which is strictly more
    /// useful and still deterministic — DESIGN.md Open Question decisions).
    pub async fn create_multi_block_reservation(&self, auth: &AuthContext, space: &str, req: MultiBlockReservationRequest) -> Result<Reservation> {
        validate_desc(&req.desc)?;
        if req.blocks.is_empty() {
            return Err(EngineError::BadRequest("At least one block must be supplied.".to_string()));
        }
        let all_vnets = self.inventory.get_network(&auth.tenant_id, auth.is_admin).await?;
        let blocks = req.blocks.clone();
        let user_name = auth.user_name.clone();
        let created_on = now();
        let single_req = ReservationRequest {
            size: req.size,
            cidr: req.cidr.clone(),
            desc: req.desc.clone(),
            reverse_search: req.reverse_search,
            smallest_cidr: req.smallest_cidr,
        };
        let mutated = self.txn.run_mutation(&KeyEncoder::space_key(&auth.tenant_id, space), move |mut doc| {
            let mut chosen: Option<(String, Reservation)> = None;
            for block_name in &blocks {
                let Some(block) = doc.find_block(block_name) else { continue };
                if let Ok(reservation) = allocate_reservation(
                    block,
                    &all_vnets,
                    &single_req,
                    &user_name,
                    created_on,
                    "Network of requested size unavailable in target block(s).",
                ) {
                    chosen = Some((block_name.clone(), reservation));
                    break;
                }
            }
            let (block_name, reservation) = chosen
                .ok_or_else(|| EngineError::InternalUnavailable("Network of requested size unavailable in target block(s).".to_string()))?;
            let block = doc.find_block_mut(&block_name).expect("looked up above");
            block.resv.push(reservation);
            Ok(doc)
        })?;

        for block in &mutated.blocks {
            if let Some(r) = block.resv.iter().find(|r| r.created_on == created_on && r.created_by == auth.user_name) {
                return Ok(r.clone());
            }
        }
        Err(EngineError::InternalUnavailable("reservation vanished".to_string()))
    }

    pub async fn delete_reservation(&self, auth: &AuthContext, space: &str, block_name: &str, id: &str) -> Result<()> {
        let (block_name_owned, id_owned) = (block_name.to_string(), id.to_string());
        let user_name = auth.user_name.clone();
        let is_admin = auth.is_admin;
        let settled_on = now();
        self.txn.run_mutation(&KeyEncoder::space_key(&auth.tenant_id, space), move |mut doc| {
            let block = doc.find_block_mut(&block_name_owned).ok_or_else(|| EngineError::BadRequest("Invalid block name.".to_string()))?;
            let reservation = block.find_reservation_mut(&id_owned).ok_or_else(|| EngineError::BadRequest("Invalid reservation id.".to_string()))?;
            if reservation.is_settled() {
                return Err(EngineError::BadRequest("Reservation is already settled.".to_string()));
            }
            if !is_admin && reservation.created_by != user_name {
                return Err(EngineError::Forbidden("You do not have access to this reservation.".to_string()));
            }
            reservation.settled_on = Some(settled_on);
            reservation.settled_by = Some(user_name.clone());
            reservation.status = STATUS_CANCELLED_BY_USER.to_string();
            Ok(doc)
        })?;
        Ok(())
    }

    pub async fn delete_block_reservations(&self, auth: &AuthContext, space: &str, block_name: &str, ids: Vec<String>) -> Result<()> {
        let block_name_owned = block_name.to_string();
        let user_name = auth.user_name.clone();
        let is_admin = auth.is_admin;
        let settled_on = now();
        self.txn.run_mutation(&KeyEncoder::space_key(&auth.tenant_id, space), move |mut doc| {
            let block = doc.find_block_mut(&block_name_owned).ok_or_else(|| EngineError::BadRequest("Invalid block name.".to_string()))?;
            for id in &ids {
                let reservation = block.find_reservation(id).ok_or_else(|| EngineError::BadRequest(format!("Invalid reservation id '{id}'.")))?;
                if reservation.is_settled() {
                    return Err(EngineError::BadRequest(format!("Reservation '{id}' is already settled.")));
                }
                if !is_admin && reservation.created_by != user_name {
                    return Err(EngineError::Forbidden(
                        "You do not have access to one or more of these reservations.".to_string(),
                    ));
                }
            }
            for id in &ids {
                let reservation = block.find_reservation_mut(id).expect("validated above");
                reservation.settled_on = Some(settled_on);
                reservation.settled_by = Some(user_name.clone());
                reservation.status = STATUS_CANCELLED_BY_USER.to_string();
            }
            Ok(doc)
        })?;
        Ok(())
    }
}

fn filter_reservations(resv: &[Reservation], auth: &AuthContext, settled: bool) -> Vec<Reservation> {
    resv.iter()
        .filter(|r| settled || !r.is_settled())
        .filter(|r| auth.is_admin || r.created_by == auth.user_name)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ipam_inventory::InMemoryInventory;
    use ipam_storage::InMemoryDocStore;

    fn admin() -> AuthContext {
        AuthContext::new("tenant-a", true, "alice")
    }

    fn non_admin(user: &str) -> AuthContext {
        AuthContext::new("tenant-a", false, user)
    }

    fn service() -> SpaceService {
        SpaceService::new(Arc::new(InMemoryDocStore::default()), Arc::new(InMemoryInventory::new()))
    }

    #[tokio::test]
    async fn create_space_block_and_reservation_end_to_end() {
        let svc = service();
        let auth = admin();
        svc.create_space(&auth, "corp".to_string(), "main".to_string()).await.unwrap();
        svc.create_block(&auth, "corp", "blk1".to_string(), "10.0.0.0/16".to_string()).await.unwrap();

        let resv = svc
            .create_block_reservation(
                &auth,
                "corp",
                "blk1",
                ReservationRequest { size: Some(24), cidr: None, desc: "test".to_string(), reverse_search: false, smallest_cidr: false },
            )
            .await
            .unwrap();
        assert_eq!(resv.cidr, "10.0.0.0/24");
        assert_eq!(resv.created_by, "alice");
    }

    #[tokio::test]
    async fn reverse_search_allocates_from_the_top() {
        let svc = service();
        let auth = admin();
        svc.create_space(&auth, "corp".to_string(), "main".to_string()).await.unwrap();
        svc.create_block(&auth, "corp", "blk1".to_string(), "10.0.0.0/16".to_string()).await.unwrap();

        let resv = svc
            .create_block_reservation(
                &auth,
                "corp",
                "blk1",
                ReservationRequest { size: Some(24), cidr: None, desc: "test".to_string(), reverse_search: true, smallest_cidr: false },
            )
            .await
            .unwrap();
        assert_eq!(resv.cidr, "10.0.255.0/24");
    }

    #[tokio::test]
    async fn external_explicit_cidr_overlap_is_bad_request_not_conflict() {
        let svc = service();
        let auth = admin();
        svc.create_space(&auth, "corp".to_string(), "main".to_string()).await.unwrap();
        svc.create_block(&auth, "corp", "blk1".to_string(), "10.0.0.0/16".to_string()).await.unwrap();
        svc.create_external(&auth, "corp", "blk1", "ext1".to_string(), "d".to_string(), Some("10.0.0.0/24".to_string()), None)
            .await
            .unwrap();

        let err = svc
            .create_external(&auth, "corp", "blk1", "ext2".to_string(), "d".to_string(), Some("10.0.0.0/25".to_string()), None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::BadRequest(_)));
    }

    #[tokio::test]
    async fn subnet_explicit_cidr_overlap_is_conflict() {
        let svc = service();
        let auth = admin();
        svc.create_space(&auth, "corp".to_string(), "main".to_string()).await.unwrap();
        svc.create_block(&auth, "corp", "blk1".to_string(), "10.0.0.0/16".to_string()).await.unwrap();
        svc.create_external(&auth, "corp", "blk1", "ext1".to_string(), "d".to_string(), None, Some(24)).await.unwrap();
        svc.create_subnet(&auth, "corp", "blk1", "ext1", "sub1".to_string(), "d".to_string(), Some("10.0.0.0/28".to_string()), None)
            .await
            .unwrap();

        let err = svc
            .create_subnet(&auth, "corp", "blk1", "ext1", "sub2".to_string(), "d".to_string(), Some("10.0.0.0/29".to_string()), None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Conflict(_)));
    }

    #[tokio::test]
    async fn patch_block_cidr_shrink_below_children_is_rejected() {
        let svc = service();
        let auth = admin();
        svc.create_space(&auth, "corp".to_string(), "main".to_string()).await.unwrap();
        svc.create_block(&auth, "corp", "blk1".to_string(), "10.0.0.0/16".to_string()).await.unwrap();
        svc.create_external(&auth, "corp", "blk1", "ext1".to_string(), "d".to_string(), Some("10.0.200.0/24".to_string()), None)
            .await
            .unwrap();

        let ops = vec![json_patch::PatchOperation::Replace(json_patch::ReplaceOperation {
            path: jsonptr::PointerBuf::parse("/cidr").unwrap(),
            value: serde_json::Value::String("10.0.0.0/17".to_string()),
        })];
        let err = svc.patch_block(&auth, "corp", "blk1", &ops).await.unwrap_err();
        assert!(matches!(err, EngineError::BadRequest(_)));
    }

    #[tokio::test]
    async fn multi_block_reservation_falls_through_to_second_candidate() {
        let svc = service();
        let auth = admin();
        svc.create_space(&auth, "corp".to_string(), "main".to_string()).await.unwrap();
        svc.create_block(&auth, "corp", "full".to_string(), "10.0.0.0/29".to_string()).await.unwrap();
        svc.create_block(&auth, "corp", "roomy".to_string(), "10.1.0.0/24".to_string()).await.unwrap();
        // Exhaust "full": a /29 has no /24-or-smaller room at all.
        let req = MultiBlockReservationRequest {
            blocks: vec!["full".to_string(), "roomy".to_string()],
            size: Some(28),
            cidr: None,
            desc: "multi".to_string(),
            reverse_search: false,
            smallest_cidr: false,
        };
        let resv = svc.create_multi_block_reservation(&auth, "corp", req).await.unwrap();
        assert!(resv.cidr.starts_with("10.1.0."));
    }

    #[tokio::test]
    async fn non_admin_only_sees_own_reservations() {
        let svc = service();
        let auth = admin();
        svc.create_space(&auth, "corp".to_string(), "main".to_string()).await.unwrap();
        svc.create_block(&auth, "corp", "blk1".to_string(), "10.0.0.0/16".to_string()).await.unwrap();

        let alice = non_admin("alice");
        let bob = non_admin("bob");
        svc.create_block_reservation(
            &alice,
            "corp",
            "blk1",
            ReservationRequest { size: Some(24), cidr: None, desc: "a".to_string(), reverse_search: false, smallest_cidr: false },
        )
        .await
        .unwrap();
        svc.create_block_reservation(
            &bob,
            "corp",
            "blk1",
            ReservationRequest { size: Some(24), cidr: None, desc: "b".to_string(), reverse_search: false, smallest_cidr: false },
        )
        .await
        .unwrap();

        let seen_by_bob = svc.list_block_reservations(&bob, "corp", "blk1", false).await.unwrap();
        assert_eq!(seen_by_bob.len(), 1);
        assert_eq!(seen_by_bob[0].created_by, "bob");

        let seen_by_admin = svc.list_block_reservations(&admin(), "corp", "blk1", false).await.unwrap();
        assert_eq!(seen_by_admin.len(), 2);
    }

    #[tokio::test]
    async fn available_excludes_vnet_attached_to_another_block() {
        let inventory = Arc::new(InMemoryInventory::new());
        inventory.insert(
            "tenant-a",
            VNetInfo { id: "vnet-1".to_string(), prefixes: vec![Prefix::parse("10.0.0.0/24").unwrap()], subnets: None },
        );
        let svc = SpaceService::new(Arc::new(InMemoryDocStore::default()), inventory);
        let auth = admin();
        svc.create_space(&auth, "corp".to_string(), "main".to_string()).await.unwrap();
        svc.create_block(&auth, "corp", "blk1".to_string(), "10.0.0.0/16".to_string()).await.unwrap();
        svc.create_block(&auth, "corp", "blk2".to_string(), "10.1.0.0/16".to_string()).await.unwrap();

        svc.attach_network(&auth, "corp", "blk1", "vnet-1".to_string()).await.unwrap();

        let available_in_blk1 = svc.available_block_nets(&auth, "corp", "blk1", false).await.unwrap();
        assert!(available_in_blk1.is_empty(), "already attached here, so not offered as newly available");

        let available_in_blk2 = svc.available_block_nets(&auth, "corp", "blk2", false).await.unwrap();
        assert!(available_in_blk2.is_empty(), "vnet has no prefix inside blk2's CIDR");
    }

    #[tokio::test]
    async fn detach_unknown_network_reports_it() {
        let svc = service();
        let auth = admin();
        svc.create_space(&auth, "corp".to_string(), "main".to_string()).await.unwrap();
        svc.create_block(&auth, "corp", "blk1".to_string(), "10.0.0.0/16".to_string()).await.unwrap();

        let err = svc.detach_networks(&auth, "corp", "blk1", vec!["vnet-ghost".to_string()]).await.unwrap_err();
        assert!(matches!(err, EngineError::BadRequest(_)));
    }
}
