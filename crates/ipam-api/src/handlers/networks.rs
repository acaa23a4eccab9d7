use crate::auth::Auth;
use crate::error::Result;
use crate::handlers::common::ExpandQuery;
use crate::response::ApiResponse;
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::Json;
use ipam_core::Block;
use ipam_engine::space_service::VNetView;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct AttachNetworkBody {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct ReplaceNetworksBody {
    pub ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct DetachNetworksBody {
    pub ids: Vec<String>,
}

/// GET /spaces/{s}/blocks/{b}/available?expand
///
/// §9(c): the admin gate is commented out in the source; preserved here as
/// any-authenticated (no `require_admin` call — `SpaceService::available_block_nets`
/// doesn't gate either).
pub async fn available_block_nets(
    State(state): State<Arc<AppState>>,
    auth: Auth,
    Path((space, block)): Path<(String, String)>,
    Query(q): Query<ExpandQuery>,
) -> Result<Json<Vec<VNetView>>> {
    let nets = state.service.available_block_nets(&auth.0, &space, &block, q.expand).await?;
    Ok(Json(nets))
}

/// GET /spaces/{s}/blocks/{b}/networks?expand
pub async fn list_block_networks(
    State(state): State<Arc<AppState>>,
    auth: Auth,
    Path((space, block)): Path<(String, String)>,
    Query(q): Query<ExpandQuery>,
) -> Result<Json<Vec<VNetView>>> {
    let nets = state.service.list_block_networks(&auth.0, &space, &block, q.expand).await?;
    Ok(Json(nets))
}

/// POST /spaces/{s}/blocks/{b}/networks
pub async fn attach_network(
    State(state): State<Arc<AppState>>,
    auth: Auth,
    Path((space, block)): Path<(String, String)>,
    Json(body): Json<AttachNetworkBody>,
) -> Result<ApiResponse<Block>> {
    info!(%space, %block, id = %body.id, "attaching network");
    let updated = state.service.attach_network(&auth.0, &space, &block, body.id).await?;
    Ok(ApiResponse::created(updated))
}

/// PUT /spaces/{s}/blocks/{b}/networks
pub async fn replace_networks(
    State(state): State<Arc<AppState>>,
    auth: Auth,
    Path((space, block)): Path<(String, String)>,
    Json(body): Json<ReplaceNetworksBody>,
) -> Result<Json<Block>> {
    info!(%space, %block, count = body.ids.len(), "replacing network list");
    let updated = state.service.replace_networks(&auth.0, &space, &block, body.ids).await?;
    Ok(Json(updated))
}

/// DELETE /spaces/{s}/blocks/{b}/networks
pub async fn detach_networks(
    State(state): State<Arc<AppState>>,
    auth: Auth,
    Path((space, block)): Path<(String, String)>,
    Json(body): Json<DetachNetworksBody>,
) -> Result<Json<Block>> {
    info!(%space, %block, count = body.ids.len(), "detaching networks");
    let updated = state.service.detach_networks(&auth.0, &space, &block, body.ids).await?;
    Ok(Json(updated))
}
