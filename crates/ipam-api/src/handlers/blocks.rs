use crate::auth::Auth;
use crate::error::Result;
use crate::handlers::common::{ForceQuery, UtilQuery};
use crate::response::{ApiResponse, NoContent};
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::Json;
use ipam_core::Block;
use ipam_engine::space_service::BlockView;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct CreateBlockBody {
    pub name: String,
    pub cidr: String,
}

/// GET /spaces/{s}/blocks
pub async fn list_blocks(
    State(state): State<Arc<AppState>>,
    auth: Auth,
    Path(space): Path<String>,
    Query(q): Query<UtilQuery>,
) -> Result<Json<Vec<BlockView>>> {
    let blocks = state.service.list_blocks(&auth.0, &space, q.utilization).await?;
    Ok(Json(blocks))
}

/// POST /spaces/{s}/blocks
pub async fn create_block(
    State(state): State<Arc<AppState>>,
    auth: Auth,
    Path(space): Path<String>,
    Json(body): Json<CreateBlockBody>,
) -> Result<ApiResponse<Block>> {
    info!(%space, name = %body.name, cidr = %body.cidr, "creating block");
    let block = state.service.create_block(&auth.0, &space, body.name, body.cidr).await?;
    Ok(ApiResponse::created(block))
}

/// GET /spaces/{s}/blocks/{b}
pub async fn get_block(
    State(state): State<Arc<AppState>>,
    auth: Auth,
    Path((space, block)): Path<(String, String)>,
    Query(q): Query<UtilQuery>,
) -> Result<Json<BlockView>> {
    let view = state.service.get_block(&auth.0, &space, &block, q.utilization).await?;
    Ok(Json(view))
}

/// PATCH /spaces/{s}/blocks/{b}
pub async fn patch_block(
    State(state): State<Arc<AppState>>,
    auth: Auth,
    Path((space, block)): Path<(String, String)>,
    Json(ops): Json<Vec<json_patch::PatchOperation>>,
) -> Result<Json<Block>> {
    info!(%space, %block, "patching block");
    let updated = state.service.patch_block(&auth.0, &space, &block, &ops).await?;
    Ok(Json(updated))
}

/// DELETE /spaces/{s}/blocks/{b}?force
pub async fn delete_block(
    State(state): State<Arc<AppState>>,
    auth: Auth,
    Path((space, block)): Path<(String, String)>,
    Query(q): Query<ForceQuery>,
) -> Result<NoContent> {
    info!(%space, %block, force = q.force, "deleting block");
    state.service.delete_block(&auth.0, &space, &block, q.force).await?;
    Ok(NoContent)
}
