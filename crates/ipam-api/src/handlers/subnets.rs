use crate::auth::Auth;
use crate::error::Result;
use crate::response::{ApiResponse, NoContent};
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::Json;
use ipam_core::ExternalSubnet;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct CreateSubnetBody {
    pub name: String,
    #[serde(default)]
    pub desc: String,
    pub cidr: Option<String>,
    pub size: Option<u8>,
}

/// GET /spaces/{s}/blocks/{b}/externals/{e}/subnets
pub async fn list_subnets(
    State(state): State<Arc<AppState>>,
    auth: Auth,
    Path((space, block, ext)): Path<(String, String, String)>,
) -> Result<Json<Vec<ExternalSubnet>>> {
    let list = state.service.list_subnets(&auth.0, &space, &block, &ext).await?;
    Ok(Json(list))
}

/// POST /spaces/{s}/blocks/{b}/externals/{e}/subnets
pub async fn create_subnet(
    State(state): State<Arc<AppState>>,
    auth: Auth,
    Path((space, block, ext)): Path<(String, String, String)>,
    Json(body): Json<CreateSubnetBody>,
) -> Result<ApiResponse<ExternalSubnet>> {
    info!(%space, %block, %ext, name = %body.name, "creating subnet");
    let subnet = state
        .service
        .create_subnet(&auth.0, &space, &block, &ext, body.name, body.desc, body.cidr, body.size)
        .await?;
    Ok(ApiResponse::created(subnet))
}

/// GET /spaces/{s}/blocks/{b}/externals/{e}/subnets/{n}
pub async fn get_subnet(
    State(state): State<Arc<AppState>>,
    auth: Auth,
    Path((space, block, ext, subnet)): Path<(String, String, String, String)>,
) -> Result<Json<ExternalSubnet>> {
    let view = state.service.get_subnet(&auth.0, &space, &block, &ext, &subnet).await?;
    Ok(Json(view))
}

/// PATCH /spaces/{s}/blocks/{b}/externals/{e}/subnets/{n}
pub async fn patch_subnet(
    State(state): State<Arc<AppState>>,
    auth: Auth,
    Path((space, block, ext, subnet)): Path<(String, String, String, String)>,
    Json(ops): Json<Vec<json_patch::PatchOperation>>,
) -> Result<Json<ExternalSubnet>> {
    info!(%space, %block, %ext, %subnet, "patching subnet");
    let updated = state.service.patch_subnet(&auth.0, &space, &block, &ext, &subnet, &ops).await?;
    Ok(Json(updated))
}

/// DELETE /spaces/{s}/blocks/{b}/externals/{e}/subnets/{n}
pub async fn delete_subnet(
    State(state): State<Arc<AppState>>,
    auth: Auth,
    Path((space, block, ext, subnet)): Path<(String, String, String, String)>,
) -> Result<NoContent> {
    info!(%space, %block, %ext, %subnet, "deleting subnet");
    state.service.delete_subnet(&auth.0, &space, &block, &ext, &subnet).await?;
    Ok(NoContent)
}
