use crate::auth::Auth;
use crate::error::Result;
use crate::response::{ApiResponse, NoContent};
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::Json;
use ipam_core::ExternalEndpoint;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct CreateEndpointBody {
    pub name: String,
    #[serde(default)]
    pub desc: String,
    pub ip: Option<String>,
}

/// GET /spaces/{s}/blocks/{b}/externals/{e}/subnets/{n}/endpoints
pub async fn list_endpoints(
    State(state): State<Arc<AppState>>,
    auth: Auth,
    Path((space, block, ext, subnet)): Path<(String, String, String, String)>,
) -> Result<Json<Vec<ExternalEndpoint>>> {
    let list = state.service.list_endpoints(&auth.0, &space, &block, &ext, &subnet).await?;
    Ok(Json(list))
}

/// POST /spaces/{s}/blocks/{b}/externals/{e}/subnets/{n}/endpoints
pub async fn create_endpoint(
    State(state): State<Arc<AppState>>,
    auth: Auth,
    Path((space, block, ext, subnet)): Path<(String, String, String, String)>,
    Json(body): Json<CreateEndpointBody>,
) -> Result<ApiResponse<ExternalEndpoint>> {
    info!(%space, %block, %ext, %subnet, name = %body.name, "creating endpoint");
    let endpoint = state
        .service
        .create_endpoint(&auth.0, &space, &block, &ext, &subnet, body.name, body.desc, body.ip)
        .await?;
    Ok(ApiResponse::created(endpoint))
}

/// GET /spaces/{s}/blocks/{b}/externals/{e}/subnets/{n}/endpoints/{p}
pub async fn get_endpoint(
    State(state): State<Arc<AppState>>,
    auth: Auth,
    Path((space, block, ext, subnet, endpoint)): Path<(String, String, String, String, String)>,
) -> Result<Json<ExternalEndpoint>> {
    let view = state.service.get_endpoint(&auth.0, &space, &block, &ext, &subnet, &endpoint).await?;
    Ok(Json(view))
}

/// PATCH /spaces/{s}/blocks/{b}/externals/{e}/subnets/{n}/endpoints/{p}
pub async fn patch_endpoint(
    State(state): State<Arc<AppState>>,
    auth: Auth,
    Path((space, block, ext, subnet, endpoint)): Path<(String, String, String, String, String)>,
    Json(ops): Json<Vec<json_patch::PatchOperation>>,
) -> Result<Json<ExternalEndpoint>> {
    info!(%space, %block, %ext, %subnet, %endpoint, "patching endpoint");
    let updated = state
        .service
        .patch_endpoint(&auth.0, &space, &block, &ext, &subnet, &endpoint, &ops)
        .await?;
    Ok(Json(updated))
}

/// DELETE /spaces/{s}/blocks/{b}/externals/{e}/subnets/{n}/endpoints/{p}
pub async fn delete_endpoint(
    State(state): State<Arc<AppState>>,
    auth: Auth,
    Path((space, block, ext, subnet, endpoint)): Path<(String, String, String, String, String)>,
) -> Result<NoContent> {
    info!(%space, %block, %ext, %subnet, %endpoint, "deleting endpoint");
    state.service.delete_endpoint(&auth.0, &space, &block, &ext, &subnet, &endpoint).await?;
    Ok(NoContent)
}
