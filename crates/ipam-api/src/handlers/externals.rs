use crate::auth::Auth;
use crate::error::Result;
use crate::response::{ApiResponse, NoContent};
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::Json;
use ipam_core::ExternalNetwork;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct CreateExternalBody {
    pub name: String,
    #[serde(default)]
    pub desc: String,
    pub cidr: Option<String>,
    pub size: Option<u8>,
}

/// GET /spaces/{s}/blocks/{b}/externals
pub async fn list_externals(
    State(state): State<Arc<AppState>>,
    auth: Auth,
    Path((space, block)): Path<(String, String)>,
) -> Result<Json<Vec<ExternalNetwork>>> {
    let list = state.service.list_externals(&auth.0, &space, &block).await?;
    Ok(Json(list))
}

/// POST /spaces/{s}/blocks/{b}/externals
pub async fn create_external(
    State(state): State<Arc<AppState>>,
    auth: Auth,
    Path((space, block)): Path<(String, String)>,
    Json(body): Json<CreateExternalBody>,
) -> Result<ApiResponse<ExternalNetwork>> {
    info!(%space, %block, name = %body.name, "creating external network");
    let ext = state
        .service
        .create_external(&auth.0, &space, &block, body.name, body.desc, body.cidr, body.size)
        .await?;
    Ok(ApiResponse::created(ext))
}

/// GET /spaces/{s}/blocks/{b}/externals/{e}
pub async fn get_external(
    State(state): State<Arc<AppState>>,
    auth: Auth,
    Path((space, block, ext)): Path<(String, String, String)>,
) -> Result<Json<ExternalNetwork>> {
    let view = state.service.get_external(&auth.0, &space, &block, &ext).await?;
    Ok(Json(view))
}

/// PATCH /spaces/{s}/blocks/{b}/externals/{e}
pub async fn patch_external(
    State(state): State<Arc<AppState>>,
    auth: Auth,
    Path((space, block, ext)): Path<(String, String, String)>,
    Json(ops): Json<Vec<json_patch::PatchOperation>>,
) -> Result<Json<ExternalNetwork>> {
    info!(%space, %block, %ext, "patching external network");
    let updated = state.service.patch_external(&auth.0, &space, &block, &ext, &ops).await?;
    Ok(Json(updated))
}

/// DELETE /spaces/{s}/blocks/{b}/externals/{e}
pub async fn delete_external(
    State(state): State<Arc<AppState>>,
    auth: Auth,
    Path((space, block, ext)): Path<(String, String, String)>,
) -> Result<NoContent> {
    info!(%space, %block, %ext, "deleting external network");
    state.service.delete_external(&auth.0, &space, &block, &ext).await?;
    Ok(NoContent)
}
