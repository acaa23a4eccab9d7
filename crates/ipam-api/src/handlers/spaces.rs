use crate::auth::Auth;
use crate::error::Result;
use crate::handlers::common::{ExpandUtilQuery, ForceQuery};
use crate::response::{ApiResponse, NoContent};
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::Json;
use ipam_core::Space;
use ipam_engine::space_service::SpaceView;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
pub struct CreateSpaceBody {
    pub name: String,
    #[serde(default)]
    pub desc: String,
}

/// GET /spaces
pub async fn list_spaces(
    State(state): State<Arc<AppState>>,
    auth: Auth,
    Query(q): Query<ExpandUtilQuery>,
) -> Result<Json<Vec<SpaceView>>> {
    debug!(tenant = %auth.0.tenant_id, "listing spaces");
    let spaces = state.service.list_spaces(&auth.0, q.expand, q.utilization).await?;
    Ok(Json(spaces))
}

/// POST /spaces
pub async fn create_space(
    State(state): State<Arc<AppState>>,
    auth: Auth,
    Json(body): Json<CreateSpaceBody>,
) -> Result<ApiResponse<Space>> {
    info!(tenant = %auth.0.tenant_id, name = %body.name, "creating space");
    let space = state.service.create_space(&auth.0, body.name, body.desc).await?;
    Ok(ApiResponse::created(space))
}

/// GET /spaces/{s}
pub async fn get_space(
    State(state): State<Arc<AppState>>,
    auth: Auth,
    Path(space): Path<String>,
    Query(q): Query<ExpandUtilQuery>,
) -> Result<Json<SpaceView>> {
    let view = state.service.get_space(&auth.0, &space, q.expand, q.utilization).await?;
    Ok(Json(view))
}

/// PATCH /spaces/{s}
pub async fn patch_space(
    State(state): State<Arc<AppState>>,
    auth: Auth,
    Path(space): Path<String>,
    Json(ops): Json<Vec<json_patch::PatchOperation>>,
) -> Result<Json<Space>> {
    info!(tenant = %auth.0.tenant_id, %space, "patching space");
    let updated = state.service.patch_space(&auth.0, &space, &ops).await?;
    Ok(Json(updated))
}

/// DELETE /spaces/{s}?force
pub async fn delete_space(
    State(state): State<Arc<AppState>>,
    auth: Auth,
    Path(space): Path<String>,
    Query(q): Query<ForceQuery>,
) -> Result<NoContent> {
    info!(tenant = %auth.0.tenant_id, %space, force = q.force, "deleting space");
    state.service.delete_space(&auth.0, &space, q.force).await?;
    Ok(NoContent)
}
