use crate::auth::Auth;
use crate::error::Result;
use crate::handlers::common::SettledQuery;
use crate::response::{ApiResponse, NoContent};
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::Json;
use ipam_core::Reservation;
use ipam_engine::space_service::{MultiBlockReservationRequest, ReservationRequest};
use std::sync::Arc;
use tracing::info;

/// GET /spaces/{s}/reservations?settled
pub async fn list_space_reservations(
    State(state): State<Arc<AppState>>,
    auth: Auth,
    Path(space): Path<String>,
    Query(q): Query<SettledQuery>,
) -> Result<Json<Vec<Reservation>>> {
    let list = state.service.list_space_reservations(&auth.0, &space, q.settled).await?;
    Ok(Json(list))
}

/// POST /spaces/{s}/reservations (multi-block fallback)
pub async fn create_multi_block_reservation(
    State(state): State<Arc<AppState>>,
    auth: Auth,
    Path(space): Path<String>,
    Json(body): Json<MultiBlockReservationRequest>,
) -> Result<ApiResponse<Reservation>> {
    info!(%space, blocks = ?body.blocks, "creating multi-block reservation");
    let resv = state.service.create_multi_block_reservation(&auth.0, &space, body).await?;
    Ok(ApiResponse::created(resv))
}

/// GET /spaces/{s}/blocks/{b}/reservations?settled
pub async fn list_block_reservations(
    State(state): State<Arc<AppState>>,
    auth: Auth,
    Path((space, block)): Path<(String, String)>,
    Query(q): Query<SettledQuery>,
) -> Result<Json<Vec<Reservation>>> {
    let list = state.service.list_block_reservations(&auth.0, &space, &block, q.settled).await?;
    Ok(Json(list))
}

/// POST /spaces/{s}/blocks/{b}/reservations
pub async fn create_block_reservation(
    State(state): State<Arc<AppState>>,
    auth: Auth,
    Path((space, block)): Path<(String, String)>,
    Json(body): Json<ReservationRequest>,
) -> Result<ApiResponse<Reservation>> {
    info!(%space, %block, "creating reservation");
    let resv = state.service.create_block_reservation(&auth.0, &space, &block, body).await?;
    Ok(ApiResponse::created(resv))
}

/// DELETE /spaces/{s}/blocks/{b}/reservations  body: [ids]
pub async fn delete_block_reservations(
    State(state): State<Arc<AppState>>,
    auth: Auth,
    Path((space, block)): Path<(String, String)>,
    Json(ids): Json<Vec<String>>,
) -> Result<NoContent> {
    info!(%space, %block, count = ids.len(), "settling reservations");
    state.service.delete_block_reservations(&auth.0, &space, &block, ids).await?;
    Ok(NoContent)
}

/// GET /spaces/{s}/blocks/{b}/reservations/{id}
pub async fn get_reservation(
    State(state): State<Arc<AppState>>,
    auth: Auth,
    Path((space, block, id)): Path<(String, String, String)>,
) -> Result<Json<Reservation>> {
    let resv = state.service.get_reservation(&auth.0, &space, &block, &id).await?;
    Ok(Json(resv))
}

/// DELETE /spaces/{s}/blocks/{b}/reservations/{id}
pub async fn delete_reservation(
    State(state): State<Arc<AppState>>,
    auth: Auth,
    Path((space, block, id)): Path<(String, String, String)>,
) -> Result<NoContent> {
    info!(%space, %block, %id, "settling reservation");
    state.service.delete_reservation(&auth.0, &space, &block, &id).await?;
    Ok(NoContent)
}
