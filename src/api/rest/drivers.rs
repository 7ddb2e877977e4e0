use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::ingest::LocationReport;
use crate::engine::policy::authorize_location_report;
use crate::error::AppError;
use crate::models::actor::Actor;
use crate::models::location::DriverLocation;
use crate::models::parcel::Parcel;
use crate::state::AppState;

const DEFAULT_HISTORY_LIMIT: usize = 50;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/drivers/:id/location",
            post(report_location).get(current_location),
        )
        .route("/drivers/:id/locations", get(location_history))
        .route("/drivers/:id/parcels", get(active_parcels))
}

#[derive(Deserialize)]
pub struct LocationPayload {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

async fn report_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    actor: Actor,
    Json(payload): Json<LocationPayload>,
) -> Result<Json<LocationReport>, AppError> {
    authorize_location_report(&actor, id)?;

    let report = state
        .ingestor
        .report_location(id, payload.latitude, payload.longitude, payload.address)
        .await?;
    Ok(Json(report))
}

async fn current_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<DriverLocation>, AppError> {
    Ok(Json(state.ingestor.current_location(id).await?))
}

async fn location_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<DriverLocation>>, AppError> {
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    Ok(Json(state.ingestor.location_history(id, limit).await?))
}

async fn active_parcels(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Parcel>>, AppError> {
    Ok(Json(state.ingestor.active_parcels(id).await?))
}
