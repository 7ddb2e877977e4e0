use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::policy::authorize_transition;
use crate::engine::registry::NewParcel;
use crate::engine::state_machine::{TransitionContext, TransitionOutcome};
use crate::error::AppError;
use crate::geo::GeoPoint;
use crate::models::actor::{Actor, ActorRole};
use crate::models::location::NewLocation;
use crate::models::parcel::{Parcel, ParcelStatus, WeightCategory};
use crate::models::tracking::TrackingEvent;
use crate::resolver::coordinate_label;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/parcels", post(create_parcel))
        .route("/parcels/:id", get(get_parcel))
        .route("/parcels/:id/status", get(get_status))
        .route("/parcels/:id/history", get(get_history))
        .route("/parcels/:id/transitions", post(transition_parcel))
        .route("/parcels/:id/override", post(override_parcel))
        .route("/track/:tracking_number", get(track_parcel))
}

#[derive(Deserialize)]
pub struct TransitionRequest {
    pub status: ParcelStatus,
    #[serde(default)]
    pub driver_id: Option<Uuid>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Deserialize)]
pub struct OverrideRequest {
    pub status: ParcelStatus,
    pub reason: String,
    #[serde(default)]
    pub driver_id: Option<Uuid>,
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub parcel_id: Uuid,
    pub tracking_number: String,
    pub status: ParcelStatus,
}

#[derive(Serialize)]
pub struct TrackingView {
    pub tracking_number: String,
    pub status: ParcelStatus,
    pub weight_category: WeightCategory,
    pub destination: String,
    pub events: Vec<TrackingEvent>,
}

async fn create_parcel(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Json(payload): Json<NewParcel>,
) -> Result<(StatusCode, Json<Parcel>), AppError> {
    if !actor.is_admin() && !actor.is(ActorRole::Sender, payload.sender_id) {
        return Err(AppError::Forbidden(
            "parcels can only be registered by their sender or an admin".to_string(),
        ));
    }

    let parcel = state.registry.register(payload).await?;
    Ok((StatusCode::CREATED, Json(parcel)))
}

async fn load_parcel(state: &AppState, id: Uuid) -> Result<Parcel, AppError> {
    state
        .store
        .parcel(id)
        .await?
        .filter(|parcel| parcel.is_active)
        .ok_or_else(|| AppError::NotFound(format!("parcel {id} not found")))
}

async fn get_parcel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Parcel>, AppError> {
    Ok(Json(load_parcel(&state, id).await?))
}

async fn get_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<StatusResponse>, AppError> {
    let parcel = load_parcel(&state, id).await?;
    let status = state.ledger.current_status(id).await?;

    Ok(Json(StatusResponse {
        parcel_id: parcel.id,
        tracking_number: parcel.tracking_number,
        status,
    }))
}

async fn get_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<TrackingEvent>>, AppError> {
    load_parcel(&state, id).await?;
    Ok(Json(state.ledger.history(id).await?))
}

async fn transition_parcel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    actor: Actor,
    Json(payload): Json<TransitionRequest>,
) -> Result<Json<TransitionOutcome>, AppError> {
    let parcel = load_parcel(&state, id).await?;
    authorize_transition(&actor, &parcel, payload.status)?;

    let mut context = TransitionContext::manual();
    if let Some(driver_id) = payload.driver_id {
        context = context.with_driver(driver_id);
    }
    if let Some(note) = payload.note.filter(|note| !note.trim().is_empty()) {
        context = context.with_note(note);
    }
    if let (Some(lat), Some(lng)) = (payload.latitude, payload.longitude) {
        let point = GeoPoint::new(lat, lng)?;
        context.location = Some(NewLocation {
            name: "Reported location".to_string(),
            address: payload
                .address
                .filter(|address| !address.trim().is_empty())
                .unwrap_or_else(|| coordinate_label(&point)),
            latitude: Some(point.lat),
            longitude: Some(point.lng),
        });
    }

    let outcome = state
        .machine
        .transition_with_retry(id, payload.status, &actor, &context)
        .await?;
    Ok(Json(outcome))
}

async fn override_parcel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    actor: Actor,
    Json(payload): Json<OverrideRequest>,
) -> Result<Json<TransitionOutcome>, AppError> {
    let outcome = state
        .machine
        .override_status(id, payload.status, &actor, &payload.reason, payload.driver_id)
        .await?;
    Ok(Json(outcome))
}

async fn track_parcel(
    State(state): State<Arc<AppState>>,
    Path(tracking_number): Path<String>,
) -> Result<Json<TrackingView>, AppError> {
    let parcel = state
        .store
        .parcel_by_tracking_number(tracking_number.trim())
        .await?
        .filter(|parcel| parcel.is_active)
        .ok_or_else(|| AppError::NotFound(format!("tracking number {tracking_number} not found")))?;

    let events = state.ledger.history(parcel.id).await?;
    let status = events
        .first()
        .map(|event| event.status)
        .ok_or_else(|| AppError::NotFound(format!("no tracking events for {tracking_number}")))?;

    Ok(Json(TrackingView {
        tracking_number: parcel.tracking_number,
        status,
        weight_category: parcel.weight_category,
        destination: parcel.destination_location.address,
        events,
    }))
}
