use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::services::assignment::AssignmentService;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct AssignPayload {
    pub agent_id: Uuid,
}

pub async fn assign_agent(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AssignPayload>,
) -> Result<impl IntoResponse, AppError> {
    let service = AssignmentService::new(state.db.clone(), state.notifier.clone());
    let booking = service.assign(id, payload.agent_id).await?;

    Ok(Json(booking))
}

#[derive(Debug, Deserialize)]
pub struct AcceptPayload {
    pub agent_id: Uuid,
}

pub async fn accept_booking(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AcceptPayload>,
) -> Result<impl IntoResponse, AppError> {
    let service = AssignmentService::new(state.db.clone(), state.notifier.clone());
    let booking = service.accept(id, payload.agent_id).await?;

    Ok(Json(booking))
}

#[derive(Debug, Deserialize)]
pub struct RejectPayload {
    pub agent_id: Uuid,
    pub reason: Option<String>,
}

pub async fn reject_booking(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<RejectPayload>,
) -> Result<impl IntoResponse, AppError> {
    let service = AssignmentService::new(state.db.clone(), state.notifier.clone());
    let booking = service.reject(id, payload.agent_id, payload.reason).await?;

    Ok(Json(booking))
}
