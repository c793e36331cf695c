use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::db::queries;
use crate::domain::agent::{Agent, AgentStatus};
use crate::error::AppError;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateAgentPayload {
    pub name: String,
    pub phone: Option<String>,
}

pub async fn create_agent(
    State(state): State<AppState>,
    Json(payload): Json<CreateAgentPayload>,
) -> Result<impl IntoResponse, AppError> {
    let name = payload.name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::Validation("agent name cannot be empty".to_string()));
    }

    let now = Utc::now();
    let agent = Agent {
        id: Uuid::new_v4(),
        name,
        phone: payload.phone,
        status: AgentStatus::Active,
        is_online: false,
        total_jobs: 0,
        completed_jobs: 0,
        total_earnings: Decimal::ZERO,
        wallet_balance: Decimal::ZERO,
        created_at: now,
        updated_at: now,
    };

    let inserted = queries::insert_agent(&state.db, &agent).await?;

    Ok((StatusCode::CREATED, Json(inserted)))
}

pub async fn get_agent(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let agent = queries::get_agent(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("agent {}", id)))?;

    Ok(Json(agent))
}

#[derive(Debug, Deserialize)]
pub struct ListAgentsQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn list_agents(
    State(state): State<AppState>,
    Query(query): Query<ListAgentsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let limit = query.limit.unwrap_or(50).clamp(1, 200);
    let offset = query.offset.unwrap_or(0).max(0);

    Ok(Json(queries::list_agents(&state.db, limit, offset).await?))
}

#[derive(Debug, Deserialize)]
pub struct UpdateAgentPayload {
    pub status: Option<AgentStatus>,
    pub is_online: Option<bool>,
}

pub async fn update_agent(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateAgentPayload>,
) -> Result<impl IntoResponse, AppError> {
    let agent = queries::update_agent_profile(&state.db, id, payload.status, payload.is_online)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("agent {}", id)))?;

    Ok(Json(agent))
}
