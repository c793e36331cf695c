use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::db::queries;
use crate::domain::booking::{Actor, BookingStatus};
use crate::error::AppError;
use crate::services::bookings::{BookingService, NewBooking};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateBookingPayload {
    pub customer_id: Uuid,
    pub service_id: Uuid,
    pub subtotal: Decimal,
    #[serde(default)]
    pub tax: Decimal,
    pub payment_method: Option<String>,
    pub coupon_code: Option<String>,
}

pub async fn create_booking(
    State(state): State<AppState>,
    Json(payload): Json<CreateBookingPayload>,
) -> Result<impl IntoResponse, AppError> {
    let service = BookingService::new(
        state.db.clone(),
        state.notifier.clone(),
        state.booking_ref_prefix.clone(),
    );

    let booking = service
        .create(NewBooking {
            customer_id: payload.customer_id,
            service_id: payload.service_id,
            subtotal: payload.subtotal,
            tax: payload.tax,
            payment_method: payload.payment_method.unwrap_or_else(|| "cash".to_string()),
            coupon_code: payload.coupon_code,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(booking)))
}

pub async fn get_booking(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let booking = queries::get_booking(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("booking {}", id)))?;

    Ok(Json(booking))
}

pub async fn get_booking_by_reference(
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let booking = queries::get_booking_by_reference(&state.db, &reference)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("booking {}", reference)))?;

    Ok(Json(booking))
}

#[derive(Debug, Deserialize)]
pub struct ListBookingsQuery {
    pub customer_id: Option<Uuid>,
    pub agent_id: Option<Uuid>,
    pub status: Option<BookingStatus>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn list_bookings(
    State(state): State<AppState>,
    Query(query): Query<ListBookingsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let limit = query.limit.unwrap_or(50).clamp(1, 200);
    let offset = query.offset.unwrap_or(0).max(0);

    let bookings = queries::list_bookings(
        &state.db,
        query.customer_id,
        query.agent_id,
        query.status,
        limit,
        offset,
    )
    .await?;

    Ok(Json(bookings))
}

#[derive(Debug, Deserialize)]
pub struct TransitionPayload {
    pub status: BookingStatus,
    pub note: Option<String>,
    pub actor: Actor,
}

pub async fn transition_booking(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<TransitionPayload>,
) -> Result<impl IntoResponse, AppError> {
    let service = BookingService::new(
        state.db.clone(),
        state.notifier.clone(),
        state.booking_ref_prefix.clone(),
    );

    let booking = service
        .transition(id, payload.status, payload.actor, payload.note)
        .await?;

    Ok(Json(booking))
}
