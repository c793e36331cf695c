use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::coupon::{CouponUpdate, DiscountType};
use crate::error::AppError;
use crate::services::coupons::{CouponService, NewCoupon};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateCouponPayload {
    pub code: String,
    pub description: Option<String>,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    #[serde(default)]
    pub min_order_value: Decimal,
    #[serde(default)]
    pub max_discount: Decimal,
    pub expiry_date: Option<DateTime<Utc>>,
    pub usage_limit: Option<i32>,
    #[serde(default)]
    pub once_per_customer: bool,
    pub allowed_customers: Option<Vec<Uuid>>,
}

pub async fn create_coupon(
    State(state): State<AppState>,
    Json(payload): Json<CreateCouponPayload>,
) -> Result<impl IntoResponse, AppError> {
    let service = CouponService::new(state.db.clone());
    let coupon = service
        .create(NewCoupon {
            code: payload.code,
            description: payload.description,
            discount_type: payload.discount_type,
            discount_value: payload.discount_value,
            min_order_value: payload.min_order_value,
            max_discount: payload.max_discount,
            expiry_date: payload.expiry_date,
            usage_limit: payload.usage_limit,
            once_per_customer: payload.once_per_customer,
            allowed_customers: payload.allowed_customers,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(coupon)))
}

#[derive(Debug, Deserialize)]
pub struct ListCouponsQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn list_coupons(
    State(state): State<AppState>,
    Query(query): Query<ListCouponsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let service = CouponService::new(state.db.clone());
    let limit = query.limit.unwrap_or(50).clamp(1, 200);
    let offset = query.offset.unwrap_or(0).max(0);

    Ok(Json(service.list(limit, offset).await?))
}

pub async fn get_coupon(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let service = CouponService::new(state.db.clone());

    Ok(Json(service.get(id).await?))
}

pub async fn update_coupon(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(patch): Json<CouponUpdate>,
) -> Result<impl IntoResponse, AppError> {
    let service = CouponService::new(state.db.clone());

    Ok(Json(service.update(id, patch).await?))
}

#[derive(Debug, Deserialize)]
pub struct ValidateCouponPayload {
    pub code: String,
    pub order_value: Decimal,
    pub customer_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct ValidateCouponResponse {
    pub code: String,
    pub discount: Decimal,
    pub total: Decimal,
}

pub async fn validate_coupon(
    State(state): State<AppState>,
    Json(payload): Json<ValidateCouponPayload>,
) -> Result<impl IntoResponse, AppError> {
    let service = CouponService::new(state.db.clone());
    let quote = service
        .validate(&payload.code, payload.order_value, payload.customer_id)
        .await?;

    Ok(Json(ValidateCouponResponse {
        code: quote.coupon.code,
        discount: quote.discount,
        total: quote.total,
    }))
}

#[derive(Debug, Deserialize)]
pub struct RedeemCouponPayload {
    pub customer_id: Uuid,
}

pub async fn redeem_coupon(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<RedeemCouponPayload>,
) -> Result<impl IntoResponse, AppError> {
    let service = CouponService::new(state.db.clone());
    service.redeem(id, payload.customer_id).await?;

    Ok(StatusCode::NO_CONTENT)
}
