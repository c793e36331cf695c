//! Coupon administration, validation, and redemption.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::queries;
use crate::domain::coupon::{
    self, Coupon, CouponRejection, CouponUpdate, DiscountType, Quote,
};
use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct NewCoupon {
    pub code: String,
    pub description: Option<String>,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    pub min_order_value: Decimal,
    pub max_discount: Decimal,
    pub expiry_date: Option<DateTime<Utc>>,
    pub usage_limit: Option<i32>,
    /// Enables the per-customer ledger so each customer can redeem at most once.
    pub once_per_customer: bool,
    /// Restricts the coupon to the listed customers; None means everyone.
    pub allowed_customers: Option<Vec<Uuid>>,
}

#[derive(Clone)]
pub struct CouponService {
    pool: PgPool,
}

impl CouponService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, req: NewCoupon) -> Result<Coupon, AppError> {
        let code = req.code.trim().to_uppercase();
        if code.is_empty() {
            return Err(AppError::Validation("coupon code cannot be empty".to_string()));
        }
        if req.discount_value < Decimal::ZERO {
            return Err(AppError::Validation(
                "discount value cannot be negative".to_string(),
            ));
        }
        if req.discount_type == DiscountType::Percentage
            && req.discount_value > Decimal::from(100)
        {
            return Err(AppError::Validation(
                "percentage discount cannot exceed 100".to_string(),
            ));
        }
        if req.min_order_value < Decimal::ZERO || req.max_discount < Decimal::ZERO {
            return Err(AppError::Validation(
                "order thresholds cannot be negative".to_string(),
            ));
        }

        let now = Utc::now();
        let coupon = Coupon {
            id: Uuid::new_v4(),
            code,
            description: req.description,
            discount_type: req.discount_type,
            discount_value: req.discount_value,
            min_order_value: req.min_order_value,
            max_discount: req.max_discount,
            expiry_date: req.expiry_date,
            usage_limit: req.usage_limit,
            times_used: 0,
            is_active: true,
            allowed_customers: req.allowed_customers.map(Json),
            used_by: req.once_per_customer.then(|| Json(Vec::new())),
            created_at: now,
            updated_at: now,
        };

        queries::insert_coupon(&self.pool, &coupon)
            .await
            .map_err(|e| {
                if matches!(&e, sqlx::Error::Database(db) if db.is_unique_violation()) {
                    AppError::Conflict(format!("coupon code {} already exists", coupon.code))
                } else {
                    AppError::Database(e)
                }
            })
    }

    pub async fn get(&self, id: Uuid) -> Result<Coupon, AppError> {
        queries::get_coupon(&self.pool, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("coupon {}", id)))
    }

    pub async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Coupon>, AppError> {
        Ok(queries::list_coupons(&self.pool, limit, offset).await?)
    }

    pub async fn update(&self, id: Uuid, patch: CouponUpdate) -> Result<Coupon, AppError> {
        if matches!(patch.discount_value, Some(v) if v < Decimal::ZERO) {
            return Err(AppError::Validation(
                "discount value cannot be negative".to_string(),
            ));
        }

        queries::update_coupon(&self.pool, id, &patch)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("coupon {}", id)))
    }

    /// Read-only check: would this code apply to this order for this
    /// customer, and for how much? Mutates nothing.
    pub async fn validate(
        &self,
        code: &str,
        order_value: Decimal,
        customer_id: Uuid,
    ) -> Result<Quote, AppError> {
        if order_value < Decimal::ZERO {
            return Err(AppError::Validation("order value cannot be negative".to_string()));
        }

        let coupon = queries::get_coupon_by_code(&self.pool, code)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("coupon {}", code.trim().to_uppercase())))?;

        let discount = coupon::evaluate(&coupon, order_value, customer_id, Utc::now())?;
        let total = coupon::order_total(order_value, discount);

        Ok(Quote {
            coupon,
            discount,
            total,
        })
    }

    /// Consume one use of the coupon for this customer. The conditional
    /// update in the store is the linearization point; when it misses we
    /// re-read only to report an accurate reason.
    pub async fn redeem(&self, coupon_id: Uuid, customer_id: Uuid) -> Result<Coupon, AppError> {
        let mut tx = self.pool.begin().await?;

        match queries::redeem_coupon(&mut tx, coupon_id, customer_id).await? {
            Some(coupon) => {
                tx.commit().await?;
                tracing::info!(
                    coupon = %coupon.code,
                    customer = %customer_id,
                    times_used = coupon.times_used,
                    "coupon redeemed"
                );
                Ok(coupon)
            }
            None => {
                tx.rollback().await?;
                Err(classify_redemption_failure(&self.pool, coupon_id, customer_id).await)
            }
        }
    }
}

/// Explain why a redemption guard missed. The order mirrors the guard in
/// `queries::redeem_coupon`; the fallback covers a coupon that changed
/// between the miss and this read.
pub async fn classify_redemption_failure(
    pool: &PgPool,
    coupon_id: Uuid,
    customer_id: Uuid,
) -> AppError {
    match queries::get_coupon(pool, coupon_id).await {
        Ok(Some(coupon)) => {
            if !coupon.is_active {
                return CouponRejection::Inactive.into();
            }
            if let Some(expiry) = coupon.expiry_date {
                if expiry <= Utc::now() {
                    return CouponRejection::Expired.into();
                }
            }
            if let Some(limit) = coupon.usage_limit {
                if coupon.times_used >= limit {
                    return CouponRejection::LimitReached.into();
                }
            }
            if let Some(used) = &coupon.used_by {
                if used.0.contains(&customer_id) {
                    return CouponRejection::AlreadyUsed.into();
                }
            }
            AppError::Conflict("coupon was modified concurrently".to_string())
        }
        Ok(None) => AppError::NotFound(format!("coupon {}", coupon_id)),
        Err(e) => AppError::Database(e),
    }
}
