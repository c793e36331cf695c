//! Coupon rules: eligibility checks and discount math.
//!
//! `evaluate` is a pure function of the coupon row, the order value, and the
//! requesting customer; it never touches the store. The mutation side
//! (ledger append + counter increment) lives in `db::queries::redeem_coupon`
//! as one conditional statement.

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "discount_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    Percentage,
    Fixed,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Coupon {
    pub id: Uuid,
    /// Stored normalized (uppercase); lookups are case-insensitive.
    pub code: String,
    pub description: Option<String>,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    pub min_order_value: Decimal,
    /// Cap for percentage discounts; zero means uncapped.
    pub max_discount: Decimal,
    pub expiry_date: Option<DateTime<Utc>>,
    /// None means unlimited redemptions.
    pub usage_limit: Option<i32>,
    pub times_used: i32,
    pub is_active: bool,
    /// None means the coupon is open to every customer.
    pub allowed_customers: Option<Json<Vec<Uuid>>>,
    /// Per-customer redemption ledger. None means the ledger is disabled and
    /// repeat redemptions by the same customer are not tracked.
    pub used_by: Option<Json<Vec<Uuid>>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Why a coupon cannot be applied. Checks run in a fixed order and stop at
/// the first failure, so the caller always sees the most fundamental reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CouponRejection {
    #[error("coupon is not active")]
    Inactive,
    #[error("coupon has expired")]
    Expired,
    #[error("coupon usage limit reached")]
    LimitReached,
    #[error("order value is below the coupon minimum")]
    BelowMinimum,
    #[error("coupon is not available for this customer")]
    NotEligible,
    #[error("coupon was already used by this customer")]
    AlreadyUsed,
}

impl CouponRejection {
    pub fn kind(&self) -> &'static str {
        match self {
            CouponRejection::Inactive => "coupon_inactive",
            CouponRejection::Expired => "coupon_expired",
            CouponRejection::LimitReached => "coupon_limit_reached",
            CouponRejection::BelowMinimum => "coupon_below_minimum",
            CouponRejection::NotEligible => "coupon_not_eligible",
            CouponRejection::AlreadyUsed => "coupon_already_used",
        }
    }
}

/// Result of a successful validation: the discount the coupon would grant
/// against the given order value.
#[derive(Debug, Clone, Serialize)]
pub struct Quote {
    pub coupon: Coupon,
    pub discount: Decimal,
    pub total: Decimal,
}

/// Admin-editable fields; `None` leaves the stored value unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CouponUpdate {
    pub description: Option<String>,
    pub discount_value: Option<Decimal>,
    pub min_order_value: Option<Decimal>,
    pub max_discount: Option<Decimal>,
    pub expiry_date: Option<DateTime<Utc>>,
    pub usage_limit: Option<i32>,
    pub is_active: Option<bool>,
}

/// Check the coupon against an order in the canonical order: active,
/// expiry, usage limit, minimum order value, audience, per-customer ledger.
pub fn evaluate(
    coupon: &Coupon,
    order_value: Decimal,
    customer_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Decimal, CouponRejection> {
    if !coupon.is_active {
        return Err(CouponRejection::Inactive);
    }

    if let Some(expiry) = coupon.expiry_date {
        if expiry <= now {
            return Err(CouponRejection::Expired);
        }
    }

    if let Some(limit) = coupon.usage_limit {
        if coupon.times_used >= limit {
            return Err(CouponRejection::LimitReached);
        }
    }

    if order_value < coupon.min_order_value {
        return Err(CouponRejection::BelowMinimum);
    }

    if let Some(allowed) = &coupon.allowed_customers {
        if !allowed.0.contains(&customer_id) {
            return Err(CouponRejection::NotEligible);
        }
    }

    if let Some(used) = &coupon.used_by {
        if used.0.contains(&customer_id) {
            return Err(CouponRejection::AlreadyUsed);
        }
    }

    Ok(compute_discount(
        coupon.discount_type,
        coupon.discount_value,
        coupon.max_discount,
        order_value,
    ))
}

/// Pure discount math. Percentage discounts round half-up to 2 decimal
/// places and respect the cap; fixed discounts never exceed the order value.
pub fn compute_discount(
    discount_type: DiscountType,
    value: Decimal,
    cap: Decimal,
    order_value: Decimal,
) -> Decimal {
    let discount = match discount_type {
        DiscountType::Percentage => {
            let raw = order_value * value / Decimal::from(100);
            let rounded = raw.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
            if cap > Decimal::ZERO && rounded > cap {
                cap
            } else {
                rounded
            }
        }
        DiscountType::Fixed => value.min(order_value),
    };

    discount.max(Decimal::ZERO)
}

/// `order_value - discount`, clamped at zero.
pub fn order_total(order_value: Decimal, discount: Decimal) -> Decimal {
    (order_value - discount).max(Decimal::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn test_coupon() -> Coupon {
        Coupon {
            id: Uuid::new_v4(),
            code: "WASH20".to_string(),
            description: None,
            discount_type: DiscountType::Percentage,
            discount_value: dec("20"),
            min_order_value: Decimal::ZERO,
            max_discount: Decimal::ZERO,
            expiry_date: None,
            usage_limit: None,
            times_used: 0,
            is_active: true,
            allowed_customers: None,
            used_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_percentage_capped() {
        // 20% of 100 is 20, capped at 10.
        let discount = compute_discount(DiscountType::Percentage, dec("20"), dec("10"), dec("100"));
        assert_eq!(discount, dec("10"));
        assert_eq!(order_total(dec("100"), discount), dec("90"));
    }

    #[test]
    fn test_percentage_uncapped_when_cap_is_zero() {
        let discount = compute_discount(DiscountType::Percentage, dec("20"), Decimal::ZERO, dec("250"));
        assert_eq!(discount, dec("50"));
    }

    #[test]
    fn test_fixed_never_exceeds_order_value() {
        let discount = compute_discount(DiscountType::Fixed, dec("50"), Decimal::ZERO, dec("30"));
        assert_eq!(discount, dec("30"));
        assert_eq!(order_total(dec("30"), discount), Decimal::ZERO);
    }

    #[test]
    fn test_rounding_is_half_up() {
        // 15% of 33.50 = 5.025, which rounds up, not to even.
        let discount = compute_discount(DiscountType::Percentage, dec("15"), Decimal::ZERO, dec("33.50"));
        assert_eq!(discount, dec("5.03"));
    }

    #[test]
    fn test_total_never_negative() {
        assert_eq!(order_total(dec("10"), dec("25")), Decimal::ZERO);
    }

    #[test]
    fn test_evaluate_inactive() {
        let mut coupon = test_coupon();
        coupon.is_active = false;
        let result = evaluate(&coupon, dec("100"), Uuid::new_v4(), Utc::now());
        assert_eq!(result, Err(CouponRejection::Inactive));
    }

    #[test]
    fn test_evaluate_expired() {
        let mut coupon = test_coupon();
        coupon.expiry_date = Some(Utc::now() - Duration::days(1));
        let result = evaluate(&coupon, dec("100"), Uuid::new_v4(), Utc::now());
        assert_eq!(result, Err(CouponRejection::Expired));
    }

    #[test]
    fn test_evaluate_limit_reached() {
        let mut coupon = test_coupon();
        coupon.usage_limit = Some(3);
        coupon.times_used = 3;
        let result = evaluate(&coupon, dec("100"), Uuid::new_v4(), Utc::now());
        assert_eq!(result, Err(CouponRejection::LimitReached));
    }

    #[test]
    fn test_evaluate_below_minimum() {
        let mut coupon = test_coupon();
        coupon.min_order_value = dec("50");
        let result = evaluate(&coupon, dec("49.99"), Uuid::new_v4(), Utc::now());
        assert_eq!(result, Err(CouponRejection::BelowMinimum));
    }

    #[test]
    fn test_evaluate_audience_scoped() {
        let insider = Uuid::new_v4();
        let outsider = Uuid::new_v4();
        let mut coupon = test_coupon();
        coupon.allowed_customers = Some(Json(vec![insider]));

        assert_eq!(
            evaluate(&coupon, dec("100"), outsider, Utc::now()),
            Err(CouponRejection::NotEligible)
        );
        assert!(evaluate(&coupon, dec("100"), insider, Utc::now()).is_ok());
    }

    #[test]
    fn test_evaluate_already_used() {
        let customer = Uuid::new_v4();
        let mut coupon = test_coupon();
        coupon.used_by = Some(Json(vec![customer]));

        assert_eq!(
            evaluate(&coupon, dec("100"), customer, Utc::now()),
            Err(CouponRejection::AlreadyUsed)
        );
    }

    #[test]
    fn test_evaluate_no_ledger_means_no_repeat_tracking() {
        let customer = Uuid::new_v4();
        let coupon = test_coupon();
        // used_by is None: the simpler coupon shape without a ledger.
        assert!(evaluate(&coupon, dec("100"), customer, Utc::now()).is_ok());
    }

    #[test]
    fn test_evaluate_checks_expiry_before_minimum() {
        // Order fails two checks at once; expiry must win.
        let mut coupon = test_coupon();
        coupon.expiry_date = Some(Utc::now() - Duration::days(1));
        coupon.min_order_value = dec("500");
        let result = evaluate(&coupon, dec("10"), Uuid::new_v4(), Utc::now());
        assert_eq!(result, Err(CouponRejection::Expired));
    }

    #[test]
    fn test_evaluate_returns_discount() {
        let mut coupon = test_coupon();
        coupon.max_discount = dec("10");
        let discount = evaluate(&coupon, dec("100"), Uuid::new_v4(), Utc::now()).unwrap();
        assert_eq!(discount, dec("10"));
    }
}
