use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Result, Transaction as SqlxTransaction};
use uuid::Uuid;

use crate::domain::agent::{Agent, AgentStatus};
use crate::domain::booking::{Booking, BookingStatus, TimelineEntry};
use crate::domain::coupon::{Coupon, CouponUpdate};

// --- Booking queries ---

pub async fn insert_booking(
    executor: &mut SqlxTransaction<'_, Postgres>,
    booking: &Booking,
) -> Result<Booking> {
    sqlx::query_as::<_, Booking>(
        r#"
        INSERT INTO bookings (
            id, reference, customer_id, service_id, agent_id, agent_name,
            subtotal, discount, tax, total, coupon_code,
            payment_status, payment_method, status, timeline, created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
        RETURNING *
        "#,
    )
    .bind(booking.id)
    .bind(&booking.reference)
    .bind(booking.customer_id)
    .bind(booking.service_id)
    .bind(booking.agent_id)
    .bind(&booking.agent_name)
    .bind(booking.subtotal)
    .bind(booking.discount)
    .bind(booking.tax)
    .bind(booking.total)
    .bind(&booking.coupon_code)
    .bind(booking.payment_status)
    .bind(&booking.payment_method)
    .bind(booking.status)
    .bind(booking.timeline.clone())
    .bind(booking.created_at)
    .bind(booking.updated_at)
    .fetch_one(&mut **executor)
    .await
}

pub async fn get_booking(pool: &PgPool, id: Uuid) -> Result<Option<Booking>> {
    sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn get_booking_by_reference(pool: &PgPool, reference: &str) -> Result<Option<Booking>> {
    sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE reference = $1")
        .bind(reference)
        .fetch_optional(pool)
        .await
}

pub async fn list_bookings(
    pool: &PgPool,
    customer_id: Option<Uuid>,
    agent_id: Option<Uuid>,
    status: Option<BookingStatus>,
    limit: i64,
    offset: i64,
) -> Result<Vec<Booking>> {
    sqlx::query_as::<_, Booking>(
        r#"
        SELECT * FROM bookings
        WHERE ($1::uuid IS NULL OR customer_id = $1)
          AND ($2::uuid IS NULL OR agent_id = $2)
          AND ($3::booking_status IS NULL OR status = $3)
        ORDER BY created_at DESC
        LIMIT $4 OFFSET $5
        "#,
    )
    .bind(customer_id)
    .bind(agent_id)
    .bind(status)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
}

/// Conditional status update: succeeds only if the booking is still in the
/// status the caller observed. A miss (None) means a concurrent writer won.
pub async fn transition_booking(
    pool: &PgPool,
    id: Uuid,
    expected: BookingStatus,
    target: BookingStatus,
    entry: &TimelineEntry,
) -> Result<Option<Booking>> {
    sqlx::query_as::<_, Booking>(
        r#"
        UPDATE bookings
        SET status = $3, timeline = timeline || $4, updated_at = NOW()
        WHERE id = $1 AND status = $2
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(expected)
    .bind(target)
    .bind(Json(entry.clone()))
    .fetch_optional(pool)
    .await
}

/// The completion variant of the status update: the same guard, plus the
/// payment collection that entering `completed` implies. Runs inside the
/// caller's transaction so the agent credit commits or rolls back with it.
pub async fn complete_booking(
    executor: &mut SqlxTransaction<'_, Postgres>,
    id: Uuid,
    expected: BookingStatus,
    entry: &TimelineEntry,
) -> Result<Option<Booking>> {
    sqlx::query_as::<_, Booking>(
        r#"
        UPDATE bookings
        SET status = 'completed', payment_status = 'paid',
            timeline = timeline || $3, updated_at = NOW()
        WHERE id = $1 AND status = $2
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(expected)
    .bind(Json(entry.clone()))
    .fetch_optional(&mut **executor)
    .await
}

/// Bind an agent and force the booking back to `pending` (awaiting
/// acceptance). Guarded on the observed prior status.
pub async fn assign_agent(
    pool: &PgPool,
    id: Uuid,
    expected: BookingStatus,
    agent_id: Uuid,
    agent_name: &str,
    entry: &TimelineEntry,
) -> Result<Option<Booking>> {
    sqlx::query_as::<_, Booking>(
        r#"
        UPDATE bookings
        SET agent_id = $3, agent_name = $4, status = 'pending',
            timeline = timeline || $5, updated_at = NOW()
        WHERE id = $1 AND status = $2
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(expected)
    .bind(agent_id)
    .bind(agent_name)
    .bind(Json(entry.clone()))
    .fetch_optional(pool)
    .await
}

/// Acceptance guard includes the bound agent, so two agents racing over the
/// same pending booking cannot both win.
pub async fn accept_booking(
    pool: &PgPool,
    id: Uuid,
    agent_id: Uuid,
    entry: &TimelineEntry,
) -> Result<Option<Booking>> {
    sqlx::query_as::<_, Booking>(
        r#"
        UPDATE bookings
        SET status = 'accepted', timeline = timeline || $3, updated_at = NOW()
        WHERE id = $1 AND status = 'pending' AND agent_id = $2
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(agent_id)
    .bind(Json(entry.clone()))
    .fetch_optional(pool)
    .await
}

/// A reject both unbinds the agent and cancels the booking in one statement,
/// so a rejected booking can never end up cancelled but still bound.
pub async fn reject_booking(
    pool: &PgPool,
    id: Uuid,
    agent_id: Uuid,
    entry: &TimelineEntry,
) -> Result<Option<Booking>> {
    sqlx::query_as::<_, Booking>(
        r#"
        UPDATE bookings
        SET status = 'cancelled', agent_id = NULL, agent_name = NULL,
            timeline = timeline || $3, updated_at = NOW()
        WHERE id = $1 AND status = 'pending' AND agent_id = $2
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(agent_id)
    .bind(Json(entry.clone()))
    .fetch_optional(pool)
    .await
}

/// Apply the completion credit at most once per booking. The insert into
/// `agent_credits` is the idempotency guard; the counters move only when
/// this call actually inserted the row. Returns whether the credit applied.
pub async fn credit_agent(
    executor: &mut SqlxTransaction<'_, Postgres>,
    booking_id: Uuid,
    agent_id: Uuid,
    amount: Decimal,
) -> Result<bool> {
    let inserted = sqlx::query(
        r#"
        INSERT INTO agent_credits (booking_id, agent_id, amount)
        VALUES ($1, $2, $3)
        ON CONFLICT (booking_id) DO NOTHING
        "#,
    )
    .bind(booking_id)
    .bind(agent_id)
    .bind(amount)
    .execute(&mut **executor)
    .await?
    .rows_affected();

    if inserted == 0 {
        return Ok(false);
    }

    sqlx::query(
        r#"
        UPDATE agents
        SET total_jobs = total_jobs + 1,
            completed_jobs = completed_jobs + 1,
            total_earnings = total_earnings + $2,
            wallet_balance = wallet_balance + $2,
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(agent_id)
    .bind(amount)
    .execute(&mut **executor)
    .await?;

    Ok(true)
}

/// Allocate the next booking reference number for a year. The upsert makes
/// the allocation atomic, so references are unique and strictly monotonic.
pub async fn next_reference_seq(
    executor: &mut SqlxTransaction<'_, Postgres>,
    year: i32,
) -> Result<i64> {
    sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO booking_sequences (year, value)
        VALUES ($1, 1)
        ON CONFLICT (year) DO UPDATE SET value = booking_sequences.value + 1
        RETURNING value
        "#,
    )
    .bind(year)
    .fetch_one(&mut **executor)
    .await
}

// --- Coupon queries ---

pub async fn insert_coupon(pool: &PgPool, coupon: &Coupon) -> Result<Coupon> {
    sqlx::query_as::<_, Coupon>(
        r#"
        INSERT INTO coupons (
            id, code, description, discount_type, discount_value,
            min_order_value, max_discount, expiry_date, usage_limit,
            times_used, is_active, allowed_customers, used_by, created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
        RETURNING *
        "#,
    )
    .bind(coupon.id)
    .bind(&coupon.code)
    .bind(&coupon.description)
    .bind(coupon.discount_type)
    .bind(coupon.discount_value)
    .bind(coupon.min_order_value)
    .bind(coupon.max_discount)
    .bind(coupon.expiry_date)
    .bind(coupon.usage_limit)
    .bind(coupon.times_used)
    .bind(coupon.is_active)
    .bind(coupon.allowed_customers.clone())
    .bind(coupon.used_by.clone())
    .bind(coupon.created_at)
    .bind(coupon.updated_at)
    .fetch_one(pool)
    .await
}

pub async fn get_coupon(pool: &PgPool, id: Uuid) -> Result<Option<Coupon>> {
    sqlx::query_as::<_, Coupon>("SELECT * FROM coupons WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Codes are stored uppercase; lookups normalize the same way.
pub async fn get_coupon_by_code(pool: &PgPool, code: &str) -> Result<Option<Coupon>> {
    sqlx::query_as::<_, Coupon>("SELECT * FROM coupons WHERE code = UPPER($1)")
        .bind(code)
        .fetch_optional(pool)
        .await
}

pub async fn list_coupons(pool: &PgPool, limit: i64, offset: i64) -> Result<Vec<Coupon>> {
    sqlx::query_as::<_, Coupon>(
        "SELECT * FROM coupons ORDER BY created_at DESC LIMIT $1 OFFSET $2",
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
}

pub async fn update_coupon(
    pool: &PgPool,
    id: Uuid,
    patch: &CouponUpdate,
) -> Result<Option<Coupon>> {
    sqlx::query_as::<_, Coupon>(
        r#"
        UPDATE coupons
        SET description = COALESCE($2, description),
            discount_value = COALESCE($3, discount_value),
            min_order_value = COALESCE($4, min_order_value),
            max_discount = COALESCE($5, max_discount),
            expiry_date = COALESCE($6, expiry_date),
            usage_limit = COALESCE($7, usage_limit),
            is_active = COALESCE($8, is_active),
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(&patch.description)
    .bind(patch.discount_value)
    .bind(patch.min_order_value)
    .bind(patch.max_discount)
    .bind(patch.expiry_date)
    .bind(patch.usage_limit)
    .bind(patch.is_active)
    .fetch_optional(pool)
    .await
}

/// Redemption as one conditional statement: re-checks activity, expiry,
/// remaining uses and the per-customer ledger, increments the counter, and
/// appends the customer to the ledger (when one is kept) atomically.
/// None means some guard failed; the caller classifies the reason.
pub async fn redeem_coupon(
    executor: &mut SqlxTransaction<'_, Postgres>,
    coupon_id: Uuid,
    customer_id: Uuid,
) -> Result<Option<Coupon>> {
    sqlx::query_as::<_, Coupon>(
        r#"
        UPDATE coupons
        SET times_used = times_used + 1,
            used_by = CASE
                WHEN used_by IS NULL THEN NULL
                ELSE used_by || to_jsonb($2::text)
            END,
            updated_at = NOW()
        WHERE id = $1
          AND is_active
          AND (expiry_date IS NULL OR expiry_date > NOW())
          AND (usage_limit IS NULL OR times_used < usage_limit)
          AND (used_by IS NULL OR NOT used_by @> to_jsonb($2::text))
        RETURNING *
        "#,
    )
    .bind(coupon_id)
    .bind(customer_id)
    .fetch_optional(&mut **executor)
    .await
}

// --- Agent queries ---

pub async fn insert_agent(pool: &PgPool, agent: &Agent) -> Result<Agent> {
    sqlx::query_as::<_, Agent>(
        r#"
        INSERT INTO agents (
            id, name, phone, status, is_online, total_jobs, completed_jobs,
            total_earnings, wallet_balance, created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        RETURNING *
        "#,
    )
    .bind(agent.id)
    .bind(&agent.name)
    .bind(&agent.phone)
    .bind(agent.status)
    .bind(agent.is_online)
    .bind(agent.total_jobs)
    .bind(agent.completed_jobs)
    .bind(agent.total_earnings)
    .bind(agent.wallet_balance)
    .bind(agent.created_at)
    .bind(agent.updated_at)
    .fetch_one(pool)
    .await
}

pub async fn get_agent(pool: &PgPool, id: Uuid) -> Result<Option<Agent>> {
    sqlx::query_as::<_, Agent>("SELECT * FROM agents WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn list_agents(pool: &PgPool, limit: i64, offset: i64) -> Result<Vec<Agent>> {
    sqlx::query_as::<_, Agent>("SELECT * FROM agents ORDER BY created_at DESC LIMIT $1 OFFSET $2")
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
}

pub async fn update_agent_profile(
    pool: &PgPool,
    id: Uuid,
    status: Option<AgentStatus>,
    is_online: Option<bool>,
) -> Result<Option<Agent>> {
    sqlx::query_as::<_, Agent>(
        r#"
        UPDATE agents
        SET status = COALESCE($2, status),
            is_online = COALESCE($3, is_online),
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(status)
    .bind(is_online)
    .fetch_optional(pool)
    .await
}
