//! Booking creation and the status state machine.
//!
//! Every state change is a single conditional update keyed on the status the
//! caller observed, so two racing writers can never both succeed. The
//! notification hook runs after the write commits and is fire-and-forget.

use chrono::{Datelike, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::queries;
use crate::domain::booking::{Actor, Booking, BookingStatus, PaymentStatus, TimelineEntry};
use crate::domain::coupon;
use crate::domain::reference;
use crate::error::AppError;
use crate::services::coupons::classify_redemption_failure;
use crate::services::notifications::NotificationDispatcher;

#[derive(Debug, Clone)]
pub struct NewBooking {
    pub customer_id: Uuid,
    pub service_id: Uuid,
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub payment_method: String,
    pub coupon_code: Option<String>,
}

#[derive(Clone)]
pub struct BookingService {
    pool: PgPool,
    dispatcher: NotificationDispatcher,
    ref_prefix: String,
}

impl BookingService {
    pub fn new(pool: PgPool, dispatcher: NotificationDispatcher, ref_prefix: String) -> Self {
        Self {
            pool,
            dispatcher,
            ref_prefix,
        }
    }

    /// Create a booking, quoting and redeeming the coupon (if any) in the
    /// same transaction as the insert. A redemption that loses its guard
    /// rolls the whole booking back, so a discounted booking and a spent
    /// coupon use always appear together or not at all.
    pub async fn create(&self, req: NewBooking) -> Result<Booking, AppError> {
        if req.subtotal < Decimal::ZERO {
            return Err(AppError::Validation("subtotal cannot be negative".to_string()));
        }
        if req.tax < Decimal::ZERO {
            return Err(AppError::Validation("tax cannot be negative".to_string()));
        }

        // Quote the coupon up front. Only the conditional redemption below
        // holds under concurrency; this read is for the discount amount and
        // early, precise rejections.
        let coupon = match &req.coupon_code {
            Some(code) => Some(
                queries::get_coupon_by_code(&self.pool, code)
                    .await?
                    .ok_or_else(|| AppError::NotFound(format!("coupon {}", code)))?,
            ),
            None => None,
        };

        let discount = match &coupon {
            Some(c) => coupon::evaluate(c, req.subtotal, req.customer_id, Utc::now())?,
            None => Decimal::ZERO,
        };
        let total = (req.subtotal - discount + req.tax).max(Decimal::ZERO);
        let now = Utc::now();

        let mut tx = self.pool.begin().await?;

        let year = now.year();
        let seq = queries::next_reference_seq(&mut tx, year).await?;

        let booking = Booking {
            id: Uuid::new_v4(),
            reference: reference::format_reference(&self.ref_prefix, year, seq),
            customer_id: req.customer_id,
            service_id: req.service_id,
            agent_id: None,
            agent_name: None,
            subtotal: req.subtotal,
            discount,
            tax: req.tax,
            total,
            coupon_code: coupon.as_ref().map(|c| c.code.clone()),
            payment_status: PaymentStatus::Unpaid,
            payment_method: req.payment_method,
            status: BookingStatus::Pending,
            timeline: Json(vec![TimelineEntry {
                status: BookingStatus::Pending,
                at: now,
                note: "Booking created".to_string(),
            }]),
            created_at: now,
            updated_at: now,
        };

        let inserted = queries::insert_booking(&mut tx, &booking).await?;

        if let Some(c) = &coupon {
            let redeemed = queries::redeem_coupon(&mut tx, c.id, req.customer_id).await?;
            if redeemed.is_none() {
                tx.rollback().await?;
                return Err(classify_redemption_failure(&self.pool, c.id, req.customer_id).await);
            }
        }

        tx.commit().await?;

        tracing::info!(
            booking = %inserted.reference,
            customer = %inserted.customer_id,
            total = %inserted.total,
            "booking created"
        );

        Ok(inserted)
    }

    /// Move a booking to `target` on behalf of `actor`. The transition graph
    /// decides what is legal from the current status; the actor gate decides
    /// who may ask for it. A guard miss after a graph-legal check means a
    /// concurrent writer got there first.
    pub async fn transition(
        &self,
        booking_id: Uuid,
        target: BookingStatus,
        actor: Actor,
        note: Option<String>,
    ) -> Result<Booking, AppError> {
        let booking = queries::get_booking(&self.pool, booking_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("booking {}", booking_id)))?;

        authorize(&booking, target, &actor)?;

        if !booking.status.can_transition_to(target) {
            return Err(AppError::InvalidTransition {
                from: booking.status,
                to: target,
            });
        }

        let entry = TimelineEntry::now(target, note.unwrap_or_else(|| default_note(target)));

        let updated = if target == BookingStatus::Completed {
            self.complete(&booking, &entry).await?
        } else {
            queries::transition_booking(&self.pool, booking.id, booking.status, target, &entry)
                .await?
                .ok_or_else(|| {
                    AppError::Conflict("booking was modified concurrently".to_string())
                })?
        };

        self.dispatcher.dispatch_transition(booking.status, &updated);
        Ok(updated)
    }

    /// Completion is the one transition with financial side effects: the
    /// status write, the payment capture, and the agent credit commit or
    /// fail as a unit. The `agent_credits` ledger keeps the credit from ever
    /// applying twice, whatever path retries take.
    async fn complete(&self, booking: &Booking, entry: &TimelineEntry) -> Result<Booking, AppError> {
        let mut tx = self.pool.begin().await?;

        let updated = queries::complete_booking(&mut tx, booking.id, booking.status, entry)
            .await?
            .ok_or_else(|| AppError::Conflict("booking was modified concurrently".to_string()))?;

        if let Some(agent_id) = updated.agent_id {
            let credited = queries::credit_agent(&mut tx, updated.id, agent_id, updated.total).await?;
            if credited {
                tracing::info!(
                    booking = %updated.reference,
                    agent = %agent_id,
                    amount = %updated.total,
                    "agent credited for completion"
                );
            }
        }

        tx.commit().await?;
        Ok(updated)
    }
}

fn default_note(target: BookingStatus) -> String {
    match target {
        BookingStatus::Pending => "Booking awaiting acceptance",
        BookingStatus::Accepted => "Booking accepted",
        BookingStatus::OnTheWay => "Agent is on the way",
        BookingStatus::Arrived => "Agent arrived",
        BookingStatus::InProgress => "Service in progress",
        BookingStatus::Completed => "Service completed",
        BookingStatus::Cancelled => "Booking cancelled",
    }
    .to_string()
}

/// The actor gate. Admin is unrestricted within the graph; a customer may
/// only cancel their own booking, and only while it is pending or accepted
/// (after that, cancellation goes through the agent or support); an agent
/// may only drive bookings currently bound to them.
fn authorize(booking: &Booking, target: BookingStatus, actor: &Actor) -> Result<(), AppError> {
    match actor {
        Actor::Admin => Ok(()),
        Actor::Customer(id) => {
            if *id != booking.customer_id {
                return Err(AppError::Unauthorized(
                    "booking belongs to another customer".to_string(),
                ));
            }
            if target != BookingStatus::Cancelled {
                return Err(AppError::Unauthorized(
                    "customers can only cancel a booking".to_string(),
                ));
            }
            if !matches!(
                booking.status,
                BookingStatus::Pending | BookingStatus::Accepted
            ) {
                return Err(AppError::Unauthorized(
                    "cancellation is handled by the agent or support once the agent is en route"
                        .to_string(),
                ));
            }
            Ok(())
        }
        Actor::Agent(id) => {
            if booking.agent_id != Some(*id) {
                return Err(AppError::Unauthorized(
                    "booking is not assigned to this agent".to_string(),
                ));
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_booking(status: BookingStatus, agent_id: Option<Uuid>) -> Booking {
        let now = Utc::now();
        Booking {
            id: Uuid::new_v4(),
            reference: "GLN-2026-0001".to_string(),
            customer_id: Uuid::new_v4(),
            service_id: Uuid::new_v4(),
            agent_id,
            agent_name: agent_id.map(|_| "Sam".to_string()),
            subtotal: Decimal::from(100),
            discount: Decimal::ZERO,
            tax: Decimal::ZERO,
            total: Decimal::from(100),
            coupon_code: None,
            payment_status: PaymentStatus::Unpaid,
            payment_method: "cash".to_string(),
            status,
            timeline: Json(vec![TimelineEntry::now(status, "seed")]),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_admin_is_unrestricted() {
        let booking = test_booking(BookingStatus::InProgress, None);
        assert!(authorize(&booking, BookingStatus::Completed, &Actor::Admin).is_ok());
    }

    #[test]
    fn test_customer_can_cancel_own_pending_booking() {
        let booking = test_booking(BookingStatus::Pending, None);
        let actor = Actor::Customer(booking.customer_id);
        assert!(authorize(&booking, BookingStatus::Cancelled, &actor).is_ok());
    }

    #[test]
    fn test_customer_cannot_cancel_someone_elses_booking() {
        let booking = test_booking(BookingStatus::Pending, None);
        let actor = Actor::Customer(Uuid::new_v4());
        assert!(matches!(
            authorize(&booking, BookingStatus::Cancelled, &actor),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_customer_cannot_cancel_once_agent_is_en_route() {
        let booking = test_booking(BookingStatus::OnTheWay, Some(Uuid::new_v4()));
        let actor = Actor::Customer(booking.customer_id);
        assert!(matches!(
            authorize(&booking, BookingStatus::Cancelled, &actor),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_customer_cannot_drive_progress_statuses() {
        let booking = test_booking(BookingStatus::Pending, None);
        let actor = Actor::Customer(booking.customer_id);
        assert!(matches!(
            authorize(&booking, BookingStatus::Accepted, &actor),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_bound_agent_may_progress() {
        let agent_id = Uuid::new_v4();
        let booking = test_booking(BookingStatus::Accepted, Some(agent_id));
        assert!(authorize(&booking, BookingStatus::OnTheWay, &Actor::Agent(agent_id)).is_ok());
    }

    #[test]
    fn test_unbound_agent_is_rejected() {
        let booking = test_booking(BookingStatus::Accepted, Some(Uuid::new_v4()));
        let other = Actor::Agent(Uuid::new_v4());
        assert!(matches!(
            authorize(&booking, BookingStatus::OnTheWay, &other),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_agent_can_cancel_mid_job() {
        let agent_id = Uuid::new_v4();
        let booking = test_booking(BookingStatus::Arrived, Some(agent_id));
        assert!(authorize(&booking, BookingStatus::Cancelled, &Actor::Agent(agent_id)).is_ok());
    }
}
