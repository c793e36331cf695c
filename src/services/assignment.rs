//! Binding agents to bookings: assign, accept, reject.
//!
//! All three are single conditional updates. The accept/reject guards
//! include the bound agent id, which is what keeps two agents from both
//! winning the same pending booking.

use sqlx::PgPool;
use uuid::Uuid;

use crate::db::queries;
use crate::domain::agent::AgentStatus;
use crate::domain::booking::{Booking, BookingStatus, TimelineEntry};
use crate::error::AppError;
use crate::services::notifications::NotificationDispatcher;

#[derive(Clone)]
pub struct AssignmentService {
    pool: PgPool,
    dispatcher: NotificationDispatcher,
}

impl AssignmentService {
    pub fn new(pool: PgPool, dispatcher: NotificationDispatcher) -> Self {
        Self { pool, dispatcher }
    }

    /// Bind an active agent to the booking and force it back to `pending`
    /// (awaiting acceptance). Rebinding a not-yet-accepted booking is
    /// idempotent; rebinding mid-job is allowed and resets progress, which
    /// is the dispatcher's call to make, not ours.
    pub async fn assign(&self, booking_id: Uuid, agent_id: Uuid) -> Result<Booking, AppError> {
        let booking = queries::get_booking(&self.pool, booking_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("booking {}", booking_id)))?;

        let agent = queries::get_agent(&self.pool, agent_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("agent {}", agent_id)))?;

        if agent.status != AgentStatus::Active {
            return Err(AppError::AgentNotActive(agent.id));
        }

        if booking.status.is_terminal() {
            return Err(AppError::InvalidTransition {
                from: booking.status,
                to: BookingStatus::Pending,
            });
        }

        let entry = TimelineEntry::now(
            BookingStatus::Pending,
            format!("Assigned to {}, awaiting acceptance", agent.name),
        );

        let updated =
            queries::assign_agent(&self.pool, booking.id, booking.status, agent.id, &agent.name, &entry)
                .await?
                .ok_or_else(|| {
                    AppError::Conflict("booking was modified concurrently".to_string())
                })?;

        tracing::info!(
            booking = %updated.reference,
            agent = %agent.id,
            "agent assigned"
        );

        self.dispatcher.dispatch_assignment(&updated);
        Ok(updated)
    }

    /// The bound agent confirms the job. Legal only while the booking is
    /// pending and still bound to the caller.
    pub async fn accept(&self, booking_id: Uuid, agent_id: Uuid) -> Result<Booking, AppError> {
        let booking = queries::get_booking(&self.pool, booking_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("booking {}", booking_id)))?;

        if booking.agent_id != Some(agent_id) {
            return Err(AppError::Unauthorized(
                "booking is not assigned to this agent".to_string(),
            ));
        }

        if booking.status != BookingStatus::Pending {
            return Err(AppError::InvalidTransition {
                from: booking.status,
                to: BookingStatus::Accepted,
            });
        }

        let agent_name = booking.agent_name.as_deref().unwrap_or("agent");
        let entry = TimelineEntry::now(
            BookingStatus::Accepted,
            format!("Accepted by {}", agent_name),
        );

        let updated = queries::accept_booking(&self.pool, booking.id, agent_id, &entry)
            .await?
            .ok_or_else(|| AppError::Conflict("booking was modified concurrently".to_string()))?;

        self.dispatcher
            .dispatch_transition(BookingStatus::Pending, &updated);
        Ok(updated)
    }

    /// The bound agent turns the job down. A reject unbinds the agent and
    /// cancels the booking outright; there is no return to an unassigned
    /// pool.
    pub async fn reject(
        &self,
        booking_id: Uuid,
        agent_id: Uuid,
        reason: Option<String>,
    ) -> Result<Booking, AppError> {
        let booking = queries::get_booking(&self.pool, booking_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("booking {}", booking_id)))?;

        if booking.agent_id != Some(agent_id) {
            return Err(AppError::Unauthorized(
                "booking is not assigned to this agent".to_string(),
            ));
        }

        if booking.status != BookingStatus::Pending {
            return Err(AppError::InvalidTransition {
                from: booking.status,
                to: BookingStatus::Cancelled,
            });
        }

        let agent_name = booking.agent_name.as_deref().unwrap_or("agent");
        let note = match reason {
            Some(reason) => format!("Rejected by {}: {}", agent_name, reason),
            None => format!("Rejected by {}", agent_name),
        };
        let entry = TimelineEntry::now(BookingStatus::Cancelled, note);

        let updated = queries::reject_booking(&self.pool, booking.id, agent_id, &entry)
            .await?
            .ok_or_else(|| AppError::Conflict("booking was modified concurrently".to_string()))?;

        tracing::info!(booking = %updated.reference, agent = %agent_id, "booking rejected by agent");

        self.dispatcher
            .dispatch_transition(BookingStatus::Pending, &updated);
        Ok(updated)
    }
}
