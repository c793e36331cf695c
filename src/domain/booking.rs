//! Booking aggregate: status graph, timeline, and the actor gate.
//! The booking record is the only shared mutable resource in this core;
//! every mutation goes through a conditional update keyed on the status
//! observed by the caller.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "booking_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Accepted,
    OnTheWay,
    Arrived,
    InProgress,
    Completed,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Accepted => "accepted",
            BookingStatus::OnTheWay => "on_the_way",
            BookingStatus::Arrived => "arrived",
            BookingStatus::InProgress => "in_progress",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Completed | BookingStatus::Cancelled)
    }

    /// The allowed-transition graph. Anything not listed here is illegal.
    pub fn allowed_targets(&self) -> &'static [BookingStatus] {
        match self {
            BookingStatus::Pending => &[BookingStatus::Accepted, BookingStatus::Cancelled],
            BookingStatus::Accepted => &[BookingStatus::OnTheWay, BookingStatus::Cancelled],
            BookingStatus::OnTheWay => &[BookingStatus::Arrived, BookingStatus::Cancelled],
            BookingStatus::Arrived => &[BookingStatus::InProgress, BookingStatus::Cancelled],
            BookingStatus::InProgress => &[BookingStatus::Completed, BookingStatus::Cancelled],
            BookingStatus::Completed => &[],
            BookingStatus::Cancelled => &[],
        }
    }

    pub fn can_transition_to(&self, target: BookingStatus) -> bool {
        self.allowed_targets().contains(&target)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Unpaid,
    Paid,
    Refunded,
    Partial,
}

/// One entry in the append-only status audit log. Entries are never
/// reordered or truncated; the booking's `status` column always equals the
/// status of the newest entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub status: BookingStatus,
    pub at: DateTime<Utc>,
    pub note: String,
}

impl TimelineEntry {
    pub fn now(status: BookingStatus, note: impl Into<String>) -> Self {
        Self {
            status,
            at: Utc::now(),
            note: note.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Booking {
    pub id: Uuid,
    /// Human-readable reference shown to customers and agents, distinct
    /// from the storage key. Format `<PREFIX>-<year>-<NNNN>`.
    pub reference: String,
    pub customer_id: Uuid,
    pub service_id: Uuid,
    pub agent_id: Option<Uuid>,
    pub agent_name: Option<String>,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
    pub coupon_code: Option<String>,
    pub payment_status: PaymentStatus,
    pub payment_method: String,
    pub status: BookingStatus,
    pub timeline: Json<Vec<TimelineEntry>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Who is requesting a state change. Authentication itself happens upstream;
/// this is only the authorization gate over the transition graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", content = "id", rename_all = "snake_case")]
pub enum Actor {
    Customer(Uuid),
    Agent(Uuid),
    Admin,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_is_legal() {
        let path = [
            BookingStatus::Pending,
            BookingStatus::Accepted,
            BookingStatus::OnTheWay,
            BookingStatus::Arrived,
            BookingStatus::InProgress,
            BookingStatus::Completed,
        ];
        for pair in path.windows(2) {
            assert!(
                pair[0].can_transition_to(pair[1]),
                "{} -> {} should be legal",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn test_pending_cannot_skip_to_on_the_way() {
        assert!(!BookingStatus::Pending.can_transition_to(BookingStatus::OnTheWay));
    }

    #[test]
    fn test_every_active_status_can_cancel() {
        for status in [
            BookingStatus::Pending,
            BookingStatus::Accepted,
            BookingStatus::OnTheWay,
            BookingStatus::Arrived,
            BookingStatus::InProgress,
        ] {
            assert!(status.can_transition_to(BookingStatus::Cancelled));
        }
    }

    #[test]
    fn test_terminal_statuses_allow_nothing() {
        assert!(BookingStatus::Completed.allowed_targets().is_empty());
        assert!(BookingStatus::Cancelled.allowed_targets().is_empty());
        assert!(!BookingStatus::Cancelled.can_transition_to(BookingStatus::Pending));
    }

    #[test]
    fn test_no_backwards_transitions() {
        assert!(!BookingStatus::Arrived.can_transition_to(BookingStatus::OnTheWay));
        assert!(!BookingStatus::InProgress.can_transition_to(BookingStatus::Accepted));
        assert!(!BookingStatus::Completed.can_transition_to(BookingStatus::InProgress));
    }

    #[test]
    fn test_status_serializes_as_snake_case() {
        let json = serde_json::to_string(&BookingStatus::OnTheWay).unwrap();
        assert_eq!(json, "\"on_the_way\"");

        let back: BookingStatus = serde_json::from_str("\"in_progress\"").unwrap();
        assert_eq!(back, BookingStatus::InProgress);
    }

    #[test]
    fn test_actor_payload_shape() {
        let admin: Actor = serde_json::from_str(r#"{"role":"admin"}"#).unwrap();
        assert_eq!(admin, Actor::Admin);

        let id = Uuid::new_v4();
        let customer: Actor =
            serde_json::from_value(serde_json::json!({"role": "customer", "id": id})).unwrap();
        assert_eq!(customer, Actor::Customer(id));
    }
}
