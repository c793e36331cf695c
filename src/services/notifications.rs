//! User-facing notifications for booking lifecycle events.
//!
//! Delivery is best effort: the dispatcher fires after a transition has
//! committed and failures are logged, never propagated. The event mapping is
//! a closed enum so a new booking status cannot ship without someone
//! deciding what (if anything) gets announced for it.

use failsafe::futures::CircuitBreaker as FuturesCircuitBreaker;
use failsafe::{backoff, failure_policy, Config, Error as FailsafeError, StateMachine};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::booking::{Booking, BookingStatus};

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("notification endpoint returned {0}")]
    Status(reqwest::StatusCode),
    #[error("notification circuit breaker is open")]
    CircuitOpen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Recipient {
    Customer,
    Agent,
}

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub recipient: Recipient,
    pub recipient_id: Uuid,
    pub booking_reference: String,
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationEvent {
    Assigned,
    Accepted,
    EnRoute,
    Arrived,
    Started,
    Completed,
    Cancelled,
}

impl NotificationEvent {
    /// Map the status a booking just entered to its notification event.
    /// Exhaustive on purpose: adding a status without deciding its
    /// notification is a compile error, not a silent no-op.
    pub fn for_transition(target: BookingStatus) -> Option<NotificationEvent> {
        match target {
            // Entering pending happens through assignment, announced as Assigned.
            BookingStatus::Pending => None,
            BookingStatus::Accepted => Some(NotificationEvent::Accepted),
            BookingStatus::OnTheWay => Some(NotificationEvent::EnRoute),
            BookingStatus::Arrived => Some(NotificationEvent::Arrived),
            BookingStatus::InProgress => Some(NotificationEvent::Started),
            BookingStatus::Completed => Some(NotificationEvent::Completed),
            BookingStatus::Cancelled => Some(NotificationEvent::Cancelled),
        }
    }
}

/// Render the messages an event produces for a given booking.
pub fn messages_for(event: NotificationEvent, booking: &Booking) -> Vec<Message> {
    let agent_name = booking.agent_name.as_deref().unwrap_or("your agent");
    let mut messages = Vec::new();

    let customer = |title: &str, body: String| Message {
        recipient: Recipient::Customer,
        recipient_id: booking.customer_id,
        booking_reference: booking.reference.clone(),
        title: title.to_string(),
        body,
    };

    match event {
        NotificationEvent::Assigned => {
            if let Some(agent_id) = booking.agent_id {
                messages.push(Message {
                    recipient: Recipient::Agent,
                    recipient_id: agent_id,
                    booking_reference: booking.reference.clone(),
                    title: "New job assigned".to_string(),
                    body: format!("Booking {} is waiting for your confirmation", booking.reference),
                });
            }
        }
        NotificationEvent::Accepted => {
            messages.push(customer(
                "Booking accepted",
                format!("{} accepted booking {}", agent_name, booking.reference),
            ));
        }
        NotificationEvent::EnRoute => {
            messages.push(customer(
                "Agent on the way",
                format!("{} is on the way for booking {}", agent_name, booking.reference),
            ));
        }
        NotificationEvent::Arrived => {
            messages.push(customer(
                "Agent arrived",
                format!("{} has arrived for booking {}", agent_name, booking.reference),
            ));
        }
        NotificationEvent::Started => {
            messages.push(customer(
                "Service started",
                format!("Work on booking {} is underway", booking.reference),
            ));
        }
        NotificationEvent::Completed => {
            messages.push(customer(
                "Service completed",
                format!("Booking {} is complete. Thank you!", booking.reference),
            ));
            if let Some(agent_id) = booking.agent_id {
                messages.push(Message {
                    recipient: Recipient::Agent,
                    recipient_id: agent_id,
                    booking_reference: booking.reference.clone(),
                    title: "Job completed".to_string(),
                    body: format!("You earned {} for booking {}", booking.total, booking.reference),
                });
            }
        }
        NotificationEvent::Cancelled => {
            messages.push(customer(
                "Booking cancelled",
                format!("Booking {} was cancelled", booking.reference),
            ));
            if let Some(agent_id) = booking.agent_id {
                messages.push(Message {
                    recipient: Recipient::Agent,
                    recipient_id: agent_id,
                    booking_reference: booking.reference.clone(),
                    title: "Job cancelled".to_string(),
                    body: format!("Booking {} was cancelled", booking.reference),
                });
            }
        }
    }

    messages
}

/// HTTP client for the external notification gateway.
#[derive(Clone)]
pub struct NotifyClient {
    client: Client,
    endpoint: String,
    circuit_breaker: StateMachine<failure_policy::ConsecutiveFailures<backoff::EqualJittered>, ()>,
}

impl NotifyClient {
    pub fn new(endpoint: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();

        let backoff = backoff::equal_jittered(Duration::from_secs(60), Duration::from_secs(120));
        let policy = failure_policy::consecutive_failures(3, backoff);
        let circuit_breaker = Config::new().failure_policy(policy).build();

        NotifyClient {
            client,
            endpoint,
            circuit_breaker,
        }
    }

    pub async fn push(&self, message: &Message) -> Result<(), NotifyError> {
        let client = self.client.clone();
        let url = self.endpoint.clone();
        let payload = message.clone();

        let result = self
            .circuit_breaker
            .call(async move {
                let response = client.post(&url).json(&payload).send().await?;

                if !response.status().is_success() {
                    return Err(NotifyError::Status(response.status()));
                }

                Ok(())
            })
            .await;

        match result {
            Ok(()) => Ok(()),
            Err(FailsafeError::Rejected) => Err(NotifyError::CircuitOpen),
            Err(FailsafeError::Inner(e)) => Err(e),
        }
    }
}

/// Fire-and-forget fan-out. Without a configured webhook the messages are
/// logged locally, which keeps development environments quiet but visible.
#[derive(Clone)]
pub struct NotificationDispatcher {
    client: Option<NotifyClient>,
}

impl NotificationDispatcher {
    pub fn new(webhook_url: Option<String>) -> Self {
        Self {
            client: webhook_url.map(NotifyClient::new),
        }
    }

    pub fn dispatch_transition(&self, from: BookingStatus, booking: &Booking) {
        let Some(event) = NotificationEvent::for_transition(booking.status) else {
            return;
        };
        tracing::debug!(
            booking = %booking.reference,
            from = %from,
            to = %booking.status,
            "dispatching transition notifications"
        );
        self.send_all(messages_for(event, booking));
    }

    pub fn dispatch_assignment(&self, booking: &Booking) {
        self.send_all(messages_for(NotificationEvent::Assigned, booking));
    }

    fn send_all(&self, messages: Vec<Message>) {
        let Some(client) = self.client.clone() else {
            for message in &messages {
                tracing::info!(
                    booking = %message.booking_reference,
                    recipient = ?message.recipient,
                    title = %message.title,
                    "notification (no webhook configured)"
                );
            }
            return;
        };

        // Delivery must never fail or delay the transition that triggered it.
        tokio::spawn(async move {
            for message in messages {
                if let Err(e) = client.push(&message).await {
                    tracing::warn!(
                        booking = %message.booking_reference,
                        error = %e,
                        "notification delivery failed"
                    );
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::booking::{PaymentStatus, TimelineEntry};
    use chrono::Utc;
    use rust_decimal::Decimal;
    use sqlx::types::Json;

    fn test_booking(agent: Option<Uuid>) -> Booking {
        Booking {
            id: Uuid::new_v4(),
            reference: "GLN-2026-0001".to_string(),
            customer_id: Uuid::new_v4(),
            service_id: Uuid::new_v4(),
            agent_id: agent,
            agent_name: agent.map(|_| "Sam".to_string()),
            subtotal: Decimal::from(50),
            discount: Decimal::ZERO,
            tax: Decimal::ZERO,
            total: Decimal::from(50),
            coupon_code: None,
            payment_status: PaymentStatus::Unpaid,
            payment_method: "cash".to_string(),
            status: BookingStatus::Completed,
            timeline: Json(vec![TimelineEntry::now(
                BookingStatus::Pending,
                "Booking created",
            )]),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_every_status_has_a_mapping_decision() {
        assert_eq!(
            NotificationEvent::for_transition(BookingStatus::Pending),
            None
        );
        assert_eq!(
            NotificationEvent::for_transition(BookingStatus::OnTheWay),
            Some(NotificationEvent::EnRoute)
        );
        assert_eq!(
            NotificationEvent::for_transition(BookingStatus::Completed),
            Some(NotificationEvent::Completed)
        );
    }

    #[test]
    fn test_completion_notifies_customer_and_agent() {
        let booking = test_booking(Some(Uuid::new_v4()));
        let messages = messages_for(NotificationEvent::Completed, &booking);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].recipient, Recipient::Customer);
        assert_eq!(messages[1].recipient, Recipient::Agent);
    }

    #[test]
    fn test_cancellation_without_agent_notifies_customer_only() {
        let booking = test_booking(None);
        let messages = messages_for(NotificationEvent::Cancelled, &booking);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].recipient, Recipient::Customer);
    }

    #[test]
    fn test_assignment_targets_the_agent() {
        let agent_id = Uuid::new_v4();
        let booking = test_booking(Some(agent_id));
        let messages = messages_for(NotificationEvent::Assigned, &booking);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].recipient_id, agent_id);
    }

    #[tokio::test]
    #[ignore]
    async fn test_push_delivers_to_webhook() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/notify")
            .with_status(200)
            .create_async()
            .await;

        let client = NotifyClient::new(format!("{}/notify", server.url()));
        let booking = test_booking(None);
        let messages = messages_for(NotificationEvent::Cancelled, &booking);

        client.push(&messages[0]).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    #[ignore]
    async fn test_push_surfaces_gateway_errors() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/notify")
            .with_status(502)
            .create_async()
            .await;

        let client = NotifyClient::new(format!("{}/notify", server.url()));
        let booking = test_booking(None);
        let messages = messages_for(NotificationEvent::Cancelled, &booking);

        let result = client.push(&messages[0]).await;
        assert!(matches!(result, Err(NotifyError::Status(_))));
    }
}
