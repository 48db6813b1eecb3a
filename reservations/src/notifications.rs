//! Guest notification collaborator.
//!
//! Delivery (email, WhatsApp) lives outside this crate. The engine only hands
//! a [`Notification`] to a [`Notifier`] after the write has committed; a failed
//! delivery is logged and counted, never rolled back.

use crate::types::{GuestContact, ReservationId, ReservationStatus};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Something the guest should hear about
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    /// The reservation moved to a new status
    StatusChanged {
        /// Reservation
        reservation_id: ReservationId,
        /// Recipient
        guest: GuestContact,
        /// Status after the change
        new_status: ReservationStatus,
    },
    /// The visit date moved
    DateChanged {
        /// Reservation
        reservation_id: ReservationId,
        /// Recipient
        guest: GuestContact,
        /// Date before the change
        old_date: NaiveDate,
        /// Date after the change
        new_date: NaiveDate,
    },
}

impl Notification {
    /// Reservation the notification is about
    #[must_use]
    pub const fn reservation_id(&self) -> &ReservationId {
        match self {
            Self::StatusChanged { reservation_id, .. } | Self::DateChanged { reservation_id, .. } => {
                reservation_id
            },
        }
    }
}

/// Delivery failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotificationError {
    /// The channel refused or timed out
    #[error("Notification delivery failed: {0}")]
    DeliveryFailed(String),
}

/// Boxed future returned by [`Notifier::deliver`]
pub type NotifyFuture = Pin<Box<dyn Future<Output = Result<(), NotificationError>> + Send>>;

/// Outbound guest messaging
pub trait Notifier: Send + Sync {
    /// Deliver one notification
    ///
    /// # Errors
    ///
    /// Returns [`NotificationError`] if the channel fails.
    fn deliver(&self, notification: Notification) -> NotifyFuture;
}

/// Logs notifications instead of sending them
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingNotifier;

impl TracingNotifier {
    /// Creates an Arc-wrapped instance for sharing
    #[must_use]
    pub fn shared() -> Arc<dyn Notifier> {
        Arc::new(Self)
    }
}

impl Notifier for TracingNotifier {
    fn deliver(&self, notification: Notification) -> NotifyFuture {
        Box::pin(async move {
            match &notification {
                Notification::StatusChanged {
                    reservation_id,
                    guest,
                    new_status,
                } => tracing::info!(
                    %reservation_id,
                    email = %guest.email,
                    %new_status,
                    "Guest notified of status change"
                ),
                Notification::DateChanged {
                    reservation_id,
                    guest,
                    old_date,
                    new_date,
                } => tracing::info!(
                    %reservation_id,
                    email = %guest.email,
                    %old_date,
                    %new_date,
                    "Guest notified of date change"
                ),
            }
            Ok(())
        })
    }
}

/// Keeps every delivered notification in memory; optionally fails them all
#[derive(Clone, Debug, Default)]
pub struct RecordingNotifier {
    delivered: Arc<Mutex<Vec<Notification>>>,
    failing: bool,
}

impl RecordingNotifier {
    /// Creates a notifier that records and succeeds
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a notifier that records and then reports a delivery failure
    #[must_use]
    pub fn failing() -> Self {
        Self {
            delivered: Arc::default(),
            failing: true,
        }
    }

    /// Everything delivered so far
    #[must_use]
    pub fn delivered(&self) -> Vec<Notification> {
        self.delivered
            .lock()
            .map(|delivered| delivered.clone())
            .unwrap_or_default()
    }
}

impl Notifier for RecordingNotifier {
    fn deliver(&self, notification: Notification) -> NotifyFuture {
        if let Ok(mut delivered) = self.delivered.lock() {
            delivered.push(notification);
        }
        let failing = self.failing;
        Box::pin(async move {
            if failing {
                Err(NotificationError::DeliveryFailed("channel down".to_string()))
            } else {
                Ok(())
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_changed() -> Notification {
        Notification::StatusChanged {
            reservation_id: ReservationId::from("r1"),
            guest: GuestContact::default(),
            new_status: ReservationStatus::Confirmed,
        }
    }

    #[tokio::test]
    async fn recording_notifier_keeps_order() {
        let notifier = RecordingNotifier::new();
        notifier.deliver(status_changed()).await.unwrap_or_default();
        let date_changed = Notification::DateChanged {
            reservation_id: ReservationId::from("r2"),
            guest: GuestContact::default(),
            old_date: NaiveDate::default(),
            new_date: NaiveDate::default(),
        };
        notifier.deliver(date_changed.clone()).await.unwrap_or_default();

        assert_eq!(notifier.delivered(), vec![status_changed(), date_changed]);
    }

    #[tokio::test]
    async fn failing_notifier_still_records() {
        let notifier = RecordingNotifier::failing();
        assert!(notifier.deliver(status_changed()).await.is_err());
        assert_eq!(notifier.delivered().len(), 1);
        assert_eq!(notifier.delivered()[0].reservation_id().as_str(), "r1");
    }

    #[tokio::test]
    async fn tracing_notifier_always_succeeds() {
        assert_eq!(TracingNotifier.deliver(status_changed()).await, Ok(()));
    }
}
