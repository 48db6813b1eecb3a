//! Reservation state machine.
//!
//! The authoritative table of legal status changes. It performs no writes; it
//! only answers whether a caller may proceed to write.
//!
//! ```text
//! pending / waiting_payment ──► confirmed          payment gateway confirms funds
//! pending / waiting_payment ──► cancelled/rejected payment declined or timed out
//! confirmed ──► validated                          entry gate approves check-in
//! confirmed ──► cancelled                          partner cancels, no refund
//! confirmed ──► refunded                           partner refunds
//! validated, cancelled, rejected, refunded         terminal
//! ```
//!
//! `approved` and `paid` are accepted wherever `confirmed` is, both as source
//! and as target.

use crate::types::{ReservationStatus, StatusPhase};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What caused a legal transition
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Trigger {
    /// Payment gateway confirmed funds
    PaymentConfirmed,
    /// Payment gateway declined, or the payment window timed out
    PaymentFailed,
    /// Attendant admitted the guest through the entry gate
    EntryValidated,
    /// Partner cancelled without refund
    PartnerCancelled,
    /// Partner refunded the guest
    PartnerRefunded,
}

/// The state machine refused a requested status change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("Invalid transition from {from} to {to}")]
pub struct TransitionError {
    /// Current status
    pub from: ReservationStatus,
    /// Requested status
    pub to: ReservationStatus,
}

/// Legal status transitions
#[derive(Clone, Copy, Debug, Default)]
pub struct StateMachine;

impl StateMachine {
    /// Check whether `from → to` is legal, naming its trigger.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] for every pair not in the transition table,
    /// including same-status and same-phase requests.
    pub const fn transition(
        from: ReservationStatus,
        to: ReservationStatus,
    ) -> Result<Trigger, TransitionError> {
        use StatusPhase::{
            AwaitingPayment, Cancelled, PaymentConfirmed, Refunded, Rejected, Validated,
        };

        match (from.phase(), to.phase()) {
            (AwaitingPayment, PaymentConfirmed) => Ok(Trigger::PaymentConfirmed),
            (AwaitingPayment, Cancelled | Rejected) => Ok(Trigger::PaymentFailed),
            (PaymentConfirmed, Validated) => Ok(Trigger::EntryValidated),
            (PaymentConfirmed, Cancelled) => Ok(Trigger::PartnerCancelled),
            (PaymentConfirmed, Refunded) => Ok(Trigger::PartnerRefunded),
            _ => Err(TransitionError { from, to }),
        }
    }

    /// Whether `from → to` is legal
    #[must_use]
    pub const fn is_legal(from: ReservationStatus, to: ReservationStatus) -> bool {
        Self::transition(from, to).is_ok()
    }

    /// Every status reachable from `from` in one step
    #[must_use]
    pub fn legal_targets(from: ReservationStatus) -> Vec<ReservationStatus> {
        ReservationStatus::ALL
            .into_iter()
            .filter(|to| Self::is_legal(from, *to))
            .collect()
    }

    /// Whether the date of a reservation in `status` may be changed.
    ///
    /// Rescheduling is not a status transition; it is allowed only while
    /// payment is confirmed and entry is unused.
    #[must_use]
    pub const fn can_reschedule(status: ReservationStatus) -> bool {
        status.is_payment_confirmed()
    }
}
