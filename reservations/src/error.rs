//! Error and refusal types.
//!
//! Two tiers:
//!
//! - [`Refusal`]: a decision, not a failure. The gate, the state machine and the
//!   bulk operations return it as a value; the caller simply does not write.
//! - [`ServiceError`]: something genuinely went wrong (store unreachable,
//!   malformed record, gateway failure) and must be surfaced to the user.

use crate::ingest::IngestError;
use crate::lifecycle::TransitionError;
use crate::payment_gateway::{GatewayError, RefundReceipt};
use crate::store::StoreError;
use crate::types::{ReservationId, ReservationStatus};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Recoverable refusal to act on a reservation
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum Refusal {
    /// The requested status change is not in the transition table
    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),

    /// The reservation is in the wrong state for this operation
    #[error("Reservation is not eligible while {status}")]
    NotEligible {
        /// Status at the time of the request
        status: ReservationStatus,
    },

    /// A dependent ticket needs the attendant to confirm the guardian is present
    #[error("Guardian ticket {parent_id} presence has not been confirmed")]
    GuardianNotConfirmed {
        /// Guardian (parent) reservation
        parent_id: ReservationId,
    },

    /// A gate decision was applied to a reservation it was not made for
    #[error("Gate decision was made for reservation {decided_for}")]
    DecisionMismatch {
        /// Reservation the decision belongs to
        decided_for: ReservationId,
    },
}

impl Refusal {
    /// Short machine-readable reason, used as a metrics label
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::InvalidTransition(_) => "invalid_transition",
            Self::NotEligible { .. } => "not_eligible",
            Self::GuardianNotConfirmed { .. } => "guardian_not_confirmed",
            Self::DecisionMismatch { .. } => "decision_mismatch",
        }
    }
}

/// Hard failure surfaced by the service layer
#[derive(Debug, Error)]
pub enum ServiceError {
    /// No reservation with this identifier
    #[error("Reservation {0} not found")]
    NotFound(ReservationId),

    /// Persistence failure
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Refund or reconciliation collaborator failure
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// The gateway returned the money but the reservation could not be moved
    /// to `refunded`; the receipt is kept for manual follow-up
    #[error("Refund {} paid out but not recorded; reservation is {status}", .receipt.transaction_id)]
    RefundNotRecorded {
        /// Gateway receipt of the completed refund
        receipt: RefundReceipt,
        /// Status found on the last read
        status: ReservationStatus,
    },

    /// Stored document could not be normalized
    #[error(transparent)]
    Ingest(#[from] IngestError),
}

/// Result type for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;
