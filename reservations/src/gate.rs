//! Entry-validation gate.
//!
//! Decides whether an attendant may admit a guest. Rules, in order:
//!
//! 1. The reservation must be payment-confirmed, otherwise `NotEligible`.
//! 2. A visit date other than today produces a `DateMismatch` advisory; it
//!    never blocks.
//! 3. A dependent ticket whose guardian record cannot be resolved is let
//!    through with a `ParentUnresolved` advisory. A resolved guardian requires
//!    the attendant's explicit attestation, whatever the guardian's own status
//!    is; without it the gate refuses with `GuardianNotConfirmed`.
//!
//! The gate is pure: the caller resolves the guardian record and passes in
//! today's date. [`admit`] applies an approved decision to the record.

use crate::error::Refusal;
use crate::lifecycle::StateMachine;
use crate::types::{Reservation, ReservationId, ReservationStatus};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Non-blocking notice surfaced to the attendant
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Advisory {
    /// The ticket is for another day
    DateMismatch {
        /// Visit date on the ticket
        ticket_date: NaiveDate,
        /// Date of the check-in attempt
        today: NaiveDate,
    },
    /// The guardian reservation could not be found
    ParentUnresolved {
        /// Identifier the dependent ticket points at
        parent_id: ReservationId,
    },
}

impl Advisory {
    /// Short machine-readable kind, used as a metrics label
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::DateMismatch { .. } => "date_mismatch",
            Self::ParentUnresolved { .. } => "parent_unresolved",
        }
    }
}

/// Outcome of [`can_validate`]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateDecision {
    reservation_id: ReservationId,
    refusal: Option<Refusal>,
    advisories: Vec<Advisory>,
    attested_guardian: Option<ReservationId>,
}

impl GateDecision {
    fn allowed(
        reservation: &Reservation,
        advisories: Vec<Advisory>,
        attested_guardian: Option<ReservationId>,
    ) -> Self {
        Self {
            reservation_id: reservation.id.clone(),
            refusal: None,
            advisories,
            attested_guardian,
        }
    }

    fn refuse(reservation: &Reservation, refusal: Refusal, advisories: Vec<Advisory>) -> Self {
        Self {
            reservation_id: reservation.id.clone(),
            refusal: Some(refusal),
            advisories,
            attested_guardian: None,
        }
    }

    /// Reservation the decision was made for
    #[must_use]
    pub const fn reservation_id(&self) -> &ReservationId {
        &self.reservation_id
    }

    /// Whether the attendant may proceed
    #[must_use]
    pub const fn allow(&self) -> bool {
        self.refusal.is_none()
    }

    /// Why the gate refused, if it did
    #[must_use]
    pub const fn reason(&self) -> Option<&Refusal> {
        self.refusal.as_ref()
    }

    /// Advisories to show the attendant
    #[must_use]
    pub fn advisories(&self) -> &[Advisory] {
        &self.advisories
    }

    /// Guardian whose presence the attendant attested to
    #[must_use]
    pub const fn attested_guardian(&self) -> Option<&ReservationId> {
        self.attested_guardian.as_ref()
    }
}

/// Decide whether `reservation` may be validated today.
///
/// `parent` is the resolved guardian record for a dependent ticket, or `None`
/// if it could not be found. A parent whose id does not match the link is
/// treated as unresolved.
#[must_use]
pub fn can_validate(
    reservation: &Reservation,
    parent: Option<&Reservation>,
    guardian_present_confirmed: bool,
    today: NaiveDate,
) -> GateDecision {
    let mut advisories = Vec::new();

    if StateMachine::transition(reservation.status, ReservationStatus::Validated).is_err() {
        return GateDecision::refuse(
            reservation,
            Refusal::NotEligible {
                status: reservation.status,
            },
            advisories,
        );
    }

    if reservation.date != today {
        advisories.push(Advisory::DateMismatch {
            ticket_date: reservation.date,
            today,
        });
    }

    let Some(parent_id) = &reservation.linked_to else {
        return GateDecision::allowed(reservation, advisories, None);
    };

    match parent.filter(|p| &p.id == parent_id) {
        None => {
            advisories.push(Advisory::ParentUnresolved {
                parent_id: parent_id.clone(),
            });
            GateDecision::allowed(reservation, advisories, None)
        },
        Some(_) if !guardian_present_confirmed => GateDecision::refuse(
            reservation,
            Refusal::GuardianNotConfirmed {
                parent_id: parent_id.clone(),
            },
            advisories,
        ),
        Some(guardian) => {
            GateDecision::allowed(reservation, advisories, Some(guardian.id.clone()))
        },
    }
}

/// Result of a successful [`admit`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Admission {
    /// Check-in timestamp written to the record
    pub checked_in_at: DateTime<Utc>,
    /// Guardian noted in the audit log, if any
    pub guardian_noted: Option<ReservationId>,
}

/// Apply an approved gate decision: mark the reservation validated, stamp
/// `checked_in_at`, and append the audit entries (one for the check-in, one
/// more naming the guardian when an attestation occurred).
///
/// Re-checks the status first, so applying the same decision twice leaves the
/// record exactly as the first application did.
///
/// # Errors
///
/// `DecisionMismatch` if the decision was made for another reservation, the
/// gate's refusal if the decision did not allow entry, or `NotEligible` if the
/// reservation is no longer payment-confirmed.
pub fn admit(
    reservation: &mut Reservation,
    decision: &GateDecision,
    now: DateTime<Utc>,
) -> Result<Admission, Refusal> {
    if decision.reservation_id != reservation.id {
        return Err(Refusal::DecisionMismatch {
            decided_for: decision.reservation_id.clone(),
        });
    }

    if let Some(refusal) = decision.reason() {
        return Err(refusal.clone());
    }

    StateMachine::transition(reservation.status, ReservationStatus::Validated).map_err(|_| {
        Refusal::NotEligible {
            status: reservation.status,
        }
    })?;

    reservation.status = ReservationStatus::Validated;
    reservation.checked_in_at = Some(now);
    reservation.history.record(now, "Entry validated by attendant");

    let guardian_noted = decision.attested_guardian().cloned();
    if let Some(guardian) = &guardian_noted {
        reservation.history.record(
            now,
            format!("Guardian ticket {guardian} confirmed present by attendant"),
        );
    }

    Ok(Admission {
        checked_in_at: now,
        guardian_noted,
    })
}
