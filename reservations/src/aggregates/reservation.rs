//! Reservation aggregate.
//!
//! Every mutation of a reservation goes through [`ReservationReducer`]:
//!
//! 1. Ask the state machine (and, for check-in, the entry gate) whether the
//!    command may proceed.
//! 2. On refusal, record it on the state and return no effects.
//! 3. Otherwise mutate the record, append the audit entries, and return the
//!    guest notifications as post-commit effects.
//!
//! The reducer never persists and never delivers anything itself.

use crate::error::Refusal;
use crate::finance::apply_reconciliation;
use crate::gate::{admit, can_validate, Advisory};
use crate::lifecycle::{StateMachine, Trigger};
use crate::notifications::{Notification, Notifier};
use crate::types::{GatewayFigures, Money, Reservation, ReservationStatus};
use chrono::NaiveDate;
use daypass_core::{effect::Effect, environment::Clock, reducer::Reducer};
use serde::{Deserialize, Serialize};
use smallvec::{smallvec, SmallVec};
use std::sync::Arc;

// ============================================================================
// Actions
// ============================================================================

/// Commands accepted by a reservation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ReservationAction {
    /// Payment gateway confirmed funds
    ConfirmPayment,

    /// Payment gateway declined
    DeclinePayment,

    /// Payment window timed out
    ExpirePayment,

    /// Attendant scanned the ticket at the entrance
    ValidateEntry {
        /// Guardian record for a dependent ticket, if it could be resolved
        parent: Option<Box<Reservation>>,
        /// Attendant attests the guardian guest is physically present
        guardian_present_confirmed: bool,
    },

    /// Partner cancelled without refund
    Cancel,

    /// Refund collaborator reported the funds were returned
    RecordRefund {
        /// Amount returned
        amount: Money,
        /// Gateway transaction reference
        transaction_id: String,
    },

    /// Move the visit to another day
    Reschedule {
        /// New visit date
        new_date: NaiveDate,
    },

    /// Overwrite estimated fee/net with audited gateway figures
    ApplyReconciliation {
        /// Gateway figures
        figures: GatewayFigures,
    },
}

// ============================================================================
// State
// ============================================================================

/// A reservation together with the outcome of the last command
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReservationState {
    /// The record
    pub reservation: Reservation,
    /// Why the last command was refused
    pub last_refusal: Option<Refusal>,
    /// Notices raised by the last command
    pub advisories: Vec<Advisory>,
}

impl ReservationState {
    /// Wrap a loaded reservation
    #[must_use]
    pub const fn new(reservation: Reservation) -> Self {
        Self {
            reservation,
            last_refusal: None,
            advisories: Vec::new(),
        }
    }

    fn refuse(&mut self, refusal: Refusal) -> SmallVec<[Effect<ReservationAction>; 4]> {
        tracing::warn!(
            reservation_id = %self.reservation.id,
            status = %self.reservation.status,
            reason = refusal.reason(),
            %refusal,
            "Command refused"
        );
        self.last_refusal = Some(refusal);
        SmallVec::new()
    }
}

// ============================================================================
// Environment
// ============================================================================

/// Dependencies injected into [`ReservationReducer`]
#[derive(Clone)]
pub struct ReservationEnvironment {
    /// Clock for timestamps and "today"
    pub clock: Arc<dyn Clock>,
    /// Guest notification channel
    pub notifier: Arc<dyn Notifier>,
    /// When `false`, no notification effects are produced
    pub notifications_enabled: bool,
}

impl ReservationEnvironment {
    /// Creates a new `ReservationEnvironment` with notifications on
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            clock,
            notifier,
            notifications_enabled: true,
        }
    }

    /// Switch notifications on or off
    #[must_use]
    pub const fn with_notifications(mut self, enabled: bool) -> Self {
        self.notifications_enabled = enabled;
        self
    }

    fn notify(&self, notification: Notification) -> SmallVec<[Effect<ReservationAction>; 4]> {
        if !self.notifications_enabled {
            return SmallVec::new();
        }

        let notifier = Arc::clone(&self.notifier);
        smallvec![Effect::fire_and_forget(async move {
            let reservation_id = notification.reservation_id().clone();
            if let Err(error) = notifier.deliver(notification).await {
                tracing::warn!(%reservation_id, %error, "Guest notification failed");
                crate::metrics::record_notification_failed();
            }
        })]
    }
}

impl std::fmt::Debug for ReservationEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReservationEnvironment")
            .field("notifications_enabled", &self.notifications_enabled)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Reducer
// ============================================================================

/// Reducer for a single reservation
#[derive(Clone, Copy, Debug, Default)]
pub struct ReservationReducer;

impl ReservationReducer {
    /// Creates a new `ReservationReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Move to `to` if the state machine allows it and the trigger is one the
    /// command may cause. Returns the status-change notification.
    fn change_status(
        state: &mut ReservationState,
        to: ReservationStatus,
        allowed: &[Trigger],
        note: &str,
        env: &ReservationEnvironment,
    ) -> SmallVec<[Effect<ReservationAction>; 4]> {
        let from = state.reservation.status;
        let trigger = match StateMachine::transition(from, to) {
            Ok(trigger) => trigger,
            Err(error) => return state.refuse(error.into()),
        };
        if !allowed.contains(&trigger) {
            return state.refuse(Refusal::NotEligible { status: from });
        }

        let reservation = &mut state.reservation;
        reservation.status = to;
        reservation.history.record(env.clock.now(), note);
        tracing::info!(reservation_id = %reservation.id, %from, %to, ?trigger, "Status changed");

        env.notify(Notification::StatusChanged {
            reservation_id: reservation.id.clone(),
            guest: reservation.guest.clone(),
            new_status: to,
        })
    }
}

impl Reducer for ReservationReducer {
    type State = ReservationState;
    type Action = ReservationAction;
    type Environment = ReservationEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        state.last_refusal = None;
        state.advisories.clear();

        match action {
            ReservationAction::ConfirmPayment => Self::change_status(
                state,
                ReservationStatus::Confirmed,
                &[Trigger::PaymentConfirmed],
                "Payment confirmed by gateway",
                env,
            ),

            ReservationAction::DeclinePayment => Self::change_status(
                state,
                ReservationStatus::Rejected,
                &[Trigger::PaymentFailed],
                "Payment declined by gateway",
                env,
            ),

            ReservationAction::ExpirePayment => Self::change_status(
                state,
                ReservationStatus::Cancelled,
                &[Trigger::PaymentFailed],
                "Payment window expired",
                env,
            ),

            ReservationAction::Cancel => Self::change_status(
                state,
                ReservationStatus::Cancelled,
                &[Trigger::PartnerCancelled, Trigger::PaymentFailed],
                "Cancelled by partner",
                env,
            ),

            ReservationAction::RecordRefund {
                amount,
                transaction_id,
            } => Self::change_status(
                state,
                ReservationStatus::Refunded,
                &[Trigger::PartnerRefunded],
                &format!("Refunded {amount} to guest (transaction {transaction_id})"),
                env,
            ),

            ReservationAction::ValidateEntry {
                parent,
                guardian_present_confirmed,
            } => {
                let decision = can_validate(
                    &state.reservation,
                    parent.as_deref(),
                    guardian_present_confirmed,
                    env.clock.today(),
                );
                state.advisories = decision.advisories().to_vec();

                match admit(&mut state.reservation, &decision, env.clock.now()) {
                    Ok(admission) => {
                        let reservation = &state.reservation;
                        tracing::info!(
                            reservation_id = %reservation.id,
                            guardian = ?admission.guardian_noted,
                            advisories = state.advisories.len(),
                            "Entry validated"
                        );
                        env.notify(Notification::StatusChanged {
                            reservation_id: reservation.id.clone(),
                            guest: reservation.guest.clone(),
                            new_status: ReservationStatus::Validated,
                        })
                    },
                    Err(refusal) => state.refuse(refusal),
                }
            },

            ReservationAction::Reschedule { new_date } => {
                let status = state.reservation.status;
                if !StateMachine::can_reschedule(status) {
                    return state.refuse(Refusal::NotEligible { status });
                }

                let reservation = &mut state.reservation;
                let old_date = reservation.date;
                reservation.date = new_date;
                reservation
                    .history
                    .record(env.clock.now(), format!("Date changed from {old_date} to {new_date}"));
                tracing::info!(reservation_id = %reservation.id, %old_date, %new_date, "Rescheduled");

                env.notify(Notification::DateChanged {
                    reservation_id: reservation.id.clone(),
                    guest: reservation.guest.clone(),
                    old_date,
                    new_date,
                })
            },

            ReservationAction::ApplyReconciliation { figures } => {
                if apply_reconciliation(&mut state.reservation, figures, env.clock.now()) {
                    tracing::info!(reservation_id = %state.reservation.id, "Financials reconciled");
                }
                SmallVec::new()
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::notifications::RecordingNotifier;
    use crate::types::{GuestContact, OwnerId, ReservationId};
    use daypass_testing::{assertions, FixedClock, ReducerTest};

    fn clock() -> FixedClock {
        FixedClock::on_date(2025, 6, 10)
    }

    fn env() -> ReservationEnvironment {
        ReservationEnvironment::new(Arc::new(clock()), Arc::new(RecordingNotifier::new()))
    }

    fn reservation(id: &str, status: ReservationStatus) -> Reservation {
        Reservation::new(
            ReservationId::from(id),
            OwnerId::from("venue-1"),
            GuestContact {
                name: "Ana".to_string(),
                email: "ana@example.com".to_string(),
                phone: None,
            },
            NaiveDate::from_ymd_opt(2025, 6, 10).unwrap(),
            Money::from_units(50),
            clock().now(),
        )
        .with_status(status)
    }

    fn validate(parent: Option<Reservation>, attested: bool) -> ReservationAction {
        ReservationAction::ValidateEntry {
            parent: parent.map(Box::new),
            guardian_present_confirmed: attested,
        }
    }

    #[test]
    fn payment_confirmation_promotes_pending() {
        ReducerTest::new(ReservationReducer::new())
            .with_env(env())
            .given_state(ReservationState::new(reservation("r1", ReservationStatus::WaitingPayment)))
            .when_action(ReservationAction::ConfirmPayment)
            .then_state(|state| {
                assert_eq!(state.reservation.status, ReservationStatus::Confirmed);
                assert_eq!(state.last_refusal, None);
                assert_eq!(state.reservation.history.len(), 1);
            })
            .then_effects(|effects| {
                assertions::assert_effects_count(effects, 1);
                assertions::assert_has_future_effect(effects);
            })
            .run();
    }

    #[test]
    fn terminal_reservation_refuses_every_status_command() {
        for action in [
            ReservationAction::ConfirmPayment,
            ReservationAction::DeclinePayment,
            ReservationAction::Cancel,
            ReservationAction::RecordRefund {
                amount: Money::from_units(50),
                transaction_id: "t1".to_string(),
            },
        ] {
            ReducerTest::new(ReservationReducer::new())
                .with_env(env())
                .given_state(ReservationState::new(reservation("r1", ReservationStatus::Refunded)))
                .when_action(action)
                .then_state(|state| {
                    assert_eq!(state.reservation.status, ReservationStatus::Refunded);
                    assert!(matches!(state.last_refusal, Some(Refusal::InvalidTransition(_))));
                    assert!(state.reservation.history.is_empty());
                })
                .then_effects(assertions::assert_no_effects)
                .run();
        }
    }

    #[test]
    fn expiry_does_not_cancel_a_paid_reservation() {
        ReducerTest::new(ReservationReducer::new())
            .with_env(env())
            .given_state(ReservationState::new(reservation("r1", ReservationStatus::Paid)))
            .when_action(ReservationAction::ExpirePayment)
            .then_state(|state| {
                assert_eq!(state.reservation.status, ReservationStatus::Paid);
                assert_eq!(
                    state.last_refusal,
                    Some(Refusal::NotEligible {
                        status: ReservationStatus::Paid
                    })
                );
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn partner_can_cancel_before_and_after_payment() {
        for status in [ReservationStatus::Pending, ReservationStatus::Approved] {
            ReducerTest::new(ReservationReducer::new())
                .with_env(env())
                .given_state(ReservationState::new(reservation("r1", status)))
                .when_action(ReservationAction::Cancel)
                .then_state(|state| assert_eq!(state.reservation.status, ReservationStatus::Cancelled))
                .run();
        }
    }

    #[test]
    fn double_validation_checks_in_once() {
        ReducerTest::new(ReservationReducer::new())
            .with_env(env())
            .given_state(ReservationState::new(reservation("r1", ReservationStatus::Confirmed)))
            .when_action(validate(None, false))
            .when_action(validate(None, false))
            .then_state(|state| {
                assert_eq!(state.reservation.status, ReservationStatus::Validated);
                assert_eq!(state.reservation.checked_in_at, Some(clock().now()));
                assert_eq!(state.reservation.history.len(), 1);
                assert_eq!(
                    state.last_refusal,
                    Some(Refusal::NotEligible {
                        status: ReservationStatus::Validated
                    })
                );
            })
            .then_effects(|effects| assertions::assert_effects_count(effects, 1))
            .run();
    }

    #[test]
    fn dependent_ticket_with_attested_guardian_is_validated() {
        let parent = reservation("guardian", ReservationStatus::Confirmed);
        let child = reservation("child", ReservationStatus::Confirmed).linked_to(parent.id.clone());

        ReducerTest::new(ReservationReducer::new())
            .with_env(env())
            .given_state(ReservationState::new(child))
            .when_action(validate(Some(parent), true))
            .then_state(|state| {
                assert_eq!(state.reservation.status, ReservationStatus::Validated);
                let guardian_notes = state
                    .reservation
                    .history
                    .entries()
                    .iter()
                    .filter(|entry| entry.contains("Guardian ticket guardian"))
                    .count();
                assert_eq!(guardian_notes, 1);
            })
            .run();
    }

    #[test]
    fn dependent_ticket_without_attestation_is_refused() {
        let parent = reservation("guardian", ReservationStatus::Validated);
        let child = reservation("child", ReservationStatus::Confirmed).linked_to(parent.id.clone());

        ReducerTest::new(ReservationReducer::new())
            .with_env(env())
            .given_state(ReservationState::new(child))
            .when_action(validate(Some(parent), false))
            .then_state(|state| {
                assert_eq!(state.reservation.status, ReservationStatus::Confirmed);
                assert_eq!(state.reservation.checked_in_at, None);
                assert_eq!(state.last_refusal.as_ref().map(Refusal::reason), Some("guardian_not_confirmed"));
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn wrong_day_validates_with_advisory() {
        let mut ticket = reservation("r1", ReservationStatus::Confirmed);
        ticket.date = NaiveDate::from_ymd_opt(2025, 6, 11).unwrap();

        ReducerTest::new(ReservationReducer::new())
            .with_env(env())
            .given_state(ReservationState::new(ticket))
            .when_action(validate(None, false))
            .then_state(|state| {
                assert_eq!(state.reservation.status, ReservationStatus::Validated);
                assert_eq!(state.advisories.len(), 1);
                assert_eq!(state.advisories[0].kind(), "date_mismatch");
            })
            .run();
    }

    #[test]
    fn reschedule_moves_date_and_notifies() {
        let new_date = NaiveDate::from_ymd_opt(2025, 7, 1).unwrap();
        ReducerTest::new(ReservationReducer::new())
            .with_env(env())
            .given_state(ReservationState::new(reservation("r1", ReservationStatus::Paid)))
            .when_action(ReservationAction::Reschedule { new_date })
            .then_state(move |state| {
                assert_eq!(state.reservation.date, new_date);
                assert_eq!(state.reservation.status, ReservationStatus::Paid);
                assert!(state.reservation.history.entries()[0].contains("Date changed from 2025-06-10 to 2025-07-01"));
            })
            .then_effects(|effects| assertions::assert_effects_count(effects, 1))
            .run();
    }

    #[test]
    fn validated_reservation_cannot_be_rescheduled() {
        ReducerTest::new(ReservationReducer::new())
            .with_env(env())
            .given_state(ReservationState::new(reservation("r1", ReservationStatus::Validated)))
            .when_action(ReservationAction::Reschedule {
                new_date: NaiveDate::from_ymd_opt(2025, 7, 1).unwrap(),
            })
            .then_state(|state| {
                assert_eq!(state.reservation.date, NaiveDate::from_ymd_opt(2025, 6, 10).unwrap());
                assert_eq!(state.last_refusal.as_ref().map(Refusal::reason), Some("not_eligible"));
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn reconciliation_applies_to_terminal_reservations() {
        let figures = GatewayFigures {
            gateway_fee: Money::from_units(5),
            gateway_net_received: Money::from_units(45),
            gateway_status: "settled".to_string(),
        };
        let expected = figures.clone();

        ReducerTest::new(ReservationReducer::new())
            .with_env(env())
            .given_state(ReservationState::new(reservation("r1", ReservationStatus::Refunded)))
            .when_action(ReservationAction::ApplyReconciliation { figures })
            .then_state(move |state| {
                assert_eq!(state.reservation.status, ReservationStatus::Refunded);
                assert_eq!(state.reservation.reconciliation, Some(expected));
                assert_eq!(state.last_refusal, None);
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn disabled_notifications_produce_no_effects() {
        ReducerTest::new(ReservationReducer::new())
            .with_env(env().with_notifications(false))
            .given_state(ReservationState::new(reservation("r1", ReservationStatus::Pending)))
            .when_action(ReservationAction::ConfirmPayment)
            .then_state(|state| assert_eq!(state.reservation.status, ReservationStatus::Confirmed))
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[tokio::test]
    async fn notification_effect_reaches_the_notifier() {
        let notifier = RecordingNotifier::new();
        let env = ReservationEnvironment::new(Arc::new(clock()), Arc::new(notifier.clone()));
        let mut state = ReservationState::new(reservation("r1", ReservationStatus::Pending));

        let effects = ReservationReducer::new().reduce(&mut state, ReservationAction::ConfirmPayment, &env);
        daypass_core::executor::execute(effects).wait().await;

        assert_eq!(
            notifier.delivered(),
            vec![Notification::StatusChanged {
                reservation_id: ReservationId::from("r1"),
                guest: state.reservation.guest.clone(),
                new_status: ReservationStatus::Confirmed,
            }]
        );
    }
}
