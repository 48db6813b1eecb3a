//! Reservation service.
//!
//! Async orchestration around the reducer. Every command follows the same path:
//!
//! ```text
//! load ──► reduce ──► refused? ──yes──► report refusal, write nothing
//!                        │no
//!                        ▼
//!              save(expected_version) ──► dispatch effects ──► outcome
//! ```
//!
//! Effects are dispatched only after the write commits, so a failed
//! notification can never undo a transition.

use crate::aggregates::{ReservationAction, ReservationEnvironment, ReservationReducer, ReservationState};
use crate::config::Config;
use crate::error::{Refusal, ServiceError, ServiceResult};
use crate::finance::{decompose_for_venue, Decomposition, VenueDirectory};
use crate::gate::Advisory;
use crate::ingest::RawReservation;
use crate::lifecycle::StateMachine;
use crate::payment_gateway::{InMemoryReconciliationSource, MockRefundGateway, ReconciliationSource, RefundGateway};
use crate::reporting::{aggregate, ReportFilter, SalesReport};
use crate::reschedule::{run_batch, RescheduleFailure, RescheduleReport};
use crate::store::{ReservationQuery, ReservationRepository, StoreError};
use crate::types::{Reservation, ReservationId, ReservationStatus};
use chrono::NaiveDate;
use daypass_core::environment::Clock;
use daypass_core::executor::{execute, EffectHandle};
use daypass_core::reducer::Reducer;
use std::sync::Arc;

/// Writes attempted to record a refund the gateway already paid
const REFUND_RECORD_ATTEMPTS: usize = 5;

/// Result of one command
#[derive(Debug)]
pub struct CommandOutcome {
    /// The reservation after the command (as stored, when a write happened)
    pub reservation: Reservation,
    /// Why the command was refused, if it was
    pub refusal: Option<Refusal>,
    /// Non-blocking notices for the operator
    pub advisories: Vec<Advisory>,
    /// Post-commit guest notifications
    pub notifications: EffectHandle<ReservationAction>,
}

impl CommandOutcome {
    fn refused(reservation: Reservation, refusal: Refusal) -> Self {
        crate::metrics::record_refusal(&refusal);
        Self {
            reservation,
            refusal: Some(refusal),
            advisories: Vec::new(),
            notifications: EffectHandle::completed(),
        }
    }

    /// Whether the command went through
    #[must_use]
    pub const fn is_applied(&self) -> bool {
        self.refusal.is_none()
    }
}

/// Reservation command and query service
pub struct ReservationService {
    repository: Arc<dyn ReservationRepository>,
    refunds: Arc<dyn RefundGateway>,
    reconciliation: Arc<dyn ReconciliationSource>,
    venues: VenueDirectory,
    env: ReservationEnvironment,
    reducer: ReservationReducer,
    reschedule_concurrency: usize,
}

impl ReservationService {
    /// Creates a service with a mock refund gateway, an empty reconciliation
    /// source and default commission terms for every venue
    #[must_use]
    pub fn new(repository: Arc<dyn ReservationRepository>, env: ReservationEnvironment) -> Self {
        Self {
            repository,
            refunds: MockRefundGateway::shared(),
            reconciliation: Arc::new(InMemoryReconciliationSource::new()),
            venues: VenueDirectory::default(),
            env,
            reducer: ReservationReducer::new(),
            reschedule_concurrency: 8,
        }
    }

    /// Creates a service whose defaults come from `config`
    #[must_use]
    pub fn from_config(
        config: &Config,
        repository: Arc<dyn ReservationRepository>,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn crate::notifications::Notifier>,
    ) -> Self {
        let env = ReservationEnvironment::new(clock, notifier).with_notifications(config.notifications.enabled);
        Self::new(repository, env)
            .with_venues(VenueDirectory::new(config.commission_policy()))
            .with_reschedule_concurrency(config.bulk.reschedule_concurrency)
    }

    /// Use another refund gateway
    #[must_use]
    pub fn with_refund_gateway(mut self, refunds: Arc<dyn RefundGateway>) -> Self {
        self.refunds = refunds;
        self
    }

    /// Use another reconciliation source
    #[must_use]
    pub fn with_reconciliation_source(mut self, source: Arc<dyn ReconciliationSource>) -> Self {
        self.reconciliation = source;
        self
    }

    /// Use these venue terms
    #[must_use]
    pub fn with_venues(mut self, venues: VenueDirectory) -> Self {
        self.venues = venues;
        self
    }

    /// Limit concurrent writes during bulk reschedule
    #[must_use]
    pub const fn with_reschedule_concurrency(mut self, concurrency: usize) -> Self {
        self.reschedule_concurrency = concurrency;
        self
    }

    /// Venue terms in use
    #[must_use]
    pub const fn venues(&self) -> &VenueDirectory {
        &self.venues
    }

    // ========================================================================
    // Commands
    // ========================================================================

    /// Payment gateway confirmed funds
    ///
    /// # Errors
    ///
    /// `NotFound` or a store failure.
    #[tracing::instrument(skip(self, id), fields(reservation_id = %id))]
    pub async fn confirm_payment(&self, id: &ReservationId) -> ServiceResult<CommandOutcome> {
        self.run_command(id, ReservationAction::ConfirmPayment).await
    }

    /// Payment gateway declined
    ///
    /// # Errors
    ///
    /// `NotFound` or a store failure.
    #[tracing::instrument(skip(self, id), fields(reservation_id = %id))]
    pub async fn decline_payment(&self, id: &ReservationId) -> ServiceResult<CommandOutcome> {
        self.run_command(id, ReservationAction::DeclinePayment).await
    }

    /// Payment window timed out
    ///
    /// # Errors
    ///
    /// `NotFound` or a store failure.
    #[tracing::instrument(skip(self, id), fields(reservation_id = %id))]
    pub async fn expire_payment(&self, id: &ReservationId) -> ServiceResult<CommandOutcome> {
        self.run_command(id, ReservationAction::ExpirePayment).await
    }

    /// Partner cancelled without refund
    ///
    /// # Errors
    ///
    /// `NotFound` or a store failure.
    #[tracing::instrument(skip(self, id), fields(reservation_id = %id))]
    pub async fn cancel(&self, id: &ReservationId) -> ServiceResult<CommandOutcome> {
        self.run_command(id, ReservationAction::Cancel).await
    }

    /// Check a guest in through the entry gate.
    ///
    /// For a dependent ticket the guardian record is resolved first; a missing
    /// guardian lets the guest through with a `ParentUnresolved` advisory. If
    /// another attendant validated the same ticket between our read and our
    /// write, the outcome is a `NotEligible` refusal rather than an error.
    ///
    /// # Errors
    ///
    /// `NotFound`, or a store failure other than the lost race.
    #[tracing::instrument(skip(self, id), fields(reservation_id = %id))]
    pub async fn validate_entry(
        &self,
        id: &ReservationId,
        guardian_present_confirmed: bool,
    ) -> ServiceResult<CommandOutcome> {
        let loaded = self.load(id).await?;

        let parent = match &loaded.linked_to {
            Some(parent_id) => match self.repository.load(parent_id).await {
                Ok(parent) => Some(Box::new(parent)),
                Err(StoreError::NotFound(_)) => None,
                Err(error) => return Err(error.into()),
            },
            None => None,
        };

        let action = ReservationAction::ValidateEntry {
            parent,
            guardian_present_confirmed,
        };

        match self.apply(loaded, action).await {
            Err(ServiceError::Store(
                error @ (StoreError::ConcurrencyConflict { .. } | StoreError::AlreadyValidated(_)),
            )) => {
                let current = self.load(id).await?;
                if current.status.is_payment_confirmed() {
                    return Err(error.into());
                }
                tracing::warn!(status = %current.status, "Lost validation race");
                let status = current.status;
                Ok(CommandOutcome::refused(current, Refusal::NotEligible { status }))
            },
            other => other,
        }
    }

    /// Ask the refund gateway to return the full amount paid, then record the
    /// refund.
    ///
    /// Nothing is requested from the gateway unless the reservation may move
    /// to `refunded`.
    ///
    /// # Errors
    ///
    /// `NotFound`, a gateway failure (reservation left untouched) or a store
    /// failure. `RefundNotRecorded` when the gateway paid out but concurrent
    /// writes moved the reservation somewhere `refunded` cannot follow.
    #[tracing::instrument(skip(self, id), fields(reservation_id = %id))]
    pub async fn refund(&self, id: &ReservationId) -> ServiceResult<CommandOutcome> {
        let loaded = self.load(id).await?;

        if let Err(error) = StateMachine::transition(loaded.status, ReservationStatus::Refunded) {
            tracing::warn!(%error, "Refund refused");
            return Ok(CommandOutcome::refused(loaded, error.into()));
        }

        let receipt = self.refunds.request_refund(id.clone(), loaded.total).await?;

        // The money is gone: keep re-reading until the refund is on the record
        let mut current = loaded;
        for _ in 0..REFUND_RECORD_ATTEMPTS {
            let action = ReservationAction::RecordRefund {
                amount: receipt.amount,
                transaction_id: receipt.transaction_id.clone(),
            };
            match self.apply(current, action).await {
                Err(ServiceError::Store(StoreError::ConcurrencyConflict { .. })) => {
                    current = self.load(id).await?;
                    if StateMachine::transition(current.status, ReservationStatus::Refunded).is_err() {
                        break;
                    }
                    tracing::debug!(version = current.version, "Refund write raced, retrying");
                },
                other => return other,
            }
        }

        let status = self.load(id).await?.status;
        tracing::error!(
            transaction_id = %receipt.transaction_id,
            %status,
            "Refund paid out but not recorded"
        );
        Err(ServiceError::RefundNotRecorded { receipt, status })
    }

    /// Move every listed reservation to `new_date`.
    ///
    /// Only payment-confirmed reservations move; each item is written on its
    /// own and a failure is reported for that id alone.
    #[tracing::instrument(skip(self, ids))]
    pub async fn reschedule_many(
        &self,
        ids: impl IntoIterator<Item = ReservationId>,
        new_date: NaiveDate,
    ) -> RescheduleReport {
        run_batch(ids, self.reschedule_concurrency, |id| self.reschedule_one(id, new_date)).await
    }

    async fn reschedule_one(
        &self,
        id: ReservationId,
        new_date: NaiveDate,
    ) -> Result<EffectHandle<ReservationAction>, RescheduleFailure> {
        let outcome = self
            .run_command(&id, ReservationAction::Reschedule { new_date })
            .await
            .map_err(|error| match error {
                ServiceError::NotFound(_) => RescheduleFailure::NotFound,
                other => RescheduleFailure::Store(other.to_string()),
            })?;

        match outcome.refusal {
            None => Ok(outcome.notifications),
            Some(_) => Err(RescheduleFailure::NotEligible {
                status: outcome.reservation.status,
            }),
        }
    }

    /// Pull audited figures from the gateway and apply them.
    ///
    /// Returns `false` when the gateway has nothing for this reservation yet;
    /// decomposition then keeps using the estimated figures.
    ///
    /// # Errors
    ///
    /// `NotFound`, a gateway failure or a store failure.
    #[tracing::instrument(skip(self, id), fields(reservation_id = %id))]
    pub async fn reconcile(&self, id: &ReservationId) -> ServiceResult<bool> {
        let loaded = self.load(id).await?;

        let Some(figures) = self.reconciliation.fetch(id.clone()).await? else {
            tracing::debug!("Reconciliation figures unavailable");
            return Ok(false);
        };

        let outcome = self
            .apply(loaded, ReservationAction::ApplyReconciliation { figures })
            .await?;
        Ok(outcome.reservation.is_financially_reconciled())
    }

    /// Bring a stored document into the engine.
    ///
    /// The document goes through [`RawReservation`] normalization and is
    /// inserted as a new reservation.
    ///
    /// # Errors
    ///
    /// `Ingest` for a malformed document, `Store` if the id is already taken.
    #[tracing::instrument(skip(self, document))]
    pub async fn import(&self, document: &str) -> ServiceResult<Reservation> {
        let mut reservation = RawReservation::parse(document)?;
        reservation.version = self.repository.insert(reservation.clone()).await?;
        tracing::debug!(
            reservation_id = %reservation.id,
            status = %reservation.status,
            "Imported reservation"
        );
        Ok(reservation)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Financial breakdown of one reservation under its venue's terms
    ///
    /// # Errors
    ///
    /// `NotFound` or a store failure.
    pub async fn decompose(&self, id: &ReservationId) -> ServiceResult<Decomposition> {
        let reservation = self.load(id).await?;
        Ok(decompose_for_venue(&reservation, self.venues.terms_for(&reservation.owner_id)))
    }

    /// Period totals for the reservations in scope
    ///
    /// # Errors
    ///
    /// A store failure.
    #[tracing::instrument(skip(self))]
    pub async fn report(&self, filter: &ReportFilter) -> ServiceResult<SalesReport> {
        let query = ReservationQuery {
            owner: filter.owner.clone(),
            ..ReservationQuery::default()
        };
        let reservations = self.repository.query(query).await?;
        Ok(aggregate(&reservations, filter, &self.venues))
    }

    // ========================================================================
    // Command pipeline
    // ========================================================================

    async fn load(&self, id: &ReservationId) -> ServiceResult<Reservation> {
        self.repository.load(id).await.map_err(|error| match error {
            StoreError::NotFound(id) => ServiceError::NotFound(id),
            other => other.into(),
        })
    }

    async fn run_command(&self, id: &ReservationId, action: ReservationAction) -> ServiceResult<CommandOutcome> {
        let loaded = self.load(id).await?;
        self.apply(loaded, action).await
    }

    async fn apply(&self, loaded: Reservation, action: ReservationAction) -> ServiceResult<CommandOutcome> {
        let expected_version = loaded.version;
        let previous_status = loaded.status;
        let mut state = ReservationState::new(loaded.clone());

        let effects = self.reducer.reduce(&mut state, action, &self.env);
        crate::metrics::record_advisories(&state.advisories);

        if let Some(refusal) = state.last_refusal {
            let mut outcome = CommandOutcome::refused(state.reservation, refusal);
            outcome.advisories = state.advisories;
            return Ok(outcome);
        }

        if state.reservation == loaded {
            return Ok(CommandOutcome {
                reservation: state.reservation,
                refusal: None,
                advisories: state.advisories,
                notifications: EffectHandle::completed(),
            });
        }

        let version = self
            .repository
            .save(state.reservation.clone(), expected_version)
            .await
            .inspect_err(|error| tracing::warn!(%error, "Write rejected"))?;
        state.reservation.version = version;

        if state.reservation.status != previous_status {
            crate::metrics::record_transition(state.reservation.status);
        }

        Ok(CommandOutcome {
            reservation: state.reservation,
            refusal: None,
            advisories: state.advisories,
            notifications: execute(effects),
        })
    }
}

impl std::fmt::Debug for ReservationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReservationService")
            .field("env", &self.env)
            .field("reschedule_concurrency", &self.reschedule_concurrency)
            .finish_non_exhaustive()
    }
}
