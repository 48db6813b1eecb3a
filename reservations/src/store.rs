//! Reservation persistence.
//!
//! Reservations are single documents keyed by id and queryable by owner, visit
//! date and status. Writes are compare-and-swap on [`Reservation::version`];
//! the store additionally refuses to re-stamp a reservation that is already
//! validated, which makes the move into `validated` happen at most once.

use crate::types::{OwnerId, Reservation, ReservationId, ReservationStatus};
use chrono::NaiveDate;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

/// Persistence failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No document with this id
    #[error("Reservation not found: {0}")]
    NotFound(ReservationId),

    /// Insert of an id that is already stored
    #[error("Reservation already exists: {0}")]
    AlreadyExists(ReservationId),

    /// The stored version moved since the caller loaded it
    #[error("Concurrency conflict on {id}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        /// Reservation written
        id: ReservationId,
        /// Version the caller loaded
        expected: u64,
        /// Version currently stored
        actual: u64,
    },

    /// A validation write hit a record that is already validated
    #[error("Reservation {0} is already validated")]
    AlreadyValidated(ReservationId),

    /// The backing store could not be reached
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Filter for [`ReservationRepository::query`]; `None` fields match anything
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReservationQuery {
    /// Owning venue
    pub owner: Option<OwnerId>,
    /// Visit date
    pub date: Option<NaiveDate>,
    /// Stored status
    pub status: Option<ReservationStatus>,
}

impl ReservationQuery {
    /// Restrict to one venue
    #[must_use]
    pub fn owned_by(mut self, owner: OwnerId) -> Self {
        self.owner = Some(owner);
        self
    }

    /// Restrict to one visit date
    #[must_use]
    pub const fn on(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    /// Restrict to one status
    #[must_use]
    pub const fn with_status(mut self, status: ReservationStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Whether `reservation` satisfies every set field
    #[must_use]
    pub fn matches(&self, reservation: &Reservation) -> bool {
        self.owner.as_ref().is_none_or(|owner| &reservation.owner_id == owner)
            && self.date.is_none_or(|date| reservation.date == date)
            && self.status.is_none_or(|status| reservation.status == status)
    }
}

/// Boxed future returned by repository methods
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Document store for reservations.
///
/// Methods return boxed futures so the repository can be shared as
/// `Arc<dyn ReservationRepository>`.
pub trait ReservationRepository: Send + Sync {
    /// Load one reservation
    ///
    /// # Errors
    ///
    /// `NotFound` if absent, `Unavailable` if the store cannot be reached.
    fn load(&self, id: &ReservationId) -> StoreFuture<'_, Reservation>;

    /// Store a new reservation, returning its version
    ///
    /// # Errors
    ///
    /// `AlreadyExists` if the id is taken.
    fn insert(&self, reservation: Reservation) -> StoreFuture<'_, u64>;

    /// Replace a stored reservation if it is still at `expected_version`.
    ///
    /// Returns the new version. The stored copy carries the new version; the
    /// caller's copy is not touched.
    ///
    /// # Errors
    ///
    /// - `NotFound` if absent
    /// - `AlreadyValidated` if the stored record is validated and the write
    ///   would stamp a different check-in
    /// - `ConcurrencyConflict` if the stored version differs
    fn save(&self, reservation: Reservation, expected_version: u64) -> StoreFuture<'_, u64>;

    /// All reservations matching `query`, ordered by id
    ///
    /// # Errors
    ///
    /// `Unavailable` if the store cannot be reached.
    fn query(&self, query: ReservationQuery) -> StoreFuture<'_, Vec<Reservation>>;
}

/// Compare-and-swap rules shared by repository implementations
///
/// # Errors
///
/// See [`ReservationRepository::save`].
pub fn check_write(stored: &Reservation, incoming: &Reservation, expected_version: u64) -> Result<(), StoreError> {
    if stored.status == ReservationStatus::Validated
        && incoming.status == ReservationStatus::Validated
        && stored.checked_in_at != incoming.checked_in_at
    {
        return Err(StoreError::AlreadyValidated(stored.id.clone()));
    }

    if stored.version != expected_version {
        return Err(StoreError::ConcurrencyConflict {
            id: stored.id.clone(),
            expected: expected_version,
            actual: stored.version,
        });
    }

    Ok(())
}

/// In-memory repository for the demo binary and tests
#[derive(Clone, Debug, Default)]
pub struct InMemoryReservationRepository {
    documents: Arc<RwLock<HashMap<ReservationId, Reservation>>>,
}

impl InMemoryReservationRepository {
    /// Creates an empty repository
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a repository holding `reservations`; later duplicates win
    #[must_use]
    pub fn seeded(reservations: impl IntoIterator<Item = Reservation>) -> Self {
        let documents = reservations
            .into_iter()
            .map(|reservation| (reservation.id.clone(), reservation))
            .collect();
        Self {
            documents: Arc::new(RwLock::new(documents)),
        }
    }

    /// Number of stored reservations
    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    /// Whether the repository is empty
    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }
}

impl ReservationRepository for InMemoryReservationRepository {
    fn load(&self, id: &ReservationId) -> StoreFuture<'_, Reservation> {
        let id = id.clone();
        Box::pin(async move {
            self.documents
                .read()
                .await
                .get(&id)
                .cloned()
                .ok_or(StoreError::NotFound(id))
        })
    }

    fn insert(&self, reservation: Reservation) -> StoreFuture<'_, u64> {
        Box::pin(async move {
            let mut documents = self.documents.write().await;
            if documents.contains_key(&reservation.id) {
                return Err(StoreError::AlreadyExists(reservation.id));
            }
            let version = reservation.version;
            documents.insert(reservation.id.clone(), reservation);
            Ok(version)
        })
    }

    fn save(&self, mut reservation: Reservation, expected_version: u64) -> StoreFuture<'_, u64> {
        Box::pin(async move {
            let mut documents = self.documents.write().await;
            let stored = documents
                .get_mut(&reservation.id)
                .ok_or_else(|| StoreError::NotFound(reservation.id.clone()))?;

            check_write(stored, &reservation, expected_version)?;

            let version = expected_version + 1;
            reservation.version = version;
            *stored = reservation;
            Ok(version)
        })
    }

    fn query(&self, query: ReservationQuery) -> StoreFuture<'_, Vec<Reservation>> {
        Box::pin(async move {
            let mut matching: Vec<Reservation> = self
                .documents
                .read()
                .await
                .values()
                .filter(|reservation| query.matches(reservation))
                .cloned()
                .collect();
            matching.sort_by(|a, b| a.id.cmp(&b.id));
            Ok(matching)
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::{GuestContact, Money};
    use chrono::{TimeZone, Utc};

    fn reservation(id: &str, owner: &str, status: ReservationStatus) -> Reservation {
        let created = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        Reservation::new(
            ReservationId::from(id),
            OwnerId::from(owner),
            GuestContact::default(),
            NaiveDate::from_ymd_opt(2025, 3, 14).unwrap(),
            Money::from_units(40),
            created,
        )
        .with_status(status)
    }

    #[tokio::test]
    async fn save_bumps_version_and_rejects_stale_writes() {
        let repo = InMemoryReservationRepository::new();
        repo.insert(reservation("r1", "v1", ReservationStatus::Confirmed)).await.unwrap();

        let loaded = repo.load(&ReservationId::from("r1")).await.unwrap();
        assert_eq!(repo.save(loaded.clone(), 0).await, Ok(1));

        let stale = repo.save(loaded, 0).await;
        assert_eq!(
            stale,
            Err(StoreError::ConcurrencyConflict {
                id: ReservationId::from("r1"),
                expected: 0,
                actual: 1
            })
        );
    }

    #[tokio::test]
    async fn second_validation_write_is_refused() {
        let repo = InMemoryReservationRepository::new();
        repo.insert(reservation("r1", "v1", ReservationStatus::Confirmed)).await.unwrap();

        let mut first = repo.load(&ReservationId::from("r1")).await.unwrap();
        let mut second = first.clone();
        first.status = ReservationStatus::Validated;
        first.checked_in_at = Some(Utc::now());
        repo.save(first, 0).await.unwrap();

        second.status = ReservationStatus::Validated;
        second.checked_in_at = Some(Utc::now() + chrono::Duration::seconds(1));
        assert_eq!(
            repo.save(second, 0).await,
            Err(StoreError::AlreadyValidated(ReservationId::from("r1")))
        );
    }

    #[tokio::test]
    async fn validated_records_still_accept_other_writes() {
        let mut validated = reservation("r1", "v1", ReservationStatus::Validated);
        validated.checked_in_at = Some(Utc::now());
        let repo = InMemoryReservationRepository::seeded([validated]);

        let mut loaded = repo.load(&ReservationId::from("r1")).await.unwrap();
        loaded.history.append("reconciled");
        assert_eq!(repo.save(loaded, 0).await, Ok(1));
    }

    #[tokio::test]
    async fn query_filters_and_orders_by_id() {
        let repo = InMemoryReservationRepository::seeded([
            reservation("b", "v1", ReservationStatus::Paid),
            reservation("a", "v1", ReservationStatus::Paid),
            reservation("c", "v2", ReservationStatus::Paid),
            reservation("d", "v1", ReservationStatus::Cancelled),
        ]);

        let found = repo
            .query(
                ReservationQuery::default()
                    .owned_by(OwnerId::from("v1"))
                    .with_status(ReservationStatus::Paid),
            )
            .await
            .unwrap();
        let ids: Vec<_> = found.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn missing_and_duplicate_ids_are_errors() {
        let repo = InMemoryReservationRepository::seeded([reservation("r1", "v1", ReservationStatus::Paid)]);
        assert_eq!(
            repo.load(&ReservationId::from("nope")).await,
            Err(StoreError::NotFound(ReservationId::from("nope")))
        );
        assert_eq!(
            repo.insert(reservation("r1", "v1", ReservationStatus::Paid)).await,
            Err(StoreError::AlreadyExists(ReservationId::from("r1")))
        );
    }
}
