//! Bulk reschedule integration tests.
//!
//! Verifies per-item isolation: ineligible, missing and failing reservations
//! are reported individually and never block the rest of the batch.
//!
//! Run with: `cargo test --test reschedule_integration_test`

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]

use chrono::{Duration, NaiveDate};
use daypass_core::environment::Clock;
use daypass_reservations::notifications::{Notification, RecordingNotifier};
use daypass_reservations::store::{ReservationQuery, StoreFuture};
use daypass_reservations::types::GuestContact;
use daypass_reservations::{
    InMemoryReservationRepository, Money, OwnerId, Reservation, ReservationEnvironment, ReservationId,
    ReservationRepository, ReservationService, ReservationStatus, RescheduleFailure, StoreError,
};
use daypass_testing::FixedClock;
use std::sync::Arc;

fn clock() -> FixedClock {
    FixedClock::on_date(2025, 6, 10)
}

fn reservation(id: &str, status: ReservationStatus) -> Reservation {
    Reservation::new(
        ReservationId::from(id),
        OwnerId::from("lagoon-club"),
        GuestContact {
            name: format!("Guest {id}"),
            email: format!("{id}@example.com"),
            phone: None,
        },
        clock().today(),
        Money::from_units(50),
        clock().now(),
    )
    .with_status(status)
}

fn new_date() -> NaiveDate {
    clock().today() + Duration::days(7)
}

/// Repository that rejects every write to one reservation
#[derive(Clone)]
struct FlakyRepository {
    inner: InMemoryReservationRepository,
    broken: ReservationId,
}

impl ReservationRepository for FlakyRepository {
    fn load(&self, id: &ReservationId) -> StoreFuture<'_, Reservation> {
        self.inner.load(id)
    }

    fn insert(&self, reservation: Reservation) -> StoreFuture<'_, u64> {
        self.inner.insert(reservation)
    }

    fn save(&self, reservation: Reservation, expected_version: u64) -> StoreFuture<'_, u64> {
        if reservation.id == self.broken {
            return Box::pin(async { Err(StoreError::Unavailable("disk full".to_string())) });
        }
        self.inner.save(reservation, expected_version)
    }

    fn query(&self, query: ReservationQuery) -> StoreFuture<'_, Vec<Reservation>> {
        self.inner.query(query)
    }
}

/// Scenario D: three reservations, one already validated.
#[tokio::test]
async fn test_partial_success_with_validated_reservation() {
    let repository = InMemoryReservationRepository::seeded([
        reservation("r1", ReservationStatus::Confirmed),
        reservation("r2", ReservationStatus::Paid),
        reservation("r3", ReservationStatus::Validated),
    ]);
    let notifier = RecordingNotifier::new();
    let env = ReservationEnvironment::new(Arc::new(clock()), Arc::new(notifier.clone()));
    let service = ReservationService::new(Arc::new(repository.clone()), env);

    let report = service
        .reschedule_many(["r1", "r2", "r3"].map(ReservationId::from), new_date())
        .await;

    assert_eq!(
        report.succeeded.iter().map(ReservationId::as_str).collect::<Vec<_>>(),
        vec!["r1", "r2"]
    );
    assert_eq!(
        report.failed.get(&ReservationId::from("r3")),
        Some(&RescheduleFailure::NotEligible {
            status: ReservationStatus::Validated
        })
    );
    assert!(!report.is_complete());
    report.notifications.wait().await;

    for id in ["r1", "r2"] {
        let stored = repository.load(&ReservationId::from(id)).await.unwrap();
        assert_eq!(stored.date, new_date());
        assert_eq!(stored.version, 1);
        let expected = format!("Date changed from {} to {}", clock().today(), new_date());
        assert!(stored.history.entries()[0].contains(&expected));
    }
    let untouched = repository.load(&ReservationId::from("r3")).await.unwrap();
    assert_eq!(untouched.date, clock().today());
    assert_eq!(untouched.version, 0);

    let mut notified: Vec<_> = notifier
        .delivered()
        .into_iter()
        .filter_map(|notification| match notification {
            Notification::DateChanged {
                reservation_id,
                old_date,
                new_date,
                ..
            } => Some((reservation_id, old_date, new_date)),
            Notification::StatusChanged { .. } => None,
        })
        .collect();
    notified.sort();
    assert_eq!(
        notified,
        vec![
            (ReservationId::from("r1"), clock().today(), new_date()),
            (ReservationId::from("r2"), clock().today(), new_date()),
        ]
    );
}

/// A failing write and an unknown id are reported; the rest still move.
#[tokio::test]
async fn test_store_failure_is_isolated() {
    let inner = InMemoryReservationRepository::seeded([
        reservation("r1", ReservationStatus::Confirmed),
        reservation("r2", ReservationStatus::Approved),
        reservation("r3", ReservationStatus::Pending),
    ]);
    let repository = FlakyRepository {
        inner: inner.clone(),
        broken: ReservationId::from("r2"),
    };
    let env = ReservationEnvironment::new(Arc::new(clock()), Arc::new(RecordingNotifier::new()));
    let service = ReservationService::new(Arc::new(repository), env).with_reschedule_concurrency(2);

    let report = service
        .reschedule_many(["r1", "r2", "r3", "missing", "r1"].map(ReservationId::from), new_date())
        .await;

    assert_eq!(report.succeeded.len(), 1);
    assert!(report.succeeded.contains(&ReservationId::from("r1")));
    assert!(matches!(
        report.failed.get(&ReservationId::from("r2")),
        Some(RescheduleFailure::Store(message)) if message.contains("disk full")
    ));
    assert_eq!(
        report.failed.get(&ReservationId::from("r3")),
        Some(&RescheduleFailure::NotEligible {
            status: ReservationStatus::Pending
        })
    );
    assert_eq!(
        report.failed.get(&ReservationId::from("missing")),
        Some(&RescheduleFailure::NotFound)
    );

    assert_eq!(inner.load(&ReservationId::from("r1")).await.unwrap().date, new_date());
    assert_eq!(inner.load(&ReservationId::from("r2")).await.unwrap().date, clock().today());
}

/// An empty batch is trivially complete.
#[tokio::test]
async fn test_empty_batch() {
    let env = ReservationEnvironment::new(Arc::new(clock()), Arc::new(RecordingNotifier::new()));
    let service = ReservationService::new(Arc::new(InMemoryReservationRepository::new()), env);

    let report = service.reschedule_many(Vec::new(), new_date()).await;
    assert!(report.is_complete());
    assert!(report.succeeded.is_empty());
    assert_eq!(report.notifications.pending(), 0);
}
