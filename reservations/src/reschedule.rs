//! Bulk rescheduling.
//!
//! Each reservation is its own unit of work: one load, one write, one guest
//! notification. Items run concurrently up to a limit, a failed item never
//! stops the others, and the caller gets a per-id result.

use crate::aggregates::ReservationAction;
use crate::types::{ReservationId, ReservationStatus};
use daypass_core::executor::EffectHandle;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use thiserror::Error;

/// Why one reservation was not rescheduled
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RescheduleFailure {
    /// Not payment-confirmed (validated, terminal or unpaid)
    #[error("Reservation is not eligible while {status}")]
    NotEligible {
        /// Status at the time of the attempt
        status: ReservationStatus,
    },

    /// No reservation with this id
    #[error("Reservation not found")]
    NotFound,

    /// The write failed; not retried
    #[error("Write failed: {0}")]
    Store(String),
}

impl RescheduleFailure {
    /// Metrics label
    #[must_use]
    pub const fn outcome(&self) -> &'static str {
        match self {
            Self::NotEligible { .. } => "not_eligible",
            Self::NotFound => "not_found",
            Self::Store(_) => "store_error",
        }
    }
}

/// Per-id outcome of a bulk reschedule
#[derive(Debug)]
pub struct RescheduleReport {
    /// Reservations whose new date was written
    pub succeeded: BTreeSet<ReservationId>,
    /// Reservations left untouched, with the reason
    pub failed: BTreeMap<ReservationId, RescheduleFailure>,
    /// Guest notifications dispatched for the succeeded writes
    pub notifications: EffectHandle<ReservationAction>,
}

impl RescheduleReport {
    /// Whether every requested reservation was rescheduled
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Run `reschedule_one` for every id, at most `concurrency` at a time.
///
/// Duplicate ids are processed once.
pub async fn run_batch<F, Fut>(
    ids: impl IntoIterator<Item = ReservationId>,
    concurrency: usize,
    reschedule_one: F,
) -> RescheduleReport
where
    F: Fn(ReservationId) -> Fut,
    Fut: Future<Output = Result<EffectHandle<ReservationAction>, RescheduleFailure>>,
{
    let unique: BTreeSet<ReservationId> = ids.into_iter().collect();
    let requested = unique.len();

    let results: Vec<_> = stream::iter(unique)
        .map(|id| {
            let attempt = reschedule_one(id.clone());
            async move { (id, attempt.await) }
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    let mut succeeded = BTreeSet::new();
    let mut failed = BTreeMap::new();
    let mut handles = Vec::new();

    for (id, result) in results {
        match result {
            Ok(handle) => {
                crate::metrics::record_reschedule("succeeded");
                handles.push(handle);
                succeeded.insert(id);
            },
            Err(failure) => {
                crate::metrics::record_reschedule(failure.outcome());
                tracing::warn!(reservation_id = %id, %failure, "Reschedule item failed");
                failed.insert(id, failure);
            },
        }
    }

    tracing::info!(
        requested,
        succeeded = succeeded.len(),
        failed = failed.len(),
        "Bulk reschedule finished"
    );

    RescheduleReport {
        succeeded,
        failed,
        notifications: handles.into_iter().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn failures_do_not_stop_other_items() {
        let ids = ["a", "b", "c", "b"].map(ReservationId::from);

        let report = run_batch(ids, 2, |id| async move {
            match id.as_str() {
                "b" => Err(RescheduleFailure::NotEligible {
                    status: ReservationStatus::Validated,
                }),
                _ => Ok(EffectHandle::<ReservationAction>::completed()),
            }
        })
        .await;

        assert_eq!(
            report.succeeded,
            BTreeSet::from([ReservationId::from("a"), ReservationId::from("c")])
        );
        assert_eq!(
            report.failed.get(&ReservationId::from("b")),
            Some(&RescheduleFailure::NotEligible {
                status: ReservationStatus::Validated
            })
        );
        assert!(!report.is_complete());
    }

    #[tokio::test]
    async fn zero_concurrency_still_makes_progress() {
        let report = run_batch([ReservationId::from("a")], 0, |_| async {
            Ok::<_, RescheduleFailure>(EffectHandle::<ReservationAction>::completed())
        })
        .await;
        assert!(report.is_complete());
        assert_eq!(report.succeeded.len(), 1);
    }

    #[test]
    fn failure_labels() {
        assert_eq!(RescheduleFailure::NotFound.outcome(), "not_found");
        assert_eq!(RescheduleFailure::Store("down".to_string()).to_string(), "Write failed: down");
    }
}
