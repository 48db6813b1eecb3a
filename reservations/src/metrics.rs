//! Business metrics for the reservation engine.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `daypass_transitions_total{to}` - Committed status changes by target status
//! - `daypass_gate_refusals_total{reason}` - Entry-gate and state-machine refusals
//! - `daypass_gate_advisories_total{kind}` - Non-blocking gate advisories
//! - `daypass_reschedule_total{outcome}` - Bulk reschedule results per reservation
//! - `daypass_notifications_failed_total` - Guest notifications that could not be delivered

use crate::error::Refusal;
use crate::gate::Advisory;
use crate::types::ReservationStatus;
use metrics::describe_counter;

/// Initialize and register all business metrics descriptions.
///
/// This should be called once at application startup, before any metrics are recorded.
pub fn register_reservation_metrics() {
    describe_counter!(
        "daypass_transitions_total",
        "Total number of committed status changes by target status"
    );
    describe_counter!(
        "daypass_gate_refusals_total",
        "Total number of refused commands by reason"
    );
    describe_counter!(
        "daypass_gate_advisories_total",
        "Total number of entry-gate advisories by kind"
    );
    describe_counter!(
        "daypass_reschedule_total",
        "Total number of bulk reschedule items by outcome (succeeded, not_eligible, not_found, store_error)"
    );
    describe_counter!(
        "daypass_notifications_failed_total",
        "Total number of guest notifications that failed delivery"
    );

    tracing::info!("Reservation metrics registered");
}

// ============================================================================
// Metric Recording Functions
// ============================================================================

/// Record a committed status change.
pub fn record_transition(to: ReservationStatus) {
    metrics::counter!("daypass_transitions_total", "to" => to.as_str()).increment(1);
    tracing::debug!(%to, "Recorded transition metric");
}

/// Record a refused command.
pub fn record_refusal(refusal: &Refusal) {
    metrics::counter!("daypass_gate_refusals_total", "reason" => refusal.reason()).increment(1);
    tracing::debug!(reason = refusal.reason(), "Recorded refusal metric");
}

/// Record gate advisories raised during a validation.
pub fn record_advisories(advisories: &[Advisory]) {
    for advisory in advisories {
        metrics::counter!("daypass_gate_advisories_total", "kind" => advisory.kind()).increment(1);
    }
}

/// Record the outcome of one bulk reschedule item.
///
/// # Arguments
///
/// * `outcome` - `succeeded`, `not_eligible`, `not_found` or `store_error`
pub fn record_reschedule(outcome: &'static str) {
    metrics::counter!("daypass_reschedule_total", "outcome" => outcome).increment(1);
    tracing::debug!(outcome, "Recorded reschedule metric");
}

/// Record a failed guest notification.
pub fn record_notification_failed() {
    metrics::counter!("daypass_notifications_failed_total").increment(1);
}
