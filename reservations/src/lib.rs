//! Day-pass reservation engine.
//!
//! Lifecycle and money logic for venues selling single-day entry passes:
//!
//! - **State machine** ([`lifecycle`]): the only legal status changes
//! - **Entry gate** ([`gate`]): on-site check-in, including dependent tickets
//!   that need an attendant to confirm the guardian guest is present
//! - **Financial decomposition** ([`finance`]): gross, discount, commission and
//!   venue net, estimated or reconciled against the payment gateway
//! - **Bulk rescheduling** ([`reschedule`]): per-item date changes with
//!   partial success
//! - **Reporting** ([`reporting`]): period totals over the sales
//!
//! # Architecture
//!
//! ```text
//!   payment gateway ─┐   attendant ─┐   partner ─┐
//!                    ▼              ▼            ▼
//!              ┌──────────────────────────────────────┐
//!              │          ReservationService          │
//!              │  load → reduce → save(version) → fx  │
//!              └──────────────────────────────────────┘
//!                    │                 │          │
//!                    ▼                 ▼          ▼
//!            ReservationReducer   Repository   Notifier
//!             (state machine,     (CAS write)  (post-commit)
//!              gate, finance)
//! ```
//!
//! Refusals (`InvalidTransition`, `NotEligible`, `GuardianNotConfirmed`) are
//! values; only store, gateway and ingestion failures are errors.

#![forbid(unsafe_code)]

pub mod aggregates;
pub mod config;
pub mod error;
pub mod finance;
pub mod gate;
pub mod ingest;
pub mod lifecycle;
pub mod metrics;
pub mod notifications;
pub mod payment_gateway;
pub mod reporting;
pub mod reschedule;
pub mod service;
pub mod store;
pub mod types;

pub use aggregates::{ReservationAction, ReservationEnvironment, ReservationReducer, ReservationState};
pub use config::Config;
pub use error::{Refusal, ServiceError, ServiceResult};
pub use finance::{decompose, CommissionPolicy, CouponCatalog, Decomposition, VenueDirectory, VenueTerms};
pub use gate::{can_validate, Advisory, GateDecision};
pub use lifecycle::{StateMachine, TransitionError, Trigger};
pub use reporting::{ReportFilter, SalesReport};
pub use reschedule::{RescheduleFailure, RescheduleReport};
pub use service::{CommandOutcome, ReservationService};
pub use store::{InMemoryReservationRepository, ReservationRepository, StoreError};
pub use types::{Money, OwnerId, Rate, Reservation, ReservationId, ReservationStatus};
