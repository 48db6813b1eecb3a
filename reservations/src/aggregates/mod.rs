//! Aggregate reducers for day-pass reservations.
//!
//! - Reservation: payment lifecycle, entry validation, partner actions,
//!   rescheduling and reconciliation of a single reservation

pub mod reservation;

pub use reservation::{ReservationAction, ReservationEnvironment, ReservationReducer, ReservationState};
