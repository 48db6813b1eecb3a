//! # Daypass Testing
//!
//! Testing utilities for reducers built on `daypass-core`.
//!
//! This crate provides:
//! - [`FixedClock`]: deterministic time, pinned to an instant or a calendar date
//! - [`ReducerTest`]: Given-When-Then harness for reducers
//! - [`assertions`]: helpers for inspecting returned effects
//!
//! ## Example
//!
//! ```ignore
//! use daypass_testing::{ReducerTest, FixedClock};
//!
//! ReducerTest::new(ReservationReducer::new())
//!     .with_env(env_with_clock(FixedClock::on_date(2025, 3, 14)))
//!     .given_state(confirmed_reservation())
//!     .when_action(ReservationAction::ValidateEntry { .. })
//!     .then_state(|state| assert!(state.reservation.checked_in_at.is_some()))
//!     .run();
//! ```

use chrono::{DateTime, Duration, NaiveDate, Utc};
use daypass_core::environment::Clock;


/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Duration, NaiveDate, Utc};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use daypass_testing::mocks::FixedClock;
    /// use daypass_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }

        /// Create a clock pinned to 10:00 UTC on the given calendar date.
        ///
        /// Out-of-range dates fall back to the default test instant.
        #[must_use]
        pub fn on_date(year: i32, month: u32, day: u32) -> Self {
            NaiveDate::from_ymd_opt(year, month, day)
                .and_then(|date| date.and_hms_opt(10, 0, 0))
                .map_or_else(test_clock, |naive| Self::new(naive.and_utc()))
        }

        /// A copy of this clock moved forward by `duration`
        #[must_use]
        pub fn advanced(&self, duration: Duration) -> Self {
            Self::new(self.time + duration)
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(DateTime::<Utc>::UNIX_EPOCH + Duration::days(20_089))
    }
}

// Re-export commonly used items
pub use mocks::{FixedClock, test_clock};
pub use reducer_test::{ReducerTest, assertions};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        let time1 = clock.now();
        let time2 = clock.now();
        assert_eq!(time1, time2);
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2025, 1, 1).unwrap_or_default());
    }

    #[test]
    fn on_date_pins_calendar_day() {
        let clock = FixedClock::on_date(2025, 3, 14);
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2025, 3, 14).unwrap_or_default());
        assert_eq!(
            clock.advanced(Duration::days(1)).today(),
            NaiveDate::from_ymd_opt(2025, 3, 15).unwrap_or_default()
        );
    }
}
