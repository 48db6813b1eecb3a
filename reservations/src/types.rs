//! Domain types for day-pass reservations.
//!
//! Value objects (identifiers, [`Money`], [`Rate`]), the [`Reservation`]
//! record itself and the closed set of [`ReservationStatus`] values.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

/// Opaque identifier of a reservation document
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReservationId(String);

impl ReservationId {
    /// Creates a new random `ReservationId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Returns the identifier as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ReservationId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for ReservationId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ReservationId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for ReservationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of the venue/partner account that owns a reservation
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    /// Returns the identifier as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for OwnerId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for OwnerId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Money Value Object (cents-based to avoid floating point errors)
// ============================================================================

/// Monetary amount in minor units (cents).
///
/// Signed: a net payout can go below zero when a coupon removed more than the
/// commission leaves. Arithmetic saturates instead of wrapping.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Zero amount
    pub const ZERO: Self = Self(0);

    /// Creates a `Money` value from cents
    #[must_use]
    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    /// Creates a `Money` value from whole currency units
    #[must_use]
    pub const fn from_units(units: i64) -> Self {
        Self(units.saturating_mul(100))
    }

    /// Returns the amount in cents
    #[must_use]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Checks if the amount is zero
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checks if the amount is strictly positive
    #[must_use]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Checks if the amount is below zero
    #[must_use]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Applies a rate, rounding half away from zero to the nearest cent
    #[must_use]
    pub fn apply_rate(self, rate: Rate) -> Self {
        let product = i128::from(self.0) * i128::from(rate.basis_points());
        Self(saturate(div_round(product, i128::from(Rate::ONE_HUNDRED_PERCENT))))
    }

    /// Ratio of `self` to `whole` as a fraction, `0.0` when `whole` is zero
    #[must_use]
    #[allow(clippy::cast_precision_loss)] // Display-only figure
    pub fn ratio_of(self, whole: Self) -> f64 {
        if whole.is_zero() {
            0.0
        } else {
            self.0 as f64 / whole.0 as f64
        }
    }

    /// Amount before a percentage discount was taken off:
    /// `self / (1 - rate)`, rounded to the nearest cent.
    ///
    /// Returns `None` for rates of 100 % or more, where the original amount
    /// cannot be recovered.
    #[must_use]
    pub fn gross_up(self, discount_rate: Rate) -> Option<Self> {
        let remaining = Rate::ONE_HUNDRED_PERCENT.checked_sub(discount_rate.basis_points())?;
        if remaining == 0 {
            return None;
        }
        let scaled = i128::from(self.0) * i128::from(Rate::ONE_HUNDRED_PERCENT);
        Some(Self(saturate(div_round(scaled, i128::from(remaining)))))
    }
}

fn div_round(numerator: i128, denominator: i128) -> i128 {
    let half = denominator / 2;
    if numerator >= 0 {
        (numerator + half) / denominator
    } else {
        (numerator - half) / denominator
    }
}

fn saturate(value: i128) -> i64 {
    i64::try_from(value).unwrap_or(if value < 0 { i64::MIN } else { i64::MAX })
}

impl std::ops::Add for Money {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl std::ops::Sub for Money {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }
}

impl std::ops::AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, |acc, m| acc + m)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

/// A percentage expressed in basis points (1 % = 100 bp)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rate(u32);

impl Rate {
    /// 100 % in basis points
    pub const ONE_HUNDRED_PERCENT: u32 = 10_000;

    /// Creates a rate from basis points
    #[must_use]
    pub const fn from_basis_points(bp: u32) -> Self {
        Self(bp)
    }

    /// Creates a rate from whole percent
    #[must_use]
    pub const fn from_percent(percent: u32) -> Self {
        Self(percent.saturating_mul(100))
    }

    /// Returns the rate in basis points
    #[must_use]
    pub const fn basis_points(&self) -> u32 {
        self.0
    }

    /// Returns the rate as a fraction (`0.10` for 10 %)
    #[must_use]
    pub fn as_fraction(&self) -> f64 {
        f64::from(self.0) / f64::from(Self::ONE_HUNDRED_PERCENT)
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}%", self.0 / 100, self.0 % 100)
    }
}

// ============================================================================
// Status
// ============================================================================

/// Stored status of a reservation.
///
/// `Confirmed`, `Approved` and `Paid` are distinct stored spellings of the same
/// lifecycle phase, as are `Pending` and `WaitingPayment`. Rules are written
/// against [`StatusPhase`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    /// Created at checkout, awaiting payment
    Pending,
    /// Awaiting payment gateway confirmation
    WaitingPayment,
    /// Payment confirmed, entry not yet used
    Confirmed,
    /// Payment confirmed (partner-approved spelling)
    Approved,
    /// Payment confirmed (gateway spelling)
    Paid,
    /// Entry consumed at the venue
    Validated,
    /// Cancelled without refund
    Cancelled,
    /// Payment declined
    Rejected,
    /// Funds returned to the guest
    Refunded,
}

/// Lifecycle phase shared by equivalent stored statuses
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StatusPhase {
    /// `pending` / `waiting_payment`
    AwaitingPayment,
    /// `confirmed` / `approved` / `paid`
    PaymentConfirmed,
    /// `validated`
    Validated,
    /// `cancelled`
    Cancelled,
    /// `rejected`
    Rejected,
    /// `refunded`
    Refunded,
}

impl ReservationStatus {
    /// Every stored status, in lifecycle order
    pub const ALL: [Self; 9] = [
        Self::Pending,
        Self::WaitingPayment,
        Self::Confirmed,
        Self::Approved,
        Self::Paid,
        Self::Validated,
        Self::Cancelled,
        Self::Rejected,
        Self::Refunded,
    ];

    /// The lifecycle phase this status belongs to
    #[must_use]
    pub const fn phase(self) -> StatusPhase {
        match self {
            Self::Pending | Self::WaitingPayment => StatusPhase::AwaitingPayment,
            Self::Confirmed | Self::Approved | Self::Paid => StatusPhase::PaymentConfirmed,
            Self::Validated => StatusPhase::Validated,
            Self::Cancelled => StatusPhase::Cancelled,
            Self::Rejected => StatusPhase::Rejected,
            Self::Refunded => StatusPhase::Refunded,
        }
    }

    /// Payment confirmed and entry not yet used
    #[must_use]
    pub const fn is_payment_confirmed(self) -> bool {
        matches!(self.phase(), StatusPhase::PaymentConfirmed)
    }

    /// No status transition may leave this status
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self.phase(),
            StatusPhase::Validated | StatusPhase::Cancelled | StatusPhase::Rejected | StatusPhase::Refunded
        )
    }

    /// Included in revenue figures
    #[must_use]
    pub const fn counts_as_sale(self) -> bool {
        matches!(
            self.phase(),
            StatusPhase::PaymentConfirmed | StatusPhase::Validated
        )
    }

    /// Canonical stored spelling
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::WaitingPayment => "waiting_payment",
            Self::Confirmed => "confirmed",
            Self::Approved => "approved",
            Self::Paid => "paid",
            Self::Validated => "validated",
            Self::Cancelled => "cancelled",
            Self::Rejected => "rejected",
            Self::Refunded => "refunded",
        }
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a stored status string is outside the closed set
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown reservation status: {0:?}")]
pub struct UnknownStatus(pub String);

impl FromStr for ReservationStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "pending" => Ok(Self::Pending),
            "waiting_payment" => Ok(Self::WaitingPayment),
            "confirmed" => Ok(Self::Confirmed),
            "approved" => Ok(Self::Approved),
            "paid" => Ok(Self::Paid),
            "validated" => Ok(Self::Validated),
            "cancelled" | "canceled" => Ok(Self::Cancelled),
            "rejected" => Ok(Self::Rejected),
            "refunded" => Ok(Self::Refunded),
            _ => Err(UnknownStatus(s.to_string())),
        }
    }
}

// ============================================================================
// Reservation record
// ============================================================================

/// Guest contact details captured at purchase time
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestContact {
    /// Guest name
    pub name: String,
    /// Guest email
    pub email: String,
    /// Guest phone
    pub phone: Option<String>,
}

/// Purchased line item (descriptive only)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    /// Product title, e.g. "Adult day pass"
    pub title: String,
    /// Units purchased
    pub quantity: u32,
}

/// Append-only audit log of human-readable entries
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditLog(Vec<String>);

impl AuditLog {
    /// Creates an empty log
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Appends an entry
    pub fn append(&mut self, entry: impl Into<String>) {
        self.0.push(entry.into());
    }

    /// Appends a timestamped entry, `[2025-03-14 10:00 UTC] message`
    pub fn record(&mut self, at: DateTime<Utc>, message: impl fmt::Display) {
        self.append(format!("[{}] {message}", at.format("%Y-%m-%d %H:%M UTC")));
    }

    /// All entries, oldest first
    #[must_use]
    pub fn entries(&self) -> &[String] {
        &self.0
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the log has no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether `earlier` is a prefix of this log
    #[must_use]
    pub fn extends(&self, earlier: &Self) -> bool {
        self.0.starts_with(&earlier.0)
    }
}

impl From<Vec<String>> for AuditLog {
    fn from(entries: Vec<String>) -> Self {
        Self(entries)
    }
}

/// Audited figures supplied by the payment gateway
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayFigures {
    /// Fee the gateway actually charged
    pub gateway_fee: Money,
    /// Amount the venue actually received
    pub gateway_net_received: Money,
    /// Gateway-side status string, informational
    pub gateway_status: String,
}

/// A day-pass reservation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    /// Unique reservation identifier
    pub id: ReservationId,
    /// Venue/partner account that owns the reservation
    pub owner_id: OwnerId,
    /// Contact snapshot
    pub guest: GuestContact,
    /// Day for which entry is valid
    pub date: NaiveDate,
    /// Current status
    pub status: ReservationStatus,
    /// When the reservation was created at checkout
    pub created_at: DateTime<Utc>,
    /// When entry was validated
    pub checked_in_at: Option<DateTime<Utc>>,
    /// Amount actually paid by the guest
    pub total: Money,
    /// Amount removed by a coupon
    pub discount: Money,
    /// Coupon applied at purchase
    pub coupon_code: Option<String>,
    /// Guardian ticket this one depends on
    pub linked_to: Option<ReservationId>,
    /// Purchased items
    pub items: Vec<LineItem>,
    /// Audit trail
    pub history: AuditLog,
    /// Authoritative gateway figures, once reconciled
    pub reconciliation: Option<GatewayFigures>,
    /// Optimistic concurrency token, bumped on every committed write
    pub version: u64,
}

impl Reservation {
    /// Creates a new reservation awaiting payment
    #[must_use]
    pub fn new(
        id: ReservationId,
        owner_id: OwnerId,
        guest: GuestContact,
        date: NaiveDate,
        total: Money,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            owner_id,
            guest,
            date,
            status: ReservationStatus::Pending,
            created_at,
            checked_in_at: None,
            total,
            discount: Money::ZERO,
            coupon_code: None,
            linked_to: None,
            items: Vec::new(),
            history: AuditLog::new(),
            reconciliation: None,
            version: 0,
        }
    }

    /// Sets the coupon discount
    #[must_use]
    pub fn with_discount(mut self, discount: Money, coupon_code: Option<String>) -> Self {
        self.discount = discount;
        self.coupon_code = coupon_code;
        self
    }

    /// Makes this a dependent ticket of `guardian`
    #[must_use]
    pub fn linked_to(mut self, guardian: ReservationId) -> Self {
        self.linked_to = Some(guardian);
        self
    }

    /// Sets the stored status
    #[must_use]
    pub const fn with_status(mut self, status: ReservationStatus) -> Self {
        self.status = status;
        self
    }

    /// Adds a purchased line item
    #[must_use]
    pub fn with_item(mut self, title: impl Into<String>, quantity: u32) -> Self {
        self.items.push(LineItem {
            title: title.into(),
            quantity,
        });
        self
    }

    /// Whether this is a dependent ticket
    #[must_use]
    pub const fn is_dependent(&self) -> bool {
        self.linked_to.is_some()
    }

    /// Whether authoritative gateway figures have been applied
    #[must_use]
    pub const fn is_financially_reconciled(&self) -> bool {
        self.reconciliation.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn money_rate_rounds_half_away_from_zero() {
        assert_eq!(Money::from_cents(2000).apply_rate(Rate::from_percent(10)), Money::from_cents(200));
        assert_eq!(Money::from_cents(5).apply_rate(Rate::from_percent(10)), Money::from_cents(1));
        assert_eq!(Money::from_cents(4).apply_rate(Rate::from_percent(10)), Money::ZERO);
        assert_eq!(Money::from_cents(-5).apply_rate(Rate::from_percent(10)), Money::from_cents(-1));
    }

    #[test]
    fn gross_up_refuses_full_discount() {
        assert_eq!(
            Money::from_units(180).gross_up(Rate::from_percent(10)),
            Some(Money::from_units(200))
        );
        assert_eq!(Money::from_units(180).gross_up(Rate::from_percent(100)), None);
        assert_eq!(Money::from_units(180).gross_up(Rate::from_percent(150)), None);
    }

    #[test]
    fn money_display_handles_sign() {
        assert_eq!(Money::from_cents(15_607).to_string(), "156.07");
        assert_eq!(Money::from_cents(-1_200).to_string(), "-12.00");
        assert_eq!(Rate::from_basis_points(1_250).to_string(), "12.50%");
    }

    #[test]
    fn status_strings_are_a_closed_set() {
        for status in ReservationStatus::ALL {
            assert_eq!(status.as_str().parse::<ReservationStatus>(), Ok(status));
        }
        assert_eq!("Canceled".parse(), Ok(ReservationStatus::Cancelled));
        assert_eq!("waiting-payment".parse(), Ok(ReservationStatus::WaitingPayment));
        assert!("checked_in".parse::<ReservationStatus>().is_err());
    }

    #[test]
    fn equivalent_statuses_share_a_phase() {
        assert_eq!(ReservationStatus::Approved.phase(), ReservationStatus::Paid.phase());
        assert_eq!(ReservationStatus::Pending.phase(), ReservationStatus::WaitingPayment.phase());
        assert!(ReservationStatus::Validated.counts_as_sale());
        assert!(!ReservationStatus::Refunded.counts_as_sale());
        assert!(ReservationStatus::Validated.is_terminal());
        assert!(!ReservationStatus::Paid.is_terminal());
    }

    #[test]
    fn audit_log_prefix_check() {
        let mut log = AuditLog::new();
        log.append("created");
        let before = log.clone();
        log.append("confirmed");
        assert!(log.extends(&before));
        assert!(!before.extends(&log));
    }
}
