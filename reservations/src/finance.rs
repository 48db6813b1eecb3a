//! Financial decomposition and reconciliation.
//!
//! Splits what a guest paid into gross value, coupon discount, platform
//! commission and the venue's net payout:
//!
//! ```text
//! gross = total + discount
//! fee   = gross × rate        rate = promo rate within the window after the
//!                             venue's first activation, standard rate after
//! net   = gross − discount − fee
//! ```
//!
//! Amounts are integer cents, so `net + discount + fee == gross` holds exactly.
//! Once the payment gateway has supplied audited figures, `fee` and `net` are
//! taken from it verbatim; `gross`, `total` and `discount` never change.

use crate::types::{GatewayFigures, Money, OwnerId, Rate, Reservation};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default standard commission (12 %)
pub const STANDARD_FEE_RATE: Rate = Rate::from_basis_points(1_200);

/// Default promotional commission (10 %)
pub const PROMO_FEE_RATE: Rate = Rate::from_basis_points(1_000);

/// Default promotional window after a venue's first sale, in days
pub const PROMO_WINDOW_DAYS: i64 = 30;

// ============================================================================
// Venue terms
// ============================================================================

/// Commission terms of one venue
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionPolicy {
    /// Rate outside the promotional window
    pub standard_rate: Rate,
    /// Rate inside the promotional window
    pub promo_rate: Rate,
    /// Width of the promotional window in days
    pub promo_window_days: i64,
    /// Date of the venue's first-ever sale, if it has had one
    pub first_activation: Option<NaiveDate>,
}

impl Default for CommissionPolicy {
    fn default() -> Self {
        Self {
            standard_rate: STANDARD_FEE_RATE,
            promo_rate: PROMO_FEE_RATE,
            promo_window_days: PROMO_WINDOW_DAYS,
            first_activation: None,
        }
    }
}

impl CommissionPolicy {
    /// Same rates, anchored at the venue's first activation date
    #[must_use]
    pub const fn activated_on(mut self, first_activation: NaiveDate) -> Self {
        self.first_activation = Some(first_activation);
        self
    }

    /// Whether a sale created on `created` falls inside the promotional window.
    ///
    /// The window is symmetric (absolute day difference) and inclusive. A venue
    /// without an activation date has no window.
    #[must_use]
    pub fn is_within_promo_window(&self, created: NaiveDate) -> bool {
        self.first_activation
            .is_some_and(|first| (created - first).num_days().abs() <= self.promo_window_days)
    }

    /// Commission rate for a sale created at `created_at`
    #[must_use]
    pub fn rate_for(&self, created_at: DateTime<Utc>) -> Rate {
        if self.is_within_promo_window(created_at.date_naive()) {
            self.promo_rate
        } else {
            self.standard_rate
        }
    }
}

/// Coupon codes of one venue, mapped to their percentage discount
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouponCatalog {
    coupons: HashMap<String, Rate>,
}

impl CouponCatalog {
    /// Creates an empty catalog
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a coupon (codes are case-insensitive)
    #[must_use]
    pub fn with_coupon(mut self, code: &str, discount: Rate) -> Self {
        self.coupons.insert(normalize_code(code), discount);
        self
    }

    /// Discount percentage for a code, if known
    #[must_use]
    pub fn resolve(&self, code: &str) -> Option<Rate> {
        self.coupons.get(&normalize_code(code)).copied()
    }
}

fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

/// Commission policy and coupon catalog of one venue
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VenueTerms {
    /// Commission policy
    pub commission: CommissionPolicy,
    /// Coupon catalog
    pub coupons: CouponCatalog,
}

/// Terms for every venue, with a fallback for venues not registered
#[derive(Clone, Debug, Default)]
pub struct VenueDirectory {
    venues: HashMap<OwnerId, VenueTerms>,
    fallback: VenueTerms,
}

impl VenueDirectory {
    /// Creates a directory whose unregistered venues use `fallback` terms
    #[must_use]
    pub fn new(fallback: CommissionPolicy) -> Self {
        Self {
            venues: HashMap::new(),
            fallback: VenueTerms {
                commission: fallback,
                coupons: CouponCatalog::new(),
            },
        }
    }

    /// Registers a venue's terms
    pub fn register(&mut self, owner: OwnerId, terms: VenueTerms) {
        self.venues.insert(owner, terms);
    }

    /// Builder form of [`register`](Self::register)
    #[must_use]
    pub fn with_venue(mut self, owner: OwnerId, terms: VenueTerms) -> Self {
        self.register(owner, terms);
        self
    }

    /// Terms for a venue
    #[must_use]
    pub fn terms_for(&self, owner: &OwnerId) -> &VenueTerms {
        self.venues.get(owner).unwrap_or(&self.fallback)
    }
}

// ============================================================================
// Decomposition
// ============================================================================

/// Where `fee` and `net` came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeeBasis {
    /// Estimated from the commission policy; gateway figures unavailable
    Estimated {
        /// Rate applied
        rate: Rate,
    },
    /// Audited figures from the payment gateway
    Reconciled,
}

/// A reservation's amounts, split into their parts
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Decomposition {
    /// Sale value before discount and commission
    pub gross: Money,
    /// Coupon discount
    pub discount: Money,
    /// Platform commission
    pub fee: Money,
    /// Amount due to the venue
    pub net: Money,
    /// `fee / gross` as a fraction, `0.0` when gross is zero
    pub fee_percent: f64,
    /// Whether `fee`/`net` are gateway-audited
    pub reconciled: bool,
    /// Source of `fee`/`net`
    pub basis: FeeBasis,
}

/// Decompose a reservation under a venue's commission policy.
///
/// The stored `discount` is authoritative. Coupon back-calculation needs a
/// catalog; see [`decompose_with_coupons`].
#[must_use]
pub fn decompose(reservation: &Reservation, policy: &CommissionPolicy) -> Decomposition {
    decompose_with_coupons(reservation, policy, &CouponCatalog::new())
}

/// Decompose using a venue's full terms
#[must_use]
pub fn decompose_for_venue(reservation: &Reservation, terms: &VenueTerms) -> Decomposition {
    decompose_with_coupons(reservation, &terms.commission, &terms.coupons)
}

/// Decompose a reservation, resolving its coupon against `coupons`.
///
/// A positive stored discount always wins. Only when nothing was stored and the
/// coupon resolves to a percentage below 100 % is gross recovered as
/// `total / (1 − pct)`.
#[must_use]
pub fn decompose_with_coupons(
    reservation: &Reservation,
    policy: &CommissionPolicy,
    coupons: &CouponCatalog,
) -> Decomposition {
    let (gross, discount) = gross_and_discount(reservation, coupons);

    if let Some(figures) = &reservation.reconciliation {
        return Decomposition {
            gross,
            discount,
            fee: figures.gateway_fee,
            net: figures.gateway_net_received,
            fee_percent: figures.gateway_fee.ratio_of(gross),
            reconciled: true,
            basis: FeeBasis::Reconciled,
        };
    }

    let rate = policy.rate_for(reservation.created_at);
    let fee = gross.apply_rate(rate);
    let fee_percent = if gross.is_zero() { 0.0 } else { rate.as_fraction() };

    Decomposition {
        gross,
        discount,
        fee,
        net: gross - discount - fee,
        fee_percent,
        reconciled: false,
        basis: FeeBasis::Estimated { rate },
    }
}

fn gross_and_discount(reservation: &Reservation, coupons: &CouponCatalog) -> (Money, Money) {
    let total = reservation.total;

    if reservation.discount.is_positive() {
        return (total + reservation.discount, reservation.discount);
    }

    let recovered_gross = reservation
        .coupon_code
        .as_deref()
        .and_then(|code| coupons.resolve(code))
        .and_then(|pct| total.gross_up(pct));

    match recovered_gross {
        Some(gross) => (gross, gross - total),
        None => (total, Money::ZERO),
    }
}

// ============================================================================
// Reconciliation
// ============================================================================

/// Overwrite estimated fee/net with audited gateway figures.
///
/// Allowed in every status, terminal ones included; does not touch `status`,
/// `total` or `discount`. Appends one audit entry. Returns `false` without
/// writing anything if the same figures are already applied.
pub fn apply_reconciliation(
    reservation: &mut Reservation,
    figures: GatewayFigures,
    now: DateTime<Utc>,
) -> bool {
    if reservation.reconciliation.as_ref() == Some(&figures) {
        return false;
    }

    reservation.history.record(
        now,
        format!(
            "Financials reconciled with gateway ({}): fee {}, net {}",
            figures.gateway_status, figures.gateway_fee, figures.gateway_net_received
        ),
    );
    reservation.reconciliation = Some(figures);
    true
}
