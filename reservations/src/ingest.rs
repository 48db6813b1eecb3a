//! Ingestion boundary for stored reservation documents.
//!
//! Stored documents are loosely typed: statuses are free strings, amounts are
//! decimal major units, optional fields may be missing. Everything is
//! normalized here, once, into a strict [`Reservation`]; nothing past this
//! module sees an unknown status or a negative amount.

use crate::types::{
    AuditLog, GatewayFigures, GuestContact, LineItem, Money, OwnerId, Reservation, ReservationId,
    ReservationStatus, UnknownStatus,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A stored document could not be normalized
#[derive(Error, Debug)]
pub enum IngestError {
    /// Document is not valid JSON for a reservation
    #[error("Malformed reservation document: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Status outside the closed set
    #[error(transparent)]
    UnknownStatus(#[from] UnknownStatus),

    /// Amount is negative, NaN or infinite
    #[error("Invalid amount for {field}: {value}")]
    InvalidAmount {
        /// Document field
        field: &'static str,
        /// Offending value
        value: f64,
    },

    /// Visit date is not `YYYY-MM-DD`
    #[error("Invalid visit date: {0:?}")]
    InvalidDate(String),

    /// Blank reservation or owner id
    #[error("Missing identifier: {0}")]
    MissingId(&'static str),

    /// `checkedInAt` present without `validated` status, or the reverse
    #[error("Check-in timestamp inconsistent with status {status}")]
    CheckInMismatch {
        /// Normalized status
        status: ReservationStatus,
    },

    /// Flagged reconciled without gateway figures
    #[error("Reservation is flagged reconciled but carries no gateway figures")]
    MissingGatewayFigures,
}

/// Purchased line item as stored
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawLineItem {
    /// Product title
    pub title: String,
    /// Units purchased
    #[serde(default = "one")]
    pub quantity: u32,
}

const fn one() -> u32 {
    1
}

/// A reservation document as it sits in the store
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawReservation {
    /// Document id
    pub id: String,
    /// Owning venue
    pub owner_id: String,
    /// Guest name
    #[serde(default)]
    pub guest_name: String,
    /// Guest email
    #[serde(default)]
    pub guest_email: String,
    /// Guest phone
    #[serde(default)]
    pub guest_phone: Option<String>,
    /// Visit date, `YYYY-MM-DD`
    pub date: String,
    /// Status string, any case
    pub status: String,
    /// Checkout timestamp
    pub created_at: DateTime<Utc>,
    /// Check-in timestamp
    #[serde(default)]
    pub checked_in_at: Option<DateTime<Utc>>,
    /// Amount paid, major units
    pub total: f64,
    /// Coupon discount, major units
    #[serde(default)]
    pub discount: Option<f64>,
    /// Coupon code
    #[serde(default)]
    pub coupon_code: Option<String>,
    /// Guardian ticket
    #[serde(default, alias = "linkedTo")]
    pub linked_to_reservation_id: Option<String>,
    /// Line items
    #[serde(default, alias = "cartItems")]
    pub items: Vec<RawLineItem>,
    /// Audit trail
    #[serde(default)]
    pub history: Vec<String>,
    /// Whether gateway figures are authoritative
    #[serde(default)]
    pub is_financially_reconciled: bool,
    /// Gateway fee, major units
    #[serde(default)]
    pub gateway_fee: Option<f64>,
    /// Gateway net, major units
    #[serde(default)]
    pub gateway_net_received: Option<f64>,
    /// Gateway status string
    #[serde(default)]
    pub gateway_status: Option<String>,
    /// Concurrency token
    #[serde(default)]
    pub version: u64,
}

impl RawReservation {
    /// Parse and normalize a JSON document
    ///
    /// # Errors
    ///
    /// Any [`IngestError`].
    pub fn parse(json: &str) -> Result<Reservation, IngestError> {
        serde_json::from_str::<Self>(json)?.try_into()
    }
}

#[allow(clippy::cast_possible_truncation)] // finite, range-checked below
fn to_cents(field: &'static str, value: f64, allow_negative: bool) -> Result<Money, IngestError> {
    let invalid = || IngestError::InvalidAmount { field, value };
    if !value.is_finite() || (!allow_negative && value < 0.0) {
        return Err(invalid());
    }
    let cents = (value * 100.0).round();
    if cents.abs() >= 9.0e15 {
        return Err(invalid());
    }
    Ok(Money::from_cents(cents as i64))
}

fn non_blank(field: &'static str, value: String) -> Result<String, IngestError> {
    if value.trim().is_empty() {
        Err(IngestError::MissingId(field))
    } else {
        Ok(value)
    }
}

impl TryFrom<RawReservation> for Reservation {
    type Error = IngestError;

    fn try_from(raw: RawReservation) -> Result<Self, Self::Error> {
        let status: ReservationStatus = raw.status.parse()?;

        if (status == ReservationStatus::Validated) != raw.checked_in_at.is_some() {
            return Err(IngestError::CheckInMismatch { status });
        }

        let date = NaiveDate::parse_from_str(raw.date.trim(), "%Y-%m-%d")
            .map_err(|_| IngestError::InvalidDate(raw.date.clone()))?;

        let total = to_cents("total", raw.total, false)?;
        let discount = raw
            .discount
            .map_or(Ok(Money::ZERO), |value| to_cents("discount", value, false))?;

        let reconciliation = if raw.is_financially_reconciled {
            let (Some(fee), Some(net)) = (raw.gateway_fee, raw.gateway_net_received) else {
                return Err(IngestError::MissingGatewayFigures);
            };
            Some(GatewayFigures {
                gateway_fee: to_cents("gatewayFee", fee, false)?,
                gateway_net_received: to_cents("gatewayNetReceived", net, true)?,
                gateway_status: raw.gateway_status.unwrap_or_default(),
            })
        } else {
            None
        };

        Ok(Self {
            id: ReservationId::from(non_blank("id", raw.id)?),
            owner_id: OwnerId::from(non_blank("ownerId", raw.owner_id)?),
            guest: GuestContact {
                name: raw.guest_name,
                email: raw.guest_email,
                phone: raw.guest_phone.filter(|phone| !phone.trim().is_empty()),
            },
            date,
            status,
            created_at: raw.created_at,
            checked_in_at: raw.checked_in_at,
            total,
            discount,
            coupon_code: raw.coupon_code.filter(|code| !code.trim().is_empty()),
            linked_to: raw
                .linked_to_reservation_id
                .filter(|id| !id.trim().is_empty())
                .map(ReservationId::from),
            items: raw
                .items
                .into_iter()
                .map(|item| LineItem {
                    title: item.title,
                    quantity: item.quantity,
                })
                .collect(),
            history: AuditLog::from(raw.history),
            reconciliation,
            version: raw.version,
        })
    }
}
