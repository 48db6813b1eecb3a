//! Sales reporting.
//!
//! Folds [`decompose_for_venue`] over a filtered reservation set. Only statuses
//! that count as a sale contribute to the revenue sums; the rest are listed in
//! [`SalesReport::excluded`] so they stay visible.

use crate::finance::{decompose_for_venue, VenueDirectory};
use crate::types::{Money, OwnerId, Reservation, ReservationId, ReservationStatus};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Which date a report's range applies to
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DateBasis {
    /// The day the guest visits
    #[default]
    VisitDate,
    /// The day the reservation was sold
    SaleDate,
}

/// Which reservations a report covers; `None` fields match anything
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportFilter {
    /// Restrict to one venue
    pub owner: Option<OwnerId>,
    /// First day, inclusive
    pub from: Option<NaiveDate>,
    /// Last day, inclusive
    pub to: Option<NaiveDate>,
    /// Restrict to these statuses (empty means all)
    pub statuses: BTreeSet<ReservationStatus>,
    /// Date the range applies to
    pub basis: DateBasis,
}

impl ReportFilter {
    /// Inclusive date range
    #[must_use]
    pub const fn between(mut self, from: NaiveDate, to: NaiveDate) -> Self {
        self.from = Some(from);
        self.to = Some(to);
        self
    }

    /// Restrict to one venue
    #[must_use]
    pub fn owned_by(mut self, owner: OwnerId) -> Self {
        self.owner = Some(owner);
        self
    }

    /// Restrict to the given statuses
    #[must_use]
    pub fn with_statuses(mut self, statuses: impl IntoIterator<Item = ReservationStatus>) -> Self {
        self.statuses.extend(statuses);
        self
    }

    /// Apply the range to sale dates instead of visit dates
    #[must_use]
    pub const fn by_sale_date(mut self) -> Self {
        self.basis = DateBasis::SaleDate;
        self
    }

    /// Whether `reservation` is in scope
    #[must_use]
    pub fn matches(&self, reservation: &Reservation) -> bool {
        let day = match self.basis {
            DateBasis::VisitDate => reservation.date,
            DateBasis::SaleDate => reservation.created_at.date_naive(),
        };

        self.owner.as_ref().is_none_or(|owner| &reservation.owner_id == owner)
            && self.from.is_none_or(|from| day >= from)
            && self.to.is_none_or(|to| day <= to)
            && (self.statuses.is_empty() || self.statuses.contains(&reservation.status))
    }
}

/// A reservation left out of the revenue sums
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExcludedReservation {
    /// Reservation
    pub id: ReservationId,
    /// Its status
    pub status: ReservationStatus,
}

/// Period totals
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesReport {
    /// Reservations counted as sales
    pub approved_sales: usize,
    /// Sum of gross
    pub gross: Money,
    /// Sum of discount
    pub discount: Money,
    /// Sum of commission
    pub fee: Money,
    /// Sum of venue net
    pub net: Money,
    /// Sales whose fee/net came from the gateway
    pub reconciled_sales: usize,
    /// In-scope reservations that are not sales
    pub excluded: Vec<ExcludedReservation>,
    /// In-scope reservations per status, sales or not
    pub by_status: BTreeMap<ReservationStatus, usize>,
}

/// Aggregate the in-scope reservations into a [`SalesReport`]
#[must_use]
pub fn aggregate<'a>(
    reservations: impl IntoIterator<Item = &'a Reservation>,
    filter: &ReportFilter,
    venues: &VenueDirectory,
) -> SalesReport {
    reservations
        .into_iter()
        .filter(|reservation| filter.matches(reservation))
        .fold(SalesReport::default(), |mut report, reservation| {
            *report.by_status.entry(reservation.status).or_default() += 1;

            if !reservation.status.counts_as_sale() {
                report.excluded.push(ExcludedReservation {
                    id: reservation.id.clone(),
                    status: reservation.status,
                });
                return report;
            }

            let parts = decompose_for_venue(reservation, venues.terms_for(&reservation.owner_id));
            report.approved_sales += 1;
            report.gross += parts.gross;
            report.discount += parts.discount;
            report.fee += parts.fee;
            report.net += parts.net;
            if parts.reconciled {
                report.reconciled_sales += 1;
            }
            report
        })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::finance::CommissionPolicy;
    use crate::types::GuestContact;
    use chrono::{TimeZone, Utc};

    fn reservation(id: &str, day: u32, status: ReservationStatus, total: i64) -> Reservation {
        Reservation::new(
            ReservationId::from(id),
            OwnerId::from("venue-1"),
            GuestContact::default(),
            NaiveDate::from_ymd_opt(2025, 4, day).unwrap(),
            Money::from_units(total),
            Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap(),
        )
        .with_status(status)
    }

    fn directory() -> VenueDirectory {
        VenueDirectory::new(CommissionPolicy::default())
    }

    #[test]
    fn only_sales_contribute_to_sums() {
        let reservations = [
            reservation("a", 1, ReservationStatus::Confirmed, 100),
            reservation("b", 2, ReservationStatus::Validated, 50),
            reservation("c", 3, ReservationStatus::Pending, 70),
            reservation("d", 4, ReservationStatus::Refunded, 30),
        ];

        let report = aggregate(&reservations, &ReportFilter::default(), &directory());
        assert_eq!(report.approved_sales, 2);
        assert_eq!(report.gross, Money::from_units(150));
        assert_eq!(report.fee, Money::from_units(18));
        assert_eq!(report.net, Money::from_units(132));
        assert_eq!(
            report.excluded,
            vec![
                ExcludedReservation { id: ReservationId::from("c"), status: ReservationStatus::Pending },
                ExcludedReservation { id: ReservationId::from("d"), status: ReservationStatus::Refunded },
            ]
        );
        assert_eq!(report.by_status.get(&ReservationStatus::Confirmed), Some(&1));
    }

    #[test]
    fn date_range_is_inclusive() {
        let reservations = [
            reservation("a", 1, ReservationStatus::Paid, 10),
            reservation("b", 2, ReservationStatus::Paid, 10),
            reservation("c", 3, ReservationStatus::Paid, 10),
        ];
        let filter = ReportFilter::default().between(
            NaiveDate::from_ymd_opt(2025, 4, 2).unwrap(),
            NaiveDate::from_ymd_opt(2025, 4, 3).unwrap(),
        );
        assert_eq!(aggregate(&reservations, &filter, &directory()).approved_sales, 2);
    }

    #[test]
    fn sale_date_basis_uses_creation_day() {
        let reservations = [reservation("a", 20, ReservationStatus::Paid, 10)];
        let march = ReportFilter::default()
            .between(
                NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
                NaiveDate::from_ymd_opt(2025, 3, 31).unwrap(),
            )
            .by_sale_date();
        assert_eq!(aggregate(&reservations, &march, &directory()).approved_sales, 1);
        let by_visit = ReportFilter {
            basis: DateBasis::VisitDate,
            ..march
        };
        assert_eq!(aggregate(&reservations, &by_visit, &directory()).approved_sales, 0);
    }

    #[test]
    fn status_filter_narrows_scope() {
        let reservations = [
            reservation("a", 1, ReservationStatus::Paid, 10),
            reservation("b", 1, ReservationStatus::Validated, 10),
            reservation("c", 1, ReservationStatus::Cancelled, 10),
        ];
        let filter = ReportFilter::default().with_statuses([ReservationStatus::Validated, ReservationStatus::Cancelled]);
        let report = aggregate(&reservations, &filter, &directory());
        assert_eq!(report.approved_sales, 1);
        assert_eq!(report.excluded.len(), 1);
    }

    #[test]
    fn empty_input_is_an_empty_report() {
        assert_eq!(aggregate(std::iter::empty(), &ReportFilter::default(), &directory()), SalesReport::default());
    }
}
