//! Day-pass Engine Demo
//!
//! Walks through the core flows against an in-memory store:
//! - Commission during and after a venue's promotional window
//! - Check-in of a dependent ticket with guardian attestation
//! - Bulk rescheduling with one ineligible reservation
//! - Period report
//!
//! # Usage
//!
//! ```bash
//! RUST_LOG=debug cargo run --bin daypass-demo
//! ```

use chrono::{Duration, NaiveDate};
use daypass_core::environment::{Clock, SystemClock};
use daypass_reservations::{
    metrics::register_reservation_metrics,
    notifications::TracingNotifier,
    types::GuestContact,
    Config, CouponCatalog, InMemoryReservationRepository, Money, OwnerId, ReportFilter,
    Reservation, ReservationId, ReservationService, ReservationStatus, VenueDirectory, VenueTerms,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn guest(name: &str) -> GuestContact {
    GuestContact {
        name: name.to_string(),
        email: format!("{}@example.com", name.to_ascii_lowercase()),
        phone: None,
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let config = Config::from_env();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_new(&config.log_level)
                .unwrap_or_else(|_| "info,daypass_reservations=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    register_reservation_metrics();

    println!("\n============================================");
    println!("   Day-pass Engine - Live Demo");
    println!("============================================\n");

    let clock = SystemClock;
    let now = clock.now();
    let today = clock.today();

    let venue = OwnerId::from("lagoon-club");
    let activation: NaiveDate = today - Duration::days(10);
    let venues = VenueDirectory::new(config.commission_policy()).with_venue(
        venue.clone(),
        VenueTerms {
            commission: config.commission_policy().activated_on(activation),
            coupons: CouponCatalog::new(),
        },
    );

    let fresh = Reservation::new(
        ReservationId::from("scenario-a"),
        venue.clone(),
        guest("Ana"),
        today,
        Money::from_units(180),
        now,
    )
    .with_status(ReservationStatus::Confirmed)
    .with_discount(Money::from_units(20), Some("SUMMER".to_string()));
    let later = Reservation {
        id: ReservationId::from("scenario-b"),
        created_at: now + Duration::days(35),
        ..fresh.clone()
    };

    let child = Reservation::new(ReservationId::from("child"), venue.clone(), guest("Bruno"), today, Money::from_units(30), now)
        .with_status(ReservationStatus::Paid)
        .with_item("Child day pass", 1)
        .linked_to(ReservationId::from("guardian"));

    let repository = InMemoryReservationRepository::seeded([fresh, later, child]);
    let service = ReservationService::from_config(
        &config,
        Arc::new(repository),
        Arc::new(clock),
        TracingNotifier::shared(),
    )
    .with_venues(venues);

    // The guardian ticket arrives as a stored document
    let guardian = service
        .import(
            &serde_json::json!({
                "id": "guardian",
                "ownerId": venue.as_str(),
                "guestName": "Bruno",
                "guestEmail": "bruno@example.com",
                "date": today.to_string(),
                "status": "Confirmed",
                "createdAt": now,
                "total": 60.0,
                "cartItems": [{ "title": "Adult day pass", "quantity": 1 }]
            })
            .to_string(),
        )
        .await?;
    println!("Imported {} ({}) from its stored document\n", guardian.id, guardian.status);

    // ========== Scenarios A and B: commission ==========

    println!("A/B. Commission for a venue first activated on {activation}");
    for id in ["scenario-a", "scenario-b"] {
        let parts = service.decompose(&ReservationId::from(id)).await?;
        println!(
            "   {id}: gross {} | discount {} | fee {} ({:.0}%) | net {}",
            parts.gross,
            parts.discount,
            parts.fee,
            parts.fee_percent * 100.0,
            parts.net
        );
    }

    // ========== Scenario C: dependent ticket ==========

    println!("\nC. Dependent ticket at the gate");
    let child_id = ReservationId::from("child");

    let refused = service.validate_entry(&child_id, false).await?;
    if let Some(refusal) = &refused.refusal {
        println!("   without attestation: refused ({refusal})");
    }

    let admitted = service.validate_entry(&child_id, true).await?;
    println!(
        "   with attestation: {} at {:?}",
        admitted.reservation.status, admitted.reservation.checked_in_at
    );
    for entry in admitted.reservation.history.entries() {
        println!("     {entry}");
    }
    admitted.notifications.wait().await;

    // ========== Scenario D: bulk reschedule ==========

    println!("\nD. Bulk reschedule to {}", today + Duration::days(7));
    let report = service
        .reschedule_many(
            ["scenario-a", "guardian", "child"].map(ReservationId::from),
            today + Duration::days(7),
        )
        .await;
    println!("   succeeded: {:?}", report.succeeded);
    for (id, failure) in &report.failed {
        println!("   failed: {id} ({failure})");
    }
    report.notifications.wait().await;

    // ========== Report ==========

    let totals = service.report(&ReportFilter::default().owned_by(venue)).await?;
    println!(
        "\nReport: {} sales | gross {} | fee {} | net {} | excluded {}",
        totals.approved_sales,
        totals.gross,
        totals.fee,
        totals.net,
        totals.excluded.len()
    );

    println!("\n============================================\n");
    Ok(())
}
