use anyhow::{Context, Result};
use chrono::{Duration, Utc};

use super::build_stores;
use crate::booking::Booking;
use crate::config;
use crate::store::StorageError;

/// Loads contracts into the configured backend: either the built-in
/// demo set or a JSON file exported from the booking system.
pub struct SeedCommand {
    pub file: Option<String>,
}

impl SeedCommand {
    pub fn new(file: Option<String>) -> Self {
        Self { file }
    }

    pub async fn execute(&self) -> Result<()> {
        println!("🌱 BACKLOT SEED");
        println!("===============");
        println!();

        let bookings = match &self.file {
            Some(path) => {
                let bytes = std::fs::read(path)
                    .with_context(|| format!("could not read bookings file {path}"))?;
                serde_json::from_slice::<Vec<Booking>>(&bytes)
                    .with_context(|| format!("{path} is not a JSON array of bookings"))?
            }
            None => demo_bookings(),
        };

        let settings = config::config()?;
        let (records, _) = build_stores(settings).await?;

        let mut created = 0;
        for booking in bookings {
            let reference = booking.reference.clone();
            match records.insert_booking(booking).await {
                Ok(()) => {
                    created += 1;
                    println!("   ✅ {reference} created");
                }
                Err(StorageError::DuplicateReference { .. }) => {
                    println!("   ↩️  {reference} already present, skipping");
                }
                Err(err) => return Err(err.into()),
            }
        }

        println!();
        println!("🎯 Seed complete: {created} contract(s) loaded");
        println!("   → backlot arrivals");
        Ok(())
    }
}

/// A spread of situations the desk actually sees: one due soon, one
/// already overdue, one barely inside the grace period, and one legacy
/// row returned before lifecycle states were stored.
fn demo_bookings() -> Vec<Booking> {
    let now = Utc::now();

    let due_soon = Booking::new(
        "R-20441",
        "Mara Voss",
        "KX-481-TL",
        now + Duration::hours(2),
        50_000,
        42_100,
    );

    let overdue = Booking::new(
        "R-20417",
        "Jonas Brandt",
        "ND-209-EC",
        now - Duration::minutes(100),
        35_000,
        18_750,
    );

    let in_grace = Booking::new(
        "R-20436",
        "Aiko Tanaka",
        "RV-733-KP",
        now - Duration::minutes(20),
        40_000,
        61_220,
    );

    let mut legacy = Booking::new(
        "R-20360",
        "Pieter Hendriks",
        "GB-118-XS",
        now - Duration::hours(4),
        30_000,
        9_400,
    );
    // Returned before lifecycle states were recorded; progress is
    // inferred from the stamped fields.
    legacy.returned_at = Some(now - Duration::hours(3));
    legacy.return_odometer_km = Some(9_910);
    legacy.fuel_level_eighths = Some(7);

    vec![due_soon, overdue, in_grace, legacy]
}
