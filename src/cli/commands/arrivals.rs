use anyhow::Result;
use chrono::{Duration, Utc};

use super::with_coordinator;
use crate::cli::format_cents;

/// Lists active contracts due back inside the window, soonest first,
/// with overdue ones flagged.
pub struct ArrivalsCommand {
    pub hours: i64,
}

impl ArrivalsCommand {
    pub fn new(hours: i64) -> Self {
        Self { hours }
    }

    pub async fn execute(&self) -> Result<()> {
        println!("📋 ARRIVALS (±{}h)", self.hours);
        println!("==================");
        println!();

        let hours = self.hours;
        with_coordinator(|coordinator| async move {
            let now = Utc::now();
            let from = now - Duration::hours(hours);
            let to = now + Duration::hours(hours);

            let due = coordinator.arrivals(from, to).await?;
            if due.is_empty() {
                println!("📭 Nothing due back in this window");
                println!("   → Widen it: backlot arrivals --hours {}", hours * 2);
                return Ok(());
            }

            for booking in &due {
                let minutes = (now - booking.end_at).num_minutes();
                let when = booking.end_at.format("%Y-%m-%d %H:%M");
                if minutes > 0 {
                    println!(
                        " ⏰ {}  {:<18} {}  due {}  (overdue {})",
                        booking.reference,
                        booking.customer_name,
                        booking.vehicle_plate,
                        when,
                        human_minutes(minutes),
                    );
                } else {
                    println!(
                        " 🟢 {}  {:<18} {}  due {}  (in {})",
                        booking.reference,
                        booking.customer_name,
                        booking.vehicle_plate,
                        when,
                        human_minutes(-minutes),
                    );
                }
            }

            println!();
            println!("📊 {} contract(s) in the window", due.len());
            let overdue = due.iter().filter(|b| b.is_overdue_at(now)).count();
            if overdue > 0 {
                println!("   ⏰ {overdue} overdue; late fees assessed at intake");
                println!(
                    "   💵 Current policy: {} grace, {} per started hour",
                    human_minutes(coordinator.policy().grace_minutes),
                    format_cents(coordinator.policy().hourly_rate_cents),
                );
            }
            println!();
            println!("   → backlot status <reference>");
            Ok(())
        })
        .await
    }
}

fn human_minutes(minutes: i64) -> String {
    if minutes >= 60 {
        format!("{}h{:02}m", minutes / 60, minutes % 60)
    } else {
        format!("{minutes}m")
    }
}
