use anyhow::Result;

use super::{report_flow_error, step_command_hint, with_coordinator};
use crate::cli::{format_cents, print_gates};
use crate::fees::approval::FeeState;

/// Shows everything the desk needs about one return: where it stands,
/// what is blocking, and what to run next.
pub struct StatusCommand {
    pub reference: String,
}

impl StatusCommand {
    pub fn new(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
        }
    }

    pub async fn execute(&self) -> Result<()> {
        println!("🚗 RETURN SESSION: {}", self.reference);
        println!("===========================");
        println!();

        let reference = self.reference.clone();
        with_coordinator(|coordinator| async move {
            let session = match coordinator.session(&reference).await {
                Ok(session) => session,
                Err(err) => {
                    report_flow_error(&err);
                    println!("   → Check the reference with: backlot arrivals");
                    return Err(err.into());
                }
            };
            let booking = &session.booking;

            println!(
                " 👤 {}    🚙 {}    📄 {}",
                booking.customer_name, booking.vehicle_plate, booking.status
            );
            println!(" 📆 Due back: {}", booking.end_at.format("%Y-%m-%d %H:%M"));
            match (booking.returned_at, session.minutes_late) {
                (Some(at), Some(minutes)) if minutes > 0 => {
                    println!(
                        " 🛬 Returned: {} ({} min late)",
                        at.format("%Y-%m-%d %H:%M"),
                        minutes
                    );
                }
                (Some(at), _) => {
                    println!(" 🛬 Returned: {} (on time)", at.format("%Y-%m-%d %H:%M"));
                }
                _ => println!(" 🛬 Returned: not yet"),
            }
            if let Some(km) = booking.return_odometer_km {
                let fuel = booking
                    .fuel_level_eighths
                    .map(|f| format!("{f}/8"))
                    .unwrap_or_else(|| "?".to_string());
                println!(
                    " 🧭 Odometer: {} → {} km    ⛽ {}",
                    booking.pickup_odometer_km, km, fuel
                );
            }
            println!();

            if session.profile.is_exception() {
                println!(
                    " ⚠️  Handled as EXCEPTION (photo floor {})",
                    session.profile.photo_floor()
                );
            } else {
                println!(" 🟢 Standard return");
            }

            match session.fee {
                FeeState::NoFee => println!(" 💵 Late fee: none"),
                FeeState::PendingApproval { fee_cents } => {
                    println!(
                        " 💵 Late fee: {} awaiting a decision",
                        format_cents(fee_cents)
                    );
                    println!("    → backlot fee {}", booking.reference);
                }
                FeeState::Approved { approved_cents } => {
                    println!(" 💵 Late fee: {} approved", format_cents(approved_cents));
                }
                FeeState::Overridden { approved_cents } => {
                    let calculated = booking
                        .late_fee_cents
                        .map(format_cents)
                        .unwrap_or_else(|| "?".to_string());
                    println!(
                        " 💵 Late fee: overridden to {} (calculated {})",
                        format_cents(approved_cents),
                        calculated
                    );
                }
            }

            if session.profile.photo_floor() > 0 {
                println!(
                    " 📷 Photos: {} on file (floor {})",
                    session.photo_count,
                    session.profile.photo_floor()
                );
            } else {
                println!(" 📷 Photos: {} on file", session.photo_count);
            }

            if session.damage_reports.is_empty() {
                println!(" 🔧 Damage: none on file");
            } else {
                println!(" 🔧 Damage:");
                for report in &session.damage_reports {
                    println!(
                        "    - [{}] {}, est {} (id {})",
                        report.severity,
                        report.description,
                        format_cents(report.estimated_cost_cents),
                        report.id
                    );
                }
            }
            println!();

            println!("STEPS:");
            print_gates(&session.gates);
            println!();

            if !session.recent_activity.is_empty() {
                println!(" 🕘 Recent activity:");
                for record in session.recent_activity.iter().rev().take(3) {
                    println!(
                        "    {}  {}: {} → {}  by {}",
                        record.recorded_at.format("%Y-%m-%d %H:%M"),
                        record.step,
                        record.from_state,
                        record.to_state,
                        record.operator
                    );
                }
                println!();
            }

            match session.next_step {
                Some(step) => println!(
                    "🎯 Next: {}",
                    step_command_hint(step, &booking.reference)
                ),
                None => println!("🎉 Return fully settled; deposit released."),
            }
            Ok(())
        })
        .await
    }
}
