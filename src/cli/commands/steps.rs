//! The five return steps as desk commands. Each one takes the session
//! lock, runs exactly one coordinator step, and reports the outcome
//! with the next command to run.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};

use super::{acquire_session_lock, report_flow_error, step_command_hint, with_coordinator, Command};
use crate::cli::format_cents;
use crate::coordinator::{StepOutcome, StepPayload};

fn report_outcome(reference: &str, outcome: &StepOutcome) {
    println!(
        "✅ {} complete, return is now {}",
        outcome.completed.label(),
        outcome.new_state
    );
    match outcome.next_step {
        Some(step) => println!("➡️  Next: {}", step_command_hint(step, reference)),
        None => println!("🎉 Contract complete; deposit released."),
    }
}

async fn run_step(reference: &str, payload: StepPayload) -> Result<StepOutcome> {
    let _lock = acquire_session_lock(reference)?;
    let reference = reference.to_string();
    with_coordinator(|coordinator| async move {
        match coordinator.complete_step(&reference, payload).await {
            Ok(outcome) => {
                report_outcome(&reference, &outcome);
                Ok(outcome)
            }
            Err(err) => {
                report_flow_error(&err);
                Err(err.into())
            }
        }
    })
    .await
}

/// Step 1: vehicle is back on the lot. Records the return time,
/// odometer, and fuel, and assesses the late fee.
pub struct IntakeCommand {
    pub reference: String,
    pub odometer_km: u32,
    pub fuel_level_eighths: u8,
    pub returned_at: Option<String>,
}

impl IntakeCommand {
    pub fn new(
        reference: impl Into<String>,
        odometer_km: u32,
        fuel_level_eighths: u8,
        returned_at: Option<String>,
    ) -> Self {
        Self {
            reference: reference.into(),
            odometer_km,
            fuel_level_eighths,
            returned_at,
        }
    }

    fn parse_returned_at(&self) -> Result<DateTime<Utc>> {
        match &self.returned_at {
            None => Ok(Utc::now()),
            Some(raw) => DateTime::parse_from_rfc3339(raw)
                .map(|at| at.with_timezone(&Utc))
                .map_err(|_| {
                    anyhow!("--at must be RFC 3339, like 2026-03-14T11:40:00Z (got {raw})")
                }),
        }
    }
}

impl Command for IntakeCommand {
    async fn execute(&self) -> Result<()> {
        println!("🛬 INTAKE: {}", self.reference);
        println!();

        let returned_at = self.parse_returned_at()?;
        let payload = StepPayload::Intake {
            returned_at,
            odometer_km: self.odometer_km,
            fuel_level_eighths: self.fuel_level_eighths,
        };
        let outcome = run_step(&self.reference, payload).await?;

        match outcome.late_fee_cents {
            Some(0) => println!("💵 Returned within grace; no late fee."),
            Some(fee) => {
                println!("💵 Late fee assessed: {}", format_cents(fee));
                println!("   Decide it before closeout: backlot fee {}", self.reference);
            }
            None => {}
        }
        Ok(())
    }
}

/// Step 2: confirm the condition photos on file meet the floor for
/// this return.
pub struct EvidenceCommand {
    pub reference: String,
}

impl EvidenceCommand {
    pub fn new(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
        }
    }
}

impl Command for EvidenceCommand {
    async fn execute(&self) -> Result<()> {
        println!("📷 EVIDENCE: {}", self.reference);
        println!();
        run_step(&self.reference, StepPayload::Evidence).await?;
        Ok(())
    }
}

/// Step 3: the damage review is finished, with or without findings.
pub struct IssuesCommand {
    pub reference: String,
}

impl IssuesCommand {
    pub fn new(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
        }
    }
}

impl Command for IssuesCommand {
    async fn execute(&self) -> Result<()> {
        println!("🔧 ISSUES REVIEW: {}", self.reference);
        println!();
        run_step(&self.reference, StepPayload::Issues).await?;
        Ok(())
    }
}

/// Step 4: close out the contract. Requires a resolved fee, and the
/// damage checklist confirmation for exception returns.
pub struct CloseoutCommand {
    pub reference: String,
    pub damage_check_confirmed: bool,
}

impl CloseoutCommand {
    pub fn new(reference: impl Into<String>, damage_check_confirmed: bool) -> Self {
        Self {
            reference: reference.into(),
            damage_check_confirmed,
        }
    }
}

impl Command for CloseoutCommand {
    async fn execute(&self) -> Result<()> {
        println!("📦 CLOSEOUT: {}", self.reference);
        println!();
        run_step(
            &self.reference,
            StepPayload::Closeout {
                damage_check_confirmed: self.damage_check_confirmed,
            },
        )
        .await?;
        println!("🔒 Fee and paperwork are now locked.");
        Ok(())
    }
}

/// Step 5: release the deposit and complete the contract.
pub struct SettleCommand {
    pub reference: String,
}

impl SettleCommand {
    pub fn new(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
        }
    }
}

impl Command for SettleCommand {
    async fn execute(&self) -> Result<()> {
        println!("💰 SETTLE DEPOSIT: {}", self.reference);
        println!();
        run_step(&self.reference, StepPayload::Deposit).await?;
        Ok(())
    }
}
