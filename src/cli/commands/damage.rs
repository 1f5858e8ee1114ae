use anyhow::{anyhow, Result};
use uuid::Uuid;

use super::{acquire_session_lock, report_flow_error, with_coordinator};
use crate::booking::DamageSeverity;
use crate::cli::format_cents;

/// Notes new damage, removes a mistaken report, or lists what is on
/// file. Noting damage turns the return into an exception for the rest
/// of the session, even if the report is removed again.
pub struct DamageCommand {
    pub reference: String,
    pub note: Option<String>,
    pub severity: String,
    pub cost_cents: i64,
    pub clear: Option<Uuid>,
}

impl DamageCommand {
    pub fn new(
        reference: impl Into<String>,
        note: Option<String>,
        severity: impl Into<String>,
        cost_cents: i64,
        clear: Option<Uuid>,
    ) -> Self {
        Self {
            reference: reference.into(),
            note,
            severity: severity.into(),
            cost_cents,
            clear,
        }
    }

    pub async fn execute(&self) -> Result<()> {
        if let Some(report_id) = self.clear {
            return self.clear_report(report_id).await;
        }
        if let Some(description) = self.note.clone() {
            let severity = parse_severity(&self.severity)?;
            return self.note_damage(description, severity).await;
        }
        self.list().await
    }

    async fn note_damage(&self, description: String, severity: DamageSeverity) -> Result<()> {
        let _lock = acquire_session_lock(&self.reference)?;
        let reference = self.reference.clone();
        let cost_cents = self.cost_cents;

        with_coordinator(|coordinator| async move {
            match coordinator
                .note_damage(&reference, &description, severity, cost_cents)
                .await
            {
                Ok(report) => {
                    println!(
                        "🔧 Damage noted [{}]: {} (est {})",
                        report.severity,
                        report.description,
                        format_cents(report.estimated_cost_cents)
                    );
                    println!("   id {}", report.id);
                    println!("⚠️  This return is now handled as an exception.");
                    Ok(())
                }
                Err(err) => {
                    report_flow_error(&err);
                    Err(err.into())
                }
            }
        })
        .await
    }

    async fn clear_report(&self, report_id: Uuid) -> Result<()> {
        let _lock = acquire_session_lock(&self.reference)?;
        let reference = self.reference.clone();

        with_coordinator(|coordinator| async move {
            match coordinator.clear_damage(&reference, report_id).await {
                Ok(()) => {
                    println!("🧽 Damage report {report_id} removed");
                    println!("   The session keeps its exception handling either way.");
                    Ok(())
                }
                Err(err) => {
                    report_flow_error(&err);
                    Err(err.into())
                }
            }
        })
        .await
    }

    async fn list(&self) -> Result<()> {
        let reference = self.reference.clone();
        with_coordinator(|coordinator| async move {
            let session = coordinator.session(&reference).await?;
            if session.damage_reports.is_empty() {
                println!("🔧 No damage on file for {reference}");
                return Ok(());
            }
            println!("🔧 Damage on file for {reference}:");
            for report in &session.damage_reports {
                println!(
                    "   - [{}] {}, est {} (id {})",
                    report.severity,
                    report.description,
                    format_cents(report.estimated_cost_cents),
                    report.id
                );
            }
            Ok(())
        })
        .await
    }
}

fn parse_severity(raw: &str) -> Result<DamageSeverity> {
    match raw.to_ascii_lowercase().as_str() {
        "cosmetic" => Ok(DamageSeverity::Cosmetic),
        "moderate" => Ok(DamageSeverity::Moderate),
        "severe" => Ok(DamageSeverity::Severe),
        other => Err(anyhow!(
            "unknown severity '{other}', expected cosmetic, moderate, or severe"
        )),
    }
}
