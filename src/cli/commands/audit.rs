use anyhow::Result;

use super::{report_flow_error, with_coordinator};

/// Prints the step audit trail for one contract, oldest first.
pub struct AuditCommand {
    pub reference: String,
}

impl AuditCommand {
    pub fn new(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
        }
    }

    pub async fn execute(&self) -> Result<()> {
        println!("🕘 AUDIT TRAIL: {}", self.reference);
        println!("=======================");
        println!();

        let reference = self.reference.clone();
        with_coordinator(|coordinator| async move {
            let records = match coordinator.audit_log(&reference).await {
                Ok(records) => records,
                Err(err) => {
                    report_flow_error(&err);
                    return Err(err.into());
                }
            };

            if records.is_empty() {
                println!("📭 No steps recorded yet");
                return Ok(());
            }

            for record in &records {
                println!(
                    " {}  {:<18} {} → {}  by {} @ {}",
                    record.recorded_at.format("%Y-%m-%d %H:%M:%S"),
                    record.step.label(),
                    record.from_state,
                    record.to_state,
                    record.operator,
                    record.workstation
                );
            }
            println!();
            println!("📊 {} recorded step(s)", records.len());
            Ok(())
        })
        .await
    }
}
