use anyhow::{anyhow, Result};

use super::{acquire_session_lock, report_flow_error, with_coordinator};
use crate::cli::format_cents;
use crate::fees::approval::ApprovalKind;

/// Records the late fee decision. Without `--amount` the calculated
/// fee is accepted as-is; a differing amount is an override and needs
/// a reason. `--adjust` is the audited path for correcting a fee after
/// closeout.
pub struct FeeCommand {
    pub reference: String,
    pub amount_cents: Option<i64>,
    pub reason: Option<String>,
    pub adjust: bool,
}

impl FeeCommand {
    pub fn new(
        reference: impl Into<String>,
        amount_cents: Option<i64>,
        reason: Option<String>,
        adjust: bool,
    ) -> Self {
        Self {
            reference: reference.into(),
            amount_cents,
            reason,
            adjust,
        }
    }

    pub async fn execute(&self) -> Result<()> {
        if self.adjust {
            return self.adjust_fee().await;
        }
        self.decide_fee().await
    }

    async fn decide_fee(&self) -> Result<()> {
        println!("💵 FEE DECISION: {}", self.reference);
        println!();

        let _lock = acquire_session_lock(&self.reference)?;
        let reference = self.reference.clone();
        let amount = self.amount_cents;
        let reason = self.reason.clone();

        with_coordinator(|coordinator| async move {
            // Without an explicit amount, accept whatever intake
            // calculated.
            let proposed = match amount {
                Some(cents) => cents,
                None => {
                    let session = coordinator.session(&reference).await?;
                    match session.booking.late_fee_cents {
                        Some(cents) => cents,
                        None => {
                            println!("⛔ No fee has been assessed yet; run intake first.");
                            return Err(anyhow!("late fee not assessed for {reference}"));
                        }
                    }
                }
            };

            match coordinator
                .approve_late_fee(&reference, proposed, reason.as_deref())
                .await
            {
                Ok(approval) => {
                    match approval.kind {
                        ApprovalKind::Approved => println!(
                            "✅ Fee of {} approved",
                            format_cents(approval.approved_cents)
                        ),
                        ApprovalKind::Overridden => println!(
                            "🖊️  Fee overridden to {} (reason on record)",
                            format_cents(approval.approved_cents)
                        ),
                    }
                    println!("   → backlot closeout {reference}");
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

    async fn adjust_fee(&self) -> Result<()> {
        println!("🛠️  FEE ADJUSTMENT: {}", self.reference);
        println!();

        let amount = self
            .amount_cents
            .ok_or_else(|| anyhow!("--adjust needs --amount <cents>"))?;
        let reason = self
            .reason
            .clone()
            .ok_or_else(|| anyhow!("--adjust always needs --reason"))?;

        let _lock = acquire_session_lock(&self.reference)?;
        let reference = self.reference.clone();

        with_coordinator(|coordinator| async move {
            match coordinator.admin_adjust_fee(&reference, amount, &reason).await {
                Ok(approval) => {
                    println!(
                        "🛠️  Fee adjusted to {} (override on record)",
                        format_cents(approval.approved_cents)
                    );
                    println!("   The adjustment is in the audit trail: backlot audit {reference}");
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
}
