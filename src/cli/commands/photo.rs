use anyhow::{anyhow, Result};

use super::{acquire_session_lock, report_flow_error, with_coordinator};
use crate::store::PhotoKind;

/// Registers one condition photo against the contract. The binary
/// stays on the branch photo share; this records that it exists, what
/// it shows, and where on the vehicle it was taken.
pub struct PhotoCommand {
    pub reference: String,
    pub label: String,
    pub kind: String,
}

impl PhotoCommand {
    pub fn new(
        reference: impl Into<String>,
        label: impl Into<String>,
        kind: impl Into<String>,
    ) -> Self {
        Self {
            reference: reference.into(),
            label: label.into(),
            kind: kind.into(),
        }
    }

    pub async fn execute(&self) -> Result<()> {
        let kind = parse_kind(&self.kind)?;
        let _lock = acquire_session_lock(&self.reference)?;
        let reference = self.reference.clone();
        let label = self.label.clone();

        with_coordinator(|coordinator| async move {
            match coordinator.add_photo(&reference, &label, kind).await {
                Ok(photo) => {
                    let session = coordinator.session(&reference).await?;
                    println!(
                        "📷 Photo '{}' ({}) registered ({} on file)",
                        photo.label, photo.kind, session.photo_count
                    );
                    if session.photo_count < session.profile.photo_floor() {
                        println!(
                            "   {} more needed before the evidence step",
                            session.profile.photo_floor() - session.photo_count
                        );
                    }
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

fn parse_kind(raw: &str) -> Result<PhotoKind> {
    PhotoKind::parse(&raw.to_ascii_lowercase()).ok_or_else(|| {
        anyhow!("unknown photo kind '{raw}', expected exterior, interior, odometer, fuel, or damage")
    })
}
