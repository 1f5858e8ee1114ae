//! Late-fee approval and reasoned override.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Minimum trimmed reason length whenever an approved amount differs
/// from the calculated one. One policy for overrides and admin
/// adjustments alike.
pub const MIN_REASON_CHARS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalKind {
    /// Calculated amount accepted as-is.
    Approved,
    /// Amount changed by staff, with a recorded reason.
    Overridden,
}

/// Decision recorded against the assessed late fee.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeApproval {
    pub approved_cents: i64,
    pub kind: ApprovalKind,
    pub reason: Option<String>,
    pub approved_by: String,
    pub approved_at: DateTime<Utc>,
}

/// Validate a fee decision and produce the approval record.
///
/// Accepting the calculated amount needs no reason; any departure from
/// it is an override and must carry a trimmed reason of at least
/// [`MIN_REASON_CHARS`] characters. Negative amounts are rejected
/// before the reason is looked at.
pub fn approve(
    calculated_cents: i64,
    proposed_cents: i64,
    reason: Option<&str>,
    approved_by: &str,
) -> Result<FeeApproval, ValidationError> {
    if proposed_cents < 0 {
        return Err(ValidationError::NegativeAmount {
            amount_cents: proposed_cents,
        });
    }

    let trimmed = reason.map(str::trim).filter(|r| !r.is_empty());

    if proposed_cents == calculated_cents {
        return Ok(FeeApproval {
            approved_cents: proposed_cents,
            kind: ApprovalKind::Approved,
            reason: trimmed.map(str::to_string),
            approved_by: approved_by.to_string(),
            approved_at: Utc::now(),
        });
    }

    let got = trimmed.map(|r| r.chars().count()).unwrap_or(0);
    if got < MIN_REASON_CHARS {
        return Err(ValidationError::ReasonTooShort {
            min: MIN_REASON_CHARS,
            got,
        });
    }

    Ok(FeeApproval {
        approved_cents: proposed_cents,
        kind: ApprovalKind::Overridden,
        reason: trimmed.map(str::to_string),
        approved_by: approved_by.to_string(),
        approved_at: Utc::now(),
    })
}

/// Standing of the late fee as shown in the session view and consulted
/// by the closeout gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FeeState {
    /// No fee was assessed.
    NoFee,
    /// A fee is on the table and still needs a decision.
    PendingApproval { fee_cents: i64 },
    Approved { approved_cents: i64 },
    Overridden { approved_cents: i64 },
}

impl FeeState {
    /// Closeout may proceed once no decision is outstanding.
    pub fn is_resolved(&self) -> bool {
        !matches!(self, FeeState::PendingApproval { .. })
    }

    /// Amount the customer will actually be charged, in cents.
    pub fn chargeable_cents(&self) -> i64 {
        match self {
            FeeState::NoFee => 0,
            FeeState::PendingApproval { fee_cents } => *fee_cents,
            FeeState::Approved { approved_cents } | FeeState::Overridden { approved_cents } => {
                *approved_cents
            }
        }
    }
}

impl std::fmt::Display for FeeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeeState::NoFee => write!(f, "no fee"),
            FeeState::PendingApproval { fee_cents } => {
                write!(f, "pending approval ({} cents)", fee_cents)
            }
            FeeState::Approved { approved_cents } => {
                write!(f, "approved ({} cents)", approved_cents)
            }
            FeeState::Overridden { approved_cents } => {
                write!(f, "overridden ({} cents)", approved_cents)
            }
        }
    }
}

/// Derive the fee standing from the assessed fee and any recorded
/// decision. A recorded decision always wins over the raw assessment.
pub fn fee_state(late_fee_cents: Option<i64>, approval: Option<&FeeApproval>) -> FeeState {
    if let Some(approval) = approval {
        return match approval.kind {
            ApprovalKind::Approved => FeeState::Approved {
                approved_cents: approval.approved_cents,
            },
            ApprovalKind::Overridden => FeeState::Overridden {
                approved_cents: approval.approved_cents,
            },
        };
    }
    match late_fee_cents {
        Some(fee) if fee > 0 => FeeState::PendingApproval { fee_cents: fee },
        _ => FeeState::NoFee,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepting_calculated_amount_needs_no_reason() {
        let approval = approve(3_000, 3_000, None, "m.voss").unwrap();
        assert_eq!(approval.kind, ApprovalKind::Approved);
        assert_eq!(approval.approved_cents, 3_000);
        assert_eq!(approval.reason, None);
    }

    #[test]
    fn override_needs_ten_characters_after_trimming() {
        let err = approve(3_000, 0, Some("  goodwill  "), "m.voss").unwrap_err();
        assert_eq!(
            err,
            ValidationError::ReasonTooShort {
                min: MIN_REASON_CHARS,
                got: 8,
            }
        );

        let approval = approve(3_000, 0, Some("goodwill, regular customer"), "m.voss").unwrap();
        assert_eq!(approval.kind, ApprovalKind::Overridden);
        assert_eq!(approval.approved_cents, 0);
        assert_eq!(
            approval.reason.as_deref(),
            Some("goodwill, regular customer")
        );
    }

    #[test]
    fn missing_reason_counts_as_zero_characters() {
        let err = approve(3_000, 1_500, None, "m.voss").unwrap_err();
        assert_eq!(
            err,
            ValidationError::ReasonTooShort {
                min: MIN_REASON_CHARS,
                got: 0,
            }
        );
    }

    #[test]
    fn negative_amount_rejected_before_reason_check() {
        let err = approve(3_000, -100, Some("long enough reason here"), "m.voss").unwrap_err();
        assert_eq!(err, ValidationError::NegativeAmount { amount_cents: -100 });
    }

    #[test]
    fn reason_length_counts_characters_not_bytes() {
        // 10 two-byte characters must pass.
        let reason = "überfällig";
        assert_eq!(reason.chars().count(), 10);
        let approval = approve(3_000, 0, Some(reason), "m.voss").unwrap();
        assert_eq!(approval.kind, ApprovalKind::Overridden);
    }

    #[test]
    fn fee_state_derivation() {
        assert_eq!(fee_state(None, None), FeeState::NoFee);
        assert_eq!(fee_state(Some(0), None), FeeState::NoFee);
        assert_eq!(
            fee_state(Some(3_000), None),
            FeeState::PendingApproval { fee_cents: 3_000 }
        );

        let approval = approve(3_000, 3_000, None, "m.voss").unwrap();
        assert_eq!(
            fee_state(Some(3_000), Some(&approval)),
            FeeState::Approved {
                approved_cents: 3_000
            }
        );

        let waived = approve(3_000, 0, Some("customer was rebooked by us"), "m.voss").unwrap();
        let state = fee_state(Some(3_000), Some(&waived));
        assert_eq!(state, FeeState::Overridden { approved_cents: 0 });
        assert!(state.is_resolved());
        assert_eq!(state.chargeable_cents(), 0);
    }

    #[test]
    fn pending_is_the_only_unresolved_state() {
        assert!(fee_state(None, None).is_resolved());
        assert!(!fee_state(Some(1_500), None).is_resolved());
    }
}
