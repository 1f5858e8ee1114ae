//! Domain error kinds shared across the return flow.
//!
//! Validation errors mean the submitted data is wrong and the operator
//! can fix it inline. Precondition errors mean the action is not
//! allowed for the return's current state, regardless of the data.
//! Storage failures live with the store layer (`store::StorageError`).

use thiserror::Error;

use crate::returns::states::{ReturnState, ReturnStep};

/// The submitted payload is invalid; correct it and resubmit.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("required field missing: {field}")]
    MissingField { field: &'static str },

    #[error("amount must not be negative: {amount_cents} cents")]
    NegativeAmount { amount_cents: i64 },

    #[error("reason must be at least {min} characters after trimming, got {got}")]
    ReasonTooShort { min: usize, got: usize },

    #[error("return odometer {return_km} km is below pickup odometer {pickup_km} km")]
    OdometerRegression { pickup_km: u32, return_km: u32 },

    #[error("fuel level is recorded in eighths of a tank, 0 through 8: got {value}")]
    FuelOutOfRange { value: u8 },

    #[error("exception returns need at least {required} photos, {uploaded} on file")]
    PhotoFloorNotMet { required: usize, uploaded: usize },

    #[error("damage check must be confirmed before closeout")]
    DamageCheckUnconfirmed,
}

/// The action is refused in the return's current state.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PreconditionError {
    #[error("step '{step}' is not accessible while the return is {state}")]
    StepNotAccessible { step: ReturnStep, state: ReturnState },

    #[error("step '{step}' is already complete")]
    StepAlreadyComplete { step: ReturnStep },

    #[error("late fee of {fee_cents} cents must be approved or overridden before closeout")]
    FeeApprovalPending { fee_cents: i64 },

    #[error("no late fee has been assessed yet; complete intake first")]
    FeeNotAssessed,

    #[error("fee decisions are locked once the contract is closed out")]
    FeeLocked,

    #[error("contract is locked from closeout on (currently {state}); no further edits")]
    ContractLocked { state: ReturnState },

    #[error("booking {reference} is {status}, not an active rental")]
    BookingNotActive { reference: String, status: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offending_values() {
        let err = ValidationError::OdometerRegression {
            pickup_km: 42_100,
            return_km: 42_050,
        };
        let text = err.to_string();
        assert!(text.contains("42050"));
        assert!(text.contains("42100"));

        let err = PreconditionError::StepNotAccessible {
            step: ReturnStep::Closeout,
            state: ReturnState::EvidenceDone,
        };
        assert!(err.to_string().contains("closeout"));
        assert!(err.to_string().contains("evidence_done"));
    }
}
