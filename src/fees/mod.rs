//! Late-fee assessment and the approval workflow around it.

pub mod approval;
pub mod late_fee;

pub use approval::{approve, fee_state, ApprovalKind, FeeApproval, FeeState, MIN_REASON_CHARS};
pub use late_fee::{minutes_late, LateFeePolicy};
