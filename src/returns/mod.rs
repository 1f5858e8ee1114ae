//! Return lifecycle: states, step gating, classification, and the
//! derived legacy completion view.
//!
//! The persisted `return_state` on the booking is the single source of
//! truth for progress. Everything in this module is a pure function
//! over that state plus booking fields, so gating answers are
//! identical wherever they are asked.

pub mod classifier;
pub mod completion;
pub mod gating;
pub mod states;

pub use classifier::{classify, ReturnProfile, EXCEPTION_PHOTO_FLOOR};
pub use completion::{effective_state, ReturnCompletion};
pub use gating::{can_access_step, is_step_complete, step_gates, StepGate};
pub use states::{current_step, ReturnState, ReturnStep};
