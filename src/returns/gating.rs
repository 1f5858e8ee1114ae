//! Step gating rules.
//!
//! Every predicate here is a total function of `(state, step)` so the
//! same answer is produced no matter which surface asks: the CLI, the
//! coordinator, or a test table. Staff may revisit completed screens,
//! so access is "reached at least the step's entry state", not "is
//! exactly on the step".

use serde::Serialize;

use super::states::{current_step, ReturnState, ReturnStep};

/// May staff open `step` for a return currently in `state`?
///
/// Completed steps stay readable; steps ahead of the lifecycle are
/// refused until every earlier step is done.
pub fn can_access_step(state: ReturnState, step: ReturnStep) -> bool {
    state.is_at_least(step.required_state())
}

/// Has `step` already been completed for a return in `state`?
pub fn is_step_complete(state: ReturnState, step: ReturnStep) -> bool {
    state.is_at_least(step.completed_state())
}

/// Row of the flow summary: one gate per step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StepGate {
    pub step: ReturnStep,
    pub accessible: bool,
    pub complete: bool,
    /// True for the single step staff should work on next.
    pub current: bool,
}

/// Gates for the full flow of a return in `state`, in processing order.
pub fn step_gates(state: ReturnState) -> [StepGate; 5] {
    let active = current_step(state);
    ReturnStep::ALL.map(|step| StepGate {
        step,
        accessible: can_access_step(state, step),
        complete: is_step_complete(state, step),
        current: active == Some(step),
    })
}
