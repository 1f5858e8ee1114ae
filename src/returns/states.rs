// Core types for the return lifecycle state machine

use serde::{Deserialize, Serialize};

/// Lifecycle states of a vehicle return, in processing order.
///
/// Derived `Ord` is meaningful: a later state implies every earlier
/// step has been completed, so gating reduces to ordinal comparison.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum ReturnState {
    /// Vehicle not yet back, nothing recorded
    #[default]
    NotStarted,
    /// Odometer, fuel and timestamp captured at the gate
    IntakeDone,
    /// Condition photos on file
    EvidenceDone,
    /// Damage and late-fee exceptions reviewed
    IssuesReviewed,
    /// Contract closed, vehicle released back to the fleet
    ClosedOut,
    /// Deposit refunded or retained, file archived
    DepositSettled,
}

impl ReturnState {
    /// Ordinal position in the lifecycle, 0-based.
    pub fn rank(&self) -> u8 {
        match self {
            ReturnState::NotStarted => 0,
            ReturnState::IntakeDone => 1,
            ReturnState::EvidenceDone => 2,
            ReturnState::IssuesReviewed => 3,
            ReturnState::ClosedOut => 4,
            ReturnState::DepositSettled => 5,
        }
    }

    /// True when this state is the same as, or later than, `other`.
    pub fn is_at_least(&self, other: ReturnState) -> bool {
        self.rank() >= other.rank()
    }

    /// Terminal state: nothing left to process.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReturnState::DepositSettled)
    }

    /// Contract edits are frozen from closeout onward.
    pub fn is_locked(&self) -> bool {
        self.is_at_least(ReturnState::ClosedOut)
    }

    /// The state reached by completing the next step, if any remains.
    pub fn next(&self) -> Option<ReturnState> {
        match self {
            ReturnState::NotStarted => Some(ReturnState::IntakeDone),
            ReturnState::IntakeDone => Some(ReturnState::EvidenceDone),
            ReturnState::EvidenceDone => Some(ReturnState::IssuesReviewed),
            ReturnState::IssuesReviewed => Some(ReturnState::ClosedOut),
            ReturnState::ClosedOut => Some(ReturnState::DepositSettled),
            ReturnState::DepositSettled => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReturnState::NotStarted => "not_started",
            ReturnState::IntakeDone => "intake_done",
            ReturnState::EvidenceDone => "evidence_done",
            ReturnState::IssuesReviewed => "issues_reviewed",
            ReturnState::ClosedOut => "closed_out",
            ReturnState::DepositSettled => "deposit_settled",
        }
    }

    /// Parse the persisted wire form back into a state.
    pub fn parse(value: &str) -> Option<ReturnState> {
        match value {
            "not_started" => Some(ReturnState::NotStarted),
            "intake_done" => Some(ReturnState::IntakeDone),
            "evidence_done" => Some(ReturnState::EvidenceDone),
            "issues_reviewed" => Some(ReturnState::IssuesReviewed),
            "closed_out" => Some(ReturnState::ClosedOut),
            "deposit_settled" => Some(ReturnState::DepositSettled),
            _ => None,
        }
    }
}

impl std::fmt::Display for ReturnState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Staff-facing processing steps, one per screen in the return flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnStep {
    Intake,
    Evidence,
    Issues,
    Closeout,
    Deposit,
}

impl ReturnStep {
    /// Every step in processing order.
    pub const ALL: [ReturnStep; 5] = [
        ReturnStep::Intake,
        ReturnStep::Evidence,
        ReturnStep::Issues,
        ReturnStep::Closeout,
        ReturnStep::Deposit,
    ];

    /// Minimum state a return must have reached before staff may open
    /// this step.
    pub fn required_state(&self) -> ReturnState {
        match self {
            ReturnStep::Intake => ReturnState::NotStarted,
            ReturnStep::Evidence => ReturnState::IntakeDone,
            ReturnStep::Issues => ReturnState::EvidenceDone,
            ReturnStep::Closeout => ReturnState::IssuesReviewed,
            ReturnStep::Deposit => ReturnState::ClosedOut,
        }
    }

    /// State the return moves to when this step is completed.
    pub fn completed_state(&self) -> ReturnState {
        match self {
            ReturnStep::Intake => ReturnState::IntakeDone,
            ReturnStep::Evidence => ReturnState::EvidenceDone,
            ReturnStep::Issues => ReturnState::IssuesReviewed,
            ReturnStep::Closeout => ReturnState::ClosedOut,
            ReturnStep::Deposit => ReturnState::DepositSettled,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ReturnStep::Intake => "Vehicle intake",
            ReturnStep::Evidence => "Condition photos",
            ReturnStep::Issues => "Exception review",
            ReturnStep::Closeout => "Contract closeout",
            ReturnStep::Deposit => "Deposit settlement",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReturnStep::Intake => "intake",
            ReturnStep::Evidence => "evidence",
            ReturnStep::Issues => "issues",
            ReturnStep::Closeout => "closeout",
            ReturnStep::Deposit => "deposit",
        }
    }

    pub fn parse(value: &str) -> Option<ReturnStep> {
        match value {
            "intake" => Some(ReturnStep::Intake),
            "evidence" => Some(ReturnStep::Evidence),
            "issues" => Some(ReturnStep::Issues),
            "closeout" => Some(ReturnStep::Closeout),
            "deposit" => Some(ReturnStep::Deposit),
            _ => None,
        }
    }
}

impl std::fmt::Display for ReturnStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The step staff should work on next for a return in `state`, or
/// `None` once the deposit has been settled.
pub fn current_step(state: ReturnState) -> Option<ReturnStep> {
    match state {
        ReturnState::NotStarted => Some(ReturnStep::Intake),
        ReturnState::IntakeDone => Some(ReturnStep::Evidence),
        ReturnState::EvidenceDone => Some(ReturnStep::Issues),
        ReturnState::IssuesReviewed => Some(ReturnStep::Closeout),
        ReturnState::ClosedOut => Some(ReturnStep::Deposit),
        ReturnState::DepositSettled => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranks_are_strictly_increasing() {
        let states = [
            ReturnState::NotStarted,
            ReturnState::IntakeDone,
            ReturnState::EvidenceDone,
            ReturnState::IssuesReviewed,
            ReturnState::ClosedOut,
            ReturnState::DepositSettled,
        ];
        for pair in states.windows(2) {
            assert!(pair[0].rank() < pair[1].rank());
            assert!(pair[0] < pair[1], "derived Ord must follow rank");
        }
    }

    #[test]
    fn next_walks_the_full_lifecycle() {
        let mut state = ReturnState::NotStarted;
        let mut visited = vec![state];
        while let Some(following) = state.next() {
            state = following;
            visited.push(state);
        }
        assert_eq!(visited.len(), 6);
        assert_eq!(state, ReturnState::DepositSettled);
        assert!(state.is_terminal());
    }

    #[test]
    fn completing_the_current_step_advances_one_state() {
        let mut state = ReturnState::NotStarted;
        while let Some(step) = current_step(state) {
            assert_eq!(step.required_state(), state);
            state = step.completed_state();
        }
        assert_eq!(state, ReturnState::DepositSettled);
    }

    #[test]
    fn locked_only_from_closeout() {
        assert!(!ReturnState::IssuesReviewed.is_locked());
        assert!(ReturnState::ClosedOut.is_locked());
        assert!(ReturnState::DepositSettled.is_locked());
    }

    #[test]
    fn wire_form_round_trips() {
        for state in [
            ReturnState::NotStarted,
            ReturnState::IntakeDone,
            ReturnState::EvidenceDone,
            ReturnState::IssuesReviewed,
            ReturnState::ClosedOut,
            ReturnState::DepositSettled,
        ] {
            assert_eq!(ReturnState::parse(state.as_str()), Some(state));
            let json = serde_json::to_string(&state).unwrap();
            assert_eq!(json, format!("\"{}\"", state.as_str()));
        }
        assert_eq!(ReturnState::parse("totalled"), None);
    }

    #[test]
    fn step_wire_form_round_trips() {
        for step in ReturnStep::ALL {
            assert_eq!(ReturnStep::parse(step.as_str()), Some(step));
        }
        assert_eq!(ReturnStep::parse("valet"), None);
    }
}
