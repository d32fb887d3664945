// Consultation workflow tasks
pub mod discussion_round;
pub mod final_decision;
pub mod seed_opinions;

pub use discussion_round::DiscussionRoundTask;
pub use final_decision::FinalDecisionTask;
pub use seed_opinions::SeedOpinionsTask;

/// Keys of the values the tasks exchange through the workflow context.
pub mod session_keys {
    pub const SESSION_ID: &str = "session_id";
    pub const CASE: &str = "case";
    /// The [`DiscussionState`](crate::discussion::DiscussionState) of the session.
    pub const STATE: &str = "discussion_state";
    /// `true` while discussion rounds remain; drives the round/finalize branch.
    pub const ROUND_PENDING: &str = "round_pending";
    pub const FINAL_DECISION: &str = "final_decision";
}

/// Artifact keys, all derived from the case file name.
pub mod artifact_keys {
    pub fn seeds(case_name: &str) -> String {
        format!("seeds_{case_name}")
    }

    pub fn retrieval(case_name: &str) -> String {
        format!("retrieval_{case_name}")
    }

    pub fn result(case_name: &str) -> String {
        format!("result_{case_name}")
    }
}
