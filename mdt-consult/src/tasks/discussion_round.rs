use async_trait::async_trait;
use consult_flow::{Context, NextAction, Result, Task, TaskResult};
use std::sync::Arc;
use tracing::info;

use super::session_keys;
use crate::discussion::{DiscussionCoordinator, DiscussionState};
use crate::models::Case;

/// Runs one discussion round: every turn, then the revision step.
pub struct DiscussionRoundTask {
    coordinator: Arc<DiscussionCoordinator>,
}

impl DiscussionRoundTask {
    pub fn new(coordinator: Arc<DiscussionCoordinator>) -> Self {
        Self { coordinator }
    }
}

#[async_trait]
impl Task for DiscussionRoundTask {
    async fn run(&self, context: Context) -> Result<TaskResult> {
        let case: Case = context.require(session_keys::CASE).await?;
        let mut state: DiscussionState = context.require(session_keys::STATE).await?;
        let round = state.current_round;

        info!(case = %case.id, round, rounds = state.rounds, "discussion round started");
        self.coordinator.run_round(&case, &mut state).await?;

        context
            .set(session_keys::ROUND_PENDING, state.has_pending_round())
            .await?;
        context.set(session_keys::STATE, &state).await?;

        Ok(TaskResult::new(
            Some(format!("round {round} complete")),
            NextAction::Continue,
        ))
    }
}
