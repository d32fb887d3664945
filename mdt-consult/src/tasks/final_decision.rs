use async_trait::async_trait;
use consult_flow::{Context, NextAction, Result, Task, TaskResult};
use std::sync::Arc;
use tracing::info;

use super::session_keys;
use crate::discussion::{DiscussionCoordinator, DiscussionState};
use crate::models::Case;

/// Synthesizes the final decision. The completion is stored as-is.
pub struct FinalDecisionTask {
    coordinator: Arc<DiscussionCoordinator>,
}

impl FinalDecisionTask {
    pub fn new(coordinator: Arc<DiscussionCoordinator>) -> Self {
        Self { coordinator }
    }
}

#[async_trait]
impl Task for FinalDecisionTask {
    async fn run(&self, context: Context) -> Result<TaskResult> {
        let case: Case = context.require(session_keys::CASE).await?;
        let state: DiscussionState = context.require(session_keys::STATE).await?;

        info!(case = %case.id, task_id = %self.id(), "synthesizing final decision");
        let decision = self.coordinator.finalize(&case, &state).await?;
        context.set(session_keys::FINAL_DECISION, &decision).await?;

        Ok(TaskResult::new(decision, NextAction::End))
    }
}
