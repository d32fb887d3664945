use async_trait::async_trait;
use consult_flow::{ArtifactStore, Context, NextAction, Result, Task, TaskResult, load_json, save_json};
use std::sync::Arc;
use tracing::info;

use super::{artifact_keys, session_keys};
use crate::discussion::DiscussionCoordinator;
use crate::error::ConsultError;
use crate::models::{Case, RoundOpinions};
use crate::specialist::SpecialistTeam;

/// Collects round 1 and opens the discussion session.
///
/// Seeded opinions are checkpointed: when a seeds artifact exists for the case it is
/// reused and no retrieval or completion happens.
pub struct SeedOpinionsTask {
    team: Arc<SpecialistTeam>,
    coordinator: Arc<DiscussionCoordinator>,
    store: Arc<dyn ArtifactStore>,
}

impl SeedOpinionsTask {
    pub fn new(
        team: Arc<SpecialistTeam>,
        coordinator: Arc<DiscussionCoordinator>,
        store: Arc<dyn ArtifactStore>,
    ) -> Self {
        Self {
            team,
            coordinator,
            store,
        }
    }

    async fn seeds(&self, case: &Case) -> Result<RoundOpinions> {
        let seeds_key = artifact_keys::seeds(&case.id);
        if let Some(opinions) = load_json::<RoundOpinions>(self.store.as_ref(), &seeds_key).await? {
            info!(case = %case.id, specialists = opinions.len(), "reusing seeded opinions");
            return Ok(opinions);
        }

        let outcome = self
            .team
            .seed_all(case)
            .await
            .map_err(ConsultError::from)?;

        save_json(self.store.as_ref(), &seeds_key, &outcome.opinions).await?;
        save_json(
            self.store.as_ref(),
            &artifact_keys::retrieval(&case.id),
            &outcome.references,
        )
        .await?;

        Ok(outcome.opinions)
    }
}

#[async_trait]
impl Task for SeedOpinionsTask {
    async fn run(&self, context: Context) -> Result<TaskResult> {
        let case: Case = context.require(session_keys::CASE).await?;
        info!(case = %case.id, task_id = %self.id(), "seeding specialist opinions");

        let seeds = self.seeds(&case).await?;
        let seeded = seeds.values().filter(|opinion| opinion.is_some()).count();
        let state = self.coordinator.open_session(seeds);

        context
            .set(session_keys::ROUND_PENDING, state.has_pending_round())
            .await?;
        context.set(session_keys::STATE, &state).await?;

        Ok(TaskResult::new(
            Some(format!("{seeded} specialist(s) seeded")),
            NextAction::Continue,
        ))
    }
}
