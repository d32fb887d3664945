use consult_flow::{ArtifactStore, Context, Graph, GraphBuilder, Result, Task};
use std::sync::Arc;
use uuid::Uuid;

use crate::discussion::DiscussionCoordinator;
use crate::models::Case;
use crate::specialist::SpecialistTeam;
use crate::tasks::*;

fn rounds_pending(context: &Context) -> bool {
    context
        .get_sync::<bool>(session_keys::ROUND_PENDING)
        .unwrap_or(false)
}

/// seed → round* → final. Both the seed and the round task branch on whether a
/// discussion round is still pending. The step budget grows with the configured
/// rounds, so long discussions never hit the engine's default limit.
pub fn build_consultation_graph(
    team: Arc<SpecialistTeam>,
    coordinator: Arc<DiscussionCoordinator>,
    store: Arc<dyn ArtifactStore>,
) -> Graph {
    let max_steps = coordinator.settings().rounds as usize + 2;
    let seed_task = Arc::new(SeedOpinionsTask::new(team, coordinator.clone(), store));
    let seed_id = seed_task.id().to_string();

    let round_task = Arc::new(DiscussionRoundTask::new(coordinator.clone()));
    let round_id = round_task.id().to_string();

    let final_task = Arc::new(FinalDecisionTask::new(coordinator));
    let final_id = final_task.id().to_string();

    GraphBuilder::new("consultation")
        .add_task(seed_task)
        .add_task(round_task)
        .add_task(final_task)
        .add_conditional_edge(&seed_id, rounds_pending, &round_id, &final_id)
        .add_conditional_edge(&round_id, rounds_pending, &round_id, &final_id)
        .max_steps(max_steps)
        .build()
}

/// Fresh context for one consultation session.
pub async fn create_consultation_context(case: &Case) -> Result<Context> {
    let context = Context::new();
    context
        .set(session_keys::SESSION_ID, Uuid::new_v4().to_string())
        .await?;
    context.set(session_keys::CASE, case).await?;
    Ok(context)
}
