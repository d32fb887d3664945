//! Runs one case end to end: cache check, workflow, result artifact, retries.

use anyhow::{Context as _, bail};
use consult_flow::{ArtifactStore, ExecutionStatus, RetryPolicy, save_json};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::case_loader::{case_name, load_case};
use crate::discussion::{DiscussionCoordinator, DiscussionSettings, DiscussionState};
use crate::error_log::ErrorLog;
use crate::models::{CaseResult, DiscussionRecord};
use crate::oracle::ReasoningOracle;
use crate::specialist::SpecialistTeam;
use crate::tasks::{artifact_keys, session_keys};
use crate::workflow::{build_consultation_graph, create_consultation_context};

#[derive(Debug, Clone, PartialEq)]
pub enum CaseOutcome {
    Completed(CaseResult),
    /// A result artifact already existed and was returned untouched.
    Cached(CaseResult),
    Failed {
        case: String,
        attempts: u32,
        error: String,
    },
}

impl CaseOutcome {
    pub fn result(&self) -> Option<&CaseResult> {
        match self {
            CaseOutcome::Completed(result) | CaseOutcome::Cached(result) => Some(result),
            CaseOutcome::Failed { .. } => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, CaseOutcome::Failed { .. })
    }
}

pub struct CaseRunner {
    team: Arc<SpecialistTeam>,
    oracle: Arc<dyn ReasoningOracle>,
    store: Arc<dyn ArtifactStore>,
    error_log: Arc<ErrorLog>,
    settings: DiscussionSettings,
    retry: RetryPolicy,
    seed: Option<u64>,
}

impl CaseRunner {
    pub fn new(
        team: Arc<SpecialistTeam>,
        oracle: Arc<dyn ReasoningOracle>,
        store: Arc<dyn ArtifactStore>,
        error_log: Arc<ErrorLog>,
    ) -> Self {
        Self {
            team,
            oracle,
            store,
            error_log,
            settings: DiscussionSettings::default(),
            retry: RetryPolicy::default(),
            seed: None,
        }
    }

    pub fn with_settings(mut self, settings: DiscussionSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Make the discussion randomness reproducible. Each case derives its own stream
    /// from this seed and its file name.
    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn error_log(&self) -> &ErrorLog {
        &self.error_log
    }

    /// Run a case with retries. Never returns an error: a case that keeps failing is
    /// written to the error log and reported as [`CaseOutcome::Failed`].
    pub async fn run(&self, path: &Path) -> CaseOutcome {
        let name = case_name(path);
        let label = name.as_str();

        match self
            .retry
            .run(label, |attempt| self.run_once(path, label, attempt))
            .await
        {
            Ok(outcome) => outcome,
            Err(exhausted) => {
                error!(
                    case = %name,
                    attempts = exhausted.attempts,
                    error = %format!("{:#}", exhausted.last_error),
                    "case failed permanently"
                );
                let detail = format!("{:?}", exhausted.last_error);
                if let Err(e) = self.error_log.record(&name, &detail).await {
                    warn!(case = %name, error = %e, "could not write error log entry");
                }
                CaseOutcome::Failed {
                    case: name.clone(),
                    attempts: exhausted.attempts,
                    error: format!("{:#}", exhausted.last_error),
                }
            }
        }
    }

    async fn run_once(&self, path: &Path, name: &str, attempt: u32) -> anyhow::Result<CaseOutcome> {
        let result_key = artifact_keys::result(name);
        if let Some(bytes) = self.store.load(&result_key).await? {
            let cached: CaseResult = serde_json::from_slice(&bytes)
                .with_context(|| format!("corrupt result artifact {result_key}"))?;
            info!(case = %name, "result already present, skipping");
            return Ok(CaseOutcome::Cached(cached));
        }

        let case = load_case(path).await?;
        let coordinator = Arc::new(DiscussionCoordinator::new(
            self.oracle.clone(),
            self.settings,
            self.rng_for(name),
        ));
        let graph = build_consultation_graph(self.team.clone(), coordinator, self.store.clone());
        let context = create_consultation_context(&case).await?;
        let session_id: String = context.require(session_keys::SESSION_ID).await?;
        info!(case = %name, session_id = %session_id, attempt, "consultation started");

        let execution = graph
            .execute(context.clone())
            .await
            .with_context(|| format!("consultation workflow failed for {name}"))?;
        if execution.status != ExecutionStatus::Completed {
            bail!(
                "consultation for {name} stopped early at {}",
                execution.last_task_id
            );
        }

        let state: DiscussionState = context.require(session_keys::STATE).await?;
        let final_decision = context
            .get::<Option<String>>(session_keys::FINAL_DECISION)
            .await
            .flatten();

        let result = CaseResult {
            timestamp: chrono::Utc::now().to_rfc3339(),
            case_info: case,
            discussion: DiscussionRecord {
                round_opinions: state.history,
                interaction_log: state.interactions,
            },
            final_decision,
        };
        save_json(self.store.as_ref(), &result_key, &result).await?;

        info!(
            case = %name,
            session_id = %session_id,
            steps = execution.steps,
            decided = result.final_decision.is_some(),
            "consultation completed"
        );
        Ok(CaseOutcome::Completed(result))
    }

    fn rng_for(&self, name: &str) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(case_seed(seed, name)),
            None => StdRng::from_os_rng(),
        }
    }
}

/// FNV-1a over the case name, keyed by the run seed.
fn case_seed(seed: u64, name: &str) -> u64 {
    name.bytes().fold(seed ^ 0xcbf2_9ce4_8422_2325, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(0x0000_0100_0000_01b3)
    })
}
