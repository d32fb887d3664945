use anyhow::Context as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::case_runner::{CaseOutcome, CaseRunner};

/// `*.json` files directly inside `dir`, sorted by name.
pub async fn discover_cases(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("cannot list case directory {}", dir.display()))?;

    let mut cases = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json && entry.file_type().await?.is_file() {
            cases.push(path);
        }
    }
    cases.sort();
    Ok(cases)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub completed: usize,
    pub cached: usize,
    pub failed: usize,
}

impl BatchSummary {
    pub fn total(&self) -> usize {
        self.completed + self.cached + self.failed
    }

    fn add(&mut self, outcome: &CaseOutcome) {
        match outcome {
            CaseOutcome::Completed(_) => self.completed += 1,
            CaseOutcome::Cached(_) => self.cached += 1,
            CaseOutcome::Failed { .. } => self.failed += 1,
        }
    }
}

/// Runs cases on a bounded number of workers. A worker takes one case at a time
/// and runs it to the end.
pub struct BatchDriver {
    runner: Arc<CaseRunner>,
    workers: usize,
}

impl BatchDriver {
    pub fn new(runner: Arc<CaseRunner>, workers: usize) -> Self {
        Self {
            runner,
            workers: workers.max(1),
        }
    }

    /// Reset the error log, then consult every case found in `dir`.
    pub async fn run_dir(&self, dir: &Path) -> anyhow::Result<BatchSummary> {
        self.runner.error_log().reset().await?;
        let cases = discover_cases(dir).await?;
        info!(dir = %dir.display(), cases = cases.len(), workers = self.workers, "batch started");
        Ok(self.run(cases).await)
    }

    pub async fn run(&self, cases: Vec<PathBuf>) -> BatchSummary {
        let total = cases.len();
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut set = JoinSet::new();

        for path in cases {
            let runner = self.runner.clone();
            let semaphore = semaphore.clone();
            set.spawn(async move {
                // the semaphore is never closed
                let _permit = semaphore.acquire_owned().await.ok();
                runner.run(&path).await
            });
        }

        let mut summary = BatchSummary::default();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(outcome) => {
                    summary.add(&outcome);
                    info!(
                        done = summary.total(),
                        total,
                        failed = summary.failed,
                        "Completed {}/{}",
                        summary.total(),
                        total
                    );
                }
                Err(e) => {
                    error!(error = %e, "case worker panicked");
                    summary.failed += 1;
                }
            }
        }

        info!(
            completed = summary.completed,
            cached = summary.cached,
            failed = summary.failed,
            "batch finished"
        );
        summary
    }
}
