pub mod context;
pub mod error;
pub mod graph;
pub mod retry;
pub mod storage;
pub mod task;

// Re-export commonly used types
pub use context::Context;
pub use error::{FlowError, Result};
pub use graph::{ExecutionResult, ExecutionStatus, Graph, GraphBuilder};
pub use retry::{RetryExhausted, RetryPolicy};
pub use storage::{ArtifactStore, FsArtifactStore, InMemoryArtifactStore, load_json, save_json};
pub use task::{NextAction, Task, TaskResult};

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct CountdownTask;

    #[async_trait]
    impl Task for CountdownTask {
        async fn run(&self, context: Context) -> Result<TaskResult> {
            let remaining: u32 = context.require("remaining").await?;
            context.set("remaining", remaining.saturating_sub(1)).await?;
            Ok(TaskResult::proceed())
        }
    }

    struct DoneTask;

    #[async_trait]
    impl Task for DoneTask {
        async fn run(&self, context: Context) -> Result<TaskResult> {
            let remaining: u32 = context.require("remaining").await?;
            Ok(TaskResult::new(
                Some(format!("done at {remaining}")),
                NextAction::End,
            ))
        }
    }

    fn countdown_graph() -> Graph {
        let countdown: Arc<dyn Task> = Arc::new(CountdownTask);
        let done: Arc<dyn Task> = Arc::new(DoneTask);
        let countdown_id = countdown.id().to_string();
        let done_id = done.id().to_string();

        GraphBuilder::new("countdown")
            .add_task(countdown)
            .add_task(done)
            .add_conditional_edge(
                countdown_id.clone(),
                |ctx| ctx.get_sync::<u32>("remaining").unwrap_or(0) > 0,
                countdown_id,
                done_id,
            )
            .build()
    }

    #[tokio::test]
    async fn conditional_edge_loops_until_condition_fails() {
        let graph = countdown_graph();
        let context = Context::new();
        context.set("remaining", 3u32).await.unwrap();

        let result = graph.execute(context).await.unwrap();

        assert_eq!(result.status, ExecutionStatus::Completed);
        assert_eq!(result.response.as_deref(), Some("done at 0"));
        // three countdown steps plus the final task
        assert_eq!(result.steps, 4);
    }

    #[tokio::test]
    async fn step_limit_stops_runaway_loops() {
        let looping: Arc<dyn Task> = Arc::new(CountdownTask);
        let id = looping.id().to_string();
        let graph = GraphBuilder::new("runaway")
            .add_task(looping)
            .add_edge(id.clone(), id)
            .max_steps(5)
            .build();
        let context = Context::new();
        context.set("remaining", 100u32).await.unwrap();

        let err = graph.execute(context).await.unwrap_err();
        assert!(matches!(err, FlowError::StepLimitExceeded(5)));
    }

    #[tokio::test]
    async fn missing_context_value_is_a_context_error() {
        let graph = countdown_graph();
        let err = graph.execute(Context::new()).await.unwrap_err();
        assert!(matches!(err, FlowError::ContextError(_)));
    }

    #[tokio::test]
    async fn continue_without_edge_stalls() {
        let graph = GraphBuilder::new("single")
            .add_task(Arc::new(CountdownTask))
            .build();
        let context = Context::new();
        context.set("remaining", 1u32).await.unwrap();

        let result = graph.execute(context).await.unwrap();
        assert_eq!(result.status, ExecutionStatus::Stalled);
    }

    #[tokio::test]
    async fn fs_store_round_trips_json_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path().join("nested"));

        assert!(!store.exists("a.json").await.unwrap());
        assert!(load_json::<Vec<u32>>(&store, "a.json").await.unwrap().is_none());

        let written = save_json(&store, "a.json", &vec![1u32, 2, 3]).await.unwrap();
        assert!(store.exists("a.json").await.unwrap());

        let on_disk = std::fs::read(store.path_for("a.json")).unwrap();
        assert_eq!(on_disk, written);
        let loaded: Vec<u32> = load_json(&store, "a.json").await.unwrap().unwrap();
        assert_eq!(loaded, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn in_memory_store_overwrites_by_key() {
        let store = InMemoryArtifactStore::new();
        store.save("k", b"one".to_vec()).await.unwrap();
        store.save("k", b"two".to_vec()).await.unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.load("k").await.unwrap().unwrap(), b"two".to_vec());
    }

    #[test]
    fn backoff_doubles_per_failure() {
        let policy = RetryPolicy::exponential(3, Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for(40), policy.max_delay);
    }

    #[tokio::test]
    async fn retry_succeeds_on_a_later_attempt() {
        let policy = RetryPolicy::exponential(3, Duration::ZERO);
        let calls = AtomicU32::new(0);

        let value = policy
            .run("flaky", |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err(format!("attempt {attempt} failed"))
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_reports_the_last_error_when_exhausted() {
        let policy = RetryPolicy::exponential(2, Duration::ZERO);

        let exhausted = policy
            .run("broken", |attempt| async move {
                Err::<(), _>(format!("failure {attempt}"))
            })
            .await
            .unwrap_err();

        assert_eq!(exhausted.attempts, 2);
        assert_eq!(exhausted.last_error, "failure 2");
    }
}
