use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::{
    context::Context,
    error::{FlowError, Result},
    task::{NextAction, Task},
};

/// Type alias for edge condition functions
pub type EdgeCondition = Arc<dyn Fn(&Context) -> bool + Send + Sync>;

/// Upper bound on task executions per run, guarding against runaway loops.
pub const DEFAULT_MAX_STEPS: usize = 1_000;

/// Edge between tasks in the graph
#[derive(Clone)]
enum Edge {
    Direct {
        from: String,
        to: String,
    },
    Branch {
        from: String,
        condition: EdgeCondition,
        yes: String,
        no: String,
    },
}

impl Edge {
    fn from(&self) -> &str {
        match self {
            Edge::Direct { from, .. } | Edge::Branch { from, .. } => from,
        }
    }
}

/// A graph of tasks, executed to completion within a single call.
pub struct Graph {
    pub id: String,
    tasks: HashMap<String, Arc<dyn Task>>,
    edges: Vec<Edge>,
    start_task_id: Option<String>,
    max_steps: usize,
}

impl Graph {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tasks: HashMap::new(),
            edges: Vec::new(),
            start_task_id: None,
            max_steps: DEFAULT_MAX_STEPS,
        }
    }

    pub fn get_task(&self, task_id: &str) -> Option<Arc<dyn Task>> {
        self.tasks.get(task_id).cloned()
    }

    /// Resolve the successor of `current_task_id`. The first edge leaving the task wins.
    pub fn next_task(&self, current_task_id: &str, context: &Context) -> Option<String> {
        self.edges
            .iter()
            .find(|edge| edge.from() == current_task_id)
            .map(|edge| match edge {
                Edge::Direct { to, .. } => to.clone(),
                Edge::Branch {
                    condition, yes, no, ..
                } => {
                    if condition(context) {
                        yes.clone()
                    } else {
                        no.clone()
                    }
                }
            })
    }

    /// Run from the start task until a task ends the flow.
    pub async fn execute(&self, context: Context) -> Result<ExecutionResult> {
        let start = self
            .start_task_id
            .clone()
            .ok_or_else(|| FlowError::TaskNotFound(format!("graph `{}` has no tasks", self.id)))?;
        self.execute_from(&start, context).await
    }

    /// Run from `task_id` until a task ends the flow or no outgoing edge exists.
    pub async fn execute_from(&self, task_id: &str, context: Context) -> Result<ExecutionResult> {
        let mut current = task_id.to_string();
        let mut steps = 0;

        loop {
            if steps >= self.max_steps {
                return Err(FlowError::StepLimitExceeded(self.max_steps));
            }

            let task = self
                .get_task(&current)
                .ok_or_else(|| FlowError::TaskNotFound(current.clone()))?;

            debug!(graph = %self.id, task = %current, step = steps, "executing task");
            let result = task.run(context.clone()).await?;
            steps += 1;

            match result.next_action {
                NextAction::End => {
                    return Ok(ExecutionResult {
                        response: result.response,
                        status: ExecutionStatus::Completed,
                        last_task_id: current,
                        steps,
                    });
                }
                NextAction::Continue => match self.next_task(&current, &context) {
                    Some(next) => current = next,
                    None => {
                        return Ok(ExecutionResult {
                            response: result.response,
                            status: ExecutionStatus::Stalled,
                            last_task_id: current,
                            steps,
                        });
                    }
                },
            }
        }
    }
}

/// Builder for creating graphs
pub struct GraphBuilder {
    graph: Graph,
}

impl GraphBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            graph: Graph::new(id),
        }
    }

    /// Register a task. The first task added becomes the start task.
    pub fn add_task(mut self, task: Arc<dyn Task>) -> Self {
        let task_id = task.id().to_string();
        if self.graph.start_task_id.is_none() {
            self.graph.start_task_id = Some(task_id.clone());
        }
        self.graph.tasks.insert(task_id, task);
        self
    }

    pub fn add_edge(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.graph.edges.push(Edge::Direct {
            from: from.into(),
            to: to.into(),
        });
        self
    }

    /// Route to `yes` when `condition` holds for the context, otherwise to `no`.
    pub fn add_conditional_edge<F>(
        mut self,
        from: impl Into<String>,
        condition: F,
        yes: impl Into<String>,
        no: impl Into<String>,
    ) -> Self
    where
        F: Fn(&Context) -> bool + Send + Sync + 'static,
    {
        self.graph.edges.push(Edge::Branch {
            from: from.into(),
            condition: Arc::new(condition),
            yes: yes.into(),
            no: no.into(),
        });
        self
    }

    pub fn max_steps(mut self, max_steps: usize) -> Self {
        self.graph.max_steps = max_steps;
        self
    }

    pub fn build(self) -> Graph {
        self.graph
    }
}

/// Outcome of a graph execution
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub response: Option<String>,
    pub status: ExecutionStatus,
    pub last_task_id: String,
    pub steps: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionStatus {
    /// A task returned `NextAction::End`
    Completed,
    /// A task asked to continue but had no outgoing edge
    Stalled,
}
