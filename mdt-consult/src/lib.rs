pub mod batch;
pub mod case_loader;
pub mod case_runner;
pub mod config;
pub mod discussion;
pub mod error;
pub mod error_log;
pub mod models;
pub mod oracle;
pub mod retriever;
pub mod specialist;
pub mod tasks;
pub mod workflow;

pub use batch::{BatchDriver, BatchSummary, discover_cases};
pub use case_runner::{CaseOutcome, CaseRunner};
pub use config::{ConsultConfig, RetrieverConfig};
pub use discussion::{DiscussionCoordinator, DiscussionSettings, DiscussionState, Participation};
pub use error::{ConsultError, Result};
pub use error_log::ErrorLog;
pub use models::*;
pub use oracle::{OracleError, ReasoningOracle, RigOracle};
pub use retriever::{HttpRetriever, KnowledgeRetriever, RetrievalError, Snippet};
pub use specialist::{SpecialistAgent, SpecialistProfile, SpecialistTeam};
pub use workflow::{build_consultation_graph, create_consultation_context};
