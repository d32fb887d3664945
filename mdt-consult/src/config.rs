use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use consult_flow::RetryPolicy;

use crate::discussion::DiscussionSettings;
use crate::error::{ConsultError, Result};

/// Knowledge retrieval service settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrieverConfig {
    pub endpoint: String,
    /// Retriever model served by the endpoint.
    pub name: String,
    pub timeout_secs: u64,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8000".to_string(),
            name: "MedCPT".to_string(),
            timeout_secs: 60,
        }
    }
}

impl RetrieverConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Batch consultation settings. Every field has a default, so a YAML file only
/// needs the values it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsultConfig {
    pub model: String,
    pub rounds: u32,
    pub turns: u32,
    pub top_k: usize,
    pub target_probability: f64,
    pub workers: usize,
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub result_dir: PathBuf,
    pub error_log: PathBuf,
    pub seed: Option<u64>,
    pub retriever: RetrieverConfig,
}

impl Default for ConsultConfig {
    fn default() -> Self {
        Self {
            model: "deepseek/deepseek-chat".to_string(),
            rounds: 1,
            turns: 1,
            top_k: 3,
            target_probability: 0.7,
            workers: 2,
            max_attempts: 3,
            backoff_base_ms: 1000,
            result_dir: PathBuf::from("result"),
            error_log: PathBuf::from("error_log.txt"),
            seed: None,
            retriever: RetrieverConfig::default(),
        }
    }
}

impl ConsultConfig {
    pub async fn from_yaml_file(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ConsultError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_yaml_str(&raw)
            .map_err(|e| ConsultError::Config(format!("{}: {e}", path.display())))
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        serde_yaml::from_str(raw).map_err(|e| ConsultError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(ConsultError::Config("workers must be at least 1".into()));
        }
        if self.max_attempts == 0 {
            return Err(ConsultError::Config("max_attempts must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.target_probability) {
            return Err(ConsultError::Config(format!(
                "target_probability must be within [0, 1], got {}",
                self.target_probability
            )));
        }
        if self.top_k == 0 {
            return Err(ConsultError::Config("top_k must be at least 1".into()));
        }
        Ok(())
    }

    pub fn discussion_settings(&self) -> DiscussionSettings {
        DiscussionSettings {
            rounds: self.rounds,
            turns: self.turns,
            target_probability: self.target_probability,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::exponential(self.max_attempts, Duration::from_millis(self.backoff_base_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config = ConsultConfig::from_yaml_str(
            "rounds: 2\nworkers: 4\nretriever:\n  endpoint: http://rag:9000\n",
        )
        .unwrap();

        assert_eq!(config.rounds, 2);
        assert_eq!(config.workers, 4);
        assert_eq!(config.turns, 1);
        assert_eq!(config.model, "deepseek/deepseek-chat");
        assert_eq!(config.retriever.endpoint, "http://rag:9000");
        assert_eq!(config.retriever.name, "MedCPT");
        assert_eq!(config.seed, None);
        config.validate().unwrap();
    }

    #[test]
    fn rejects_out_of_range_values() {
        let zero_workers = ConsultConfig {
            workers: 0,
            ..ConsultConfig::default()
        };
        let bad_probability = ConsultConfig {
            target_probability: 1.5,
            ..ConsultConfig::default()
        };
        let zero_attempts = ConsultConfig {
            max_attempts: 0,
            ..ConsultConfig::default()
        };

        assert!(matches!(zero_workers.validate(), Err(ConsultError::Config(_))));
        assert!(matches!(bad_probability.validate(), Err(ConsultError::Config(_))));
        assert!(matches!(zero_attempts.validate(), Err(ConsultError::Config(_))));
    }

    #[test]
    fn retry_policy_follows_the_backoff_base() {
        let config = ConsultConfig {
            backoff_base_ms: 250,
            ..ConsultConfig::default()
        };
        let policy = config.retry_policy();

        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_millis(1000));
    }

    #[test]
    fn unknown_yaml_is_a_config_error() {
        assert!(matches!(
            ConsultConfig::from_yaml_str("rounds: [1, 2]"),
            Err(ConsultError::Config(_))
        ));
    }
}
