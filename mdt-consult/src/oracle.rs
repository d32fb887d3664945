use async_trait::async_trait;
use rig::client::CompletionClient;
use rig::completion::Prompt;
use rig::providers::openrouter;
use thiserror::Error;

/// User turn sent after the instruction prompt.
pub const ANSWER_INSTRUCTION: &str = "Please carefully consider and answer the above questions.";

#[derive(Error, Debug)]
pub enum OracleError {
    #[error("completion request failed: {0}")]
    Transport(String),

    #[error("completion was empty")]
    Empty,

    #[error("oracle is not configured: {0}")]
    Configuration(String),
}

/// Text-completion service used for every reasoning step of a consultation.
#[async_trait]
pub trait ReasoningOracle: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, OracleError>;
}

/// Oracle backed by an OpenRouter-hosted model through rig.
///
/// Each prompt becomes the agent preamble and the model is asked to answer it, so
/// every call is independent of the previous ones.
pub struct RigOracle {
    client: openrouter::Client,
    model: String,
}

impl RigOracle {
    pub fn new(api_key: &str, model: impl Into<String>) -> Self {
        Self {
            client: openrouter::Client::new(api_key),
            model: model.into(),
        }
    }

    pub fn from_env(model: impl Into<String>) -> Result<Self, OracleError> {
        let api_key = std::env::var("OPENROUTER_API_KEY")
            .map_err(|_| OracleError::Configuration("OPENROUTER_API_KEY not set".to_string()))?;
        Ok(Self::new(&api_key, model))
    }
}

#[async_trait]
impl ReasoningOracle for RigOracle {
    async fn complete(&self, prompt: &str) -> Result<String, OracleError> {
        let agent = self.client.agent(&self.model).preamble(prompt).build();
        let response = agent
            .prompt(ANSWER_INSTRUCTION)
            .await
            .map_err(|e| OracleError::Transport(e.to_string()))?;

        if response.trim().is_empty() {
            return Err(OracleError::Empty);
        }
        Ok(response)
    }
}
