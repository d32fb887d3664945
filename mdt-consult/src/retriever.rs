use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// One ranked passage returned by a knowledge retriever.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snippet {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub score: f32,
}

#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("retrieval request failed: {0}")]
    Transport(String),

    #[error("retriever returned an unexpected payload: {0}")]
    InvalidResponse(String),
}

/// Looks up reference passages for a query, most relevant first.
#[async_trait]
pub trait KnowledgeRetriever: Send + Sync {
    async fn query(&self, text: &str, k: usize) -> Result<Vec<Snippet>, RetrievalError>;
}

/// Numbered reference block embedded in specialist prompts.
pub fn format_references(snippets: &[Snippet]) -> String {
    snippets
        .iter()
        .enumerate()
        .map(|(idx, snippet)| {
            format!(
                "Document [{}] (Title: {}) {}",
                idx, snippet.title, snippet.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, Serialize)]
struct RetrieveRequest<'a> {
    query: &'a str,
    k: usize,
    retriever: &'a str,
    corpus: &'a str,
}

#[derive(Debug, Deserialize)]
struct RetrieveResponse {
    snippets: Vec<Snippet>,
}

/// Retriever served over HTTP: `POST {endpoint}/retrieve` with the query, the
/// requested count and the retriever/corpus pair to search.
#[derive(Debug, Clone)]
pub struct HttpRetriever {
    client: reqwest::Client,
    endpoint: String,
    retriever_name: String,
    corpus: String,
}

impl HttpRetriever {
    pub fn new(
        endpoint: impl Into<String>,
        retriever_name: impl Into<String>,
        corpus: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, RetrievalError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RetrievalError::Transport(format!("cannot build HTTP client: {e}")))?;

        let retriever = Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            retriever_name: retriever_name.into(),
            corpus: corpus.into(),
        };
        info!(
            endpoint = %retriever.endpoint,
            retriever = %retriever.retriever_name,
            corpus = %retriever.corpus,
            "HTTP retriever configured"
        );
        Ok(retriever)
    }
}

#[async_trait]
impl KnowledgeRetriever for HttpRetriever {
    async fn query(&self, text: &str, k: usize) -> Result<Vec<Snippet>, RetrievalError> {
        let url = format!("{}/retrieve", self.endpoint);
        let request = RetrieveRequest {
            query: text,
            k,
            retriever: &self.retriever_name,
            corpus: &self.corpus,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| RetrievalError::Transport(e.to_string()))?;

        let payload: RetrieveResponse = response
            .json()
            .await
            .map_err(|e| RetrievalError::InvalidResponse(e.to_string()))?;

        debug!(corpus = %self.corpus, hits = payload.snippets.len(), "retrieved snippets");
        Ok(payload.snippets.into_iter().take(k).collect())
    }
}
