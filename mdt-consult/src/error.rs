use std::path::PathBuf;

use consult_flow::FlowError;
use thiserror::Error;

use crate::retriever::RetrievalError;

#[derive(Error, Debug)]
pub enum ConsultError {
    #[error("cannot read case file {path}: {source}")]
    CaseIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed case file {path}: {source}")]
    MalformedCase {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Flow(#[from] FlowError),
}

pub type Result<T> = std::result::Result<T, ConsultError>;

impl From<ConsultError> for FlowError {
    fn from(error: ConsultError) -> Self {
        match error {
            ConsultError::Flow(inner) => inner,
            other => FlowError::Other(other.into()),
        }
    }
}
