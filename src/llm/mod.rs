pub mod metadata;
pub mod openai;
pub mod request;

use async_trait::async_trait;
use thiserror::Error;

pub use metadata::{ListingMetadata, MetadataError, get_metadata};
pub use openai::{OpenAiClient, OpenAiConfig};
pub use request::{ChatMessage, OracleRequest, PromptVariant, build_request};

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("missing inference api key")]
    MissingApiKey,
    #[error("http error: {0}")]
    Http(String),
    #[error("inference request timed out")]
    Timeout,
    #[error("model refused: {0}")]
    Refused(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Vision model that turns a built prompt into raw response text.
#[async_trait]
pub trait MetadataOracle: Send + Sync {
    async fn complete(&self, request: &OracleRequest) -> Result<String, LlmError>;
}
