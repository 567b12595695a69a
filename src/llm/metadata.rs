use crate::llm::{LlmError, MetadataOracle, OracleRequest};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, warn};

/// Canonical listing produced by the oracle. Every field is required and the price is a
/// non-negative whole number; anything else is a schema violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingMetadata {
    pub title: String,
    pub description: String,
    pub category: String,
    pub tags: Vec<String>,
    pub estimated_price: u64,
}

/// JSON schema handed to the oracle as a strict structured-output format.
pub static LISTING_SCHEMA: Lazy<Value> = Lazy::new(|| {
    json!({
        "type": "object",
        "properties": {
            "title": {"type": "string"},
            "description": {"type": "string"},
            "category": {"type": "string"},
            "tags": {"type": "array", "items": {"type": "string"}},
            "estimated_price": {"type": "integer", "minimum": 0},
        },
        "required": ["title", "description", "category", "tags", "estimated_price"],
        "additionalProperties": false,
    })
});

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("oracle request failed: {0}")]
    Oracle(#[from] LlmError),
    #[error("oracle response does not match listing schema: {0}")]
    Schema(String),
}

/// One round trip to the oracle, then strict validation. No retries.
pub async fn get_metadata(
    oracle: &dyn MetadataOracle,
    request: &OracleRequest,
) -> Result<ListingMetadata, MetadataError> {
    let raw = oracle.complete(request).await?;
    debug!(target = "snaplist.llm", bytes = raw.len(), "oracle_response_received");
    parse_metadata(&raw).inspect_err(|err| {
        warn!(target = "snaplist.llm", error = %err, "oracle_schema_violation");
    })
}

pub fn parse_metadata(raw: &str) -> Result<ListingMetadata, MetadataError> {
    let cleaned = strip_markdown_fence(raw);
    let value: Value = serde_json::from_str(&cleaned)
        .map_err(|err| MetadataError::Schema(format!("not json: {err}")))?;
    if !value.is_object() {
        return Err(MetadataError::Schema("expected a json object".into()));
    }
    serde_json::from_value::<ListingMetadata>(value)
        .map_err(|err| MetadataError::Schema(err.to_string()))
}

fn strip_markdown_fence(input: &str) -> String {
    let trimmed = input.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }
    let mut body = Vec::new();
    for line in trimmed.lines().skip(1) {
        if line.trim_start().starts_with("```") {
            break;
        }
        body.push(line);
    }
    body.join("\n")
}
