use crate::http::build_client;
use crate::llm::metadata::LISTING_SCHEMA;
use crate::llm::{ChatMessage, LlmError, MetadataOracle, OracleRequest};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub timeout: Duration,
}

impl OpenAiConfig {
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".into()),
            api_key: std::env::var("OPENAI_API_KEY")
                .ok()
                .filter(|key| !key.trim().is_empty()),
            model: std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into()),
            temperature: 0.0,
            timeout: Duration::from_secs(
                std::env::var("OPENAI_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse::<u64>().ok())
                    .filter(|v| *v > 0)
                    .unwrap_or(60),
            ),
        }
    }
}

/// Chat Completions transport for the metadata oracle.
pub struct OpenAiClient {
    http: Client,
    config: OpenAiConfig,
}

impl OpenAiClient {
    pub fn new(config: OpenAiConfig) -> Self {
        Self {
            http: build_client(config.timeout),
            config,
        }
    }

    fn completion_body<'a>(&'a self, request: &'a OracleRequest) -> CompletionRequest<'a> {
        CompletionRequest {
            model: &self.config.model,
            messages: &request.messages,
            temperature: self.config.temperature,
            response_format: ResponseFormat {
                format_type: "json_schema",
                json_schema: JsonSchemaFormat {
                    name: "listing_metadata",
                    strict: true,
                    schema: &LISTING_SCHEMA,
                },
            },
        }
    }
}

#[async_trait]
impl MetadataOracle for OpenAiClient {
    async fn complete(&self, request: &OracleRequest) -> Result<String, LlmError> {
        let Some(api_key) = self.config.api_key.as_deref() else {
            return Err(LlmError::MissingApiKey);
        };
        let base = self.config.base_url.trim().trim_end_matches('/');
        let body = self.completion_body(request);

        debug!(
            target = "snaplist.llm",
            model = %self.config.model,
            images = request.image_urls().len(),
            "oracle_request_sent"
        );

        let response = self
            .http
            .post(format!("{base}/chat/completions"))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    LlmError::Timeout
                } else {
                    LlmError::Http(err.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(LlmError::Http(format!("HTTP {}", response.status())));
        }

        let payload: CompletionResponse = response
            .json()
            .await
            .map_err(|err| LlmError::InvalidResponse(err.to_string()))?;
        extract_content(payload)
    }
}

fn extract_content(payload: CompletionResponse) -> Result<String, LlmError> {
    let message = payload
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message)
        .ok_or_else(|| LlmError::InvalidResponse("no choices".into()))?;

    if let Some(refusal) = message.refusal.filter(|r| !r.trim().is_empty()) {
        return Err(LlmError::Refused(refusal));
    }

    message
        .content
        .filter(|content| !content.trim().is_empty())
        .ok_or_else(|| LlmError::InvalidResponse("missing content".into()))
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    response_format: ResponseFormat<'a>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat<'a> {
    #[serde(rename = "type")]
    format_type: &'static str,
    json_schema: JsonSchemaFormat<'a>,
}

#[derive(Debug, Serialize)]
struct JsonSchemaFormat<'a> {
    name: &'static str,
    strict: bool,
    schema: &'a Value,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{PromptVariant, build_request};
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn config(api_key: Option<&str>) -> OpenAiConfig {
        OpenAiConfig {
            base_url: "http://127.0.0.1:9".into(),
            api_key: api_key.map(str::to_string),
            model: "gpt-4o-mini".into(),
            temperature: 0.0,
            timeout: Duration::from_secs(1),
        }
    }

    #[test]
    fn body_carries_schema_and_zero_temperature() {
        let client = OpenAiClient::new(config(Some("sk-test")));
        let request = build_request(&["QUJD".to_string()], PromptVariant::Valuation);
        let body = serde_json::to_value(client.completion_body(&request)).expect("serialize");
        assert_eq!(body["model"], json!("gpt-4o-mini"));
        assert_eq!(body["temperature"], json!(0.0));
        assert_eq!(body["response_format"]["type"], json!("json_schema"));
        assert_eq!(body["response_format"]["json_schema"]["strict"], json!(true));
        assert_eq!(
            body["response_format"]["json_schema"]["schema"]["required"],
            json!(["title", "description", "category", "tags", "estimated_price"])
        );
        assert_eq!(body["messages"][0]["role"], json!("system"));
        assert_eq!(
            body["messages"][1]["content"][1]["image_url"]["url"],
            json!("data:image/jpeg;base64,QUJD")
        );
    }

    #[tokio::test]
    async fn missing_key_fails_before_network() {
        let client = OpenAiClient::new(config(None));
        let request = build_request(&["QUJD".to_string()], PromptVariant::Valuation);
        let err = client.complete(&request).await.expect_err("should fail");
        assert!(matches!(err, LlmError::MissingApiKey));
    }

    #[tokio::test]
    async fn posts_to_chat_completions_with_bearer_key() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .match_body(Matcher::PartialJson(json!({
                "model": "gpt-4o-mini",
                "response_format": {"type": "json_schema"},
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "choices": [{"message": {"role": "assistant", "content": "{\"title\":\"Desk Lamp\"}"}}]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = OpenAiClient::new(OpenAiConfig {
            base_url: format!("{}/", server.url()),
            ..config(Some("sk-test"))
        });
        let request = build_request(&["QUJD".to_string()], PromptVariant::Valuation);
        let content = client.complete(&request).await.expect("content");
        mock.assert_async().await;
        assert_eq!(content, r#"{"title":"Desk Lamp"}"#);
    }

    #[tokio::test]
    async fn upstream_error_status_is_http_error() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(503)
            .with_body("overloaded")
            .create_async()
            .await;

        let client = OpenAiClient::new(OpenAiConfig {
            base_url: server.url(),
            ..config(Some("sk-test"))
        });
        let request = build_request(&["QUJD".to_string()], PromptVariant::Valuation);
        match client.complete(&request).await {
            Err(LlmError::Http(detail)) => assert!(detail.contains("503"), "{detail}"),
            other => panic!("expected http error, got {other:?}"),
        }
    }

    #[test]
    fn content_is_extracted_from_first_choice() {
        let payload: CompletionResponse = serde_json::from_value(json!({
            "choices": [{"message": {"role": "assistant", "content": "{\"title\":\"x\"}"}}]
        }))
        .expect("payload");
        assert_eq!(extract_content(payload).expect("content"), "{\"title\":\"x\"}");
    }

    #[test]
    fn refusal_is_an_error() {
        let payload: CompletionResponse = serde_json::from_value(json!({
            "choices": [{"message": {"content": null, "refusal": "cannot help"}}]
        }))
        .expect("payload");
        assert!(matches!(extract_content(payload), Err(LlmError::Refused(_))));
    }

    #[test]
    fn empty_choices_are_invalid() {
        let payload: CompletionResponse =
            serde_json::from_value(json!({"choices": []})).expect("payload");
        assert!(matches!(
            extract_content(payload),
            Err(LlmError::InvalidResponse(_))
        ));
    }
}
