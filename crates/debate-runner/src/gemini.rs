//! Gemini REST client implementing the engine's `TextGenerator` boundary.
//!
//! Maps HTTP outcomes onto the gateway's error taxonomy: 429 is quota
//! exhaustion, 5xx and transport errors are transient, everything else
//! that isn't success is fatal. Retry and cooldown policy live in the
//! gateway, not here.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use orchestration::{GenerateError, TextGenerator};

use crate::config::ApiEndpoint;

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f64,
}

/// Client for the `generateContent` endpoint.
pub struct GeminiClient {
    http: reqwest::Client,
    endpoint: ApiEndpoint,
}

impl GeminiClient {
    pub fn new(endpoint: ApiEndpoint) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint,
        }
    }

    fn url(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.endpoint.base_url.trim_end_matches('/'),
            self.endpoint.model
        )
    }
}

/// Classify an HTTP status into the generation error taxonomy.
fn classify_status(status: StatusCode, body: &str) -> GenerateError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        GenerateError::QuotaExceeded(format!("HTTP 429: {body}"))
    } else if status.is_server_error() {
        GenerateError::Transient(format!("HTTP {status}: {body}"))
    } else {
        GenerateError::Fatal(format!("HTTP {status}: {body}"))
    }
}

/// Pull the first candidate's text out of a response body.
fn extract_text(body: &Value) -> Option<String> {
    let text = body
        .get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .get(0)?
        .get("text")?
        .as_str()?;
    Some(text.to_string())
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, prompt: &str, temperature: f64) -> Result<String, GenerateError> {
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
            generation_config: GenerationConfig { temperature },
        };

        let response = self
            .http
            .post(self.url())
            .query(&[("key", self.endpoint.api_key.as_str())])
            .json(&request)
            .send()
            .await
            .map_err(|e| GenerateError::Transient(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| GenerateError::Transient(format!("body read failed: {e}")))?;
        debug!(model = %self.endpoint.model, "generation response received");

        extract_text(&body)
            .ok_or_else(|| GenerateError::Fatal("response contained no candidate text".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_status() {
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, "quota"),
            GenerateError::QuotaExceeded(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::SERVICE_UNAVAILABLE, "overloaded"),
            GenerateError::Transient(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_REQUEST, "bad field"),
            GenerateError::Fatal(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::FORBIDDEN, "key"),
            GenerateError::Fatal(_)
        ));
    }

    #[test]
    fn test_extract_text() {
        let body: Value = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"ANSWER: 4"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(extract_text(&body).as_deref(), Some("ANSWER: 4"));

        let empty: Value = serde_json::from_str(r#"{"candidates":[]}"#).unwrap();
        assert!(extract_text(&empty).is_none());
    }

    #[test]
    fn test_url_shape() {
        let client = GeminiClient::new(ApiEndpoint {
            base_url: "https://example.test/v1beta/".to_string(),
            api_key: "k".to_string(),
            model: "gemini-2.0-flash-exp".to_string(),
        });
        assert_eq!(
            client.url(),
            "https://example.test/v1beta/models/gemini-2.0-flash-exp:generateContent"
        );
    }
}
