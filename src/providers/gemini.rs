//! Google Gemini provider — `generateContent` REST API.
//!
//! Speaks the `v1beta` `models/{model}:generateContent` endpoint with the
//! API key passed as a query parameter. Error bodies are truncated before
//! they reach logs so oversized upstream responses stay readable.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::providers::{ModelError, ModelProvider};

/// Default public Gemini API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Longest upstream error body kept in an error message.
const MAX_ERROR_BODY_CHARS: usize = 256;

// ── Wire types ──────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}

// ── Provider ────────────────────────────────────────────────────

/// Gemini `generateContent` client.
pub struct GeminiProvider {
    base_url: String,
    model: String,
    api_key: String,
    client: reqwest::Client,
}

impl GeminiProvider {
    /// Create a provider against the public Gemini endpoint.
    pub fn new(model: &str, api_key: &str) -> Self {
        Self::with_base_url(DEFAULT_BASE_URL, model, api_key)
    }

    /// Create a provider against a custom endpoint (for testing).
    pub fn with_base_url(base_url: &str, model: &str, api_key: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            model: model.to_owned(),
            api_key: api_key.to_owned(),
            client: reqwest::Client::new(),
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.base_url, self.model
        )
    }
}

/// Map an HTTP status to the error taxonomy.
fn map_status(status: u16, body: &str) -> ModelError {
    let truncated: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
    match status {
        400 | 401 | 403 => ModelError::InvalidKey,
        429 => ModelError::RateLimit,
        _ => ModelError::Unknown(format!("HTTP {status}: {truncated}")),
    }
}

#[async_trait]
impl ModelProvider for GeminiProvider {
    async fn generate(&self, prompt: &str) -> Result<String, ModelError> {
        let body = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_owned(),
                }],
            }],
        };

        let response = self
            .client
            .post(self.endpoint())
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| ModelError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|e| format!("(body unreadable: {e})"));
            return Err(map_status(status.as_u16(), &text));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ModelError::Unknown(format!("response parse error: {e}")))?;

        let text: String = parsed
            .candidates
            .first()
            .map(|c| {
                c.content
                    .parts
                    .iter()
                    .map(|p| p.text.as_str())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.is_empty() {
            return Err(ModelError::Unknown(
                "provider returned no candidates".to_owned(),
            ));
        }
        Ok(text)
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_format() {
        let provider = GeminiProvider::with_base_url(
            "https://example.test/v1beta/",
            "gemini-2.0-flash",
            "key",
        );
        assert_eq!(
            provider.endpoint(),
            "https://example.test/v1beta/models/gemini-2.0-flash:generateContent"
        );
    }

    #[test]
    fn test_map_status_taxonomy() {
        assert!(matches!(map_status(401, ""), ModelError::InvalidKey));
        assert!(matches!(map_status(403, ""), ModelError::InvalidKey));
        assert!(matches!(map_status(429, ""), ModelError::RateLimit));
        assert!(matches!(map_status(500, "boom"), ModelError::Unknown(_)));
    }

    #[test]
    fn test_map_status_truncates_body() {
        let long = "x".repeat(5000);
        if let ModelError::Unknown(msg) = map_status(500, &long) {
            assert!(msg.len() < 300);
        } else {
            panic!("expected Unknown");
        }
    }

    #[test]
    fn test_response_parsing() {
        let raw = r#"{"candidates":[{"content":{"parts":[{"text":"hello "},{"text":"world"}]}}]}"#;
        let parsed: GenerateResponse = serde_json::from_str(raw).expect("valid");
        let joined: String = parsed.candidates[0]
            .content
            .parts
            .iter()
            .map(|p| p.text.as_str())
            .collect();
        assert_eq!(joined, "hello world");
    }

    #[test]
    fn test_empty_candidates_parse() {
        let parsed: GenerateResponse = serde_json::from_str("{}").expect("valid");
        assert!(parsed.candidates.is_empty());
    }
}
