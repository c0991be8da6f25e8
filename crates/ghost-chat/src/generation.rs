//! Reply generation through a local Ollama server.
//!
//! The anchor memory is rewritten so it reads as a reply to the new message,
//! keeping the original voice. Every failure (transport, timeout, status,
//! malformed body) surfaces as `GhostError::Generation`; the caller decides
//! how to present it.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use ghost_core::config::GenerationConfig;
use ghost_core::error::GhostError;

/// Produces a reply from an anchor memory and the user's message.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, anchor: &str, query: &str) -> Result<String, GhostError>;
}

/// Prompt asking the model to paraphrase `anchor` as a reply to `query`.
pub fn build_reply_prompt(anchor: &str, query: &str) -> String {
    format!(
        r#"Below is a real message previously sent by the same person.

Original message:
"{anchor}"

The user now said:
"{query}"

Rewrite the original message so it works as a reply.
Keep the same structure, bluntness, and length.
Change as little as possible.
Do not add new ideas.
Do not explain.
This is a casual WhatsApp-style reply.
"#
    )
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Ollama `/api/generate` client with a bounded request timeout.
#[derive(Debug, Clone)]
pub struct OllamaGenerator {
    http: reqwest::Client,
    config: GenerationConfig,
}

impl OllamaGenerator {
    pub fn new(config: GenerationConfig) -> Result<Self, GhostError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GhostError::Config(format!("HTTP client: {}", e)))?;
        Ok(Self { http, config })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    async fn generate(&self, anchor: &str, query: &str) -> Result<String, GhostError> {
        let request = GenerateRequest {
            model: &self.config.model,
            prompt: build_reply_prompt(anchor, query),
            stream: false,
            options: GenerateOptions {
                temperature: self.config.temperature,
                num_predict: self.config.num_predict,
            },
        };

        let response = self
            .http
            .post(self.endpoint())
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GhostError::Generation(format!(
                        "timed out after {}s",
                        self.config.timeout_secs
                    ))
                } else {
                    GhostError::Generation(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GhostError::Generation(format!(
                "Ollama returned {}: {}",
                status, body
            )));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| GhostError::Generation(format!("malformed response: {}", e)))?;

        let reply = body.response.trim();
        if reply.is_empty() {
            return Err(GhostError::Generation("empty response".to_string()));
        }

        debug!(model = %self.config.model, chars = reply.len(), "Reply generated");
        Ok(reply.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> GenerationConfig {
        GenerationConfig {
            base_url: server.uri(),
            timeout_secs: 5,
            ..GenerationConfig::default()
        }
    }

    #[test]
    fn test_prompt_contains_anchor_and_query() {
        let prompt = build_reply_prompt("I'm leaving now", "where are you?");
        assert!(prompt.contains("\"I'm leaving now\""));
        assert!(prompt.contains("\"where are you?\""));
        assert!(prompt.contains("Do not explain."));
    }

    #[tokio::test]
    async fn test_generate_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(serde_json::json!({
                "model": "phi3:mini",
                "stream": false,
                "options": {"num_predict": 40}
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"response": "  leaving now, bye \n"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let generator = OllamaGenerator::new(config_for(&server)).unwrap();
        let reply = generator.generate("I'm leaving now", "you around?").await.unwrap();
        assert_eq!(reply, "leaving now, bye");
    }

    #[tokio::test]
    async fn test_generate_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(500).set_body_string("model not loaded"))
            .mount(&server)
            .await;

        let generator = OllamaGenerator::new(config_for(&server)).unwrap();
        let err = generator.generate("a", "b").await.unwrap_err();
        assert!(matches!(err, GhostError::Generation(_)));
        assert!(err.to_string().contains("model not loaded"));
    }

    #[tokio::test]
    async fn test_generate_malformed_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"text": "x"})))
            .mount(&server)
            .await;

        let generator = OllamaGenerator::new(config_for(&server)).unwrap();
        let err = generator.generate("a", "b").await.unwrap_err();
        assert!(err.to_string().contains("malformed response"));
    }

    #[tokio::test]
    async fn test_generate_empty_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"response": "   "})))
            .mount(&server)
            .await;

        let generator = OllamaGenerator::new(config_for(&server)).unwrap();
        assert!(generator.generate("a", "b").await.is_err());
    }

    #[tokio::test]
    async fn test_generate_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"response": "late"}))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let config = GenerationConfig {
            timeout_secs: 1,
            ..config_for(&server)
        };
        let generator = OllamaGenerator::new(config).unwrap();
        let err = generator.generate("a", "b").await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_generate_unreachable() {
        let config = GenerationConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            timeout_secs: 2,
            ..GenerationConfig::default()
        };
        let generator = OllamaGenerator::new(config).unwrap();
        assert!(matches!(
            generator.generate("a", "b").await,
            Err(GhostError::Generation(_))
        ));
    }
}
