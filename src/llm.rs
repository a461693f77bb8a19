//! Ollama generation client.
//!
//! One non-streaming `POST {base_url}/api/generate` per answer, bounded by
//! the configured timeout. No retries; the caller decides.

use serde::Deserialize;
use std::time::Duration;

use crate::config::LlmConfig;
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
    #[serde(default)]
    error: Option<String>,
}

impl OllamaClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Llm(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            model: config.model.clone(),
        })
    }

    pub fn endpoint(&self) -> String {
        format!("{}/api/generate", self.base_url.trim_end_matches('/'))
    }

    /// Sends `prompt` and returns the trimmed completion.
    pub async fn generate(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
        });

        tracing::debug!(model = %self.model, url = %self.endpoint(), "calling generation endpoint");

        let response = self
            .client
            .post(self.endpoint())
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if status.as_u16() == 404 {
            return Err(Error::Llm(format!(
                "model '{}' not found (404). Check `ollama list` or run `ollama pull {}`; \
                 use --mode context to skip the LLM call",
                self.model, self.model
            )));
        }
        let text = response
            .text()
            .await
            .map_err(|e| self.transport_error(e))?;
        if !status.is_success() {
            return Err(Error::Llm(format!("HTTP {} from Ollama: {}", status, text.trim())));
        }

        parse_generate_response(&text)
    }

    fn transport_error(&self, err: reqwest::Error) -> Error {
        if err.is_timeout() {
            Error::Llm(format!("Ollama at {} timed out: {}", self.base_url, err))
        } else if err.is_connect() {
            Error::Llm(format!(
                "Ollama unreachable at {}: {}. Start it with `ollama serve` or use --mode context",
                self.base_url, err
            ))
        } else {
            Error::Llm(format!("Ollama request failed: {}", err))
        }
    }
}

/// Extracts the completion from a `/api/generate` body.
pub fn parse_generate_response(body: &str) -> Result<String> {
    let parsed: GenerateResponse = serde_json::from_str(body)
        .map_err(|e| Error::Llm(format!("invalid JSON from Ollama: {}", e)))?;
    if let Some(err) = parsed.error.filter(|e| !e.is_empty()) {
        return Err(Error::Llm(err));
    }
    Ok(parsed.response.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_cleanly() {
        let config = LlmConfig {
            base_url: "http://ollama:11434/".to_string(),
            ..LlmConfig::default()
        };
        let client = OllamaClient::new(&config).unwrap();
        assert_eq!(client.endpoint(), "http://ollama:11434/api/generate");
    }

    #[test]
    fn test_parse_response() {
        let text = parse_generate_response(r#"{"model":"m","response":"  answer [1]\n","done":true}"#)
            .unwrap();
        assert_eq!(text, "answer [1]");
    }

    #[test]
    fn test_parse_error_field() {
        let err = parse_generate_response(r#"{"error":"model 'x' not found"}"#).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_parse_invalid_json() {
        assert!(matches!(parse_generate_response("<html>"), Err(Error::Llm(_))));
    }
}
