//! Client for a locally hosted Ollama-style inference server.

use reqwest::blocking::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::backend::LlmBackend;
use crate::error::LlmError;
use crate::http::{build_client, classify, read_body, PROBE_TIMEOUT};

pub struct LocalInferenceClient {
    base_url: String,
    model: String,
    client: Client,
    probe: Client,
}

impl LocalInferenceClient {
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Result<Self, LlmError> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client: build_client(timeout)?,
            probe: build_client(PROBE_TIMEOUT)?,
        })
    }

    pub fn base_url(&self) -> &str { &self.base_url }
}

pub fn generate_body(model: &str, prompt: &str, temperature: f32, max_tokens: u32) -> Value {
    json!({
        "model": model,
        "prompt": prompt,
        "stream": false,
        "options": {
            "temperature": temperature,
            "num_predict": max_tokens,
        }
    })
}

/// The `response` field of a non-streaming generate reply.
pub fn parse_generate(body: &str) -> Option<String> {
    let v: Value = serde_json::from_str(body).ok()?;
    v.get("response")?.as_str().map(str::to_string)
}

/// Names from a `/api/tags` listing.
pub fn parse_tags(body: &str) -> Option<Vec<String>> {
    let v: Value = serde_json::from_str(body).ok()?;
    let models = v.get("models")?.as_array()?;
    Some(models.iter().filter_map(|m| m.get("name")?.as_str().map(str::to_string)).collect())
}

impl LlmBackend for LocalInferenceClient {
    fn name(&self) -> &str { "ollama" }

    fn model(&self) -> &str { &self.model }

    fn generate(&self, prompt: &str, temperature: f32, max_tokens: u32) -> Result<String, LlmError> {
        let url = format!("{}/api/generate", self.base_url);
        debug!(model = %self.model, temperature, max_tokens, "generating with local model");
        let resp = self
            .client
            .post(&url)
            .json(&generate_body(&self.model, prompt, temperature, max_tokens))
            .send()
            .map_err(|e| classify("local inference server", &e))
            .inspect_err(|e| error!(base_url = %self.base_url, error = %e, "local generate failed"))?;
        let body = read_body("local inference server", resp)?;
        match parse_generate(&body) {
            Some(answer) => {
                debug!(chars = answer.len(), "local generation complete");
                Ok(answer)
            }
            None => {
                warn!(model = %self.model, "unexpected response format from local inference server");
                Ok(String::new())
            }
        }
    }

    fn is_available(&self) -> bool {
        match self.probe.get(format!("{}/api/tags", self.base_url)).send() {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                warn!(status = %resp.status(), "local inference health check failed");
                false
            }
            Err(e) => {
                warn!(error = %e, "local inference server unreachable");
                false
            }
        }
    }

    fn list_models(&self) -> Vec<String> {
        self.probe
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .map_err(|e| classify("local inference server", &e))
            .and_then(|resp| read_body("local inference server", resp))
            .ok()
            .and_then(|body| parse_tags(&body))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_body_disables_streaming() {
        let body = generate_body("mistral:7b-instruct", "hi", 0.7, 1024);
        assert_eq!(body["stream"], json!(false));
        assert_eq!(body["options"]["num_predict"], json!(1024));
        assert_eq!(body["model"], json!("mistral:7b-instruct"));
    }

    #[test]
    fn parse_generate_reads_response_field() {
        assert_eq!(parse_generate(r#"{"response":"Fees apply.","done":true}"#).as_deref(), Some("Fees apply."));
        assert_eq!(parse_generate(r#"{"done":true}"#), None);
        assert_eq!(parse_generate("<html>"), None);
    }

    #[test]
    fn parse_tags_lists_names() {
        let body = r#"{"models":[{"name":"mistral:7b-instruct"},{"name":"gemma3:4b"},{"size":1}]}"#;
        assert_eq!(parse_tags(body), Some(vec!["mistral:7b-instruct".to_string(), "gemma3:4b".to_string()]));
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let c = LocalInferenceClient::new("http://localhost:11434/", "m", Duration::from_secs(1)).expect("client");
        assert_eq!(c.base_url(), "http://localhost:11434");
    }
}
