//! Client for a hosted Gemini-style generateContent API, authenticated by an
//! API key query parameter.

use reqwest::blocking::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::backend::LlmBackend;
use crate::error::LlmError;
use crate::http::{build_client, classify, read_body, PROBE_TIMEOUT};

const TOP_P: f32 = 0.95;
const TOP_K: u32 = 40;

pub struct CloudInferenceClient {
    api_base: String,
    api_key: String,
    model: String,
    client: Client,
    probe: Client,
}

impl CloudInferenceClient {
    /// A blank key is a configuration error.
    pub fn new(api_base: &str, api_key: &str, model: &str, timeout: Duration) -> Result<Self, LlmError> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(LlmError::Config("cloud provider requires an API key (GOOGLE_API_KEY)".into()));
        }
        info!(model, "initialized cloud inference client");
        Ok(Self {
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            client: build_client(timeout)?,
            probe: build_client(PROBE_TIMEOUT)?,
        })
    }
}

pub fn generate_body(prompt: &str, temperature: f32, max_tokens: u32) -> Value {
    json!({
        "contents": [{ "parts": [{ "text": prompt }] }],
        "generationConfig": {
            "temperature": temperature,
            "maxOutputTokens": max_tokens,
            "topP": TOP_P,
            "topK": TOP_K,
        }
    })
}

/// Text of the first part of the first candidate.
pub fn parse_generate(body: &str) -> Option<String> {
    let v: Value = serde_json::from_str(body).ok()?;
    v.pointer("/candidates/0/content/parts/0/text")?.as_str().map(str::to_string)
}

pub fn parse_models(body: &str) -> Option<Vec<String>> {
    let v: Value = serde_json::from_str(body).ok()?;
    let models = v.get("models")?.as_array()?;
    Some(models.iter().filter_map(|m| m.get("name")?.as_str().map(str::to_string)).collect())
}

impl LlmBackend for CloudInferenceClient {
    fn name(&self) -> &str { "google" }

    fn model(&self) -> &str { &self.model }

    fn generate(&self, prompt: &str, temperature: f32, max_tokens: u32) -> Result<String, LlmError> {
        let url = format!("{}/models/{}:generateContent", self.api_base, self.model);
        debug!(model = %self.model, temperature, max_tokens, "generating with cloud model");
        let resp = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&generate_body(prompt, temperature, max_tokens))
            .send()
            .map_err(|e| classify("cloud inference API", &e))
            .inspect_err(|e| error!(model = %self.model, error = %e, "cloud generate failed"))?;
        let body = read_body("cloud inference API", resp)?;
        match parse_generate(&body) {
            Some(answer) => {
                debug!(chars = answer.len(), "cloud generation complete");
                Ok(answer)
            }
            None => {
                warn!(model = %self.model, "unexpected response format from cloud inference API");
                Ok(String::new())
            }
        }
    }

    fn is_available(&self) -> bool {
        let resp = self
            .probe
            .get(format!("{}/models", self.api_base))
            .query(&[("key", self.api_key.as_str())])
            .send();
        match resp {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                warn!(error = %classify("cloud inference API", &e), "cloud health check failed");
                false
            }
        }
    }

    fn list_models(&self) -> Vec<String> {
        self.probe
            .get(format!("{}/models", self.api_base))
            .query(&[("key", self.api_key.as_str())])
            .send()
            .map_err(|e| classify("cloud inference API", &e))
            .and_then(|resp| read_body("cloud inference API", resp))
            .ok()
            .and_then(|body| parse_models(&body))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_key_is_config_error() {
        let err = CloudInferenceClient::new("https://h", "  ", "gemini-pro", Duration::from_secs(1)).err().expect("err");
        assert!(matches!(err, LlmError::Config(_)));
    }

    #[test]
    fn generate_body_carries_sampling_config() {
        let body = generate_body("hello", 0.2, 64);
        assert_eq!(body["contents"][0]["parts"][0]["text"], json!("hello"));
        assert_eq!(body["generationConfig"]["maxOutputTokens"], json!(64));
        assert_eq!(body["generationConfig"]["topK"], json!(40));
    }

    #[test]
    fn parse_generate_takes_first_candidate() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"Answer."}]}},{"content":{"parts":[{"text":"Other"}]}}]}"#;
        assert_eq!(parse_generate(body).as_deref(), Some("Answer."));
        assert_eq!(parse_generate(r#"{"candidates":[]}"#), None);
        assert_eq!(parse_generate(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#), None);
    }

    #[test]
    fn parse_models_lists_names() {
        let body = r#"{"models":[{"name":"models/gemini-pro"}]}"#;
        assert_eq!(parse_models(body), Some(vec!["models/gemini-pro".to_string()]));
    }
}
