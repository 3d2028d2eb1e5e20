use std::fmt;
use std::time::Duration;
use tracing::{info, warn};

use groundqa_core::config::LlmSettings;
use groundqa_core::retry::RetryPolicy;

use crate::backend::LlmBackend;
use crate::cloud::CloudInferenceClient;
use crate::error::LlmError;
use crate::local::LocalInferenceClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Local,
    Cloud,
}

impl Provider {
    /// Case-insensitive; `None` for unknown identifiers.
    pub fn parse(id: &str) -> Option<Self> {
        match id.trim().to_ascii_lowercase().as_str() {
            "ollama" | "local" => Some(Self::Local),
            "google" | "gemini" | "cloud" => Some(Self::Cloud),
            _ => None,
        }
    }

    /// Attempts per generation, first call included.
    pub fn default_max_attempts(self) -> u32 {
        match self {
            Self::Local => 3,
            Self::Cloud => 2,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Local => "ollama",
            Self::Cloud => "google",
        })
    }
}

pub enum Backend {
    Local(LocalInferenceClient),
    Cloud(CloudInferenceClient),
}

impl Backend {
    pub fn provider(&self) -> Provider {
        match self {
            Self::Local(_) => Provider::Local,
            Self::Cloud(_) => Provider::Cloud,
        }
    }

    fn inner(&self) -> &dyn LlmBackend {
        match self {
            Self::Local(c) => c,
            Self::Cloud(c) => c,
        }
    }
}

impl LlmBackend for Backend {
    fn name(&self) -> &str { self.inner().name() }
    fn model(&self) -> &str { self.inner().model() }
    fn generate(&self, prompt: &str, temperature: f32, max_tokens: u32) -> Result<String, LlmError> {
        self.inner().generate(prompt, temperature, max_tokens)
    }
    fn is_available(&self) -> bool { self.inner().is_available() }
    fn list_models(&self) -> Vec<String> { self.inner().list_models() }
}

fn local(settings: &LlmSettings) -> Result<Backend, LlmError> {
    let timeout = Duration::from_secs(settings.timeout_secs);
    Ok(Backend::Local(LocalInferenceClient::new(&settings.base_url, &settings.model, timeout)?))
}

fn cloud(settings: &LlmSettings, key: &str) -> Result<Backend, LlmError> {
    let timeout = Duration::from_secs(settings.timeout_secs);
    Ok(Backend::Cloud(CloudInferenceClient::new(&settings.api_base, key, &settings.cloud_model, timeout)?))
}

/// The configured backend, degrading to the local provider when the cloud
/// credential is missing or the provider is unknown. Only HTTP client
/// construction can fail.
pub fn backend_from_settings(settings: &LlmSettings) -> Result<Backend, LlmError> {
    match Provider::parse(&settings.provider) {
        Some(Provider::Cloud) => match settings.credential() {
            Some(key) => {
                info!(model = %settings.cloud_model, "using cloud provider");
                cloud(settings, key)
            }
            None => {
                warn!("cloud provider selected but no API key configured; falling back to local");
                local(settings)
            }
        },
        Some(Provider::Local) => {
            info!(model = %settings.model, "using local provider");
            local(settings)
        }
        None => {
            warn!(provider = %settings.provider, "unknown LLM provider; falling back to local");
            local(settings)
        }
    }
}

/// Build exactly the named provider, without substitution.
pub fn backend_for_provider(provider: &str, settings: &LlmSettings) -> Result<Backend, LlmError> {
    match Provider::parse(provider) {
        Some(Provider::Local) => local(settings),
        Some(Provider::Cloud) => {
            let key = settings
                .credential()
                .ok_or_else(|| LlmError::Config("cloud provider requires an API key (GOOGLE_API_KEY)".into()))?;
            cloud(settings, key)
        }
        None => Err(LlmError::Config(format!("unknown provider '{provider}'; use 'ollama' or 'google'"))),
    }
}

/// Retry policy for `provider`: `llm.max_retries` if set, else the provider
/// default; transient failures only.
pub fn retry_policy(provider: Provider, settings: &LlmSettings) -> RetryPolicy<LlmError> {
    RetryPolicy::new(
        settings.max_retries.unwrap_or_else(|| provider.default_max_attempts()),
        Duration::from_secs_f64(settings.retry_delay_secs.max(0.0)),
        LlmError::is_transient,
    )
}
