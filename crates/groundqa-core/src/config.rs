//! Configuration loader, typed settings and path helpers.
//!
//! Uses Figment to merge built-in defaults + `config.toml` + `config.<env>.toml`
//! + `APP_*` env vars (`__` separates nested keys, e.g. `APP_LLM__PROVIDER`).
//! `GOOGLE_API_KEY` is also honoured as the cloud credential.
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::types::{DEFAULT_TOP_K, MAX_TOP_K};

pub struct Config {
    figment: Figment,
    env_name: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
        Self::load_for_env(&env_name)
    }

    pub fn load_for_env(env_name: &str) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file("config.toml"));
        match env_name {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment
            .merge(Env::raw().only(&["GOOGLE_API_KEY"]).map(|_| "llm.api_key".into()))
            .merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment, env_name: env_name.to_string() };
        config.validate_for_env()?;
        Ok(config)
    }

    pub fn env_name(&self) -> &str { &self.env_name }

    pub fn get<T>(&self, key: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| Error::InvalidConfig(format!("Failed to get '{key}': {e}")))
    }

    pub fn settings(&self) -> Result<Settings> {
        let settings: Settings = self
            .figment
            .extract()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate_for_env(&self) -> Result<()> {
        if matches!(self.env_name.as_str(), "prod" | "production") {
            let settings = self.settings()?;
            if settings.embedding.use_fake {
                return Err(Error::InvalidConfig(
                    "embedding.use_fake must not be enabled in production".into(),
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub index: IndexSettings,
    pub embedding: EmbeddingSettings,
    pub llm: LlmSettings,
    pub retrieval: RetrievalSettings,
    pub cache: CacheSettings,
    pub rate_limit: RateLimitSettings,
    pub input: InputSettings,
    pub metrics: MetricsSettings,
    pub logging: LoggingSettings,
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        if self.retrieval.max_top_k == 0 {
            return Err(Error::InvalidConfig("retrieval.max_top_k must be positive".into()));
        }
        if self.cache.enabled && self.cache.max_size == 0 {
            return Err(Error::InvalidConfig("cache.max_size must be positive".into()));
        }
        if self.rate_limit.window_secs == 0 {
            return Err(Error::InvalidConfig("rate_limit.window_secs must be positive".into()));
        }
        if self.embedding.dim == 0 {
            return Err(Error::InvalidConfig("embedding.dim must be positive".into()));
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(Error::InvalidConfig(format!(
                "llm.temperature {} outside [0, 2]",
                self.llm.temperature
            )));
        }
        Ok(())
    }
}

/// Location of the persisted vector index and its metadata sidecar.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IndexSettings {
    pub dir: String,
    pub table: String,
    pub metadata_file: String,
    pub load_attempts: u32,
    pub load_retry_delay_secs: f64,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            dir: "vector_store".into(),
            table: "passages".into(),
            metadata_file: "metadata.json".into(),
            load_attempts: 3,
            load_retry_delay_secs: 1.0,
        }
    }
}

impl IndexSettings {
    pub fn index_dir(&self, base: &Path) -> PathBuf { resolve_with_base(base, &self.dir) }

    pub fn metadata_path(&self, base: &Path) -> PathBuf {
        self.index_dir(base).join(&self.metadata_file)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub model_dir: String,
    pub dim: usize,
    pub max_len: usize,
    pub normalize: bool,
    pub use_fake: bool,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            model_dir: "models/paraphrase-MiniLM-L3-v2".into(),
            dim: 384,
            max_len: 128,
            normalize: false,
            use_fake: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmSettings {
    /// `ollama`/`local` or `google`/`gemini`/`cloud`.
    pub provider: String,
    pub base_url: String,
    pub model: String,
    pub api_base: String,
    pub api_key: Option<String>,
    pub cloud_model: String,
    pub timeout_secs: u64,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Falls back to the provider default when unset.
    pub max_retries: Option<u32>,
    pub retry_delay_secs: f64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: "ollama".into(),
            base_url: "http://localhost:11434".into(),
            model: "mistral:7b-instruct".into(),
            api_base: "https://generativelanguage.googleapis.com/v1beta".into(),
            api_key: None,
            cloud_model: "gemini-pro".into(),
            timeout_secs: 120,
            max_tokens: 1024,
            temperature: 0.7,
            max_retries: None,
            retry_delay_secs: 1.0,
        }
    }
}

impl LlmSettings {
    /// The credential, if present and non-blank.
    pub fn credential(&self) -> Option<&str> {
        self.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalSettings {
    pub default_top_k: usize,
    pub max_top_k: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self { Self { default_top_k: DEFAULT_TOP_K, max_top_k: MAX_TOP_K } }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheSettings {
    pub enabled: bool,
    pub ttl_secs: u64,
    pub max_size: usize,
}

impl Default for CacheSettings {
    fn default() -> Self { Self { enabled: true, ttl_secs: 3600, max_size: 1000 } }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RateLimitSettings {
    pub enabled: bool,
    pub max_requests: usize,
    pub window_secs: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self { Self { enabled: true, max_requests: 30, window_secs: 60 } }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct InputSettings {
    pub max_query_length: usize,
}

impl Default for InputSettings {
    fn default() -> Self { Self { max_query_length: 1000 } }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MetricsSettings {
    pub enabled: bool,
}

impl Default for MetricsSettings {
    fn default() -> Self { Self { enabled: true } }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self { Self { level: "info".into(), json: false } }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
