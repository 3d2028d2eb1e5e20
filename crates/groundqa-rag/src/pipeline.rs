//! Cache lookup, retrieval, prompt construction, generation with retry and
//! deterministic fallback, cache population.

use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use groundqa_core::config::Settings;
use groundqa_core::error::{Error, Result};
use groundqa_core::types::{clamp_top_k, ScoredPassage, MAX_TOP_K};
use groundqa_llm::{backend_from_settings, retry_policy, LlmBackend, LlmError, RetryPolicy};
use groundqa_vector::{Retriever, VectorIndex};

use crate::cache::{fingerprint, ResultCache};
use crate::messages::{self, UserMessage};
use crate::metrics::Metrics;
use crate::prompt::{build_context, build_prompt};

/// Most topic labels quoted by a fallback answer.
pub const FALLBACK_TOPICS: usize = 5;

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<ScoredPassage>,
    /// Set when the text is a fallback summary; says why generation failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
    /// True when served from the result cache.
    pub cached: bool,
}

impl Answer {
    fn message(text: impl Into<String>) -> Self {
        Self { text: text.into(), ..Self::default() }
    }
}

pub struct Pipeline {
    retriever: Retriever,
    backend: Box<dyn LlmBackend>,
    retry: RetryPolicy<LlmError>,
    cache: Arc<ResultCache>,
    metrics: Arc<Metrics>,
    temperature: f32,
    max_tokens: u32,
    max_top_k: usize,
}

impl Pipeline {
    pub fn new(
        retriever: Retriever,
        backend: Box<dyn LlmBackend>,
        retry: RetryPolicy<LlmError>,
        cache: Arc<ResultCache>,
    ) -> Self {
        Self {
            retriever,
            backend,
            retry,
            cache,
            metrics: Arc::new(Metrics::new(true)),
            temperature: 0.7,
            max_tokens: 1024,
            max_top_k: MAX_TOP_K,
        }
    }

    pub fn with_generation(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_max_top_k(mut self, max_top_k: usize) -> Self {
        self.max_top_k = max_top_k;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Load the encoder and index under `base` and build the configured
    /// backend. Any missing artifact fails here, not on the first question.
    pub fn from_settings(settings: &Settings, base: &Path, cache: Arc<ResultCache>) -> Result<Self> {
        let started = Instant::now();
        let embedder = groundqa_embed::embedder_from_settings(&settings.embedding, base)
            .map_err(|e| Error::Embedding(format!("{e:#}")))?;
        let index = VectorIndex::open(&settings.index, base)?;
        let retriever = Retriever::new(embedder, index)?.with_max_top_k(settings.retrieval.max_top_k);
        let backend = backend_from_settings(&settings.llm).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        let retry = retry_policy(backend.provider(), &settings.llm);
        info!(
            provider = backend.name(),
            model = backend.model(),
            max_attempts = retry.max_attempts(),
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "pipeline ready"
        );
        Ok(Self::new(retriever, Box::new(backend), retry, cache)
            .with_generation(settings.llm.temperature, settings.llm.max_tokens)
            .with_max_top_k(settings.retrieval.max_top_k)
            .with_metrics(Arc::new(Metrics::new(settings.metrics.enabled))))
    }

    pub fn backend(&self) -> &dyn LlmBackend { self.backend.as_ref() }
    pub fn cache(&self) -> &ResultCache { &self.cache }
    pub fn index(&self) -> &VectorIndex { self.retriever.index() }
    pub fn metrics(&self) -> &Arc<Metrics> { &self.metrics }
    pub fn max_top_k(&self) -> usize { self.max_top_k }

    fn clamp(&self, top_k: usize) -> usize {
        clamp_top_k(i64::try_from(top_k).unwrap_or(i64::MAX), self.max_top_k)
    }

    /// Answer `question` from retrieved passages. Never fails: errors and
    /// panics below this point become a user-safe message with no sources.
    pub fn answer(&self, question: &str, category_filter: Option<&str>, top_k: usize) -> Answer {
        let top_k = self.clamp(top_k);
        let filter = category_filter.map(str::trim).filter(|f| !f.is_empty());
        let key = fingerprint(question, filter, top_k);
        if let Some(mut hit) = self.cache.get(&key) {
            info!(top_k, filter, "returning cached answer");
            hit.cached = true;
            return hit;
        }

        match panic::catch_unwind(AssertUnwindSafe(|| self.answer_uncached(question, filter, top_k, &key))) {
            Ok(Ok(answer)) => answer,
            Ok(Err(e)) => {
                error!(error = %e, "pipeline failed");
                self.metrics.record_error("pipeline");
                Answer::message(e.user_message())
            }
            Err(_) => {
                error!("pipeline panicked");
                self.metrics.record_error("panic");
                Answer::message(messages::UNEXPECTED)
            }
        }
    }

    fn answer_uncached(&self, question: &str, filter: Option<&str>, top_k: usize, key: &str) -> Result<Answer> {
        debug!(top_k, filter, chars = question.len(), "processing question");
        let sources = self.retriever.retrieve(question, top_k, filter)?;
        if sources.is_empty() {
            warn!(filter, "no relevant passages found");
            return Ok(Answer::message(messages::NO_RESULTS));
        }

        let prompt = build_prompt(question, &build_context(&sources));
        let generated = self
            .retry
            .run("generate", |_| self.backend.generate(&prompt, self.temperature, self.max_tokens));
        let (text, notice) = match generated {
            Ok(text) => (text.trim().to_string(), None),
            Err(e) => {
                error!(error = %e, provider = self.backend.name(), "generation failed; using fallback summary");
                self.metrics.record_error(if e.is_transient() { "generation_transient" } else { "generation" });
                (fallback_answer(&sources), Some(e.user_message()))
            }
        };

        let answer = Answer { text, sources, notice, cached: false };
        self.cache.set(key, answer.clone());
        Ok(answer)
    }

    /// Clamped retrieval only, for debugging and source listings.
    pub fn retrieve_only(&self, question: &str, category_filter: Option<&str>, top_k: usize) -> Result<Vec<ScoredPassage>> {
        let filter = category_filter.map(str::trim).filter(|f| !f.is_empty());
        self.retriever.retrieve(question, self.clamp(top_k), filter)
    }
}

/// Deterministic summary of `sources` for when generation is unavailable.
pub fn fallback_answer(sources: &[ScoredPassage]) -> String {
    let mut categories: Vec<&str> = Vec::new();
    let mut topics: Vec<&str> = Vec::new();
    for s in sources {
        if !categories.contains(&s.category()) {
            categories.push(s.category());
        }
        let topic = s.topic().trim();
        if !topic.is_empty() && !topics.contains(&topic) && topics.len() < FALLBACK_TOPICS {
            topics.push(topic);
        }
    }
    let mut parts = vec![format!("Found {} relevant passage(s) related to your query.", sources.len())];
    if !categories.is_empty() {
        parts.push(format!("Categories involved: {}.", categories.join(", ")));
    }
    if !topics.is_empty() {
        parts.push(format!("Common topics: {}.", topics.join(", ")));
    }
    parts.join(" ")
}
