//! Request gate in front of the pipeline: sanitize, validate, rate-limit,
//! clamp, answer.

use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use groundqa_core::input::QueryValidator;
use groundqa_core::types::{clamp_top_k, ScoredPassage};

use crate::messages::{self, UserMessage};
use crate::pipeline::Pipeline;
use crate::rate_limit::RateLimiter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyStatus {
    Answered,
    InvalidInput,
    RateLimited,
}

#[derive(Debug, Clone, Serialize)]
pub struct Reply {
    pub status: ReplyStatus,
    pub text: String,
    pub sources: Vec<ScoredPassage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
    pub cached: bool,
}

impl Reply {
    fn rejected(status: ReplyStatus, text: String) -> Self {
        Self { status, text, sources: Vec::new(), notice: None, cached: false }
    }
}

pub struct QaService {
    pipeline: Arc<Pipeline>,
    limiter: Arc<RateLimiter>,
    validator: QueryValidator,
}

impl QaService {
    pub fn new(pipeline: Arc<Pipeline>, limiter: Arc<RateLimiter>, validator: QueryValidator) -> Self {
        Self { pipeline, limiter, validator }
    }

    pub fn pipeline(&self) -> &Pipeline { &self.pipeline }
    pub fn limiter(&self) -> &RateLimiter { &self.limiter }

    /// Invalid questions are rejected before the limiter books a slot, so they
    /// never count against the caller.
    pub fn ask(&self, client_id: &str, question: &str, category_filter: Option<&str>, top_k: i64) -> Reply {
        let metrics = self.pipeline.metrics();
        let question = match self.validator.clean(question) {
            Ok(q) => q,
            Err(e) => {
                warn!(client = client_id, reason = %e, "invalid question rejected");
                metrics.record_error("invalid_input");
                return Reply::rejected(ReplyStatus::InvalidInput, e.user_message());
            }
        };

        if !self.limiter.is_allowed(client_id) {
            warn!(client = client_id, "rate limit exceeded");
            metrics.record_error("rate_limited");
            let text = messages::rate_limited(self.limiter.max_requests(), self.limiter.window().as_secs());
            return Reply::rejected(ReplyStatus::RateLimited, text);
        }

        let top_k = clamp_top_k(top_k, self.pipeline.max_top_k());
        let started = Instant::now();
        let answer = self.pipeline.answer(&question, category_filter, top_k);
        let elapsed = started.elapsed();
        metrics.record_query(elapsed, answer.cached);
        info!(
            client = client_id,
            top_k,
            sources = answer.sources.len(),
            cached = answer.cached,
            elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            "question answered"
        );
        Reply {
            status: ReplyStatus::Answered,
            text: answer.text,
            sources: answer.sources,
            notice: answer.notice,
            cached: answer.cached,
        }
    }
}
