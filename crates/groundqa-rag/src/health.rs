use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Instant;

use crate::cache::CacheStats;
use crate::pipeline::Pipeline;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexHealth {
    pub passages: usize,
    pub dim: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct LlmHealth {
    pub provider: String,
    pub model: String,
    pub available: bool,
    pub models: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub uptime_secs: u64,
    pub checked_at: DateTime<Utc>,
    pub index: IndexHealth,
    pub llm: LlmHealth,
    pub cache: CacheStats,
}

/// Probe the backend and summarize the loaded components. The index is
/// loaded by construction, so only backend availability can degrade the
/// report.
pub fn check(pipeline: &Pipeline, started: Instant) -> HealthReport {
    let backend = pipeline.backend();
    let available = backend.is_available();
    let models = if available { backend.list_models() } else { Vec::new() };
    HealthReport {
        status: if available { HealthStatus::Healthy } else { HealthStatus::Degraded },
        uptime_secs: started.elapsed().as_secs(),
        checked_at: Utc::now(),
        index: IndexHealth { passages: pipeline.index().passage_count(), dim: pipeline.index().dim() },
        llm: LlmHealth {
            provider: backend.name().to_string(),
            model: backend.model().to_string(),
            available,
            models,
        },
        cache: pipeline.cache().stats(),
    }
}
