//! Retrieval-augmented answering: result cache, admission control, prompt
//! construction and the pipeline tying retrieval to generation.

pub mod cache;
pub mod health;
pub mod messages;
pub mod metrics;
pub mod pipeline;
pub mod prompt;
pub mod rate_limit;
pub mod service;

pub use cache::{fingerprint, CacheStats, ResultCache};
pub use health::{HealthReport, HealthStatus};
pub use metrics::{Metrics, MetricsSnapshot};
pub use pipeline::{fallback_answer, Answer, Pipeline};
pub use rate_limit::RateLimiter;
pub use service::{QaService, Reply, ReplyStatus};
