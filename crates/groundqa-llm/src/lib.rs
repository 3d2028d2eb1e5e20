//! Text-generation backends: a local inference server, a hosted cloud API,
//! and the factory choosing between them.

pub mod backend;
pub mod cloud;
pub mod error;
pub mod factory;
mod http;
pub mod local;

pub use backend::LlmBackend;
pub use cloud::CloudInferenceClient;
pub use error::LlmError;
pub use factory::{backend_for_provider, backend_from_settings, retry_policy, Backend, Provider};
pub use groundqa_core::retry::RetryPolicy;
pub use local::LocalInferenceClient;
