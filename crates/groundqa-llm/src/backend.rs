use crate::error::LlmError;

/// A text-generation service. Calls block and are bounded by the client's
/// configured timeout.
pub trait LlmBackend: Send + Sync {
    /// Provider label for logs and health reports.
    fn name(&self) -> &str;
    fn model(&self) -> &str;

    /// Complete `prompt`. A reply whose body cannot be interpreted comes back
    /// as an empty string rather than an error.
    fn generate(&self, prompt: &str, temperature: f32, max_tokens: u32) -> Result<String, LlmError>;

    fn is_available(&self) -> bool;

    /// Model names the service reports; empty when it cannot be asked.
    fn list_models(&self) -> Vec<String>;
}
