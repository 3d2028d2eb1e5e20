use thiserror::Error;

/// Failure classes of a generation backend. Only the transient ones are worth
/// another attempt.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LlmError {
    #[error("backend unreachable: {0}")]
    Unreachable(String),

    #[error("backend timed out: {0}")]
    Timeout(String),

    #[error("backend request failed: {0}")]
    Request(String),

    #[error("backend rejected credentials: {0}")]
    Auth(String),

    #[error("backend misconfigured: {0}")]
    Config(String),
}

impl LlmError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unreachable(_) | Self::Timeout(_) | Self::Request(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_network_classes_are_transient() {
        assert!(LlmError::Unreachable("x".into()).is_transient());
        assert!(LlmError::Timeout("x".into()).is_transient());
        assert!(LlmError::Request("x".into()).is_transient());
        assert!(!LlmError::Auth("x".into()).is_transient());
        assert!(!LlmError::Config("x".into()).is_transient());
    }
}
