//! Fixed, user-safe wording for failures. Internal details stay in the logs.

use groundqa_core::error::Error;
use groundqa_llm::LlmError;

pub const NO_RESULTS: &str = "No relevant passages found for your query.";
pub const UNREACHABLE: &str = "Unable to connect to the AI service. Please check if the service is running.";
pub const TIMED_OUT: &str = "Request timed out. Please try again with a shorter query.";
pub const MISSING_DATA: &str = "Required data files are missing. Please ensure the system is properly configured.";
pub const UNEXPECTED: &str = "An unexpected error occurred. Please try again later.";

pub fn invalid_input(detail: &str) -> String { format!("Invalid input: {detail}") }

pub fn rate_limited(max_requests: usize, window_secs: u64) -> String {
    format!(
        "Rate limit exceeded. Please wait before making another request. Limit: {max_requests} requests per {window_secs} seconds."
    )
}

pub trait UserMessage {
    fn user_message(&self) -> String;
}

impl UserMessage for Error {
    fn user_message(&self) -> String {
        match self {
            Error::IndexUnavailable(_) => MISSING_DATA.to_string(),
            Error::InvalidInput(detail) => invalid_input(detail),
            _ => UNEXPECTED.to_string(),
        }
    }
}

impl UserMessage for LlmError {
    fn user_message(&self) -> String {
        match self {
            LlmError::Unreachable(_) => UNREACHABLE.to_string(),
            LlmError::Timeout(_) => TIMED_OUT.to_string(),
            _ => UNEXPECTED.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classes_map_to_fixed_messages() {
        assert_eq!(LlmError::Unreachable("refused".into()).user_message(), UNREACHABLE);
        assert_eq!(LlmError::Timeout("120s".into()).user_message(), TIMED_OUT);
        assert_eq!(LlmError::Auth("401".into()).user_message(), UNEXPECTED);
        assert_eq!(Error::IndexUnavailable("gone".into()).user_message(), MISSING_DATA);
        assert_eq!(Error::InvalidInput("Query cannot be empty".into()).user_message(), "Invalid input: Query cannot be empty");
        assert_eq!(Error::Embedding("nan".into()).user_message(), UNEXPECTED);
    }

    #[test]
    fn internal_detail_never_leaks() {
        let msg = Error::Operation("lance: /srv/secret/path corrupt".into()).user_message();
        assert!(!msg.contains("/srv/secret"));
    }

    #[test]
    fn rate_limit_message_names_the_limit() {
        assert_eq!(
            rate_limited(30, 60),
            "Rate limit exceeded. Please wait before making another request. Limit: 30 requests per 60 seconds."
        );
    }
}
