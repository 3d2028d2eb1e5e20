//! Question sanitation and validation, applied before any cache, rate-limit
//! or backend effect.

use regex::RegexSet;

use crate::error::{Error, Result};

const SUSPICIOUS_PATTERNS: &[&str] = &[
    r"(?i)<script",
    r"(?i)javascript:",
    r"(?i)on\w+\s*=",
    r"(?i)exec\s*\(",
    r"(?i)eval\s*\(",
];

/// Remove NUL bytes, then collapse whitespace runs to a single space and trim.
pub fn sanitize(text: &str) -> String {
    text.replace('\0', "").split_whitespace().collect::<Vec<_>>().join(" ")
}

pub struct QueryValidator {
    max_len: usize,
    suspicious: RegexSet,
}

impl QueryValidator {
    pub fn new(max_len: usize) -> Result<Self> {
        let suspicious = RegexSet::new(SUSPICIOUS_PATTERNS)
            .map_err(|e| Error::InvalidConfig(format!("suspicious-pattern set: {e}")))?;
        Ok(Self { max_len, suspicious })
    }

    pub fn max_len(&self) -> usize { self.max_len }

    /// Reject empty, over-length or script-like questions.
    pub fn validate(&self, query: &str) -> Result<()> {
        if query.trim().is_empty() {
            return Err(Error::InvalidInput("Query cannot be empty".into()));
        }
        let len = query.chars().count();
        if len > self.max_len {
            return Err(Error::InvalidInput(format!(
                "Query exceeds maximum length of {} characters",
                self.max_len
            )));
        }
        if self.suspicious.is_match(query) {
            return Err(Error::InvalidInput("Query contains invalid characters".into()));
        }
        Ok(())
    }

    /// Sanitize, then validate. Returns the cleaned question.
    pub fn clean(&self, raw: &str) -> Result<String> {
        let cleaned = sanitize(raw);
        self.validate(&cleaned)?;
        Ok(cleaned)
    }
}
