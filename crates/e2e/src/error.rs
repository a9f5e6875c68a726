//! Error types for E2E testing

use thiserror::Error;

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Target application unreachable at {url} after {attempts} attempts")]
    AppUnreachable { url: String, attempts: usize },

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Timeout waiting for: {0}")]
    Timeout(String),

    #[error("Action '{action}' did not satisfy '{predicate}' after {attempts} attempt(s){}", last_error_suffix(.last_error))]
    RetryExhausted {
        action: String,
        predicate: String,
        attempts: u32,
        last_error: Option<String>,
    },

    #[error("Option '{option}' not found in filter '{filter}'")]
    OptionNotFound { filter: String, option: String },

    #[error("Column {column} not sorted correctly ({direction}): observed {observed:?}, expected {expected:?}")]
    SortMismatch {
        column: usize,
        direction: String,
        observed: Vec<String>,
        expected: Vec<String>,
    },

    #[error("Assertion failed: {0}")]
    AssertionFailed(String),

    #[error("Step failed: {step} - {reason}")]
    StepFailed { step: String, reason: String },

    #[error("Suite spec parse error: {0}")]
    SpecParse(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

fn last_error_suffix(last_error: &Option<String>) -> String {
    last_error
        .as_ref()
        .map(|e| format!(" (last error: {})", e))
        .unwrap_or_default()
}

impl E2eError {
    /// Whether this failure came from a bounded wait running out.
    pub fn is_timeout(&self) -> bool {
        matches!(self, E2eError::Timeout(_))
    }
}

pub type E2eResult<T> = Result<T, E2eError>;
