use thiserror::Error;

use crate::model::HarvestResult;

/// Failure raised by a crawl engine while producing the next item.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Connection, DNS or TLS failure in the fetch layer
    #[error("network error: {0}")]
    Network(String),
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
    /// The item was produced but lacks a field the harvest needs
    #[error("article missing field `{field}` ({url})")]
    MissingField { field: &'static str, url: String },
    /// The item could not be parsed into an article
    #[error("malformed item: {0}")]
    Malformed(String),
    #[error("{0}")]
    Other(String),
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return EngineError::Timeout(err.to_string());
        }
        if let Some(status) = err.status() {
            return EngineError::HttpStatus {
                status: status.as_u16(),
                url: err.url().map(|u| u.to_string()).unwrap_or_default(),
            };
        }
        if err.is_connect() || err.is_request() || err.is_body() {
            return EngineError::Network(err.to_string());
        }
        EngineError::Other(err.to_string())
    }
}

/// Outcome class of an [`EngineError`], deciding how the harvest reacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Retry the pull after a fixed backoff
    TransientNetwork,
    /// Skip the item and keep going
    MissingData,
    /// Abort the harvest
    Fatal,
}

/// Errors surfaced to callers of a harvest.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HarvestError {
    #[error("invalid configuration: {0}")]
    Configuration(String),
    #[error("unknown source '{name}'; valid sources: {}", .valid.join(", "))]
    InvalidSource { name: String, valid: Vec<String> },
    #[error("network still failing after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: EngineError },
    #[error("harvest failed: {0}")]
    Fatal(String),
}

impl HarvestError {
    /// Stable category name, preserved across the error's path to the caller.
    pub fn category(&self) -> &'static str {
        match self {
            HarvestError::Configuration(_) => "configuration",
            HarvestError::InvalidSource { .. } => "invalid-source",
            HarvestError::RetriesExhausted { .. } => "transient-network",
            HarvestError::Fatal(_) => "fatal",
        }
    }
}

/// A harvest that ended in an error.
///
/// `partial` holds whatever had been accepted before the abort; it is `None`
/// for errors raised before the harvest started (configuration, sources).
#[derive(Debug, Clone, PartialEq)]
pub struct HarvestFailure {
    pub error: HarvestError,
    pub partial: Option<HarvestResult>,
}

impl HarvestFailure {
    pub(crate) fn with_partial(error: HarvestError, partial: HarvestResult) -> Self {
        Self {
            error,
            partial: Some(partial),
        }
    }
}

impl From<HarvestError> for HarvestFailure {
    fn from(error: HarvestError) -> Self {
        Self {
            error,
            partial: None,
        }
    }
}

impl std::fmt::Display for HarvestFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.partial {
            Some(p) if !p.is_empty() => write!(f, "{} ({} articles collected before failure)", self.error, p.len()),
            _ => write!(f, "{}", self.error),
        }
    }
}

impl std::error::Error for HarvestFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
