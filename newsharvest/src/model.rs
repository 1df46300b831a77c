use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::time::Duration;

/// An extracted article as produced by a crawl engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub title: String,
    /// Canonical URL of the article page
    pub url: String,
    /// Serialized as ISO 8601, or null when the engine could not find one
    pub publishing_date: Option<DateTime<Utc>>,
    pub body: String,
    pub authors: Vec<String>,
    /// Name of the publisher the article came from
    pub source: String,
}

/// How a harvest that produced a result ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Termination {
    /// Stream exhausted or `max_articles` reached
    Completed,
    /// Deadline fired; `articles` is a partial result
    TimedOut,
    /// Cancelled by the caller; `articles` is a partial result
    Cancelled,
    /// Aborted by a fatal error; only seen on the partial result of a failure
    Failed,
}

impl Termination {
    pub fn is_partial(&self) -> bool {
        !matches!(self, Termination::Completed)
    }
}

/// Output of one harvest.
///
/// Articles are in discovery order. Counters explain everything that was
/// pulled but not returned.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HarvestResult {
    pub articles: Vec<Article>,
    /// Missing-data / malformed items
    pub skipped_count: usize,
    pub out_of_window_count: usize,
    /// Items rejected by the local filter policy backstop
    pub filtered_count: usize,
    /// Transient errors that were retried
    pub retry_count: usize,
    #[serde(rename = "elapsedSeconds", serialize_with = "serialize_secs")]
    pub elapsed: Duration,
    #[serde(rename = "state")]
    pub termination: Termination,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notices: Vec<String>,
}

impl HarvestResult {
    pub(crate) fn empty() -> Self {
        Self {
            articles: Vec::new(),
            skipped_count: 0,
            out_of_window_count: 0,
            filtered_count: 0,
            retry_count: 0,
            elapsed: Duration::ZERO,
            termination: Termination::Completed,
            notices: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.articles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.articles.is_empty()
    }
}

fn serialize_secs<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}
