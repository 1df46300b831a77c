//! Harvest request handling shared by the CLI and the HTTP server.
//!
//! Turns a loosely-typed [`HarvestRequest`] into a validated
//! [`HarvestConfig`], resolves sources, builds a fresh engine and runs the
//! harvest on its own task.

use common::{Config, EngineKind, HarvestDefaults};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, Instrument};
use uuid::Uuid;

use crate::engine::{factory_for, EngineFactory};
use crate::error::{HarvestError, HarvestFailure};
use crate::filter::SearchTarget;
use crate::harvester::{HarvestConfig, Harvester, RetryPolicy};
use crate::model::{HarvestResult, Termination};
use crate::sources::{SourceRegistry, SourceSet};

/// Inbound request before validation. `None` fields take configured defaults.
#[derive(Debug, Clone)]
pub struct HarvestRequest {
    pub target: SearchTarget,
    pub include_terms: Vec<String>,
    pub exclude_terms: Vec<String>,
    /// Collection/publisher names; for a passthrough harvest, exactly one publisher
    pub sources: Vec<String>,
    pub max_articles: Option<usize>,
    pub days_back: Option<u32>,
    pub timeout_seconds: Option<u64>,
}

impl HarvestRequest {
    pub fn new(target: SearchTarget) -> Self {
        Self {
            target,
            include_terms: Vec::new(),
            exclude_terms: Vec::new(),
            sources: Vec::new(),
            max_articles: None,
            days_back: None,
            timeout_seconds: None,
        }
    }

    /// Single-publisher harvest with no term filtering.
    pub fn single_source(name: impl Into<String>) -> Self {
        let mut req = Self::new(SearchTarget::Passthrough);
        req.sources = vec![name.into()];
        req
    }
}

/// Result plus a human-readable summary line.
#[derive(Debug, Clone, Serialize)]
pub struct HarvestResponse {
    pub message: String,
    #[serde(flatten)]
    pub result: HarvestResult,
}

pub struct HarvestService {
    registry: Arc<SourceRegistry>,
    engines: Arc<dyn EngineFactory>,
    defaults: HarvestDefaults,
}

impl HarvestService {
    pub fn new(registry: SourceRegistry, engines: Arc<dyn EngineFactory>, defaults: HarvestDefaults) -> Self {
        Self {
            registry: Arc::new(registry),
            engines,
            defaults,
        }
    }

    /// Service wired from configuration. `engine` overrides `[harvest] engine`.
    pub fn from_config(config: &Config, engine: Option<EngineKind>) -> Self {
        let kind = engine.unwrap_or(config.harvest.engine);
        Self::new(
            SourceRegistry::from_config(&config.publishers),
            factory_for(kind, &config.politeness),
            config.harvest.clone(),
        )
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    pub fn engine_kind(&self) -> &'static str {
        self.engines.kind()
    }

    pub fn defaults(&self) -> &HarvestDefaults {
        &self.defaults
    }

    fn resolve_sources(&self, req: &HarvestRequest) -> Result<SourceSet, HarvestError> {
        if req.target == SearchTarget::Passthrough {
            return match req.sources.as_slice() {
                [name] => self.registry.publisher(name),
                _ => Err(HarvestError::Configuration(
                    "single-source harvest needs exactly one publisher name".into(),
                )),
            };
        }
        if req.sources.is_empty() {
            self.registry.resolve(&self.defaults.default_sources)
        } else {
            self.registry.resolve(&req.sources)
        }
    }

    /// Validate a request without touching the network.
    pub fn prepare(&self, req: &HarvestRequest) -> Result<HarvestConfig, HarvestError> {
        let sources = self.resolve_sources(req)?;
        HarvestConfig::builder(sources, req.target)
            .include_terms(req.include_terms.clone())
            .exclude_terms(req.exclude_terms.clone())
            .max_articles(req.max_articles.or(self.defaults.max_articles))
            .window_days(req.days_back.unwrap_or(self.defaults.days_back))
            .timeout_seconds(req.timeout_seconds.or(self.defaults.timeout_seconds))
            .undated(self.defaults.undated_articles)
            .retry(RetryPolicy {
                max_attempts: self.defaults.retry_attempts,
                backoff: self.defaults.retry_backoff(),
            })
            .build()
    }

    /// Run one harvest off the caller's task.
    ///
    /// Cancelling `cancel`, or dropping the returned future, stops the harvest.
    pub async fn harvest(&self, req: HarvestRequest, cancel: CancellationToken) -> Result<HarvestResult, HarvestFailure> {
        let config = self.prepare(&req)?;
        let engine = self
            .engines
            .create()
            .map_err(|e| HarvestError::Fatal(format!("engine unavailable: {}", e)))?;

        let harvest_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "harvest",
            %harvest_id,
            search = ?config.search_target(),
            sources = config.sources().len(),
            engine = self.engines.kind(),
        );

        let token = cancel.child_token();
        let guard = token.clone().drop_guard();
        let task = tokio::spawn(
            async move { Harvester::new(config).run(engine.as_ref(), token).await }.instrument(span),
        );

        let outcome = task.await;
        let _ = guard.disarm();
        match outcome {
            Ok(result) => result,
            Err(join_err) => {
                tracing::error!(%harvest_id, error = %join_err, "harvest task failed");
                Err(HarvestError::Fatal(format!("harvest task failed: {}", join_err)).into())
            }
        }
    }

    /// `harvest` plus the summary message shown to callers.
    pub async fn respond(&self, req: HarvestRequest, cancel: CancellationToken) -> Result<HarvestResponse, HarvestFailure> {
        let label = label_for(&req);
        let result = self.harvest(req, cancel).await?;
        info!(articles = result.len(), "{} crawler finished", label);
        Ok(HarvestResponse {
            message: summary_message(&label, &result),
            result,
        })
    }
}

fn label_for(req: &HarvestRequest) -> String {
    match req.target {
        SearchTarget::Body => "Body".to_string(),
        SearchTarget::Url => "URL".to_string(),
        SearchTarget::Passthrough => req.sources.first().cloned().unwrap_or_else(|| "Source".to_string()),
    }
}

pub fn summary_message(label: &str, result: &HarvestResult) -> String {
    let base = format!("{} crawler completed with {} articles found", label, result.len());
    match result.termination {
        Termination::Completed => base,
        Termination::TimedOut => format!("{} (timed out after {:.1}s, partial result)", base, result.elapsed.as_secs_f64()),
        Termination::Cancelled => format!("{} (cancelled, partial result)", base),
        Termination::Failed => format!("{} (failed, partial result)", base),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MockEngineFactory;

    fn service() -> HarvestService {
        HarvestService::new(
            SourceRegistry::builtin(),
            Arc::new(MockEngineFactory),
            HarvestDefaults::default(),
        )
    }

    #[test]
    fn prepare_applies_defaults() {
        let mut req = HarvestRequest::new(SearchTarget::Body);
        req.include_terms = vec!["climate".into()];
        let cfg = service().prepare(&req).unwrap();
        assert_eq!(cfg.window_days(), 7);
        assert_eq!(cfg.timeout(), None);
        assert_eq!(cfg.retry().max_attempts, 3);
        assert!(cfg.sources().contains_name("The Guardian"));
        assert!(cfg.sources().contains_name("Wired"));
    }

    #[test]
    fn prepare_fails_fast_on_unknown_source() {
        let mut req = HarvestRequest::new(SearchTarget::Url);
        req.include_terms = vec!["coral".into()];
        req.sources = vec!["nowhere".into()];
        let err = service().prepare(&req).unwrap_err();
        assert_eq!(err.category(), "invalid-source");
    }

    #[test]
    fn single_source_needs_a_publisher() {
        assert!(service().prepare(&HarvestRequest::single_source("The Guardian")).is_ok());
        assert!(service().prepare(&HarvestRequest::single_source("uk")).is_err());
        assert!(service().prepare(&HarvestRequest::new(SearchTarget::Passthrough)).is_err());
    }

    #[tokio::test]
    async fn respond_reports_count_in_message() {
        let mut req = HarvestRequest::new(SearchTarget::Body);
        req.include_terms = vec!["climate".into()];
        let response = service().respond(req, CancellationToken::new()).await.unwrap();
        assert_eq!(response.result.len(), 2);
        assert_eq!(response.message, "Body crawler completed with 2 articles found");
    }
}
