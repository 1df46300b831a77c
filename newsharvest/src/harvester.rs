//! The bounded stream harvester.
//!
//! One [`Harvester`] drives one engine stream to a finite [`HarvestResult`]
//! under a count limit, a wall-clock budget and a recency window. Cancellation
//! is cooperative: the pull, every retry backoff and the stream opening all
//! race against the deadline and the caller's [`CancellationToken`], so an
//! in-flight pull is abandoned (dropped), never waited out.

use chrono::{DateTime, Utc};
use common::UndatedPolicy;
use futures::StreamExt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::classify::classify;
use crate::engine::CrawlEngine;
use crate::error::{EngineError, ErrorClass, HarvestError, HarvestFailure};
use crate::filter::{EngineFilter, FilterPolicy, Recency, RecencyWindow, SearchTarget};
use crate::model::{Article, HarvestResult, Termination};
use crate::sources::SourceSet;

/// Bounded retry for transient network errors: a fixed backoff between
/// consecutive failures, at most `max_attempts` retries in a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(1),
        }
    }
}

/// Validated, immutable configuration of a single harvest.
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    sources: SourceSet,
    max_articles: Option<usize>,
    window_days: u32,
    timeout: Option<Duration>,
    policy: Arc<FilterPolicy>,
    notices: Vec<String>,
    undated: UndatedPolicy,
    retry: RetryPolicy,
    anchor: Option<DateTime<Utc>>,
}

impl HarvestConfig {
    pub fn builder(sources: SourceSet, target: SearchTarget) -> HarvestConfigBuilder {
        HarvestConfigBuilder {
            sources,
            target,
            max_articles: None,
            window_days: 7,
            timeout_seconds: None,
            include_terms: Vec::new(),
            exclude_terms: Vec::new(),
            undated: UndatedPolicy::default(),
            retry: RetryPolicy::default(),
            anchor: None,
        }
    }

    pub fn sources(&self) -> &SourceSet {
        &self.sources
    }

    pub fn max_articles(&self) -> Option<usize> {
        self.max_articles
    }

    pub fn window_days(&self) -> u32 {
        self.window_days
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn search_target(&self) -> SearchTarget {
        self.policy.target()
    }

    pub fn policy(&self) -> &FilterPolicy {
        &self.policy
    }

    pub fn retry(&self) -> RetryPolicy {
        self.retry
    }
}

#[derive(Debug, Clone)]
pub struct HarvestConfigBuilder {
    sources: SourceSet,
    target: SearchTarget,
    max_articles: Option<usize>,
    window_days: u32,
    timeout_seconds: Option<u64>,
    include_terms: Vec<String>,
    exclude_terms: Vec<String>,
    undated: UndatedPolicy,
    retry: RetryPolicy,
    anchor: Option<DateTime<Utc>>,
}

impl HarvestConfigBuilder {
    pub fn max_articles(mut self, max: Option<usize>) -> Self {
        self.max_articles = max;
        self
    }

    pub fn window_days(mut self, days: u32) -> Self {
        self.window_days = days;
        self
    }

    pub fn timeout_seconds(mut self, secs: Option<u64>) -> Self {
        self.timeout_seconds = secs;
        self
    }

    pub fn include_terms(mut self, terms: Vec<String>) -> Self {
        self.include_terms = terms;
        self
    }

    pub fn exclude_terms(mut self, terms: Vec<String>) -> Self {
        self.exclude_terms = terms;
        self
    }

    pub fn undated(mut self, policy: UndatedPolicy) -> Self {
        self.undated = policy;
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Measure the recency window from `now` instead of the wall clock at run time.
    pub fn anchored_at(mut self, now: DateTime<Utc>) -> Self {
        self.anchor = Some(now);
        self
    }

    pub fn build(self) -> Result<HarvestConfig, HarvestError> {
        if self.window_days == 0 {
            return Err(HarvestError::Configuration("days_back must be greater than 0".into()));
        }
        if self.max_articles == Some(0) {
            return Err(HarvestError::Configuration("max_articles must be greater than 0".into()));
        }
        if self.timeout_seconds == Some(0) {
            return Err(HarvestError::Configuration("timeout must be greater than 0".into()));
        }
        if self.sources.is_empty() {
            return Err(HarvestError::Configuration("at least one source is required".into()));
        }

        let built = FilterPolicy::build(self.target, &self.include_terms, &self.exclude_terms)?;

        Ok(HarvestConfig {
            sources: self.sources,
            max_articles: self.max_articles,
            window_days: self.window_days,
            timeout: self.timeout_seconds.map(Duration::from_secs),
            policy: Arc::new(built.policy),
            notices: built.notices,
            undated: self.undated,
            retry: self.retry,
            anchor: self.anchor,
        })
    }
}

enum Wake<T> {
    Ready(T),
    Deadline,
    Cancelled,
}

/// Race `fut` against the deadline and the cancel token.
///
/// Biased so an already-expired deadline or a fired token wins without
/// polling `fut` at all.
async fn bounded<F: Future>(fut: F, deadline: Option<Instant>, cancel: &CancellationToken) -> Wake<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Wake::Cancelled,
        _ = expire(deadline) => Wake::Deadline,
        out = fut => Wake::Ready(out),
    }
}

async fn expire(deadline: Option<Instant>) {
    match deadline {
        Some(d) => tokio::time::sleep_until(d).await,
        None => std::future::pending().await,
    }
}

/// What happened to a successfully pulled article.
enum Admission {
    Accepted,
    Undated,
    OutOfWindow,
    Filtered,
}

enum Retry {
    Again,
    Stop(Termination),
    Exhausted(HarvestError),
}

/// Runs exactly one harvest. Create per request, then discard.
pub struct Harvester {
    config: HarvestConfig,
}

impl Harvester {
    pub fn new(config: HarvestConfig) -> Self {
        Self { config }
    }

    /// Drive `engine` until the stream ends, `max_articles` is reached, the
    /// deadline fires or `cancel` is triggered.
    ///
    /// Timeouts and cancellation return `Ok` with a partial result. Only
    /// exhausted retries and fatal engine errors fail; the failure still
    /// carries what was collected up to that point.
    pub async fn run(self, engine: &dyn CrawlEngine, cancel: CancellationToken) -> Result<HarvestResult, HarvestFailure> {
        let cfg = &self.config;
        let started = Instant::now();
        let deadline = cfg.timeout.map(|t| started + t);
        let window = RecencyWindow::last_days(cfg.anchor.unwrap_or_else(Utc::now), cfg.window_days);

        let mut result = HarvestResult::empty();
        result.notices = cfg.notices.clone();
        for notice in &result.notices {
            warn!(notice = %notice, "harvest notice");
        }

        info!(
            target_kind = ?cfg.policy.target(),
            sources = cfg.sources.len(),
            max_articles = ?cfg.max_articles,
            timeout = ?cfg.timeout,
            window_start = %window.start(),
            "harvest running"
        );

        let filter = EngineFilter {
            policy: cfg.policy.clone(),
            window,
        };

        // Opening the stream shares the pull retry budget.
        let mut consecutive_failures = 0u32;
        let mut stream = loop {
            let opened = bounded(
                engine.open_stream(&cfg.sources, filter.clone(), cfg.max_articles),
                deadline,
                &cancel,
            )
            .await;
            let err = match opened {
                Wake::Ready(Ok(stream)) => break stream,
                Wake::Ready(Err(err)) => err,
                Wake::Deadline => return Ok(self.finish(result, Termination::TimedOut, started)),
                Wake::Cancelled => return Ok(self.finish(result, Termination::Cancelled, started)),
            };
            if classify(&err) != ErrorClass::TransientNetwork {
                warn!(error = %err, "engine failed to open stream");
                return Err(self.fail(HarvestError::Fatal(err.to_string()), result, started));
            }
            match self.retry_after(&mut consecutive_failures, err, &mut result, deadline, &cancel).await {
                Retry::Again => {}
                Retry::Stop(termination) => return Ok(self.finish(result, termination, started)),
                Retry::Exhausted(error) => return Err(self.fail(error, result, started)),
            }
        };
        consecutive_failures = 0;

        let termination = loop {
            let next = match bounded(stream.next(), deadline, &cancel).await {
                Wake::Ready(next) => next,
                Wake::Deadline => break Termination::TimedOut,
                Wake::Cancelled => break Termination::Cancelled,
            };

            let err = match next {
                None => break Termination::Completed,
                Some(Ok(article)) => {
                    consecutive_failures = 0;
                    match self.admit(&article, &window) {
                        Admission::Accepted => {
                            debug!(url = %article.url, "article accepted");
                            result.articles.push(article);
                            if cfg.max_articles == Some(result.articles.len()) {
                                break Termination::Completed;
                            }
                        }
                        Admission::Undated => {
                            result.skipped_count += 1;
                            debug!(url = %article.url, "skipping article without publishing date");
                        }
                        Admission::OutOfWindow => {
                            result.out_of_window_count += 1;
                            if cfg.max_articles.is_some() {
                                debug!(
                                    url = %article.url,
                                    date = ?article.publishing_date,
                                    "article outside recency window; not counted toward max_articles"
                                );
                            } else {
                                debug!(url = %article.url, date = ?article.publishing_date, "article outside recency window");
                            }
                        }
                        Admission::Filtered => {
                            result.filtered_count += 1;
                            debug!(url = %article.url, "article rejected by filter policy");
                        }
                    }
                    continue;
                }
                Some(Err(err)) => err,
            };

            match classify(&err) {
                ErrorClass::MissingData => {
                    result.skipped_count += 1;
                    debug!(error = %err, "skipping item with missing data");
                }
                ErrorClass::TransientNetwork => {
                    match self.retry_after(&mut consecutive_failures, err, &mut result, deadline, &cancel).await {
                        Retry::Again => {}
                        Retry::Stop(termination) => break termination,
                        Retry::Exhausted(error) => return Err(self.fail(error, result, started)),
                    }
                }
                ErrorClass::Fatal => {
                    warn!(error = %err, "fatal engine error");
                    return Err(self.fail(HarvestError::Fatal(err.to_string()), result, started));
                }
            }
        };

        // Dropping the stream abandons any in-flight pull.
        drop(stream);
        Ok(self.finish(result, termination, started))
    }

    /// Count one more consecutive transient failure and wait out the backoff,
    /// unless the budget is spent or the deadline or cancel wins first.
    async fn retry_after(
        &self,
        consecutive_failures: &mut u32,
        err: EngineError,
        result: &mut HarvestResult,
        deadline: Option<Instant>,
        cancel: &CancellationToken,
    ) -> Retry {
        let retry = self.config.retry;
        *consecutive_failures += 1;
        if *consecutive_failures > retry.max_attempts {
            warn!(attempts = *consecutive_failures, error = %err, "retries exhausted");
            return Retry::Exhausted(HarvestError::RetriesExhausted {
                attempts: *consecutive_failures,
                last: err,
            });
        }
        result.retry_count += 1;
        warn!(
            attempt = *consecutive_failures,
            max_attempts = retry.max_attempts,
            backoff = ?retry.backoff,
            error = %err,
            "transient network error, retrying"
        );
        match bounded(tokio::time::sleep(retry.backoff), deadline, cancel).await {
            Wake::Ready(()) => Retry::Again,
            Wake::Deadline => Retry::Stop(Termination::TimedOut),
            Wake::Cancelled => Retry::Stop(Termination::Cancelled),
        }
    }

    fn admit(&self, article: &Article, window: &RecencyWindow) -> Admission {
        match window.check(article.publishing_date) {
            Recency::Undated if self.config.undated == UndatedPolicy::Skip => return Admission::Undated,
            Recency::OutOfWindow => return Admission::OutOfWindow,
            _ => {}
        }
        if !self.config.policy.accepts(article) {
            return Admission::Filtered;
        }
        Admission::Accepted
    }

    fn finish(&self, mut result: HarvestResult, termination: Termination, started: Instant) -> HarvestResult {
        result.termination = termination;
        result.elapsed = started.elapsed();
        info!(
            state = ?termination,
            articles = result.articles.len(),
            skipped = result.skipped_count,
            out_of_window = result.out_of_window_count,
            filtered = result.filtered_count,
            retries = result.retry_count,
            elapsed = ?result.elapsed,
            "harvest finished"
        );
        result
    }

    fn fail(&self, error: HarvestError, result: HarvestResult, started: Instant) -> HarvestFailure {
        let partial = self.finish(result, Termination::Failed, started);
        HarvestFailure::with_partial(error, partial)
    }
}
