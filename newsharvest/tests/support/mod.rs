//! Shared fixtures for harvester integration tests.
#![allow(dead_code)]

use chrono::{Duration as ChronoDuration, Utc};
use futures::stream::{self, StreamExt};
use newsharvest::engine::{ArticleStream, CrawlEngine};
use newsharvest::error::EngineError;
use newsharvest::filter::{EngineFilter, SearchTarget};
use newsharvest::harvester::HarvestConfigBuilder;
use newsharvest::sources::{SourceRegistry, SourceSet};
use newsharvest::{Article, HarvestConfig};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One scripted pull.
#[derive(Debug, Clone)]
pub enum Step {
    Item(Article),
    Fail(EngineError),
    /// Sleep, then yield the article
    Delay(Duration, Article),
    /// Never return
    Hang,
    /// Yield a fresh article every interval, forever
    Repeat(Duration),
}

/// Engine that replays a fixed script and counts pulls.
pub struct ScriptedEngine {
    script: Mutex<Option<Vec<Step>>>,
    pulls: Arc<AtomicUsize>,
}

impl ScriptedEngine {
    pub fn new(script: Vec<Step>) -> Self {
        Self {
            script: Mutex::new(Some(script)),
            pulls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn pulls(&self) -> usize {
        self.pulls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl CrawlEngine for ScriptedEngine {
    async fn open_stream(
        &self,
        _sources: &SourceSet,
        _filter: EngineFilter,
        _max_articles: Option<usize>,
    ) -> Result<ArticleStream, EngineError> {
        let script: VecDeque<Step> = self
            .script
            .lock()
            .unwrap()
            .take()
            .expect("scripted engine opened twice")
            .into();
        let pulls = self.pulls.clone();
        let stream = stream::unfold((script, 0usize), move |(mut script, n)| {
            let pulls = pulls.clone();
            async move {
                pulls.fetch_add(1, Ordering::SeqCst);
                let step = script.pop_front()?;
                let item = match step {
                    Step::Item(a) => Ok(a),
                    Step::Fail(e) => Err(e),
                    Step::Delay(d, a) => {
                        tokio::time::sleep(d).await;
                        Ok(a)
                    }
                    Step::Hang => {
                        std::future::pending::<()>().await;
                        unreachable!()
                    }
                    Step::Repeat(every) => {
                        tokio::time::sleep(every).await;
                        script.push_front(Step::Repeat(every));
                        Ok(article(&format!("repeat {}", n), &format!("https://example.com/r/{}", n), 0))
                    }
                };
                Some((item, (script, n + 1)))
            }
        });
        Ok(stream.boxed())
    }
}

/// An article dated `days_ago` days before now.
pub fn article(title: &str, url: &str, days_ago: i64) -> Article {
    Article {
        title: title.to_string(),
        url: url.to_string(),
        publishing_date: Some(Utc::now() - ChronoDuration::days(days_ago) - ChronoDuration::minutes(1)),
        body: format!("{} body", title),
        authors: vec!["Staff".to_string()],
        source: "The Guardian".to_string(),
    }
}

pub fn undated(title: &str, url: &str) -> Article {
    let mut a = article(title, url, 0);
    a.publishing_date = None;
    a
}

pub fn network() -> EngineError {
    EngineError::Network("connection reset by peer".to_string())
}

pub fn sources() -> SourceSet {
    SourceRegistry::builtin().resolve(&["uk"]).expect("builtin uk collection")
}

pub fn passthrough() -> HarvestConfigBuilder {
    HarvestConfig::builder(sources(), SearchTarget::Passthrough)
}

pub fn body(terms: &[&str]) -> HarvestConfigBuilder {
    HarvestConfig::builder(sources(), SearchTarget::Body).include_terms(terms.iter().map(|t| t.to_string()).collect())
}
