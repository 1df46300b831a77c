//! Crawl engines: the collaborators that turn a [`SourceSet`] into a lazy
//! stream of extracted articles.
//!
//! The harvester only sees [`CrawlEngine`]. Which implementation runs is
//! decided once, when the [`EngineFactory`] is constructed.

use futures::stream::BoxStream;
use std::sync::Arc;

use crate::error::EngineError;
use crate::filter::EngineFilter;
use crate::model::Article;
use crate::sources::SourceSet;

pub mod blocking;
pub mod feed;
pub mod mock;
pub mod sitemap;

pub use blocking::BlockingIterEngine;
pub use feed::FeedEngine;
pub use mock::MockEngine;

/// Lazy, possibly endless sequence of articles. Pulling may fail, and may
/// take arbitrarily long.
///
/// After a transient error the stream stays usable: the next pull re-attempts
/// the step that failed.
pub type ArticleStream = BoxStream<'static, Result<Article, EngineError>>;

#[async_trait::async_trait]
pub trait CrawlEngine: Send + Sync {
    /// Open a filtered stream over `sources`.
    ///
    /// `filter` lets the engine prune candidates before extraction; the
    /// harvester re-checks every item regardless. `max_articles` is a hint,
    /// the engine may stop early once it has yielded that many.
    async fn open_stream(
        &self,
        sources: &SourceSet,
        filter: EngineFilter,
        max_articles: Option<usize>,
    ) -> Result<ArticleStream, EngineError>;
}

/// Builds a fresh engine for every harvest.
pub trait EngineFactory: Send + Sync {
    fn create(&self) -> Result<Box<dyn CrawlEngine>, EngineError>;

    /// Short name reported by the status endpoint
    fn kind(&self) -> &'static str;
}

/// Factory for the live feed engine.
pub struct FeedEngineFactory {
    politeness: common::PolitenessConfig,
}

impl FeedEngineFactory {
    pub fn new(politeness: common::PolitenessConfig) -> Self {
        Self { politeness }
    }
}

impl EngineFactory for FeedEngineFactory {
    fn create(&self) -> Result<Box<dyn CrawlEngine>, EngineError> {
        Ok(Box::new(FeedEngine::new(&self.politeness)?))
    }

    fn kind(&self) -> &'static str {
        "live"
    }
}

pub struct MockEngineFactory;

impl EngineFactory for MockEngineFactory {
    fn create(&self) -> Result<Box<dyn CrawlEngine>, EngineError> {
        Ok(Box::new(MockEngine::new()))
    }

    fn kind(&self) -> &'static str {
        "mock"
    }
}

/// Pick the factory named by configuration.
pub fn factory_for(kind: common::EngineKind, politeness: &common::PolitenessConfig) -> Arc<dyn EngineFactory> {
    match kind {
        common::EngineKind::Live => Arc::new(FeedEngineFactory::new(politeness.clone())),
        common::EngineKind::Mock => Arc::new(MockEngineFactory),
    }
}
