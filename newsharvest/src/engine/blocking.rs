//! Adapter for collaborators that only offer a synchronous iterator.
//!
//! The iterator runs on a blocking thread and hands items over a bounded
//! channel. The harvester can abandon the stream at any time by dropping it;
//! the thread notices on its next send and exits. A pull that is already
//! blocked inside the iterator cannot be interrupted, so the thread (and
//! whatever the iterator holds) outlives the harvest until that pull returns.

use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;

use super::{ArticleStream, CrawlEngine};
use crate::error::EngineError;
use crate::filter::EngineFilter;
use crate::model::Article;
use crate::sources::SourceSet;

pub type BlockingIter = Box<dyn Iterator<Item = Result<Article, EngineError>> + Send>;

/// A crawl collaborator whose pulls block the calling thread.
pub trait BlockingCrawler: Send + Sync + 'static {
    fn crawl(&self, sources: &SourceSet, filter: &EngineFilter, max_articles: Option<usize>) -> BlockingIter;
}

pub struct BlockingIterEngine<C> {
    crawler: Arc<C>,
    /// Items the thread may pull ahead of the consumer
    buffer: usize,
}

impl<C: BlockingCrawler> BlockingIterEngine<C> {
    pub fn new(crawler: C) -> Self {
        Self {
            crawler: Arc::new(crawler),
            buffer: 1,
        }
    }

    pub fn with_buffer(mut self, buffer: usize) -> Self {
        self.buffer = buffer.max(1);
        self
    }
}

#[async_trait::async_trait]
impl<C: BlockingCrawler> CrawlEngine for BlockingIterEngine<C> {
    async fn open_stream(
        &self,
        sources: &SourceSet,
        filter: EngineFilter,
        max_articles: Option<usize>,
    ) -> Result<ArticleStream, EngineError> {
        let (tx, rx) = mpsc::channel(self.buffer);
        let crawler = self.crawler.clone();
        let sources = sources.clone();

        tokio::task::spawn_blocking(move || {
            for item in crawler.crawl(&sources, &filter, max_articles) {
                if tx.blocking_send(item).is_err() {
                    tracing::debug!("blocking crawler: consumer dropped, stopping");
                    return;
                }
            }
            tracing::debug!("blocking crawler: iterator exhausted");
        });

        let stream = stream::unfold(rx, |mut rx| async move {
            let item = rx.recv().await?;
            Some((item, rx))
        });
        Ok(stream.boxed())
    }
}
