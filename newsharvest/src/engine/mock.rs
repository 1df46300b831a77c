//! Offline engine over a fixed five-article corpus.
//!
//! Deterministic apart from the dates, which are relative to the moment the
//! stream is opened (1 to 5 days ago).

use chrono::{Duration, Utc};
use futures::stream;

use super::{ArticleStream, CrawlEngine};
use crate::error::EngineError;
use crate::filter::{EngineFilter, Recency};
use crate::model::Article;
use crate::sources::SourceSet;

struct Fixture {
    title: &'static str,
    url: &'static str,
    body: &'static str,
    source: &'static str,
    days_ago: i64,
    authors: &'static [&'static str],
}

const CORPUS: &[Fixture] = &[
    Fixture {
        title: "Climate Change: A Global Challenge",
        url: "https://example.com/climate-change",
        body: "Climate change continues to be a pressing issue. Scientists warn about rising \
               temperatures and their impact on ecosystems. Recent studies show concerning trends \
               in global warming.",
        source: "The Guardian",
        days_ago: 1,
        authors: &["Emma Thompson", "James Wilson"],
    },
    Fixture {
        title: "Tech Giants Face New Regulations",
        url: "https://example.com/tech-regulations",
        body: "Major technology companies are facing increased scrutiny over data privacy and market \
               dominance. Lawmakers propose new regulations to address concerns.",
        source: "The New Yorker",
        days_ago: 2,
        authors: &["Sarah Chen"],
    },
    Fixture {
        title: "Advances in AI Technology",
        url: "https://example.com/ai-advances",
        body: "Artificial intelligence continues to evolve with new breakthroughs in machine learning \
               and neural networks. Researchers develop more efficient algorithms that are \
               transforming industries across the globe.\n\nComputer vision has also seen remarkable \
               progress, with AI systems now able to identify objects, people, and even emotions with \
               near-human accuracy.",
        source: "Wired",
        days_ago: 3,
        authors: &["Michael Rodriguez", "David Kim", "Lisa Patel"],
    },
    Fixture {
        title: "Healthcare Innovation During Pandemic",
        url: "https://example.com/healthcare-innovation",
        body: "The healthcare sector has seen rapid innovation in response to global challenges. \
               Telemedicine and digital health solutions have become mainstream, fundamentally \
               transforming how medical care is delivered and accessed worldwide.",
        source: "The Guardian",
        days_ago: 4,
        authors: &["Dr. Rachel Foster"],
    },
    Fixture {
        title: "Sustainable Energy Solutions",
        url: "https://example.com/sustainable-energy",
        body: "Renewable energy adoption continues to grow worldwide. Solar and wind power \
               installations reach record levels as costs decrease.\n\nThe future of sustainable \
               energy looks promising, helping to mitigate climate change while powering economic \
               growth.",
        source: "The New Yorker",
        days_ago: 5,
        authors: &["Alex Green", "Maria Santos"],
    },
];

#[derive(Debug, Default, Clone)]
pub struct MockEngine;

impl MockEngine {
    pub fn new() -> Self {
        Self
    }

    /// The full corpus, dated relative to now, before any filtering.
    pub fn corpus() -> Vec<Article> {
        let now = Utc::now();
        CORPUS
            .iter()
            .map(|f| Article {
                title: f.title.to_string(),
                url: f.url.to_string(),
                publishing_date: Some(now - Duration::days(f.days_ago)),
                body: f.body.to_string(),
                authors: f.authors.iter().map(|a| a.to_string()).collect(),
                source: f.source.to_string(),
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl CrawlEngine for MockEngine {
    async fn open_stream(
        &self,
        sources: &SourceSet,
        filter: EngineFilter,
        max_articles: Option<usize>,
    ) -> Result<ArticleStream, EngineError> {
        let mut selected = Vec::new();
        for article in Self::corpus() {
            if !sources.contains_name(&article.source) {
                tracing::debug!(title = %article.title, source = %article.source, "mock: source not requested");
                continue;
            }
            if filter.window.check(article.publishing_date) == Recency::OutOfWindow {
                tracing::debug!(title = %article.title, "mock: too old");
                continue;
            }
            if !filter.policy.accepts(&article) {
                continue;
            }
            selected.push(article);
            if max_articles.is_some_and(|max| selected.len() >= max) {
                break;
            }
        }
        tracing::info!(articles = selected.len(), "mock: corpus filtered");
        Ok(Box::pin(stream::iter(selected.into_iter().map(Ok))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{FilterPolicy, RecencyWindow, SearchTarget};
    use crate::sources::SourceRegistry;
    use futures::StreamExt;
    use std::sync::Arc;

    fn filter(target: SearchTarget, include: &[&str], days: u32) -> EngineFilter {
        let include: Vec<String> = include.iter().map(|s| s.to_string()).collect();
        EngineFilter {
            policy: Arc::new(FilterPolicy::build(target, &include, &[]).unwrap().policy),
            window: RecencyWindow::last_days(Utc::now(), days),
        }
    }

    #[tokio::test]
    async fn body_search_returns_matching_articles_in_corpus_order() {
        let sources = SourceRegistry::builtin().resolve(&["us", "uk"]).unwrap();
        let stream = MockEngine::new()
            .open_stream(&sources, filter(SearchTarget::Body, &["climate"], 7), None)
            .await
            .unwrap();
        let titles: Vec<String> = stream.map(|a| a.unwrap().title).collect().await;
        assert_eq!(titles, vec!["Climate Change: A Global Challenge", "Sustainable Energy Solutions"]);
    }

    #[tokio::test]
    async fn respects_sources_window_and_max() {
        let sources = SourceRegistry::builtin().resolve(&["The Guardian"]).unwrap();
        let stream = MockEngine::new()
            .open_stream(&sources, filter(SearchTarget::Passthrough, &[], 2), Some(5))
            .await
            .unwrap();
        let items: Vec<_> = stream.collect().await;
        assert_eq!(items.len(), 1);

        let all = SourceRegistry::builtin().resolve(&["us", "uk"]).unwrap();
        let stream = MockEngine::new()
            .open_stream(&all, filter(SearchTarget::Passthrough, &[], 7), Some(2))
            .await
            .unwrap();
        assert_eq!(stream.count().await, 2);
    }
}
