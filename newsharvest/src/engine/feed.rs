//! Live engine: publisher feeds and news sitemaps in, extracted articles out.
//!
//! The stream is a small state machine. Each pull either discovers the next
//! publisher's candidates or fetches and extracts the next candidate page.
//! A transient failure is returned as an error and leaves the failed step at
//! the head of its queue, so the next pull retries exactly that step.

use chrono::{DateTime, Utc};
use common::PolitenessConfig;
use futures::stream::{self, StreamExt};
use reqwest::Client;
use scraper::{Html, Selector};
use std::collections::{HashSet, VecDeque};
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::sitemap;
use super::{ArticleStream, CrawlEngine};
use crate::classify::classify;
use crate::error::{EngineError, ErrorClass};
use crate::filter::{EngineFilter, Recency};
use crate::model::Article;
use crate::sources::{Publisher, SourceSet};

/// Child sitemaps followed from a sitemap index
const MAX_CHILD_SITEMAPS: usize = 3;

pub struct FeedEngine {
    client: Client,
    max_entries: usize,
}

impl FeedEngine {
    pub fn new(politeness: &PolitenessConfig) -> Result<Self, EngineError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(politeness.fetch_timeout_seconds))
            .user_agent(politeness.user_agent.clone())
            .build()
            .map_err(|e| EngineError::Other(format!("failed to build http client: {}", e)))?;
        Ok(Self {
            client,
            max_entries: politeness.max_entries_per_feed,
        })
    }
}

#[async_trait::async_trait]
impl CrawlEngine for FeedEngine {
    async fn open_stream(
        &self,
        sources: &SourceSet,
        filter: EngineFilter,
        max_articles: Option<usize>,
    ) -> Result<ArticleStream, EngineError> {
        let crawl = Crawl {
            client: self.client.clone(),
            publishers: sources.publishers().cloned().collect(),
            candidates: VecDeque::new(),
            seen: HashSet::new(),
            filter,
            remaining: max_articles,
            max_entries: self.max_entries,
        };
        let stream = stream::unfold(crawl, |mut crawl| async move {
            let item = crawl.next_item().await?;
            Some((item, crawl))
        });
        Ok(stream.boxed())
    }
}

/// A page discovered from a feed or sitemap, not fetched yet.
#[derive(Debug, Clone)]
struct Candidate {
    url: String,
    published: Option<DateTime<Utc>>,
    title: Option<String>,
    authors: Vec<String>,
    source: String,
}

struct Crawl {
    client: Client,
    publishers: VecDeque<Arc<Publisher>>,
    candidates: VecDeque<Candidate>,
    seen: HashSet<String>,
    filter: EngineFilter,
    remaining: Option<usize>,
    max_entries: usize,
}

impl Crawl {
    async fn next_item(&mut self) -> Option<Result<Article, EngineError>> {
        loop {
            if self.remaining == Some(0) {
                return None;
            }

            if let Some(candidate) = self.candidates.front().cloned() {
                match fetch_article(&self.client, &candidate).await {
                    Ok(article) => {
                        self.candidates.pop_front();
                        if !self.filter.policy.accepts(&article) {
                            debug!(url = %article.url, "feed: extracted article rejected by policy");
                            continue;
                        }
                        match self.filter.window.check(article.publishing_date) {
                            Recency::OutOfWindow => {
                                debug!(url = %article.url, date = ?article.publishing_date, "feed: page date outside window");
                                continue;
                            }
                            // not counted; the harvester decides whether undated articles are kept
                            Recency::Undated => return Some(Ok(article)),
                            Recency::InWindow => {}
                        }
                        if let Some(n) = self.remaining.as_mut() {
                            *n -= 1;
                        }
                        return Some(Ok(article));
                    }
                    Err(err) => match classify(&err) {
                        // stays queued; the next pull retries it
                        ErrorClass::TransientNetwork => return Some(Err(err)),
                        ErrorClass::MissingData => {
                            self.candidates.pop_front();
                            return Some(Err(err));
                        }
                        ErrorClass::Fatal => {
                            self.candidates.pop_front();
                            if let EngineError::HttpStatus { status, .. } = err {
                                warn!(url = %candidate.url, status, "feed: page unavailable, skipping");
                                continue;
                            }
                            return Some(Err(err));
                        }
                    },
                }
            }

            let publisher = self.publishers.front().cloned()?;
            match self.discover(&publisher).await {
                Ok(found) => {
                    self.publishers.pop_front();
                    let total = found.len();
                    let mut kept = 0usize;
                    for candidate in found {
                        if !self.seen.insert(candidate.url.clone()) {
                            continue;
                        }
                        if self.filter.prunes_candidate(&candidate.url, candidate.published) {
                            continue;
                        }
                        self.candidates.push_back(candidate);
                        kept += 1;
                    }
                    info!(publisher = %publisher.name, total, kept, "feed: candidates discovered");
                }
                Err(err) if classify(&err) == ErrorClass::TransientNetwork => return Some(Err(err)),
                Err(err) => {
                    self.publishers.pop_front();
                    warn!(publisher = %publisher.name, error = %err, "feed: discovery failed, skipping publisher");
                }
            }
        }
    }

    async fn discover(&self, publisher: &Publisher) -> Result<Vec<Candidate>, EngineError> {
        let mut found = Vec::new();

        if let Some(feed_url) = &publisher.feed_url {
            let bytes = fetch_bytes(&self.client, feed_url).await?;
            found.extend(parse_feed(&bytes, &publisher.name, self.max_entries)?);
        }

        if let Some(sitemap_url) = &publisher.sitemap_url {
            let text = fetch_text(&self.client, sitemap_url).await?;
            let parsed = sitemap::parse(&text, self.max_entries)?;
            let mut entries = parsed.entries;
            for child in parsed.children.iter().take(MAX_CHILD_SITEMAPS) {
                let text = fetch_text(&self.client, child).await?;
                entries.extend(sitemap::parse(&text, self.max_entries)?.entries);
            }
            found.extend(entries.into_iter().take(self.max_entries).map(|e| Candidate {
                url: e.loc,
                published: e.published,
                title: e.title,
                authors: Vec::new(),
                source: publisher.name.clone(),
            }));
        }

        if publisher.feed_url.is_none() && publisher.sitemap_url.is_none() {
            warn!(publisher = %publisher.name, "feed: publisher has neither feed nor sitemap");
        }
        Ok(found)
    }
}

async fn get(client: &Client, url: &str) -> Result<reqwest::Response, EngineError> {
    debug!(url, "feed: GET");
    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(EngineError::HttpStatus {
            status: status.as_u16(),
            url: url.to_string(),
        });
    }
    Ok(response)
}

async fn fetch_bytes(client: &Client, url: &str) -> Result<Vec<u8>, EngineError> {
    let bytes = get(client, url).await?.bytes().await?;
    Ok(bytes.to_vec())
}

async fn fetch_text(client: &Client, url: &str) -> Result<String, EngineError> {
    Ok(get(client, url).await?.text().await?)
}

fn parse_feed(bytes: &[u8], source: &str, limit: usize) -> Result<Vec<Candidate>, EngineError> {
    let feed = feed_rs::parser::parse(bytes).map_err(|e| EngineError::Malformed(format!("feed: {}", e)))?;
    Ok(feed
        .entries
        .into_iter()
        .filter_map(|entry| {
            let url = entry.links.first()?.href.clone();
            Some(Candidate {
                url,
                published: entry.published.or(entry.updated),
                title: entry.title.map(|t| t.content),
                authors: entry.authors.into_iter().map(|p| p.name).collect(),
                source: source.to_string(),
            })
        })
        .take(limit)
        .collect())
}

async fn fetch_article(client: &Client, candidate: &Candidate) -> Result<Article, EngineError> {
    let bytes = fetch_bytes(client, &candidate.url).await?;
    extract_article(&bytes, candidate)
}

/// Pull title, body, date and authors out of an article page.
///
/// Feed metadata wins over what the page says; the page only fills gaps.
fn extract_article(bytes: &[u8], candidate: &Candidate) -> Result<Article, EngineError> {
    let url = url::Url::parse(&candidate.url)
        .map_err(|e| EngineError::Malformed(format!("bad article url {}: {}", candidate.url, e)))?;
    let html = String::from_utf8_lossy(bytes);

    let mut reader = Cursor::new(bytes);
    let product = readability::extractor::extract(&mut reader, &url)
        .map_err(|e| EngineError::Malformed(format!("readability failed for {}: {}", candidate.url, e)))?;

    let body = match html2text::from_read(product.content.as_bytes(), 80) {
        Ok(text) => text,
        Err(e) => {
            warn!(url = %candidate.url, error = %e, "feed: html to text conversion failed, using plain text");
            product.text
        }
    };
    let body = body.trim().to_string();
    if body.is_empty() {
        return Err(EngineError::MissingField {
            field: "body",
            url: candidate.url.clone(),
        });
    }

    let title = candidate
        .title
        .clone()
        .filter(|t| !t.trim().is_empty())
        .unwrap_or(product.title);
    if title.trim().is_empty() {
        return Err(EngineError::MissingField {
            field: "title",
            url: candidate.url.clone(),
        });
    }

    let meta = page_meta(&html);
    let authors = if candidate.authors.is_empty() {
        meta.authors
    } else {
        candidate.authors.clone()
    };

    Ok(Article {
        title: title.trim().to_string(),
        url: candidate.url.clone(),
        publishing_date: candidate.published.or(meta.published),
        body,
        authors,
        source: candidate.source.clone(),
    })
}

struct PageMeta {
    published: Option<DateTime<Utc>>,
    authors: Vec<String>,
}

const PUBLISHED_SELECTORS: [&str; 6] = [
    r#"meta[property="article:published_time"]"#,
    r#"meta[property="og:published_time"]"#,
    r#"meta[itemprop="datePublished"]"#,
    r#"meta[name="pubdate"]"#,
    r#"meta[name="publish-date"]"#,
    "time[datetime]",
];

/// Date and byline from `<meta>` / `<time>` tags.
fn page_meta(html: &str) -> PageMeta {
    let document = Html::parse_document(html);

    let published = PUBLISHED_SELECTORS
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .find_map(|selector| {
            document.select(&selector).find_map(|el| {
                el.value()
                    .attr("content")
                    .or_else(|| el.value().attr("datetime"))
                    .and_then(sitemap::parse_date)
            })
        });

    let authors = match Selector::parse(r#"meta[name="author"]"#) {
        Ok(selector) => document
            .select(&selector)
            .filter_map(|el| el.value().attr("content"))
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .collect(),
        Err(_) => Vec::new(),
    };

    PageMeta { published, authors }
}
