//! Source registry: maps user-facing names to publisher handles.
//!
//! Names are normalized (lowercase, whitespace removed) so that
//! "The Guardian", "theguardian" and "THE GUARDIAN" resolve alike. A name is
//! either a collection ("us", "uk") or a single publisher.

use common::PublisherConfig;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::HarvestError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Publisher {
    pub name: String,
    pub collection: String,
    pub feed_url: Option<String>,
    pub sitemap_url: Option<String>,
}

impl From<&PublisherConfig> for Publisher {
    fn from(cfg: &PublisherConfig) -> Self {
        Self {
            name: cfg.name.clone(),
            collection: cfg.collection.clone(),
            feed_url: cfg.feed_url.clone(),
            sitemap_url: cfg.sitemap_url.clone(),
        }
    }
}

/// Non-empty set of publishers handed to the engine unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSet {
    publishers: Vec<Arc<Publisher>>,
}

impl SourceSet {
    pub fn publishers(&self) -> impl Iterator<Item = &Arc<Publisher>> {
        self.publishers.iter()
    }

    pub fn len(&self) -> usize {
        self.publishers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.publishers.is_empty()
    }

    /// True when `name` (any spelling) is one of the publishers in the set.
    pub fn contains_name(&self, name: &str) -> bool {
        let wanted = normalize(name);
        self.publishers.iter().any(|p| normalize(&p.name) == wanted)
    }

    pub fn names(&self) -> Vec<String> {
        self.publishers.iter().map(|p| p.name.clone()).collect()
    }
}

/// Serializable view of the registry for `/api/v1/sources` and `sources`.
#[derive(Debug, Clone, Serialize)]
pub struct SourceListing {
    pub collections: BTreeMap<String, Vec<String>>,
    pub publishers: Vec<Publisher>,
}

pub fn normalize(name: &str) -> String {
    name.split_whitespace().collect::<String>().to_lowercase()
}

#[derive(Debug, Clone)]
pub struct SourceRegistry {
    publishers: BTreeMap<String, Arc<Publisher>>,
    collections: BTreeMap<String, Vec<Arc<Publisher>>>,
    /// Publishers in declaration order, for stable listings
    ordered: Vec<Arc<Publisher>>,
}

impl SourceRegistry {
    pub fn new(publishers: Vec<Publisher>) -> Self {
        let mut registry = Self {
            publishers: BTreeMap::new(),
            collections: BTreeMap::new(),
            ordered: Vec::new(),
        };
        for publisher in publishers {
            let key = normalize(&publisher.name);
            if registry.publishers.contains_key(&key) {
                tracing::warn!(publisher = %publisher.name, "duplicate publisher name ignored");
                continue;
            }
            let handle = Arc::new(publisher);
            registry
                .collections
                .entry(normalize(&handle.collection))
                .or_default()
                .push(handle.clone());
            registry.publishers.insert(key, handle.clone());
            registry.ordered.push(handle);
        }
        registry
    }

    /// Registry from `[[publishers]]`, or the built-in list when none are configured.
    pub fn from_config(publishers: &[PublisherConfig]) -> Self {
        if publishers.is_empty() {
            return Self::builtin();
        }
        Self::new(publishers.iter().map(Publisher::from).collect())
    }

    pub fn builtin() -> Self {
        let entry = |name: &str, collection: &str, feed: &str, sitemap: Option<&str>| Publisher {
            name: name.to_string(),
            collection: collection.to_string(),
            feed_url: Some(feed.to_string()),
            sitemap_url: sitemap.map(str::to_string),
        };
        Self::new(vec![
            entry(
                "The New Yorker",
                "us",
                "https://www.newyorker.com/feed/everything",
                Some("https://www.newyorker.com/feed/google-news-sitemap-feed/sitemap-google-news"),
            ),
            entry("Wired", "us", "https://www.wired.com/feed/rss", None),
            entry("NPR", "us", "https://feeds.npr.org/1001/rss.xml", None),
            entry(
                "Washington Times",
                "us",
                "https://www.washingtontimes.com/rss/headlines/news/",
                None,
            ),
            entry(
                "The Guardian",
                "uk",
                "https://www.theguardian.com/world/rss",
                Some("https://www.theguardian.com/sitemaps/news.xml"),
            ),
            entry("BBC", "uk", "https://feeds.bbci.co.uk/news/rss.xml", None),
            entry("The Independent", "uk", "https://www.independent.co.uk/news/rss", None),
        ])
    }

    /// Resolve collection and publisher names into a [`SourceSet`].
    ///
    /// Duplicates collapse; order follows the names given. Any unknown name fails
    /// the whole resolution with the list of valid names.
    pub fn resolve<S: AsRef<str>>(&self, names: &[S]) -> Result<SourceSet, HarvestError> {
        let mut set: Vec<Arc<Publisher>> = Vec::new();
        for name in names {
            let key = normalize(name.as_ref());
            let found: Vec<Arc<Publisher>> = if let Some(members) = self.collections.get(&key) {
                members.clone()
            } else if let Some(publisher) = self.publishers.get(&key) {
                vec![publisher.clone()]
            } else {
                return Err(self.invalid(name.as_ref()));
            };
            for publisher in found {
                if !set.iter().any(|p| Arc::ptr_eq(p, &publisher)) {
                    set.push(publisher);
                }
            }
        }
        if set.is_empty() {
            return Err(HarvestError::Configuration("no sources given".into()));
        }
        Ok(SourceSet { publishers: set })
    }

    /// Resolve exactly one publisher; collection names are not accepted.
    pub fn publisher(&self, name: &str) -> Result<SourceSet, HarvestError> {
        self.publishers
            .get(&normalize(name))
            .map(|p| SourceSet {
                publishers: vec![p.clone()],
            })
            .ok_or_else(|| self.invalid(name))
    }

    /// Every name `resolve` accepts: collections first, then publishers.
    pub fn valid_names(&self) -> Vec<String> {
        self.collections
            .keys()
            .cloned()
            .chain(self.ordered.iter().map(|p| p.name.clone()))
            .collect()
    }

    pub fn listing(&self) -> SourceListing {
        SourceListing {
            collections: self
                .collections
                .iter()
                .map(|(k, v)| (k.clone(), v.iter().map(|p| p.name.clone()).collect()))
                .collect(),
            publishers: self.ordered.iter().map(|p| p.as_ref().clone()).collect(),
        }
    }

    fn invalid(&self, name: &str) -> HarvestError {
        HarvestError::InvalidSource {
            name: name.to_string(),
            valid: self.valid_names(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_names_regardless_of_case_and_spacing() {
        let reg = SourceRegistry::builtin();
        for name in ["The Guardian", "theguardian", "THE  GUARDIAN"] {
            let set = reg.resolve(&[name]).expect(name);
            assert_eq!(set.names(), vec!["The Guardian"]);
        }
    }

    #[test]
    fn collections_expand_and_deduplicate() {
        let reg = SourceRegistry::builtin();
        let set = reg.resolve(&["uk", "The Guardian", "us"]).unwrap();
        let names = set.names();
        assert_eq!(names.iter().filter(|n| *n == "The Guardian").count(), 1);
        assert!(set.contains_name("wired"));
        assert_eq!(set.len(), reg.listing().publishers.len());
    }

    #[test]
    fn unknown_source_lists_valid_names() {
        let reg = SourceRegistry::builtin();
        let err = reg.resolve(&["Daily Planet"]).unwrap_err();
        match err {
            HarvestError::InvalidSource { name, valid } => {
                assert_eq!(name, "Daily Planet");
                assert!(valid.contains(&"us".to_string()));
                assert!(valid.contains(&"The New Yorker".to_string()));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn empty_name_list_is_a_configuration_error() {
        let reg = SourceRegistry::builtin();
        let names: [&str; 0] = [];
        assert_eq!(reg.resolve(&names).unwrap_err().category(), "configuration");
    }

    #[test]
    fn single_publisher_rejects_collections() {
        let reg = SourceRegistry::builtin();
        assert!(reg.publisher("newyorker").is_err());
        assert!(reg.publisher("The New Yorker").is_ok());
        assert!(reg.publisher("us").is_err());
    }

    #[test]
    fn configured_publishers_replace_builtin_list() {
        let reg = SourceRegistry::from_config(&[PublisherConfig {
            name: "Local Gazette".into(),
            collection: "local".into(),
            feed_url: Some("http://localhost/rss".into()),
            sitemap_url: None,
        }]);
        assert!(reg.resolve(&["local"]).is_ok());
        assert!(reg.resolve(&["uk"]).is_err());
    }
}
