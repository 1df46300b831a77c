/*!
common/src/lib.rs

Shared configuration types for newsharvest.

This file provides:
- Config data structures (deserialized from TOML)
- An async loader for a TOML config file, with a default + override merge
*/

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// HTTP server section (`[server]`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address rocket binds to (e.g. "127.0.0.1")
    pub bind: Option<String>,
    pub port: Option<u16>,
}

/// Which crawl engine implementation serves harvests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// Fetch publisher feeds and article pages over the network
    #[default]
    Live,
    /// Serve the built-in offline corpus
    Mock,
}

/// What to do with articles that carry no publishing date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UndatedPolicy {
    /// Treat as missing data: skip and count in `skippedCount`
    #[default]
    Skip,
    /// Treat as in-window
    Accept,
}

/// Harvest defaults (`[harvest]`)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestDefaults {
    pub engine: EngineKind,
    /// Collection or publisher names used when a request names no sources
    pub default_sources: Vec<String>,
    pub days_back: u32,
    pub max_articles: Option<usize>,
    /// Run-time budget for CLI harvests; `None` means unbounded
    pub timeout_seconds: Option<u64>,
    /// Budget applied by the HTTP server when a request omits `timeout`
    pub server_timeout_seconds: u64,
    pub retry_attempts: u32,
    pub retry_backoff_ms: u64,
    pub undated_articles: UndatedPolicy,
}

impl Default for HarvestDefaults {
    fn default() -> Self {
        Self {
            engine: EngineKind::Live,
            default_sources: vec!["us".to_string(), "uk".to_string()],
            days_back: 7,
            max_articles: None,
            timeout_seconds: None,
            server_timeout_seconds: 25,
            retry_attempts: 3,
            retry_backoff_ms: 1000,
            undated_articles: UndatedPolicy::Skip,
        }
    }
}

impl HarvestDefaults {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// Politeness / fetching configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolitenessConfig {
    pub fetch_timeout_seconds: u64,
    pub user_agent: String,
    /// Upper bound on entries taken from a single feed or sitemap
    pub max_entries_per_feed: usize,
}

impl Default for PolitenessConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_seconds: 10,
            user_agent: "newsharvest/0.1.0".to_string(),
            max_entries_per_feed: 200,
        }
    }
}

/// Term presets the CLI falls back to when no terms are given (`[presets]`)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PresetConfig {
    pub body_terms: Vec<String>,
    pub url_include: Vec<String>,
    pub url_exclude: Vec<String>,
}

impl Default for PresetConfig {
    fn default() -> Self {
        Self {
            body_terms: ["pollution", "environmental", "climate crisis", "EPA", "coral", "reef"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            url_include: vec!["coral".to_string(), "climate".to_string()],
            url_exclude: vec!["advertisement".to_string(), "podcast".to_string()],
        }
    }
}

/// Publisher descriptor (`[[publishers]]`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublisherConfig {
    pub name: String,
    /// Collection the publisher belongs to (e.g. "us", "uk")
    pub collection: String,
    pub feed_url: Option<String>,
    pub sitemap_url: Option<String>,
}

/// Top-level application configuration (deserialized from config.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub server: Option<ServerConfig>,
    #[serde(default)]
    pub harvest: HarvestDefaults,
    #[serde(default)]
    pub politeness: PolitenessConfig,
    #[serde(default)]
    pub presets: PresetConfig,
    /// When empty, the built-in publisher list is used
    #[serde(default)]
    pub publishers: Vec<PublisherConfig>,
}

impl Config {
    /// Load configuration from a TOML file asynchronously.
    ///
    /// Example:
    ///   let cfg = Config::from_file("config.toml").await?;
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = tokio::fs::read_to_string(path.as_ref())
            .await
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        let cfg: Config = toml::from_str(&data).context("Failed to parse TOML configuration")?;
        Ok(cfg)
    }

    /// Load configuration with an optional default file and an optional override file.
    /// If both are present, they are merged (override takes precedence). Missing files
    /// are skipped, so with neither present the built-in defaults are returned.
    pub async fn load_with_defaults(default_path: Option<&Path>, override_path: Option<&Path>) -> Result<Self> {
        let mut config_value = toml::Value::Table(toml::map::Map::new());

        for (path, label) in [(default_path, "default"), (override_path, "override")] {
            let Some(path) = path else { continue };
            if !path.exists() {
                continue;
            }
            let data = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read {} config: {}", label, path.display()))?;
            let val: toml::Value = toml::from_str(&data)
                .with_context(|| format!("Failed to parse {} configuration", label))?;
            merge_toml(&mut config_value, val);
        }

        let cfg: Config = config_value.try_into().context("Failed to parse merged configuration")?;
        Ok(cfg)
    }
}

fn merge_toml(a: &mut toml::Value, b: toml::Value) {
    match (a, b) {
        (toml::Value::Table(a_map), toml::Value::Table(b_map)) => {
            for (k, v) in b_map {
                if let Some(a_val) = a_map.get_mut(&k) {
                    merge_toml(a_val, v);
                } else {
                    a_map.insert(k, v);
                }
            }
        }
        (a_val, b_val) => *a_val = b_val,
    }
}

/// Split comma-separated values and drop blanks: `["a,b", " c "]` -> `["a", "b", "c"]`.
///
/// Used for both repeated query parameters and comma lists from the CLI.
pub fn split_terms<S: AsRef<str>>(values: &[S]) -> Vec<String> {
    values
        .iter()
        .flat_map(|v| v.as_ref().split(','))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn config_from_string_uses_section_defaults() {
        let toml = r#"
            [server]
            bind = "0.0.0.0"
            port = 8080

            [harvest]
            engine = "mock"
            days_back = 3

            [[publishers]]
            name = "The Guardian"
            collection = "uk"
            feed_url = "https://www.theguardian.com/world/rss"
        "#;

        let cfg: Config = toml::from_str(toml).expect("parse config");
        assert_eq!(cfg.harvest.engine, EngineKind::Mock);
        assert_eq!(cfg.harvest.days_back, 3);
        assert_eq!(cfg.harvest.retry_attempts, 3);
        assert_eq!(cfg.harvest.undated_articles, UndatedPolicy::Skip);
        assert_eq!(cfg.server.as_ref().and_then(|s| s.port), Some(8080));
        assert_eq!(cfg.publishers.len(), 1);
        assert_eq!(cfg.presets.url_exclude, vec!["advertisement", "podcast"]);
    }

    #[test]
    fn empty_document_is_valid() {
        let cfg: Config = toml::from_str("").expect("parse empty");
        assert_eq!(cfg.harvest.default_sources, vec!["us", "uk"]);
        assert_eq!(cfg.politeness.fetch_timeout_seconds, 10);
        assert!(cfg.publishers.is_empty());
    }

    #[tokio::test]
    async fn override_file_wins_over_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let default_path = dir.path().join("config.default.toml");
        let override_path = dir.path().join("config.toml");

        let mut f = std::fs::File::create(&default_path).unwrap();
        writeln!(f, "[harvest]\ndays_back = 7\nretry_attempts = 5").unwrap();
        let mut f = std::fs::File::create(&override_path).unwrap();
        writeln!(f, "[harvest]\ndays_back = 2\nundated_articles = \"accept\"").unwrap();

        let cfg = Config::load_with_defaults(Some(&default_path), Some(&override_path))
            .await
            .expect("load");
        assert_eq!(cfg.harvest.days_back, 2);
        assert_eq!(cfg.harvest.retry_attempts, 5);
        assert_eq!(cfg.harvest.undated_articles, UndatedPolicy::Accept);
    }

    #[tokio::test]
    async fn missing_files_fall_back_to_defaults() {
        let cfg = Config::load_with_defaults(Some(Path::new("/nonexistent/a.toml")), None)
            .await
            .expect("load");
        assert_eq!(cfg.harvest.engine, EngineKind::Live);
    }

    #[test]
    fn split_terms_handles_commas_and_repeats() {
        let terms = split_terms(&["test,python", " coding ", ","]);
        assert_eq!(terms, vec!["test", "python", "coding"]);
    }
}
