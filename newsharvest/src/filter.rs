//! Filter policies: which articles a harvest keeps.
//!
//! A [`FilterPolicy`] is built once per harvest from the user's terms. It is
//! handed to the engine (inside an [`EngineFilter`]) so candidates can be
//! pruned before extraction, and re-applied by the harvester to every item
//! the engine yields. The [`RecencyWindow`] is policy-independent.

use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::HarvestError;
use crate::model::Article;

/// What the include/exclude terms are matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchTarget {
    /// Title + body text, any include term
    Body,
    /// Canonical URL, exclude alternation vs. all include terms
    Url,
    /// No term matching; recency only
    Passthrough,
}

/// Matches title + body case-insensitively; passes if any term occurs.
#[derive(Debug, Clone)]
pub struct BodyPolicy {
    terms: Vec<String>,
}

impl BodyPolicy {
    fn matches(&self, title: &str, body: &str) -> bool {
        let text = format!("{} {}", title, body).to_lowercase();
        self.terms.iter().any(|t| text.contains(t.as_str()))
    }
}

/// Matches the URL against regex terms, case-sensitively.
///
/// Accepts when the URL does not match the exclude alternation, or when it
/// matches every include term: inclusion overrides exclusion.
#[derive(Debug, Clone)]
pub struct UrlPolicy {
    exclude: Option<Regex>,
    include: Vec<Regex>,
}

impl UrlPolicy {
    pub fn is_excluded(&self, url: &str) -> bool {
        self.exclude.as_ref().is_some_and(|re| re.is_match(url))
    }

    pub fn is_fully_included(&self, url: &str) -> bool {
        self.include.iter().all(|re| re.is_match(url))
    }

    fn matches(&self, url: &str) -> bool {
        !self.is_excluded(url) || self.is_fully_included(url)
    }
}

#[derive(Debug, Clone)]
pub enum FilterPolicy {
    Body(BodyPolicy),
    Url(UrlPolicy),
    Passthrough,
}

/// A policy plus any notices produced while building it.
#[derive(Debug, Clone)]
pub struct BuiltPolicy {
    pub policy: FilterPolicy,
    pub notices: Vec<String>,
}

impl FilterPolicy {
    /// Build the policy for `target`.
    ///
    /// Terms are trimmed and blanks dropped. Body and Url targets need at least
    /// one include term. Exclude terms have no meaning for the Body target; they
    /// are ignored and reported as a notice rather than dropped silently.
    pub fn build(
        target: SearchTarget,
        include: &[String],
        exclude: &[String],
    ) -> Result<BuiltPolicy, HarvestError> {
        let include = clean_terms(include);
        let exclude = clean_terms(exclude);
        let mut notices = Vec::new();

        let policy = match target {
            SearchTarget::Body => {
                if include.is_empty() {
                    return Err(HarvestError::Configuration(
                        "body search needs at least one include term".into(),
                    ));
                }
                if !exclude.is_empty() {
                    notices.push(format!(
                        "exclude terms are not supported for body search; ignored: {}",
                        exclude.join(", ")
                    ));
                }
                FilterPolicy::Body(BodyPolicy {
                    terms: include.iter().map(|t| t.to_lowercase()).collect(),
                })
            }
            SearchTarget::Url => {
                if include.is_empty() {
                    return Err(HarvestError::Configuration(
                        "url search needs at least one include term".into(),
                    ));
                }
                let exclude = if exclude.is_empty() {
                    None
                } else {
                    Some(compile(&exclude.join("|"))?)
                };
                let include = include
                    .iter()
                    .map(|t| compile(t))
                    .collect::<Result<Vec<_>, _>>()?;
                FilterPolicy::Url(UrlPolicy { exclude, include })
            }
            SearchTarget::Passthrough => {
                if !include.is_empty() || !exclude.is_empty() {
                    notices.push("search terms are ignored for single-source harvests".into());
                }
                FilterPolicy::Passthrough
            }
        };

        Ok(BuiltPolicy { policy, notices })
    }

    pub fn target(&self) -> SearchTarget {
        match self {
            FilterPolicy::Body(_) => SearchTarget::Body,
            FilterPolicy::Url(_) => SearchTarget::Url,
            FilterPolicy::Passthrough => SearchTarget::Passthrough,
        }
    }

    /// Full check against an extracted article.
    pub fn accepts(&self, article: &Article) -> bool {
        match self {
            FilterPolicy::Body(p) => p.matches(&article.title, &article.body),
            FilterPolicy::Url(p) => p.matches(&article.url),
            FilterPolicy::Passthrough => true,
        }
    }

    /// Verdict from the URL alone, before anything is fetched.
    ///
    /// `None` when the URL cannot decide (body matching needs the text).
    pub fn accepts_url(&self, url: &str) -> Option<bool> {
        match self {
            FilterPolicy::Url(p) => Some(p.matches(url)),
            FilterPolicy::Passthrough => Some(true),
            FilterPolicy::Body(_) => None,
        }
    }
}

fn clean_terms(terms: &[String]) -> Vec<String> {
    terms
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

fn compile(pattern: &str) -> Result<Regex, HarvestError> {
    Regex::new(pattern)
        .map_err(|e| HarvestError::Configuration(format!("invalid url pattern '{}': {}", pattern, e)))
}

/// Recency verdict for one article.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recency {
    InWindow,
    OutOfWindow,
    /// No publishing date; the caller's undated policy decides
    Undated,
}

/// Inclusive `[now - days, now]` acceptance window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecencyWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl RecencyWindow {
    pub fn last_days(now: DateTime<Utc>, days: u32) -> Self {
        Self {
            start: now - Duration::days(i64::from(days)),
            end: now,
        }
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts <= self.end
    }

    pub fn check(&self, ts: Option<DateTime<Utc>>) -> Recency {
        match ts {
            None => Recency::Undated,
            Some(ts) if self.contains(ts) => Recency::InWindow,
            Some(_) => Recency::OutOfWindow,
        }
    }
}

/// Parameters passed to the engine so it can prune at the source.
#[derive(Debug, Clone)]
pub struct EngineFilter {
    pub policy: Arc<FilterPolicy>,
    pub window: RecencyWindow,
}

impl EngineFilter {
    /// True when a candidate can be dropped without fetching it.
    pub fn prunes_candidate(&self, url: &str, date: Option<DateTime<Utc>>) -> bool {
        if self.window.check(date) == Recency::OutOfWindow {
            return true;
        }
        self.policy.accepts_url(url) == Some(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn article(title: &str, url: &str, body: &str) -> Article {
        Article {
            title: title.into(),
            url: url.into(),
            publishing_date: None,
            body: body.into(),
            authors: vec![],
            source: "Test".into(),
        }
    }

    fn terms(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn body_policy_matches_any_term_case_insensitively() {
        let built = FilterPolicy::build(SearchTarget::Body, &terms(&["Climate", "EPA"]), &[]).unwrap();
        let p = built.policy;
        assert!(p.accepts(&article("CLIMATE week", "/a", "")));
        assert!(p.accepts(&article("Agency", "/b", "the epa said")));
        assert!(!p.accepts(&article("Sports", "/c", "football results")));
    }

    #[test]
    fn body_policy_matches_across_title_and_body_boundary() {
        let p = FilterPolicy::build(SearchTarget::Body, &terms(&["crisis"]), &[]).unwrap().policy;
        assert!(p.accepts(&article("Climate crisis", "/a", "")));
        assert!(p.accepts(&article("", "/a", "a crisis")));
    }

    #[test]
    fn body_policy_reports_ignored_exclude_terms() {
        let built = FilterPolicy::build(SearchTarget::Body, &terms(&["coral"]), &terms(&["podcast"])).unwrap();
        assert_eq!(built.notices.len(), 1);
        assert!(built.notices[0].contains("podcast"));
    }

    #[test]
    fn url_policy_scenario_inclusion_overrides_exclusion() {
        let p = FilterPolicy::build(
            SearchTarget::Url,
            &terms(&["coral", "climate"]),
            &terms(&["podcast"]),
        )
        .unwrap()
        .policy;

        assert!(p.accepts(&article("", "/coral-climate-reef", "")));
        assert!(!p.accepts(&article("", "/podcast/coral", "")));
        // excluded but fully included: still accepted
        assert!(p.accepts(&article("", "/podcast/coral-climate", "")));
        // not excluded, not included: accepted because not excluded
        assert!(p.accepts(&article("", "/sports/football", "")));
    }

    #[test]
    fn url_policy_law_holds_for_accepted_urls() {
        let p = FilterPolicy::build(
            SearchTarget::Url,
            &terms(&["trump"]),
            &terms(&["advertisement", "podcast"]),
        )
        .unwrap()
        .policy;
        let FilterPolicy::Url(ref up) = p else { panic!("expected url policy") };
        for url in [
            "/politics/trump-visit",
            "/podcast/trump",
            "/advertisement/cars",
            "/world/europe",
        ] {
            if p.accepts(&article("", url, "")) {
                assert!(!up.is_excluded(url) || up.is_fully_included(url), "{url}");
            }
        }
        assert!(!p.accepts(&article("", "/advertisement/cars", "")));
    }

    #[test]
    fn url_patterns_are_case_sensitive() {
        let p = FilterPolicy::build(SearchTarget::Url, &terms(&["EPA"]), &terms(&["podcast"]))
            .unwrap()
            .policy;
        assert_eq!(p.accepts_url("https://x.com/PODCAST/news"), Some(true));
        assert_eq!(p.accepts_url("https://x.com/podcast/news"), Some(false));
        assert_eq!(p.accepts_url("https://x.com/podcast/EPA-ruling"), Some(true));
        assert_eq!(p.accepts_url("https://x.com/podcast/epa-ruling"), Some(false));
    }

    #[test]
    fn url_policy_without_excludes_accepts_everything() {
        let p = FilterPolicy::build(SearchTarget::Url, &terms(&["news"]), &[]).unwrap().policy;
        assert!(p.accepts(&article("", "/anything", "")));
        assert_eq!(p.accepts_url("/anything"), Some(true));
    }

    #[test]
    fn empty_include_terms_are_rejected() {
        for target in [SearchTarget::Body, SearchTarget::Url] {
            let err = FilterPolicy::build(target, &terms(&["  ", ""]), &[]).unwrap_err();
            assert_eq!(err.category(), "configuration");
        }
    }

    #[test]
    fn invalid_regex_is_a_configuration_error() {
        let err = FilterPolicy::build(SearchTarget::Url, &terms(&["(unclosed"]), &[]).unwrap_err();
        assert!(matches!(err, HarvestError::Configuration(_)));
    }

    #[test]
    fn passthrough_accepts_all() {
        let p = FilterPolicy::build(SearchTarget::Passthrough, &[], &[]).unwrap().policy;
        assert!(p.accepts(&article("x", "/y", "z")));
        assert_eq!(p.target(), SearchTarget::Passthrough);
    }

    #[test]
    fn recency_window_is_inclusive() {
        let now = Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap();
        let w = RecencyWindow::last_days(now, 7);
        assert!(w.contains(now));
        assert!(w.contains(now - Duration::days(7)));
        assert!(!w.contains(now - Duration::days(7) - Duration::seconds(1)));
        assert!(!w.contains(now + Duration::seconds(1)));
        assert_eq!(w.check(None), Recency::Undated);
    }

    #[test]
    fn engine_filter_prunes_stale_and_rejected_urls() {
        let now = Utc::now();
        let filter = EngineFilter {
            policy: Arc::new(
                FilterPolicy::build(SearchTarget::Url, &terms(&["coral"]), &terms(&["podcast"]))
                    .unwrap()
                    .policy,
            ),
            window: RecencyWindow::last_days(now, 1),
        };
        assert!(filter.prunes_candidate("/podcast/x", Some(now)));
        assert!(filter.prunes_candidate("/reef", Some(now - Duration::days(3))));
        assert!(!filter.prunes_candidate("/reef", None));
    }
}
