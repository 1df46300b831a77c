//! Plain-text rendering for the CLI.
//!
//! Body first so a long run can be skimmed by the trailing
//! title/date/url block of each entry.

use std::fmt::Write;

use crate::handler::HarvestResponse;
use crate::model::Article;
use crate::sources::SourceListing;

const DIVIDER: &str = "--------------------";

pub fn render_article(article: &Article, show_body: bool) -> String {
    let mut out = String::new();
    if !article.authors.is_empty() {
        let _ = writeln!(out, "{}", article.authors.join(", "));
    }
    if show_body {
        let _ = writeln!(out, "{}\n", article.body);
    }
    let _ = writeln!(out, "{}", article.title);
    match article.publishing_date {
        Some(date) => {
            let _ = writeln!(out, "{}", date.format("%Y-%m-%d %H:%M:%S%:z"));
        }
        None => {
            let _ = writeln!(out, "(no publishing date)");
        }
    }
    let _ = writeln!(out, "{}", article.url);
    let _ = writeln!(out, "{}", DIVIDER);
    out
}

pub fn render_response(response: &HarvestResponse, show_body: bool) -> String {
    let mut out = String::new();
    for article in &response.result.articles {
        out.push_str(&render_article(article, show_body));
    }
    for notice in &response.result.notices {
        let _ = writeln!(out, "note: {}", notice);
    }
    let r = &response.result;
    let _ = writeln!(out, "\n{}", response.message);
    let _ = writeln!(
        out,
        "skipped: {}, out of window: {}, filtered: {}, retries: {}, elapsed: {:.2}s",
        r.skipped_count,
        r.out_of_window_count,
        r.filtered_count,
        r.retry_count,
        r.elapsed.as_secs_f64()
    );
    out
}

pub fn render_sources(listing: &SourceListing) -> String {
    let mut out = String::new();
    for (collection, names) in &listing.collections {
        let _ = writeln!(out, "{}:", collection);
        for name in names {
            let _ = writeln!(out, "  {}", name);
        }
    }
    out
}
