//! News sitemap parsing.
//!
//! Handles both `<urlset>` documents (with optional `news:` extension) and
//! `<sitemapindex>` documents pointing at child sitemaps.

use chrono::{DateTime, NaiveDate, Utc};
use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::EngineError;

/// One `<url>` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SitemapEntry {
    pub loc: String,
    /// `news:publication_date`, falling back to `lastmod`
    pub published: Option<DateTime<Utc>>,
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sitemap {
    pub entries: Vec<SitemapEntry>,
    /// Child sitemap URLs from a `<sitemapindex>`
    pub children: Vec<String>,
}

#[derive(Default)]
struct Partial {
    loc: Option<String>,
    publication_date: Option<String>,
    lastmod: Option<String>,
    title: Option<String>,
}

/// Parse a sitemap document, keeping at most `limit` url entries.
pub fn parse(xml: &str, limit: usize) -> Result<Sitemap, EngineError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut sitemap = Sitemap::default();
    let mut buf = Vec::new();
    let mut current: Option<Partial> = None;
    let mut in_index_entry = false;
    let mut element: Vec<u8> = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = e.local_name().as_ref().to_vec();
                match name.as_slice() {
                    b"url" => current = Some(Partial::default()),
                    b"sitemap" => in_index_entry = true,
                    _ => {}
                }
                element = name;
            }
            Ok(Event::Text(t)) => {
                let text = t
                    .unescape()
                    .map_err(|e| EngineError::Malformed(format!("sitemap text: {}", e)))?
                    .into_owned();
                record(&mut sitemap, &mut current, in_index_entry, &element, text);
            }
            Ok(Event::CData(c)) => {
                let text = String::from_utf8_lossy(&c.into_inner()).into_owned();
                record(&mut sitemap, &mut current, in_index_entry, &element, text);
            }
            Ok(Event::End(e)) => {
                match e.local_name().as_ref() {
                    b"url" => {
                        if let Some(entry) = current.take().and_then(finish) {
                            if sitemap.entries.len() >= limit {
                                break;
                            }
                            sitemap.entries.push(entry);
                        }
                    }
                    b"sitemap" => in_index_entry = false,
                    _ => {}
                }
                element.clear();
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(EngineError::Malformed(format!("sitemap xml: {}", e))),
            _ => {}
        }
        buf.clear();
    }

    Ok(sitemap)
}

fn record(sitemap: &mut Sitemap, current: &mut Option<Partial>, in_index: bool, element: &[u8], text: String) {
    if in_index {
        if element == b"loc" {
            sitemap.children.push(text);
        }
        return;
    }
    let Some(entry) = current.as_mut() else { return };
    match element {
        b"loc" => entry.loc = Some(text),
        b"publication_date" => entry.publication_date = Some(text),
        b"lastmod" => entry.lastmod = Some(text),
        b"title" => entry.title = Some(text),
        _ => {}
    }
}

fn finish(p: Partial) -> Option<SitemapEntry> {
    let loc = p.loc?;
    let published = p
        .publication_date
        .as_deref()
        .and_then(parse_date)
        .or_else(|| p.lastmod.as_deref().and_then(parse_date));
    Some(SitemapEntry {
        loc,
        published,
        title: p.title,
    })
}

/// W3C datetime: full RFC 3339 or a bare date (taken as midnight UTC).
pub fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
