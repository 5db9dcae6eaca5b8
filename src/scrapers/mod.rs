//! Google News scrapers.
//!
//! Each stage loads a page through a session and hands the HTML to a pure
//! parsing function, so the parsing can be tested without a browser.
//!
//! | Stage | Module | Input | Output |
//! |-------|--------|-------|--------|
//! | Topic discovery | [`topics`] | home page | [`TopicRef`](crate::models::TopicRef)s |
//! | Headline scan | [`headlines`] | topic/story page | [`HeadlineCard`](crate::models::HeadlineCard)s |
//! | Link resolution | [`resolver`] | redirect token | publisher URL |
//! | Content extraction | [`extractor`] | publisher URL | [`ArticleRecord`](crate::models::ArticleRecord) |
//! | Story deep dive | [`deep_dive`] | story page | [`ArticleRecord`](crate::models::ArticleRecord)s |
//!
//! Aggregator hrefs are relative (`./articles/CBMi…`). The site serves every
//! page under a root `<base>`, so they are resolved against the aggregator
//! origin rather than the page URL before classification.

pub mod deep_dive;
pub mod extractor;
pub mod headlines;
pub mod resolver;
pub mod topics;

use crate::utils::is_aggregator_host;
use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

static AGGREGATOR_PATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^/(topics|stories|articles|read)/[^/]+").expect("static regex"));

/// Kind of aggregator link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    Topic,
    /// "Continuing coverage" cluster.
    Story,
    /// Redirect token to a single publisher article.
    Article,
    /// Alternate redirect token form used on story pages.
    Read,
}

impl LinkKind {
    /// Whether the link is a redirect token to a publisher article.
    pub fn is_redirect(self) -> bool {
        matches!(self, LinkKind::Article | LinkKind::Read)
    }
}

/// Resolve `href` against the aggregator origin and classify it. Links off
/// the aggregator return `None`.
pub fn classify_href(base: &Url, href: &str, aggregator_host: &str) -> Option<(Url, LinkKind)> {
    let resolved = base.join(href.trim()).ok()?;
    let kind = classify_url(&resolved, aggregator_host)?;
    Some((resolved, kind))
}

/// Classify an absolute URL by its aggregator path prefix.
///
/// # Arguments
/// * `url` - Absolute URL
/// * `aggregator_host` - Host the URL must belong to (subdomains included)
///
/// # Returns
/// The [`LinkKind`], or `None` for off-aggregator URLs and other paths.
pub fn classify_url(url: &Url, aggregator_host: &str) -> Option<LinkKind> {
    if !is_aggregator_host(url.host_str()?, aggregator_host) {
        return None;
    }
    let caps = AGGREGATOR_PATH.captures(url.path())?;
    match caps.get(1)?.as_str() {
        "topics" => Some(LinkKind::Topic),
        "stories" => Some(LinkKind::Story),
        "articles" => Some(LinkKind::Article),
        "read" => Some(LinkKind::Read),
        _ => None,
    }
}
