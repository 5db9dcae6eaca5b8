//! Data models produced by the crawl pipeline.
//!
//! - [`TopicRef`]: a navigable topic section discovered on the home page
//! - [`HeadlineCard`]: a candidate headline scraped from a topic or story page
//! - [`ResolvedLink`]: a publisher URL that is guaranteed to be off the aggregator
//! - [`ArticleRecord`]: a cleaned, validated article handed to the caller
//! - [`PipelineRun`]: everything one invocation produced, progress events included
//!
//! Records serialize in camelCase because that is the shape the downstream
//! summarization step consumes (`sourceDomain`, `isCluster`, ...).

use crate::error::ResolutionFailure;
use crate::utils::{is_aggregator_url, source_domain};
use serde::{Deserialize, Serialize};

/// A topic section of the aggregator, e.g. "Tecnologia".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicRef {
    pub title: String,
    pub url: String,
}

/// A headline card found on a topic or story page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeadlineCard {
    pub title: String,
    /// Absolute aggregator link (a redirect token for articles).
    pub url: String,
    pub image: Option<String>,
    /// `true` when the link targets a "continuing coverage" story node.
    pub is_cluster: bool,
}

/// A real publisher URL. Can only be built from a URL whose host is not the
/// aggregator (nor one of its subdomains).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLink(String);

impl ResolvedLink {
    pub fn new(url: &str, aggregator_host: &str) -> Result<Self, ResolutionFailure> {
        if source_domain(url).is_none() {
            return Err(ResolutionFailure::Malformed(url.to_string()));
        }
        if is_aggregator_url(url, aggregator_host) {
            return Err(ResolutionFailure::StillOnAggregator(url.to_string()));
        }
        Ok(Self(url.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Publisher host without a leading `www.`.
    pub fn source_domain(&self) -> String {
        source_domain(&self.0).unwrap_or_default()
    }
}

/// A fully extracted article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleRecord {
    pub title: String,
    pub url: String,
    pub source_domain: String,
    /// Cleaned paragraphs, in page order. Never empty.
    pub content: Vec<String>,
}

/// One progress report: a message and a fraction in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub message: String,
    pub fraction: f64,
}

/// The aggregate result of one pipeline invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineRun {
    pub input_url: Option<String>,
    pub topic: Option<TopicRef>,
    /// Items the pipeline tried to resolve and extract.
    pub attempted: usize,
    /// Items abandoned after resolution or extraction failed.
    pub dropped: usize,
    pub cancelled: bool,
    pub articles: Vec<ArticleRecord>,
    /// Progress reports in the order they were made.
    #[serde(default)]
    pub events: Vec<ProgressEvent>,
}

impl PipelineRun {
    /// Human readable final status.
    pub fn status(&self) -> String {
        match (self.articles.len(), self.cancelled) {
            (0, true) => "cancelled, nothing found".to_string(),
            (0, false) => "nothing found".to_string(),
            (n, true) => format!("cancelled after extracting {n} of {} articles", self.attempted),
            (n, false) => format!("extracted {n} of {} articles", self.attempted),
        }
    }
}
