//! Two-tier article content extraction.
//!
//! Tier 1 loads the publisher page directly and accepts it only when the
//! visible text is long enough and free of paywall markers. Anything else
//! falls through to Tier 2, which reads the same article through a reader
//! mirror that renders the text server-side.

use crate::config::Settings;
use crate::dom::page_title;
use crate::error::{ExtractionError, RejectReason};
use crate::models::{ArticleRecord, ResolvedLink};
use crate::session::{NavOutcome, Navigator};
use crate::text::TextCleaner;
use crate::utils::truncate_for_log;
use scraper::Html;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Upper bound for the best-effort heading wait on the mirror.
const MIRROR_HEADING_WAIT: Duration = Duration::from_secs(2);

/// Metadata lines the reader mirror prints above the article text.
const MIRROR_HEADER_KEYS: [&str; 4] = ["Title:", "URL Source:", "Published Time:", "Warning:"];

/// Marker line that ends the mirror's metadata block.
const MIRROR_CONTENT_MARKER: &str = "Markdown Content:";

/// Drop the reader mirror's metadata block from `body`.
///
/// Everything up to the `Markdown Content:` line goes. Without that marker,
/// only the known metadata lines are removed.
fn strip_mirror_header(body: &str) -> String {
    if let Some(pos) = body.find(MIRROR_CONTENT_MARKER) {
        return body[pos + MIRROR_CONTENT_MARKER.len()..].to_string();
    }
    body.lines()
        .filter(|line| {
            let line = line.trim_start();
            !MIRROR_HEADER_KEYS.iter().any(|key| line.starts_with(key))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// What the direct tier saw, accepted or not.
struct DirectAttempt {
    title: Option<String>,
    result: Result<Vec<String>, RejectReason>,
}

pub struct ContentExtractor {
    cleaner: TextCleaner,
    min_body_chars: usize,
    paywall_markers: Vec<String>,
    settings: Settings,
}

impl ContentExtractor {
    pub fn new(settings: &Settings) -> Self {
        Self {
            cleaner: TextCleaner::new(settings.min_paragraph_chars, &settings.boilerplate_keywords),
            min_body_chars: settings.min_body_chars,
            paywall_markers: settings.paywall_markers.iter().map(|m| m.to_lowercase()).collect(),
            settings: settings.clone(),
        }
    }

    /// Accept or reject a directly loaded body.
    pub fn validate_direct(&self, body: &str) -> Result<Vec<String>, RejectReason> {
        let chars = body.chars().count();
        if chars <= self.min_body_chars {
            return Err(RejectReason::TooShort {
                chars,
                min: self.min_body_chars,
            });
        }
        let lower = body.to_lowercase();
        if let Some(marker) = self.paywall_markers.iter().find(|m| lower.contains(m.as_str())) {
            return Err(RejectReason::Paywalled { marker: marker.clone() });
        }
        let paragraphs = self.cleaner.clean(body);
        if paragraphs.is_empty() {
            return Err(RejectReason::NoParagraphs);
        }
        Ok(paragraphs)
    }

    async fn direct<N: Navigator>(&self, nav: &mut N, url: &str) -> DirectAttempt {
        if let NavOutcome::Failed(err) = nav.navigate(url, self.settings.page_load_timeout()).await {
            return DirectAttempt {
                title: None,
                result: Err(RejectReason::Navigation(err)),
            };
        }
        let title = nav.html().await.and_then(|h| page_title(&Html::parse_document(&h)));
        let body = nav.body_text().await.unwrap_or_default();
        DirectAttempt {
            title,
            result: self.validate_direct(&body),
        }
    }

    /// Read the article through the reader mirror. Returns the mirror's
    /// heading (if any) and the cleaned paragraphs.
    async fn mirror<N: Navigator>(&self, nav: &mut N, url: &str) -> Option<(Option<String>, Vec<String>)> {
        let mirror_url = self.settings.mirror_url(url);
        if let NavOutcome::Failed(err) = nav.navigate(&mirror_url, self.settings.page_load_timeout()).await {
            warn!(error = %err, "Fallback mirror failed to load");
            return None;
        }
        let render_wait = self.settings.render_wait();
        if !nav.wait_for("body", render_wait).await {
            debug!("Fallback mirror rendered no body in time");
        }
        nav.wait_for("h1", render_wait.min(MIRROR_HEADING_WAIT)).await;

        let heading = nav.html().await.and_then(|h| page_title(&Html::parse_document(&h)));
        let body = nav.body_text().await.unwrap_or_default();
        let paragraphs = self.cleaner.clean(&strip_mirror_header(&body));
        (!paragraphs.is_empty()).then_some((heading, paragraphs))
    }

    /// Extract `link` into an [`ArticleRecord`], trying the direct page first
    /// and the reader mirror second. `title_hint` is the headline card title,
    /// used when the publisher page had no usable heading.
    #[instrument(level = "info", skip(self, nav, title_hint), fields(url = %link.as_str()))]
    pub async fn extract<N: Navigator>(
        &self,
        nav: &mut N,
        link: &ResolvedLink,
        title_hint: Option<&str>,
    ) -> Result<ArticleRecord, ExtractionError> {
        let url = link.as_str();
        let direct = self.direct(nav, url).await;
        let reason = match direct.result {
            Ok(content) => {
                info!(paragraphs = content.len(), "Direct extraction accepted");
                return Ok(ArticleRecord {
                    title: direct
                        .title
                        .or_else(|| title_hint.map(str::to_string))
                        .unwrap_or_else(|| url.to_string()),
                    url: url.to_string(),
                    source_domain: link.source_domain(),
                    content,
                });
            }
            Err(reason) => reason,
        };
        let rejected = ExtractionError::Rejected {
            url: url.to_string(),
            reason,
        };
        info!(error = %rejected, "Direct extraction rejected; trying fallback mirror");

        let Some((heading, content)) = self.mirror(nav, url).await else {
            warn!("Both extraction tiers failed");
            return Err(ExtractionError::Failure { url: url.to_string() });
        };
        let title = direct
            .title
            .or_else(|| title_hint.map(str::to_string))
            .or(heading)
            .unwrap_or_else(|| url.to_string());
        info!(paragraphs = content.len(), title = %truncate_for_log(&title, 80), "Fallback extraction accepted");
        Ok(ArticleRecord {
            title,
            url: url.to_string(),
            source_domain: link.source_domain(),
            content,
        })
    }
}
