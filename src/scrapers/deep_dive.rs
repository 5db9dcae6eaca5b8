//! Story deep dive: expand a "continuing coverage" cluster into articles.
//!
//! Story pages list many redirect tokens for the same event. Each one is
//! fetched independently through a [`Fetch`] capability, so the fetches run
//! concurrently; a failed fetch only loses its own article.

use super::classify_href;
use crate::config::Settings;
use crate::dom::page_title;
use crate::models::{ArticleRecord, PipelineRun, ResolvedLink};
use crate::session::Fetch;
use crate::text::TextCleaner;
use crate::utils::jitter;
use futures::stream::{self, StreamExt};
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use std::collections::HashSet;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

static ANCHORS: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").expect("static selector"));

/// Redirect-token links on a story page, resolved, deduplicated in page
/// order and capped at `max`.
pub fn collect_article_links(html: &str, settings: &Settings, max: usize) -> Vec<String> {
    let Ok(base) = settings.base_url() else {
        return Vec::new();
    };
    let host = settings.aggregator_host();
    let document = Html::parse_document(html);
    let mut seen = HashSet::new();

    document
        .select(&ANCHORS)
        .filter_map(|a| classify_href(&base, a.value().attr("href")?, &host))
        .filter(|(_, kind)| kind.is_redirect())
        .map(|(url, _)| url.to_string())
        .filter(|url| seen.insert(url.clone()))
        .take(max)
        .collect()
}

async fn dive_one<F: Fetch>(
    fetcher: &F,
    link: String,
    settings: &Settings,
    cleaner: &TextCleaner,
) -> Option<ArticleRecord> {
    sleep(jitter(settings.jitter_min_millis, settings.jitter_max_millis)).await;

    let snapshot = match fetcher.fetch(&link).await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            debug!(%link, error = %e, "Deep dive fetch failed");
            return None;
        }
    };
    let resolved = match ResolvedLink::new(&snapshot.final_url, &settings.aggregator_host()) {
        Ok(resolved) => resolved,
        Err(e) => {
            debug!(%link, error = %e, "Deep dive link did not leave the aggregator");
            return None;
        }
    };
    let chars = snapshot.body_text.chars().count();
    if chars <= settings.dive_min_text_chars {
        debug!(url = %resolved.as_str(), chars, "Deep dive page too short");
        return None;
    }
    let content = cleaner.clean(&snapshot.body_text);
    if content.is_empty() {
        return None;
    }
    let title = page_title(&Html::parse_document(&snapshot.html)).unwrap_or_else(|| resolved.source_domain());

    Some(ArticleRecord {
        title,
        url: resolved.as_str().to_string(),
        source_domain: resolved.source_domain(),
        content,
    })
}

/// Fetch a story page and every article it links to, concurrently.
///
/// Records come back in the story page's link order. When the page links to
/// no articles, the story URL itself is fetched as the only candidate. Every
/// link counts as attempted; links without a record count as dropped.
#[instrument(level = "info", skip(fetcher, settings))]
pub async fn deep_dive<F: Fetch>(
    fetcher: &F,
    story_url: &str,
    max_items: usize,
    settings: &Settings,
) -> PipelineRun {
    let mut links = match fetcher.fetch(story_url).await {
        Ok(snapshot) => collect_article_links(&snapshot.html, settings, max_items),
        Err(e) => {
            warn!(error = %e, "Story page failed to load");
            Vec::new()
        }
    };
    if links.is_empty() {
        links.push(story_url.to_string());
    }
    let links_total = links.len();
    info!(links = links_total, concurrency = settings.dive_concurrency, "Diving into story");

    let cleaner = TextCleaner::new(settings.min_paragraph_chars, &settings.boilerplate_keywords);
    let records: Vec<ArticleRecord> = stream::iter(links)
        .map(|link| dive_one(fetcher, link, settings, &cleaner))
        .buffered(settings.dive_concurrency.max(1))
        .filter_map(|record| async move { record })
        .collect()
        .await;

    info!(count = records.len(), "Deep dive finished");
    PipelineRun {
        input_url: Some(story_url.to_string()),
        attempted: links_total,
        dropped: links_total - records.len(),
        articles: records,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::testing::{FakePage, FakeWeb};

    const STORY: &str = "https://news.google.com/stories/CAAqNggKIjBDQkFTSFFv";

    const STORY_HTML: &str = r#"<html><body>
        <a href="./articles/A1">Primeira cobertura</a>
        <a href="./read/B2">Segunda cobertura</a>
        <a href="./articles/A1">Primeira de novo</a>
        <a href="https://www.bbc.com/news">Fora do agregador</a>
        <a href="./topics/BR">Brasil</a>
        <a href="./articles/C3">Terceira cobertura</a>
        </body></html>"#;

    fn settings() -> Settings {
        Settings {
            jitter_min_millis: 0,
            jitter_max_millis: 0,
            ..Settings::default()
        }
    }

    fn publisher_page(title: &str) -> FakePage {
        let para = "Chuvas intensas deixaram milhares de desalojados no litoral paulista nesta semana.";
        FakePage::html(&format!(
            "<html><body><h1>{title}</h1><p>{para}</p><p>{para}</p><p>{para}</p></body></html>"
        ))
    }

    #[test]
    fn test_collect_article_links_dedupes_and_caps() {
        let links = collect_article_links(STORY_HTML, &settings(), 10);
        assert_eq!(
            links,
            vec![
                "https://news.google.com/articles/A1",
                "https://news.google.com/read/B2",
                "https://news.google.com/articles/C3",
            ]
        );
        assert_eq!(collect_article_links(STORY_HTML, &settings(), 2).len(), 2);
    }

    #[tokio::test]
    async fn test_deep_dive_keeps_link_order_and_isolates_failures() {
        let web = FakeWeb::new();
        web.add(STORY, FakePage::html(STORY_HTML));
        web.add(
            "https://news.google.com/articles/A1",
            FakePage::redirect("https://www.uol.com.br/chuvas"),
        );
        web.add("https://www.uol.com.br/chuvas", publisher_page("Chuvas no litoral"));
        web.add("https://news.google.com/read/B2", FakePage::failing());
        web.add(
            "https://news.google.com/articles/C3",
            FakePage::redirect("https://g1.globo.com/sp/chuvas"),
        );
        web.add("https://g1.globo.com/sp/chuvas", publisher_page("Defesa Civil alerta"));

        let run = deep_dive(&web, STORY, 10, &settings()).await;
        assert_eq!((run.attempted, run.dropped), (3, 1));
        let records = run.articles;
        let titles: Vec<_> = records.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["Chuvas no litoral", "Defesa Civil alerta"]);
        assert_eq!(records[0].source_domain, "uol.com.br");
        assert!(records.iter().all(|r| !r.content.is_empty()));
    }

    #[tokio::test]
    async fn test_unresolved_and_short_pages_are_dropped() {
        let web = FakeWeb::new();
        web.add(STORY, FakePage::html(STORY_HTML));
        web.add("https://news.google.com/articles/A1", FakePage::text("still on the aggregator"));
        web.add("https://news.google.com/read/B2", FakePage::redirect("https://short.example/x"));
        web.add("https://short.example/x", FakePage::text("tiny"));
        let run = deep_dive(&web, STORY, 10, &settings()).await;
        assert!(run.articles.is_empty());
        assert_eq!(run.dropped, 3);
    }

    #[tokio::test]
    async fn test_story_without_links_fetches_itself() {
        let web = FakeWeb::new();
        web.add(STORY, FakePage::html("<html><body><p>nada</p></body></html>"));
        let run = deep_dive(&web, STORY, 10, &settings()).await;
        assert!(run.articles.is_empty());
        assert_eq!(run.status(), "nothing found");
        assert_eq!(web.visit_count(STORY), 2);
    }
}
