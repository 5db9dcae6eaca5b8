//! Pipeline orchestration: topic → headlines → resolve → extract.
//!
//! One run owns one [`SessionManager`]. The first session acquisition is the
//! only fatal step; everything after it degrades to dropped items, and the
//! session is released on every exit path.

use crate::config::Settings;
use crate::error::PipelineError;
use crate::models::{ArticleRecord, PipelineRun, ProgressEvent, TopicRef};
use crate::recovery::resolve_with_recovery;
use crate::scrapers::extractor::ContentExtractor;
use crate::scrapers::headlines::scan_headlines;
use crate::scrapers::topics::{discover_topics, fallback_topics, select_topic};
use crate::scrapers::{LinkKind, classify_url};
use crate::session::{Launcher, SessionManager};
use crate::utils::{jitter, truncate_for_log};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};
use url::Url;

/// What to crawl.
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    /// Topic, story or article URL. Discovered from the home page when unset.
    pub url: Option<String>,
    /// Preferred topic name when discovering.
    pub topic: Option<String>,
    pub max_items: usize,
}

type ProgressCallback<'a> = Box<dyn FnMut(&str, f64) + 'a>;

/// Progress reporter. Fractions are clamped to `[0, 1]` and never go
/// backwards. Every report is kept for the run record.
pub struct Progress<'a> {
    last: f64,
    events: Vec<ProgressEvent>,
    callback: Option<ProgressCallback<'a>>,
}

impl<'a> Progress<'a> {
    /// Reporter that only logs.
    pub fn silent() -> Self {
        Self {
            last: 0.0,
            events: Vec::new(),
            callback: None,
        }
    }

    pub fn with_callback(callback: impl FnMut(&str, f64) + 'a) -> Self {
        Self {
            last: 0.0,
            events: Vec::new(),
            callback: Some(Box::new(callback)),
        }
    }

    pub fn report(&mut self, message: &str, fraction: f64) {
        let fraction = if fraction.is_nan() { self.last } else { fraction.clamp(0.0, 1.0).max(self.last) };
        self.last = fraction;
        info!(fraction, "{message}");
        self.events.push(ProgressEvent {
            message: message.to_string(),
            fraction,
        });
        if let Some(cb) = self.callback.as_mut() {
            cb(message, fraction);
        }
    }

    /// Hand over the reports made so far.
    pub fn take_events(&mut self) -> Vec<ProgressEvent> {
        std::mem::take(&mut self.events)
    }
}

/// Cooperative cancellation, checked between items.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One unit of work: an aggregator link plus the card title, if any.
struct WorkItem {
    link: String,
    title_hint: Option<String>,
}

fn is_article_link(url: &str, settings: &Settings) -> bool {
    Url::parse(url)
        .ok()
        .and_then(|u| classify_url(&u, &settings.aggregator_host()))
        .is_some_and(LinkKind::is_redirect)
}

async fn pick_topic<L: Launcher>(
    manager: &mut SessionManager<L>,
    settings: &Settings,
    wanted: Option<&str>,
) -> Option<TopicRef> {
    let mut topics = match manager.acquire().await {
        Ok(nav) => discover_topics(nav, settings).await,
        Err(e) => {
            warn!(error = %e, "No session for topic discovery");
            Vec::new()
        }
    };
    if topics.is_empty() {
        info!("No topics discovered; using fallback topics");
        topics = fallback_topics(settings);
    }
    select_topic(&topics, wanted)
}

async fn collect_items<L: Launcher>(
    manager: &mut SessionManager<L>,
    settings: &Settings,
    target: &str,
    max_items: usize,
    progress: &mut Progress<'_>,
) -> Vec<WorkItem> {
    if is_article_link(target, settings) {
        progress.report("Single article link", 0.2);
        return vec![WorkItem {
            link: target.to_string(),
            title_hint: None,
        }];
    }

    progress.report("Scanning headlines", 0.1);
    let cards = match manager.acquire().await {
        Ok(nav) => scan_headlines(nav, target, settings).await,
        Err(e) => {
            warn!(error = %e, "No session for headline scan");
            Vec::new()
        }
    };
    let items: Vec<WorkItem> = cards
        .into_iter()
        .filter(|c| !c.is_cluster)
        .take(max_items)
        .map(|c| WorkItem {
            link: c.url,
            title_hint: Some(c.title),
        })
        .collect();
    progress.report(&format!("Found {} headlines to process", items.len()), 0.2);
    items
}

async fn process_item<L: Launcher>(
    manager: &mut SessionManager<L>,
    extractor: &ContentExtractor,
    settings: &Settings,
    item: &WorkItem,
    seen: &mut HashSet<String>,
) -> Option<ArticleRecord> {
    let resolved = match resolve_with_recovery(manager, &item.link, settings).await {
        Ok(resolved) => resolved,
        Err(e) => {
            warn!(link = %item.link, error = %e, "Dropping item: resolution failed");
            return None;
        }
    };
    if !seen.insert(resolved.as_str().to_string()) {
        info!(url = %resolved.as_str(), "Dropping item: already extracted");
        return None;
    }
    let nav = match manager.acquire().await {
        Ok(nav) => nav,
        Err(e) => {
            warn!(error = %e, "Dropping item: no session for extraction");
            return None;
        }
    };
    match extractor.extract(nav, &resolved, item.title_hint.as_deref()).await {
        Ok(record) => Some(record),
        Err(e) => {
            warn!(error = %e, "Dropping item: extraction failed");
            None
        }
    }
}

async fn run_items<L: Launcher>(
    manager: &mut SessionManager<L>,
    settings: &Settings,
    request: &RunRequest,
    progress: &mut Progress<'_>,
    cancel: &CancelFlag,
) -> PipelineRun {
    let mut run = PipelineRun {
        input_url: request.url.clone(),
        ..Default::default()
    };

    let target = match &request.url {
        Some(url) => url.clone(),
        None => {
            progress.report("Discovering topics", 0.0);
            match pick_topic(manager, settings, request.topic.as_deref()).await {
                Some(topic) => {
                    let url = topic.url.clone();
                    run.topic = Some(topic);
                    url
                }
                None => return run,
            }
        }
    };

    let items = collect_items(manager, settings, &target, request.max_items, progress).await;
    let extractor = ContentExtractor::new(settings);
    let mut seen = HashSet::new();
    let total = items.len();

    for (i, item) in items.iter().enumerate() {
        if cancel.is_cancelled() {
            warn!(remaining = total - i, "Run cancelled");
            run.cancelled = true;
            break;
        }
        sleep(jitter(settings.jitter_min_millis, settings.jitter_max_millis)).await;

        run.attempted += 1;
        match process_item(manager, &extractor, settings, item, &mut seen).await {
            Some(record) => {
                progress.report(
                    &format!("[{}/{total}] {}", i + 1, truncate_for_log(&record.title, 80)),
                    0.2 + 0.8 * (i + 1) as f64 / total as f64,
                );
                run.articles.push(record);
            }
            None => {
                run.dropped += 1;
                progress.report(
                    &format!("[{}/{total}] dropped {}", i + 1, item.link),
                    0.2 + 0.8 * (i + 1) as f64 / total as f64,
                );
            }
        }
    }
    run
}

/// Execute one pipeline run. Fails only when no browser session can be
/// launched at the start.
#[instrument(level = "info", skip_all, fields(url = ?request.url, topic = ?request.topic, max_items = request.max_items))]
pub async fn run<L: Launcher>(
    launcher: L,
    settings: &Settings,
    request: &RunRequest,
    progress: &mut Progress<'_>,
    cancel: &CancelFlag,
) -> Result<PipelineRun, PipelineError> {
    let mut manager = SessionManager::new(launcher);
    if let Err(e) = manager.acquire().await {
        error!(error = %e, "Could not start a browser session");
        return Err(e.into());
    }

    let mut run = run_items(&mut manager, settings, request, progress, cancel).await;
    manager.release().await;
    info!(
        launches = manager.launches(),
        attempted = run.attempted,
        dropped = run.dropped,
        "Pipeline finished"
    );

    progress.report(&run.status(), 1.0);
    run.events = progress.take_events();
    Ok(run)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::testing::{FakeLauncher, FakePage, FakeWeb};
    use std::cell::RefCell;

    const TOPIC: &str = "https://news.google.com/topics/BR?hl=pt-BR";

    fn settings() -> Settings {
        Settings {
            cooldown_secs: 0,
            resolve_wait_secs: 0,
            resolve_poll_millis: 1,
            jitter_min_millis: 0,
            jitter_max_millis: 0,
            scroll_pause_millis: 0,
            render_wait_secs: 0,
            ..Settings::default()
        }
    }

    fn article_body(subject: &str) -> String {
        let line = format!("{subject} foi confirmado por fontes oficiais na manhã desta segunda-feira.");
        vec![line; 8].join("\n")
    }

    fn scripted_web() -> FakeWeb {
        let web = FakeWeb::new();
        let s = settings();
        web.add(
            &s.home_url(),
            FakePage::html(r#"<html><body><a href="./topics/BR?hl=pt-BR">Brasil</a></body></html>"#),
        );
        web.add(
            TOPIC,
            FakePage::html(
                r#"<html><body>
                <div><h3>Banco Central eleva juros</h3><a href="./articles/A1">Veja mais</a></div>
                <div><img src="https://lh3.googleusercontent.com/x"><a href="./articles/A2">Chuvas atingem litoral paulista</a></div>
                <div><a href="./stories/S1">Cobertura completa da eleição</a></div>
                </body></html>"#,
            ),
        );
        web.add(
            "https://news.google.com/articles/A1",
            FakePage::redirect("https://www.estadao.com.br/a1"),
        );
        web.add("https://www.estadao.com.br/a1", FakePage::text(&article_body("O aumento da Selic")));
        web.add(
            "https://news.google.com/articles/A2",
            FakePage::redirect("https://g1.globo.com/a2"),
        );
        web.add("https://g1.globo.com/a2", FakePage::text(&article_body("O alerta de chuvas")));
        web
    }

    fn request() -> RunRequest {
        RunRequest {
            max_items: 10,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_full_run_discovers_topic_and_extracts_cards() {
        let web = scripted_web();
        let events = RefCell::new(Vec::new());
        let mut progress = Progress::with_callback(|msg, f| events.borrow_mut().push((msg.to_string(), f)));
        let run = run(FakeLauncher::new(web.clone()), &settings(), &request(), &mut progress, &CancelFlag::new())
            .await
            .unwrap();
        drop(progress);

        assert_eq!(run.topic.as_ref().map(|t| t.title.as_str()), Some("Brasil"));
        assert_eq!(run.attempted, 2);
        assert_eq!(run.dropped, 0);
        let titles: Vec<_> = run.articles.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, vec!["Banco Central eleva juros", "Chuvas atingem litoral paulista"]);
        assert_eq!(run.articles[1].source_domain, "g1.globo.com");
        assert_eq!(run.status(), "extracted 2 of 2 articles");
        assert_eq!(web.visit_count("https://news.google.com/stories/S1"), 0);
        assert_eq!(web.closes(), 1);

        assert_eq!(run.events.len(), events.borrow().len());
        assert_eq!(run.events.last().map(|e| e.message.as_str()), Some("extracted 2 of 2 articles"));
        let events = events.into_inner();
        assert_eq!(events.first().map(|e| e.1), Some(0.0));
        assert_eq!(events.last().map(|e| e.1), Some(1.0));
        assert!(events.windows(2).all(|w| w[0].1 <= w[1].1));
    }

    #[tokio::test]
    async fn test_nothing_found_still_releases_session() {
        let web = FakeWeb::new();
        let run = run(
            FakeLauncher::new(web.clone()),
            &settings(),
            &request(),
            &mut Progress::silent(),
            &CancelFlag::new(),
        )
        .await
        .unwrap();
        assert!(run.articles.is_empty());
        assert_eq!(run.status(), "nothing found");
        assert!(run.topic.is_some());
        assert_eq!(web.closes(), 1);
    }

    #[tokio::test]
    async fn test_cancel_before_first_item() {
        let web = scripted_web();
        let cancel = CancelFlag::new();
        cancel.cancel();
        let run = run(FakeLauncher::new(web.clone()), &settings(), &request(), &mut Progress::silent(), &cancel)
            .await
            .unwrap();
        assert!(run.cancelled);
        assert_eq!(run.attempted, 0);
        assert_eq!(run.status(), "cancelled, nothing found");
        assert_eq!(web.closes(), 1);
    }

    #[tokio::test]
    async fn test_cancel_between_items() {
        let web = scripted_web();
        let cancel = CancelFlag::new();
        let trigger = cancel.clone();
        let mut progress = Progress::with_callback(move |_, f| {
            if f > 0.2 && f < 1.0 {
                trigger.cancel();
            }
        });
        let run = run(FakeLauncher::new(web), &settings(), &request(), &mut progress, &cancel)
            .await
            .unwrap();
        assert!(run.cancelled);
        assert_eq!(run.attempted, 1);
        assert_eq!(run.articles.len(), 1);
    }

    #[tokio::test]
    async fn test_launch_failure_is_fatal() {
        let web = scripted_web();
        web.fail_launches(1);
        let result = run(FakeLauncher::new(web), &settings(), &request(), &mut Progress::silent(), &CancelFlag::new()).await;
        assert!(matches!(result, Err(PipelineError::Session(_))));
    }

    #[tokio::test]
    async fn test_article_url_is_a_single_item() {
        let web = scripted_web();
        let request = RunRequest {
            url: Some("https://news.google.com/articles/A2".to_string()),
            max_items: 10,
            ..Default::default()
        };
        let run = run(FakeLauncher::new(web.clone()), &settings(), &request, &mut Progress::silent(), &CancelFlag::new())
            .await
            .unwrap();
        assert_eq!(run.articles.len(), 1);
        assert_eq!(run.articles[0].title, "https://g1.globo.com/a2");
        assert_eq!(web.visit_count(&settings().home_url()), 0);
    }

    #[tokio::test]
    async fn test_blocked_link_is_dropped_after_one_retry() {
        let web = scripted_web();
        web.add(
            "https://news.google.com/articles/A1",
            FakePage::redirect("https://www.estadao.com.br/a1").blocked_until_launch(10),
        );
        let request = RunRequest {
            url: Some(TOPIC.to_string()),
            max_items: 10,
            ..Default::default()
        };
        let run = run(FakeLauncher::new(web.clone()), &settings(), &request, &mut Progress::silent(), &CancelFlag::new())
            .await
            .unwrap();
        assert_eq!(run.attempted, 2);
        assert_eq!(run.dropped, 1);
        assert_eq!(run.articles.len(), 1);
        assert_eq!(web.visit_count("https://news.google.com/articles/A1"), 2);
        assert!(run.articles.iter().all(|a| !a.url.contains("news.google.com")));
    }

    #[test]
    fn test_progress_is_clamped_and_monotonic() {
        let seen = RefCell::new(Vec::new());
        let mut progress = Progress::with_callback(|_, f| seen.borrow_mut().push(f));
        progress.report("a", 0.5);
        progress.report("b", 0.3);
        progress.report("c", 7.0);
        drop(progress);
        assert_eq!(seen.into_inner(), vec![0.5, 0.5, 1.0]);
    }
}
