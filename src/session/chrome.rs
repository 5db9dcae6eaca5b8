//! Headless Chrome engine built on `chromiumoxide`.
//!
//! The browser runs headless with a fixed desktop user-agent and a request
//! timeout equal to the page-load timeout. The CDP handler is driven by a
//! background task for as long as the browser lives.

use super::{Fetch, Launcher, NavOutcome, Navigator, Snapshot};
use crate::config::Settings;
use crate::error::{NavError, NavErrorKind, SessionError};
use crate::utils::is_aggregator_url;
use chromiumoxide::Page;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::StopLoadingParams;
use chromiumoxide::error::CdpError;
use futures::StreamExt;
use std::io;
use std::process::ExitStatus;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::error::Elapsed;
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, info, instrument, warn};

const BODY_TEXT_JS: &str = "document.body ? document.body.innerText : ''";
const SELECTOR_POLL: Duration = Duration::from_millis(200);

/// Map a CDP error onto the closed navigation error classification.
pub fn classify_cdp_error(err: &CdpError) -> NavErrorKind {
    match err {
        CdpError::Timeout => NavErrorKind::Timeout,
        CdpError::Ws(_) | CdpError::Io(_) | CdpError::NoResponse | CdpError::ChannelSendError(_) => {
            NavErrorKind::Transport
        }
        _ => NavErrorKind::Fatal,
    }
}

fn browser_config(settings: &Settings) -> Result<BrowserConfig, SessionError> {
    let mut builder = BrowserConfig::builder()
        .request_timeout(settings.page_load_timeout())
        .arg(format!("--user-agent={}", settings.user_agent))
        .arg("--window-size=1366,900")
        .arg("--disable-gpu")
        .arg("--disable-dev-shm-usage")
        .arg("--lang=pt-BR");
    if settings.chrome.no_sandbox {
        builder = builder.no_sandbox();
    }
    if let Some(exe) = &settings.chrome.executable {
        builder = builder.chrome_executable(exe);
    }
    builder.build().map_err(SessionError::Launch)
}

async fn launch_browser(settings: &Settings) -> Result<(Browser, JoinHandle<()>), SessionError> {
    let config = browser_config(settings)?;
    let (browser, mut handler) = Browser::launch(config)
        .await
        .map_err(|e| SessionError::Launch(e.to_string()))?;
    let handler = tokio::spawn(async move { while handler.next().await.is_some() {} });
    Ok((browser, handler))
}

/// Map a bounded `goto` onto a navigation outcome. Running out of time is a
/// soft failure; the caller stops loading and reads what rendered.
fn goto_outcome(result: Result<Result<(), CdpError>, Elapsed>, url: &str) -> NavOutcome {
    match result {
        Ok(Ok(())) => NavOutcome::Loaded,
        Ok(Err(e)) => NavOutcome::from_error(NavError::new(classify_cdp_error(&e), url, e.to_string())),
        Err(_) => NavOutcome::Partial(NavError::new(NavErrorKind::Timeout, url, "page load timeout")),
    }
}

async fn stop_loading(page: &Page) {
    if let Err(e) = page.execute(StopLoadingParams::default()).await {
        debug!(error = %e, "Stop loading failed");
    }
}

/// Process-level operations needed to take a browser down.
trait BrowserProcess {
    /// Ask the browser to close over CDP.
    async fn request_close(&mut self) -> Result<(), CdpError>;
    /// Kill the child process.
    async fn force_kill(&mut self);
    /// Wait for the child process to exit.
    async fn wait_exit(&mut self) -> io::Result<Option<ExitStatus>>;
}

impl BrowserProcess for Browser {
    async fn request_close(&mut self) -> Result<(), CdpError> {
        Browser::close(self).await.map(|_| ())
    }

    async fn force_kill(&mut self) {
        if let Some(Err(e)) = Browser::kill(self).await {
            debug!(error = %e, "Browser kill error");
        }
    }

    async fn wait_exit(&mut self) -> io::Result<Option<ExitStatus>> {
        Browser::wait(self).await
    }
}

/// Close the browser and reap its process, never waiting longer than
/// `wait_limit` for the exit. A browser whose CDP channel is gone is killed.
async fn shutdown_browser<B: BrowserProcess>(mut browser: B, handler: JoinHandle<()>, wait_limit: Duration) {
    if let Err(e) = browser.request_close().await {
        warn!(error = %e, "Browser close failed; killing the process");
        browser.force_kill().await;
    }
    match timeout(wait_limit, browser.wait_exit()).await {
        Ok(Ok(status)) => debug!(?status, "Browser exited"),
        Ok(Err(e)) => debug!(error = %e, "Browser wait error"),
        Err(_) => {
            warn!(?wait_limit, "Browser did not exit in time; killing the process");
            browser.force_kill().await;
        }
    }
    handler.abort();
}

async fn page_body_text(page: &Page) -> Option<String> {
    page.evaluate(BODY_TEXT_JS).await.ok()?.into_value::<String>().ok()
}

#[derive(Debug, Clone)]
pub struct ChromeLauncher {
    settings: Settings,
}

impl ChromeLauncher {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }
}

impl Launcher for ChromeLauncher {
    type Session = ChromeSession;

    #[instrument(level = "info", skip_all)]
    async fn launch(&self) -> Result<ChromeSession, SessionError> {
        let (browser, handler) = launch_browser(&self.settings).await?;
        let wait_limit = self.settings.page_load_timeout();
        match browser.new_page("about:blank").await {
            Ok(page) => {
                info!("Headless Chrome session ready");
                Ok(ChromeSession {
                    browser,
                    page,
                    handler,
                    wait_limit,
                })
            }
            Err(e) => {
                shutdown_browser(browser, handler, wait_limit).await;
                Err(SessionError::Launch(format!("failed to open tab: {e}")))
            }
        }
    }
}

/// One browser with one tab; the tab's location is the session state.
pub struct ChromeSession {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    /// Upper bound for the process exit on close.
    wait_limit: Duration,
}

impl Navigator for ChromeSession {
    #[instrument(level = "debug", skip_all, fields(%url))]
    async fn navigate(&mut self, url: &str, timeout_after: Duration) -> NavOutcome {
        let result = timeout(timeout_after, self.page.goto(url))
            .await
            .map(|r| r.map(|_| ()));
        let outcome = goto_outcome(result, url);
        if outcome.needs_stop() {
            warn!(%url, ?outcome, "Navigation incomplete; stopping load and using partial render");
            stop_loading(&self.page).await;
        }
        outcome
    }

    async fn current_url(&mut self) -> Option<String> {
        self.page.url().await.ok().flatten()
    }

    async fn html(&mut self) -> Option<String> {
        self.page.content().await.ok()
    }

    async fn body_text(&mut self) -> Option<String> {
        page_body_text(&self.page).await
    }

    async fn scroll_by(&mut self, pixels: u32) {
        let js = format!("window.scrollBy(0, {pixels})");
        if let Err(e) = self.page.evaluate(js.as_str()).await {
            debug!(error = %e, "Scroll failed");
        }
    }

    async fn wait_for(&mut self, selector: &str, wait: Duration) -> bool {
        let deadline = Instant::now() + wait;
        loop {
            if self.page.find_element(selector).await.is_ok() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            sleep(SELECTOR_POLL).await;
        }
    }

    async fn close(self) {
        let ChromeSession {
            browser,
            page,
            handler,
            wait_limit,
        } = self;
        if let Err(e) = page.close().await {
            debug!(error = %e, "Tab close error");
        }
        shutdown_browser(browser, handler, wait_limit).await;
    }
}

/// Shared browser opening one tab per fetch, for the concurrent deep dive.
pub struct ChromeFetcher {
    browser: Browser,
    handler: JoinHandle<()>,
    aggregator_host: String,
    load_timeout: Duration,
    redirect_wait: Duration,
    poll: Duration,
}

impl ChromeFetcher {
    pub async fn launch(settings: &Settings) -> Result<Self, SessionError> {
        let (browser, handler) = launch_browser(settings).await?;
        Ok(Self {
            browser,
            handler,
            aggregator_host: settings.aggregator_host(),
            load_timeout: settings.page_load_timeout(),
            redirect_wait: settings.resolve_wait(),
            poll: settings.resolve_poll(),
        })
    }

    pub async fn shutdown(self) {
        shutdown_browser(self.browser, self.handler, self.load_timeout).await;
    }

    async fn settle(&self, page: &Page) -> String {
        let deadline = Instant::now() + self.redirect_wait;
        loop {
            let url = page.url().await.ok().flatten().unwrap_or_default();
            if !is_aggregator_url(&url, &self.aggregator_host) || Instant::now() >= deadline {
                return url;
            }
            sleep(self.poll).await;
        }
    }
}

impl Fetch for ChromeFetcher {
    #[instrument(level = "debug", skip_all, fields(%url))]
    async fn fetch(&self, url: &str) -> Result<Snapshot, NavError> {
        // The tab exists before the load starts and is closed on every path.
        let page = match timeout(self.load_timeout, self.browser.new_page("about:blank")).await {
            Ok(Ok(page)) => page,
            Ok(Err(e)) => return Err(NavError::new(classify_cdp_error(&e), url, e.to_string())),
            Err(_) => return Err(NavError::new(NavErrorKind::Timeout, url, "tab open timeout")),
        };
        let result = timeout(self.load_timeout, page.goto(url))
            .await
            .map(|r| r.map(|_| ()));
        let snapshot = match goto_outcome(result, url) {
            NavOutcome::Failed(err) => Err(err),
            outcome => {
                if outcome.needs_stop() {
                    debug!(?outcome, "Tab load incomplete; using partial render");
                    stop_loading(&page).await;
                }
                let final_url = self.settle(&page).await;
                let html = page.content().await.unwrap_or_default();
                let body_text = page_body_text(&page).await.unwrap_or_default();
                Ok(Snapshot {
                    html,
                    body_text,
                    final_url,
                })
            }
        };
        if let Err(e) = page.close().await {
            debug!(%url, error = %e, "Tab close error (tab leak)");
        }
        snapshot
    }
}
