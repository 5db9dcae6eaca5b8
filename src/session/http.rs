//! Plain HTTP engine built on `reqwest`.
//!
//! No JavaScript runs here, so client-side redirects never complete and lazy
//! content never loads; the engine is meant for environments without a browser
//! and for the stateless deep dive.

use super::{Fetch, Launcher, NavOutcome, Navigator, Snapshot};
use crate::config::Settings;
use crate::dom::visible_text;
use crate::error::{NavError, NavErrorKind, SessionError};
use reqwest::Client;
use reqwest::header::{ACCEPT_LANGUAGE, HeaderMap, HeaderValue, REFERER};
use scraper::{Html, Selector};
use std::time::Duration;
use tracing::{debug, instrument};

/// Map a reqwest error onto the closed navigation error classification.
pub fn classify_reqwest_error(err: &reqwest::Error) -> NavErrorKind {
    if err.is_timeout() {
        NavErrorKind::Timeout
    } else if err.is_body() || err.is_decode() {
        NavErrorKind::Transport
    } else {
        NavErrorKind::Fatal
    }
}

/// Client with the fixed desktop user-agent and locale headers.
pub fn build_client(settings: &Settings) -> Result<Client, SessionError> {
    let mut headers = HeaderMap::new();
    let lang = HeaderValue::from_str(&settings.accept_language)
        .map_err(|e| SessionError::Launch(format!("bad accept-language header: {e}")))?;
    headers.insert(ACCEPT_LANGUAGE, lang);
    let referer = HeaderValue::from_str(&format!("{}/", settings.aggregator_base.trim_end_matches('/')))
        .map_err(|e| SessionError::Launch(format!("bad referer header: {e}")))?;
    headers.insert(REFERER, referer);

    let client = Client::builder()
        .user_agent(settings.user_agent.as_str())
        .default_headers(headers)
        .timeout(settings.page_load_timeout())
        .build()?;
    Ok(client)
}

async fn get_snapshot(client: &Client, url: &str, timeout: Duration) -> Result<Snapshot, NavError> {
    let nav_err = |e: reqwest::Error| NavError::new(classify_reqwest_error(&e), url, e.to_string());

    let resp = client.get(url).timeout(timeout).send().await.map_err(nav_err)?;
    let status = resp.status();
    let final_url = resp.url().to_string();
    if !status.is_success() {
        return Err(NavError::new(
            NavErrorKind::Fatal,
            url,
            format!("unexpected HTTP status {}", status.as_u16()),
        ));
    }
    let html = resp.text().await.map_err(nav_err)?;
    let body_text = visible_text(&Html::parse_document(&html));
    Ok(Snapshot {
        html,
        body_text,
        final_url,
    })
}

#[derive(Debug, Clone)]
pub struct HttpLauncher {
    client: Client,
}

impl HttpLauncher {
    pub fn new(settings: &Settings) -> Result<Self, SessionError> {
        Ok(Self {
            client: build_client(settings)?,
        })
    }
}

impl Launcher for HttpLauncher {
    type Session = HttpSession;

    async fn launch(&self) -> Result<HttpSession, SessionError> {
        Ok(HttpSession {
            client: self.client.clone(),
            current: None,
        })
    }
}

/// Navigator over plain GET requests; the last response is the "page".
#[derive(Debug)]
pub struct HttpSession {
    client: Client,
    current: Option<Snapshot>,
}

impl Navigator for HttpSession {
    #[instrument(level = "debug", skip_all, fields(%url))]
    async fn navigate(&mut self, url: &str, timeout: Duration) -> NavOutcome {
        match get_snapshot(&self.client, url, timeout).await {
            Ok(snapshot) => {
                self.current = Some(snapshot);
                NavOutcome::Loaded
            }
            Err(e) => {
                let outcome = NavOutcome::from_error(e);
                debug!(?outcome, "HTTP navigation did not complete");
                self.current = outcome.is_success().then(|| Snapshot {
                    html: String::new(),
                    body_text: String::new(),
                    final_url: url.to_string(),
                });
                outcome
            }
        }
    }

    async fn current_url(&mut self) -> Option<String> {
        self.current.as_ref().map(|s| s.final_url.clone())
    }

    async fn html(&mut self) -> Option<String> {
        self.current.as_ref().map(|s| s.html.clone())
    }

    async fn body_text(&mut self) -> Option<String> {
        self.current.as_ref().map(|s| s.body_text.clone())
    }

    async fn scroll_by(&mut self, _pixels: u32) {}

    async fn wait_for(&mut self, selector: &str, _timeout: Duration) -> bool {
        let (Some(snapshot), Ok(sel)) = (&self.current, Selector::parse(selector)) else {
            return false;
        };
        Html::parse_document(&snapshot.html).select(&sel).next().is_some()
    }

    async fn close(self) {}
}

/// Stateless fetcher shared by concurrent deep-dive tasks.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(settings: &Settings) -> Result<Self, SessionError> {
        Ok(Self {
            client: build_client(settings)?,
            timeout: settings.page_load_timeout(),
        })
    }
}

impl Fetch for HttpFetcher {
    #[instrument(level = "debug", skip_all, fields(%url))]
    async fn fetch(&self, url: &str) -> Result<Snapshot, NavError> {
        get_snapshot(&self.client, url, self.timeout).await
    }
}
