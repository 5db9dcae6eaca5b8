//! Scripted in-memory web used by the unit tests.

use super::{Fetch, Launcher, NavOutcome, Navigator, Snapshot};
use crate::dom::visible_text;
use crate::error::{NavError, NavErrorKind, SessionError};
use scraper::{Html, Selector};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct FakePage {
    pub html: String,
    pub body_text: Option<String>,
    pub redirect_to: Option<String>,
    /// Redirect only works in sessions launched at or after this count.
    pub unblocked_from_launch: u32,
    pub hard_fail: bool,
    pub times_out: bool,
}

impl FakePage {
    pub fn html(html: &str) -> Self {
        Self {
            html: html.to_string(),
            ..Default::default()
        }
    }

    pub fn text(body: &str) -> Self {
        Self {
            html: format!("<html><body><p>{body}</p></body></html>"),
            body_text: Some(body.to_string()),
            ..Default::default()
        }
    }

    pub fn redirect(to: &str) -> Self {
        Self {
            redirect_to: Some(to.to_string()),
            ..Default::default()
        }
    }

    pub fn blocked_until_launch(mut self, launch: u32) -> Self {
        self.unblocked_from_launch = launch;
        self
    }

    pub fn failing() -> Self {
        Self {
            hard_fail: true,
            ..Default::default()
        }
    }

    pub fn timing_out(mut self) -> Self {
        self.times_out = true;
        self
    }
}

#[derive(Debug, Default)]
struct WebState {
    pages: HashMap<String, FakePage>,
    visits: Vec<String>,
    launches: u32,
    closes: u32,
    failing_launches: u32,
    scrolls: u32,
}

/// Shared handle to the scripted web; clones see the same state.
#[derive(Debug, Clone, Default)]
pub struct FakeWeb(Arc<Mutex<WebState>>);

impl FakeWeb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, url: &str, page: FakePage) {
        self.0.lock().unwrap().pages.insert(url.to_string(), page);
    }

    pub fn fail_launches(&self, n: u32) {
        self.0.lock().unwrap().failing_launches = n;
    }

    pub fn visits(&self) -> Vec<String> {
        self.0.lock().unwrap().visits.clone()
    }

    pub fn visit_count(&self, url: &str) -> usize {
        self.visits().iter().filter(|v| v.as_str() == url).count()
    }

    pub fn launches(&self) -> u32 {
        self.0.lock().unwrap().launches
    }

    pub fn closes(&self) -> u32 {
        self.0.lock().unwrap().closes
    }

    pub fn scrolls(&self) -> u32 {
        self.0.lock().unwrap().scrolls
    }

    fn page(&self, url: &str) -> Option<FakePage> {
        self.0.lock().unwrap().pages.get(url).cloned()
    }

    /// Follow a scripted redirect for a session launched as `launch`.
    fn land(&self, url: &str, page: &FakePage, launch: u32) -> String {
        match &page.redirect_to {
            Some(to) if launch >= page.unblocked_from_launch => to.clone(),
            _ => url.to_string(),
        }
    }
}

pub struct FakeLauncher {
    web: FakeWeb,
}

impl FakeLauncher {
    pub fn new(web: FakeWeb) -> Self {
        Self { web }
    }
}

impl Launcher for FakeLauncher {
    type Session = FakeSession;

    async fn launch(&self) -> Result<FakeSession, SessionError> {
        let mut state = self.web.0.lock().unwrap();
        if state.failing_launches > 0 {
            state.failing_launches -= 1;
            return Err(SessionError::Launch("scripted launch failure".to_string()));
        }
        state.launches += 1;
        Ok(FakeSession {
            web: self.web.clone(),
            launch: state.launches,
            current: None,
        })
    }
}

pub struct FakeSession {
    web: FakeWeb,
    launch: u32,
    current: Option<String>,
}

impl FakeSession {
    fn current_page(&self) -> Option<FakePage> {
        self.current.as_deref().and_then(|u| self.web.page(u))
    }
}

impl Navigator for FakeSession {
    async fn navigate(&mut self, url: &str, _timeout: Duration) -> NavOutcome {
        self.web.0.lock().unwrap().visits.push(url.to_string());
        let Some(page) = self.web.page(url) else {
            return NavOutcome::Failed(NavError::new(NavErrorKind::Fatal, url, "ERR_NAME_NOT_RESOLVED"));
        };
        if page.hard_fail {
            return NavOutcome::Failed(NavError::new(NavErrorKind::Fatal, url, "ERR_CONNECTION_REFUSED"));
        }
        self.current = Some(self.web.land(url, &page, self.launch));
        if page.times_out {
            return NavOutcome::Partial(NavError::new(NavErrorKind::Timeout, url, ""));
        }
        NavOutcome::Loaded
    }

    async fn current_url(&mut self) -> Option<String> {
        self.current.clone()
    }

    async fn html(&mut self) -> Option<String> {
        self.current_page().map(|p| p.html)
    }

    async fn body_text(&mut self) -> Option<String> {
        self.current_page()
            .map(|p| p.body_text.unwrap_or_else(|| visible_text(&Html::parse_document(&p.html))))
    }

    async fn scroll_by(&mut self, _pixels: u32) {
        self.web.0.lock().unwrap().scrolls += 1;
    }

    async fn wait_for(&mut self, selector: &str, _timeout: Duration) -> bool {
        let Ok(sel) = Selector::parse(selector) else {
            return false;
        };
        self.current_page()
            .map(|p| Html::parse_document(&p.html).select(&sel).next().is_some())
            .unwrap_or(false)
    }

    async fn close(self) {
        self.web.0.lock().unwrap().closes += 1;
    }
}

impl Fetch for FakeWeb {
    async fn fetch(&self, url: &str) -> Result<Snapshot, NavError> {
        self.0.lock().unwrap().visits.push(url.to_string());
        let page = self
            .page(url)
            .ok_or_else(|| NavError::new(NavErrorKind::Fatal, url, "not scripted"))?;
        if page.hard_fail {
            return Err(NavError::new(NavErrorKind::Fatal, url, "ERR_CONNECTION_REFUSED"));
        }
        let final_url = self.land(url, &page, u32::MAX);
        let landed = self.page(&final_url).unwrap_or(page);
        let body_text = landed
            .body_text
            .clone()
            .unwrap_or_else(|| visible_text(&Html::parse_document(&landed.html)));
        Ok(Snapshot {
            html: landed.html,
            body_text,
            final_url,
        })
    }
}
