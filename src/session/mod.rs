//! Browser/automation sessions and their lifecycle.
//!
//! A [`Navigator`] is one stateful session: it holds the "current page" as
//! implicit state, so every navigation goes through `&mut self` and only one
//! can be in flight. A [`Fetch`] is the stateless shape: each call is
//! independent and may run concurrently over a shared `&self`.
//!
//! | Engine | Navigator | Fetch |
//! |--------|-----------|-------|
//! | headless Chrome | [`chrome::ChromeSession`] | [`chrome::ChromeFetcher`] |
//! | plain HTTP | [`http::HttpSession`] | [`http::HttpFetcher`] |
//!
//! [`SessionManager`] owns the single active navigator for a pipeline run and
//! knows how to restart it.

pub mod chrome;
pub mod http;
#[cfg(test)]
pub mod testing;

use crate::error::{NavError, NavErrorKind, SessionError};
use crate::utils::is_aggregator_url;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, instrument, warn};

/// What happened to a navigation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavOutcome {
    /// The page finished loading.
    Loaded,
    /// Timeout or transport hiccup; loading was stopped and whatever rendered
    /// is usable.
    Partial(NavError),
    /// Hard failure. The caller decides whether to restart the session.
    Failed(NavError),
}

impl NavOutcome {
    /// Map a classified driver error to an outcome.
    ///
    /// | kind | outcome |
    /// |------|---------|
    /// | `Timeout` | `Partial` |
    /// | `Transport` | `Partial` |
    /// | `Fatal` | `Failed` |
    pub fn from_error(err: NavError) -> Self {
        match err.kind() {
            NavErrorKind::Timeout | NavErrorKind::Transport => NavOutcome::Partial(err),
            NavErrorKind::Fatal => NavOutcome::Failed(err),
        }
    }

    /// Soft outcomes count as success.
    pub fn is_success(&self) -> bool {
        !matches!(self, NavOutcome::Failed(_))
    }

    /// Whether loading should be stopped before reading the page.
    pub fn needs_stop(&self) -> bool {
        matches!(self, NavOutcome::Partial(_))
    }
}

/// A single stateful browsing session.
pub trait Navigator {
    /// Load `url`, never raising. Soft failures stop loading and report
    /// [`NavOutcome::Partial`].
    async fn navigate(&mut self, url: &str, timeout: Duration) -> NavOutcome;

    /// Location currently shown by the session.
    async fn current_url(&mut self) -> Option<String>;

    /// Serialized DOM of the current page.
    async fn html(&mut self) -> Option<String>;

    /// Visible text of the page body.
    async fn body_text(&mut self) -> Option<String>;

    async fn scroll_by(&mut self, pixels: u32);

    /// Wait until `selector` matches something, up to `timeout`.
    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> bool;

    /// Tear the session down. Must tolerate an already-dead session.
    async fn close(self);
}

/// Creates fresh [`Navigator`]s.
pub trait Launcher {
    type Session: Navigator;

    async fn launch(&self) -> Result<Self::Session, SessionError>;
}

/// A page captured by a stateless fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub html: String,
    pub body_text: String,
    pub final_url: String,
}

/// Stateless `navigate(url) -> (html, final url)` capability, safe to call
/// concurrently.
pub trait Fetch {
    async fn fetch(&self, url: &str) -> Result<Snapshot, NavError>;
}

/// Owns the one active session of a run.
///
/// Sessions are launched lazily; `restart` drops whatever is there (dead or
/// alive) and launches a new one.
pub struct SessionManager<L: Launcher> {
    launcher: L,
    active: Option<L::Session>,
    launches: u32,
}

impl<L: Launcher> SessionManager<L> {
    pub fn new(launcher: L) -> Self {
        Self {
            launcher,
            active: None,
            launches: 0,
        }
    }

    /// Return the active session, launching one if needed.
    #[instrument(level = "debug", skip_all)]
    pub async fn acquire(&mut self) -> Result<&mut L::Session, SessionError> {
        let session = match self.active.take() {
            Some(session) => session,
            None => {
                let session = self.launcher.launch().await?;
                self.launches += 1;
                info!(launches = self.launches, "Browser session acquired");
                session
            }
        };
        Ok(self.active.insert(session))
    }

    /// Discard the current session (if any) and acquire a new one.
    #[instrument(level = "info", skip_all)]
    pub async fn restart(&mut self) -> Result<(), SessionError> {
        if let Some(old) = self.active.take() {
            old.close().await;
            debug!("Previous session closed");
        }
        match self.acquire().await {
            Ok(_) => Ok(()),
            Err(e) => {
                warn!(error = %e, "Session restart failed");
                Err(e)
            }
        }
    }

    /// Close the active session. Safe to call any number of times.
    pub async fn release(&mut self) {
        if let Some(session) = self.active.take() {
            session.close().await;
            info!("Browser session released");
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Number of sessions launched so far.
    pub fn launches(&self) -> u32 {
        self.launches
    }
}

/// Poll the session location until it leaves the aggregator host or `wait`
/// elapses. Returns whatever location was last observed.
pub async fn wait_for_host_change<N: Navigator>(
    nav: &mut N,
    aggregator_host: &str,
    wait: Duration,
    poll: Duration,
) -> Option<String> {
    let deadline = Instant::now() + wait;
    let mut last = nav.current_url().await;
    loop {
        if let Some(url) = &last {
            if !is_aggregator_url(url, aggregator_host) {
                return last;
            }
        }
        if Instant::now() >= deadline {
            debug!(location = ?last, "Host did not change before the wait elapsed");
            return last;
        }
        sleep(poll).await;
        last = nav.current_url().await.or(last);
    }
}
