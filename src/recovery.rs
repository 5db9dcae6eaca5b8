//! Anti-block recovery around link resolution.
//!
//! When the aggregator starts refusing to redirect, the browser is usually
//! flagged. Each link gets one retry: cool down, throw the session away,
//! launch a fresh one and try again. A link that fails twice is abandoned.

use crate::config::Settings;
use crate::error::ResolutionFailure;
use crate::models::ResolvedLink;
use crate::scrapers::resolver::resolve_link;
use crate::session::{Launcher, SessionManager};
use tokio::time::sleep;
use tracing::{info, instrument, warn};

/// Per-link recovery state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryState {
    /// First resolution attempt on the current session.
    Attempted,
    /// Retry on a freshly restarted session. Failing here abandons the link.
    Recovered,
}

async fn attempt<L: Launcher>(
    manager: &mut SessionManager<L>,
    link: &str,
    settings: &Settings,
) -> Result<ResolvedLink, ResolutionFailure> {
    let nav = manager
        .acquire()
        .await
        .map_err(|e| ResolutionFailure::NoSession(e.to_string()))?;
    let location = resolve_link(nav, link, settings).await?;
    ResolvedLink::new(&location, &settings.aggregator_host())
}

/// Resolve `link` to a publisher URL, restarting the session once if the
/// first attempt fails or stays on the aggregator.
#[instrument(level = "info", skip(manager, settings))]
pub async fn resolve_with_recovery<L: Launcher>(
    manager: &mut SessionManager<L>,
    link: &str,
    settings: &Settings,
) -> Result<ResolvedLink, ResolutionFailure> {
    let mut state = RecoveryState::Attempted;
    loop {
        let failure = match attempt(manager, link, settings).await {
            Ok(resolved) => {
                if state == RecoveryState::Recovered {
                    info!(url = %resolved.as_str(), "Resolved after session restart");
                }
                return Ok(resolved);
            }
            Err(failure) => failure,
        };

        match state {
            RecoveryState::Attempted => {
                warn!(error = %failure, cooldown_secs = settings.cooldown_secs, "Resolution failed; cooling down before restart");
                sleep(settings.cooldown()).await;
                if let Err(e) = manager.restart().await {
                    warn!(error = %e, "Restart failed; abandoning link");
                    return Err(ResolutionFailure::NoSession(e.to_string()));
                }
                state = RecoveryState::Recovered;
            }
            RecoveryState::Recovered => {
                warn!(error = %failure, "Resolution failed after restart; abandoning link");
                return Err(failure);
            }
        }
    }
}
