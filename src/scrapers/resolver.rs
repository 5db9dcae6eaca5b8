//! Redirect token resolution.
//!
//! Aggregator article links do not answer with an HTTP redirect; the page
//! runs a script that moves the browser to the publisher. The resolver loads
//! the token and watches the location until it leaves the aggregator host.

use crate::config::Settings;
use crate::error::ResolutionFailure;
use crate::session::{NavOutcome, Navigator, wait_for_host_change};
use tracing::{debug, instrument};

/// Follow `link` and return the location the session ends up on.
///
/// The returned URL may still be on the aggregator when the redirect never
/// fired within the wait; callers validate it with
/// [`ResolvedLink::new`](crate::models::ResolvedLink::new). Only a hard
/// navigation failure is an error here.
#[instrument(level = "debug", skip(nav, settings))]
pub async fn resolve_link<N: Navigator>(
    nav: &mut N,
    link: &str,
    settings: &Settings,
) -> Result<String, ResolutionFailure> {
    if let NavOutcome::Failed(err) = nav.navigate(link, settings.page_load_timeout()).await {
        return Err(ResolutionFailure::Navigation(err));
    }
    let host = settings.aggregator_host();
    let location = wait_for_host_change(nav, &host, settings.resolve_wait(), settings.resolve_poll())
        .await
        .unwrap_or_else(|| link.to_string());
    debug!(%location, "Redirect settled");
    Ok(location)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Launcher;
    use crate::session::testing::{FakeLauncher, FakePage, FakeWeb};

    fn settings() -> Settings {
        Settings {
            resolve_wait_secs: 0,
            resolve_poll_millis: 1,
            ..Settings::default()
        }
    }

    #[tokio::test]
    async fn test_follows_client_side_redirect() {
        let web = FakeWeb::new();
        let link = "https://news.google.com/articles/CBMi1";
        web.add(link, FakePage::redirect("https://www.estadao.com.br/economia/juros"));
        let mut session = FakeLauncher::new(web).launch().await.unwrap();
        let url = resolve_link(&mut session, link, &settings()).await.unwrap();
        assert_eq!(url, "https://www.estadao.com.br/economia/juros");
    }

    #[tokio::test]
    async fn test_wait_timeout_returns_aggregator_location() {
        let web = FakeWeb::new();
        let link = "https://news.google.com/articles/CBMi2";
        web.add(link, FakePage::redirect("https://g1.globo.com/x").blocked_until_launch(2));
        let mut session = FakeLauncher::new(web).launch().await.unwrap();
        let url = resolve_link(&mut session, link, &settings()).await.unwrap();
        assert_eq!(url, link);
    }

    #[tokio::test]
    async fn test_soft_timeout_still_resolves() {
        let web = FakeWeb::new();
        let link = "https://news.google.com/articles/CBMi3";
        web.add(link, FakePage::redirect("https://g1.globo.com/y").timing_out());
        let mut session = FakeLauncher::new(web).launch().await.unwrap();
        let url = resolve_link(&mut session, link, &settings()).await.unwrap();
        assert_eq!(url, "https://g1.globo.com/y");
    }

    #[tokio::test]
    async fn test_hard_failure_is_an_error() {
        let web = FakeWeb::new();
        let link = "https://news.google.com/articles/CBMi4";
        web.add(link, FakePage::failing());
        let mut session = FakeLauncher::new(web).launch().await.unwrap();
        let err = resolve_link(&mut session, link, &settings()).await.unwrap_err();
        assert!(matches!(err, ResolutionFailure::Navigation(_)));
    }
}
