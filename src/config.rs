//! Runtime settings for the crawl pipeline.
//!
//! Every knob has a default matching the production aggregator (Google News,
//! Brazilian Portuguese edition). A YAML file passed with `--config` can
//! override any subset of fields:
//!
//! ```yaml
//! cooldown_secs: 20
//! default_max_items: 5
//! chrome:
//!   no_sandbox: true
//! ```

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, instrument};
use url::Url;

/// Fixed desktop user-agent presented by both navigation engines.
pub const DESKTOP_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid aggregator base url \"{0}\"")]
    BaseUrl(String),
}

/// A named fallback topic used when discovery comes back empty.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct FallbackTopic {
    pub title: String,
    pub url: String,
}

/// Options for the headless Chrome engine.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ChromeSettings {
    /// Pass `--no-sandbox` (needed inside most containers).
    pub no_sandbox: bool,
    /// Explicit Chrome/Chromium binary; auto-detected when unset.
    pub executable: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Aggregator origin; relative `./…` hrefs are resolved against it.
    pub aggregator_base: String,
    /// Locale query appended to the home page and fallback topics.
    pub locale_query: String,
    /// Category names a topic label must contain, in priority order.
    pub priority_topics: Vec<String>,
    pub fallback_topics: Vec<FallbackTopic>,
    pub user_agent: String,
    pub accept_language: String,

    pub page_load_timeout_secs: u64,
    pub resolve_wait_secs: u64,
    pub resolve_poll_millis: u64,
    pub cooldown_secs: u64,
    pub jitter_min_millis: u64,
    pub jitter_max_millis: u64,
    pub scroll_step_px: u32,
    pub scroll_pause_millis: u64,
    pub render_wait_secs: u64,

    pub default_max_items: usize,
    pub headline_cap: usize,
    pub min_title_chars: usize,
    pub min_body_chars: usize,
    pub min_paragraph_chars: usize,
    pub dive_min_text_chars: usize,
    pub dive_concurrency: usize,

    pub paywall_markers: Vec<String>,
    pub boilerplate_keywords: Vec<String>,
    /// Reader mirror; the real article URL is appended verbatim.
    pub fallback_mirror_base: String,

    pub chrome: ChromeSettings,
}

impl Default for Settings {
    fn default() -> Self {
        let locale_query = "hl=pt-BR&gl=BR&ceid=BR%3Apt-419".to_string();
        Self {
            aggregator_base: "https://news.google.com".to_string(),
            fallback_topics: vec![FallbackTopic {
                title: "Brasil".to_string(),
                url: format!(
                    "https://news.google.com/topics/CAAqJggKIiBDQkFTRWvfQUwyXzhTblF5Y0c1bEpXNnRNU0FBUW9BQVAB?{locale_query}"
                ),
            }],
            locale_query,
            priority_topics: [
                "Brasil",
                "Mundo",
                "Local",
                "Negócios",
                "Tecnologia",
                "Entretenimento",
                "Esportes",
                "Saúde",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            user_agent: DESKTOP_USER_AGENT.to_string(),
            accept_language: "pt-BR,pt;q=0.9,en-US;q=0.8,en;q=0.7".to_string(),

            page_load_timeout_secs: 30,
            resolve_wait_secs: 10,
            resolve_poll_millis: 250,
            cooldown_secs: 10,
            jitter_min_millis: 100,
            jitter_max_millis: 500,
            scroll_step_px: 1000,
            scroll_pause_millis: 400,
            render_wait_secs: 10,

            default_max_items: 10,
            headline_cap: 30,
            min_title_chars: 10,
            min_body_chars: 500,
            min_paragraph_chars: 40,
            dive_min_text_chars: 200,
            dive_concurrency: 8,

            paywall_markers: vec![
                "exclusivo para assinantes".to_string(),
                "exclusive to subscribers".to_string(),
            ],
            boilerplate_keywords: [
                "assine",
                "assinante",
                "cadastre-se",
                "newsletter",
                "compartilhe",
                "compartilhar",
                "leia também",
                "leia mais",
                "publicidade",
                "todos os direitos reservados",
                "política de privacidade",
                "cookies",
                "subscribe",
                "sign in",
                "log in",
                "share this",
                "advertisement",
                "all rights reserved",
                "privacy policy",
                "whatsapp",
                "facebook",
                "twitter",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            fallback_mirror_base: "https://r.jina.ai/".to_string(),

            chrome: ChromeSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from a YAML file, or the defaults when no path is given.
    #[instrument(level = "info")]
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(Path::new(path)).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        let settings: Settings = serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })?;
        settings.base_url()?;
        info!(path, "Loaded settings");
        Ok(settings)
    }

    /// Parsed `aggregator_base`.
    pub fn base_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.aggregator_base).map_err(|_| ConfigError::BaseUrl(self.aggregator_base.clone()))
    }

    /// Host of the aggregator, e.g. `news.google.com`.
    pub fn aggregator_host(&self) -> String {
        self.base_url()
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| self.aggregator_base.clone())
    }

    /// Aggregator home page with the locale query appended.
    pub fn home_url(&self) -> String {
        format!("{}/?{}", self.aggregator_base.trim_end_matches('/'), self.locale_query)
    }

    /// Bound for a single page load. Also bounds browser teardown.
    pub fn page_load_timeout(&self) -> Duration {
        Duration::from_secs(self.page_load_timeout_secs)
    }

    /// How long to wait for a redirect token to leave the aggregator.
    pub fn resolve_wait(&self) -> Duration {
        Duration::from_secs(self.resolve_wait_secs)
    }

    /// Interval between location checks while resolving. Never zero.
    pub fn resolve_poll(&self) -> Duration {
        Duration::from_millis(self.resolve_poll_millis.max(1))
    }

    /// Pause before restarting a session that stopped redirecting.
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn render_wait(&self) -> Duration {
        Duration::from_secs(self.render_wait_secs)
    }

    /// Delay between scroll steps on headline pages.
    pub fn scroll_pause(&self) -> Duration {
        Duration::from_millis(self.scroll_pause_millis)
    }

    /// Reader mirror address for an article.
    ///
    /// # Arguments
    /// * `real_url` - Publisher URL, appended verbatim
    ///
    /// # Returns
    /// e.g. `https://r.jina.ai/https://www.bbc.com/news/x`
    pub fn mirror_url(&self, real_url: &str) -> String {
        format!("{}{}", self.fallback_mirror_base, real_url)
    }
}
