//! Error taxonomy for the crawl pipeline.
//!
//! None of these cross a component boundary as a fatal error: components turn
//! them into outcome values or empty results and the orchestrator logs them.
//! The single fatal case is [`PipelineError::Session`] when the first browser
//! session cannot be acquired.

use thiserror::Error;

/// Closed classification of driver-level navigation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavErrorKind {
    /// The page did not finish loading in time. Soft.
    Timeout,
    /// Connection pool exhaustion, dropped socket, read timeout. Soft.
    Transport,
    /// Anything else. Hard; the caller decides whether to restart.
    Fatal,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NavError {
    #[error("navigation to {url} timed out")]
    Timeout { url: String },

    #[error("transport failure while loading {url}: {reason}")]
    Transport { url: String, reason: String },

    #[error("navigation to {url} failed: {reason}")]
    Failure { url: String, reason: String },
}

impl NavError {
    pub fn new(kind: NavErrorKind, url: &str, reason: impl Into<String>) -> Self {
        let url = url.to_string();
        match kind {
            NavErrorKind::Timeout => NavError::Timeout { url },
            NavErrorKind::Transport => NavError::Transport {
                url,
                reason: reason.into(),
            },
            NavErrorKind::Fatal => NavError::Failure {
                url,
                reason: reason.into(),
            },
        }
    }

    pub fn kind(&self) -> NavErrorKind {
        match self {
            NavError::Timeout { .. } => NavErrorKind::Timeout,
            NavError::Transport { .. } => NavErrorKind::Transport,
            NavError::Failure { .. } => NavErrorKind::Fatal,
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to launch browser session: {0}")]
    Launch(String),

    #[error("failed to build http client: {0}")]
    Client(#[from] reqwest::Error),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolutionFailure {
    #[error("redirect navigation failed: {0}")]
    Navigation(NavError),

    #[error("link still points at the aggregator: {0}")]
    StillOnAggregator(String),

    #[error("resolved location is not a usable url: {0}")]
    Malformed(String),

    #[error("no browser session available: {0}")]
    NoSession(String),
}

/// Why a tier refused a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    Navigation(NavError),
    TooShort { chars: usize, min: usize },
    Paywalled { marker: String },
    NoParagraphs,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("{url} rejected: {reason:?}")]
    Rejected { url: String, reason: RejectReason },

    #[error("both extraction tiers failed for {url}")]
    Failure { url: String },
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Session(#[from] SessionError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nav_error_kind_round_trips_through_constructor() {
        for kind in [NavErrorKind::Timeout, NavErrorKind::Transport, NavErrorKind::Fatal] {
            assert_eq!(NavError::new(kind, "https://a.com", "boom").kind(), kind);
        }
    }

    #[test]
    fn test_error_messages_carry_url() {
        let err = NavError::new(NavErrorKind::Fatal, "https://a.com", "net::ERR_NAME_NOT_RESOLVED");
        assert_eq!(
            err.to_string(),
            "navigation to https://a.com failed: net::ERR_NAME_NOT_RESOLVED"
        );
    }
}
