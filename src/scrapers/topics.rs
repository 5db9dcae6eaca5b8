//! Topic discovery from the aggregator home page.
//!
//! Topic labels are short category names ("Tecnologia", "Esportes"), so only
//! `./topics/` anchors with a label between 3 and 19 characters are kept;
//! longer matches are usually unrelated links sharing the same path prefix.

use super::{LinkKind, classify_href};
use crate::config::Settings;
use crate::dom::element_text;
use crate::models::TopicRef;
use crate::session::Navigator;
use itertools::Itertools;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use tracing::{debug, info, instrument, warn};

static ANCHORS: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").expect("static selector"));

const MIN_LABEL_CHARS: usize = 3;
const MAX_LABEL_CHARS: usize = 19;

/// Index of the first priority name contained in `title`, case-insensitively.
fn priority_index(title: &str, priorities: &[String]) -> Option<usize> {
    let lower = title.to_lowercase();
    priorities.iter().position(|p| lower.contains(&p.to_lowercase()))
}

/// Extract the prioritized topic list from home page HTML.
pub fn parse_topics(html: &str, settings: &Settings) -> Vec<TopicRef> {
    let Ok(base) = settings.base_url() else {
        return Vec::new();
    };
    let host = settings.aggregator_host();
    let document = Html::parse_document(html);

    let mut topics: Vec<(usize, TopicRef)> = document
        .select(&ANCHORS)
        .filter_map(|a| {
            let href = a.value().attr("href")?;
            let (url, kind) = classify_href(&base, href, &host)?;
            if kind != LinkKind::Topic {
                return None;
            }
            let title = element_text(a);
            let len = title.chars().count();
            if !(MIN_LABEL_CHARS..=MAX_LABEL_CHARS).contains(&len) {
                return None;
            }
            let rank = priority_index(&title, &settings.priority_topics)?;
            Some((
                rank,
                TopicRef {
                    title,
                    url: url.to_string(),
                },
            ))
        })
        .unique_by(|(_, topic)| topic.url.clone())
        .collect();

    topics.sort_by_key(|(rank, _)| *rank);
    topics.into_iter().map(|(_, topic)| topic).collect()
}

/// Load the home page and return its topics, or an empty list on any failure.
#[instrument(level = "info", skip_all)]
pub async fn discover_topics<N: Navigator>(nav: &mut N, settings: &Settings) -> Vec<TopicRef> {
    let home = settings.home_url();
    let outcome = nav.navigate(&home, settings.page_load_timeout()).await;
    if !outcome.is_success() {
        warn!(url = %home, ?outcome, "Home page failed to load");
        return Vec::new();
    }
    let Some(html) = nav.html().await else {
        warn!(url = %home, "Home page produced no HTML");
        return Vec::new();
    };
    let topics = parse_topics(&html, settings);
    info!(count = topics.len(), "Discovered topics");
    debug!(topics = ?topics, "Topics");
    topics
}

/// Hardcoded topic list used when discovery finds nothing.
pub fn fallback_topics(settings: &Settings) -> Vec<TopicRef> {
    settings
        .fallback_topics
        .iter()
        .map(|t| TopicRef {
            title: t.title.clone(),
            url: t.url.clone(),
        })
        .collect()
}

/// Pick the topic whose title contains `wanted` (case-insensitive), else the
/// first topic.
pub fn select_topic(topics: &[TopicRef], wanted: Option<&str>) -> Option<TopicRef> {
    if let Some(wanted) = wanted {
        let wanted = wanted.to_lowercase();
        if let Some(hit) = topics.iter().find(|t| t.title.to_lowercase().contains(&wanted)) {
            return Some(hit.clone());
        }
    }
    topics.first().cloned()
}
