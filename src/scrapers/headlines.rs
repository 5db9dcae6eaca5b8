//! Headline card scanning for topic and story pages.
//!
//! The aggregator does not wrap cards in a reliable semantic container, so
//! every anchor on the page is considered. When an anchor's own text is too
//! short to be a headline ("Veja mais", "Cobertura completa"), the card is
//! located by walking up the tree to the nearest ancestor holding an image or
//! a heading, and the title is taken from there.

use super::{LinkKind, classify_href};
use crate::config::Settings;
use crate::dom::{element_text, find_ancestor};
use crate::models::HeadlineCard;
use crate::session::Navigator;
use crate::utils::clean_image_url;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

static ANCHORS: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").expect("static selector"));
static NESTED_ANCHORS: Lazy<Selector> = Lazy::new(|| Selector::parse("a").expect("static selector"));
static CARD_MARKERS: Lazy<Selector> = Lazy::new(|| Selector::parse("img, h3, h4").expect("static selector"));
static HEADINGS: Lazy<Selector> = Lazy::new(|| Selector::parse("h3, h4").expect("static selector"));
static IMAGES: Lazy<Selector> = Lazy::new(|| Selector::parse("img").expect("static selector"));

/// Maximum number of ancestor levels searched for the card container.
pub const CARD_SEARCH_DEPTH: usize = 4;

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Longest anchor text inside `container`; the first one wins ties.
fn longest_anchor_text(container: ElementRef<'_>) -> Option<String> {
    container
        .select(&NESTED_ANCHORS)
        .map(element_text)
        .fold(None, |best: Option<String>, text| match best {
            Some(b) if char_len(&b) >= char_len(&text) => Some(b),
            _ => Some(text),
        })
}

fn card_title(anchor_text: String, container: Option<ElementRef<'_>>, min_chars: usize) -> String {
    if char_len(&anchor_text) >= min_chars {
        return anchor_text;
    }
    let Some(container) = container else {
        return anchor_text;
    };
    container
        .select(&HEADINGS)
        .map(element_text)
        .find(|t| !t.is_empty())
        .or_else(|| longest_anchor_text(container))
        .unwrap_or(anchor_text)
}

fn card_image(container: ElementRef<'_>) -> Option<String> {
    let img = container.select(&IMAGES).next()?;
    let attrs = img.value();
    let raw = attrs
        .attr("src")
        .filter(|s| !s.trim().is_empty())
        .or_else(|| attrs.attr("data-src"))
        .or_else(|| attrs.attr("srcset").and_then(|s| s.split_whitespace().next()));
    clean_image_url(raw)
}

/// Extract headline cards from a rendered topic or story page.
pub fn parse_headlines(html: &str, settings: &Settings) -> Vec<HeadlineCard> {
    let Ok(base) = settings.base_url() else {
        return Vec::new();
    };
    let host = settings.aggregator_host();
    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut cards = Vec::new();

    for anchor in document.select(&ANCHORS) {
        if cards.len() >= settings.headline_cap {
            break;
        }
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let Some((url, kind)) = classify_href(&base, href, &host) else {
            continue;
        };
        if !matches!(kind, LinkKind::Story | LinkKind::Article) {
            continue;
        }
        let url = url.to_string();
        if seen.contains(&url) {
            continue;
        }

        let container = find_ancestor(anchor, CARD_SEARCH_DEPTH, |el| {
            el.select(&CARD_MARKERS).next().is_some()
        });
        let title = card_title(element_text(anchor), container, settings.min_title_chars);
        if char_len(&title) < settings.min_title_chars {
            continue;
        }

        seen.insert(url.clone());
        cards.push(HeadlineCard {
            title,
            url,
            image: container.and_then(card_image),
            is_cluster: kind == LinkKind::Story,
        });
    }
    cards
}

/// Load a topic page, trigger lazy loading and scan its headline cards.
/// Returns an empty list on any failure.
#[instrument(level = "info", skip(nav, settings))]
pub async fn scan_headlines<N: Navigator>(nav: &mut N, topic_url: &str, settings: &Settings) -> Vec<HeadlineCard> {
    let outcome = nav.navigate(topic_url, settings.page_load_timeout()).await;
    if !outcome.is_success() {
        warn!(?outcome, "Topic page failed to load");
        return Vec::new();
    }

    nav.scroll_by(settings.scroll_step_px).await;
    sleep(settings.scroll_pause()).await;
    nav.scroll_by(settings.scroll_step_px).await;
    sleep(settings.scroll_pause()).await;

    let Some(html) = nav.html().await else {
        warn!("Topic page produced no HTML");
        return Vec::new();
    };
    let cards = parse_headlines(&html, settings);
    info!(count = cards.len(), clusters = cards.iter().filter(|c| c.is_cluster).count(), "Scanned headlines");
    debug!(cards = ?cards, "Headline cards");
    cards
}
