//! Pure helpers over a parsed `scraper` document.
//!
//! Nothing here touches the network; the scanners load a page through a
//! session and then hand the HTML to these functions.

use crate::utils::collapse_whitespace;
use ego_tree::iter::Edge;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Node, Selector};

static H1: Lazy<Selector> = Lazy::new(|| Selector::parse("h1").expect("static selector"));
static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("title").expect("static selector"));
static BODY: Lazy<Selector> = Lazy::new(|| Selector::parse("body").expect("static selector"));

const SKIPPED: &[&str] = &["script", "style", "noscript", "template", "svg", "head"];

const BLOCKS: &[&str] = &[
    "p", "div", "section", "article", "header", "footer", "nav", "aside", "main", "li", "ul", "ol",
    "h1", "h2", "h3", "h4", "h5", "h6", "blockquote", "pre", "br", "tr", "td", "th", "figure",
    "figcaption", "form", "table",
];

/// Visible text of an element, whitespace-collapsed.
pub fn element_text(el: ElementRef<'_>) -> String {
    collapse_whitespace(&el.text().collect::<Vec<_>>().join(" "))
}

/// Walk up from `start`'s parent through at most `max_depth` ancestor elements
/// and return the first one matching `stop`.
pub fn find_ancestor<'a, F>(start: ElementRef<'a>, max_depth: usize, stop: F) -> Option<ElementRef<'a>>
where
    F: Fn(ElementRef<'a>) -> bool,
{
    start
        .ancestors()
        .filter_map(ElementRef::wrap)
        .take(max_depth)
        .find(|el| stop(*el))
}

/// First `<h1>` text, falling back to the `<title>` element.
pub fn page_title(doc: &Html) -> Option<String> {
    doc.select(&H1)
        .map(element_text)
        .find(|t| !t.is_empty())
        .or_else(|| doc.select(&TITLE).map(element_text).find(|t| !t.is_empty()))
}

/// Approximation of `document.body.innerText` for HTML fetched without a
/// browser: text of block elements on separate lines, scripts and styles skipped.
pub fn visible_text(doc: &Html) -> String {
    let Some(body) = doc.select(&BODY).next() else {
        return String::new();
    };

    let mut lines: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut skip_depth = 0usize;

    for edge in body.traverse() {
        match edge {
            Edge::Open(node) => match node.value() {
                Node::Element(el) => {
                    let name = el.name();
                    if SKIPPED.contains(&name) {
                        skip_depth += 1;
                    } else if skip_depth == 0 && BLOCKS.contains(&name) {
                        flush(&mut current, &mut lines);
                    }
                }
                Node::Text(text) if skip_depth == 0 => {
                    current.push(' ');
                    current.push_str(text);
                }
                _ => {}
            },
            Edge::Close(node) => {
                if let Node::Element(el) = node.value() {
                    let name = el.name();
                    if SKIPPED.contains(&name) {
                        skip_depth = skip_depth.saturating_sub(1);
                    } else if skip_depth == 0 && BLOCKS.contains(&name) {
                        flush(&mut current, &mut lines);
                    }
                }
            }
        }
    }
    flush(&mut current, &mut lines);
    lines.join("\n")
}

fn flush(current: &mut String, lines: &mut Vec<String>) {
    let line = collapse_whitespace(current);
    if !line.is_empty() {
        lines.push(line);
    }
    current.clear();
}
