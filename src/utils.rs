//! Utility functions for URL handling, string manipulation and file system checks.
//!
//! - Host helpers used to enforce the "never the aggregator" invariant
//! - Image URL normalization for headline cards
//! - Jittered delays between requests
//! - Logging and filename helpers
//! - Output directory validation

use rand::{Rng, rng};
use std::error::Error;
use std::fs as stdfs;
use std::time::Duration;
use tokio::fs;
use tracing::{info, instrument};
use url::Url;

/// Publisher host of `url` with a leading `www.` stripped.
///
/// ```ignore
/// assert_eq!(source_domain("https://www.bbc.com/x"), Some("bbc.com".into()));
/// ```
pub fn source_domain(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    Some(host.strip_prefix("www.").unwrap_or(host).to_string())
}

/// `true` when `url` is on the aggregator host or one of its subdomains.
///
/// Unparseable URLs count as "still on the aggregator" so they never reach
/// the extractor.
pub fn is_aggregator_url(url: &str, aggregator_host: &str) -> bool {
    match Url::parse(url).ok().as_ref().and_then(Url::host_str) {
        Some(host) => is_aggregator_host(host, aggregator_host),
        None => true,
    }
}

/// Compare a host against the aggregator host.
///
/// # Arguments
/// * `host` - Host as it appears in a URL (any case, optional trailing dot)
/// * `aggregator_host` - Configured aggregator host, e.g. `news.google.com`
///
/// # Returns
/// `true` for the aggregator itself and for any of its subdomains.
pub fn is_aggregator_host(host: &str, aggregator_host: &str) -> bool {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    let agg = aggregator_host.trim_end_matches('.').to_ascii_lowercase();
    host == agg || host.ends_with(&format!(".{agg}"))
}

/// Normalize an image URL found inside a headline card.
///
/// Keeps inline data URIs and the aggregator's image CDN, drops favicons,
/// tracking pixels, internal attachment endpoints and anything that is not an
/// absolute http(s) URL.
pub fn clean_image_url(raw: Option<&str>) -> Option<String> {
    let url = raw?.trim();
    if url.is_empty() {
        return None;
    }
    if url.starts_with("data:image") {
        return Some(url.to_string());
    }
    if url.contains("googleusercontent.com") {
        return Some(url.to_string());
    }
    let lower = url.to_ascii_lowercase();
    if lower.contains("/api/attachments/") || lower.contains("favicon") {
        return None;
    }
    if !lower.starts_with("http") {
        return None;
    }
    let parsed = Url::parse(&lower).ok()?;
    let file = parsed.path_segments().and_then(|mut s| s.next_back()).unwrap_or_default();
    if is_tracking_pixel(file) {
        return None;
    }
    Some(url.to_string())
}

/// Filenames used by beacons and spacers: `pixel.gif`, `1x1.png`,
/// `spacer.gif`, or a bare `/pixel` endpoint.
fn is_tracking_pixel(file: &str) -> bool {
    let stem = file.split_once('.').map_or(file, |(stem, _)| stem);
    matches!(stem, "pixel" | "1x1" | "spacer" | "blank" | "tracking-pixel" | "tracking_pixel")
}

/// Collapse every run of whitespace into a single space and trim.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Random delay in `[min_ms, max_ms]`.
pub fn jitter(min_ms: u64, max_ms: u64) -> Duration {
    if max_ms <= min_ms {
        return Duration::from_millis(min_ms);
    }
    Duration::from_millis(rng().random_range(min_ms..=max_ms))
}

/// Truncate a string for logging purposes.
///
/// Long strings are cut to at most `max` bytes (on a char boundary) with an
/// ellipsis and a remaining byte count appended.
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// Convert a title to a filename-friendly slug.
pub fn slugify_title(title: &str) -> String {
    title
        .to_lowercase()
        .replace(|c: char| !c.is_alphanumeric() && c != ' ' && c != '-', "")
        .replace(' ', "-")
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if needed, then creates and removes a marker file.
#[instrument(level = "info", skip_all, fields(path = %path))]
pub async fn ensure_writable_dir(path: &str) -> Result<(), Box<dyn Error>> {
    fs::create_dir_all(path).await?;
    let marker_path = format!("{}/..__write_check__", path.trim_end_matches('/'));
    stdfs::File::create(&marker_path)?;
    let _ = stdfs::remove_file(&marker_path);
    info!("Output directory is writable");
    Ok(())
}
