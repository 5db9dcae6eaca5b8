//! Boilerplate stripping for extracted page text.

/// Line filter applied to every extracted body.
#[derive(Debug, Clone)]
pub struct TextCleaner {
    min_chars: usize,
    keywords: Vec<String>,
}

impl TextCleaner {
    /// Build a cleaner.
    ///
    /// # Arguments
    /// * `min_chars` - Shortest line kept, in characters
    /// * `keywords` - Boilerplate terms, matched case-insensitively
    pub fn new(min_chars: usize, keywords: &[String]) -> Self {
        Self {
            min_chars,
            keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
        }
    }

    /// `true` if a trimmed line is long enough and free of boilerplate terms.
    pub fn keeps(&self, line: &str) -> bool {
        if line.chars().count() < self.min_chars {
            return false;
        }
        let lower = line.to_lowercase();
        !self.keywords.iter().any(|k| lower.contains(k.as_str()))
    }

    /// Split raw text into lines and keep the ones that look like prose,
    /// preserving order.
    pub fn clean(&self, raw: &str) -> Vec<String> {
        raw.lines()
            .map(str::trim)
            .filter(|line| self.keeps(line))
            .map(str::to_string)
            .collect()
    }
}
