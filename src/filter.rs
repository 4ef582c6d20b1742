use regex::Regex;
use serde::{Deserialize, Serialize};

/// Rule table for recognising site navigation chrome (menus, breadcrumbs, footers)
///
/// Every list and threshold is data so the heuristics can be tuned per site
/// without touching the extractor or the differ.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavFilterConfig {
    /// Phrases counted as substrings of the lowercased text
    #[serde(default = "default_keywords")]
    pub keywords: Vec<String>,

    /// Single words counted by the looser residual filter
    #[serde(default = "default_core_keywords")]
    pub core_keywords: Vec<String>,

    /// Regexes matched against the lowercased text; any hit means navigation
    #[serde(default = "default_patterns")]
    pub patterns: Vec<String>,

    /// Keyword counting only applies to text shorter than this many characters
    #[serde(default = "default_max_text_len")]
    pub max_text_len: usize,

    /// Distinct keywords needed before short text counts as navigation
    #[serde(default = "default_min_keyword_matches")]
    pub min_keyword_matches: usize,

    /// Keyword matches per word above which text counts as navigation
    #[serde(default = "default_keyword_ratio")]
    pub keyword_ratio: f64,

    /// Core keyword words per word above which a diff fragment is dropped
    #[serde(default = "default_core_keyword_ratio")]
    pub core_keyword_ratio: f64,

    /// Diff fragments shorter than this (trimmed, in characters) are dropped
    #[serde(default = "default_min_fragment_len")]
    pub min_fragment_len: usize,
}

fn default_keywords() -> Vec<String> {
    [
        "menu",
        "home",
        "about",
        "about us",
        "our team",
        "what we do",
        "social responsibility",
        "news",
        "faq",
        "venture",
        "portfolio",
        "testimonials",
        "overview",
        "work with us",
        "contact",
        "login",
        "courses",
        "resources",
        "archives",
        "gateway",
        "investor login",
        "innovator resources",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_core_keywords() -> Vec<String> {
    [
        "menu", "home", "about", "contact", "login", "portfolio", "venture", "team", "news", "faq",
        "overview",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_patterns() -> Vec<String> {
    vec![
        // "menu ... home ... about"
        r"\bmenu\b.*\bhome\b.*\babout\b".to_string(),
        // Breadcrumbs such as "Home / Venture / Portfolio"
        r"\bhome\s*/\s*\w+\s*/\s*\w+".to_string(),
        // A long run of words that ends in a nav term
        r"(\w+\s+){5,}.*\b(home|about|contact|login)\b".to_string(),
    ]
}

fn default_max_text_len() -> usize {
    500
}

fn default_min_keyword_matches() -> usize {
    3
}

fn default_keyword_ratio() -> f64 {
    0.3
}

fn default_core_keyword_ratio() -> f64 {
    0.4
}

fn default_min_fragment_len() -> usize {
    20
}

impl Default for NavFilterConfig {
    fn default() -> Self {
        Self {
            keywords: default_keywords(),
            core_keywords: default_core_keywords(),
            patterns: default_patterns(),
            max_text_len: default_max_text_len(),
            min_keyword_matches: default_min_keyword_matches(),
            keyword_ratio: default_keyword_ratio(),
            core_keyword_ratio: default_core_keyword_ratio(),
            min_fragment_len: default_min_fragment_len(),
        }
    }
}

/// Heuristic predicate deciding whether a fragment of text is navigation chrome
#[derive(Debug)]
pub struct NavFilter {
    config: NavFilterConfig,
    keywords: Vec<String>,
    core_keywords: Vec<String>,
    patterns: Vec<Regex>,
}

impl Default for NavFilter {
    fn default() -> Self {
        Self::new(NavFilterConfig::default()).expect("Default navigation patterns should be valid")
    }
}

impl NavFilter {
    /// Compile a navigation filter from its rule table
    pub fn new(config: NavFilterConfig) -> Result<Self, regex::Error> {
        let mut patterns = Vec::with_capacity(config.patterns.len());
        for pattern in &config.patterns {
            patterns.push(Regex::new(pattern)?);
        }

        let keywords = config.keywords.iter().map(|k| k.to_lowercase()).collect();
        let core_keywords = config
            .core_keywords
            .iter()
            .map(|k| k.to_lowercase())
            .collect();

        Ok(Self {
            config,
            keywords,
            core_keywords,
            patterns,
        })
    }

    /// The rule table this filter was compiled from
    pub fn config(&self) -> &NavFilterConfig {
        &self.config
    }

    /// Determine if text looks like menu, breadcrumb or other site chrome
    pub fn is_navigation(&self, text: &str) -> bool {
        if text.trim().is_empty() {
            return false;
        }

        let lower = text.to_lowercase();
        let keyword_count = self.keyword_matches(&lower);

        // Short text dense with nav keywords
        if text.chars().count() < self.config.max_text_len
            && keyword_count >= self.config.min_keyword_matches
        {
            return true;
        }

        if self.patterns.iter().any(|re| re.is_match(&lower)) {
            return true;
        }

        let word_count = text.split_whitespace().count();
        word_count > 0 && (keyword_count as f64 / word_count as f64) > self.config.keyword_ratio
    }

    /// Looser check applied only to diff fragments after the main filter
    ///
    /// Drops anything [`is_navigation`](Self::is_navigation) flags, very short
    /// fragments, and fragments made mostly of core navigation words.
    pub fn is_residual_fragment(&self, text: &str) -> bool {
        if self.is_navigation(text) {
            return true;
        }

        if text.trim().chars().count() < self.config.min_fragment_len {
            return true;
        }

        let lower = text.to_lowercase();
        let words: Vec<&str> = lower.split_whitespace().collect();
        if words.is_empty() {
            return true;
        }
        let core_count = words
            .iter()
            .filter(|w| self.core_keywords.iter().any(|k| k == *w))
            .count();
        (core_count as f64 / words.len() as f64) > self.config.core_keyword_ratio
    }

    /// Number of distinct keywords present in already-lowercased text
    fn keyword_matches(&self, lower: &str) -> usize {
        self.keywords
            .iter()
            .filter(|keyword| lower.contains(keyword.as_str()))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_menu_text_is_navigation() {
        let filter = NavFilter::default();

        let menu = "RA Capital menu Home about us About RA Capital Our Team What We Do \
                    Social Responsibility News faq venture Venture AT RA Our Portfolio";
        assert!(filter.is_navigation(menu));

        // Three distinct keywords in short text
        assert!(filter.is_navigation("News FAQ Contact"));
    }

    #[test]
    fn test_structural_patterns() {
        let filter = NavFilter::default();

        // Breadcrumb
        assert!(filter.is_navigation("Home / Venture / Portfolio"));

        // menu ... home ... about
        assert!(filter.is_navigation("Open menu, go home or read about"));

        // Long run of words ending in a nav term
        assert!(filter.is_navigation("for more details please click the link to contact"));
    }

    #[test]
    fn test_keyword_ratio() {
        let filter = NavFilter::default();

        // One keyword in one word: ratio 1.0
        assert!(filter.is_navigation("Portfolio"));
        assert!(filter.is_navigation("Login"));
    }

    #[test]
    fn test_content_is_not_navigation() {
        let filter = NavFilter::default();

        assert!(!filter.is_navigation(""));
        assert!(!filter.is_navigation("   "));
        assert!(!filter.is_navigation("ABCL and XYZCORP listed."));
        assert!(!filter.is_navigation("Acme Therapeutics closes its Series B financing"));
        assert!(!filter.is_navigation("NEWCO"));
    }

    #[test]
    fn test_residual_fragment_filter() {
        let filter = NavFilter::default();

        // Too short
        assert!(filter.is_residual_fragment("NEWCO added."));

        // Mostly core words (3 of 6 words), but not caught by the main rules
        assert!(filter.is_residual_fragment("team team team of the firm"));

        // Real content survives
        assert!(!filter.is_residual_fragment("ABCL listed. NEWCO added."));
        assert!(!filter.is_residual_fragment("Acme Therapeutics joins the fund"));
    }

    #[test]
    fn test_custom_keywords() {
        let config = NavFilterConfig {
            keywords: vec!["techatlas".to_string(), "planetary".to_string(), "rapport".to_string()],
            patterns: vec![],
            ..NavFilterConfig::default()
        };
        let filter = NavFilter::new(config).unwrap();

        assert!(filter.is_navigation("TechAtlas Planetary Rapport"));
        // Default keywords no longer apply
        assert!(!filter.is_navigation("Home"));
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        let config = NavFilterConfig {
            patterns: vec!["(unclosed".to_string()],
            ..NavFilterConfig::default()
        };
        assert!(NavFilter::new(config).is_err());
    }
}
