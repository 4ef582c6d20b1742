//! Heuristics that pull candidate company or entity names out of free text,
//! image metadata and link metadata.

use crate::filter::NavFilter;
use crate::parsers::text::{file_stem, is_title, is_upper};
use crate::snapshot::{ImageRecord, LinkRecord};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Word lists steering the name heuristics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NameRules {
    /// Capitalised words that are never names on their own
    #[serde(default = "default_stop_words")]
    pub stop_words: Vec<String>,

    /// Words that mark the preceding token as a company name ("Acme Corp")
    #[serde(default = "default_company_indicators")]
    pub company_indicators: Vec<String>,

    /// Link texts containing any of these are calls to action, not names
    #[serde(default = "default_action_words")]
    pub action_words: Vec<String>,

    /// URL path segments that never name a company
    #[serde(default = "default_url_stop_segments")]
    pub url_stop_segments: Vec<String>,

    /// File names that never name a company
    #[serde(default = "default_generic_file_names")]
    pub generic_file_names: Vec<String>,
}

fn to_strings(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| w.to_string()).collect()
}

fn default_stop_words() -> Vec<String> {
    to_strings(&[
        "The", "And", "Or", "But", "For", "With", "From", "To", "Of", "In", "On", "At", "By",
    ])
}

fn default_company_indicators() -> Vec<String> {
    to_strings(&[
        "Company",
        "Corp",
        "Ltd",
        "Inc",
        "LLC",
        "Holdings",
        "Group",
        "Industries",
    ])
}

fn default_action_words() -> Vec<String> {
    to_strings(&[
        "visit", "site", "learn", "more", "read", "view", "click", "here",
    ])
}

fn default_url_stop_segments() -> Vec<String> {
    to_strings(&[
        "www",
        "com",
        "org",
        "net",
        "http",
        "https",
        "portfolio",
        "company",
        "about",
    ])
}

fn default_generic_file_names() -> Vec<String> {
    to_strings(&["image", "logo", "photo", "pic", "banner"])
}

impl Default for NameRules {
    fn default() -> Self {
        Self {
            stop_words: default_stop_words(),
            company_indicators: default_company_indicators(),
            action_words: default_action_words(),
            url_stop_segments: default_url_stop_segments(),
            generic_file_names: default_generic_file_names(),
        }
    }
}

/// Extracts candidate entity names with compiled patterns
#[derive(Debug)]
pub struct NameExtractor {
    rules: NameRules,
    nav: Arc<NavFilter>,
    uppercase: Regex,
    title_case: Regex,
    heading: Regex,
    indicators: Vec<Regex>,
    url_segment: Regex,
}

impl NameExtractor {
    pub fn new(rules: NameRules, nav: Arc<NavFilter>) -> Result<Self, regex::Error> {
        // One pattern per indicator so overlapping phrases are all found
        let indicators = rules
            .company_indicators
            .iter()
            .map(|i| Regex::new(&format!(r"(?i)\b(\w+)\s+{}\b", regex::escape(i))))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            rules,
            nav,
            uppercase: Regex::new(r"\b[A-Z]{2,}\b")?,
            title_case: Regex::new(r"\b[A-Z][a-z]+(?:\s+[A-Z][a-z]+)*\b")?,
            heading: Regex::new(r"(?i)<h[1-6][^>]*>(.*?)</h[1-6]>")?,
            indicators,
            url_segment: Regex::new(r"/([A-Za-z][A-Za-z0-9]+)")?,
        })
    }

    /// Candidate names found in free text
    ///
    /// Unions all-caps tokens, title-case phrases, literal heading markup and
    /// the word before a company indicator. Entries of two characters or fewer
    /// are dropped; the set is ordered so results are deterministic.
    pub fn extract_candidate_names(&self, text: &str) -> BTreeSet<String> {
        let mut names = BTreeSet::new();

        for m in self.uppercase.find_iter(text) {
            names.insert(m.as_str().to_string());
        }

        for m in self.title_case.find_iter(text) {
            let phrase = m.as_str();
            if phrase.len() > 3 && !self.rules.stop_words.iter().any(|w| w == phrase) {
                names.insert(phrase.to_string());
            }
        }

        for caps in self.heading.captures_iter(text) {
            if let Some(inner) = caps.get(1) {
                let inner = inner.as_str().trim();
                if !inner.is_empty() {
                    names.insert(inner.to_string());
                }
            }
        }

        for indicator in &self.indicators {
            for caps in indicator.captures_iter(text) {
                if let Some(word) = caps.get(1) {
                    names.insert(word.as_str().to_string());
                }
            }
        }

        names.retain(|name| name.chars().count() > 2);
        names
    }

    /// Best single candidate name for an image: alt text, then file name, then title
    pub fn extract_candidate_name_from_image(&self, image: &ImageRecord) -> Option<String> {
        self.name_like(&image.alt)
            .or_else(|| self.name_from_file(&image.src))
            .or_else(|| self.name_like(&image.title))
    }

    /// Best single candidate name for a link: link text, then URL segment, then title
    pub fn extract_candidate_name_from_link(&self, link: &LinkRecord) -> Option<String> {
        self.name_like(&link.text)
            .filter(|text| !self.is_action_text(text))
            .or_else(|| self.name_from_url(&link.href))
            .or_else(|| self.name_like(&link.title))
    }

    /// Upper- or title-case text that is not navigation
    fn name_like(&self, text: &str) -> Option<String> {
        let text = text.trim();
        if text.chars().count() <= 2 || self.nav.is_navigation(text) {
            return None;
        }
        if is_upper(text) || is_title(text) {
            Some(text.to_string())
        } else {
            None
        }
    }

    fn is_action_text(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        self.rules
            .action_words
            .iter()
            .any(|word| lower.contains(word.as_str()))
    }

    /// Uppercased file stem, when it looks like a brand rather than a generic asset name
    fn name_from_file(&self, src: &str) -> Option<String> {
        let stem = file_stem(src)?;
        let compact: String = stem.chars().filter(|c| *c != '-' && *c != '_').collect();
        if stem.chars().count() <= 2
            || compact.is_empty()
            || !compact.chars().all(char::is_alphanumeric)
            || self.is_generic_file_name(stem)
        {
            return None;
        }
        Some(stem.to_uppercase())
    }

    /// First meaningful path segment of a URL, uppercased
    fn name_from_url(&self, href: &str) -> Option<String> {
        self.url_segment
            .captures_iter(href)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str())
            .find(|part| {
                part.len() > 2
                    && !self
                        .rules
                        .url_stop_segments
                        .iter()
                        .any(|stop| stop.eq_ignore_ascii_case(part))
            })
            .map(str::to_uppercase)
    }

    pub(crate) fn is_generic_file_name(&self, stem: &str) -> bool {
        self.rules
            .generic_file_names
            .iter()
            .any(|generic| generic.eq_ignore_ascii_case(stem))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> NameExtractor {
        NameExtractor::new(NameRules::default(), Arc::new(NavFilter::default())).unwrap()
    }

    fn names(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_uppercase_tokens() {
        let found = extractor().extract_candidate_names("ABCL and XYZCORP listed.");
        assert_eq!(found, names(&["ABCL", "XYZCORP"]));
    }

    #[test]
    fn test_title_case_phrases_and_stop_words() {
        let found = extractor().extract_candidate_names("We welcome Acme Therapeutics. The end.");
        assert!(found.contains("Acme Therapeutics"));
        assert!(!found.contains("The"));
        // "We" is too short for a title-case hit
        assert!(!found.contains("We"));
    }

    #[test]
    fn test_heading_markup() {
        let found = extractor().extract_candidate_names("<h3 class=\"name\"> beta labs </h3>");
        assert!(found.contains("beta labs"));
    }

    #[test]
    fn test_company_indicators() {
        let found = extractor().extract_candidate_names("shares of zeta corp and omega ltd rose");
        assert!(found.contains("zeta"));
        assert!(found.contains("omega"));
    }

    #[test]
    fn test_stacked_company_indicators() {
        let found = extractor().extract_candidate_names("backed by acme holdings group");
        assert!(found.contains("acme"));
        assert!(found.contains("holdings"));
    }

    #[test]
    fn test_heading_markup_stays_on_one_line() {
        let found = extractor().extract_candidate_names("<h2>\nsplit name\n</h2>");
        assert!(!found.iter().any(|name| name.contains("split name")));
    }

    #[test]
    fn test_short_candidates_dropped() {
        let found = extractor().extract_candidate_names("AI and ML at QX");
        assert!(found.is_empty());
    }

    #[test]
    fn test_image_name_from_filename() {
        let image = ImageRecord {
            src: "/p/Acme.png".to_string(),
            ..ImageRecord::default()
        };
        assert_eq!(
            extractor().extract_candidate_name_from_image(&image),
            Some("ACME".to_string())
        );
    }

    #[test]
    fn test_image_name_prefers_alt() {
        let image = ImageRecord {
            src: "/p/acme-logo.png".to_string(),
            alt: "Acme Bio".to_string(),
            ..ImageRecord::default()
        };
        assert_eq!(
            extractor().extract_candidate_name_from_image(&image),
            Some("Acme Bio".to_string())
        );
    }

    #[test]
    fn test_image_generic_filename_falls_back_to_title() {
        let image = ImageRecord {
            src: "/img/logo.png".to_string(),
            alt: "company logo".to_string(),
            title: "Gamma Robotics".to_string(),
            ..ImageRecord::default()
        };
        assert_eq!(
            extractor().extract_candidate_name_from_image(&image),
            Some("Gamma Robotics".to_string())
        );

        let image = ImageRecord {
            src: "/img/logo.png".to_string(),
            ..ImageRecord::default()
        };
        assert_eq!(extractor().extract_candidate_name_from_image(&image), None);
    }

    #[test]
    fn test_link_name_from_text() {
        let link = LinkRecord {
            text: "Delta Energy".to_string(),
            href: "https://delta.example.com".to_string(),
            ..LinkRecord::default()
        };
        assert_eq!(
            extractor().extract_candidate_name_from_link(&link),
            Some("Delta Energy".to_string())
        );
    }

    #[test]
    fn test_link_action_text_falls_back_to_url() {
        let link = LinkRecord {
            text: "Visit Site".to_string(),
            href: "https://example.com/portfolio/epsilon".to_string(),
            ..LinkRecord::default()
        };
        assert_eq!(
            extractor().extract_candidate_name_from_link(&link),
            Some("EXAMPLE".to_string())
        );

        let link = LinkRecord {
            text: "Read More".to_string(),
            href: "/portfolio/epsilon".to_string(),
            ..LinkRecord::default()
        };
        assert_eq!(
            extractor().extract_candidate_name_from_link(&link),
            Some("EPSILON".to_string())
        );
    }

    #[test]
    fn test_navigation_text_is_not_a_name() {
        let link = LinkRecord {
            text: "Portfolio".to_string(),
            href: "/".to_string(),
            ..LinkRecord::default()
        };
        assert_eq!(extractor().extract_candidate_name_from_link(&link), None);
    }
}
