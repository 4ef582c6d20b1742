use crate::changes::Change;
use crate::config::MonitorConfig;
use crate::diff::Differ;
use crate::error::Result;
use crate::filter::{NavFilter, NavFilterConfig};
use crate::parsers::{ExtractionRules, Extractor, NameExtractor, NameRules};
use crate::snapshot::Snapshot;
use std::sync::Arc;

/// Extractor and differ compiled from one set of rule tables
///
/// Both share the same navigation filter and name heuristics, so a fragment
/// dropped at extraction is dropped the same way when diffing.
#[derive(Debug)]
pub struct Pipeline {
    extractor: Extractor,
    differ: Differ,
}

impl Pipeline {
    pub fn new(
        navigation: NavFilterConfig,
        extraction: &ExtractionRules,
        names: NameRules,
    ) -> Result<Self> {
        let nav = Arc::new(NavFilter::new(navigation)?);
        let names = Arc::new(NameExtractor::new(names, Arc::clone(&nav))?);
        let extractor = Extractor::new(extraction, Arc::clone(&nav), Arc::clone(&names))?;
        let differ = Differ::new(nav, names);
        Ok(Self { extractor, differ })
    }

    pub fn from_config(config: &MonitorConfig) -> Result<Self> {
        Self::new(
            config.navigation.clone(),
            &config.extraction,
            config.names.clone(),
        )
    }

    pub fn extract(&self, html: &str) -> Result<Snapshot> {
        self.extractor.extract(html)
    }

    pub fn diff(&self, old: &Snapshot, new: &Snapshot) -> Vec<Change> {
        self.differ.diff(old, new)
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(
            NavFilterConfig::default(),
            &ExtractionRules::default(),
            NameRules::default(),
        )
        .expect("Default rule tables should compile")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changes::ChangeKind;

    const BEFORE: &str = r#"<html><body>
        <nav><a href="/">Home</a><a href="/about">About Us</a></nav>
        <div class="portfolio-grid">
            <div class="portfolio-item">
                <h3>Acme Bio</h3><img src="/img/acme.png" alt="Acme Bio">
            </div>
        </div>
        <p>We back founders building durable companies.</p>
    </body></html>"#;

    const AFTER: &str = r#"<html><body>
        <nav><a href="/">Home</a><a href="/about">About Us</a><a href="/news">News</a></nav>
        <div class="portfolio-grid">
            <div class="portfolio-item">
                <h3>Acme Bio</h3><img src="/img/acme.png" alt="Acme Bio">
            </div>
            <div class="portfolio-item">
                <h3>Zenith Oncology</h3><img src="/img/zenith.png" alt="Zenith Oncology">
            </div>
        </div>
        <p>We back founders building durable companies.</p>
    </body></html>"#;

    #[test]
    fn test_menu_only_change_is_silent() {
        let pipeline = Pipeline::default();
        let old = pipeline.extract(BEFORE).unwrap();
        let menu_changed = BEFORE.replace("</nav>", r#"<a href="/faq">FAQ</a></nav>"#);
        let new = pipeline.extract(&menu_changed).unwrap();
        assert!(pipeline.diff(&old, &new).is_empty());
    }

    #[test]
    fn test_new_portfolio_company_is_reported() {
        let pipeline = Pipeline::default();
        let old = pipeline.extract(BEFORE).unwrap();
        let new = pipeline.extract(AFTER).unwrap();

        let changes = pipeline.diff(&old, &new);
        let kinds: Vec<ChangeKind> = changes.iter().map(|c| c.kind()).collect();
        assert!(kinds.contains(&ChangeKind::NewImages));
        assert!(kinds.contains(&ChangeKind::NewEntities));
        assert!(!kinds.contains(&ChangeKind::NewLinks));

        let entities = changes
            .iter()
            .find(|c| c.kind() == ChangeKind::NewEntities)
            .unwrap();
        // The logo file name is a second, independent sighting
        assert_eq!(
            entities.description,
            "2 new entities found: Zenith Oncology, ZENITH"
        );
    }
}
