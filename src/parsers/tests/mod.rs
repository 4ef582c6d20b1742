mod extraction_tests;

use crate::filter::NavFilter;
use crate::parsers::{ExtractionRules, Extractor, NameExtractor, NameRules};
use std::sync::Arc;

/// Extractor with the default rule tables
fn default_extractor() -> Extractor {
    let nav = Arc::new(NavFilter::default());
    let names = Arc::new(NameExtractor::new(NameRules::default(), Arc::clone(&nav)).unwrap());
    Extractor::new(&ExtractionRules::default(), nav, names).unwrap()
}
