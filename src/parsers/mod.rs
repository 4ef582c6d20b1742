//! Page parsing: rendered HTML to [`Snapshot`](crate::snapshot::Snapshot), plus
//! the text and name heuristics the differ reuses.

pub mod html;
pub mod names;
pub mod text;

#[cfg(test)]
mod tests;

pub use html::{ExtractionRules, Extractor};
pub use names::{NameExtractor, NameRules};
