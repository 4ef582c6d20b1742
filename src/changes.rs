use crate::annotate::Annotation;
use crate::snapshot::ImageRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One typed difference between two consecutive snapshots
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    /// Kind tag plus the kind-specific detail records (never empty)
    #[serde(flatten)]
    pub details: ChangeDetails,

    pub description: String,

    pub timestamp: DateTime<Utc>,

    /// Before/after excerpt of the page text, on `text_change` only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<TextExcerpt>,

    /// Present only when an analysis service is configured and produced a result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotation: Option<Annotation>,
}

impl Change {
    pub fn new(details: ChangeDetails, description: String, timestamp: DateTime<Utc>) -> Self {
        Self {
            details,
            description,
            timestamp,
            excerpt: None,
            annotation: None,
        }
    }

    pub fn with_excerpt(mut self, excerpt: TextExcerpt) -> Self {
        self.excerpt = Some(excerpt);
        self
    }

    pub fn kind(&self) -> ChangeKind {
        self.details.kind()
    }
}

/// The facet a change was found in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    NewImages,
    RemovedImages,
    ModifiedImages,
    TextChange,
    NewLinks,
    RemovedLinks,
    NewEntities,
    RemovedEntities,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::NewImages => "new_images",
            ChangeKind::RemovedImages => "removed_images",
            ChangeKind::ModifiedImages => "modified_images",
            ChangeKind::TextChange => "text_change",
            ChangeKind::NewLinks => "new_links",
            ChangeKind::RemovedLinks => "removed_links",
            ChangeKind::NewEntities => "new_entities",
            ChangeKind::RemovedEntities => "removed_entities",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind-specific payload of a [`Change`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "details", rename_all = "snake_case")]
pub enum ChangeDetails {
    NewImages(Vec<ImageDetail>),
    RemovedImages(Vec<ImageDetail>),
    ModifiedImages(Vec<ModifiedImage>),
    TextChange(Vec<TextDetail>),
    NewLinks(Vec<LinkDetail>),
    RemovedLinks(Vec<LinkDetail>),
    NewEntities(Vec<EntityDetail>),
    RemovedEntities(Vec<EntityDetail>),
}

impl ChangeDetails {
    pub fn kind(&self) -> ChangeKind {
        match self {
            ChangeDetails::NewImages(_) => ChangeKind::NewImages,
            ChangeDetails::RemovedImages(_) => ChangeKind::RemovedImages,
            ChangeDetails::ModifiedImages(_) => ChangeKind::ModifiedImages,
            ChangeDetails::TextChange(_) => ChangeKind::TextChange,
            ChangeDetails::NewLinks(_) => ChangeKind::NewLinks,
            ChangeDetails::RemovedLinks(_) => ChangeKind::RemovedLinks,
            ChangeDetails::NewEntities(_) => ChangeKind::NewEntities,
            ChangeDetails::RemovedEntities(_) => ChangeKind::RemovedEntities,
        }
    }

    /// Number of detail records
    pub fn len(&self) -> usize {
        match self {
            ChangeDetails::NewImages(d) | ChangeDetails::RemovedImages(d) => d.len(),
            ChangeDetails::ModifiedImages(d) => d.len(),
            ChangeDetails::TextChange(d) => d.len(),
            ChangeDetails::NewLinks(d) | ChangeDetails::RemovedLinks(d) => d.len(),
            ChangeDetails::NewEntities(d) | ChangeDetails::RemovedEntities(d) => d.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Whether a text fragment appeared or disappeared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextChangeType {
    Added,
    Removed,
}

/// One paragraph that was added or removed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextDetail {
    #[serde(rename = "type")]
    pub change_type: TextChangeType,

    /// At most 200 characters of the paragraph
    pub content: String,

    /// Paragraph index in the snapshot the fragment belongs to
    pub position: usize,

    pub candidate_names: Vec<String>,

    pub is_entity_related: bool,
}

/// Opening stretch of the page text on either side of a `text_change`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextExcerpt {
    /// First 1000 characters of the old text
    pub before: String,

    /// First 1000 characters of the new text
    pub after: String,

    /// Details in the change that mention a candidate name
    pub entity_related_count: usize,
}

/// An image that appeared or disappeared
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDetail {
    pub src: String,
    pub alt: String,
    pub title: String,
    pub data_id: String,

    /// Summary of the descriptive attributes
    pub context: String,

    /// Only filled in for removed images
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub potential_company: Option<String>,

    pub all_attributes: ImageRecord,
}

/// One attribute that differs between two renders of the same image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeChange {
    pub attribute: String,
    pub old_value: String,
    pub new_value: String,
}

/// An image present in both snapshots whose attributes changed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifiedImage {
    pub src: String,
    pub unique_id: String,
    pub changes: Vec<AttributeChange>,
    pub old_context: String,
    pub new_context: String,
}

/// A link that appeared or disappeared
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkDetail {
    pub url: String,
    pub text: String,
    pub title: String,
    pub aria_label: String,
    pub data_id: String,

    /// Only filled in for removed links
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub potential_company: Option<String>,
}

/// An entity block that appeared or disappeared
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDetail {
    pub name: String,
    pub context: String,
    pub source_tag: String,
    pub parent_classes: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_serializes_with_kind_tag() {
        let change = Change::new(
            ChangeDetails::NewEntities(vec![EntityDetail {
                name: "NEWCO".to_string(),
                context: "NEWCO builds things".to_string(),
                source_tag: "h3".to_string(),
                parent_classes: vec!["portfolio-item".to_string()],
            }]),
            "1 new entities found: NEWCO".to_string(),
            Utc::now(),
        );

        let json = serde_json::to_value(&change).unwrap();
        assert_eq!(json["kind"], "new_entities");
        assert_eq!(json["details"][0]["name"], "NEWCO");
        assert_eq!(json["description"], "1 new entities found: NEWCO");
        // No annotation attempted, so the key is absent
        assert!(json.get("annotation").is_none());
    }

    #[test]
    fn test_text_detail_type_field() {
        let detail = TextDetail {
            change_type: TextChangeType::Removed,
            content: "XYZCORP listed".to_string(),
            position: 0,
            candidate_names: vec!["XYZCORP".to_string()],
            is_entity_related: true,
        };
        let json = serde_json::to_value(&detail).unwrap();
        assert_eq!(json["type"], "removed");
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(ChangeKind::TextChange.to_string(), "text_change");
        assert_eq!(ChangeKind::RemovedEntities.as_str(), "removed_entities");
        let json = serde_json::to_value(ChangeKind::ModifiedImages).unwrap();
        assert_eq!(json, "modified_images");
    }
}
