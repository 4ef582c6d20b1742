//! Multi-facet comparison of two snapshots.

pub mod opcodes;


use crate::changes::{
    AttributeChange, Change, ChangeDetails, EntityDetail, ImageDetail, LinkDetail, ModifiedImage,
    TextChangeType, TextDetail, TextExcerpt,
};
use crate::filter::NavFilter;
use crate::parsers::names::NameExtractor;
use crate::parsers::text::{split_into_paragraphs, truncate_chars};
use crate::snapshot::{ImageRecord, LinkRecord, Snapshot};
use chrono::{DateTime, Utc};
use opcodes::{OpTag, opcodes};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::ops::Range;
use std::sync::Arc;

/// Paragraphs this short or shorter are never reported
const MIN_PARAGRAPH_CHARS: usize = 5;

/// Characters of a paragraph kept in a text detail
const TEXT_DETAIL_CHARS: usize = 200;

/// Characters of each side kept in the before/after excerpt
const EXCERPT_CHARS: usize = 1000;

/// Characters of each example quoted in a description
const EXAMPLE_CHARS: usize = 50;

/// Candidate names listed in a text change description
const MAX_DESCRIPTION_NAMES: usize = 5;

/// Attributes compared between two renders of the same image
const COMPARED_IMAGE_ATTRIBUTES: [&str; 7] = [
    "alt",
    "title",
    "data-id",
    "class",
    "id",
    "aria-label",
    "data-caption",
];

/// Compares snapshots facet by facet, dropping navigation noise
#[derive(Debug)]
pub struct Differ {
    nav: Arc<NavFilter>,
    names: Arc<NameExtractor>,
}

impl Differ {
    pub fn new(nav: Arc<NavFilter>, names: Arc<NameExtractor>) -> Self {
        Self { nav, names }
    }

    /// All changes from `old` to `new`
    ///
    /// Facets come out in a fixed order: text, new links, removed links, images
    /// (new, removed, modified), then entity blocks (new, removed). An empty
    /// snapshot on either side yields nothing. Every change is stamped with the
    /// capture time of `new`.
    pub fn diff(&self, old: &Snapshot, new: &Snapshot) -> Vec<Change> {
        if old.is_empty() || new.is_empty() {
            return Vec::new();
        }

        let timestamp = new.captured_at;
        let mut changes = Vec::new();

        changes.extend(self.diff_text(old, new, timestamp));
        changes.extend(self.diff_links(old, new, timestamp));
        changes.extend(self.diff_images(old, new, timestamp));
        changes.extend(diff_entities(old, new, timestamp));

        changes
    }

    fn diff_text(
        &self,
        old: &Snapshot,
        new: &Snapshot,
        timestamp: DateTime<Utc>,
    ) -> Option<Change> {
        let old_text = old.text.trim();
        let new_text = new.text.trim();
        if old_text == new_text {
            return None;
        }

        let old_paragraphs = split_into_paragraphs(old_text);
        let new_paragraphs = split_into_paragraphs(new_text);

        let mut entries = Vec::new();
        for op in opcodes(&old_paragraphs, &new_paragraphs) {
            // Replace is reported as its removals followed by its additions
            if matches!(op.tag, OpTag::Delete | OpTag::Replace) {
                entries.extend(self.text_details(
                    TextChangeType::Removed,
                    &old_paragraphs,
                    op.old.clone(),
                ));
            }
            if matches!(op.tag, OpTag::Insert | OpTag::Replace) {
                entries.extend(self.text_details(
                    TextChangeType::Added,
                    &new_paragraphs,
                    op.new.clone(),
                ));
            }
        }

        let before = entries.len();
        entries.retain(|entry| {
            let residual = self.nav.is_residual_fragment(&entry.content);
            if residual {
                ::log::debug!(
                    "Filtered residual fragment: {}",
                    truncate_chars(&entry.content, 100)
                );
            }
            !residual
        });
        if entries.len() < before {
            ::log::debug!("Filtered {} navigation text fragments", before - entries.len());
        }

        if entries.is_empty() {
            return None;
        }

        let description = describe_text_change(&entries);
        let excerpt = TextExcerpt {
            before: truncate_chars(old_text, EXCERPT_CHARS),
            after: truncate_chars(new_text, EXCERPT_CHARS),
            entity_related_count: entries.iter().filter(|e| e.is_entity_related).count(),
        };

        Some(
            Change::new(ChangeDetails::TextChange(entries), description, timestamp)
                .with_excerpt(excerpt),
        )
    }

    /// Detail records for the qualifying paragraphs in `range`
    fn text_details(
        &self,
        change_type: TextChangeType,
        paragraphs: &[&str],
        range: Range<usize>,
    ) -> Vec<TextDetail> {
        range
            .filter_map(|position| {
                let paragraph = paragraphs[position];
                if paragraph.chars().count() <= MIN_PARAGRAPH_CHARS
                    || self.nav.is_navigation(paragraph)
                {
                    return None;
                }
                let candidate_names: Vec<String> =
                    self.names.extract_candidate_names(paragraph).into_iter().collect();
                Some(TextDetail {
                    change_type,
                    content: truncate_chars(paragraph, TEXT_DETAIL_CHARS),
                    position,
                    is_entity_related: !candidate_names.is_empty(),
                    candidate_names,
                })
            })
            .collect()
    }

    fn diff_links(&self, old: &Snapshot, new: &Snapshot, timestamp: DateTime<Utc>) -> Vec<Change> {
        let mut changes = Vec::new();

        let (added, _) = self.link_difference(&new.links, &old.links);
        if !added.is_empty() {
            let details: Vec<LinkDetail> =
                added.into_iter().map(|l| link_detail(l, None)).collect();
            let description = format!("{} new links found", details.len());
            changes.push(Change::new(ChangeDetails::NewLinks(details), description, timestamp));
        }

        let (removed, nav_filtered) = self.link_difference(&old.links, &new.links);
        if !removed.is_empty() {
            let details: Vec<LinkDetail> = removed
                .into_iter()
                .map(|l| link_detail(l, self.names.extract_candidate_name_from_link(l)))
                .collect();

            let mut parts = vec![format!("{} links removed", details.len())];
            let companies = unique(details.iter().filter_map(|d| d.potential_company.as_deref()));
            if !companies.is_empty() {
                parts.push(format!("Potential companies: {}", companies.join(", ")));
            }
            let examples: Vec<String> = details
                .iter()
                .take(3)
                .map(|d| truncate_chars(&d.text, EXAMPLE_CHARS))
                .collect();
            if !examples.is_empty() {
                parts.push(format!("Examples: {}", examples.join(", ")));
            }
            if nav_filtered > 0 {
                parts.push(format!("({} navigation links filtered)", nav_filtered));
            }

            changes.push(Change::new(
                ChangeDetails::RemovedLinks(details),
                parts.join(" | "),
                timestamp,
            ));
        }

        changes
    }

    /// Links of `from` whose `(href, text)` is absent in `other`, minus navigation
    ///
    /// Also returns how many were dropped as navigation.
    fn link_difference<'a>(
        &self,
        from: &'a [LinkRecord],
        other: &[LinkRecord],
    ) -> (Vec<&'a LinkRecord>, usize) {
        let other_keys: HashSet<(&str, &str)> = other.iter().map(LinkRecord::key).collect();
        let mut seen = HashSet::new();
        let mut kept = Vec::new();
        let mut nav_filtered = 0;

        for link in from {
            if other_keys.contains(&link.key()) || !seen.insert(link.key()) {
                continue;
            }
            if self.nav.is_navigation(&link.text) {
                ::log::debug!("Filtered navigation link: {}", link.text);
                nav_filtered += 1;
                continue;
            }
            kept.push(link);
        }

        (kept, nav_filtered)
    }

    fn diff_images(&self, old: &Snapshot, new: &Snapshot, timestamp: DateTime<Utc>) -> Vec<Change> {
        let old_by_key = index_images(&old.images);
        let new_by_key = index_images(&new.images);
        let mut changes = Vec::new();

        let added: Vec<ImageDetail> = ordered_images(&new.images)
            .filter(|(key, _)| !old_by_key.contains_key(key.as_str()))
            .filter(|(_, img)| !self.is_navigation_image(img))
            .map(|(_, img)| image_detail(img, None))
            .collect();
        if !added.is_empty() {
            let description = format!("{} new images found", added.len());
            changes.push(Change::new(ChangeDetails::NewImages(added), description, timestamp));
        }

        let removed: Vec<ImageDetail> = ordered_images(&old.images)
            .filter(|(key, _)| !new_by_key.contains_key(key.as_str()))
            .filter(|(_, img)| {
                let nav = self.is_navigation_image(img);
                if nav {
                    ::log::debug!("Filtered removed navigation image: {}", img.src);
                }
                !nav
            })
            .map(|(_, img)| image_detail(img, self.names.extract_candidate_name_from_image(img)))
            .collect();
        if !removed.is_empty() {
            let mut parts = vec![format!("{} images removed", removed.len())];
            let companies = unique(removed.iter().filter_map(|d| d.potential_company.as_deref()));
            if !companies.is_empty() {
                parts.push(format!("Potential companies: {}", companies.join(", ")));
            }
            let examples: Vec<&str> = removed
                .iter()
                .take(3)
                .map(|d| d.alt.as_str())
                .filter(|alt| !alt.is_empty())
                .collect();
            if !examples.is_empty() {
                parts.push(format!("Examples: {}", examples.join(", ")));
            }
            changes.push(Change::new(
                ChangeDetails::RemovedImages(removed),
                parts.join(" | "),
                timestamp,
            ));
        }

        let mut modified = Vec::new();
        for (key, new_img) in ordered_images(&new.images) {
            let Some(old_img) = old_by_key.get(key.as_str()) else {
                continue;
            };
            if self.nav.is_navigation(&old_img.alt) || self.nav.is_navigation(&new_img.alt) {
                continue;
            }
            let attribute_changes = compare_attributes(old_img, new_img);
            if !attribute_changes.is_empty() {
                modified.push(ModifiedImage {
                    src: new_img.src.clone(),
                    unique_id: key,
                    changes: attribute_changes,
                    old_context: old_img
                        .context(true)
                        .unwrap_or_else(|| "No context attributes".to_string()),
                    new_context: new_img
                        .context(true)
                        .unwrap_or_else(|| "No context attributes".to_string()),
                });
            }
        }
        if !modified.is_empty() {
            let mut parts = vec![format!("{} images modified", modified.len())];
            let changed: Vec<&str> = COMPARED_IMAGE_ATTRIBUTES
                .iter()
                .copied()
                .filter(|attr| {
                    modified
                        .iter()
                        .any(|m| m.changes.iter().any(|c| c.attribute == *attr))
                })
                .collect();
            parts.push(format!("Changed attributes: {}", changed.join(", ")));
            changes.push(Change::new(
                ChangeDetails::ModifiedImages(modified),
                parts.join(" | "),
                timestamp,
            ));
        }

        changes
    }

    fn is_navigation_image(&self, img: &ImageRecord) -> bool {
        self.nav.is_navigation(&img.alt) || self.nav.is_navigation(&img.title)
    }
}

fn diff_entities(old: &Snapshot, new: &Snapshot, timestamp: DateTime<Utc>) -> Vec<Change> {
    let mut changes = Vec::new();

    let added = entity_difference(new, old);
    if !added.is_empty() {
        let names: Vec<&str> = added.iter().map(|d| d.name.as_str()).collect();
        let description = format!("{} new entities found: {}", added.len(), names.join(", "));
        changes.push(Change::new(ChangeDetails::NewEntities(added), description, timestamp));
    }

    let removed = entity_difference(old, new);
    if !removed.is_empty() {
        let names: Vec<&str> = removed.iter().map(|d| d.name.as_str()).collect();
        let description = format!("{} entities removed: {}", removed.len(), names.join(", "));
        changes.push(Change::new(ChangeDetails::RemovedEntities(removed), description, timestamp));
    }

    changes
}

/// Entity blocks of `from` whose uppercased name is absent in `other`
fn entity_difference(from: &Snapshot, other: &Snapshot) -> Vec<EntityDetail> {
    let other_keys: HashSet<String> = other.entity_blocks.iter().map(|b| b.key()).collect();
    let mut seen = HashSet::new();
    from.entity_blocks
        .iter()
        .filter(|block| {
            let key = block.key();
            !other_keys.contains(&key) && seen.insert(key)
        })
        .map(|block| EntityDetail {
            name: block.name.clone(),
            context: block.context.clone(),
            source_tag: block.source_tag.clone(),
            parent_classes: block.parent_classes.clone(),
        })
        .collect()
}

/// Identity key of an image, computing it when the record came without one
fn image_key(img: &ImageRecord) -> String {
    if img.unique_id.is_empty() {
        img.compute_unique_id()
    } else {
        img.unique_id.clone()
    }
}

/// Images keyed by identity, first occurrence wins
fn index_images(images: &[ImageRecord]) -> HashMap<String, &ImageRecord> {
    let mut index = HashMap::new();
    for img in images {
        index.entry(image_key(img)).or_insert(img);
    }
    index
}

/// Images in document order with their keys, skipping repeated keys
fn ordered_images(images: &[ImageRecord]) -> impl Iterator<Item = (String, &ImageRecord)> {
    let mut seen = HashSet::new();
    images
        .iter()
        .map(|img| (image_key(img), img))
        .filter(move |(key, _)| seen.insert(key.clone()))
}

fn compare_attributes(old: &ImageRecord, new: &ImageRecord) -> Vec<AttributeChange> {
    COMPARED_IMAGE_ATTRIBUTES
        .iter()
        .filter_map(|attr| {
            let old_value = old.attribute(attr).unwrap_or_default();
            let new_value = new.attribute(attr).unwrap_or_default();
            (old_value != new_value).then(|| AttributeChange {
                attribute: attr.to_string(),
                old_value: old_value.to_string(),
                new_value: new_value.to_string(),
            })
        })
        .collect()
}

fn image_detail(img: &ImageRecord, potential_company: Option<String>) -> ImageDetail {
    ImageDetail {
        src: img.src.clone(),
        alt: img.alt.clone(),
        title: img.title.clone(),
        data_id: img.data_id.clone(),
        context: img
            .context(false)
            .unwrap_or_else(|| "No additional context".to_string()),
        potential_company,
        all_attributes: img.clone(),
    }
}

fn link_detail(link: &LinkRecord, potential_company: Option<String>) -> LinkDetail {
    LinkDetail {
        url: link.href.clone(),
        text: link.text.clone(),
        title: link.title.clone(),
        aria_label: link.aria_label.clone(),
        data_id: link.data_id.clone(),
        potential_company,
    }
}

/// Distinct values in first-seen order
fn unique<'a>(values: impl Iterator<Item = &'a str>) -> Vec<&'a str> {
    let mut seen = HashSet::new();
    values.filter(|v| seen.insert(*v)).collect()
}

fn describe_text_change(entries: &[TextDetail]) -> String {
    let added: Vec<&TextDetail> = entries
        .iter()
        .filter(|e| e.change_type == TextChangeType::Added)
        .collect();
    let removed: Vec<&TextDetail> = entries
        .iter()
        .filter(|e| e.change_type == TextChangeType::Removed)
        .collect();

    let mut parts = vec![format!(
        "Text content changed - {} additions, {} removals",
        added.len(),
        removed.len()
    )];

    let names: BTreeSet<&str> = entries
        .iter()
        .filter(|e| e.is_entity_related)
        .flat_map(|e| e.candidate_names.iter().map(String::as_str))
        .collect();
    if !names.is_empty() {
        let listed: Vec<&str> = names.into_iter().take(MAX_DESCRIPTION_NAMES).collect();
        parts.push(format!("Potential companies involved: {}", listed.join(", ")));
    }

    for (label, group) in [("Added", &added), ("Removed", &removed)] {
        if group.is_empty() {
            continue;
        }
        let examples: Vec<String> = group
            .iter()
            .take(2)
            .map(|e| truncate_chars(&e.content, EXAMPLE_CHARS))
            .collect();
        parts.push(format!("{} examples: {}", label, examples.join(" | ")));
    }

    parts.join(" | ")
}
