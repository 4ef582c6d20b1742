use crate::error::{Result, WatchError};
use crate::filter::NavFilter;
use crate::parsers::names::NameExtractor;
use crate::parsers::text::{file_stem, normalize_whitespace, truncate_chars};
use crate::snapshot::{EntityBlock, ImageRecord, LinkRecord, Snapshot};
use chrono::Utc;
use regex::{Regex, RegexBuilder};
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// Maximum characters of container text kept as an entity block's context
const ENTITY_CONTEXT_CHARS: usize = 200;

/// Structural rules used while turning a rendered page into a [`Snapshot`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionRules {
    /// CSS selectors for navigation chrome removed before anything is read
    #[serde(default = "default_nav_selectors")]
    pub nav_selectors: Vec<String>,

    /// Case-insensitive regex matched against each class of a candidate container
    #[serde(default = "default_entity_container_pattern")]
    pub entity_container_pattern: String,

    /// Tags that may act as entity containers
    #[serde(default = "default_container_tags")]
    pub container_tags: Vec<String>,

    /// Tags whose text names an entity inside a container
    #[serde(default = "default_heading_tags")]
    pub heading_tags: Vec<String>,
}

fn default_nav_selectors() -> Vec<String> {
    [
        "nav",
        "header",
        ".navbar",
        ".nav",
        ".menu",
        ".navigation",
        "[class*=\"nav\"]",
        "[class*=\"menu\"]",
        "[id*=\"nav\"]",
        "[id*=\"menu\"]",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_entity_container_pattern() -> String {
    "portfolio|isotope|block|grid".to_string()
}

fn default_container_tags() -> Vec<String> {
    vec!["div".to_string()]
}

fn default_heading_tags() -> Vec<String> {
    ["h1", "h2", "h3", "h4", "h5", "h6"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for ExtractionRules {
    fn default() -> Self {
        Self {
            nav_selectors: default_nav_selectors(),
            entity_container_pattern: default_entity_container_pattern(),
            container_tags: default_container_tags(),
            heading_tags: default_heading_tags(),
        }
    }
}

/// Turns rendered HTML into [`Snapshot`]s
#[derive(Debug)]
pub struct Extractor {
    nav_selectors: Vec<Selector>,
    container_pattern: Regex,
    container_tags: Vec<String>,
    heading_tags: Vec<String>,
    nav: Arc<NavFilter>,
    names: Arc<NameExtractor>,
}

/// Compile a CSS selector, reporting failures as configuration errors
fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| {
        WatchError::ConfigurationInvalid(format!("invalid selector '{}': {}", css, e))
    })
}

impl Extractor {
    pub fn new(
        rules: &ExtractionRules,
        nav: Arc<NavFilter>,
        names: Arc<NameExtractor>,
    ) -> Result<Self> {
        let nav_selectors = rules
            .nav_selectors
            .iter()
            .map(|css| selector(css))
            .collect::<Result<Vec<_>>>()?;

        let container_pattern = RegexBuilder::new(&rules.entity_container_pattern)
            .case_insensitive(true)
            .build()?;

        Ok(Self {
            nav_selectors,
            container_pattern,
            container_tags: lowercase_all(&rules.container_tags),
            heading_tags: lowercase_all(&rules.heading_tags),
            nav,
            names,
        })
    }

    /// Extracts a snapshot from the HTML of a fully rendered page
    ///
    /// Fails with [`WatchError::ExtractionFailed`] when the document has no body
    /// (including blank input, which parses to an empty shell).
    pub fn extract(&self, html: &str) -> Result<Snapshot> {
        if html.trim().is_empty() {
            return Err(WatchError::ExtractionFailed(
                "rendered document is empty".to_string(),
            ));
        }

        let mut doc = Html::parse_document(html);

        // Navigation chrome goes first so nothing below ever sees it
        let removed = self.remove_navigation(&mut doc);
        ::log::debug!("Removed {} navigation elements", removed);

        remove_matching(&mut doc, &["script", "style", "noscript"]);

        let entity_blocks = self.extract_entity_blocks(&doc);

        let body_selector = selector("body")?;
        let body = doc.select(&body_selector).next().ok_or_else(|| {
            WatchError::ExtractionFailed("no <body> element in document".to_string())
        })?;

        let text = normalize_whitespace(&body.text().collect::<Vec<_>>().join(" "));
        let structured_text = self.extract_structured_text(body);
        let links = self.extract_links(body)?;
        let images = extract_images(body)?;

        ::log::info!(
            "Extracted {} chars, {} links, {} images, {} entity blocks",
            text.len(),
            links.len(),
            images.len(),
            entity_blocks.len()
        );

        Ok(Snapshot {
            text,
            structured_text,
            links,
            images,
            entity_blocks,
            captured_at: Utc::now(),
        })
    }

    /// Detaches every element matching a navigation selector; returns how many
    fn remove_navigation(&self, doc: &mut Html) -> usize {
        let ids: Vec<_> = self
            .nav_selectors
            .iter()
            .flat_map(|sel| doc.select(sel))
            // The document shell is never chrome, whatever its classes say
            .filter(|el| !matches!(el.value().name(), "html" | "head" | "body"))
            .map(|el| el.id())
            .collect();

        let count = ids.len();
        for id in ids {
            if let Some(mut node) = doc.tree.get_mut(id) {
                node.detach();
            }
        }
        count
    }

    /// Whether an element is a container whose class marks it as holding entities
    fn is_entity_container(&self, el: &ElementRef) -> bool {
        let name = el.value().name();
        self.container_tags.iter().any(|tag| tag == name)
            && el
                .value()
                .classes()
                .any(|class| self.container_pattern.is_match(class))
    }

    /// Named blocks from container headings, then from image file names
    ///
    /// Deduplicated by uppercased name, first occurrence wins.
    fn extract_entity_blocks(&self, doc: &Html) -> Vec<EntityBlock> {
        let mut blocks = Vec::new();

        let containers = doc
            .root_element()
            .descendants()
            .filter_map(ElementRef::wrap)
            .filter(|el| self.is_entity_container(el));

        for container in containers {
            let context = container_context(container);
            for heading in container
                .descendants()
                .filter_map(ElementRef::wrap)
                .filter(|el| self.heading_tags.iter().any(|h| h == el.value().name()))
            {
                let name = normalize_whitespace(&heading.text().collect::<Vec<_>>().join(" "));
                if name.chars().count() > 1 {
                    ::log::debug!(
                        "Found entity '{}' in <{}>",
                        name,
                        heading.value().name()
                    );
                    blocks.push(entity_block(
                        name,
                        context.clone(),
                        heading.value().name(),
                        container,
                    ));
                }
            }
        }

        // Secondary discovery: logo file names inside entity containers
        for img in doc
            .root_element()
            .descendants()
            .filter_map(ElementRef::wrap)
            .filter(|el| el.value().name() == "img")
        {
            let Some(name) = self.entity_name_from_image(&img) else {
                continue;
            };
            let container = img
                .ancestors()
                .filter_map(ElementRef::wrap)
                .find(|el| self.is_entity_container(el));
            if let Some(container) = container {
                ::log::debug!("Found entity '{}' from image file name", name);
                blocks.push(entity_block(name, container_context(container), "img", container));
            }
        }

        let mut seen = HashSet::new();
        blocks.retain(|block| seen.insert(block.key()));
        blocks
    }

    /// Uppercased alphabetic file stem of an image, skipping generic names
    fn entity_name_from_image(&self, img: &ElementRef) -> Option<String> {
        let src = img.value().attr("src").filter(|s| !s.is_empty())?;
        let stem = file_stem(src)?;
        if stem.chars().count() > 2
            && stem.chars().all(char::is_alphabetic)
            && !self.names.is_generic_file_name(stem)
        {
            Some(stem.to_uppercase())
        } else {
            None
        }
    }

    /// Heading and paragraph text in document order, wrapped in tag markers
    fn extract_structured_text(&self, body: ElementRef) -> String {
        let mut parts = Vec::new();
        for el in body.descendants().filter_map(ElementRef::wrap) {
            let name = el.value().name();
            let is_heading = self.heading_tags.iter().any(|h| h == name);
            if !is_heading && name != "p" {
                continue;
            }
            let text = normalize_whitespace(&el.text().collect::<Vec<_>>().join(" "));
            if text.is_empty() || self.nav.is_navigation(&text) {
                continue;
            }
            let marker = name.to_uppercase();
            parts.push(format!("[{}]{}[/{}]", marker, text, marker));
        }
        parts.join(" ")
    }

    /// Links with visible, non-navigation text, unique by `(href, text)`
    fn extract_links(&self, body: ElementRef) -> Result<Vec<LinkRecord>> {
        let anchor = selector("a[href]")?;
        let mut seen = HashSet::new();
        let mut links = Vec::new();

        for a in body.select(&anchor) {
            let text = normalize_whitespace(&a.text().collect::<Vec<_>>().join(" "));
            if text.is_empty() || self.nav.is_navigation(&text) {
                continue;
            }
            let attr = |name: &str| a.value().attr(name).unwrap_or_default().to_string();
            let link = LinkRecord {
                text,
                href: attr("href"),
                title: attr("title"),
                aria_label: attr("aria-label"),
                data_id: attr("data-id"),
            };
            if seen.insert((link.href.clone(), link.text.clone())) {
                links.push(link);
            }
        }

        Ok(links)
    }
}

/// Images with a `src` or lazy-load `data-src`, unique by identity key
fn extract_images(body: ElementRef) -> Result<Vec<ImageRecord>> {
    let img_selector = selector("img")?;
    let mut seen = HashSet::new();
    let mut images = Vec::new();

    for img in body.select(&img_selector) {
        let attr = |name: &str| img.value().attr(name).unwrap_or_default().to_string();
        let record = ImageRecord {
            src: attr("src"),
            alt: attr("alt"),
            title: attr("title"),
            data_id: attr("data-id"),
            data_src: attr("data-src"),
            data_original: attr("data-original"),
            class: attr("class"),
            id: attr("id"),
            width: attr("width"),
            height: attr("height"),
            loading: attr("loading"),
            data_caption: attr("data-caption"),
            aria_label: attr("aria-label"),
            aria_describedby: attr("aria-describedby"),
            unique_id: String::new(),
        }
        .with_unique_id();

        if record.src.is_empty() && record.data_src.is_empty() {
            continue;
        }
        if seen.insert(record.unique_id.clone()) {
            images.push(record);
        }
    }

    Ok(images)
}

/// Detaches every element with one of the given tag names
fn remove_matching(doc: &mut Html, tags: &[&str]) {
    let ids: Vec<_> = doc
        .root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter(|el| tags.contains(&el.value().name()))
        .map(|el| el.id())
        .collect();
    for id in ids {
        if let Some(mut node) = doc.tree.get_mut(id) {
            node.detach();
        }
    }
}

fn container_context(container: ElementRef) -> String {
    let text = normalize_whitespace(&container.text().collect::<Vec<_>>().join(" "));
    truncate_chars(&text, ENTITY_CONTEXT_CHARS)
}

fn entity_block(name: String, context: String, tag: &str, container: ElementRef) -> EntityBlock {
    EntityBlock {
        name,
        context,
        source_tag: tag.to_string(),
        parent_classes: container.value().classes().map(str::to_string).collect(),
        container_id: container.value().id().unwrap_or_default().to_string(),
    }
}

fn lowercase_all(items: &[String]) -> Vec<String> {
    items.iter().map(|s| s.to_lowercase()).collect()
}
