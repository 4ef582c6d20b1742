use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Separator between the parts of an image's identity key
pub const IMAGE_ID_SEPARATOR: &str = " | ";

/// Structured extraction of one page render at one point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Whitespace-collapsed body text
    pub text: String,

    /// Heading and paragraph text wrapped in `[H2]..[/H2]` / `[P]..[/P]` markers
    pub structured_text: String,

    pub links: Vec<LinkRecord>,

    pub images: Vec<ImageRecord>,

    /// Named blocks (portfolio companies and the like), unique by uppercased name
    pub entity_blocks: Vec<EntityBlock>,

    pub captured_at: DateTime<Utc>,
}

impl Snapshot {
    /// A snapshot with nothing in it gives the differ nothing to compare against
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
            && self.links.is_empty()
            && self.images.is_empty()
            && self.entity_blocks.is_empty()
    }
}

/// An anchor with visible text
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRecord {
    pub text: String,
    pub href: String,
    pub title: String,
    pub aria_label: String,
    pub data_id: String,
}

impl LinkRecord {
    /// Identity used for diffing: a change to either part is remove + add
    pub fn key(&self) -> (&str, &str) {
        (&self.href, &self.text)
    }
}

/// An `<img>` with every attribute the differ may report on
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub src: String,
    pub alt: String,
    pub title: String,
    pub data_id: String,
    pub data_src: String,
    pub data_original: String,
    pub class: String,
    pub id: String,
    pub width: String,
    pub height: String,
    pub loading: String,
    pub data_caption: String,
    pub aria_label: String,
    pub aria_describedby: String,
    pub unique_id: String,
}

impl ImageRecord {
    /// Identity key built from `src`, `data-id`, `id` and the first 50 chars of `alt`
    ///
    /// Only these attributes take part, so changes to anything else keep the
    /// same key and show up as a modification instead of remove + add.
    pub fn compute_unique_id(&self) -> String {
        let mut parts = Vec::new();
        if !self.src.is_empty() {
            parts.push(format!("src:{}", self.src));
        }
        if !self.data_id.is_empty() {
            parts.push(format!("data-id:{}", self.data_id));
        }
        if !self.id.is_empty() {
            parts.push(format!("id:{}", self.id));
        }
        if !self.alt.is_empty() {
            let alt: String = self.alt.chars().take(50).collect();
            parts.push(format!("alt:{}", alt));
        }

        if !parts.is_empty() {
            parts.join(IMAGE_ID_SEPARATOR)
        } else if !self.src.is_empty() {
            self.src.clone()
        } else {
            self.data_src.clone()
        }
    }

    /// Fill in `unique_id` from the identity attributes
    pub fn with_unique_id(mut self) -> Self {
        self.unique_id = self.compute_unique_id();
        self
    }

    /// Value of one of the attributes compared for modifications
    pub fn attribute(&self, name: &str) -> Option<&str> {
        let value = match name {
            "src" => &self.src,
            "alt" => &self.alt,
            "title" => &self.title,
            "data-id" => &self.data_id,
            "data-src" => &self.data_src,
            "data-original" => &self.data_original,
            "class" => &self.class,
            "id" => &self.id,
            "width" => &self.width,
            "height" => &self.height,
            "loading" => &self.loading,
            "data-caption" => &self.data_caption,
            "aria-label" => &self.aria_label,
            "aria-describedby" => &self.aria_describedby,
            _ => return None,
        };
        Some(value)
    }

    /// Human-readable summary of the descriptive attributes
    pub fn context(&self, include_class: bool) -> Option<String> {
        let mut parts = Vec::new();
        let labelled = [
            ("Alt", &self.alt),
            ("Title", &self.title),
            ("Data-ID", &self.data_id),
            ("Aria-Label", &self.aria_label),
            ("Caption", &self.data_caption),
        ];
        for (label, value) in labelled {
            if !value.is_empty() {
                parts.push(format!("{}: '{}'", label, value));
            }
        }
        if include_class && !self.class.is_empty() {
            parts.push(format!("Class: '{}'", self.class));
        }

        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" | "))
        }
    }
}

/// A named item on the page, e.g. one company in a portfolio grid
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityBlock {
    /// Case preserved, compared case-insensitively
    pub name: String,

    /// First 200 characters of the container's text
    pub context: String,

    /// Tag the name came from (`h3`, `img`, ...)
    pub source_tag: String,

    pub parent_classes: Vec<String>,

    pub container_id: String,
}

impl EntityBlock {
    /// Identity used for dedup and diffing
    pub fn key(&self) -> String {
        self.name.to_uppercase()
    }
}
