//! Best-effort interpretation of changes by an external text-analysis service.
//!
//! The service is asked whether a change means a company joined or left the
//! portfolio shown on the page. Whatever comes back is folded into an
//! [`Annotation`] with every field present; failures become annotations that
//! carry an `error` instead of errors that stop the pipeline.

use crate::changes::{Change, ChangeDetails, EntityDetail, TextChangeType};
use crate::config::AnalysisConfig;
use crate::error::{Result, WatchError};
use crate::parsers::text::truncate_chars;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Characters of an unparsable response kept for diagnostics
const RAW_RESPONSE_CHARS: usize = 500;

const DEFAULT_SUMMARY: &str = "Analysis completed";

const PROMPT_TEMPLATE: &str = r#"You are an expert analyst specializing in investor portfolios and venture capital firms.
Analyze the following website changes to determine if any companies have been added to or removed from an investor's portfolio.

Context: This is from a website monitoring system tracking changes on investor and VC firm websites.

Changes detected:
{context}

Ignore changes to site navigation such as menus, breadcrumbs and footers. Text made of words like home, about us, our team, news or contact is navigation, not a portfolio change.

Please determine:
1. Are there any new companies that appear to have been added to the portfolio?
2. What are the company names (from alt text, titles, file names or content)?
3. What type of companies are these (sector or industry)?
4. Is this likely a portfolio change or just a website update?

If an image or text was removed, check whether it names a company and report that company as removed.

IMPORTANT: Respond with ONLY valid JSON, no markdown formatting or code blocks.

{
    "entities_detected": true/false,
    "entities": [
        {
            "name": "Company Name",
            "category": "Industry/Sector",
            "confidence": "high/medium/low",
            "evidence": "What suggests this is a portfolio change",
            "source": "image/text/link/entity"
        }
    ],
    "added_entity": "Added company name or null",
    "removed_entity": "Removed company name or null",
    "modified_entity": "Modified company name or null",
    "summary": "Brief summary of the analysis"
}

Focus only on actual portfolio additions and removals, not general website updates or news.
"#;

/// How sure the service is about one named entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    /// Anything unrecognised counts as low
    fn parse_lenient(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_lowercase()).as_deref() {
            Some("high") => Confidence::High,
            Some("medium") => Confidence::Medium,
            _ => Confidence::Low,
        }
    }
}

/// One entity the service believes is involved in a change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotatedEntity {
    pub name: String,
    pub category: String,
    pub confidence: Confidence,
    pub evidence: String,
    pub source: String,
}

/// Structured interpretation attached to a [`Change`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub entities_detected: bool,
    pub entities: Vec<AnnotatedEntity>,
    pub added_entity: Option<String>,
    pub removed_entity: Option<String>,
    pub modified_entity: Option<String>,
    pub summary: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Start of the response text when it could not be parsed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
}

impl Annotation {
    /// A defaulted annotation recording why analysis produced nothing usable
    pub fn failed(summary: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            entities_detected: false,
            entities: Vec::new(),
            added_entity: None,
            removed_entity: None,
            modified_entity: None,
            summary: summary.into(),
            error: Some(error.into()),
            raw_response: None,
        }
    }

    /// Whether the annotation came from a failed request or response
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Response shape accepted from the service, every field optional
///
/// Aliases cover the portfolio-specific field names older prompts asked for.
#[derive(Debug, Default, Deserialize)]
struct RawAnnotation {
    #[serde(default, alias = "new_companies_detected")]
    entities_detected: Option<bool>,

    #[serde(default, alias = "companies")]
    entities: Option<Vec<RawEntity>>,

    #[serde(default, alias = "added_company")]
    added_entity: Option<String>,

    #[serde(default, alias = "removed_company")]
    removed_entity: Option<String>,

    #[serde(default, alias = "modified_company")]
    modified_entity: Option<String>,

    #[serde(default, alias = "analysis_summary")]
    summary: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawEntity {
    #[serde(default)]
    name: Option<String>,

    #[serde(default, alias = "sector")]
    category: Option<String>,

    #[serde(default)]
    confidence: Option<String>,

    #[serde(default)]
    evidence: Option<String>,

    #[serde(default)]
    source: Option<String>,
}

impl From<RawAnnotation> for Annotation {
    fn from(raw: RawAnnotation) -> Self {
        let entities = raw
            .entities
            .unwrap_or_default()
            .into_iter()
            .map(|e| AnnotatedEntity {
                name: e.name.unwrap_or_default(),
                category: e.category.unwrap_or_default(),
                confidence: Confidence::parse_lenient(e.confidence.as_deref()),
                evidence: e.evidence.unwrap_or_default(),
                source: e.source.unwrap_or_default(),
            })
            .collect();

        Self {
            entities_detected: raw.entities_detected.unwrap_or(false),
            entities,
            added_entity: non_blank(raw.added_entity),
            removed_entity: non_blank(raw.removed_entity),
            modified_entity: non_blank(raw.modified_entity),
            summary: raw.summary.unwrap_or_else(|| DEFAULT_SUMMARY.to_string()),
            error: None,
            raw_response: None,
        }
    }
}

/// Models echo the template and answer "null" as a string now and then
fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| {
        let v = v.trim();
        !v.is_empty() && !v.eq_ignore_ascii_case("null") && !v.eq_ignore_ascii_case("none")
    })
}

/// Generation settings sent with every request
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionOptions {
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl From<&AnalysisConfig> for CompletionOptions {
    fn from(config: &AnalysisConfig) -> Self {
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

/// Status and text of one completion request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub status: u16,

    /// Completion text on success, the raw response body otherwise
    pub body: String,
}

/// An external text-analysis service
#[async_trait]
pub trait AnalysisService: Send + Sync {
    /// Sends one prompt; transport failures are errors, HTTP failures are statuses
    async fn complete(&self, prompt: &str, options: &CompletionOptions) -> Result<Completion>;
}

/// Chat-completion service speaking the OpenRouter/OpenAI wire format
#[derive(Debug, Clone)]
pub struct OpenRouterService {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl OpenRouterService {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl AnalysisService for OpenRouterService {
    async fn complete(&self, prompt: &str, options: &CompletionOptions) -> Result<Completion> {
        let request_body = serde_json::json!({
            "model": options.model,
            "messages": [
                {"role": "user", "content": prompt}
            ],
            "temperature": options.temperature,
            "max_tokens": options.max_tokens
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .timeout(options.timeout)
            .send()
            .await
            .map_err(|e| WatchError::AnnotationFailed(format!("request failed: {}", e)))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| WatchError::AnnotationFailed(format!("reading response failed: {}", e)))?;

        if status != 200 {
            ::log::warn!("Analysis service returned {}: {}", status, truncate_chars(&text, 200));
            return Ok(Completion { status, body: text });
        }

        let json: Value = serde_json::from_str(&text)?;
        let content = json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| {
                WatchError::AnnotationFailed("no content in completion response".to_string())
            })?;

        Ok(Completion {
            status,
            body: content.trim().to_string(),
        })
    }
}

/// Attaches service interpretations to changes
pub struct Annotator {
    service: Arc<dyn AnalysisService>,
    options: CompletionOptions,
}

impl std::fmt::Debug for Annotator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Annotator")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Annotator {
    pub fn new(service: Arc<dyn AnalysisService>, options: CompletionOptions) -> Self {
        Self { service, options }
    }

    /// An annotator talking to the configured endpoint, or `None` without a key
    pub fn from_config(config: &AnalysisConfig) -> Option<Self> {
        let api_key = config.api_key.as_deref().filter(|k| !k.trim().is_empty())?;
        let service = OpenRouterService::new(config.endpoint.clone(), api_key);
        Some(Self::new(Arc::new(service), CompletionOptions::from(config)))
    }

    /// Interpretation of one change, or `None` when it offers nothing to analyze
    ///
    /// Never fails: request and parse problems come back as an annotation
    /// with `error` set.
    pub async fn annotate(&self, change: &Change) -> Option<Annotation> {
        let context = build_context(change)?;
        let prompt = PROMPT_TEMPLATE.replace("{context}", &context);

        let annotation = match self.service.complete(&prompt, &self.options).await {
            Ok(completion) if completion.status == 200 => parse_response(&completion.body),
            Ok(completion) => Annotation::failed(
                format!("API request failed with status {}", completion.status),
                format!("API Error: {}", completion.status),
            ),
            Err(e) => {
                ::log::warn!("Annotation of {} change failed: {}", change.kind(), e);
                Annotation::failed("Analysis failed due to system error", e.to_string())
            }
        };

        if let Some(error) = &annotation.error {
            ::log::warn!("Annotation of {} change degraded: {}", change.kind(), error);
        }
        Some(annotation)
    }

    /// Annotates each change in turn, leaving unsupported kinds untouched
    pub async fn annotate_all(&self, changes: &mut [Change]) {
        for change in changes.iter_mut() {
            change.annotation = self.annotate(change).await;
        }
    }
}

/// Turns a completion text into an annotation, defaulting what is missing
pub fn parse_response(raw: &str) -> Annotation {
    let body = strip_code_fence(raw);

    let parsed = serde_json::from_str::<Value>(body)
        .map_err(|e| e.to_string())
        .and_then(|value| {
            if value.is_object() {
                serde_json::from_value::<RawAnnotation>(value).map_err(|e| e.to_string())
            } else {
                Err("expected a JSON object".to_string())
            }
        });

    match parsed {
        Ok(raw_annotation) => Annotation::from(raw_annotation),
        Err(e) => {
            ::log::warn!("Unparsable analysis response: {}", truncate_chars(body, 200));
            let mut annotation = Annotation::failed(
                "AI analysis completed but response format was invalid",
                format!("JSON parsing failed: {}", e),
            );
            annotation.raw_response = Some(truncate_chars(body, RAW_RESPONSE_CHARS));
            annotation
        }
    }
}

/// Removes a surrounding ``` fence, with or without a language tag
fn strip_code_fence(text: &str) -> &str {
    let text = text.trim();
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric());
    let rest = match rest.rfind("```") {
        Some(end) => &rest[..end],
        None => rest,
    };
    rest.trim()
}

/// Labelled parts joined the way every context line is
fn join_labelled(parts: &[(&str, &str)]) -> Option<String> {
    let present: Vec<String> = parts
        .iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(label, value)| format!("{}: {}", label, value))
        .collect();
    if present.is_empty() {
        None
    } else {
        Some(present.join(" | "))
    }
}

fn entity_line(entity: &EntityDetail) -> Option<String> {
    join_labelled(&[
        ("Company name", entity.name.as_str()),
        ("Context", entity.context.as_str()),
    ])
}

/// Kind-specific description of a change for the prompt
///
/// `None` for modified images and for changes whose details carry nothing
/// worth sending.
fn build_context(change: &Change) -> Option<String> {
    let (header, lines): (&str, Vec<String>) = match &change.details {
        ChangeDetails::NewImages(images) => (
            "=== NEW IMAGES DETECTED ===",
            images
                .iter()
                .filter_map(|img| {
                    join_labelled(&[
                        ("Alt text", img.alt.as_str()),
                        ("Title", img.title.as_str()),
                        ("Image URL", img.src.as_str()),
                        ("Context", img.context.as_str()),
                    ])
                })
                .collect(),
        ),
        ChangeDetails::RemovedImages(images) => (
            "=== REMOVED IMAGES DETECTED ===",
            images
                .iter()
                .filter_map(|img| {
                    join_labelled(&[
                        ("Alt text", img.alt.as_str()),
                        ("Title", img.title.as_str()),
                        ("Image URL", img.src.as_str()),
                        ("Context", img.context.as_str()),
                        (
                            "Potential Company",
                            img.potential_company.as_deref().unwrap_or_default(),
                        ),
                    ])
                })
                .collect(),
        ),
        ChangeDetails::TextChange(details) => {
            let mut lines = Vec::new();
            for detail in details {
                match detail.change_type {
                    TextChangeType::Added => {
                        lines.push(format!("New text added: {}", detail.content));
                    }
                    TextChangeType::Removed => {
                        lines.push(format!("Text removed: {}", detail.content));
                        if !detail.candidate_names.is_empty() {
                            lines.push(format!(
                                "Potential companies in removed text: {}",
                                detail.candidate_names.join(", ")
                            ));
                        }
                    }
                }
            }
            ("=== TEXT CHANGES DETECTED ===", lines)
        }
        ChangeDetails::NewLinks(links) => (
            "=== NEW LINKS DETECTED ===",
            links
                .iter()
                .filter_map(|link| {
                    join_labelled(&[
                        ("Link text", link.text.as_str()),
                        ("URL", link.url.as_str()),
                        ("Title", link.title.as_str()),
                    ])
                })
                .collect(),
        ),
        ChangeDetails::RemovedLinks(links) => (
            "=== REMOVED LINKS DETECTED ===",
            links
                .iter()
                .filter_map(|link| {
                    join_labelled(&[
                        ("Link text", link.text.as_str()),
                        ("URL", link.url.as_str()),
                        ("Title", link.title.as_str()),
                        (
                            "Potential Company",
                            link.potential_company.as_deref().unwrap_or_default(),
                        ),
                    ])
                })
                .collect(),
        ),
        ChangeDetails::NewEntities(entities) => (
            "=== NEW ENTITIES DETECTED ===",
            entities
                .iter()
                .filter_map(entity_line)
                .collect(),
        ),
        ChangeDetails::RemovedEntities(entities) => (
            "=== REMOVED ENTITIES DETECTED ===",
            entities
                .iter()
                .filter_map(entity_line)
                .collect(),
        ),
        ChangeDetails::ModifiedImages(_) => return None,
    };

    if lines.is_empty() {
        return None;
    }

    let mut context = vec![header.to_string()];
    context.extend(lines);
    Some(context.join("\n"))
}
