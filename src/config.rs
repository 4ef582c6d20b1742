use crate::error::{Result, WatchError};
use crate::filter::NavFilterConfig;
use crate::parsers::{ExtractionRules, NameRules};
use crate::pipeline::Pipeline;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Configuration for one monitored page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Page to watch
    pub url: String,

    /// Minutes between checks
    #[serde(default = "default_check_interval_minutes")]
    pub check_interval_minutes: u64,

    /// Upper bound on the wait before the second check
    #[serde(default = "default_initial_wait_cap_secs")]
    pub initial_wait_cap_secs: u64,

    /// Pause before retrying after a failed cycle
    #[serde(default = "default_retry_backoff_secs")]
    pub retry_backoff_secs: u64,

    /// Most recent changes kept in memory
    #[serde(default = "default_history_cap")]
    pub history_cap: usize,

    /// URL for the WebDriver instance
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,

    /// Seconds to let scripts settle after navigation
    #[serde(default = "default_render_wait_secs")]
    pub render_wait_secs: u64,

    /// Annotation is skipped entirely when absent or without a key
    #[serde(default)]
    pub analysis: Option<AnalysisConfig>,

    #[serde(default)]
    pub navigation: NavFilterConfig,

    #[serde(default)]
    pub extraction: ExtractionRules,

    #[serde(default)]
    pub names: NameRules,
}

/// Settings for the external analysis service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Never written back out
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f64,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_check_interval_minutes() -> u64 {
    1
}

fn default_initial_wait_cap_secs() -> u64 {
    120
}

fn default_retry_backoff_secs() -> u64 {
    60
}

fn default_history_cap() -> usize {
    50
}

fn default_webdriver_url() -> String {
    "http://localhost:4444".to_string()
}

fn default_render_wait_secs() -> u64 {
    5
}

fn default_endpoint() -> String {
    "https://openrouter.ai/api/v1/chat/completions".to_string()
}

fn default_model() -> String {
    "deepseek/deepseek-r1:free".to_string()
}

fn default_temperature() -> f64 {
    0.1
}

fn default_max_tokens() -> u32 {
    1000
}

fn default_timeout_secs() -> u64 {
    30
}

/// Environment variables checked for the analysis key, in order
const API_KEY_VARS: [&str; 2] = ["API_KEY", "OPENROUTER_API_KEY"];

impl AnalysisConfig {
    pub fn new(api_key: &str) -> Self {
        Self {
            api_key: Some(api_key.to_string()),
            endpoint: default_endpoint(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
        }
    }

    /// Whether a usable key is present
    pub fn has_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }
}

/// Wait durations derived from a [`MonitorConfig`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub interval: Duration,

    /// `min(interval, initial wait cap)`, so a second snapshot comes early
    pub initial_wait: Duration,

    pub retry_backoff: Duration,
}

impl MonitorConfig {
    /// Create a new configuration with default values
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            check_interval_minutes: default_check_interval_minutes(),
            initial_wait_cap_secs: default_initial_wait_cap_secs(),
            retry_backoff_secs: default_retry_backoff_secs(),
            history_cap: default_history_cap(),
            webdriver_url: default_webdriver_url(),
            render_wait_secs: default_render_wait_secs(),
            analysis: None,
            navigation: NavFilterConfig::default(),
            extraction: ExtractionRules::default(),
            names: NameRules::default(),
        }
    }

    /// Load configuration from a file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;

        Self::from_json(&contents)
    }

    /// Load configuration from a JSON string
    pub fn from_json(contents: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(contents)?;
        Ok(config)
    }

    /// Apply `WEBDRIVER_URL` and the analysis key variables from the process environment
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|name| std::env::var(name).ok())
    }

    /// Apply overrides from any variable source
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(webdriver_url) = lookup("WEBDRIVER_URL").filter(|v| !v.is_empty()) {
            self.webdriver_url = webdriver_url;
        }

        let key = API_KEY_VARS
            .iter()
            .find_map(|name| lookup(name).filter(|v| !v.trim().is_empty()));
        if let Some(key) = key {
            match &mut self.analysis {
                Some(analysis) if !analysis.has_key() => analysis.api_key = Some(key),
                Some(_) => {}
                None => self.analysis = Some(AnalysisConfig::new(&key)),
            }
        }

        self
    }

    /// Reject configurations the monitor could not run with
    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.url).map_err(|e| {
            WatchError::ConfigurationInvalid(format!("invalid url '{}': {}", self.url, e))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(WatchError::ConfigurationInvalid(format!(
                "unsupported url scheme '{}'",
                url.scheme()
            )));
        }
        if self.check_interval_minutes == 0 {
            return Err(WatchError::ConfigurationInvalid(
                "check_interval_minutes must be at least 1".to_string(),
            ));
        }
        if self.history_cap == 0 {
            return Err(WatchError::ConfigurationInvalid(
                "history_cap must be at least 1".to_string(),
            ));
        }
        if let Some(analysis) = &self.analysis {
            if analysis.max_tokens == 0 || analysis.timeout_secs == 0 {
                return Err(WatchError::ConfigurationInvalid(
                    "analysis max_tokens and timeout_secs must be positive".to_string(),
                ));
            }
        }

        // Compiling the rule tables surfaces bad patterns and selectors
        Pipeline::from_config(self)?;
        Ok(())
    }

    pub fn schedule(&self) -> Schedule {
        let interval = Duration::from_secs(self.check_interval_minutes.saturating_mul(60));
        Schedule {
            interval,
            initial_wait: interval.min(Duration::from_secs(self.initial_wait_cap_secs)),
            retry_backoff: Duration::from_secs(self.retry_backoff_secs),
        }
    }

    pub fn render_wait(&self) -> Duration {
        Duration::from_secs(self.render_wait_secs)
    }

    /// The analysis settings, only when they carry a key
    pub fn active_analysis(&self) -> Option<&AnalysisConfig> {
        self.analysis.as_ref().filter(|a| a.has_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_minimal_json_uses_defaults() {
        let config =
            MonitorConfig::from_json(r#"{"url": "https://example.com/portfolio"}"#).unwrap();
        assert_eq!(config.check_interval_minutes, 1);
        assert_eq!(config.initial_wait_cap_secs, 120);
        assert_eq!(config.retry_backoff_secs, 60);
        assert_eq!(config.history_cap, 50);
        assert_eq!(config.webdriver_url, "http://localhost:4444");
        assert!(config.analysis.is_none());
        assert_eq!(config.navigation.min_keyword_matches, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"url": "https://example.com", "check_interval_minutes": 30,
                "analysis": {{"model": "some/model"}}}}"#
        )
        .unwrap();

        let config = MonitorConfig::from_file(file.path()).unwrap();
        assert_eq!(config.check_interval_minutes, 30);
        let analysis = config.analysis.as_ref().unwrap();
        assert_eq!(analysis.model, "some/model");
        assert_eq!(analysis.max_tokens, 1000);
        assert!(config.active_analysis().is_none());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = MonitorConfig::from_file("/nonexistent/watch.json").unwrap_err();
        assert!(matches!(err, WatchError::Io(_)));
    }

    #[test]
    fn test_schedule_caps_first_wait() {
        let mut config = MonitorConfig::new("https://example.com");
        config.check_interval_minutes = 60;
        let schedule = config.schedule();
        assert_eq!(schedule.interval, Duration::from_secs(3600));
        assert_eq!(schedule.initial_wait, Duration::from_secs(120));
        assert_eq!(schedule.retry_backoff, Duration::from_secs(60));

        config.check_interval_minutes = 1;
        assert_eq!(config.schedule().initial_wait, Duration::from_secs(60));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = MonitorConfig::new("ftp://example.com");
        assert!(matches!(
            config.validate(),
            Err(WatchError::ConfigurationInvalid(_))
        ));

        config.url = "not a url".to_string();
        assert!(config.validate().is_err());

        config.url = "https://example.com".to_string();
        config.check_interval_minutes = 0;
        assert!(config.validate().is_err());

        config.check_interval_minutes = 5;
        config.history_cap = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_patterns() {
        let mut config = MonitorConfig::new("https://example.com");
        config.navigation.patterns.push("(unclosed".to_string());
        assert!(matches!(
            config.validate(),
            Err(WatchError::ConfigurationInvalid(_))
        ));

        let mut config = MonitorConfig::new("https://example.com");
        config.extraction.nav_selectors.push("[[".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let config = MonitorConfig::new("https://example.com").with_overrides_from(env(&[
            ("WEBDRIVER_URL", "http://grid:4444"),
            ("OPENROUTER_API_KEY", "sk-test"),
        ]));
        assert_eq!(config.webdriver_url, "http://grid:4444");
        assert_eq!(
            config.active_analysis().and_then(|a| a.api_key.as_deref()),
            Some("sk-test")
        );
    }

    #[test]
    fn test_env_key_does_not_replace_configured_key() {
        let mut config = MonitorConfig::new("https://example.com");
        config.analysis = Some(AnalysisConfig::new("from-file"));
        let config = config.with_overrides_from(env(&[("API_KEY", "from-env")]));
        assert_eq!(
            config.analysis.unwrap().api_key.as_deref(),
            Some("from-file")
        );
    }

    #[test]
    fn test_empty_env_changes_nothing() {
        let config = MonitorConfig::new("https://example.com")
            .with_overrides_from(env(&[("WEBDRIVER_URL", ""), ("API_KEY", " ")]));
        assert_eq!(config.webdriver_url, "http://localhost:4444");
        assert!(config.analysis.is_none());
    }

    #[test]
    fn test_api_key_is_not_serialized() {
        let mut config = MonitorConfig::new("https://example.com");
        config.analysis = Some(AnalysisConfig::new("secret"));
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
    }
}
