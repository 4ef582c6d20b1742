use crate::config::MonitorConfig;
use crate::error::{Result, WatchError};
use crate::renderers::{Renderer, RendererFactory};
use async_trait::async_trait;
use fantoccini::{Client, ClientBuilder};
use serde_json::{Map, Value, json};
use std::time::Duration;
use tokio::time::timeout;

/// Upper bound on one navigate-settle-read sequence
const PAGE_TIMEOUT: Duration = Duration::from_secs(45);

/// Common alternatives tried when the configured WebDriver is unreachable
const FALLBACK_WEBDRIVER_URLS: [&str; 4] = [
    "http://localhost:9515", // ChromeDriver default
    "http://localhost:4723", // Appium default
    "http://localhost:9222", // Chrome debug port default
    "http://127.0.0.1:4444",
];

/// Opens headless Chrome sessions on a WebDriver server
#[derive(Debug, Clone)]
pub struct WebDriverFactory {
    webdriver_url: String,
    render_wait: Duration,
}

impl WebDriverFactory {
    pub fn new(webdriver_url: &str, render_wait: Duration) -> Self {
        Self {
            webdriver_url: webdriver_url.to_string(),
            render_wait,
        }
    }

    pub fn from_config(config: &MonitorConfig) -> Self {
        Self::new(&config.webdriver_url, config.render_wait())
    }
}

fn chrome_capabilities() -> Map<String, Value> {
    let mut caps = Map::new();
    caps.insert(
        "goog:chromeOptions".to_string(),
        json!({
            "args": ["--headless", "--no-sandbox", "--disable-dev-shm-usage"]
        }),
    );
    caps
}

/// Connects to the WebDriver instance, falling back to common local ports
async fn connect_to_webdriver(webdriver_url: &str) -> Result<Client> {
    let mut builder = ClientBuilder::native();
    builder.capabilities(chrome_capabilities());

    match builder.connect(webdriver_url).await {
        Ok(client) => {
            ::log::debug!("Connected to WebDriver at {}", webdriver_url);
            return Ok(client);
        }
        Err(e) => {
            ::log::error!(
                "Failed to connect to WebDriver at {}: {}",
                webdriver_url,
                e
            );
        }
    }

    for url in FALLBACK_WEBDRIVER_URLS.iter() {
        if *url == webdriver_url {
            continue;
        }

        ::log::info!("Trying fallback WebDriver URL: {}", url);
        if let Ok(client) = builder.connect(url).await {
            ::log::debug!("Connected to fallback WebDriver at {}", url);
            return Ok(client);
        }
    }

    ::log::error!(
        "Make sure a WebDriver server is running or set the WEBDRIVER_URL environment variable"
    );
    Err(WatchError::FetchTransient(format!(
        "no WebDriver server reachable at {} or fallbacks",
        webdriver_url
    )))
}

#[async_trait]
impl RendererFactory for WebDriverFactory {
    async fn connect(&self) -> Result<Box<dyn Renderer>> {
        let client = connect_to_webdriver(&self.webdriver_url).await?;
        Ok(Box::new(WebDriverRenderer {
            client: Some(client),
            render_wait: self.render_wait,
        }))
    }
}

/// One WebDriver session
///
/// The session is ended at most once; [`close`](Renderer::close) on an already
/// closed renderer is a no-op.
#[derive(Debug)]
pub struct WebDriverRenderer {
    client: Option<Client>,
    render_wait: Duration,
}

/// Map a WebDriver command failure, noting lost sessions separately
fn command_error(error: fantoccini::error::CmdError, context: &str, url: &str) -> WatchError {
    if error.to_string().contains("Unable to find session") {
        ::log::warn!("Lost WebDriver session while {} {}", context, url);
    }
    WatchError::FetchTransient(format!("failed {} {}: {}", context, url, error))
}

#[async_trait]
impl Renderer for WebDriverRenderer {
    async fn fetch_rendered_html(&mut self, url: &str) -> Result<String> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| WatchError::FetchTransient("WebDriver session is closed".to_string()))?;
        let render_wait = self.render_wait;
        let started = std::time::Instant::now();

        let html = timeout(PAGE_TIMEOUT, async {
            client
                .goto(url)
                .await
                .map_err(|e| command_error(e, "accessing", url))?;

            // Client-side rendering needs time after the load event
            tokio::time::sleep(render_wait).await;

            client
                .source()
                .await
                .map_err(|e| command_error(e, "getting source for", url))
        })
        .await
        .map_err(|_| WatchError::FetchTransient(format!("timeout rendering {}", url)))??;

        ::log::debug!(
            "Rendered {} ({} bytes) in {:.2} seconds",
            url,
            html.len(),
            started.elapsed().as_secs_f64()
        );
        Ok(html)
    }

    async fn close(&mut self) -> Result<()> {
        let Some(client) = self.client.take() else {
            return Ok(());
        };
        client.close().await.map_err(|e| {
            WatchError::FetchTransient(format!("failed to close WebDriver session: {}", e))
        })
    }
}
