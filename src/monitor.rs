//! The per-page poll loop: render, extract, diff, annotate, persist, sleep.

use crate::annotate::Annotator;
use crate::changes::Change;
use crate::config::MonitorConfig;
use crate::error::Result;
use crate::history::ChangeHistory;
use crate::pipeline::Pipeline;
use crate::renderers::{Renderer, RendererFactory};
use crate::sink::ChangeSink;
use crate::snapshot::Snapshot;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// Lifecycle state of a monitored page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorState {
    Created,
    Running,
    Paused,
    Stopped,
    Error,
}

/// Bookkeeping readable while the loop runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorStatus {
    pub url: String,
    pub state: MonitorState,
    pub created_at: DateTime<Utc>,
    pub last_check: Option<DateTime<Utc>>,

    /// Cycles attempted, failed ones included
    pub total_checks: u64,

    pub snapshots_taken: u64,
    pub changes_detected: u64,

    /// Failure of the latest cycle; cleared by the next successful one
    pub last_error: Option<String>,
}

impl MonitorStatus {
    fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            state: MonitorState::Created,
            created_at: Utc::now(),
            last_check: None,
            total_checks: 0,
            snapshots_taken: 0,
            changes_detected: 0,
            last_error: None,
        }
    }
}

/// Shared view of a monitor's status and recent changes
///
/// Outlives any single run, so a page can be paused and resumed without
/// losing its counters or history.
#[derive(Debug, Clone)]
pub struct MonitorHandle {
    status: Arc<RwLock<MonitorStatus>>,
    history: ChangeHistory,
}

impl MonitorHandle {
    pub fn new(url: &str, history_cap: usize) -> Self {
        Self {
            status: Arc::new(RwLock::new(MonitorStatus::new(url))),
            history: ChangeHistory::new(history_cap),
        }
    }

    pub async fn status(&self) -> MonitorStatus {
        self.status.read().await.clone()
    }

    pub async fn set_state(&self, state: MonitorState) {
        self.status.write().await.state = state;
    }

    pub fn history(&self) -> &ChangeHistory {
        &self.history
    }

    async fn record_error(&self, message: String) {
        self.status.write().await.last_error = Some(message);
    }

    async fn clear_error(&self) {
        self.status.write().await.last_error = None;
    }
}

/// Watches one page and turns each new render into changes
pub struct Monitor {
    config: MonitorConfig,
    pipeline: Pipeline,
    annotator: Option<Annotator>,
    sink: Option<(String, Arc<dyn ChangeSink>)>,
    current: Option<Snapshot>,
    previous: Option<Snapshot>,
    handle: MonitorHandle,
}

impl std::fmt::Debug for Monitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Monitor")
            .field("url", &self.config.url)
            .field("annotated", &self.annotator.is_some())
            .field("has_snapshot", &self.current.is_some())
            .finish_non_exhaustive()
    }
}

impl Monitor {
    /// Validate the configuration and compile its rule tables
    ///
    /// An annotator is attached when the configuration carries an analysis key.
    pub fn new(config: MonitorConfig) -> Result<Self> {
        config.validate()?;
        let pipeline = Pipeline::from_config(&config)?;
        let annotator = config.active_analysis().and_then(Annotator::from_config);
        let handle = MonitorHandle::new(&config.url, config.history_cap);

        Ok(Self {
            config,
            pipeline,
            annotator,
            sink: None,
            current: None,
            previous: None,
            handle,
        })
    }

    pub fn with_annotator(mut self, annotator: Annotator) -> Self {
        self.annotator = Some(annotator);
        self
    }

    /// Persist every non-empty batch of changes under `job_id`
    pub fn with_sink(mut self, job_id: &str, sink: Arc<dyn ChangeSink>) -> Self {
        self.sink = Some((job_id.to_string(), sink));
        self
    }

    /// Report into an existing handle instead of a fresh one
    pub fn with_handle(mut self, handle: MonitorHandle) -> Self {
        self.handle = handle;
        self
    }

    pub fn handle(&self) -> MonitorHandle {
        self.handle.clone()
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn current(&self) -> Option<&Snapshot> {
        self.current.as_ref()
    }

    pub fn previous(&self) -> Option<&Snapshot> {
        self.previous.as_ref()
    }

    /// Snapshot of already rendered HTML
    pub fn scrape_html(&self, html: &str) -> Result<Snapshot> {
        self.pipeline.extract(html)
    }

    /// Render the page and snapshot it
    pub async fn scrape(&self, renderer: &mut dyn Renderer) -> Result<Snapshot> {
        let html = renderer.fetch_rendered_html(&self.config.url).await?;
        self.scrape_html(&html)
    }

    pub fn diff(&self, old: &Snapshot, new: &Snapshot) -> Vec<Change> {
        self.pipeline.diff(old, new)
    }

    /// Annotate each change in place; nothing happens without an annotator
    pub async fn annotate_all(&self, changes: &mut [Change]) {
        if let Some(annotator) = &self.annotator {
            annotator.annotate_all(changes).await;
        }
    }

    /// Fold one rendered page into the monitor
    ///
    /// The first snapshot is only adopted. Later ones are diffed against the
    /// current snapshot, annotated, recorded in the history and handed to the
    /// sink, then become current.
    pub async fn process_html(&mut self, html: &str) -> Result<Vec<Change>> {
        let snapshot = self.scrape_html(html)?;
        {
            let mut status = self.handle.status.write().await;
            status.snapshots_taken += 1;
        }

        let Some(current) = self.current.take() else {
            ::log::info!("Initial snapshot taken for {}", self.config.url);
            self.current = Some(snapshot);
            return Ok(Vec::new());
        };

        let mut changes = self.diff(&current, &snapshot);
        self.annotate_all(&mut changes).await;

        self.previous = Some(current);
        self.current = Some(snapshot);

        if changes.is_empty() {
            ::log::info!("No changes detected for {}", self.config.url);
            return Ok(changes);
        }

        ::log::info!("{} changes detected for {}", changes.len(), self.config.url);
        self.handle.status.write().await.changes_detected += changes.len() as u64;
        self.handle.history.append(changes.clone()).await;

        if let Some((job_id, sink)) = &self.sink {
            if let Err(e) = sink.persist(job_id, &changes).await {
                ::log::error!("Failed to save results for job {}: {}", job_id, e);
            }
        }

        Ok(changes)
    }

    /// One render-and-process cycle on the session, opening one if needed
    ///
    /// A failed render ends the session so the next cycle starts fresh.
    async fn check(
        &mut self,
        factory: &dyn RendererFactory,
        session: &mut Option<Box<dyn Renderer>>,
    ) -> Result<Vec<Change>> {
        {
            let mut status = self.handle.status.write().await;
            status.total_checks += 1;
            status.last_check = Some(Utc::now());
        }

        let renderer = match session.take() {
            Some(renderer) => session.insert(renderer),
            None => session.insert(factory.connect().await?),
        };

        let html = match renderer.fetch_rendered_html(&self.config.url).await {
            Ok(html) => html,
            Err(e) => {
                release(session).await;
                return Err(e);
            }
        };

        self.process_html(&html).await
    }

    /// Poll until `cancel` fires
    ///
    /// The render session is released exactly once whichever way the loop
    /// ends, panics included. Failed cycles are logged and retried after the
    /// backoff; they never end the loop. After the first successful cycle the
    /// loop waits the capped initial wait, then the full interval.
    pub async fn run(mut self, factory: Arc<dyn RendererFactory>, cancel: CancellationToken) {
        let handle = self.handle();
        handle.set_state(MonitorState::Running).await;
        ::log::info!("Starting monitoring loop for {}", self.config.url);

        let mut session: Option<Box<dyn Renderer>> = None;
        let outcome = AssertUnwindSafe(self.poll(factory.as_ref(), &mut session, &cancel))
            .catch_unwind()
            .await;

        release(&mut session).await;

        match outcome {
            Ok(()) => {
                handle.set_state(MonitorState::Stopped).await;
                ::log::info!("Stopped monitoring {}", self.config.url);
            }
            Err(_) => {
                handle.record_error("monitor task panicked".to_string()).await;
                handle.set_state(MonitorState::Error).await;
                ::log::error!("Monitoring loop for {} panicked", self.config.url);
            }
        }
    }

    async fn poll(
        &mut self,
        factory: &dyn RendererFactory,
        session: &mut Option<Box<dyn Renderer>>,
        cancel: &CancellationToken,
    ) {
        let schedule = self.config.schedule();
        let mut first = true;

        loop {
            let outcome = tokio::select! {
                _ = cancel.cancelled() => return,
                outcome = self.check(factory, session) => outcome,
            };

            // The short wait follows the baseline snapshot, however late it lands
            let wait = match outcome {
                Ok(_) => {
                    self.handle.clear_error().await;
                    if first {
                        first = false;
                        schedule.initial_wait
                    } else {
                        schedule.interval
                    }
                }
                Err(e) => {
                    ::log::error!("Error in monitoring loop for {}: {}", self.config.url, e);
                    self.handle.record_error(e.to_string()).await;
                    schedule.retry_backoff
                }
            };

            if !sleep_or_cancel(wait, cancel).await {
                return;
            }
        }
    }
}

/// Sleep for `wait`; false when cancelled first
async fn sleep_or_cancel(wait: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(wait) => true,
    }
}

/// Close and drop the session, if any
async fn release(session: &mut Option<Box<dyn Renderer>>) {
    if let Some(mut renderer) = session.take() {
        if let Err(e) = renderer.close().await {
            ::log::warn!("Failed to close render session: {}", e);
        }
    }
}
