use crate::changes::Change;
use crate::config::MonitorConfig;
use crate::error::{Result, WatchError};
use crate::monitor::{Monitor, MonitorHandle, MonitorState, MonitorStatus};
use crate::renderers::RendererFactory;
use crate::sink::ChangeSink;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// How long `stop` waits for a loop to wind down before aborting it
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

struct RunningTask {
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

struct Job {
    config: MonitorConfig,
    handle: MonitorHandle,
    task: Option<RunningTask>,
}

/// Registry of monitored pages, each running as its own cancellable task
pub struct Supervisor {
    jobs: Mutex<HashMap<String, Job>>,
    factory: Arc<dyn RendererFactory>,
    sink: Option<Arc<dyn ChangeSink>>,
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("has_sink", &self.sink.is_some())
            .finish_non_exhaustive()
    }
}

impl Supervisor {
    pub fn new(factory: Arc<dyn RendererFactory>) -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            factory,
            sink: None,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn ChangeSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Register a page without starting it; returns the new job id
    pub async fn create(&self, config: MonitorConfig) -> Result<String> {
        config.validate()?;
        let job_id = Uuid::new_v4().to_string();
        let handle = MonitorHandle::new(&config.url, config.history_cap);

        ::log::info!("Created job {} for {}", job_id, config.url);
        self.jobs.lock().await.insert(
            job_id.clone(),
            Job {
                config,
                handle,
                task: None,
            },
        );
        Ok(job_id)
    }

    /// Start (or restart) the loop for a job
    ///
    /// Each start begins from a fresh snapshot; counters and history carry over.
    pub async fn start(&self, job_id: &str) -> Result<()> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| WatchError::JobNotFound(job_id.to_string()))?;

        if job.task.as_ref().is_some_and(|t| !t.join.is_finished()) {
            return Err(WatchError::JobAlreadyRunning(job_id.to_string()));
        }

        let mut monitor = Monitor::new(job.config.clone())?.with_handle(job.handle.clone());
        if let Some(sink) = &self.sink {
            monitor = monitor.with_sink(job_id, Arc::clone(sink));
        }

        // Visible as running before the task is first polled
        job.handle.set_state(MonitorState::Running).await;

        let cancel = CancellationToken::new();
        let join = tokio::spawn(monitor.run(Arc::clone(&self.factory), cancel.clone()));
        job.task = Some(RunningTask { cancel, join });

        ::log::info!("Started monitoring job {}", job_id);
        Ok(())
    }

    /// Cancel the loop and wait up to five seconds for it to finish
    pub async fn stop(&self, job_id: &str) -> Result<()> {
        self.halt(job_id, MonitorState::Stopped).await
    }

    /// Like [`stop`](Self::stop), but the job reads as paused
    pub async fn pause(&self, job_id: &str) -> Result<()> {
        self.halt(job_id, MonitorState::Paused).await
    }

    /// Restart a paused or stopped job
    pub async fn resume(&self, job_id: &str) -> Result<()> {
        self.start(job_id).await
    }

    /// Stop a job, forget it and drop its stored results
    pub async fn remove(&self, job_id: &str) -> Result<()> {
        self.halt(job_id, MonitorState::Stopped).await?;
        self.jobs.lock().await.remove(job_id);

        if let Some(sink) = &self.sink {
            if let Err(e) = sink.remove(job_id).await {
                ::log::warn!("Failed to delete results for job {}: {}", job_id, e);
            }
        }
        ::log::info!("Deleted job {}", job_id);
        Ok(())
    }

    pub async fn status(&self, job_id: &str) -> Result<MonitorStatus> {
        Ok(self.handle(job_id).await?.status().await)
    }

    /// Every job id with its status, in no particular order
    pub async fn list(&self) -> Vec<(String, MonitorStatus)> {
        let handles: Vec<(String, MonitorHandle)> = self
            .jobs
            .lock()
            .await
            .iter()
            .map(|(id, job)| (id.clone(), job.handle.clone()))
            .collect();

        let mut statuses = Vec::with_capacity(handles.len());
        for (id, handle) in handles {
            statuses.push((id, handle.status().await));
        }
        statuses
    }

    /// Up to `limit` of the job's most recent in-memory changes
    pub async fn changes(&self, job_id: &str, limit: Option<usize>) -> Result<Vec<Change>> {
        Ok(self.handle(job_id).await?.history().recent(limit).await)
    }

    /// Stop every running job
    pub async fn shutdown(&self) {
        let ids: Vec<String> = self.jobs.lock().await.keys().cloned().collect();
        for id in ids {
            if let Err(e) = self.stop(&id).await {
                ::log::warn!("Failed to stop job {}: {}", id, e);
            }
        }
    }

    async fn handle(&self, job_id: &str) -> Result<MonitorHandle> {
        self.jobs
            .lock()
            .await
            .get(job_id)
            .map(|job| job.handle.clone())
            .ok_or_else(|| WatchError::JobNotFound(job_id.to_string()))
    }

    async fn halt(&self, job_id: &str, state: MonitorState) -> Result<()> {
        // The registry lock is not held while waiting on the task
        let (task, handle) = {
            let mut jobs = self.jobs.lock().await;
            let job = jobs
                .get_mut(job_id)
                .ok_or_else(|| WatchError::JobNotFound(job_id.to_string()))?;
            (job.task.take(), job.handle.clone())
        };

        if let Some(RunningTask { cancel, mut join }) = task {
            cancel.cancel();
            match tokio::time::timeout(STOP_TIMEOUT, &mut join).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => ::log::error!("Monitor task for job {} failed: {}", job_id, e),
                Err(_) => {
                    ::log::warn!(
                        "Monitor task for job {} did not stop within {:?}, aborting",
                        job_id,
                        STOP_TIMEOUT
                    );
                    join.abort();
                }
            }
        }

        // A loop that died on its own keeps its error state
        if handle.status().await.state != MonitorState::Error {
            handle.set_state(state).await;
        }
        ::log::info!("Job {} is now {:?}", job_id, state);
        Ok(())
    }
}
