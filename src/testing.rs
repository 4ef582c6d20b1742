//! In-memory collaborators shared by the loop and supervisor tests.

use crate::changes::Change;
use crate::error::{Result, WatchError};
use crate::renderers::{Renderer, RendererFactory};
use crate::sink::ChangeSink;
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Mutex, watch};

/// A portfolio page listing the given company names
pub fn page(names: &[&str]) -> String {
    let items: String = names
        .iter()
        .map(|name| format!("<div class=\"portfolio-item\"><h3>{}</h3></div>", name))
        .collect();
    format!(
        "<html><body><nav><a href=\"/\">Home</a></nav>\
         <div class=\"portfolio-grid\">{}</div>\
         <p>We back founders building durable companies.</p></body></html>",
        items
    )
}

/// What every session of a [`FakeRendererFactory`] serves
#[derive(Debug, Clone)]
pub enum PageScript {
    /// Served in order across sessions; the last page repeats
    Pages(Vec<String>),
    AlwaysFail(&'static str),
    /// Pages and failures in fetch order; the last step repeats
    Steps(Vec<std::result::Result<String, &'static str>>),
}

/// Counts sessions and fetches so tests can check the lifecycle
#[derive(Debug)]
pub struct FakeRendererFactory {
    script: PageScript,
    connects: AtomicUsize,
    closes: Arc<AtomicUsize>,
    fetches: Arc<watch::Sender<usize>>,
}

impl FakeRendererFactory {
    pub fn new(script: PageScript) -> Arc<Self> {
        let (fetches, _) = watch::channel(0);
        Arc::new(Self {
            script,
            connects: AtomicUsize::new(0),
            closes: Arc::new(AtomicUsize::new(0)),
            fetches: Arc::new(fetches),
        })
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Resolves once at least `count` fetches have been made
    pub async fn wait_for_fetches(&self, count: usize) {
        let mut rx = self.fetches.subscribe();
        rx.wait_for(|n| *n >= count)
            .await
            .expect("fetch counter dropped");
    }
}

#[async_trait]
impl RendererFactory for FakeRendererFactory {
    async fn connect(&self) -> Result<Box<dyn Renderer>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeRenderer {
            script: self.script.clone(),
            closes: Arc::clone(&self.closes),
            fetches: Arc::clone(&self.fetches),
            closed: false,
        }))
    }
}

struct FakeRenderer {
    script: PageScript,
    closes: Arc<AtomicUsize>,
    fetches: Arc<watch::Sender<usize>>,
    closed: bool,
}

#[async_trait]
impl Renderer for FakeRenderer {
    async fn fetch_rendered_html(&mut self, _url: &str) -> Result<String> {
        assert!(!self.closed, "fetch on a closed session");
        let mut index = 0;
        self.fetches.send_modify(|n| {
            index = *n;
            *n += 1;
        });
        match &self.script {
            PageScript::Pages(pages) => Ok(pages[index.min(pages.len() - 1)].clone()),
            PageScript::AlwaysFail(message) => {
                Err(WatchError::FetchTransient(message.to_string()))
            }
            PageScript::Steps(steps) => match &steps[index.min(steps.len() - 1)] {
                Ok(html) => Ok(html.clone()),
                Err(message) => Err(WatchError::FetchTransient(message.to_string())),
            },
        }
    }

    async fn close(&mut self) -> Result<()> {
        assert!(!self.closed, "session closed twice");
        self.closed = true;
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Remembers which job persisted how many changes
#[derive(Debug, Default)]
pub struct RecordingSink {
    batches: Mutex<Vec<(String, usize)>>,
    removed: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub async fn batches(&self) -> Vec<(String, usize)> {
        self.batches.lock().await.clone()
    }

    pub async fn removed(&self) -> Vec<String> {
        self.removed.lock().await.clone()
    }
}

#[async_trait]
impl ChangeSink for RecordingSink {
    async fn persist(&self, job_id: &str, changes: &[Change]) -> Result<()> {
        self.batches
            .lock()
            .await
            .push((job_id.to_string(), changes.len()));
        Ok(())
    }

    async fn remove(&self, job_id: &str) -> Result<()> {
        self.removed.lock().await.push(job_id.to_string());
        Ok(())
    }
}
