use crate::changes::Change;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Changes kept per results file by default
pub const DEFAULT_RESULTS_CAP: usize = 200;

/// Destination for each cycle's changes
#[async_trait]
pub trait ChangeSink: Send + Sync {
    async fn persist(&self, job_id: &str, changes: &[Change]) -> Result<()>;

    /// Drop everything stored for a job
    async fn remove(&self, job_id: &str) -> Result<()>;
}

/// A change as written to a results file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredChange {
    #[serde(flatten)]
    pub change: Change,

    pub detected_at: DateTime<Utc>,
}

/// Keeps one JSON array of changes per job under a results directory
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    dir: PathBuf,
    cap: usize,
}

impl JsonFileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_cap(dir, DEFAULT_RESULTS_CAP)
    }

    pub fn with_cap(dir: impl Into<PathBuf>, cap: usize) -> Self {
        Self {
            dir: dir.into(),
            cap,
        }
    }

    pub fn path_for(&self, job_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", job_id))
    }

    /// Up to `limit` of the newest stored changes for a job, oldest first
    pub async fn load(&self, job_id: &str, limit: Option<usize>) -> Result<Vec<StoredChange>> {
        let stored = read_results(&self.path_for(job_id)).await?;
        let skip = limit.map_or(0, |limit| stored.len().saturating_sub(limit));
        Ok(stored.into_iter().skip(skip).collect())
    }
}

async fn read_results(path: &Path) -> Result<Vec<StoredChange>> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => Ok(serde_json::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl ChangeSink for JsonFileSink {
    async fn persist(&self, job_id: &str, changes: &[Change]) -> Result<()> {
        if changes.is_empty() {
            return Ok(());
        }
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self.path_for(job_id);
        let mut stored = read_results(&path).await?;
        let detected_at = Utc::now();
        stored.extend(changes.iter().cloned().map(|change| StoredChange {
            change,
            detected_at,
        }));
        if stored.len() > self.cap {
            stored.drain(..stored.len() - self.cap);
        }

        let json = serde_json::to_string_pretty(&stored)?;
        tokio::fs::write(&path, json).await?;
        ::log::debug!("Saved {} results for job {}", stored.len(), job_id);
        Ok(())
    }

    async fn remove(&self, job_id: &str) -> Result<()> {
        match tokio::fs::remove_file(self.path_for(job_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changes::{ChangeDetails, ChangeKind, LinkDetail};

    fn link_change(url: &str) -> Change {
        Change::new(
            ChangeDetails::NewLinks(vec![LinkDetail {
                url: url.to_string(),
                text: "Beta Works".to_string(),
                title: String::new(),
                aria_label: String::new(),
                data_id: String::new(),
                potential_company: None,
            }]),
            "1 new links found".to_string(),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_persist_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonFileSink::new(dir.path().join("results"));

        sink.persist("job-1", &[link_change("/a")]).await.unwrap();
        sink.persist("job-1", &[link_change("/b")]).await.unwrap();

        let stored = sink.load("job-1", None).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].change.kind(), ChangeKind::NewLinks);
        assert!(stored[0].detected_at <= stored[1].detected_at);

        let raw = std::fs::read_to_string(sink.path_for("job-1")).unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json[1]["kind"], "new_links");
        assert_eq!(json[1]["details"][0]["url"], "/b");
        assert!(json[1]["detected_at"].is_string());
    }

    #[tokio::test]
    async fn test_cap_evicts_oldest() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonFileSink::with_cap(dir.path(), 2);
        let batch: Vec<Change> = ["/a", "/b", "/c"].iter().map(|u| link_change(u)).collect();
        sink.persist("job", &batch).await.unwrap();

        let stored = sink.load("job", None).await.unwrap();
        let urls: Vec<String> = stored
            .iter()
            .map(|s| match &s.change.details {
                ChangeDetails::NewLinks(links) => links[0].url.clone(),
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(urls, vec!["/b", "/c"]);
    }

    #[tokio::test]
    async fn test_missing_job_loads_empty_and_removes_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonFileSink::new(dir.path());
        assert!(sink.load("nope", Some(10)).await.unwrap().is_empty());
        sink.remove("nope").await.unwrap();

        sink.persist("job", &[link_change("/a")]).await.unwrap();
        sink.remove("job").await.unwrap();
        assert!(!sink.path_for("job").exists());
    }
}
