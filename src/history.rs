use crate::changes::Change;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Bounded, shareable record of the most recent changes for one page
///
/// Each cycle's batch is appended under one write lock, so readers never see
/// half of a cycle. The oldest entries are evicted past the cap.
#[derive(Debug, Clone)]
pub struct ChangeHistory {
    entries: Arc<RwLock<VecDeque<Change>>>,
    cap: usize,
}

impl ChangeHistory {
    pub fn new(cap: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(VecDeque::with_capacity(cap))),
            cap,
        }
    }

    pub async fn append(&self, batch: Vec<Change>) {
        if batch.is_empty() {
            return;
        }
        let mut entries = self.entries.write().await;
        entries.extend(batch);
        while entries.len() > self.cap {
            entries.pop_front();
        }
    }

    /// Up to `limit` of the newest changes, oldest first
    pub async fn recent(&self, limit: Option<usize>) -> Vec<Change> {
        let entries = self.entries.read().await;
        let skip = limit.map_or(0, |limit| entries.len().saturating_sub(limit));
        entries.iter().skip(skip).cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changes::{ChangeDetails, EntityDetail};
    use chrono::Utc;

    fn change(name: &str) -> Change {
        Change::new(
            ChangeDetails::NewEntities(vec![EntityDetail {
                name: name.to_string(),
                context: String::new(),
                source_tag: "h3".to_string(),
                parent_classes: Vec::new(),
            }]),
            format!("1 new entities found: {}", name),
            Utc::now(),
        )
    }

    fn names(changes: &[Change]) -> Vec<String> {
        changes
            .iter()
            .map(|c| match &c.details {
                ChangeDetails::NewEntities(d) => d[0].name.clone(),
                _ => unreachable!(),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_oldest_entries_are_evicted() {
        let history = ChangeHistory::new(3);
        history.append(vec![change("A"), change("B")]).await;
        history.append(vec![change("C"), change("D")]).await;

        assert_eq!(history.len().await, 3);
        assert_eq!(names(&history.recent(None).await), vec!["B", "C", "D"]);
    }

    #[tokio::test]
    async fn test_recent_limit() {
        let history = ChangeHistory::new(50);
        history
            .append(vec![change("A"), change("B"), change("C")])
            .await;
        assert_eq!(names(&history.recent(Some(2)).await), vec!["B", "C"]);
        assert_eq!(history.recent(Some(10)).await.len(), 3);
    }

    #[tokio::test]
    async fn test_clones_share_entries() {
        let history = ChangeHistory::new(5);
        let reader = history.clone();
        history.append(vec![change("A")]).await;
        assert!(!reader.is_empty().await);
    }
}
