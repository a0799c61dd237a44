//! Shared retrieval cache
//!
//! Keyed by (report id, query). Read-shared across workers and written at
//! most once per key: the first successful retrieval is stored and every
//! later caller sees that same value, so a rerun within a batch can never
//! swap the context a symptom was evaluated against.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use symloc_common::models::RetrievedSnippet;
use tokio::sync::{OnceCell, RwLock};

use super::{RetrievalError, Retriever};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    report_id: u32,
    query: String,
}

impl CacheKey {
    fn new(report_id: u32, query: &str) -> Self {
        Self {
            report_id,
            query: query.trim().to_string(),
        }
    }
}

type Slot = Arc<OnceCell<Arc<Vec<RetrievedSnippet>>>>;

/// One exported cache line
#[derive(Debug, Serialize, Deserialize)]
struct CacheLine {
    report_id: u32,
    query: String,
    results: Vec<RetrievedSnippet>,
}

#[derive(Debug, Default)]
pub struct RetrievalCache {
    slots: RwLock<HashMap<CacheKey, Slot>>,
}

impl RetrievalCache {
    pub fn new() -> Self {
        Self::default()
    }

    async fn slot(&self, key: CacheKey) -> Slot {
        if let Some(slot) = self.slots.read().await.get(&key) {
            return slot.clone();
        }
        self.slots.write().await.entry(key).or_default().clone()
    }

    /// Stored snippets for a key, if any
    pub async fn get(&self, report_id: u32, query: &str) -> Option<Arc<Vec<RetrievedSnippet>>> {
        let slots = self.slots.read().await;
        slots.get(&CacheKey::new(report_id, query)).and_then(|slot| slot.get().cloned())
    }

    /// Store snippets unless the key already holds a value
    ///
    /// Returns the value now stored and whether this call wrote it.
    pub async fn insert_if_absent(
        &self,
        report_id: u32,
        query: &str,
        snippets: Vec<RetrievedSnippet>,
    ) -> (Arc<Vec<RetrievedSnippet>>, bool) {
        let slot = self.slot(CacheKey::new(report_id, query)).await;
        let candidate = Arc::new(snippets);
        let stored = slot
            .get_or_init(|| {
                let value = candidate.clone();
                async move { value }
            })
            .await
            .clone();
        let wrote = Arc::ptr_eq(&stored, &candidate);
        (stored, wrote)
    }

    /// Cached snippets, retrieving on first use
    ///
    /// Concurrent callers for the same key wait on a single retrieval. A
    /// failed retrieval stores nothing, so a later caller may try again.
    pub async fn get_or_retrieve(
        &self,
        report_id: u32,
        query: &str,
        top_k: usize,
        retriever: &dyn Retriever,
    ) -> Result<Arc<Vec<RetrievedSnippet>>, RetrievalError> {
        let slot = self.slot(CacheKey::new(report_id, query)).await;
        let stored = slot
            .get_or_try_init(|| async {
                tracing::debug!(report_id, query = %query.trim(), top_k, "Retrieval cache miss");
                let snippets = retriever.retrieve(query.trim(), top_k).await?;
                Ok::<_, RetrievalError>(Arc::new(snippets))
            })
            .await?;
        Ok(stored.clone())
    }

    /// Number of keys holding a value
    pub async fn len(&self) -> usize {
        self.slots.read().await.values().filter(|slot| slot.initialized()).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Write all stored entries as JSONL, sorted by report and query
    pub async fn export_jsonl(&self, path: &Path) -> Result<usize, RetrievalError> {
        let mut lines: Vec<CacheLine> = {
            let slots = self.slots.read().await;
            slots
                .iter()
                .filter_map(|(key, slot)| {
                    slot.get().map(|snippets| CacheLine {
                        report_id: key.report_id,
                        query: key.query.clone(),
                        results: snippets.as_ref().clone(),
                    })
                })
                .collect()
        };
        lines.sort_by(|a, b| (a.report_id, &a.query).cmp(&(b.report_id, &b.query)));

        let mut content = String::new();
        for line in &lines {
            let json = serde_json::to_string(line).map_err(|e| RetrievalError::Parse(e.to_string()))?;
            content.push_str(&json);
            content.push('\n');
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, content).await?;
        Ok(lines.len())
    }

    /// Seed the cache from an exported JSONL file
    ///
    /// Entries already present are kept; returns how many lines were stored.
    pub async fn import_jsonl(&self, path: &Path) -> Result<usize, RetrievalError> {
        let content = tokio::fs::read_to_string(path).await?;
        let mut stored = 0;
        for (line_no, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let entry: CacheLine = serde_json::from_str(line)
                .map_err(|e| RetrievalError::Parse(format!("line {}: {}", line_no + 1, e)))?;
            let (_, wrote) = self.insert_if_absent(entry.report_id, &entry.query, entry.results).await;
            if wrote {
                stored += 1;
            }
        }
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn snippet(id: &str) -> RetrievedSnippet {
        RetrievedSnippet {
            source_id: id.to_string(),
            organ_name: "Vein (Vena)".to_string(),
            anatomical_locations: vec!["Femoral Vein".to_string()],
            diagnosis_text: "Deep vein thrombosis".to_string(),
        }
    }

    /// Returns a distinct snippet id per call so overwrites would be visible
    struct CountingRetriever {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Retriever for CountingRetriever {
        async fn retrieve(&self, _query: &str, _top_k: usize) -> Result<Vec<RetrievedSnippet>, RetrievalError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(vec![snippet(&format!("call-{}", n))])
        }
    }

    struct FailingRetriever;

    #[async_trait]
    impl Retriever for FailingRetriever {
        async fn retrieve(&self, _query: &str, _top_k: usize) -> Result<Vec<RetrievedSnippet>, RetrievalError> {
            Err(RetrievalError::Unavailable("index offline".to_string()))
        }
    }

    #[tokio::test]
    async fn test_first_writer_wins() {
        let cache = RetrievalCache::new();
        let (first, wrote) = cache.insert_if_absent(4000, "calf swelling", vec![snippet("a")]).await;
        assert!(wrote);
        let (second, wrote) = cache.insert_if_absent(4000, " calf swelling ", vec![snippet("b")]).await;
        assert!(!wrote);

        assert_eq!(first[0].source_id, "a");
        assert_eq!(second[0].source_id, "a");
        assert_eq!(cache.get(4000, "calf swelling").await.unwrap()[0].source_id, "a");
    }

    #[tokio::test]
    async fn test_keys_are_scoped_by_report() {
        let cache = RetrievalCache::new();
        cache.insert_if_absent(1, "q", vec![snippet("r1")]).await;
        cache.insert_if_absent(2, "q", vec![snippet("r2")]).await;
        assert_eq!(cache.len().await, 2);
        assert_eq!(cache.get(2, "q").await.unwrap()[0].source_id, "r2");
        assert!(cache.get(3, "q").await.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_retrieval() {
        let cache = Arc::new(RetrievalCache::new());
        let retriever = Arc::new(CountingRetriever {
            calls: AtomicUsize::new(0),
        });

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let retriever = retriever.clone();
            tasks.spawn(async move {
                cache
                    .get_or_retrieve(4000, "calf swelling", 3, retriever.as_ref())
                    .await
                    .unwrap()[0]
                    .source_id
                    .clone()
            });
        }

        let mut ids = Vec::new();
        while let Some(result) = tasks.join_next().await {
            ids.push(result.unwrap());
        }

        assert_eq!(retriever.calls.load(Ordering::SeqCst), 1);
        assert!(ids.iter().all(|id| id == "call-0"));
    }

    #[tokio::test]
    async fn test_failed_retrieval_stores_nothing() {
        let cache = RetrievalCache::new();
        assert!(cache.get_or_retrieve(1, "q", 3, &FailingRetriever).await.is_err());
        assert!(cache.get(1, "q").await.is_none());
        assert!(cache.is_empty().await);

        let retriever = CountingRetriever {
            calls: AtomicUsize::new(0),
        };
        let snippets = cache.get_or_retrieve(1, "q", 3, &retriever).await.unwrap();
        assert_eq!(snippets.len(), 1);
    }

    #[tokio::test]
    async fn test_export_then_import() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("cache").join("retrieval.jsonl");

        let cache = RetrievalCache::new();
        cache.insert_if_absent(2, "b", vec![snippet("x")]).await;
        cache.insert_if_absent(1, "a", vec![snippet("y"), snippet("z")]).await;
        assert_eq!(cache.export_jsonl(&path).await.unwrap(), 2);

        let restored = RetrievalCache::new();
        restored.insert_if_absent(1, "a", vec![snippet("kept")]).await;
        assert_eq!(restored.import_jsonl(&path).await.unwrap(), 1);
        assert_eq!(restored.get(1, "a").await.unwrap()[0].source_id, "kept");
        assert_eq!(restored.get(2, "b").await.unwrap()[0].source_id, "x");
    }
}
