//! Offline retriever over pre-computed JSONL results
//!
//! Each line holds the results of one earlier vector search:
//! `{"query": "...", "results": [{"id": "...", "text": "...", "o_organ": {...}}]}`
//! Lookup is an exact match on the trimmed query; unknown queries return no
//! snippets. Lines that fail to parse are skipped with a warning.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use symloc_common::models::RetrievedSnippet;

use super::{RetrievalError, Retriever};

#[derive(Debug, Deserialize)]
struct JsonlRecord {
    #[serde(default)]
    query: String,
    #[serde(default)]
    results: Vec<JsonlResult>,
}

#[derive(Debug, Deserialize)]
struct JsonlResult {
    id: Option<String>,
    text: Option<String>,
    d_diagnosis: Option<String>,
    o_organ: Option<JsonlOrgan>,
}

#[derive(Debug, Deserialize)]
struct JsonlOrgan {
    #[serde(rename = "organName", default)]
    organ_name: String,
    #[serde(rename = "anatomicalLocations", default)]
    anatomical_locations: Vec<String>,
}

#[derive(Debug, Default)]
pub struct JsonlRetriever {
    entries: HashMap<String, Vec<RetrievedSnippet>>,
}

impl JsonlRetriever {
    pub async fn load(path: &Path) -> Result<Self, RetrievalError> {
        let content = tokio::fs::read_to_string(path).await?;
        let retriever = Self::from_jsonl(&content);
        tracing::info!(
            path = %path.display(),
            queries = retriever.len(),
            "Loaded retrieval results"
        );
        Ok(retriever)
    }

    pub fn from_jsonl(content: &str) -> Self {
        let mut entries = HashMap::new();

        for (line_no, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let record: JsonlRecord = match serde_json::from_str(line) {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!(line = line_no + 1, error = %e, "Skipping malformed retrieval line");
                    continue;
                }
            };

            let query = record.query.trim();
            if query.is_empty() {
                continue;
            }

            let snippets = record
                .results
                .into_iter()
                .enumerate()
                .map(|(idx, result)| {
                    let (organ_name, anatomical_locations) = match result.o_organ {
                        Some(organ) => (organ.organ_name, organ.anatomical_locations),
                        None => (String::new(), Vec::new()),
                    };
                    RetrievedSnippet {
                        source_id: result.id.unwrap_or_else(|| format!("line{}-{}", line_no + 1, idx)),
                        organ_name,
                        anatomical_locations,
                        diagnosis_text: result.text.or(result.d_diagnosis).unwrap_or_default(),
                    }
                })
                .collect();

            entries.insert(query.to_string(), snippets);
        }

        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl Retriever for JsonlRetriever {
    async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<RetrievedSnippet>, RetrievalError> {
        let snippets = self
            .entries
            .get(query.trim())
            .map(|all| all.iter().take(top_k).cloned().collect())
            .unwrap_or_default();
        Ok(snippets)
    }
}
