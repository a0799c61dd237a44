//! Report artifact storage
//!
//! Layout under the root folder:
//!
//! ```text
//! reports/
//!   report_<id>_<YYYYmmdd_HHMMSS>.json   full ReportArtifact
//!   report_<id>_<YYYYmmdd_HHMMSS>.txt    plain-text summary
//!   batch_summary_<YYYYmmdd_HHMMSS>.json
//!   batch_summary_<YYYYmmdd_HHMMSS>.txt
//! ```
//!
//! Files are written to a `.tmp` sibling and renamed into place. A name that
//! already exists gets a numeric suffix rather than being overwritten.

pub mod summary;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use symloc_common::models::{BatchSummary, ReportArtifact};

use crate::error::EvalResult;

pub use summary::{render_batch, render_report};

const REPORTS_DIR: &str = "reports";
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Persists report artifacts and batch summaries
#[derive(Debug, Clone)]
pub struct ReportStore {
    reports_dir: PathBuf,
}

impl ReportStore {
    /// Store rooted at `<root_folder>/reports`
    pub fn new(root_folder: impl AsRef<Path>) -> Self {
        Self {
            reports_dir: root_folder.as_ref().join(REPORTS_DIR),
        }
    }

    pub fn reports_dir(&self) -> &Path {
        &self.reports_dir
    }

    /// Write a report artifact and its text summary; returns the JSON path
    pub async fn save_report_artifact(&self, artifact: &ReportArtifact) -> EvalResult<PathBuf> {
        let stem = format!("report_{}_{}", artifact.report_id, timestamp(artifact.generated_at));
        let json_path = self.write_pair(&stem, artifact, &render_report(artifact)).await?;

        tracing::info!(report_id = artifact.report_id, path = %json_path.display(), "Saved report artifact");
        Ok(json_path)
    }

    /// Write a batch summary and its text rendering; returns the JSON path
    pub async fn save_batch_summary(&self, summary: &BatchSummary) -> EvalResult<PathBuf> {
        let stem = format!("batch_summary_{}", timestamp(summary.ended_at));
        let json_path = self.write_pair(&stem, summary, &render_batch(summary)).await?;

        tracing::info!(batch_id = %summary.batch_id, path = %json_path.display(), "Saved batch summary");
        Ok(json_path)
    }

    /// JSON report artifacts in the store, sorted by file name
    pub async fn list_report_artifacts(&self) -> EvalResult<Vec<PathBuf>> {
        let mut paths = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.reports_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(paths),
            Err(e) => return Err(symloc_common::Error::Io(e).into()),
        };

        while let Some(entry) = entries.next_entry().await.map_err(symloc_common::Error::Io)? {
            let path = entry.path();
            let is_report = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with("report_") && n.ends_with(".json"))
                .unwrap_or(false);
            if is_report {
                paths.push(path);
            }
        }

        paths.sort();
        Ok(paths)
    }

    async fn write_pair<T: Serialize>(&self, stem: &str, value: &T, text: &str) -> EvalResult<PathBuf> {
        tokio::fs::create_dir_all(&self.reports_dir)
            .await
            .map_err(symloc_common::Error::Io)?;

        let stem = self.unique_stem(stem).await;
        let json_path = self.reports_dir.join(format!("{stem}.json"));
        let text_path = self.reports_dir.join(format!("{stem}.txt"));

        let json = serde_json::to_string_pretty(value).map_err(symloc_common::Error::Json)?;
        write_atomic(&json_path, json.as_bytes()).await?;
        write_atomic(&text_path, text.as_bytes()).await?;

        Ok(json_path)
    }

    async fn unique_stem(&self, stem: &str) -> String {
        let mut candidate = stem.to_string();
        let mut n = 1;
        while tokio::fs::try_exists(self.reports_dir.join(format!("{candidate}.json")))
            .await
            .unwrap_or(false)
        {
            candidate = format!("{stem}_{n}");
            n += 1;
        }
        candidate
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

async fn write_atomic(path: &Path, contents: &[u8]) -> EvalResult<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, contents).await.map_err(symloc_common::Error::Io)?;
    tokio::fs::rename(&tmp, path).await.map_err(symloc_common::Error::Io)?;
    Ok(())
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> EvalResult<T> {
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            symloc_common::Error::NotFound(path.display().to_string())
        } else {
            symloc_common::Error::Io(e)
        }
    })?;
    let value = serde_json::from_str(&content).map_err(symloc_common::Error::Json)?;
    Ok(value)
}

/// Read back a stored report artifact
pub async fn load_report_artifact(path: &Path) -> EvalResult<ReportArtifact> {
    read_json(path).await
}

/// Read back a stored batch summary
pub async fn load_batch_summary(path: &Path) -> EvalResult<BatchSummary> {
    read_json(path).await
}
