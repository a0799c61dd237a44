//! Report dataset loading
//!
//! Reports live in one folder as `diagnostic_<id>.json`, each an array of
//! symptom items:
//!
//! ```json
//! [{"s_symptom": "...",
//!   "U_unit_set": [{"u_unit": {"d_diagnosis": "...",
//!                              "o_organ": {"organName": "...", "anatomicalLocations": ["..."]}}}]}]
//! ```
//!
//! Missing organ or location fields are carried as absent so the normalizer
//! can reject them; nothing is filled in here.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use symloc_common::models::{AnnotationUnit, Report, Symptom};

use crate::error::{EvalError, EvalResult};

const FILE_PREFIX: &str = "diagnostic_";
const FILE_SUFFIX: &str = ".json";

/// Inclusive report id range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportIdRange {
    pub start: u32,
    pub end: u32,
}

impl ReportIdRange {
    pub fn new(start: u32, end: u32) -> EvalResult<Self> {
        if start > end {
            return Err(EvalError::Dataset(format!(
                "invalid report id range: start {} is after end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, id: u32) -> bool {
        (self.start..=self.end).contains(&id)
    }
}

#[derive(Debug, Deserialize)]
struct RawSymptomItem {
    #[serde(default)]
    s_symptom: Option<String>,
    #[serde(rename = "U_unit_set", default)]
    unit_set: Vec<RawUnitWrapper>,
}

#[derive(Debug, Deserialize)]
struct RawUnitWrapper {
    u_unit: Option<RawUnit>,
}

#[derive(Debug, Deserialize)]
struct RawUnit {
    #[serde(default)]
    d_diagnosis: Option<String>,
    #[serde(default)]
    o_organ: Option<RawOrgan>,
}

#[derive(Debug, Deserialize)]
struct RawOrgan {
    #[serde(rename = "organName", default)]
    organ_name: Option<String>,
    #[serde(rename = "anatomicalLocations", default)]
    anatomical_locations: Option<Vec<String>>,
}

impl From<RawUnitWrapper> for AnnotationUnit {
    fn from(wrapper: RawUnitWrapper) -> Self {
        let unit = wrapper.u_unit;
        let diagnosis_text = unit
            .as_ref()
            .and_then(|u| u.d_diagnosis.clone())
            .unwrap_or_default();
        let organ = unit.and_then(|u| u.o_organ);

        AnnotationUnit {
            diagnosis_text,
            organ_name: organ.as_ref().and_then(|o| o.organ_name.clone()),
            anatomical_locations: organ.and_then(|o| o.anatomical_locations),
        }
    }
}

/// Parse one report document
///
/// Items with blank symptom text are skipped; symptom indices keep the item's
/// position in the file.
pub fn parse_report(report_id: u32, json: &str) -> EvalResult<Report> {
    let items: Vec<RawSymptomItem> = serde_json::from_str(json)
        .map_err(|e| EvalError::Dataset(format!("report {}: {}", report_id, e)))?;

    let symptoms = items
        .into_iter()
        .enumerate()
        .filter_map(|(index, item)| {
            let text = item.s_symptom.as_deref().map(str::trim).unwrap_or_default();
            if text.is_empty() {
                return None;
            }
            let units = item.unit_set.into_iter().map(AnnotationUnit::from).collect();
            Some(Symptom::new(report_id, index, text, units))
        })
        .collect();

    Ok(Report {
        report_id,
        source_path: None,
        symptoms,
    })
}

/// Report id from a `diagnostic_<id>.json` file name
pub fn report_id_from_file_name(name: &str) -> Option<u32> {
    name.strip_prefix(FILE_PREFIX)?
        .strip_suffix(FILE_SUFFIX)?
        .parse()
        .ok()
}

#[derive(Debug, Clone)]
pub struct DatasetLoader {
    data_path: PathBuf,
}

impl DatasetLoader {
    pub fn new(data_path: impl Into<PathBuf>) -> Self {
        Self {
            data_path: data_path.into(),
        }
    }

    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    /// Report files whose id lies in `range`, sorted by id
    pub async fn reports_by_id_range(&self, range: ReportIdRange) -> EvalResult<Vec<(u32, PathBuf)>> {
        let mut dir = tokio::fs::read_dir(&self.data_path).await.map_err(|e| {
            EvalError::Dataset(format!("cannot read data folder {}: {}", self.data_path.display(), e))
        })?;

        let mut reports = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| EvalError::Dataset(e.to_string()))?
        {
            let name = entry.file_name();
            let Some(id) = name.to_str().and_then(report_id_from_file_name) else {
                continue;
            };
            if range.contains(id) {
                reports.push((id, entry.path()));
            }
        }

        reports.sort_by_key(|(id, _)| *id);
        tracing::info!(
            data_path = %self.data_path.display(),
            start = range.start,
            end = range.end,
            found = reports.len(),
            "Listed reports in range"
        );
        Ok(reports)
    }

    pub async fn load_report(&self, report_id: u32, path: &Path) -> EvalResult<Report> {
        let json = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| EvalError::Dataset(format!("report {}: {}", report_id, e)))?;
        let mut report = parse_report(report_id, &json)?;
        report.source_path = Some(path.to_path_buf());
        Ok(report)
    }

    /// Load every report in range
    ///
    /// A report that fails to load is returned as an error entry and does
    /// not stop the others.
    pub async fn load_range(&self, range: ReportIdRange) -> EvalResult<Vec<(u32, EvalResult<Report>)>> {
        let mut loaded = Vec::new();
        for (id, path) in self.reports_by_id_range(range).await? {
            let result = self.load_report(id, &path).await;
            if let Err(e) = &result {
                tracing::warn!(report_id = id, error = %e, "Failed to load report");
            }
            loaded.push((id, result));
        }
        Ok(loaded)
    }
}
