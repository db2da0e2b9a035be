use super::types::ScanOutcome;
use crate::error::{ArScanError, Result};
use crate::records::CodeRecord;
use crate::resolver::{MatchTier, Resolution};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// A record the payload was matched against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub code_id: String,
    pub video_id: String,
}

/// The last resolution attempt, kept for debugging bad scans and bad data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionReport {
    pub decoded_text: String,
    pub attempted_at: DateTime<Utc>,
    pub candidates: Vec<Candidate>,
    /// `matched`, `not_recognized` or `record_incomplete`
    pub outcome: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_code_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<MatchTier>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ambiguous: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ResolutionReport {
    pub fn new(
        decoded_text: &str,
        candidates: &[CodeRecord],
        resolution: Option<&Resolution<'_>>,
        outcome: &ScanOutcome,
    ) -> Self {
        let detail = match outcome {
            ScanOutcome::Matched(handoff) => handoff.persistence_warning.clone(),
            ScanOutcome::RecordIncomplete { reason, .. } => Some(reason.to_string()),
            ScanOutcome::NotRecognized => None,
        };

        Self {
            decoded_text: decoded_text.to_string(),
            attempted_at: Utc::now(),
            candidates: candidates
                .iter()
                .map(|code| Candidate {
                    code_id: code.id.clone(),
                    video_id: code.video_id.clone(),
                })
                .collect(),
            outcome: outcome.label().to_string(),
            matched_code_id: resolution.map(|r| r.code.id.clone()),
            tier: resolution.map(|r| r.tier),
            ambiguous: resolution.map(|r| r.ambiguous.clone()).unwrap_or_default(),
            detail,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Default file name, unique per attempt
    pub fn file_name(&self) -> String {
        format!(
            "resolution-{}.json",
            self.attempted_at.format("%Y%m%dT%H%M%S%3fZ")
        )
    }

    /// Write the report into `dir`, returning the file path
    pub async fn export_to(&self, dir: &Path) -> Result<PathBuf> {
        let json = self.to_json()?;

        fs::create_dir_all(dir).await.map_err(|e| {
            ArScanError::component(
                "diagnostics",
                format!("Failed to create diagnostics directory: {}", e),
            )
        })?;

        let path = dir.join(self.file_name());
        fs::write(&path, json).await.map_err(|e| {
            ArScanError::component(
                "diagnostics",
                format!("Failed to write resolution report: {}", e),
            )
        })?;

        debug!("Saved resolution report to {}", path.display());
        Ok(path)
    }
}
