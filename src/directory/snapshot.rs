use super::CodeDirectory;
use crate::error::{DirectoryError, Result};
use crate::records::{map_rows, CodeRecord, CodeRow, VideoRecord, VideoRow};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// On-disk export of the data service tables
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotFile {
    #[serde(default)]
    pub codes: Vec<CodeRow>,
    #[serde(default)]
    pub videos: Vec<VideoRow>,
}

impl SnapshotFile {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| DirectoryError::Snapshot {
            details: format!("{}: {}", path.display(), e),
        })?;
        let file: SnapshotFile = serde_json::from_str(&raw).map_err(|e| DirectoryError::Snapshot {
            details: format!("{}: {}", path.display(), e),
        })?;
        debug!(
            "Read snapshot {} ({} codes, {} videos)",
            path.display(),
            file.codes.len(),
            file.videos.len()
        );
        Ok(file)
    }

    /// Validate the rows into typed records
    pub fn into_records(self) -> (Vec<CodeRecord>, Vec<VideoRecord>) {
        (map_rows(self.codes, "code"), map_rows(self.videos, "video"))
    }
}

/// Read-only view of codes and videos taken right before a scan session
#[derive(Debug, Clone, Default)]
pub struct DirectorySnapshot {
    pub codes: Vec<CodeRecord>,
    pub videos: Vec<VideoRecord>,
}

impl DirectorySnapshot {
    pub fn new(codes: Vec<CodeRecord>, videos: Vec<VideoRecord>) -> Self {
        Self { codes, videos }
    }

    /// Take a fresh snapshot from the directory
    pub async fn fetch(directory: &dyn CodeDirectory) -> Result<Self> {
        let codes = directory.list_codes().await?;
        let videos = directory.list_videos().await?;
        info!(
            "Directory snapshot refreshed: {} codes, {} videos",
            codes.len(),
            videos.len()
        );
        Ok(Self { codes, videos })
    }

    pub fn code(&self, id: &str) -> Option<&CodeRecord> {
        self.codes.iter().find(|c| c.id == id)
    }

    pub fn video(&self, id: &str) -> Option<&VideoRecord> {
        self.videos.iter().find(|v| v.id == id)
    }

    /// Replace a code after the recorder updated it
    pub fn replace_code(&mut self, code: CodeRecord) {
        if let Some(slot) = self.codes.iter_mut().find(|c| c.id == code.id) {
            *slot = code;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}
