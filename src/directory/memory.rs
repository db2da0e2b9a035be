use super::{CodeDirectory, CodeUpdate, ScanIncrement, ScanSink, SnapshotFile};
use crate::error::{PersistenceError, Result};
use crate::records::{CodeRecord, VideoRecord};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{debug, info};

/// Directory held entirely in memory, loaded from a snapshot file or built in tests
pub struct InMemoryDirectory {
    codes: RwLock<Vec<CodeRecord>>,
    videos: RwLock<Vec<VideoRecord>>,
    fail_writes: AtomicBool,
    writes: AtomicU64,
}

impl InMemoryDirectory {
    pub fn new(codes: Vec<CodeRecord>, videos: Vec<VideoRecord>) -> Self {
        Self {
            codes: RwLock::new(codes),
            videos: RwLock::new(videos),
            fail_writes: AtomicBool::new(false),
            writes: AtomicU64::new(0),
        }
    }

    /// Build the directory from a JSON snapshot export
    pub fn from_snapshot_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let (codes, videos) = SnapshotFile::load(path)?.into_records();
        info!(
            "Loaded in-memory directory with {} codes and {} videos",
            codes.len(),
            videos.len()
        );
        Ok(Self::new(codes, videos))
    }

    /// Make every subsequent write fail, to exercise persistence failure paths
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Relaxed);
    }

    pub fn code(&self, id: &str) -> Option<CodeRecord> {
        self.codes.read().iter().find(|c| c.id == id).cloned()
    }

    pub fn insert_code(&self, code: CodeRecord) {
        self.codes.write().insert(0, code);
    }

    pub fn insert_video(&self, video: VideoRecord) {
        self.videos.write().insert(0, video);
    }

    /// Number of successful writes
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    fn check_writable(&self, code_id: &str) -> Result<()> {
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(PersistenceError::WriteFailed {
                code_id: code_id.to_string(),
                details: "directory is read-only".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

#[async_trait]
impl CodeDirectory for InMemoryDirectory {
    async fn list_codes(&self) -> Result<Vec<CodeRecord>> {
        Ok(self.codes.read().clone())
    }

    async fn list_videos(&self) -> Result<Vec<VideoRecord>> {
        Ok(self.videos.read().clone())
    }

    async fn get_video_by_id(&self, id: &str) -> Result<Option<VideoRecord>> {
        Ok(self.videos.read().iter().find(|v| v.id == id).cloned())
    }
}

#[async_trait]
impl ScanSink for InMemoryDirectory {
    async fn persist_scan_increment(&self, increment: &ScanIncrement) -> Result<()> {
        self.check_writable(&increment.code_id)?;

        let mut codes = self.codes.write();
        let code = codes
            .iter_mut()
            .find(|c| c.id == increment.code_id)
            .ok_or_else(|| PersistenceError::CodeMissing {
                code_id: increment.code_id.clone(),
            })?;

        code.scan_count = increment.scan_count;
        code.last_scan_at = Some(increment.scanned_at);
        if let Some(history) = &increment.scan_history {
            code.scan_history = history.clone();
        }
        self.writes.fetch_add(1, Ordering::Relaxed);

        debug!(
            "Stored scan increment for {} (count {})",
            increment.code_id, increment.scan_count
        );
        Ok(())
    }

    async fn persist_code_update(&self, code_id: &str, update: &CodeUpdate) -> Result<()> {
        self.check_writable(code_id)?;

        let mut codes = self.codes.write();
        let code = codes
            .iter_mut()
            .find(|c| c.id == code_id)
            .ok_or_else(|| PersistenceError::CodeMissing {
                code_id: code_id.to_string(),
            })?;

        if let Some(style) = &update.style {
            code.style = style.clone();
        }
        if let Some(enabled) = update.analytics_enabled {
            code.analytics_enabled = enabled;
        }
        if let Some(history) = &update.scan_history {
            code.scan_history = history.clone();
        }
        self.writes.fetch_add(1, Ordering::Relaxed);

        Ok(())
    }
}
