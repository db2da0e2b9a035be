mod memory;
mod rest;
mod snapshot;

pub use memory::InMemoryDirectory;
pub use rest::RestDirectory;
pub use snapshot::{DirectorySnapshot, SnapshotFile};

use crate::error::Result;
use crate::records::{CodeRecord, CodeStyle, ScanEvent, VideoRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Read access to the code and video collections owned by the data service
#[async_trait]
pub trait CodeDirectory: Send + Sync {
    async fn list_codes(&self) -> Result<Vec<CodeRecord>>;

    async fn list_videos(&self) -> Result<Vec<VideoRecord>>;

    async fn get_video_by_id(&self, id: &str) -> Result<Option<VideoRecord>>;
}

/// The narrow write capability handed to the scan recorder
#[async_trait]
pub trait ScanSink: Send + Sync {
    async fn persist_scan_increment(&self, increment: &ScanIncrement) -> Result<()>;

    async fn persist_code_update(&self, code_id: &str, update: &CodeUpdate) -> Result<()>;
}

/// New counter values for a code after one resolved scan
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanIncrement {
    pub code_id: String,
    pub scan_count: u64,
    pub scanned_at: DateTime<Utc>,
    /// Full history, present only when analytics are enabled for the code
    pub scan_history: Option<Vec<ScanEvent>>,
}

/// Partial update of a code's editable fields
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CodeUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<CodeStyle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analytics_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scan_history: Option<Vec<ScanEvent>>,
}

impl CodeUpdate {
    pub fn analytics(enabled: bool) -> Self {
        Self {
            analytics_enabled: Some(enabled),
            ..Self::default()
        }
    }

    pub fn style(style: CodeStyle) -> Self {
        Self {
            style: Some(style),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.style.is_none() && self.analytics_enabled.is_none() && self.scan_history.is_none()
    }
}
