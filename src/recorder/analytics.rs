use crate::error::Result;
use crate::records::{CodeRecord, ScanEvent, VideoRecord};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Per-code analytics report
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsExport<'a> {
    pub qr_code_id: &'a str,
    pub video_title: &'a str,
    pub total_scans: u64,
    pub last_scan: Option<DateTime<Utc>>,
    pub scan_history: &'a [ScanEvent],
}

impl<'a> AnalyticsExport<'a> {
    pub fn new(code: &'a CodeRecord, video: Option<&'a VideoRecord>) -> Self {
        Self {
            qr_code_id: &code.id,
            video_title: video.map(|v| v.title.as_str()).unwrap_or("Unknown video"),
            total_scans: code.scan_count,
            last_scan: code.last_scan_at,
            scan_history: &code.scan_history,
        }
    }
}

/// Pretty-printed JSON analytics for a code
pub fn export_analytics(code: &CodeRecord, video: Option<&VideoRecord>) -> Result<String> {
    Ok(serde_json::to_string_pretty(&AnalyticsExport::new(code, video))?)
}
