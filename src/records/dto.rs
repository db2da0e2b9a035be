//! Rows as stored by the remote data service, and the validating mapping
//! into the typed records the rest of the crate works with.

use super::model::{CodeRecord, CodeStyle, ScanEvent, ScanLocation, VideoRecord};
use crate::error::DirectoryError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// `qr_codes` table row
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CodeRow {
    pub id: Option<String>,
    pub video_id: Option<String>,
    #[serde(default)]
    pub video_title: Option<String>,
    pub date_created: Option<String>,
    #[serde(default)]
    pub style: Option<serde_json::Value>,
    #[serde(default)]
    pub scans: Option<i64>,
    #[serde(default)]
    pub last_scan: Option<String>,
    #[serde(default)]
    pub scan_history: Option<serde_json::Value>,
    #[serde(default)]
    pub analytics_enabled: Option<bool>,
}

/// `videos` table row
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VideoRow {
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub low_bandwidth_url: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub size: Option<u64>,
}

/// Scan history entry as stored inside the `scan_history` JSON column
#[derive(Debug, Clone, Deserialize)]
struct ScanEventRow {
    id: String,
    timestamp: String,
    #[serde(default)]
    device: Option<String>,
    #[serde(default)]
    browser: Option<String>,
    #[serde(default)]
    os: Option<String>,
    #[serde(default)]
    location: Option<ScanLocation>,
}

fn required(field: &str, value: Option<String>) -> Result<String, DirectoryError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(DirectoryError::InvalidRecord {
            details: format!("missing {}", field),
        }),
    }
}

fn parse_timestamp(field: &str, raw: &str) -> Result<DateTime<Utc>, DirectoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| DirectoryError::InvalidRecord {
            details: format!("{} '{}': {}", field, raw, e),
        })
}

fn parse_history(code_id: &str, raw: Option<serde_json::Value>) -> Vec<ScanEvent> {
    let entries = match raw {
        Some(serde_json::Value::Array(entries)) => entries,
        Some(serde_json::Value::Null) | None => return Vec::new(),
        Some(other) => {
            warn!("Code {} has non-array scan history: {}", code_id, other);
            return Vec::new();
        }
    };

    entries
        .into_iter()
        .filter_map(|entry| {
            let row: ScanEventRow = match serde_json::from_value(entry) {
                Ok(row) => row,
                Err(e) => {
                    warn!("Dropping malformed scan event on {}: {}", code_id, e);
                    return None;
                }
            };
            let timestamp = match parse_timestamp("timestamp", &row.timestamp) {
                Ok(ts) => ts,
                Err(e) => {
                    warn!("Dropping scan event {} on {}: {}", row.id, code_id, e);
                    return None;
                }
            };
            Some(ScanEvent {
                id: row.id,
                timestamp,
                device: row.device,
                browser: row.browser,
                os: row.os,
                location: row.location,
            })
        })
        .collect()
}

impl TryFrom<CodeRow> for CodeRecord {
    type Error = DirectoryError;

    fn try_from(row: CodeRow) -> Result<Self, Self::Error> {
        let id = required("id", row.id)?;
        let video_id = required("video_id", row.video_id)?;
        let created_at = parse_timestamp("date_created", &required("date_created", row.date_created)?)?;

        let style = match row.style {
            Some(value) if !value.is_null() => serde_json::from_value(value).unwrap_or_else(|e| {
                warn!("Code {} has an invalid style, using defaults: {}", id, e);
                CodeStyle::default()
            }),
            _ => CodeStyle::default(),
        };

        let last_scan_at = match row.last_scan.as_deref() {
            Some(raw) if !raw.is_empty() => Some(parse_timestamp("last_scan", raw)?),
            _ => None,
        };

        let scan_history = parse_history(&id, row.scan_history);
        let mut scan_count = row.scans.unwrap_or(0).max(0) as u64;
        if scan_count < scan_history.len() as u64 {
            warn!(
                "Code {} reports {} scans but has {} history entries",
                id,
                scan_count,
                scan_history.len()
            );
            scan_count = scan_history.len() as u64;
        }

        Ok(CodeRecord {
            id,
            video_id,
            created_at,
            style,
            scan_count,
            last_scan_at,
            scan_history,
            analytics_enabled: row.analytics_enabled.unwrap_or(false),
        })
    }
}

impl TryFrom<VideoRow> for VideoRecord {
    type Error = DirectoryError;

    fn try_from(row: VideoRow) -> Result<Self, Self::Error> {
        let id = required("id", row.id)?;
        let non_blank = |v: Option<String>| v.filter(|s| !s.trim().is_empty());

        Ok(VideoRecord {
            title: row.title.unwrap_or_default(),
            url: non_blank(row.url),
            low_bandwidth_url: non_blank(row.low_bandwidth_url),
            duration_seconds: row.duration,
            size_bytes: row.size,
            id,
        })
    }
}

/// Map a batch of rows, skipping (and logging) the ones that fail validation
pub fn map_rows<R, T>(rows: Vec<R>, kind: &str) -> Vec<T>
where
    T: TryFrom<R, Error = DirectoryError>,
{
    rows.into_iter()
        .filter_map(|row| match T::try_from(row) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("Skipping invalid {} row: {}", kind, e);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn code_row(value: serde_json::Value) -> CodeRow {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_code_row_maps_to_record() {
        let row = code_row(json!({
            "id": "qr-1",
            "video_id": "v-1",
            "video_title": "Clip",
            "date_created": "2024-03-01T10:00:00Z",
            "style": {"foreground": "#111111", "background": "#eeeeee", "cornerRadius": 4, "size": 300},
            "scans": 2,
            "last_scan": "2024-03-02T10:00:00Z",
            "scan_history": [
                {"id": "scan_1_abcdefghi", "timestamp": "2024-03-02T10:00:00Z", "browser": "Chrome"},
                {"id": "broken"}
            ],
            "analytics_enabled": true
        }));

        let code = CodeRecord::try_from(row).unwrap();
        assert_eq!(code.id, "qr-1");
        assert_eq!(code.style.size, 300);
        assert_eq!(code.scan_count, 2);
        assert_eq!(code.scan_history.len(), 1);
        assert_eq!(code.scan_history[0].browser.as_deref(), Some("Chrome"));
        assert!(code.last_scan_at.is_some());
        assert!(code.analytics_enabled);
    }

    #[test]
    fn test_code_row_defaults_and_invariant_repair() {
        let row = code_row(json!({
            "id": "qr-2",
            "video_id": "v-2",
            "date_created": "2024-03-01T10:00:00+02:00",
            "scans": null,
            "scan_history": [
                {"id": "a", "timestamp": "2024-03-02T10:00:00Z"},
                {"id": "b", "timestamp": "2024-03-02T11:00:00Z"}
            ]
        }));

        let code = CodeRecord::try_from(row).unwrap();
        assert_eq!(code.style, CodeStyle::default());
        assert_eq!(code.scan_count, 2);
        assert!(!code.analytics_enabled);
        assert!(code.counters_consistent());
    }

    #[test]
    fn test_code_row_requires_ids() {
        let missing_video = code_row(json!({
            "id": "qr-3",
            "video_id": "",
            "date_created": "2024-03-01T10:00:00Z"
        }));
        assert!(CodeRecord::try_from(missing_video).is_err());

        let rows = vec![
            code_row(json!({"id": "qr-4", "video_id": "v", "date_created": "2024-03-01T10:00:00Z"})),
            code_row(json!({"video_id": "v", "date_created": "2024-03-01T10:00:00Z"})),
        ];
        let codes: Vec<CodeRecord> = map_rows(rows, "code");
        assert_eq!(codes.len(), 1);
    }

    #[test]
    fn test_video_row_blank_url_becomes_none() {
        let row: VideoRow = serde_json::from_value(json!({
            "id": "v-1",
            "title": "Clip",
            "url": "",
            "duration": 12.5
        }))
        .unwrap();

        let video = VideoRecord::try_from(row).unwrap();
        assert_eq!(video.url, None);
        assert_eq!(video.duration_seconds, Some(12.5));
    }
}
