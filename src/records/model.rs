use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A video a code can point at. Owned by the video library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoRecord {
    pub id: String,
    pub title: String,
    /// Playable source, absent when the upload never produced one
    pub url: Option<String>,
    /// Reduced quality rendition for constrained networks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub low_bandwidth_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
}

impl VideoRecord {
    pub fn new(id: impl Into<String>, title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            url: Some(url.into()),
            low_bandwidth_url: None,
            duration_seconds: None,
            size_bytes: None,
        }
    }

    /// The URL playback can start from, if any
    pub fn playable_url(&self) -> Option<&str> {
        self.url.as_deref().filter(|u| !u.trim().is_empty())
    }
}

/// Visual style of a printed code
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeStyle {
    pub foreground: String,
    pub background: String,
    pub corner_radius: u32,
    pub size: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
}

impl Default for CodeStyle {
    fn default() -> Self {
        Self {
            foreground: "#000000".to_string(),
            background: "#ffffff".to_string(),
            corner_radius: 0,
            size: 200,
            logo_url: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScanLocation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
}

/// One entry of a code's scan history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanEvent {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<ScanLocation>,
}

impl ScanEvent {
    /// Locally generated, practically unique history id: `scan_<millis>_<9 chars>`
    pub fn generate_id(at: DateTime<Utc>) -> String {
        let suffix = Uuid::new_v4().simple().to_string();
        format!("scan_{}_{}", at.timestamp_millis(), &suffix[..9])
    }
}

/// A generated code with its scan statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeRecord {
    pub id: String,
    pub video_id: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub style: CodeStyle,
    pub scan_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_scan_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scan_history: Vec<ScanEvent>,
    pub analytics_enabled: bool,
}

impl CodeRecord {
    pub fn new(id: impl Into<String>, video_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            video_id: video_id.into(),
            created_at: Utc::now(),
            style: CodeStyle::default(),
            scan_count: 0,
            last_scan_at: None,
            scan_history: Vec::new(),
            analytics_enabled: true,
        }
    }

    pub fn with_analytics(mut self, enabled: bool) -> Self {
        self.analytics_enabled = enabled;
        self
    }

    pub fn with_scan_count(mut self, count: u64) -> Self {
        self.scan_count = count;
        self
    }

    /// `scan_count` never falls below the number of recorded events
    pub fn counters_consistent(&self) -> bool {
        self.scan_count >= self.scan_history.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_event_id_format() {
        let at = Utc::now();
        let id = ScanEvent::generate_id(at);
        let parts: Vec<&str> = id.splitn(3, '_').collect();

        assert_eq!(parts[0], "scan");
        assert_eq!(parts[1], at.timestamp_millis().to_string());
        assert_eq!(parts[2].len(), 9);
        assert_ne!(id, ScanEvent::generate_id(at));
    }

    #[test]
    fn test_playable_url_ignores_blank() {
        let mut video = VideoRecord::new("v-1", "Clip", "https://cdn/x.mp4");
        assert_eq!(video.playable_url(), Some("https://cdn/x.mp4"));

        video.url = Some("  ".to_string());
        assert_eq!(video.playable_url(), None);

        video.url = None;
        assert_eq!(video.playable_url(), None);
    }

    #[test]
    fn test_code_record_serializes_camel_case() {
        let code = CodeRecord::new("qr-1", "v-1").with_scan_count(2);
        let json = serde_json::to_value(&code).unwrap();

        assert_eq!(json["videoId"], "v-1");
        assert_eq!(json["scanCount"], 2);
        assert_eq!(json["analyticsEnabled"], true);
        assert!(code.counters_consistent());
    }
}
