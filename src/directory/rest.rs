use super::{CodeDirectory, CodeUpdate, ScanIncrement, ScanSink};
use crate::config::DirectoryConfig;
use crate::error::{DirectoryError, PersistenceError, Result};
use crate::records::{map_rows, CodeRecord, CodeRow, VideoRecord, VideoRow};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

const CODES_TABLE: &str = "qr_codes";
const VIDEOS_TABLE: &str = "videos";

/// Client for a PostgREST-style data service exposing the `qr_codes` and
/// `videos` tables.
pub struct RestDirectory {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Debug, Serialize)]
struct ScanIncrementBody<'a> {
    scans: u64,
    last_scan: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    scan_history: Option<&'a [crate::records::ScanEvent]>,
}

impl RestDirectory {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DirectoryError::Request {
                details: e.to_string(),
            })?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    /// Build the client from configuration, reading the API key from the configured env var
    pub fn from_config(config: &DirectoryConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).ok();
        if api_key.is_none() {
            warn!(
                "{} is not set; directory requests will be anonymous",
                config.api_key_env
            );
        }
        Self::new(
            config.rest_url.clone(),
            api_key,
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub(crate) fn table_url(&self, table: &str, query: &str) -> String {
        if query.is_empty() {
            format!("{}/rest/v1/{}", self.base_url, table)
        } else {
            format!("{}/rest/v1/{}?{}", self.base_url, table, query)
        }
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request
                .header("apikey", key)
                .header("Authorization", format!("Bearer {}", key)),
            None => request,
        }
    }

    async fn fetch_rows<T: serde::de::DeserializeOwned>(&self, url: String) -> Result<Vec<T>> {
        debug!("GET {}", url);
        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(|e| DirectoryError::Request {
                details: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DirectoryError::Status {
                status: status.as_u16(),
                body,
            }
            .into());
        }

        let rows = response.json::<Vec<T>>().await.map_err(|e| DirectoryError::Request {
            details: format!("invalid response body: {}", e),
        })?;
        Ok(rows)
    }

    async fn patch_code<B: Serialize + Sync>(&self, code_id: &str, body: &B) -> Result<()> {
        let url = self.table_url(CODES_TABLE, &format!("id=eq.{}", code_id));
        debug!("PATCH {}", url);

        let response = self
            .authorize(self.client.patch(&url))
            .json(body)
            .send()
            .await
            .map_err(|e| PersistenceError::WriteFailed {
                code_id: code_id.to_string(),
                details: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PersistenceError::WriteFailed {
                code_id: code_id.to_string(),
                details: format!("status {}: {}", status.as_u16(), body),
            }
            .into());
        }
        Ok(())
    }
}

#[async_trait]
impl CodeDirectory for RestDirectory {
    async fn list_codes(&self) -> Result<Vec<CodeRecord>> {
        let url = self.table_url(CODES_TABLE, "select=*&order=date_created.desc");
        let rows: Vec<CodeRow> = self.fetch_rows(url).await?;
        Ok(map_rows(rows, "code"))
    }

    async fn list_videos(&self) -> Result<Vec<VideoRecord>> {
        let url = self.table_url(VIDEOS_TABLE, "select=*");
        let rows: Vec<VideoRow> = self.fetch_rows(url).await?;
        Ok(map_rows(rows, "video"))
    }

    async fn get_video_by_id(&self, id: &str) -> Result<Option<VideoRecord>> {
        let url = self.table_url(VIDEOS_TABLE, &format!("select=*&id=eq.{}", id));
        let rows: Vec<VideoRow> = self.fetch_rows(url).await?;
        Ok(map_rows::<VideoRow, VideoRecord>(rows, "video").into_iter().next())
    }
}

#[async_trait]
impl ScanSink for RestDirectory {
    async fn persist_scan_increment(&self, increment: &ScanIncrement) -> Result<()> {
        let body = ScanIncrementBody {
            scans: increment.scan_count,
            last_scan: increment.scanned_at.to_rfc3339(),
            scan_history: increment.scan_history.as_deref(),
        };
        self.patch_code(&increment.code_id, &body).await
    }

    async fn persist_code_update(&self, code_id: &str, update: &CodeUpdate) -> Result<()> {
        if update.is_empty() {
            return Ok(());
        }
        self.patch_code(code_id, update).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::ScanEvent;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_table_urls() {
        let dir = RestDirectory::new("https://data.example.com/", None, Duration::from_secs(5)).unwrap();

        assert_eq!(
            dir.table_url(CODES_TABLE, "select=*"),
            "https://data.example.com/rest/v1/qr_codes?select=*"
        );
        assert_eq!(
            dir.table_url(VIDEOS_TABLE, ""),
            "https://data.example.com/rest/v1/videos"
        );
    }

    #[test]
    fn test_increment_body_omits_history_when_disabled() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let body = ScanIncrementBody {
            scans: 4,
            last_scan: at.to_rfc3339(),
            scan_history: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["scans"], 4);
        assert!(json.get("scan_history").is_none());

        let history = vec![ScanEvent {
            id: "scan_1_abcdefghi".to_string(),
            timestamp: at,
            device: Some("Desktop".to_string()),
            browser: None,
            os: None,
            location: None,
        }];
        let body = ScanIncrementBody {
            scans: 5,
            last_scan: at.to_rfc3339(),
            scan_history: Some(&history),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["scan_history"][0]["device"], "Desktop");
    }

    #[test]
    fn test_code_update_serializes_only_set_fields() {
        let json = serde_json::to_value(CodeUpdate::analytics(true)).unwrap();
        assert_eq!(json, serde_json::json!({"analytics_enabled": true}));
    }
}
