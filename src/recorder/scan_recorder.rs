use super::environment::ClientEnvironment;
use super::geo::LocationCache;
use crate::config::RecorderConfig;
use crate::directory::{CodeUpdate, ScanIncrement, ScanSink};
use crate::error::Result;
use crate::events::{ArScanEvent, EventBus};
use crate::records::{CodeRecord, ScanEvent};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of recording one resolved scan
#[derive(Debug, Clone)]
pub struct ScanReceipt {
    /// The code with its counters advanced, as persisted
    pub code: CodeRecord,
    /// The history entry appended, when analytics are enabled
    pub scan_event: Option<ScanEvent>,
}

impl ScanReceipt {
    pub fn scan_count(&self) -> u64 {
        self.code.scan_count
    }
}

/// Advances scan counters and appends analytics history for resolved scans
pub struct ScanRecorder {
    sink: Arc<dyn ScanSink>,
    environment: ClientEnvironment,
    location: Option<LocationCache>,
    config: RecorderConfig,
    event_bus: Arc<EventBus>,
}

impl ScanRecorder {
    pub fn new(
        sink: Arc<dyn ScanSink>,
        environment: ClientEnvironment,
        location: Option<LocationCache>,
        config: RecorderConfig,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            sink,
            environment,
            location,
            config,
            event_bus,
        }
    }

    /// Warm the location cache ahead of the first scan
    pub fn prefetch_location(&self) {
        if let Some(cache) = &self.location {
            cache.prefetch();
        }
    }

    /// Record a scan of `code`. The counter always advances; a history entry
    /// is added only when the code has analytics enabled.
    pub async fn record_scan(&self, code: &CodeRecord) -> Result<ScanReceipt> {
        self.record_scan_at(code, Utc::now()).await
    }

    pub(crate) async fn record_scan_at(
        &self,
        code: &CodeRecord,
        scanned_at: DateTime<Utc>,
    ) -> Result<ScanReceipt> {
        let mut updated = code.clone();
        updated.scan_count = code.scan_count.saturating_add(1);
        updated.last_scan_at = Some(scanned_at);

        let scan_event = if code.analytics_enabled {
            let event = self.build_event(scanned_at);
            updated.scan_history.push(event.clone());
            self.trim_history(&mut updated);
            Some(event)
        } else {
            None
        };

        let increment = ScanIncrement {
            code_id: updated.id.clone(),
            scan_count: updated.scan_count,
            scanned_at,
            scan_history: scan_event.as_ref().map(|_| updated.scan_history.clone()),
        };

        if let Err(e) = self.sink.persist_scan_increment(&increment).await {
            warn!("Scan of {} was not persisted: {}", code.id, e);
            self.event_bus
                .emit(ArScanEvent::PersistenceFailed {
                    code_id: code.id.clone(),
                    error: e.to_string(),
                })
                .await;
            return Err(e);
        }

        info!(
            "Recorded scan of {} (count {}, analytics {})",
            updated.id, updated.scan_count, updated.analytics_enabled
        );
        self.event_bus
            .emit(ArScanEvent::ScanRecorded {
                code_id: updated.id.clone(),
                scan_count: updated.scan_count,
            })
            .await;

        Ok(ScanReceipt {
            code: updated,
            scan_event,
        })
    }

    /// Turn analytics collection on or off for a code
    pub async fn set_analytics(&self, code_id: &str, enabled: bool) -> Result<()> {
        self.sink
            .persist_code_update(code_id, &CodeUpdate::analytics(enabled))
            .await?;
        info!("Analytics for {} set to {}", code_id, enabled);
        Ok(())
    }

    fn build_event(&self, scanned_at: DateTime<Utc>) -> ScanEvent {
        let location = self.location.as_ref().and_then(|cache| cache.current());
        if location.is_none() {
            debug!("Recording scan without location");
        }

        ScanEvent {
            id: ScanEvent::generate_id(scanned_at),
            timestamp: scanned_at,
            device: Some(self.environment.device_type().to_string()),
            browser: Some(self.environment.browser().to_string()),
            os: Some(self.environment.os().to_string()),
            location,
        }
    }

    fn trim_history(&self, code: &mut CodeRecord) {
        let limit = self.config.history_limit;
        let len = code.scan_history.len();
        if len > limit {
            code.scan_history.drain(..len - limit);
            debug!("Trimmed history of {} to {} entries", code.id, limit);
        }
    }
}
