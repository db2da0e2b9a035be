use super::diagnostics::ResolutionReport;
use super::routes::ar_route;
use super::types::{ArHandoff, IncompleteReason, ScanOutcome};
use crate::camera::{CaptureSessionManager, DecodeCallback};
use crate::directory::{CodeDirectory, DirectorySnapshot};
use crate::error::{ArScanError, Result};
use crate::events::{ArScanEvent, EventBus};
use crate::recorder::ScanRecorder;
use crate::records::{CodeRecord, VideoRecord};
use crate::resolver::IdentifierResolver;
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Drives a scan screen: capture, resolve, record, then hand off to AR
pub struct ScanCoordinator {
    directory: Arc<dyn CodeDirectory>,
    capture: Arc<CaptureSessionManager>,
    resolver: IdentifierResolver,
    recorder: ScanRecorder,
    snapshot: RwLock<DirectorySnapshot>,
    last_report: RwLock<Option<ResolutionReport>>,
    event_bus: Arc<EventBus>,
}

impl ScanCoordinator {
    pub fn new(
        directory: Arc<dyn CodeDirectory>,
        capture: Arc<CaptureSessionManager>,
        resolver: IdentifierResolver,
        recorder: ScanRecorder,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            directory,
            capture,
            resolver,
            recorder,
            snapshot: RwLock::new(DirectorySnapshot::default()),
            last_report: RwLock::new(None),
            event_bus,
        }
    }

    pub fn capture(&self) -> &Arc<CaptureSessionManager> {
        &self.capture
    }

    pub fn recorder(&self) -> &ScanRecorder {
        &self.recorder
    }

    pub fn snapshot(&self) -> DirectorySnapshot {
        self.snapshot.read().clone()
    }

    /// Reload codes and videos. Must run before each scan session.
    pub async fn refresh(&self) -> Result<usize> {
        let snapshot = DirectorySnapshot::fetch(self.directory.as_ref()).await?;
        let count = snapshot.codes.len();
        *self.snapshot.write() = snapshot;
        self.recorder.prefetch_location();
        Ok(count)
    }

    /// Start the camera, forwarding decoded payloads to the returned channel
    pub async fn begin_scanning(&self, device_id: &str) -> Result<mpsc::UnboundedReceiver<String>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let callback: DecodeCallback = Arc::new(move |payload| {
            if let Err(e) = tx.send(payload) {
                debug!("Decoded payload dropped, scan receiver is gone: {}", e.0);
            }
        });
        self.capture.start(device_id, callback).await?;
        Ok(rx)
    }

    /// Scan until a payload resolves to a playable code. Scanning resumes
    /// after unrecognized or incomplete codes. Returns `None` when cancelled.
    pub async fn run_until_match(
        &self,
        device_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<ArHandoff>> {
        self.refresh().await?;
        let mut decoded = self.begin_scanning(device_id).await?;

        loop {
            let payload = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Scan cancelled");
                    self.capture.stop().await?;
                    return Ok(None);
                }
                payload = decoded.recv() => match payload {
                    Some(payload) => payload,
                    None => return Err(ArScanError::system("Decode channel closed")),
                },
            };

            match self.handle_decoded(&payload).await {
                ScanOutcome::Matched(handoff) => return Ok(Some(handoff)),
                outcome => {
                    debug!("Resuming scan after {}", outcome.label());
                    self.capture.resume().await?;
                }
            }
        }
    }

    /// Resolve one decoded payload against the current snapshot and record the scan
    pub async fn handle_decoded(&self, decoded: &str) -> ScanOutcome {
        let snapshot = self.snapshot();
        let resolution = self.resolver.resolve_detailed(decoded, &snapshot.codes);

        let outcome = match &resolution {
            None => {
                info!("Payload '{}' not recognized", decoded);
                self.event_bus
                    .emit(ArScanEvent::ScanNotRecognized {
                        payload: decoded.to_string(),
                    })
                    .await;
                ScanOutcome::NotRecognized
            }
            Some(resolution) => {
                self.event_bus
                    .emit(ArScanEvent::ScanResolved {
                        code_id: resolution.code.id.clone(),
                        tier: resolution.tier.to_string(),
                        timestamp: SystemTime::now(),
                    })
                    .await;
                self.hand_off(resolution.code, &snapshot).await
            }
        };

        *self.last_report.write() = Some(ResolutionReport::new(
            decoded,
            &snapshot.codes,
            resolution.as_ref(),
            &outcome,
        ));
        outcome
    }

    async fn hand_off(&self, code: &CodeRecord, snapshot: &DirectorySnapshot) -> ScanOutcome {
        let video = match snapshot.video(&code.video_id) {
            Some(video) => Some(video.clone()),
            None => self.lookup_video(&code.video_id).await,
        };

        let Some(video) = video else {
            return self
                .incomplete(
                    code,
                    IncompleteReason::VideoMissing {
                        video_id: code.video_id.clone(),
                    },
                )
                .await;
        };

        let Some(video_url) = video.playable_url().map(str::to_string) else {
            return self
                .incomplete(
                    code,
                    IncompleteReason::NoPlayableUrl {
                        video_id: video.id.clone(),
                    },
                )
                .await;
        };

        // A failed counter write does not take the video away from the user
        let (scan_count, persistence_warning) = match self.recorder.record_scan(code).await {
            Ok(receipt) => {
                let count = receipt.scan_count();
                self.snapshot.write().replace_code(receipt.code);
                (count, None)
            }
            Err(e) => (code.scan_count, Some(e.to_string())),
        };

        ScanOutcome::Matched(ArHandoff {
            code_id: code.id.clone(),
            video_id: video.id,
            title: video.title,
            video_url,
            route: ar_route(&code.id),
            scan_count,
            persistence_warning,
        })
    }

    async fn lookup_video(&self, video_id: &str) -> Option<VideoRecord> {
        match self.directory.get_video_by_id(video_id).await {
            Ok(video) => video,
            Err(e) => {
                warn!("Failed to look up video {}: {}", video_id, e);
                None
            }
        }
    }

    async fn incomplete(&self, code: &CodeRecord, reason: IncompleteReason) -> ScanOutcome {
        warn!("Code {} is incomplete: {}", code.id, reason);
        self.event_bus
            .emit(ArScanEvent::RecordIncomplete {
                code_id: code.id.clone(),
                reason: reason.to_string(),
            })
            .await;
        ScanOutcome::RecordIncomplete {
            code_id: code.id.clone(),
            reason,
        }
    }

    /// The most recent resolution attempt
    pub fn last_report(&self) -> Option<ResolutionReport> {
        self.last_report.read().clone()
    }

    /// Write the last resolution attempt as JSON into `dir`
    pub async fn export_diagnostics(&self, dir: &Path) -> Result<Option<PathBuf>> {
        let Some(report) = self.last_report() else {
            debug!("No resolution attempt to export");
            return Ok(None);
        };
        report.export_to(dir).await.map(Some)
    }
}
