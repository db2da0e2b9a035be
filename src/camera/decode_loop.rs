use super::health::DecodeLoopStats;
use super::interface::{CodeDecoder, DecodeCallback, FrameSource};
use super::session::CaptureState;
use crate::error::{ArScanError, CameraError, Result};
use crate::events::{ArScanEvent, EventBus};
use crate::frame::ScanRegion;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

const MIN_FRAME_INTERVAL: Duration = Duration::from_millis(1);

/// Open stream shared by a running loop and its handle. `None` once released.
type SharedSource = Arc<Mutex<Option<Box<dyn FrameSource>>>>;

/// Tunables the loop needs from the scanner configuration
#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub fps: u32,
    pub qrbox: (u32, u32),
    pub noise_patterns: Vec<String>,
}

impl LoopSettings {
    fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.fps.max(1))).max(MIN_FRAME_INTERVAL)
    }

    /// Whether a decoder message only means "no code in this frame"
    pub fn is_noise(&self, message: &str) -> bool {
        self.noise_patterns
            .iter()
            .any(|pattern| message.contains(pattern.as_str()))
    }
}

enum LoopExit {
    Cancelled,
    Decoded(String),
    StreamFailed(ArScanError),
}

/// One run of the scan loop over an open camera stream.
///
/// The loop releases the stream when it exits. If it never gets there
/// (panic, abort) the handle releases it on `stop`. After the first
/// successful decode the loop stops itself and only then hands the payload
/// to the callback.
pub struct DecodeLoop {
    device_id: String,
    source: SharedSource,
    decoder: Arc<dyn CodeDecoder>,
    settings: LoopSettings,
    callback: DecodeCallback,
    state: Arc<RwLock<CaptureState>>,
    stats: Arc<DecodeLoopStats>,
    event_bus: Arc<EventBus>,
    cancel: CancellationToken,
}

/// Handle to a running decode loop
pub struct DecodeLoopHandle {
    device_id: String,
    cancel: CancellationToken,
    source: SharedSource,
    task: JoinHandle<Result<()>>,
}

impl DecodeLoop {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        device_id: String,
        source: Box<dyn FrameSource>,
        decoder: Arc<dyn CodeDecoder>,
        settings: LoopSettings,
        callback: DecodeCallback,
        state: Arc<RwLock<CaptureState>>,
        stats: Arc<DecodeLoopStats>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            device_id,
            source: Arc::new(Mutex::new(Some(source))),
            decoder,
            settings,
            callback,
            state,
            stats,
            event_bus,
            cancel: CancellationToken::new(),
        }
    }

    pub fn spawn(self) -> DecodeLoopHandle {
        let cancel = self.cancel.clone();
        let source = Arc::clone(&self.source);
        let device_id = self.device_id.clone();
        self.stats.record_loop_start();
        let task = tokio::spawn(self.run());
        DecodeLoopHandle {
            device_id,
            cancel,
            source,
            task,
        }
    }

    /// Resolves to the outcome of releasing the stream
    async fn run(self) -> Result<()> {
        info!(
            "Decode loop started on {} at {} fps",
            self.device_id, self.settings.fps
        );

        let exit = {
            let mut slot = self.source.lock().await;
            match &mut *slot {
                Some(source) => self.scan(source).await,
                None => LoopExit::Cancelled,
            }
        };

        let released = release_source(&self.source, &self.device_id).await;

        match exit {
            LoopExit::Cancelled => {
                info!("Decode loop on {} cancelled", self.device_id);
            }
            LoopExit::Decoded(payload) => {
                self.stats.record_decode();
                self.set_idle().await;
                info!("Decoded payload on {}; scanning paused", self.device_id);
                self.event_bus
                    .emit(ArScanEvent::CodeDecoded {
                        payload: payload.clone(),
                        timestamp: SystemTime::now(),
                    })
                    .await;
                (self.callback)(payload);
            }
            LoopExit::StreamFailed(e) => {
                error!("Camera stream on {} failed: {}", self.device_id, e);
                self.set_idle().await;
                self.event_bus
                    .emit(ArScanEvent::SystemError {
                        component: "capture".to_string(),
                        error: e.to_string(),
                    })
                    .await;
            }
        }

        released
    }

    async fn scan(&self, source: &mut Box<dyn FrameSource>) -> LoopExit {
        let mut ticker = tokio::time::interval(self.settings.frame_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_failure: Option<String> = None;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return LoopExit::Cancelled,
                _ = ticker.tick() => {}
            }

            let frame = tokio::select! {
                _ = self.cancel.cancelled() => return LoopExit::Cancelled,
                frame = source.next_frame() => frame,
            };

            let frame = match frame {
                Ok(Some(frame)) => frame,
                Ok(None) => continue,
                Err(e) => return LoopExit::StreamFailed(e),
            };

            self.stats.record_frame();

            if !frame.has_complete_data() {
                let message = format!(
                    "incomplete {}x{} {:?} frame ({} bytes)",
                    frame.width,
                    frame.height,
                    frame.format,
                    frame.data.len()
                );
                self.report_failure(frame.id, message, &mut last_failure).await;
                continue;
            }

            let region = ScanRegion::for_frame(&frame, self.settings.qrbox);

            match self.decoder.decode(&frame, &region) {
                Ok(payload) => return LoopExit::Decoded(payload),
                Err(e) if self.settings.is_noise(&e.message) => {
                    trace!("No code in frame {}", frame.id);
                }
                Err(e) => {
                    self.report_failure(frame.id, e.message, &mut last_failure).await;
                }
            }
        }
    }

    /// Count every failure, publish only the first of a run of identical ones
    async fn report_failure(&self, frame_id: u64, message: String, last_failure: &mut Option<String>) {
        self.stats.record_failure();
        if last_failure.as_deref() == Some(message.as_str()) {
            return;
        }

        warn!("Decoder error on frame {}: {}", frame_id, message);
        self.event_bus
            .emit(ArScanEvent::DecodeFailed {
                message: message.clone(),
            })
            .await;
        *last_failure = Some(message);
    }

    async fn set_idle(&self) {
        let changed = {
            let mut state = self.state.write();
            if *state == CaptureState::Scanning {
                *state = CaptureState::Idle;
                true
            } else {
                false
            }
        };
        if changed {
            self.event_bus
                .emit(ArScanEvent::CaptureStateChanged {
                    state: CaptureState::Idle.to_string(),
                    timestamp: SystemTime::now(),
                })
                .await;
        }
    }
}

/// Release the stream if it is still open
async fn release_source(source: &Mutex<Option<Box<dyn FrameSource>>>, device_id: &str) -> Result<()> {
    let mut slot = source.lock().await;
    let Some(stream) = &mut *slot else {
        return Ok(());
    };

    stream.release().await?;
    *slot = None;
    debug!("Released camera stream on {}", device_id);
    Ok(())
}

impl DecodeLoopHandle {
    /// Whether the loop has exited on its own or was stopped
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancel the loop and wait until the camera is released.
    ///
    /// When the loop panicked or does not finish within `timeout` it is
    /// aborted and the stream is released here instead.
    pub async fn stop(mut self, timeout: Duration) -> Result<()> {
        self.cancel.cancel();

        match tokio::time::timeout(timeout, &mut self.task).await {
            Ok(Ok(released)) => {
                debug!("Decode loop task completed");
                return released;
            }
            Ok(Err(e)) => {
                error!("Decode loop on {} ended abnormally: {}", self.device_id, e);
            }
            Err(_) => {
                warn!("Decode loop did not stop within {:?}; aborting", timeout);
                self.task.abort();
                if tokio::time::timeout(timeout, &mut self.task).await.is_err() {
                    warn!("Aborted decode loop on {} has not exited", self.device_id);
                }
            }
        }

        match tokio::time::timeout(timeout, release_source(&self.source, &self.device_id)).await {
            Ok(released) => released,
            Err(_) => Err(CameraError::StreamStop {
                details: format!("releasing {} timed out after {:?}", self.device_id, timeout),
            }
            .into()),
        }
    }
}
