use super::decode_loop::{DecodeLoop, DecodeLoopHandle, LoopSettings};
use super::health::{CaptureStatus, DecodeLoopStats};
use super::interface::{CameraBackend, CameraDevice, CodeDecoder, DecodeCallback, StreamConstraints};
use crate::config::ScannerConfig;
use crate::error::{ArScanError, CameraError, Result};
use crate::events::{ArScanEvent, EventBus};
use parking_lot::RwLock;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Lifecycle of a capture session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CaptureState {
    Uninitialized,
    PermissionRequested,
    /// Access was refused; `retry_permission` asks again
    PermissionDenied,
    DeviceList,
    Idle,
    Scanning,
    /// Shut down for good
    Stopped,
    /// The platform has no camera capability
    Unsupported,
}

impl fmt::Display for CaptureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CaptureState::Uninitialized => "uninitialized",
            CaptureState::PermissionRequested => "permission_requested",
            CaptureState::PermissionDenied => "permission_denied",
            CaptureState::DeviceList => "device_list",
            CaptureState::Idle => "idle",
            CaptureState::Scanning => "scanning",
            CaptureState::Stopped => "stopped",
            CaptureState::Unsupported => "unsupported",
        };
        f.write_str(name)
    }
}

struct ActiveScan {
    device: CameraDevice,
    handle: DecodeLoopHandle,
}

/// Owns the camera lifecycle and at most one decode loop.
///
/// Every start and stop goes through the `active` lock, so the previous
/// stream is always released before another one is opened.
pub struct CaptureSessionManager {
    backend: Arc<dyn CameraBackend>,
    decoder: Arc<dyn CodeDecoder>,
    config: ScannerConfig,
    event_bus: Arc<EventBus>,
    state: Arc<RwLock<CaptureState>>,
    devices: RwLock<Vec<CameraDevice>>,
    selected_device: RwLock<Option<String>>,
    callback: RwLock<Option<DecodeCallback>>,
    active: Mutex<Option<ActiveScan>>,
    stats: Arc<DecodeLoopStats>,
}

impl CaptureSessionManager {
    pub fn new(
        backend: Arc<dyn CameraBackend>,
        decoder: Arc<dyn CodeDecoder>,
        config: ScannerConfig,
        event_bus: Arc<EventBus>,
    ) -> Self {
        info!(
            "Initializing capture session ({} fps, qrbox {}x{})",
            config.fps, config.qrbox.0, config.qrbox.1
        );

        Self {
            backend,
            decoder,
            config,
            event_bus,
            state: Arc::new(RwLock::new(CaptureState::Uninitialized)),
            devices: RwLock::new(Vec::new()),
            selected_device: RwLock::new(None),
            callback: RwLock::new(None),
            active: Mutex::new(None),
            stats: Arc::new(DecodeLoopStats::new()),
        }
    }

    pub fn state(&self) -> CaptureState {
        *self.state.read()
    }

    pub fn devices(&self) -> Vec<CameraDevice> {
        self.devices.read().clone()
    }

    pub fn selected_device(&self) -> Option<String> {
        self.selected_device.read().clone()
    }

    pub fn stats(&self) -> &DecodeLoopStats {
        &self.stats
    }

    pub async fn status(&self) -> CaptureStatus {
        let scanning = self
            .active
            .lock()
            .await
            .as_ref()
            .map(|scan| !scan.handle.is_finished())
            .unwrap_or(false);

        CaptureStatus {
            state: self.state(),
            device_id: self.selected_device(),
            scanning,
            frames_scanned: self.stats.frames_scanned(),
            codes_decoded: self.stats.codes_decoded(),
            decode_failures: self.stats.decode_failures(),
        }
    }

    /// Request camera access and enumerate devices.
    ///
    /// Fails with `CameraError::PermissionDenied` when access is refused;
    /// returns an empty list when no camera exists.
    pub async fn list_devices(&self) -> Result<Vec<CameraDevice>> {
        self.ensure_not_stopped()?;

        if !self.backend.is_supported() {
            self.set_state(CaptureState::Unsupported).await;
            return Err(CameraError::Unsupported {
                reason: "camera capture is not available on this platform".to_string(),
            }
            .into());
        }

        self.set_state(CaptureState::PermissionRequested).await;

        match self.backend.enumerate_devices().await {
            Ok(devices) => {
                info!("Found {} camera device(s)", devices.len());
                for device in &devices {
                    debug!("Camera {}: {}", device.id, device.label);
                }
                *self.devices.write() = devices.clone();
                self.set_state(CaptureState::DeviceList).await;
                Ok(devices)
            }
            Err(ArScanError::Camera(CameraError::PermissionDenied)) => {
                warn!("Camera permission denied");
                self.set_state(CaptureState::PermissionDenied).await;
                Err(CameraError::PermissionDenied.into())
            }
            Err(e) => {
                error!("Failed to enumerate cameras: {}", e);
                self.set_state(CaptureState::Uninitialized).await;
                Err(e)
            }
        }
    }

    /// Ask for camera permission again after a denial
    pub async fn retry_permission(&self) -> Result<Vec<CameraDevice>> {
        info!("Retrying camera permission request");
        self.list_devices().await
    }

    /// Start scanning on `device_id`. A no-op when already scanning on that
    /// device; when scanning elsewhere the old stream is released first.
    pub async fn start(&self, device_id: &str, on_decode: DecodeCallback) -> Result<()> {
        let mut active = self.active.lock().await;
        self.start_locked(&mut active, device_id, on_decode).await
    }

    /// Stop scanning and release the camera. Always safe to call; a release
    /// failure comes back as `CameraError::StreamStop` with the session Idle.
    pub async fn stop(&self) -> Result<()> {
        let mut active = self.active.lock().await;
        self.stop_locked(&mut active).await
    }

    /// Switch to another camera, restarting the scan when one was running
    pub async fn change_device(&self, device_id: &str) -> Result<()> {
        let mut active = self.active.lock().await;
        let was_scanning = active
            .as_ref()
            .map(|scan| !scan.handle.is_finished())
            .unwrap_or(false);

        self.stop_before_restart(&mut active).await;
        *self.selected_device.write() = Some(device_id.to_string());
        info!("Selected camera {}", device_id);

        let callback = self.callback.read().clone();
        match callback {
            Some(callback) if was_scanning => {
                self.start_locked(&mut active, device_id, callback).await
            }
            _ => Ok(()),
        }
    }

    /// Start scanning again on the selected device with the last callback
    pub async fn resume(&self) -> Result<()> {
        let device_id = self.selected_device().ok_or_else(|| {
            ArScanError::component("capture", "no camera has been selected")
        })?;
        let callback = self.callback.read().clone().ok_or_else(|| {
            ArScanError::component("capture", "scanning was never started")
        })?;

        let mut active = self.active.lock().await;
        self.start_locked(&mut active, &device_id, callback).await
    }

    /// Release the camera and end the session
    pub async fn shutdown(&self) -> Result<()> {
        let mut active = self.active.lock().await;
        let stopped = self.stop_locked(&mut active).await;
        self.set_state(CaptureState::Stopped).await;
        info!("Capture session shut down");
        stopped
    }

    async fn start_locked(
        &self,
        active: &mut Option<ActiveScan>,
        device_id: &str,
        on_decode: DecodeCallback,
    ) -> Result<()> {
        self.ensure_not_stopped()?;
        if self.state() == CaptureState::Unsupported {
            return Err(CameraError::Unsupported {
                reason: "camera capture is not available on this platform".to_string(),
            }
            .into());
        }

        if let Some(scan) = active.as_ref() {
            // A loop that just decoded has already flipped the state to Idle
            let running = !scan.handle.is_finished() && self.state() == CaptureState::Scanning;
            if scan.device.id == device_id && running {
                debug!("Already scanning on {}", device_id);
                return Ok(());
            }
        }

        // Stop fully before opening another stream
        self.stop_before_restart(active).await;

        let needs_listing = self.devices.read().is_empty();
        if needs_listing {
            self.list_devices().await?;
        }

        let device = self
            .devices
            .read()
            .iter()
            .find(|d| d.id == device_id)
            .cloned()
            .ok_or_else(|| CameraError::DeviceNotFound {
                device: device_id.to_string(),
            })?;

        *self.selected_device.write() = Some(device.id.clone());
        *self.callback.write() = Some(on_decode.clone());

        let constraints = StreamConstraints::from(&self.config);
        let source = match self.backend.open_stream(&device, &constraints).await {
            Ok(source) => source,
            Err(e) => {
                error!("Failed to start scanner on {}: {}", device.id, e);
                let next = match e {
                    ArScanError::Camera(CameraError::PermissionDenied) => {
                        CaptureState::PermissionDenied
                    }
                    _ => CaptureState::Idle,
                };
                self.set_state(next).await;
                self.event_bus
                    .emit(ArScanEvent::SystemError {
                        component: "capture".to_string(),
                        error: e.to_string(),
                    })
                    .await;
                return Err(match e {
                    ArScanError::Camera(CameraError::PermissionDenied) => e,
                    other => CameraError::StreamStart {
                        device: device.id.clone(),
                        details: other.to_string(),
                    }
                    .into(),
                });
            }
        };

        // Scanning must be visible before the loop can flip it back to Idle
        self.set_state(CaptureState::Scanning).await;

        let decode_loop = DecodeLoop::new(
            device.id.clone(),
            source,
            Arc::clone(&self.decoder),
            LoopSettings {
                fps: self.config.fps,
                qrbox: self.config.qrbox,
                noise_patterns: self.config.noise_patterns.clone(),
            },
            on_decode,
            Arc::clone(&self.state),
            Arc::clone(&self.stats),
            Arc::clone(&self.event_bus),
        );

        info!("Scanning on {} ({})", device.id, device.label);
        *active = Some(ActiveScan {
            device,
            handle: decode_loop.spawn(),
        });
        Ok(())
    }

    /// Stop the loop and release its stream. A failed release is reported
    /// once and the session still returns to Idle.
    async fn stop_locked(&self, active: &mut Option<ActiveScan>) -> Result<()> {
        let Some(scan) = active.take() else {
            debug!("Capture session is not scanning");
            return Ok(());
        };

        info!("Stopping scan on {}", scan.device.id);
        let released = scan
            .handle
            .stop(Duration::from_millis(self.config.stop_timeout_ms))
            .await;

        let was_scanning = {
            let mut state = self.state.write();
            let was_scanning = *state == CaptureState::Scanning;
            if was_scanning {
                *state = CaptureState::Idle;
            }
            was_scanning
        };
        if was_scanning {
            self.publish_state(CaptureState::Idle).await;
        }

        if let Err(e) = released {
            error!("Failed to stop scanner on {}: {}", scan.device.id, e);
            self.event_bus
                .emit(ArScanEvent::SystemError {
                    component: "capture".to_string(),
                    error: e.to_string(),
                })
                .await;
            return Err(match e {
                ArScanError::Camera(CameraError::StreamStop { .. }) => e,
                other => CameraError::StreamStop {
                    details: other.to_string(),
                }
                .into(),
            });
        }
        Ok(())
    }

    /// Stop before switching or restarting; a failure was already reported
    async fn stop_before_restart(&self, active: &mut Option<ActiveScan>) {
        if let Err(e) = self.stop_locked(active).await {
            debug!("Continuing after failed stop: {}", e);
        }
    }

    fn ensure_not_stopped(&self) -> Result<()> {
        if self.state() == CaptureState::Stopped {
            return Err(ArScanError::component(
                "capture",
                "capture session has been shut down",
            ));
        }
        Ok(())
    }

    async fn set_state(&self, next: CaptureState) {
        let previous = std::mem::replace(&mut *self.state.write(), next);
        if previous != next {
            debug!("Capture state {} -> {}", previous, next);
            self.publish_state(next).await;
        }
    }

    async fn publish_state(&self, state: CaptureState) {
        self.event_bus
            .emit(ArScanEvent::CaptureStateChanged {
                state: state.to_string(),
                timestamp: SystemTime::now(),
            })
            .await;
    }
}
