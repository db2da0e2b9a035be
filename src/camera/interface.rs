use crate::config::ScannerConfig;
use crate::error::Result;
use crate::frame::{CameraFrame, ScanRegion};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A camera the platform exposes for capture
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraDevice {
    pub id: String,
    pub label: String,
}

impl CameraDevice {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }
}

/// Stream parameters requested when opening a camera
#[derive(Debug, Clone, PartialEq)]
pub struct StreamConstraints {
    pub fps: u32,
    pub qrbox: (u32, u32),
    pub aspect_ratio: f64,
    pub disable_flip: bool,
}

impl From<&ScannerConfig> for StreamConstraints {
    fn from(config: &ScannerConfig) -> Self {
        Self {
            fps: config.fps,
            qrbox: config.qrbox,
            aspect_ratio: config.aspect_ratio,
            disable_flip: config.disable_flip,
        }
    }
}

/// Platform camera access.
///
/// `enumerate_devices` includes the permission prompt: it fails with
/// `CameraError::PermissionDenied` when access is refused and returns an
/// empty list when no camera exists.
#[async_trait]
pub trait CameraBackend: Send + Sync {
    fn is_supported(&self) -> bool;

    async fn enumerate_devices(&self) -> Result<Vec<CameraDevice>>;

    async fn open_stream(
        &self,
        device: &CameraDevice,
        constraints: &StreamConstraints,
    ) -> Result<Box<dyn FrameSource>>;
}

/// An open camera stream. Holding one means the hardware is in use until
/// `release` succeeds.
#[async_trait]
pub trait FrameSource: Send {
    /// Next frame, or `None` when no new frame is ready yet
    async fn next_frame(&mut self) -> Result<Option<CameraFrame>>;

    /// Stop the hardware stream. Calling it again after success is a no-op.
    async fn release(&mut self) -> Result<()>;
}

/// Failure reported by a barcode decoder for one frame
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct DecodeError {
    pub message: String,
}

impl DecodeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Barcode decoder run against the detection region of each frame
pub trait CodeDecoder: Send + Sync {
    fn decode(&self, frame: &CameraFrame, region: &ScanRegion) -> std::result::Result<String, DecodeError>;
}

/// Receives each decoded payload
pub type DecodeCallback = Arc<dyn Fn(String) + Send + Sync>;
