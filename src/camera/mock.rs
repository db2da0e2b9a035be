use super::interface::{
    CameraBackend, CameraDevice, CodeDecoder, DecodeError, FrameSource, StreamConstraints,
};
use crate::error::{CameraError, Result};
use crate::frame::{CameraFrame, FrameFormat, ScanRegion};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::trace;

/// Message a decoder produces for frames without a code
pub const NO_CODE_MESSAGE: &str =
    "QR code parse error, error = No MultiFormat Readers were able to detect the code.";

/// Calls observed by [`MockCameraBackend`], in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraCall {
    Enumerate,
    Open(String),
    Release(String),
}

#[derive(Default)]
struct StreamTracker {
    log: Mutex<Vec<CameraCall>>,
    active: AtomicUsize,
    max_concurrent: AtomicUsize,
    fail_release: AtomicBool,
    truncate_frames: AtomicBool,
    /// Number of upcoming releases that hang before completing
    stalled_releases: AtomicUsize,
}

impl StreamTracker {
    fn opened(&self, device: &str) {
        self.log.lock().push(CameraCall::Open(device.to_string()));
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent.fetch_max(now, Ordering::SeqCst);
    }

    fn released(&self, device: &str) {
        self.log.lock().push(CameraCall::Release(device.to_string()));
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Scriptable camera platform that records every call
pub struct MockCameraBackend {
    supported: bool,
    permission_granted: AtomicBool,
    fail_open: AtomicBool,
    devices: Vec<CameraDevice>,
    resolution: (u32, u32),
    tracker: Arc<StreamTracker>,
}

impl MockCameraBackend {
    pub fn new(devices: Vec<CameraDevice>) -> Self {
        Self {
            supported: true,
            permission_granted: AtomicBool::new(true),
            fail_open: AtomicBool::new(false),
            devices,
            resolution: (160, 120),
            tracker: Arc::new(StreamTracker::default()),
        }
    }

    /// Front and back cameras
    pub fn with_two_cameras() -> Self {
        Self::new(vec![
            CameraDevice::new("cam-front", "Front Camera"),
            CameraDevice::new("cam-back", "Back Camera"),
        ])
    }

    /// A platform without any camera capability
    pub fn unsupported() -> Self {
        Self {
            supported: false,
            ..Self::new(Vec::new())
        }
    }

    pub fn set_permission(&self, granted: bool) {
        self.permission_granted.store(granted, Ordering::SeqCst);
    }

    pub fn set_fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }

    /// Make every stream release fail while set; the stream stays open
    pub fn set_fail_release(&self, fail: bool) {
        self.tracker.fail_release.store(fail, Ordering::SeqCst);
    }

    /// Deliver frames with half their pixel data missing while set
    pub fn set_truncate_frames(&self, truncate: bool) {
        self.tracker.truncate_frames.store(truncate, Ordering::SeqCst);
    }

    /// Make the next `count` releases hang for a long time before completing
    pub fn stall_releases(&self, count: usize) {
        self.tracker.stalled_releases.store(count, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<CameraCall> {
        self.tracker.log.lock().clone()
    }

    /// Streams currently open
    pub fn active_streams(&self) -> usize {
        self.tracker.active.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously open streams ever observed
    pub fn max_concurrent_streams(&self) -> usize {
        self.tracker.max_concurrent.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CameraBackend for MockCameraBackend {
    fn is_supported(&self) -> bool {
        self.supported
    }

    async fn enumerate_devices(&self) -> Result<Vec<CameraDevice>> {
        self.tracker.log.lock().push(CameraCall::Enumerate);
        if !self.permission_granted.load(Ordering::SeqCst) {
            return Err(CameraError::PermissionDenied.into());
        }
        Ok(self.devices.clone())
    }

    async fn open_stream(
        &self,
        device: &CameraDevice,
        constraints: &StreamConstraints,
    ) -> Result<Box<dyn FrameSource>> {
        if !self.permission_granted.load(Ordering::SeqCst) {
            return Err(CameraError::PermissionDenied.into());
        }
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(CameraError::StreamStart {
                device: device.id.clone(),
                details: "device busy".to_string(),
            }
            .into());
        }

        trace!("Mock stream on {} at {} fps", device.id, constraints.fps);
        self.tracker.opened(&device.id);
        Ok(Box::new(MockFrameSource {
            device_id: device.id.clone(),
            resolution: self.resolution,
            next_id: 0,
            released: false,
            tracker: Arc::clone(&self.tracker),
        }))
    }
}

struct MockFrameSource {
    device_id: String,
    resolution: (u32, u32),
    next_id: u64,
    released: bool,
    tracker: Arc<StreamTracker>,
}

#[async_trait]
impl FrameSource for MockFrameSource {
    async fn next_frame(&mut self) -> Result<Option<CameraFrame>> {
        if self.released {
            return Err(CameraError::CaptureStream {
                details: "stream already released".to_string(),
            }
            .into());
        }

        let id = self.next_id;
        self.next_id += 1;
        let (width, height) = self.resolution;
        let mut len = (width * height) as usize;
        if self.tracker.truncate_frames.load(Ordering::SeqCst) {
            len /= 2;
        }
        let data = vec![(id % 256) as u8; len];
        Ok(Some(CameraFrame::new(
            id,
            SystemTime::now(),
            data,
            width,
            height,
            FrameFormat::Luma8,
        )))
    }

    async fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }

        let stalled = self
            .tracker
            .stalled_releases
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if stalled {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }

        if self.tracker.fail_release.load(Ordering::SeqCst) {
            return Err(CameraError::StreamStop {
                details: format!("{} did not stop", self.device_id),
            }
            .into());
        }

        self.released = true;
        self.tracker.released(&self.device_id);
        Ok(())
    }
}

/// Decoder that replays a script, then reports "no code" forever
#[derive(Default)]
pub struct MockDecoder {
    script: Mutex<VecDeque<std::result::Result<String, DecodeError>>>,
    calls: AtomicU64,
    panic_next: AtomicBool,
}

impl MockDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decoder that finds `payload` after `noise_frames` empty frames
    pub fn finds_after(noise_frames: usize, payload: &str) -> Self {
        let decoder = Self::new();
        for _ in 0..noise_frames {
            decoder.push_noise();
        }
        decoder.push_payload(payload);
        decoder
    }

    pub fn push_payload(&self, payload: &str) {
        self.script.lock().push_back(Ok(payload.to_string()));
    }

    pub fn push_noise(&self) {
        self.script
            .lock()
            .push_back(Err(DecodeError::new(NO_CODE_MESSAGE)));
    }

    pub fn push_error(&self, message: &str) {
        self.script.lock().push_back(Err(DecodeError::new(message)));
    }

    /// Panic inside the next decode call, as a faulty native decoder would
    pub fn panic_next(&self) {
        self.panic_next.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }
}

impl CodeDecoder for MockDecoder {
    fn decode(
        &self,
        frame: &CameraFrame,
        region: &ScanRegion,
    ) -> std::result::Result<String, DecodeError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if self.panic_next.swap(false, Ordering::SeqCst) {
            panic!("mock decoder crashed on frame {}", frame.id);
        }
        trace!(
            "Mock decode of frame {} in {}x{} region",
            frame.id,
            region.width,
            region.height
        );
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(DecodeError::new(NO_CODE_MESSAGE)))
    }
}
