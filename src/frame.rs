use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::SystemTime;

/// Pixel layout of a captured camera frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameFormat {
    /// 8-bit luminance only
    Luma8,
    /// Packed RGBA, as delivered by a canvas readback
    Rgba8,
}

impl FrameFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            FrameFormat::Luma8 => 1,
            FrameFormat::Rgba8 => 4,
        }
    }
}

/// A single frame pulled from an active camera stream
#[derive(Debug, Clone)]
pub struct CameraFrame {
    /// Sequence number within the stream
    pub id: u64,
    pub timestamp: SystemTime,
    pub data: Arc<Vec<u8>>,
    pub width: u32,
    pub height: u32,
    pub format: FrameFormat,
}

impl CameraFrame {
    pub fn new(
        id: u64,
        timestamp: SystemTime,
        data: Vec<u8>,
        width: u32,
        height: u32,
        format: FrameFormat,
    ) -> Self {
        Self {
            id,
            timestamp,
            data: Arc::new(data),
            width,
            height,
            format,
        }
    }

    /// Byte length a full `width` x `height` frame has in this format
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel()
    }

    /// False for truncated readbacks the decoder must not see
    pub fn has_complete_data(&self) -> bool {
        self.width > 0 && self.height > 0 && self.data.len() == self.expected_len()
    }
}

/// Fixed detection box handed to the decoder, centered in the frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl ScanRegion {
    /// Center a `(width, height)` box in a frame, clamping to the frame bounds
    pub fn centered(frame_width: u32, frame_height: u32, qrbox: (u32, u32)) -> Self {
        let width = qrbox.0.min(frame_width);
        let height = qrbox.1.min(frame_height);
        Self {
            x: (frame_width - width) / 2,
            y: (frame_height - height) / 2,
            width,
            height,
        }
    }

    pub fn for_frame(frame: &CameraFrame, qrbox: (u32, u32)) -> Self {
        Self::centered(frame.width, frame.height, qrbox)
    }
}
