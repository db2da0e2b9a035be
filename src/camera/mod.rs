mod builder;
mod decode_loop;
mod health;
mod interface;
mod mock;
mod session;
#[cfg(test)]
mod tests;

pub use builder::CaptureSessionBuilder;
pub use decode_loop::{DecodeLoop, DecodeLoopHandle, LoopSettings};
pub use health::{CaptureStatus, DecodeLoopStats};
pub use interface::{
    CameraBackend, CameraDevice, CodeDecoder, DecodeCallback, DecodeError, FrameSource,
    StreamConstraints,
};
pub use mock::{CameraCall, MockCameraBackend, MockDecoder, NO_CODE_MESSAGE};
pub use session::{CaptureSessionManager, CaptureState};
