pub mod app;
pub mod ar;
pub mod camera;
pub mod config;
pub mod directory;
pub mod error;
pub mod events;
pub mod frame;
pub mod playback;
pub mod recorder;
pub mod records;
pub mod resolver;

pub use app::{ArHandoff, ResolutionReport, ScanCoordinator, ScanOutcome};
pub use ar::{ArSessionMachine, ArState, SimulatedWalkthrough};
pub use camera::{CaptureSessionBuilder, CaptureSessionManager, CaptureState};
pub use config::ArScanConfig;
pub use directory::{CodeDirectory, DirectorySnapshot, InMemoryDirectory, RestDirectory, ScanSink};
pub use error::{ArScanError, ErrorKind, Result};
pub use events::{ArScanEvent, EventBus};
pub use frame::{CameraFrame, FrameFormat, ScanRegion};
pub use playback::{PlaybackState, VideoTextureBridge};
pub use recorder::{ScanReceipt, ScanRecorder};
pub use records::{CodeRecord, ScanEvent, VideoRecord};
pub use resolver::{IdentifierResolver, MatchTier, Resolution};
