use thiserror::Error;

#[derive(Error, Debug)]
pub enum ArScanError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),

    #[error("AR error: {0}")]
    Ar(#[from] ArError),

    #[error("Playback error: {0}")]
    Playback(#[from] PlaybackError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Directory error: {0}")]
    Directory(#[from] DirectoryError),

    #[error("Event bus error: {0}")]
    EventBus(#[from] EventBusError),

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CameraError {
    #[error("Camera permission denied")]
    PermissionDenied,

    #[error("No camera device found")]
    NoDevice,

    #[error("Camera device not found: {device}")]
    DeviceNotFound { device: String },

    #[error("Camera capture unsupported: {reason}")]
    Unsupported { reason: String },

    #[error("Failed to start stream on {device}: {details}")]
    StreamStart { device: String, details: String },

    #[error("Failed to stop stream: {details}")]
    StreamStop { details: String },

    #[error("Capture stream error: {details}")]
    CaptureStream { details: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ArError {
    #[error("AR requires a secure context (HTTPS)")]
    InsecureContext,

    #[error("WebXR is not available in this environment")]
    XrUnavailable,

    #[error("This device does not support augmented reality")]
    NotSupported,

    #[error("AR capability check failed: {details}")]
    CapabilityCheck { details: String },

    #[error("Failed to start the AR session: {details}")]
    SessionRequest { details: String },

    #[error("Failed to load AR resources: {details}")]
    ResourceLoad { details: String },

    #[error("Hit test setup failed: {details}")]
    HitTest { details: String },

    #[error("Cannot {action} while in state {from}")]
    InvalidTransition { from: String, action: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlaybackError {
    #[error("Video decode error: {details}")]
    Decode { details: String },

    #[error("Video network error: {details}")]
    Network { details: String },

    #[error("No video source attached")]
    NoSource,

    #[error("Playback was rejected: {details}")]
    PlayRejected { details: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PersistenceError {
    #[error("Failed to persist scan for {code_id}: {details}")]
    WriteFailed { code_id: String, details: String },

    #[error("Code {code_id} does not exist in the directory")]
    CodeMissing { code_id: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DirectoryError {
    #[error("Directory request failed: {details}")]
    Request { details: String },

    #[error("Directory returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid record: {details}")]
    InvalidRecord { details: String },

    #[error("Snapshot error: {details}")]
    Snapshot { details: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EventBusError {
    #[error("Failed to publish event: {details}")]
    PublishFailed { details: String },
}

/// User-facing classification of failures. Per-frame "no code" decoder
/// output is filtered in the decode loop and never becomes an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    PermissionDenied,
    DeviceUnavailable,
    NotRecognized,
    RecordIncomplete,
    PersistenceFailure,
    PlaybackError,
    Internal,
}

impl ArScanError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Map the error onto the user-facing taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            ArScanError::Camera(CameraError::PermissionDenied) => ErrorKind::PermissionDenied,
            ArScanError::Camera(CameraError::NoDevice)
            | ArScanError::Camera(CameraError::DeviceNotFound { .. })
            | ArScanError::Camera(CameraError::Unsupported { .. }) => ErrorKind::DeviceUnavailable,
            ArScanError::Ar(ArError::InsecureContext)
            | ArScanError::Ar(ArError::XrUnavailable)
            | ArScanError::Ar(ArError::NotSupported)
            | ArScanError::Ar(ArError::CapabilityCheck { .. })
            | ArScanError::Ar(ArError::SessionRequest { .. })
            | ArScanError::Ar(ArError::ResourceLoad { .. })
            | ArScanError::Ar(ArError::HitTest { .. }) => ErrorKind::DeviceUnavailable,
            ArScanError::Persistence(_) => ErrorKind::PersistenceFailure,
            ArScanError::Playback(_) => ErrorKind::PlaybackError,
            _ => ErrorKind::Internal,
        }
    }

    /// Whether the user can recover from the error within the current flow
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::PermissionDenied
                | ErrorKind::NotRecognized
                | ErrorKind::RecordIncomplete
                | ErrorKind::PersistenceFailure
                | ErrorKind::PlaybackError
        )
    }

    /// Short human readable message suitable for display
    pub fn user_message(&self) -> String {
        match self {
            ArScanError::Camera(CameraError::PermissionDenied) => {
                "Camera access is required to scan codes. Please grant permission and try again."
                    .to_string()
            }
            ArScanError::Camera(CameraError::NoDevice) => {
                "No camera was found on this device.".to_string()
            }
            ArScanError::Camera(CameraError::StreamStart { .. }) => {
                "The scanner could not be started. Check camera permissions.".to_string()
            }
            ArScanError::Ar(e) => e.to_string(),
            ArScanError::Playback(_) => "The video could not be played. Tap to retry.".to_string(),
            ArScanError::Persistence(_) => "The scan could not be saved.".to_string(),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ArScanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_denied_is_distinct_from_no_device() {
        let denied: ArScanError = CameraError::PermissionDenied.into();
        let missing: ArScanError = CameraError::NoDevice.into();

        assert_eq!(denied.kind(), ErrorKind::PermissionDenied);
        assert_eq!(missing.kind(), ErrorKind::DeviceUnavailable);
        assert!(denied.is_recoverable());
        assert!(!missing.is_recoverable());
        assert_ne!(denied.user_message(), missing.user_message());
    }

    #[test]
    fn test_persistence_failure_is_recoverable() {
        let err: ArScanError = PersistenceError::WriteFailed {
            code_id: "qr-1".to_string(),
            details: "timeout".to_string(),
        }
        .into();

        assert_eq!(err.kind(), ErrorKind::PersistenceFailure);
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_ar_errors_have_distinct_messages() {
        let reasons = [
            ArError::InsecureContext.to_string(),
            ArError::NotSupported.to_string(),
            ArError::SessionRequest {
                details: "denied".to_string(),
            }
            .to_string(),
            ArError::ResourceLoad {
                details: "404".to_string(),
            }
            .to_string(),
        ];

        for (i, a) in reasons.iter().enumerate() {
            for b in reasons.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }
}
