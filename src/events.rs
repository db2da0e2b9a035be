use crate::error::EventBusError;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use tokio::sync::broadcast;
use tracing::{debug, error, info, trace, warn};

/// Events that can occur while scanning codes and presenting AR playback
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ArScanEvent {
    /// The capture session moved to a new state
    CaptureStateChanged {
        state: String,
        timestamp: SystemTime,
    },
    /// The decode loop recognized a payload
    CodeDecoded {
        payload: String,
        timestamp: SystemTime,
    },
    /// The decoder reported a genuine failure (never per-frame noise)
    DecodeFailed { message: String },
    /// A decoded payload was matched to a code
    ScanResolved {
        code_id: String,
        tier: String,
        timestamp: SystemTime,
    },
    /// A decoded payload matched no known code
    ScanNotRecognized { payload: String },
    /// A code matched but its video data is unusable
    RecordIncomplete { code_id: String, reason: String },
    /// A scan was persisted
    ScanRecorded { code_id: String, scan_count: u64 },
    /// Persisting a scan failed
    PersistenceFailed { code_id: String, error: String },
    /// The AR session moved to a new state
    ArStateChanged {
        state: String,
        timestamp: SystemTime,
    },
    /// AR resource loading progress (0-100)
    ArLoadingProgress { percent: u8 },
    /// The video plane was anchored to a surface
    VideoPlaced { position: [f32; 3] },
    /// The video texture changed playback state
    PlaybackStateChanged { state: String },
    /// A system error occurred in a component
    SystemError { component: String, error: String },
}

impl ArScanEvent {
    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            ArScanEvent::CaptureStateChanged { state, .. } => {
                format!("Capture session is now {}", state)
            }
            ArScanEvent::CodeDecoded { payload, .. } => format!("Decoded payload: {}", payload),
            ArScanEvent::DecodeFailed { message } => format!("Decode failed: {}", message),
            ArScanEvent::ScanResolved { code_id, tier, .. } => {
                format!("Resolved code {} via {}", code_id, tier)
            }
            ArScanEvent::ScanNotRecognized { payload } => {
                format!("Payload not recognized: {}", payload)
            }
            ArScanEvent::RecordIncomplete { code_id, reason } => {
                format!("Code {} is incomplete: {}", code_id, reason)
            }
            ArScanEvent::ScanRecorded {
                code_id,
                scan_count,
            } => format!("Code {} scanned {} times", code_id, scan_count),
            ArScanEvent::PersistenceFailed { code_id, error } => {
                format!("Failed to persist scan of {}: {}", code_id, error)
            }
            ArScanEvent::ArStateChanged { state, .. } => format!("AR session is now {}", state),
            ArScanEvent::ArLoadingProgress { percent } => format!("AR loading {}%", percent),
            ArScanEvent::VideoPlaced { position } => format!(
                "Video placed at ({:.2}, {:.2}, {:.2})",
                position[0], position[1], position[2]
            ),
            ArScanEvent::PlaybackStateChanged { state } => format!("Playback is now {}", state),
            ArScanEvent::SystemError { component, error } => {
                format!("Error in {}: {}", component, error)
            }
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            ArScanEvent::CaptureStateChanged { .. } => "capture_state_changed",
            ArScanEvent::CodeDecoded { .. } => "code_decoded",
            ArScanEvent::DecodeFailed { .. } => "decode_failed",
            ArScanEvent::ScanResolved { .. } => "scan_resolved",
            ArScanEvent::ScanNotRecognized { .. } => "scan_not_recognized",
            ArScanEvent::RecordIncomplete { .. } => "record_incomplete",
            ArScanEvent::ScanRecorded { .. } => "scan_recorded",
            ArScanEvent::PersistenceFailed { .. } => "persistence_failed",
            ArScanEvent::ArStateChanged { .. } => "ar_state_changed",
            ArScanEvent::ArLoadingProgress { .. } => "ar_loading_progress",
            ArScanEvent::VideoPlaced { .. } => "video_placed",
            ArScanEvent::PlaybackStateChanged { .. } => "playback_state_changed",
            ArScanEvent::SystemError { .. } => "system_error",
        }
    }
}

/// Broadcast bus shared by every component
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ArScanEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ArScanEvent> {
        self.sender.subscribe()
    }

    /// Publish an event, returning how many subscribers received it
    pub async fn publish(&self, event: ArScanEvent) -> Result<usize, EventBusError> {
        match &event {
            ArScanEvent::ScanResolved { code_id, tier, .. } => {
                info!("Resolved code {} via {}", code_id, tier);
            }
            ArScanEvent::PersistenceFailed { code_id, error } => {
                warn!("Failed to persist scan of {}: {}", code_id, error);
            }
            ArScanEvent::SystemError { component, error } => {
                error!("System error in {}: {}", component, error);
            }
            _ => debug!("Event {}: {}", event.event_type(), event.description()),
        }

        self.sender
            .send(event)
            .map_err(|e| EventBusError::PublishFailed {
                details: e.to_string(),
            })
    }

    /// Publish an event, ignoring the absence of subscribers
    pub async fn emit(&self, event: ArScanEvent) {
        if let Err(e) = self.publish(event).await {
            trace!("Event dropped: {}", e);
        }
    }

    pub fn has_subscribers(&self) -> bool {
        self.sender.receiver_count() > 0
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_event_bus_basic_operations() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.subscribe();

        let subscriber_count = event_bus
            .publish(ArScanEvent::ScanRecorded {
                code_id: "qr-1".to_string(),
                scan_count: 3,
            })
            .await
            .unwrap();
        assert_eq!(subscriber_count, 1);

        match receiver.recv().await.unwrap() {
            ArScanEvent::ScanRecorded { scan_count, .. } => assert_eq!(scan_count, 3),
            _ => panic!("Unexpected event type"),
        }
    }

    #[tokio::test]
    async fn test_emit_without_subscribers_is_silent() {
        let event_bus = EventBus::new(10);
        assert!(!event_bus.has_subscribers());

        event_bus
            .emit(ArScanEvent::ArLoadingProgress { percent: 10 })
            .await;
        assert!(event_bus
            .publish(ArScanEvent::ArLoadingProgress { percent: 20 })
            .await
            .is_err());
    }

    #[test]
    fn test_event_properties() {
        let event = ArScanEvent::VideoPlaced {
            position: [1.0, 0.0, -2.5],
        };

        assert_eq!(event.event_type(), "video_placed");
        assert!(event.description().contains("-2.50"));
    }
}
