use super::interface::{CameraBackend, CodeDecoder};
use super::session::CaptureSessionManager;
use crate::config::{ScannerConfig, MAX_SCANNER_FPS};
use crate::error::{ArScanError, Result};
use crate::events::EventBus;
use std::sync::Arc;

/// Builder for a capture session
pub struct CaptureSessionBuilder {
    backend: Option<Arc<dyn CameraBackend>>,
    decoder: Option<Arc<dyn CodeDecoder>>,
    config: Option<ScannerConfig>,
    event_bus: Option<Arc<EventBus>>,
}

impl CaptureSessionBuilder {
    pub fn new() -> Self {
        Self {
            backend: None,
            decoder: None,
            config: None,
            event_bus: None,
        }
    }

    pub fn backend(mut self, backend: Arc<dyn CameraBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn decoder(mut self, decoder: Arc<dyn CodeDecoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    pub fn config(mut self, config: ScannerConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn build(self) -> Result<CaptureSessionManager> {
        let backend = self
            .backend
            .ok_or_else(|| ArScanError::system("Camera backend must be specified"))?;
        let decoder = self
            .decoder
            .ok_or_else(|| ArScanError::system("Code decoder must be specified"))?;
        let config = self.config.unwrap_or_default();
        if !(1..=MAX_SCANNER_FPS).contains(&config.fps) {
            return Err(ArScanError::system(format!(
                "Scanner fps must be between 1 and {}",
                MAX_SCANNER_FPS
            )));
        }
        let event_bus = self.event_bus.unwrap_or_else(|| Arc::new(EventBus::default()));

        Ok(CaptureSessionManager::new(backend, decoder, config, event_bus))
    }
}

impl Default for CaptureSessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}
