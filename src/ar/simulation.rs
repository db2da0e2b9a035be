use crate::config::ArConfig;
use crate::error::Result;
use crate::events::{ArScanEvent, EventBus};
use crate::recorder::{ScanReceipt, ScanRecorder};
use crate::records::CodeRecord;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, info};

/// Pause between reaching 100% and showing the AR view
const DEFAULT_HANDOFF_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkthroughStage {
    Scan,
    Processing { progress: u8 },
    Ar,
}

impl fmt::Display for WalkthroughStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WalkthroughStage::Scan => write!(f, "scan"),
            WalkthroughStage::Processing { progress } => write!(f, "processing ({}%)", progress),
            WalkthroughStage::Ar => write!(f, "ar"),
        }
    }
}

/// Non-AR fallback: a timed scan, processing and AR preview walkthrough
pub struct SimulatedWalkthrough {
    stage: WalkthroughStage,
    tick: Duration,
    step: u8,
    handoff_delay: Duration,
    event_bus: Arc<EventBus>,
}

impl SimulatedWalkthrough {
    pub fn new(config: &ArConfig, event_bus: Arc<EventBus>) -> Self {
        Self {
            stage: WalkthroughStage::Scan,
            tick: Duration::from_millis(config.simulation_tick_ms.max(1)),
            step: config.simulation_step.max(1),
            handoff_delay: DEFAULT_HANDOFF_DELAY,
            event_bus,
        }
    }

    pub fn with_handoff_delay(mut self, delay: Duration) -> Self {
        self.handoff_delay = delay;
        self
    }

    pub fn stage(&self) -> WalkthroughStage {
        self.stage
    }

    /// Start processing; only valid from `Scan`
    pub fn begin(&mut self) -> bool {
        if self.stage != WalkthroughStage::Scan {
            return false;
        }
        self.stage = WalkthroughStage::Processing { progress: 0 };
        true
    }

    /// One processing tick. Returns true once progress reaches 100.
    pub fn advance(&mut self) -> bool {
        match self.stage {
            WalkthroughStage::Processing { progress } => {
                let progress = progress.saturating_add(self.step).min(100);
                self.stage = WalkthroughStage::Processing { progress };
                progress >= 100
            }
            WalkthroughStage::Ar => true,
            WalkthroughStage::Scan => false,
        }
    }

    /// Back to the scan stage, e.g. when the user leaves the AR preview
    pub fn reset(&mut self) {
        self.stage = WalkthroughStage::Scan;
    }

    /// Run the whole walkthrough and record the scan once the AR stage is shown
    pub async fn run(
        &mut self,
        recorder: &ScanRecorder,
        code: &CodeRecord,
    ) -> Result<ScanReceipt> {
        if !self.begin() {
            debug!("Walkthrough restarted from {}", self.stage);
            self.reset();
            self.begin();
        }
        info!("Simulating scan of {}", code.id);

        let mut ticker = interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let done = self.advance();
            if let WalkthroughStage::Processing { progress } = self.stage {
                self.event_bus
                    .emit(ArScanEvent::ArLoadingProgress { percent: progress })
                    .await;
            }
            if done {
                break;
            }
        }

        sleep(self.handoff_delay).await;
        self.stage = WalkthroughStage::Ar;
        info!("Simulated AR view shown for {}", code.id);

        recorder.record_scan(code).await
    }
}
