use super::placement::VideoPlane;
use super::runtime::{SceneRenderer, XrPlatform, XrSession};
use super::types::{ArState, FrameOutcome, HitTestSourceId, XrFrame};
use crate::app::routes;
use crate::config::ArConfig;
use crate::error::{ArError, ArScanError, Result};
use crate::events::{ArScanEvent, EventBus};
use crate::playback::VideoTextureBridge;
use crate::records::VideoRecord;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, error, info, warn};

/// Resources that only live while an immersive session is open
struct ActiveSession {
    session: Box<dyn XrSession>,
    hit_test_source: Option<HitTestSourceId>,
}

/// Drives one AR visit: capability check, loading, the immersive session
/// with surface placement, and teardown.
pub struct ArSessionMachine {
    code_id: String,
    platform: Arc<dyn XrPlatform>,
    renderer: Box<dyn SceneRenderer>,
    bridge: VideoTextureBridge,
    plane: VideoPlane,
    config: ArConfig,
    event_bus: Arc<EventBus>,
    state: ArState,
    progress: u8,
    session: Option<ActiveSession>,
}

impl ArSessionMachine {
    pub fn new(
        code_id: impl Into<String>,
        platform: Arc<dyn XrPlatform>,
        renderer: Box<dyn SceneRenderer>,
        bridge: VideoTextureBridge,
        config: ArConfig,
        event_bus: Arc<EventBus>,
    ) -> Self {
        let plane = VideoPlane::from_config(&config);
        Self {
            code_id: code_id.into(),
            platform,
            renderer,
            bridge,
            plane,
            config,
            event_bus,
            state: ArState::CheckingSupport,
            progress: 0,
            session: None,
        }
    }

    pub fn state(&self) -> &ArState {
        &self.state
    }

    pub fn code_id(&self) -> &str {
        &self.code_id
    }

    /// Loading progress, 0-100
    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn plane(&self) -> &VideoPlane {
        &self.plane
    }

    pub fn bridge(&self) -> &VideoTextureBridge {
        &self.bridge
    }

    pub fn bridge_mut(&mut self) -> &mut VideoTextureBridge {
        &mut self.bridge
    }

    /// Why AR is unavailable, when it is
    pub fn unsupported_reason(&self) -> Option<&ArError> {
        match &self.state {
            ArState::Unsupported(reason) => Some(reason),
            _ => None,
        }
    }

    /// Route of the simulated walkthrough, offered once AR is unavailable
    pub fn fallback_route(&self) -> Option<String> {
        self.unsupported_reason()
            .map(|_| routes::simulate_route(&self.code_id))
    }

    /// Verify secure context and immersive AR support
    pub async fn check_support(&mut self) -> Result<&ArState> {
        self.expect_state(ArState::CheckingSupport, "check support")?;

        let verdict = if !self.platform.is_secure_context() {
            Err(ArError::InsecureContext)
        } else if !self.platform.has_xr() {
            Err(ArError::XrUnavailable)
        } else {
            match self
                .platform
                .is_session_supported(&self.config.session_mode)
                .await
            {
                Ok(true) => Ok(()),
                Ok(false) => Err(ArError::NotSupported),
                Err(e) => Err(ArError::CapabilityCheck {
                    details: e.to_string(),
                }),
            }
        };

        match verdict {
            Ok(()) => {
                info!("Immersive AR supported for {}", self.code_id);
                self.transition(ArState::Loading).await;
            }
            Err(reason) => self.fail(reason).await,
        }
        Ok(&self.state)
    }

    /// Prepare the video source, texture and scene. Progress only increases.
    pub async fn load(&mut self, video: &VideoRecord) -> Result<&ArState> {
        self.expect_state(ArState::Loading, "load resources")?;
        self.report_progress(10).await;

        let source = match self.bridge.attach(video).await {
            Ok(source) => source,
            Err(e) => {
                self.fail(ArError::ResourceLoad {
                    details: e.to_string(),
                })
                .await;
                return Ok(&self.state);
            }
        };
        self.report_progress(50).await;

        if let Err(e) = self.renderer.prepare_scene(&self.plane, &source) {
            self.bridge.teardown().await;
            self.fail(ArError::ResourceLoad {
                details: e.to_string(),
            })
            .await;
            return Ok(&self.state);
        }
        self.report_progress(90).await;

        self.report_progress(100).await;
        info!("AR resources for {} ready", self.code_id);
        self.transition(ArState::Ready).await;
        Ok(&self.state)
    }

    /// Open the immersive session and start the render loop
    pub async fn enter_session(&mut self) -> Result<&ArState> {
        if !matches!(self.state, ArState::Ready | ArState::Ended) {
            return Err(self.invalid("enter session"));
        }

        let mut session = match self
            .platform
            .request_session(&self.config.session_mode, &self.config.required_features)
            .await
        {
            Ok(session) => session,
            Err(e) => {
                error!("Failed to start AR session: {}", e);
                self.fail(ArError::SessionRequest {
                    details: e.to_string(),
                })
                .await;
                return Ok(&self.state);
            }
        };

        let hit_test_source = match session.request_hit_test_source().await {
            Ok(source) => source,
            Err(e) => {
                error!("Hit test source unavailable: {}", e);
                session.end().await;
                self.fail(ArError::HitTest {
                    details: e.to_string(),
                })
                .await;
                return Ok(&self.state);
            }
        };

        self.session = Some(ActiveSession {
            session,
            hit_test_source: Some(hit_test_source),
        });
        self.renderer.set_animation_loop(true);
        info!("AR session active for {}", self.code_id);
        self.transition(ArState::SessionActive).await;
        Ok(&self.state)
    }

    /// One render-loop tick: place the plane on the first horizontal hit,
    /// at most once per session, then render.
    pub async fn on_frame(&mut self, frame: &XrFrame) -> FrameOutcome {
        if self.state != ArState::SessionActive {
            return FrameOutcome::Skipped;
        }

        let outcome = if self.plane.has_parent() {
            FrameOutcome::AlreadyPlaced
        } else {
            self.try_place(frame).await
        };

        self.renderer.render();
        outcome
    }

    async fn try_place(&mut self, frame: &XrFrame) -> FrameOutcome {
        let tolerance = self.config.horizontal_tolerance_degrees;
        let hit = frame
            .hit_results
            .iter()
            .find(|hit| hit.pose.is_horizontal(tolerance));

        let (Some(hit), Some(viewer)) = (hit, frame.viewer_pose.as_ref()) else {
            return FrameOutcome::Searching;
        };

        self.plane.place(&hit.pose, viewer);
        self.renderer.add_to_scene(&self.plane);
        self.plane.set_parent(true);
        info!(
            "Placed video plane at ({:.2}, {:.2}, {:.2})",
            self.plane.position.x, self.plane.position.y, self.plane.position.z
        );
        self.event_bus
            .emit(ArScanEvent::VideoPlaced {
                position: self.plane.position.to_array(),
            })
            .await;

        if !self.bridge.is_playing() {
            if let Err(e) = self.bridge.play().await {
                warn!("Video did not start after placement: {}", e);
            }
        }
        FrameOutcome::Placed
    }

    /// Play or pause the placed video
    pub async fn toggle_playback(&mut self) -> Result<()> {
        if !self.plane.has_parent() {
            return Err(self.invalid("toggle playback"));
        }
        self.bridge.toggle().await
    }

    /// End the immersive session on user request
    pub async fn end_session(&mut self) -> Result<()> {
        let Some(mut active) = self.session.take() else {
            debug!("No AR session to end");
            return Ok(());
        };

        self.release_session(&mut active).await;
        active.session.end().await;
        self.finish_session().await;
        Ok(())
    }

    /// Release session resources once the platform reports the session over
    pub async fn on_session_ended(&mut self) {
        let Some(mut active) = self.session.take() else {
            return;
        };
        self.release_session(&mut active).await;
        self.finish_session().await;
    }

    async fn release_session(&mut self, active: &mut ActiveSession) {
        if let Some(source) = active.hit_test_source.take() {
            active.session.cancel_hit_test_source(source);
        }
        self.renderer.set_animation_loop(false);
        if self.plane.has_parent() {
            self.renderer.remove_from_scene(&self.plane);
            self.plane.set_parent(false);
        }
        self.bridge.pause().await;
    }

    async fn finish_session(&mut self) {
        info!("AR session for {} ended", self.code_id);
        self.transition(ArState::Ended).await;
    }

    /// Leave the AR screen: end any session and release the video decoder
    pub async fn teardown(&mut self) {
        if let Err(e) = self.end_session().await {
            warn!("Error ending AR session: {}", e);
        }
        self.bridge.teardown().await;
        if !self.state.is_terminal() && self.state != ArState::Ended {
            self.transition(ArState::Ended).await;
        }
        debug!("AR session machine torn down");
    }

    fn expect_state(&self, expected: ArState, action: &str) -> Result<()> {
        if self.state != expected {
            return Err(self.invalid(action));
        }
        Ok(())
    }

    fn invalid(&self, action: &str) -> ArScanError {
        ArError::InvalidTransition {
            from: self.state.name().to_string(),
            action: action.to_string(),
        }
        .into()
    }

    async fn report_progress(&mut self, percent: u8) {
        let percent = percent.min(100);
        if percent <= self.progress {
            return;
        }
        self.progress = percent;
        self.event_bus
            .emit(ArScanEvent::ArLoadingProgress { percent })
            .await;
    }

    async fn fail(&mut self, reason: ArError) {
        warn!("AR unavailable for {}: {}", self.code_id, reason);
        self.transition(ArState::Unsupported(reason)).await;
    }

    async fn transition(&mut self, next: ArState) {
        if self.state == next {
            return;
        }
        debug!("AR state {} -> {}", self.state, next);
        self.state = next;
        self.event_bus
            .emit(ArScanEvent::ArStateChanged {
                state: self.state.to_string(),
                timestamp: SystemTime::now(),
            })
            .await;
    }
}
