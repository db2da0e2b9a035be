use super::placement::VideoPlane;
use super::runtime::{SceneRenderer, XrPlatform, XrSession};
use super::types::HitTestSourceId;
use crate::error::{ArScanError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

/// Calls observed by [`MockXrPlatform`] and its sessions, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XrCall {
    IsSessionSupported(String),
    RequestSession { mode: String, features: Vec<String> },
    RequestHitTestSource,
    CancelHitTestSource(HitTestSourceId),
    End,
}

#[derive(Default)]
struct XrLog {
    calls: Mutex<Vec<XrCall>>,
    next_source: AtomicU32,
    live_sources: AtomicU32,
    open_sessions: AtomicU32,
}

impl XrLog {
    fn record(&self, call: XrCall) {
        self.calls.lock().push(call);
    }
}

/// Scriptable XR runtime that records every call
pub struct MockXrPlatform {
    secure: AtomicBool,
    xr: AtomicBool,
    supported: AtomicBool,
    fail_support_check: AtomicBool,
    fail_request: AtomicBool,
    fail_hit_test: AtomicBool,
    log: Arc<XrLog>,
}

impl MockXrPlatform {
    /// A secure context with a working immersive AR runtime
    pub fn new() -> Self {
        Self {
            secure: AtomicBool::new(true),
            xr: AtomicBool::new(true),
            supported: AtomicBool::new(true),
            fail_support_check: AtomicBool::new(false),
            fail_request: AtomicBool::new(false),
            fail_hit_test: AtomicBool::new(false),
            log: Arc::new(XrLog::default()),
        }
    }

    pub fn set_secure_context(&self, secure: bool) {
        self.secure.store(secure, Ordering::SeqCst);
    }

    pub fn set_has_xr(&self, available: bool) {
        self.xr.store(available, Ordering::SeqCst);
    }

    pub fn set_supported(&self, supported: bool) {
        self.supported.store(supported, Ordering::SeqCst);
    }

    /// Make the support query itself throw
    pub fn set_fail_support_check(&self, fail: bool) {
        self.fail_support_check.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_request(&self, fail: bool) {
        self.fail_request.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_hit_test(&self, fail: bool) {
        self.fail_hit_test.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<XrCall> {
        self.log.calls.lock().clone()
    }

    pub fn count(&self, call: &XrCall) -> usize {
        self.log.calls.lock().iter().filter(|c| *c == call).count()
    }

    /// Hit-test sources requested and not yet cancelled
    pub fn live_hit_test_sources(&self) -> u32 {
        self.log.live_sources.load(Ordering::SeqCst)
    }

    /// Sessions requested and not yet ended
    pub fn open_sessions(&self) -> u32 {
        self.log.open_sessions.load(Ordering::SeqCst)
    }
}

impl Default for MockXrPlatform {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl XrPlatform for MockXrPlatform {
    fn is_secure_context(&self) -> bool {
        self.secure.load(Ordering::SeqCst)
    }

    fn has_xr(&self) -> bool {
        self.xr.load(Ordering::SeqCst)
    }

    async fn is_session_supported(&self, mode: &str) -> Result<bool> {
        self.log.record(XrCall::IsSessionSupported(mode.to_string()));
        if self.fail_support_check.load(Ordering::SeqCst) {
            return Err(ArScanError::component("xr", "isSessionSupported threw"));
        }
        Ok(self.supported.load(Ordering::SeqCst))
    }

    async fn request_session(
        &self,
        mode: &str,
        required_features: &[String],
    ) -> Result<Box<dyn XrSession>> {
        self.log.record(XrCall::RequestSession {
            mode: mode.to_string(),
            features: required_features.to_vec(),
        });
        if self.fail_request.load(Ordering::SeqCst) {
            return Err(ArScanError::component("xr", "session request was denied"));
        }
        self.log.open_sessions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockXrSession {
            log: Arc::clone(&self.log),
            fail_hit_test: self.fail_hit_test.load(Ordering::SeqCst),
            ended: false,
        }))
    }
}

/// Session handed out by [`MockXrPlatform`]
pub struct MockXrSession {
    log: Arc<XrLog>,
    fail_hit_test: bool,
    ended: bool,
}

#[async_trait]
impl XrSession for MockXrSession {
    async fn request_hit_test_source(&mut self) -> Result<HitTestSourceId> {
        self.log.record(XrCall::RequestHitTestSource);
        if self.fail_hit_test {
            return Err(ArScanError::component("xr", "viewer reference space unavailable"));
        }
        let id = self.log.next_source.fetch_add(1, Ordering::SeqCst) + 1;
        self.log.live_sources.fetch_add(1, Ordering::SeqCst);
        Ok(HitTestSourceId(id))
    }

    fn cancel_hit_test_source(&mut self, source: HitTestSourceId) {
        self.log.record(XrCall::CancelHitTestSource(source));
        self.log.live_sources.fetch_sub(1, Ordering::SeqCst);
    }

    async fn end(&mut self) {
        self.log.record(XrCall::End);
        if !self.ended {
            self.ended = true;
            self.log.open_sessions.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

/// Calls observed by [`MockRenderer`], in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderCall {
    PrepareScene(String),
    AnimationLoop(bool),
    AddToScene,
    RemoveFromScene,
    Render,
}

/// Renderer that records calls; clones share the same log
#[derive(Clone, Default)]
pub struct MockRenderer {
    log: Arc<Mutex<Vec<RenderCall>>>,
    fail_prepare: Arc<AtomicBool>,
}

impl MockRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_prepare(&self, fail: bool) {
        self.fail_prepare.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<RenderCall> {
        self.log.lock().clone()
    }

    pub fn count(&self, call: &RenderCall) -> usize {
        self.log.lock().iter().filter(|c| *c == call).count()
    }

    fn record(&self, call: RenderCall) {
        self.log.lock().push(call);
    }
}

impl SceneRenderer for MockRenderer {
    fn prepare_scene(&mut self, _plane: &VideoPlane, texture_source: &str) -> Result<()> {
        self.record(RenderCall::PrepareScene(texture_source.to_string()));
        if self.fail_prepare.load(Ordering::SeqCst) {
            return Err(ArScanError::component("renderer", "WebGL context lost"));
        }
        Ok(())
    }

    fn set_animation_loop(&mut self, running: bool) {
        self.record(RenderCall::AnimationLoop(running));
    }

    fn add_to_scene(&mut self, _plane: &VideoPlane) {
        self.record(RenderCall::AddToScene);
    }

    fn remove_from_scene(&mut self, _plane: &VideoPlane) {
        self.record(RenderCall::RemoveFromScene);
    }

    fn render(&mut self) {
        self.record(RenderCall::Render);
    }
}
