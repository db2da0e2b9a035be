use super::placement::VideoPlane;
use super::types::HitTestSourceId;
use crate::error::Result;
use async_trait::async_trait;

/// Platform immersive-session capability
#[async_trait]
pub trait XrPlatform: Send + Sync {
    /// Immersive sessions are only offered to secure (HTTPS) contexts
    fn is_secure_context(&self) -> bool;

    /// Whether an XR runtime is exposed at all
    fn has_xr(&self) -> bool;

    async fn is_session_supported(&self, mode: &str) -> Result<bool>;

    async fn request_session(
        &self,
        mode: &str,
        required_features: &[String],
    ) -> Result<Box<dyn XrSession>>;
}

/// An open immersive session. Exclusive device resource until ended.
#[async_trait]
pub trait XrSession: Send {
    /// Hit-test source casting from the viewer space
    async fn request_hit_test_source(&mut self) -> Result<HitTestSourceId>;

    fn cancel_hit_test_source(&mut self, source: HitTestSourceId);

    async fn end(&mut self);
}

/// The 3D renderer the video plane is drawn with
pub trait SceneRenderer: Send {
    /// Lighting, plane geometry and material bound to the video texture
    fn prepare_scene(&mut self, plane: &VideoPlane, texture_source: &str) -> Result<()>;

    /// Run the render loop every frame, or stop it
    fn set_animation_loop(&mut self, running: bool);

    fn add_to_scene(&mut self, plane: &VideoPlane);

    fn remove_from_scene(&mut self, plane: &VideoPlane);

    fn render(&mut self);
}
