mod mock;
mod placement;
mod runtime;
mod session;
mod simulation;
mod types;


pub use mock::{MockRenderer, MockXrPlatform, MockXrSession, RenderCall, XrCall};
pub use placement::VideoPlane;
pub use runtime::{SceneRenderer, XrPlatform, XrSession};
pub use session::ArSessionMachine;
pub use simulation::{SimulatedWalkthrough, WalkthroughStage};
pub use types::{ArState, FrameOutcome, HitResult, HitTestSourceId, Pose, Quat, Vec3, XrFrame};
