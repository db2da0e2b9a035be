use crate::error::ArError;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn sub(self, other: Vec3) -> Vec3 {
        Vec3::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }

    pub fn length(self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn to_array(self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }
}

/// Unit quaternion
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quat {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Quat {
    pub const IDENTITY: Quat = Quat {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        w: 1.0,
    };

    pub fn from_axis_angle(axis: Vec3, radians: f32) -> Self {
        let len = axis.length();
        if len == 0.0 {
            return Self::IDENTITY;
        }
        let (s, c) = (radians / 2.0).sin_cos();
        Self {
            x: axis.x / len * s,
            y: axis.y / len * s,
            z: axis.z / len * s,
            w: c,
        }
    }

    /// The local +Y axis after rotation
    pub fn up(self) -> Vec3 {
        let Quat { x, y, z, w } = self;
        Vec3::new(
            2.0 * (x * y - w * z),
            1.0 - 2.0 * (x * x + z * z),
            2.0 * (y * z + w * x),
        )
    }
}

impl Default for Quat {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Position and orientation in the local reference space
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub position: Vec3,
    pub orientation: Quat,
}

impl Pose {
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            orientation: Quat::IDENTITY,
        }
    }

    /// Whether the pose's up axis is within `tolerance_degrees` of world up
    pub fn is_horizontal(&self, tolerance_degrees: f32) -> bool {
        let up = self.orientation.up();
        let len = up.length();
        if len == 0.0 {
            return false;
        }
        let tilt = (up.y / len).clamp(-1.0, 1.0).acos().to_degrees();
        tilt <= tolerance_degrees
    }
}

/// One surface intersection reported by the hit-test source
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HitResult {
    pub pose: Pose,
}

/// What the platform delivers to the render loop each frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XrFrame {
    pub hit_results: Vec<HitResult>,
    pub viewer_pose: Option<Pose>,
}

impl XrFrame {
    pub fn with_hit(hit: Pose, viewer: Pose) -> Self {
        Self {
            hit_results: vec![HitResult { pose: hit }],
            viewer_pose: Some(viewer),
        }
    }
}

/// Opaque id of a hit-test source held by the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HitTestSourceId(pub u32);

/// Lifecycle of the AR experience for one page visit
#[derive(Debug, Clone, PartialEq)]
pub enum ArState {
    CheckingSupport,
    Loading,
    Ready,
    SessionActive,
    Ended,
    /// Terminal; the fallback walkthrough is offered instead
    Unsupported(ArError),
}

impl ArState {
    pub fn name(&self) -> &'static str {
        match self {
            ArState::CheckingSupport => "checking_support",
            ArState::Loading => "loading",
            ArState::Ready => "ready",
            ArState::SessionActive => "session_active",
            ArState::Ended => "ended",
            ArState::Unsupported(_) => "unsupported",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ArState::Unsupported(_))
    }
}

impl fmt::Display for ArState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArState::Unsupported(reason) => write!(f, "unsupported ({})", reason),
            other => f.write_str(other.name()),
        }
    }
}

/// What a render-loop frame did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// No session is running
    Skipped,
    /// No usable horizontal surface yet
    Searching,
    /// The video plane was placed on this frame
    Placed,
    /// The plane was already in the scene
    AlreadyPlaced,
}
