use super::types::{Pose, Vec3};
use crate::config::ArConfig;

/// Flat surface the video texture is projected on
#[derive(Debug, Clone, PartialEq)]
pub struct VideoPlane {
    pub width: f32,
    pub height: f32,
    pub position: Vec3,
    /// Rotation about the vertical axis, radians
    pub yaw: f32,
    in_scene: bool,
}

impl VideoPlane {
    pub fn new(aspect_ratio: f32, height: f32) -> Self {
        Self {
            width: aspect_ratio * height,
            height,
            position: Vec3::default(),
            yaw: 0.0,
            in_scene: false,
        }
    }

    pub fn from_config(config: &ArConfig) -> Self {
        Self::new(config.plane_aspect_ratio, config.plane_height)
    }

    /// Whether the plane is attached to the scene graph
    pub fn has_parent(&self) -> bool {
        self.in_scene
    }

    pub(crate) fn set_parent(&mut self, attached: bool) {
        self.in_scene = attached;
    }

    /// Turn to face `target`, staying upright
    pub fn look_at(&mut self, target: Vec3) {
        let delta = target.sub(self.position);
        if delta.x == 0.0 && delta.z == 0.0 {
            return;
        }
        self.yaw = delta.x.atan2(delta.z);
    }

    /// Position on the hit pose and face the viewer
    pub fn place(&mut self, hit: &Pose, viewer: &Pose) {
        self.position = hit.position;
        self.look_at(viewer.position);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::{FRAC_PI_2, PI};

    #[test]
    fn test_dimensions_follow_aspect_ratio() {
        let plane = VideoPlane::new(16.0 / 9.0, 1.0);
        assert!((plane.width - 1.7777).abs() < 1e-3);
        assert!(!plane.has_parent());
    }

    #[test]
    fn test_faces_viewer() {
        let mut plane = VideoPlane::new(1.0, 1.0);
        plane.place(
            &Pose::at(Vec3::new(0.0, 0.0, -2.0)),
            &Pose::at(Vec3::new(0.0, 1.6, 0.0)),
        );
        assert_eq!(plane.position, Vec3::new(0.0, 0.0, -2.0));
        assert!(plane.yaw.abs() < 1e-5);

        plane.look_at(Vec3::new(5.0, 0.0, -2.0));
        assert!((plane.yaw - FRAC_PI_2).abs() < 1e-5);

        plane.look_at(Vec3::new(0.0, 3.0, -5.0));
        assert!((plane.yaw.abs() - PI).abs() < 1e-5);
    }
}
