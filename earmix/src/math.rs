//! Math types for EarMix

pub use glam::{Mat3, Quat, Vec3};

/// Listener position and orientation as supplied once per game tick.
///
/// Listener space follows the usual right-handed convention: forward is -Z,
/// up is +Y and right is +X.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ListenerPose {
    pub position: Vec3,
    pub forward: Vec3,
    pub up: Vec3,
}

impl ListenerPose {
    pub fn new(position: Vec3, forward: Vec3, up: Vec3) -> Self {
        Self {
            position,
            forward,
            up,
        }
    }

    pub fn identity() -> Self {
        Self {
            position: Vec3::ZERO,
            forward: Vec3::NEG_Z,
            up: Vec3::Y,
        }
    }

    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Self::identity()
        }
    }

    /// Rotation taking listener space into world space.
    ///
    /// `up` only has to be roughly perpendicular to `forward`; it is
    /// re-orthogonalized here. A degenerate pair falls back to an arbitrary
    /// perpendicular up axis.
    pub fn orientation(&self) -> Quat {
        let forward = self.forward.try_normalize().unwrap_or(Vec3::NEG_Z);
        let right = forward
            .cross(self.up)
            .try_normalize()
            .unwrap_or_else(|| forward.any_orthonormal_vector());
        let up = right.cross(forward);

        Quat::from_mat3(&Mat3::from_cols(right, up, -forward))
    }

    pub fn right(&self) -> Vec3 {
        self.orientation() * Vec3::X
    }

    pub fn distance(&self, point: Vec3) -> f32 {
        self.position.distance(point)
    }
}

impl Default for ListenerPose {
    fn default() -> Self {
        Self::identity()
    }
}

/// Angle in radians (`0..=PI`) between two directions, measured through the
/// shortest-arc quaternion that turns `from` into `to`.
pub fn arc_angle(from: Vec3, to: Vec3) -> f32 {
    let (Some(from), Some(to)) = (from.try_normalize(), to.try_normalize()) else {
        return 0.0;
    };
    let (_, angle) = Quat::from_rotation_arc(from, to).to_axis_angle();
    angle.clamp(0.0, std::f32::consts::PI)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::{FRAC_PI_2, PI};

    #[test]
    fn test_identity_orientation() {
        let pose = ListenerPose::identity();
        let rotation = pose.orientation();
        assert!((rotation * Vec3::NEG_Z - Vec3::NEG_Z).length() < 1e-5);
        assert!((pose.right() - Vec3::X).length() < 1e-5);
    }

    #[test]
    fn test_orientation_follows_forward() {
        let pose = ListenerPose::new(Vec3::ZERO, Vec3::X, Vec3::Y);
        let rotation = pose.orientation();
        assert!((rotation * Vec3::NEG_Z - Vec3::X).length() < 1e-5);
        assert!((rotation * Vec3::Y - Vec3::Y).length() < 1e-5);
        assert!((pose.right() - Vec3::Z).length() < 1e-5);
    }

    #[test]
    fn test_degenerate_up_still_orthonormal() {
        let pose = ListenerPose::new(Vec3::ZERO, Vec3::Y, Vec3::Y);
        let rotation = pose.orientation();
        assert!(rotation.is_normalized());
        assert!((rotation * Vec3::NEG_Z - Vec3::Y).length() < 1e-5);
    }

    #[test]
    fn test_arc_angle() {
        assert!(arc_angle(Vec3::X, Vec3::X).abs() < 1e-4);
        assert!((arc_angle(Vec3::X, Vec3::Z) - FRAC_PI_2).abs() < 1e-4);
        assert!((arc_angle(Vec3::X, Vec3::NEG_X) - PI).abs() < 1e-4);
        assert_eq!(arc_angle(Vec3::ZERO, Vec3::X), 0.0);
    }
}
