use crate::math::Quat;
use std::f32::consts::FRAC_PI_2;

/// Configuration for one synthesized output channel (a virtual microphone).
///
/// The rotation offset is expressed in listener space (forward = -Z, up = +Y)
/// and turns the listener's forward axis into the direction the ear faces.
#[derive(Debug, Clone)]
pub struct EarDesc {
    /// Display name, used in logs
    pub name: String,
    /// Rotation from the listener's forward axis to this ear's facing axis
    pub rotation_offset: Quat,
    /// Per-channel volume multiplier (1.0 = unity)
    pub volume_multiplier: f32,
    /// Gain floor for sounds directly behind this ear, in `[0, 1]`
    pub directional_minimum: f32,
}

impl EarDesc {
    /// Create an ear with unity volume and the default directional floor
    pub fn new(name: impl Into<String>, rotation_offset: Quat) -> Self {
        Self {
            name: name.into(),
            rotation_offset,
            volume_multiplier: 1.0,
            directional_minimum: 0.3,
        }
    }

    /// Ear facing 90 degrees to the left of forward
    pub fn left() -> Self {
        Self::new("left", Quat::from_rotation_y(FRAC_PI_2))
    }

    /// Ear facing 90 degrees to the right of forward
    pub fn right() -> Self {
        Self::new("right", Quat::from_rotation_y(-FRAC_PI_2))
    }

    /// The conventional left/right pair
    pub fn stereo() -> Vec<Self> {
        vec![Self::left(), Self::right()]
    }

    pub fn volume_multiplier(mut self, volume: f32) -> Self {
        self.volume_multiplier = volume;
        self
    }

    pub fn directional_minimum(mut self, minimum: f32) -> Self {
        self.directional_minimum = minimum;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Vec3;

    #[test]
    fn test_stereo_ears_face_sideways() {
        let left = EarDesc::left().rotation_offset * Vec3::NEG_Z;
        let right = EarDesc::right().rotation_offset * Vec3::NEG_Z;

        assert!((left - Vec3::NEG_X).length() < 1e-5);
        assert!((right - Vec3::X).length() < 1e-5);
    }
}
