use crate::math::{ListenerPose, Vec3};

/// Listener pose plus the motion derived from successive frame updates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ListenerState {
    pub pose: ListenerPose,
    pub previous_position: Vec3,
    pub velocity: Vec3,
}

impl Default for ListenerState {
    fn default() -> Self {
        Self {
            pose: ListenerPose::identity(),
            previous_position: Vec3::ZERO,
            velocity: Vec3::ZERO,
        }
    }
}

impl ListenerState {
    pub fn new(pose: ListenerPose) -> Self {
        Self {
            pose,
            previous_position: pose.position,
            velocity: Vec3::ZERO,
        }
    }

    /// Move to `pose` and return whether the move counted as a teleport.
    ///
    /// A teleport zeroes velocity and forgets the old position. That happens
    /// when the host says so, when `dt` is unusable, or when the implied speed
    /// exceeds `teleport_threshold`.
    pub fn update(
        &mut self,
        pose: ListenerPose,
        did_teleport: bool,
        dt: f32,
        teleport_threshold: f32,
    ) -> bool {
        let old_position = self.pose.position;
        let displacement = pose.position - old_position;

        let teleported = did_teleport
            || !(dt.is_finite() && dt > 0.0)
            || displacement.length() / dt > teleport_threshold;

        if teleported {
            self.velocity = Vec3::ZERO;
            self.previous_position = pose.position;
        } else {
            self.velocity = displacement / dt;
            self.previous_position = old_position;
        }
        self.pose = pose;

        teleported
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const THRESHOLD: f32 = 686.0;

    #[test]
    fn test_smooth_motion_tracks_velocity() {
        let mut state = ListenerState::default();
        let teleported = state.update(
            ListenerPose::from_position(Vec3::new(1.0, 0.0, 0.0)),
            false,
            0.5,
            THRESHOLD,
        );

        assert!(!teleported);
        assert_eq!(state.velocity, Vec3::new(2.0, 0.0, 0.0));
        assert_eq!(state.previous_position, Vec3::ZERO);
        assert_eq!(state.pose.position, Vec3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn test_teleport_resets_motion() {
        let mut state = ListenerState::default();
        state.update(ListenerPose::from_position(Vec3::X), false, 1.0, THRESHOLD);
        assert_eq!(state.velocity, Vec3::X);

        // Explicit flag
        let target = Vec3::new(50.0, 0.0, 0.0);
        assert!(state.update(ListenerPose::from_position(target), true, 1.0, THRESHOLD));
        assert_eq!(state.velocity, Vec3::ZERO);
        assert_eq!(state.previous_position, target);

        // Too fast to be real motion
        let far = Vec3::new(5000.0, 0.0, 0.0);
        assert!(state.update(ListenerPose::from_position(far), false, 1.0, THRESHOLD));
        assert_eq!(state.previous_position, far);

        // No usable time step
        assert!(state.update(ListenerPose::from_position(Vec3::ZERO), false, 0.0, THRESHOLD));
        assert!(state.update(ListenerPose::from_position(Vec3::X), false, f32::NAN, THRESHOLD));
        assert_eq!(state.velocity, Vec3::ZERO);
    }
}
