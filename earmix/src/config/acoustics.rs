/// Speed of sound in world units (meters) per second
pub const SPEED_OF_SOUND: f32 = 343.0;

/// Global acoustic model knobs.
///
/// These are the initial values; every field can be changed at runtime
/// through the matching setter on [`EarMixEngine`](crate::EarMixEngine).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Acoustics {
    /// Propagation speed used for the per-ear time-of-flight delay
    pub speed_of_sound: f32,
    /// Distance between the two ears; each ear sits half of this from the listener
    pub head_width: f32,
    /// Radius inside which distance causes no attenuation
    pub linear_falloff_distance: f32,
    /// Gain applied to every instance on every channel
    pub master_volume: f32,
    /// Listener speeds above this are treated as teleports
    pub teleport_velocity_threshold: f32,
}

impl Default for Acoustics {
    fn default() -> Self {
        Self {
            speed_of_sound: SPEED_OF_SOUND,
            head_width: 0.2,
            linear_falloff_distance: 1.0,
            master_volume: 1.0,
            teleport_velocity_threshold: SPEED_OF_SOUND * 2.0,
        }
    }
}
