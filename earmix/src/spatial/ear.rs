use crate::clip::{AudioClip, BYTES_PER_SAMPLE};
use crate::config::{Acoustics, EarDesc};
use crate::math::{ListenerPose, Quat, Vec3, arc_angle};
use crate::playback::InstanceParams;

/// Fixed-point scale of gain multipliers and pitch steps (16.16)
const FIXED_ONE: i64 = 1 << 16;

const MIN_PITCH: f32 = 1.0 / 64.0;
const MAX_PITCH: f32 = 16.0;

/// Gain and delay of one sound as heard by one ear
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EarResponse {
    /// Angular gain times distance gain
    pub volume: f32,
    /// Propagation delay in samples; zero or negative (a look-back)
    pub time_offset: i64,
    pub distance: f32,
    pub angle: f32,
}

/// What one ear did with one instance during a mix pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EarMix {
    /// Instance cursor (bytes) after this pass
    pub cursor_after: usize,
    /// Time offset (samples) the ear used
    pub time_offset: i64,
    /// Bytes of the output buffer this instance contributed to
    pub valid_bytes: usize,
}

/// One synthesized output channel.
///
/// The ear sits half a head width from the listener along its facing axis,
/// which is the listener's forward axis turned by `rotation_offset`. Ear
/// geometry is refreshed once per frame update, not per mix pass.
#[derive(Debug, Clone)]
pub struct EarChannel {
    name: String,
    index: usize,
    rotation_offset: Quat,
    ear_position: Vec3,
    ear_axis: Vec3,
    volume_multiplier: f32,
    directional_minimum: f32,
}

impl EarChannel {
    pub fn new(index: usize, desc: &EarDesc) -> Self {
        Self {
            name: desc.name.clone(),
            index,
            rotation_offset: desc.rotation_offset,
            ear_position: Vec3::ZERO,
            ear_axis: desc.rotation_offset * Vec3::NEG_Z,
            volume_multiplier: desc.volume_multiplier,
            directional_minimum: desc.directional_minimum.clamp(0.0, 1.0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Position in the sink's channel order
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn ear_position(&self) -> Vec3 {
        self.ear_position
    }

    pub fn ear_axis(&self) -> Vec3 {
        self.ear_axis
    }

    pub fn volume_multiplier(&self) -> f32 {
        self.volume_multiplier
    }

    pub fn set_volume_multiplier(&mut self, volume: f32) {
        self.volume_multiplier = volume;
    }

    pub fn directional_minimum(&self) -> f32 {
        self.directional_minimum
    }

    pub fn set_directional_minimum(&mut self, minimum: f32) {
        self.directional_minimum = minimum.clamp(0.0, 1.0);
    }

    /// Recompute the ear's position and facing axis for a new listener pose
    pub fn update_pose(&mut self, pose: &ListenerPose, head_width: f32) {
        let axis = (pose.orientation() * self.rotation_offset * Vec3::NEG_Z).normalize_or_zero();
        self.ear_axis = axis;
        self.ear_position = pose.position + axis * (head_width * 0.5);
    }

    /// Gain and delay for a sound at `position`
    pub fn spatialize(&self, position: Vec3, acoustics: &Acoustics, sample_rate: u32) -> EarResponse {
        let to_source = position - self.ear_position;
        let distance = to_source.length();
        let angle = arc_angle(self.ear_axis, to_source);

        let volume = angular_gain(angle, self.directional_minimum)
            * distance_gain(distance, acoustics.linear_falloff_distance);

        EarResponse {
            volume,
            time_offset: time_offset_samples(distance, acoustics.speed_of_sound, sample_rate),
            distance,
            angle,
        }
    }

    /// Mix one instance additively into `out` (16-bit LE mono samples).
    ///
    /// Reads start at `cursor` shifted back by this ear's delay. Looping
    /// clips wrap in both directions; non-looping clips are silent before
    /// their first frame and stop contributing at their last one.
    pub fn add_clip_to_buffer(
        &self,
        clip: &AudioClip,
        cursor: usize,
        params: &InstanceParams,
        acoustics: &Acoustics,
        sample_rate: u32,
        out: &mut [u8],
    ) -> EarMix {
        let (volume, time_offset) = if params.use_position {
            let response = self.spatialize(params.position, acoustics, sample_rate);
            (response.volume, response.time_offset)
        } else {
            (1.0, 0)
        };

        let gain = params.gain * acoustics.master_volume * self.volume_multiplier;
        let multiplier = gain_multiplier(gain, volume);
        let step = pitch_step(params.pitch);

        let frame_bytes = clip.frame_bytes();
        let total_frames = clip.total_frames() as i64;
        let source_channel = self.index.min(clip.channel_count() - 1);
        let cursor_frame = (cursor / frame_bytes) as i64;
        let samples = out.len() / BYTES_PER_SAMPLE;

        let mut valid_bytes = 0;
        if total_frames > 0 {
            for j in 0..samples {
                let advance = ((j as i64) * step) >> 16;
                let mut frame = cursor_frame + advance + time_offset;

                if params.looping {
                    frame = frame.rem_euclid(total_frames);
                } else if frame >= total_frames {
                    break;
                }

                let at = j * BYTES_PER_SAMPLE;
                valid_bytes = at + BYTES_PER_SAMPLE;
                if frame < 0 {
                    // Sound has not reached this ear yet
                    continue;
                }

                let sample = clip.sample(frame as usize, source_channel) as i64;
                let scaled = (sample * multiplier) >> 16;
                let existing = i16::from_le_bytes([out[at], out[at + 1]]) as i64;
                let mixed = (existing + scaled).clamp(i16::MIN as i64, i16::MAX as i64) as i16;
                out[at..at + BYTES_PER_SAMPLE].copy_from_slice(&mixed.to_le_bytes());
            }
        }

        let advance_frames = ((samples as i64 * step) >> 16) as usize;
        let mut cursor_after = cursor + advance_frames * frame_bytes;
        if params.looping {
            let loop_bytes = clip.total_frames() * frame_bytes;
            cursor_after = if loop_bytes == 0 {
                0
            } else {
                cursor_after % loop_bytes
            };
        }

        EarMix {
            cursor_after,
            time_offset,
            valid_bytes,
        }
    }
}

/// Cosine falloff away from the ear's axis, floored at `minimum`
pub fn angular_gain(angle: f32, minimum: f32) -> f32 {
    (angle * 0.5).cos().max(0.0) * (1.0 - minimum) + minimum
}

/// Inverse-square falloff outside `linear_falloff_distance`
pub fn distance_gain(distance: f32, linear_falloff_distance: f32) -> f32 {
    if linear_falloff_distance <= 0.0 || distance <= linear_falloff_distance {
        return 1.0;
    }
    let ratio = distance / linear_falloff_distance;
    1.0 / (ratio * ratio)
}

/// Time of flight as a non-positive sample offset
pub fn time_offset_samples(distance: f32, speed_of_sound: f32, sample_rate: u32) -> i64 {
    if speed_of_sound <= 0.0 || !distance.is_finite() {
        return 0;
    }
    (-(distance as f64) / speed_of_sound as f64 * sample_rate as f64).round() as i64
}

/// Squared instance gain scaled linearly by the ear's spatial volume, as a
/// 16.16 multiplier
fn gain_multiplier(gain: f32, ear_volume: f32) -> i64 {
    if !gain.is_finite() || !ear_volume.is_finite() {
        return 0;
    }
    let scaled = gain as f64 * gain as f64 * ear_volume.max(0.0) as f64;
    (scaled * FIXED_ONE as f64).round().min(i32::MAX as f64) as i64
}

/// Source frames per output sample as a 16.16 step
fn pitch_step(pitch: f32) -> i64 {
    let pitch = if pitch.is_finite() {
        pitch.clamp(MIN_PITCH, MAX_PITCH)
    } else {
        1.0
    };
    (pitch as f64 * FIXED_ONE as f64).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clip::ClipChannels;

    const RATE: u32 = 44100;

    fn read(out: &[u8]) -> Vec<i16> {
        out.chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect()
    }

    fn left_ear() -> EarChannel {
        let mut ear = EarChannel::new(0, &EarDesc::left());
        ear.update_pose(&ListenerPose::identity(), 0.2);
        ear
    }

    #[test]
    fn test_ear_positions_follow_listener() {
        let mut left = EarChannel::new(0, &EarDesc::left());
        let mut right = EarChannel::new(1, &EarDesc::right());
        let pose = ListenerPose::new(Vec3::new(5.0, 0.0, 0.0), Vec3::X, Vec3::Y);
        left.update_pose(&pose, 0.2);
        right.update_pose(&pose, 0.2);

        // Facing +X, left is -Z and right is +Z
        assert!((left.ear_position() - Vec3::new(5.0, 0.0, -0.1)).length() < 1e-5);
        assert!((right.ear_position() - Vec3::new(5.0, 0.0, 0.1)).length() < 1e-5);
        assert!((left.ear_axis() - Vec3::NEG_Z).length() < 1e-5);
    }

    #[test]
    fn test_near_ear_is_louder_and_earlier() {
        let acoustics = Acoustics::default();
        let left = left_ear();
        let mut right = EarChannel::new(1, &EarDesc::right());
        right.update_pose(&ListenerPose::identity(), 0.2);

        let source = Vec3::new(-3.0, 0.0, 0.0);
        let near = left.spatialize(source, &acoustics, RATE);
        let far = right.spatialize(source, &acoustics, RATE);

        assert!(near.volume > far.volume);
        assert!(near.time_offset > far.time_offset);
        assert!(near.angle < 1e-3);
    }

    #[test]
    fn test_distance_gain_is_monotonic() {
        let mut previous = distance_gain(1.0, 1.0);
        assert_eq!(previous, 1.0);
        for step in 1..200 {
            let gain = distance_gain(1.0 + step as f32 * 0.5, 1.0);
            assert!(gain <= previous);
            previous = gain;
        }
        assert!((distance_gain(4.0, 2.0) - 0.25).abs() < 1e-6);
        assert_eq!(distance_gain(0.5, 2.0), 1.0);
    }

    #[test]
    fn test_distance_monotonic_for_fixed_direction() {
        let acoustics = Acoustics::default();
        let ear = left_ear();
        let direction = Vec3::new(-1.0, 0.0, -1.0).normalize();

        let mut previous = f32::MAX;
        for step in 0..50 {
            let distance = acoustics.linear_falloff_distance + 0.1 + step as f32;
            let response =
                ear.spatialize(ear.ear_position() + direction * distance, &acoustics, RATE);
            assert!(response.volume <= previous + 1e-6);
            previous = response.volume;
        }
    }

    #[test]
    fn test_angular_floor() {
        for minimum in [0.0, 0.25, 0.5, 1.0] {
            for step in 0..=64 {
                let angle = std::f32::consts::PI * step as f32 / 64.0;
                let gain = angular_gain(angle, minimum);
                assert!(gain >= minimum - 1e-6);
                assert!(gain <= 1.0 + 1e-6);
            }
        }

        let acoustics = Acoustics::default();
        let ear = left_ear();
        let behind = ear.ear_position() + Vec3::new(5.0, 0.0, 0.0);
        let response = ear.spatialize(behind, &acoustics, RATE);
        let floor = ear.directional_minimum()
            * distance_gain(response.distance, acoustics.linear_falloff_distance);
        assert!(response.volume >= floor - 1e-6);
    }

    #[test]
    fn test_time_offset_is_a_look_back() {
        assert_eq!(time_offset_samples(0.0, 343.0, RATE), 0);
        assert_eq!(time_offset_samples(343.0, 343.0, RATE), -44100);
        assert_eq!(time_offset_samples(1.0, 0.0, RATE), 0);
    }

    #[test]
    fn test_identity_gain_copies_clip() {
        let clip = AudioClip::from_samples(&[100, -100, 50, -50], ClipChannels::Mono);
        let ear = left_ear();
        let mut out = vec![0u8; 12];

        let mix = ear.add_clip_to_buffer(
            &clip,
            0,
            &InstanceParams::default(),
            &Acoustics::default(),
            RATE,
            &mut out,
        );

        assert_eq!(read(&out), vec![100, -100, 50, -50, 0, 0]);
        assert_eq!(mix.valid_bytes, 8);
        assert_eq!(mix.cursor_after, 12);
        assert_eq!(mix.time_offset, 0);
    }

    #[test]
    fn test_mixing_is_additive_and_clamped() {
        let clip = AudioClip::from_samples(&[30000, -30000, 10], ClipChannels::Mono);
        let ear = left_ear();
        let params = InstanceParams::default();
        let acoustics = Acoustics::default();

        let mut once = vec![0u8; 6];
        ear.add_clip_to_buffer(&clip, 0, &params, &acoustics, RATE, &mut once);

        let mut twice = vec![0u8; 6];
        ear.add_clip_to_buffer(&clip, 0, &params, &acoustics, RATE, &mut twice);
        ear.add_clip_to_buffer(&clip, 0, &params, &acoustics, RATE, &mut twice);

        let expected: Vec<i16> = read(&once)
            .iter()
            .map(|&s| (s as i32 * 2).clamp(i16::MIN as i32, i16::MAX as i32) as i16)
            .collect();
        assert_eq!(read(&twice), expected);
        assert_eq!(read(&twice), vec![i16::MAX, i16::MIN, 20]);
    }

    #[test]
    fn test_gain_is_squared() {
        let clip = AudioClip::from_samples(&[1000, -1000], ClipChannels::Mono);
        let ear = left_ear();
        let mut out = vec![0u8; 4];
        ear.add_clip_to_buffer(
            &clip,
            0,
            &InstanceParams::flat(0.5),
            &Acoustics::default(),
            RATE,
            &mut out,
        );
        assert_eq!(read(&out), vec![250, -250]);
    }

    #[test]
    fn test_ear_volume_scales_output_linearly() {
        let clip = AudioClip::from_samples(&[10000; 8], ClipChannels::Mono);
        let acoustics = Acoustics::default();
        let ear = left_ear();

        // Straight behind the ear's axis, inside the falloff radius
        let behind = ear.ear_position() - ear.ear_axis() * 0.5;
        let response = ear.spatialize(behind, &acoustics, RATE);
        let floor = ear.directional_minimum()
            * distance_gain(response.distance, acoustics.linear_falloff_distance);
        assert!((response.volume - floor).abs() < 1e-3);

        let params = InstanceParams::spatial(behind).looping(true);
        let mut out = vec![0u8; 8];
        ear.add_clip_to_buffer(&clip, 0, &params, &acoustics, RATE, &mut out);

        let expected = (10000.0 * floor).round() as i16;
        for sample in read(&out) {
            assert!((sample - expected).abs() <= 1, "{} vs {}", sample, expected);
        }
    }

    #[test]
    fn test_channel_gain_is_squared_but_ear_volume_is_not() {
        let clip = AudioClip::from_samples(&[1000; 4], ClipChannels::Mono);
        let acoustics = Acoustics::default();
        let mut ear = EarChannel::new(0, &EarDesc::left().volume_multiplier(0.5));
        ear.update_pose(&ListenerPose::identity(), 0.2);

        let behind = ear.ear_position() - ear.ear_axis() * 0.5;
        let response = ear.spatialize(behind, &acoustics, RATE);
        let mut out = vec![0u8; 4];
        ear.add_clip_to_buffer(
            &clip,
            0,
            &InstanceParams::spatial(behind).looping(true),
            &acoustics,
            RATE,
            &mut out,
        );

        let expected = (1000.0 * 0.25 * response.volume).round() as i16;
        for sample in read(&out) {
            assert!((sample - expected).abs() <= 1, "{} vs {}", sample, expected);
        }
    }

    #[test]
    fn test_looping_wraps_forward_and_backward() {
        let clip = AudioClip::from_samples(&[1, 2, 3], ClipChannels::Mono);
        let ear = left_ear();
        let params = InstanceParams::default().looping(true);
        let mut out = vec![0u8; 8];

        let mix = ear.add_clip_to_buffer(&clip, 4, &params, &Acoustics::default(), RATE, &mut out);
        assert_eq!(read(&out), vec![3, 1, 2, 3]);
        // 2 + 4 frames wraps to frame 0
        assert_eq!(mix.cursor_after, 0);
        assert_eq!(mix.valid_bytes, 8);
    }

    #[test]
    fn test_stereo_clip_feeds_matching_ear() {
        let clip = AudioClip::from_samples(&[10, 20, 11, 21], ClipChannels::Stereo);
        let acoustics = Acoustics::default();
        let params = InstanceParams::default();
        let left = left_ear();
        let right = EarChannel::new(1, &EarDesc::right());

        let mut left_out = vec![0u8; 4];
        let mut right_out = vec![0u8; 4];
        let left_mix = left.add_clip_to_buffer(&clip, 0, &params, &acoustics, RATE, &mut left_out);
        right.add_clip_to_buffer(&clip, 0, &params, &acoustics, RATE, &mut right_out);

        assert_eq!(read(&left_out), vec![10, 11]);
        assert_eq!(read(&right_out), vec![20, 21]);
        assert_eq!(left_mix.cursor_after, 8);
    }

    #[test]
    fn test_pitch_steps_through_source() {
        let clip = AudioClip::from_samples(&[1, 2, 3, 4, 5, 6, 7, 8], ClipChannels::Mono);
        let ear = left_ear();
        let mut out = vec![0u8; 6];
        let mix = ear.add_clip_to_buffer(
            &clip,
            0,
            &InstanceParams::default().pitch(2.0),
            &Acoustics::default(),
            RATE,
            &mut out,
        );
        assert_eq!(read(&out), vec![1, 3, 5]);
        assert_eq!(mix.cursor_after, 12);
    }

    #[test]
    fn test_distant_source_is_silent_until_it_arrives() {
        let clip = AudioClip::from_samples(&[500; 16], ClipChannels::Mono);
        let acoustics = Acoustics {
            speed_of_sound: RATE as f32,
            linear_falloff_distance: 100.0,
            ..Default::default()
        };
        let mut ear = EarChannel::new(0, &EarDesc::left().directional_minimum(1.0));
        ear.update_pose(&ListenerPose::identity(), 0.0);

        // Three samples of flight time at this speed of sound
        let params = InstanceParams::spatial(Vec3::new(-3.0, 0.0, 0.0));
        let mut out = vec![0u8; 8];
        let mix = ear.add_clip_to_buffer(&clip, 0, &params, &acoustics, RATE, &mut out);

        assert_eq!(mix.time_offset, -3);
        assert_eq!(read(&out), vec![0, 0, 0, 500]);
        assert_eq!(mix.valid_bytes, 8);
    }
}
