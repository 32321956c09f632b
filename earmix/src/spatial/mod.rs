// Spatial audio module
//
// Binaural synthesis without HRTFs: every output channel is a virtual
// microphone with its own position, facing axis, level and propagation delay.

mod ear;
mod listener;

pub use ear::{EarChannel, EarMix, EarResponse, angular_gain, distance_gain, time_offset_samples};
pub use listener::ListenerState;
