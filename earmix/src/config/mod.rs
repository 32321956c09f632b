mod acoustics;
mod ear_desc;
mod earmix_desc;

pub use acoustics::{Acoustics, SPEED_OF_SOUND};
pub use ear_desc::EarDesc;
pub use earmix_desc::EarMixDesc;
