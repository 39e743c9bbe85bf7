//! Clip step implementations.
//!
//! Each step handles one stage of turning a source clip into a mouth crop.

mod align;
mod audio;
mod detect;
mod smooth;

pub use align::AlignStep;
pub use audio::AudioStep;
pub use detect::DetectStep;
pub use smooth::SmoothStep;
