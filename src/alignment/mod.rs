//! Alignment stages: rotation removal and resampling into an aligned light
//! field.
pub mod interp;
pub mod resample;
pub mod rotator;

pub use resample::{align_patch, pitch_eval, stretched_cols, AlignedLightField, ResamplingEngine};
pub use rotator::Rotator;
