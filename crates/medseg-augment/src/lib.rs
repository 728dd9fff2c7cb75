//! Paired image/mask augmentation for medical segmentation.
//!
//! Slices (`(H, W)`) and volumes (`(D, H, W)`) travel through a
//! [`Pipeline`] of stages that move the image and its label mask together.
//! All randomness comes from a caller-supplied `ChaCha8Rng`, so a seed fully
//! determines the output.

pub mod augmentation;
pub mod interpolate;
pub mod pipeline;
pub mod sample;
pub mod volume;

pub use augmentation::{
    EraseDirection, RandomDistort2d, RandomErase2d, RandomFlip2d, RandomGamma2d,
    RandomGaussianNoise2d, RandomRotate2d, RandomSaltPepper2d, RandomZoom2d, RoiWindow,
};
pub use pipeline::{rng_from_seed, Pipeline, Transform};
pub use sample::{Sample, Sample2d, Sample3d};
pub use volume::{AffineDraw, RandomFlip3d, RandomTranslationRotationZoom3d};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::augmentation::*;
    pub use crate::pipeline::*;
    pub use crate::sample::*;
    pub use crate::volume::*;
    pub use medseg_core::prelude::*;
}
