//! Ordered composition of augmentation stages.

use medseg_core::{AugmentationConfig, Result, Stage2dConfig, Stage3dConfig};
use ndarray::{Dimension, Ix2, Ix3};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::augmentation::{
    RandomDistort2d, RandomErase2d, RandomFlip2d, RandomGamma2d, RandomGaussianNoise2d,
    RandomRotate2d, RandomSaltPepper2d, RandomZoom2d,
};
use crate::sample::Sample;
use crate::volume::{RandomFlip3d, RandomTranslationRotationZoom3d};

/// A single sample-to-sample augmentation stage.
///
/// Stages hold only the parameters fixed at construction; all randomness
/// comes from the generator passed to [`Transform::apply`], so one stage can
/// serve many threads.
pub trait Transform<D: Dimension>: Send + Sync {
    /// Short stage name used in logs
    fn name(&self) -> &'static str;

    /// Applies the stage, returning a sample of the same shape.
    fn apply(&self, sample: Sample<D>, rng: &mut ChaCha8Rng) -> Sample<D>;
}

/// Creates the pipeline RNG, seeded when a seed is given.
pub fn rng_from_seed(seed: Option<u64>) -> ChaCha8Rng {
    match seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    }
}

/// Stages applied left to right.
pub struct Pipeline<D: Dimension> {
    stages: Vec<Box<dyn Transform<D>>>,
}

impl<D: Dimension> Default for Pipeline<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Dimension> Pipeline<D> {
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    /// Appends a stage.
    pub fn with_stage(mut self, stage: impl Transform<D> + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    pub fn push(&mut self, stage: Box<dyn Transform<D>>) {
        self.stages.push(stage);
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Runs every stage in order on one sample.
    pub fn apply(&self, sample: Sample<D>, rng: &mut ChaCha8Rng) -> Sample<D> {
        self.stages.iter().fold(sample, |sample, stage| {
            debug!("Applying stage {}", stage.name());
            stage.apply(sample, rng)
        })
    }

    /// Augments a batch in parallel.
    ///
    /// Sample `i` gets its own generator seeded with `seed + i`, so the output
    /// does not depend on how rayon schedules the work.
    pub fn apply_batch(&self, samples: Vec<Sample<D>>, seed: u64) -> Vec<Sample<D>> {
        let count = samples.len();
        let augmented: Vec<_> = samples
            .into_par_iter()
            .enumerate()
            .map(|(i, sample)| {
                let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(i as u64));
                self.apply(sample, &mut rng)
            })
            .collect();
        info!("Augmented batch of {} samples through {} stages", count, self.len());
        augmented
    }
}

impl Pipeline<Ix2> {
    /// Builds the slice pipeline described by `config.stages_2d`.
    pub fn from_config(config: &AugmentationConfig) -> Result<Self> {
        config.validate()?;
        let mut pipeline = Self::new();
        for stage in &config.stages_2d {
            let boxed: Box<dyn Transform<Ix2>> = match stage {
                Stage2dConfig::Erase(p) => Box::new(RandomErase2d::new(p.clone())?),
                Stage2dConfig::Flip(p) => Box::new(RandomFlip2d::new(p.mode)),
                Stage2dConfig::Rotate(p) => Box::new(RandomRotate2d::new(p.clone())?),
                Stage2dConfig::Zoom(p) => Box::new(RandomZoom2d::new(p.clone())?),
                Stage2dConfig::Gamma(p) => Box::new(RandomGamma2d::new(p.clone())?),
                Stage2dConfig::SaltPepper(p) => Box::new(RandomSaltPepper2d::new(p.clone())?),
                Stage2dConfig::GaussianNoise(p) => {
                    Box::new(RandomGaussianNoise2d::new(p.clone())?)
                }
                Stage2dConfig::Distort(p) => Box::new(RandomDistort2d::new(p.clone())?),
            };
            pipeline.push(boxed);
        }
        info!("Built 2D pipeline: {:?}", pipeline.stage_names());
        Ok(pipeline)
    }
}

impl Pipeline<Ix3> {
    /// Builds the volume pipeline described by `config.stages_3d`.
    pub fn from_config(config: &AugmentationConfig) -> Result<Self> {
        config.validate()?;
        let mut pipeline = Self::new();
        for stage in &config.stages_3d {
            let boxed: Box<dyn Transform<Ix3>> = match stage {
                Stage3dConfig::TranslateRotateZoom(p) => {
                    Box::new(RandomTranslationRotationZoom3d::new(p.clone())?)
                }
                Stage3dConfig::Flip(p) => Box::new(RandomFlip3d::new(p.mode)),
            };
            pipeline.push(boxed);
        }
        info!("Built 3D pipeline: {:?}", pipeline.stage_names());
        Ok(pipeline)
    }
}
