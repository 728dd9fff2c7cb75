//! 3D augmentation stages for `(depth, height, width)` volumes.

use medseg_core::{AffineParams3d, FlipAxis, FlipMode, Result};
use nalgebra::{Matrix3, Rotation3, Vector3};
use ndarray::{Array3, Axis, Ix3};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use crate::interpolate::trilinear_zero;
use crate::pipeline::Transform;
use crate::sample::{flip_axis, Sample3d};

/// Label threshold after resampling a binary class volume
const LABEL_THRESHOLD: f32 = 0.5;

/// One drawn set of affine parameters, in `(depth, height, width)` order.
#[derive(Debug, Clone, PartialEq)]
pub struct AffineDraw {
    pub translation: Vector3<f64>,
    /// Rotation about the depth axis, in degrees
    pub angle_deg: f64,
    pub zoom: Vector3<f64>,
}

impl Default for AffineDraw {
    fn default() -> Self {
        Self {
            translation: Vector3::zeros(),
            angle_deg: 0.0,
            zoom: Vector3::new(1.0, 1.0, 1.0),
        }
    }
}

impl AffineDraw {
    /// Linear part `R * diag(zoom)`.
    pub fn matrix(&self) -> Matrix3<f64> {
        let rotation = Rotation3::from_axis_angle(&Vector3::x_axis(), self.angle_deg.to_radians());
        rotation.matrix() * Matrix3::from_diagonal(&self.zoom)
    }
}

/// Random in-plane shift, rotation and zoom about the volume centre.
///
/// The image is resampled trilinearly. Labels are resampled one class at a
/// time and thresholded, so every output label is a class that was present.
pub struct RandomTranslationRotationZoom3d {
    params: AffineParams3d,
}

impl RandomTranslationRotationZoom3d {
    pub fn new(params: AffineParams3d) -> Result<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    /// Draws the enabled components; disabled ones stay at identity.
    pub fn draw(&self, rng: &mut ChaCha8Rng) -> AffineDraw {
        let mut draw = AffineDraw::default();
        let mode = self.params.mode;

        if mode.translate {
            let m = self.params.max_shift;
            draw.translation = Vector3::new(0.0, rng.gen_range(-m..=m), rng.gen_range(-m..=m));
        }
        if mode.rotate {
            let a = self.params.max_angle_deg;
            draw.angle_deg = rng.gen_range(-a..=a);
        }
        if mode.zoom {
            let (lo, hi) = self.params.zoom_range;
            draw.zoom = Vector3::new(1.0, rng.gen_range(lo..=hi), rng.gen_range(lo..=hi));
        }
        draw
    }

    /// Warps a volume with fixed affine parameters.
    pub fn apply_draw(&self, sample: Sample3d, draw: &AffineDraw) -> Sample3d {
        let (d, h, w) = sample.image.dim();
        let center = Vector3::new(d as f64 / 2.0, h as f64 / 2.0, w as f64 / 2.0);
        let matrix = draw.matrix();

        let sources = Array3::from_shape_fn((d, h, w), |(k, r, c)| {
            let p = Vector3::new(k as f64, r as f64, c as f64);
            matrix * (p - center) + draw.translation + center
        });

        let image_view = sample.image.view();
        let image = sources.mapv(|s| trilinear_zero(&image_view, s.x, s.y, s.z));

        let mut mask = Array3::<u8>::zeros((d, h, w));
        for class in 1..self.params.num_class {
            if !sample.mask.iter().any(|&v| v == class) {
                continue;
            }
            let binary = sample.mask.mapv(|v| if v == class { 1.0f32 } else { 0.0 });
            let binary_view = binary.view();
            // Ascending order, so a later class wins on overlap.
            ndarray::Zip::from(&mut mask)
                .and(&sources)
                .for_each(|out, s| {
                    if trilinear_zero(&binary_view, s.x, s.y, s.z) >= LABEL_THRESHOLD {
                        *out = class;
                    }
                });
        }

        Sample3d { image, mask }
    }
}

impl Transform<Ix3> for RandomTranslationRotationZoom3d {
    fn name(&self) -> &'static str {
        "random_translation_rotation_zoom_3d"
    }

    fn apply(&self, sample: Sample3d, rng: &mut ChaCha8Rng) -> Sample3d {
        if self.params.mode.is_identity() {
            return sample;
        }
        let draw = self.draw(rng);
        debug!(
            "3D affine: shift ({:.2}, {:.2}), angle {:.2}, zoom ({:.3}, {:.3})",
            draw.translation.y, draw.translation.z, draw.angle_deg, draw.zoom.y, draw.zoom.z
        );
        self.apply_draw(sample, &draw)
    }
}

/// Mirrors a volume along its height or width axis.
pub struct RandomFlip3d {
    mode: FlipMode,
}

impl RandomFlip3d {
    pub fn new(mode: FlipMode) -> Self {
        Self { mode }
    }

    pub fn apply_with_factor(&self, sample: Sample3d, factor: f64) -> Sample3d {
        let axis = match self.mode.decide(factor) {
            Some(FlipAxis::Horizontal) => Axis(1),
            Some(FlipAxis::Vertical) => Axis(2),
            None => return sample,
        };
        Sample3d {
            image: flip_axis(&sample.image, axis),
            mask: flip_axis(&sample.mask, axis),
        }
    }
}

impl Transform<Ix3> for RandomFlip3d {
    fn name(&self) -> &'static str {
        "random_flip_3d"
    }

    fn apply(&self, sample: Sample3d, rng: &mut ChaCha8Rng) -> Sample3d {
        let factor = rng.gen::<f64>();
        self.apply_with_factor(sample, factor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::Sample;
    use medseg_core::AffineMode;
    use ndarray::array;
    use rand::SeedableRng;

    fn create_test_volume() -> Sample3d {
        let image = Array3::from_shape_fn((3, 24, 20), |(d, h, w)| (d * 480 + h * 20 + w) as f32);
        let mask = Array3::from_shape_fn((3, 24, 20), |(_, h, w)| {
            if (6..14).contains(&h) && (5..12).contains(&w) {
                1
            } else {
                0
            }
        });
        Sample::new(image, mask).unwrap()
    }

    fn stage(mode: &str, num_class: u8) -> RandomTranslationRotationZoom3d {
        RandomTranslationRotationZoom3d::new(AffineParams3d {
            mode: mode.parse().unwrap(),
            num_class,
            ..AffineParams3d::default()
        })
        .unwrap()
    }

    #[test]
    fn test_identity_mode_returns_input() {
        let sample = create_test_volume();
        let stage = stage("", 2);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        assert_eq!(stage.apply(sample.clone(), &mut rng), sample);
    }

    #[test]
    fn test_zero_draw_reproduces_volume() {
        let sample = create_test_volume();
        let out = stage("trz", 2).apply_draw(sample.clone(), &AffineDraw::default());
        assert_eq!(out, sample);
    }

    #[test]
    fn test_later_class_overwrites_earlier() {
        let image = Array3::<f32>::zeros((1, 1, 4));
        let mask = array![[[0u8, 1, 2, 0]]];
        let sample = Sample::new(image, mask).unwrap();
        let draw = AffineDraw {
            translation: Vector3::new(0.0, 0.0, 0.5),
            ..AffineDraw::default()
        };

        let out = stage("t", 3).apply_draw(sample, &draw);
        // Voxel 1 samples halfway between classes 1 and 2.
        assert_eq!(out.mask, array![[[1u8, 2, 2, 0]]]);
    }

    #[test]
    fn test_labels_beyond_num_class_dropped() {
        let image = Array3::<f32>::zeros((1, 2, 2));
        let mask = array![[[1u8, 3], [0, 1]]];
        let sample = Sample::new(image, mask).unwrap();
        let out = stage("t", 2).apply_draw(sample, &AffineDraw::default());
        assert_eq!(out.mask, array![[[1u8, 0], [0, 1]]]);
    }

    #[test]
    fn test_random_affine_keeps_shape_and_labels() {
        let stage = stage("trz", 2);
        let sample = create_test_volume();
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        for _ in 0..5 {
            let out = stage.apply(sample.clone(), &mut rng);
            assert_eq!(out.shape(), &[3, 24, 20]);
            assert!(out.label_set().is_subset(&sample.label_set()));
            assert!(out.has_foreground());
        }
    }

    #[test]
    fn test_draw_respects_mode_and_bounds() {
        let mut rng = ChaCha8Rng::seed_from_u64(8);
        let rotate_only = stage("r", 2);
        for _ in 0..20 {
            let draw = rotate_only.draw(&mut rng);
            assert_eq!(draw.translation, Vector3::zeros());
            assert_eq!(draw.zoom, Vector3::new(1.0, 1.0, 1.0));
            assert!(draw.angle_deg.abs() <= 5.0);
        }

        let full = stage("trz", 2);
        for _ in 0..20 {
            let draw = full.draw(&mut rng);
            assert_eq!(draw.translation.x, 0.0);
            assert!(draw.translation.y.abs() <= 5.0 && draw.translation.z.abs() <= 5.0);
            assert_eq!(draw.zoom.x, 1.0);
            assert!((0.9..=1.1).contains(&draw.zoom.y));
        }
    }

    #[test]
    fn test_rotation_leaves_depth_axis() {
        let draw = AffineDraw {
            angle_deg: 30.0,
            ..AffineDraw::default()
        };
        let m = draw.matrix();
        assert_eq!(m * Vector3::new(1.0, 0.0, 0.0), Vector3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn test_affine_mode_parse_in_params() {
        assert_eq!(stage("z", 2).params.mode, AffineMode { translate: false, rotate: false, zoom: true });
        assert!(RandomTranslationRotationZoom3d::new(AffineParams3d {
            num_class: 0,
            ..AffineParams3d::default()
        })
        .is_err());
    }

    #[test]
    fn test_flip3d_axes() {
        let sample = create_test_volume();

        let h = RandomFlip3d::new(FlipMode::Horizontal).apply_with_factor(sample.clone(), 0.9);
        assert_eq!(h.image[[1, 0, 4]], sample.image[[1, 23, 4]]);
        assert!(h.image.is_standard_layout());

        let v = RandomFlip3d::new(FlipMode::Vertical).apply_with_factor(sample.clone(), 0.9);
        assert_eq!(v.image[[2, 7, 0]], sample.image[[2, 7, 19]]);
        assert_eq!(v.mask[[0, 7, 19 - 5]], sample.mask[[0, 7, 5]]);
    }

    #[test]
    fn test_flip3d_is_involution() {
        let sample = create_test_volume();
        let flip = RandomFlip3d::new(FlipMode::Both);
        for factor in [0.1, 0.45, 0.7] {
            let twice =
                flip.apply_with_factor(flip.apply_with_factor(sample.clone(), factor), factor);
            assert_eq!(twice, sample);
        }
    }
}
