//! 2D augmentation stages for image/mask slices.
//!
//! Geometric stages (flip, rotate, zoom, distort) move image and mask
//! together; the image is interpolated bilinearly and the mask by nearest
//! neighbour, so no fractional class values appear. Intensity stages
//! (gamma, noise, erase) leave the mask untouched.

use medseg_core::{
    DistortParams, EraseParams, FlipAxis, FlipMode, GammaParams, GaussianNoiseParams, Result,
    RotateParams, SaltPepperParams, ZoomParams,
};
use ndarray::{s, Array2, Axis, Ix2};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use crate::interpolate::{
    bilinear_reflect, bilinear_zero, gaussian_blur, nearest_reflect, nearest_zero,
    resize_bilinear, resize_nearest, resize_triangle,
};
use crate::pipeline::Transform;
use crate::sample::{flip_axis, nonzero_bounds, Sample2d};

/// Extent of the fallback window drawn when the mask is empty
const FALLBACK_WINDOW: usize = 64;

/// Region protected from erasing, as half-open row and column ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoiWindow {
    pub rows: (usize, usize),
    pub cols: (usize, usize),
}

/// Border strip zeroed by [`RandomErase2d`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EraseDirection {
    Top,
    Bottom,
    Left,
    Right,
}

impl EraseDirection {
    const ALL: [EraseDirection; 4] = [
        EraseDirection::Top,
        EraseDirection::Bottom,
        EraseDirection::Left,
        EraseDirection::Right,
    ];
}

/// Zeroes one image border strip outside the labelled region.
pub struct RandomErase2d {
    params: EraseParams,
}

impl RandomErase2d {
    pub fn new(params: EraseParams) -> Result<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    /// ROI around the foreground, widened by half the window on each side.
    ///
    /// An empty mask gets a random window instead. Both ends are clamped to
    /// the array.
    pub fn roi_window(
        mask: &Array2<u8>,
        window: (usize, usize),
        rng: &mut ChaCha8Rng,
    ) -> RoiWindow {
        let (h, w) = mask.dim();
        let (max_h, max_w) = window;

        match nonzero_bounds(mask) {
            Some(((r0, r1), (c0, c1))) => RoiWindow {
                rows: (r0.saturating_sub(max_h / 2), (r1 + max_h / 2).min(h)),
                cols: (c0.saturating_sub(max_w / 2), (c1 + max_w / 2).min(w)),
            },
            None => {
                let mut fallback = |len: usize| {
                    let start = rng.gen_range(0..=FALLBACK_WINDOW).min(len);
                    let end = len.saturating_sub(rng.gen_range(0..=FALLBACK_WINDOW));
                    (start, end)
                };
                let rows = fallback(h);
                let cols = fallback(w);
                RoiWindow { rows, cols }
            }
        }
    }

    /// Zeroes the strip on the `direction` side of the ROI.
    pub fn erase(image: &mut Array2<f32>, roi: &RoiWindow, direction: EraseDirection) {
        match direction {
            EraseDirection::Top => image.slice_mut(s![..roi.rows.0, ..]).fill(0.0),
            EraseDirection::Bottom => image.slice_mut(s![roi.rows.1.., ..]).fill(0.0),
            EraseDirection::Left => image.slice_mut(s![.., ..roi.cols.0]).fill(0.0),
            EraseDirection::Right => image.slice_mut(s![.., roi.cols.1..]).fill(0.0),
        }
    }

    fn window(&self, rng: &mut ChaCha8Rng) -> (usize, usize) {
        let (wh, ww) = self.params.window_size;
        if self.params.scale_flag {
            let h_factor: f64 = rng.gen_range(0.5..1.0);
            let w_factor: f64 = rng.gen_range(0.5..1.0);
            ((wh as f64 * h_factor) as usize, (ww as f64 * w_factor) as usize)
        } else {
            (wh, ww)
        }
    }
}

impl Transform<Ix2> for RandomErase2d {
    fn name(&self) -> &'static str {
        "random_erase_2d"
    }

    fn apply(&self, mut sample: Sample2d, rng: &mut ChaCha8Rng) -> Sample2d {
        let window = self.window(rng);
        let roi = Self::roi_window(&sample.mask, window, rng);

        if rng.gen::<f64>() > self.params.prob {
            let direction = EraseDirection::ALL[rng.gen_range(0..EraseDirection::ALL.len())];
            debug!("Erasing {:?} of ROI {:?}", direction, roi);
            Self::erase(&mut sample.image, &roi, direction);
        }
        sample
    }
}

/// Mirrors image and mask left-right and/or top-bottom.
pub struct RandomFlip2d {
    mode: FlipMode,
}

impl RandomFlip2d {
    pub fn new(mode: FlipMode) -> Self {
        Self { mode }
    }

    /// Applies the flip selected by a given uniform draw.
    pub fn apply_with_factor(&self, sample: Sample2d, factor: f64) -> Sample2d {
        match self.mode.decide(factor) {
            Some(axis) => {
                // Columns mirror for left-right, rows for top-bottom.
                let axis = match axis {
                    FlipAxis::Horizontal => Axis(1),
                    FlipAxis::Vertical => Axis(0),
                };
                Sample2d {
                    image: flip_axis(&sample.image, axis),
                    mask: flip_axis(&sample.mask, axis),
                }
            }
            None => sample,
        }
    }
}

impl Transform<Ix2> for RandomFlip2d {
    fn name(&self) -> &'static str {
        "random_flip_2d"
    }

    fn apply(&self, sample: Sample2d, rng: &mut ChaCha8Rng) -> Sample2d {
        let factor = rng.gen::<f64>();
        self.apply_with_factor(sample, factor)
    }
}

/// Rotates by one of a fixed set of angles.
pub struct RandomRotate2d {
    params: RotateParams,
}

impl RandomRotate2d {
    pub fn new(params: RotateParams) -> Result<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    /// Rotates counter-clockwise about the image centre, keeping the size.
    ///
    /// Uncovered corners are filled with 0.
    pub fn rotate(sample: Sample2d, degrees: f64) -> Sample2d {
        if degrees == 0.0 {
            return sample;
        }

        let (h, w) = sample.image.dim();
        let (sin, cos) = degrees.to_radians().sin_cos();
        let cy = h as f64 / 2.0;
        let cx = w as f64 / 2.0;

        // Inverse map from output pixel centre to source position.
        let source = |r: usize, c: usize| {
            let dx = c as f64 + 0.5 - cx;
            let dy = r as f64 + 0.5 - cy;
            let sx = cx + cos * dx - sin * dy;
            let sy = cy + sin * dx + cos * dy;
            (sy - 0.5, sx - 0.5)
        };

        let image_view = sample.image.view();
        let mask_view = sample.mask.view();
        let image = Array2::from_shape_fn((h, w), |(r, c)| {
            let (y, x) = source(r, c);
            bilinear_zero(&image_view, y, x)
        });
        let mask = Array2::from_shape_fn((h, w), |(r, c)| {
            let (y, x) = source(r, c);
            nearest_zero(&mask_view, y, x)
        });

        Sample2d { image, mask }
    }
}

impl Transform<Ix2> for RandomRotate2d {
    fn name(&self) -> &'static str {
        "random_rotate_2d"
    }

    fn apply(&self, sample: Sample2d, rng: &mut ChaCha8Rng) -> Sample2d {
        let degrees = self.params.degrees[rng.gen_range(0..self.params.degrees.len())];
        debug!("Rotating by {} degrees", degrees);
        Self::rotate(sample, degrees)
    }
}

/// Zooms in by an ROI-biased crop or out by asymmetric padding, keeping the size.
pub struct RandomZoom2d {
    params: ZoomParams,
}

impl RandomZoom2d {
    pub fn new(params: ZoomParams) -> Result<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    /// Inclusive range of crop offsets along one axis.
    ///
    /// With foreground `[lo, hi]` the crop starts no later than `lo` and, when
    /// the crop is long enough, no earlier than `hi - target`.
    fn offset_range(bounds: Option<(usize, usize)>, len: usize, target: usize) -> (usize, usize) {
        let room = len - target;
        match bounds {
            Some((lo, hi)) => {
                let max = lo.min(room);
                (lo.min(hi.saturating_sub(target)).min(max), max)
            }
            None => (0, room),
        }
    }

    fn crop(sample: Sample2d, scale: f64, rng: &mut ChaCha8Rng) -> Sample2d {
        let (h, w) = sample.image.dim();
        let th = ((h as f64 * scale) as usize).clamp(1, h);
        let tw = ((w as f64 * scale) as usize).clamp(1, w);

        let bounds = nonzero_bounds(&sample.mask);
        let (row_lo, row_hi) = Self::offset_range(bounds.map(|b| b.0), h, th);
        let (col_lo, col_hi) = Self::offset_range(bounds.map(|b| b.1), w, tw);
        let x1 = rng.gen_range(col_lo..=col_hi);
        let y1 = rng.gen_range(row_lo..=row_hi);
        debug!("Zoom crop {}x{} at ({}, {})", th, tw, y1, x1);

        let image = sample.image.slice(s![y1..y1 + th, x1..x1 + tw]);
        let mask = sample.mask.slice(s![y1..y1 + th, x1..x1 + tw]);
        Sample2d {
            image: resize_triangle(&image, (h, w)),
            mask: resize_nearest(&mask, (h, w)),
        }
    }

    fn pad(sample: Sample2d, scale: f64, rng: &mut ChaCha8Rng) -> Sample2d {
        let (h, w) = sample.image.dim();
        let th = (h as f64 * scale) as usize;
        let tw = (w as f64 * scale) as usize;
        let (ph, pw) = (th.saturating_sub(h), tw.saturating_sub(w));

        let pad_left = rng.gen_range(0.0..=pw as f64 / 2.0) as usize;
        let pad_top = rng.gen_range(0.0..=ph as f64 / 2.0) as usize;
        debug!("Zoom pad top {} left {} to {}x{}", pad_top, pad_left, th, tw);

        // Leading pad is drawn, trailing pad always adds the full growth.
        let canvas = (h + pad_top + ph, w + pad_left + pw);
        let mut image = Array2::<f32>::zeros(canvas);
        let mut mask = Array2::<u8>::zeros(canvas);
        image
            .slice_mut(s![pad_top..pad_top + h, pad_left..pad_left + w])
            .assign(&sample.image);
        mask.slice_mut(s![pad_top..pad_top + h, pad_left..pad_left + w])
            .assign(&sample.mask);

        Sample2d {
            image: resize_triangle(&image.view(), (h, w)),
            mask: resize_nearest(&mask.view(), (h, w)),
        }
    }

    /// Applies a zoom with the given scale factor.
    ///
    /// A sample with no rows or no columns is returned unchanged.
    pub fn zoom(sample: Sample2d, scale: f64, rng: &mut ChaCha8Rng) -> Sample2d {
        let (h, w) = sample.image.dim();
        if h == 0 || w == 0 {
            return sample;
        }
        if scale < 1.0 {
            Self::crop(sample, scale, rng)
        } else {
            Self::pad(sample, scale, rng)
        }
    }
}

impl Transform<Ix2> for RandomZoom2d {
    fn name(&self) -> &'static str {
        "random_zoom_2d"
    }

    fn apply(&self, sample: Sample2d, rng: &mut ChaCha8Rng) -> Sample2d {
        let (lo, hi) = self.params.scale;
        let scale = rng.gen_range(lo..=hi);
        Self::zoom(sample, scale, rng)
    }
}

/// Power-law intensity remapping.
pub struct RandomGamma2d {
    params: GammaParams,
}

impl RandomGamma2d {
    pub fn new(params: GammaParams) -> Result<Self> {
        params.validate()?;
        Ok(Self { params })
    }
}

impl Transform<Ix2> for RandomGamma2d {
    fn name(&self) -> &'static str {
        "random_gamma_2d"
    }

    fn apply(&self, mut sample: Sample2d, rng: &mut ChaCha8Rng) -> Sample2d {
        let (lo, hi) = self.params.scale;
        let gamma = rng.gen_range(lo..=hi) as f32;
        let gain = self.params.gain as f32;
        debug!("Gamma {:.3}", gamma);
        // Negative intensities have no real power; they map to 0.
        sample
            .image
            .mapv_inplace(|v| gain * v.max(0.0).powf(gamma));
        sample
    }
}

/// Replaces a fraction of pixels with the extreme intensities.
pub struct RandomSaltPepper2d {
    params: SaltPepperParams,
}

impl RandomSaltPepper2d {
    pub fn new(params: SaltPepperParams) -> Result<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    /// Applies the noise unconditionally.
    pub fn add_noise(&self, image: &mut Array2<f32>, rng: &mut ChaCha8Rng) {
        let low = if image.iter().any(|&v| v < 0.0) { -1.0 } else { 0.0 };
        let amount = self.params.amount;
        let salt = self.params.salt_vs_pepper;

        image.mapv_inplace(|v| {
            if rng.gen::<f64>() < amount {
                if rng.gen::<f64>() < salt {
                    1.0
                } else {
                    low
                }
            } else {
                v.clamp(low, 1.0)
            }
        });
    }
}

impl Transform<Ix2> for RandomSaltPepper2d {
    fn name(&self) -> &'static str {
        "random_salt_pepper_2d"
    }

    fn apply(&self, mut sample: Sample2d, rng: &mut ChaCha8Rng) -> Sample2d {
        if rng.gen::<f64>() > 1.0 - self.params.prob {
            debug!("Adding salt-and-pepper noise");
            self.add_noise(&mut sample.image, rng);
        }
        sample
    }
}

/// Adds zero-mean Gaussian noise to the image.
pub struct RandomGaussianNoise2d {
    params: GaussianNoiseParams,
}

impl RandomGaussianNoise2d {
    pub fn new(params: GaussianNoiseParams) -> Result<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    /// Standard normal draw via Box-Muller.
    fn standard_normal(rng: &mut ChaCha8Rng) -> f64 {
        // 1 - U(0, 1) lies in (0, 1], keeping ln finite.
        let u1 = 1.0 - rng.gen::<f64>();
        let u2 = rng.gen::<f64>();
        (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
    }
}

impl Transform<Ix2> for RandomGaussianNoise2d {
    fn name(&self) -> &'static str {
        "random_gaussian_noise_2d"
    }

    fn apply(&self, mut sample: Sample2d, rng: &mut ChaCha8Rng) -> Sample2d {
        if rng.gen::<f64>() > 1.0 - self.params.prob {
            debug!("Adding gaussian noise, std {}", self.params.std);
            let std = self.params.std;
            sample
                .image
                .mapv_inplace(|v| v + (Self::standard_normal(rng) * std) as f32);
        }
        sample
    }
}

/// Elastic deformation through a smooth random displacement field.
pub struct RandomDistort2d {
    params: DistortParams,
}

impl RandomDistort2d {
    pub fn new(params: DistortParams) -> Result<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    /// Draws a displacement field of shape `shape`, smoothed on a coarse grid.
    fn displacement(&self, shape: (usize, usize), rng: &mut ChaCha8Rng) -> Array2<f32> {
        let scale = self.params.grid_scale;
        let alpha = (self.params.alpha / scale) as f32;
        let sigma = self.params.sigma / scale;
        let ksize = (4 * sigma as usize) | 1;

        let grid = (
            (shape.0 / scale as usize).max(1),
            (shape.1 / scale as usize).max(1),
        );
        let noise = Array2::from_shape_fn(grid, |_| rng.gen::<f32>() * 2.0 - 1.0);
        let field = gaussian_blur(&noise, ksize, sigma as f64) * alpha;

        if scale > 1 {
            resize_bilinear(&field.view(), shape)
        } else {
            field
        }
    }

    /// Remaps the sample through per-pixel offsets `(dy, dx)`.
    pub fn remap(sample: Sample2d, dy: &Array2<f32>, dx: &Array2<f32>) -> Sample2d {
        let shape = sample.image.dim();
        let image_view = sample.image.view();
        let mask_view = sample.mask.view();

        let image = Array2::from_shape_fn(shape, |(r, c)| {
            let y = r as f64 + dy[[r, c]] as f64;
            let x = c as f64 + dx[[r, c]] as f64;
            bilinear_reflect(&image_view, y, x)
        });
        let mask = Array2::from_shape_fn(shape, |(r, c)| {
            let y = r as f64 + dy[[r, c]] as f64;
            let x = c as f64 + dx[[r, c]] as f64;
            nearest_reflect(&mask_view, y, x)
        });

        Sample2d { image, mask }
    }
}

impl Transform<Ix2> for RandomDistort2d {
    fn name(&self) -> &'static str {
        "random_distort_2d"
    }

    fn apply(&self, sample: Sample2d, rng: &mut ChaCha8Rng) -> Sample2d {
        if rng.gen::<f64>() >= self.params.prob {
            return sample;
        }
        let shape = sample.image.dim();
        let dx = self.displacement(shape, rng);
        let dy = self.displacement(shape, rng);
        debug!(
            "Elastic distortion, max |dx| {:.2}",
            dx.iter().fold(0.0f32, |m, v| m.max(v.abs()))
        );
        Self::remap(sample, &dy, &dx)
    }
}
