//! Image/mask pairs passed through augmentation pipelines.

use std::collections::BTreeSet;

use image::GrayImage;
use medseg_core::{Error, Result};
use ndarray::{Array, Array2, Axis, Dimension, Ix2, Ix3};

/// An intensity array and its label array of identical shape.
///
/// The mask holds class indices with 0 as background. The shape check
/// happens once in [`Sample::new`]; every stage preserves it.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample<D: Dimension> {
    pub(crate) image: Array<f32, D>,
    pub(crate) mask: Array<u8, D>,
}

/// A single slice, `(height, width)`
pub type Sample2d = Sample<Ix2>;

/// A volume, `(depth, height, width)`
pub type Sample3d = Sample<Ix3>;

impl<D: Dimension> Sample<D> {
    /// Pairs an image with its mask, rejecting unequal shapes.
    pub fn new(image: Array<f32, D>, mask: Array<u8, D>) -> Result<Self> {
        if image.shape() != mask.shape() {
            return Err(Error::ShapeMismatch {
                image: image.shape().to_vec(),
                mask: mask.shape().to_vec(),
            });
        }
        Ok(Self { image, mask })
    }

    pub fn image(&self) -> &Array<f32, D> {
        &self.image
    }

    pub fn mask(&self) -> &Array<u8, D> {
        &self.mask
    }

    pub fn shape(&self) -> &[usize] {
        self.image.shape()
    }

    pub fn into_parts(self) -> (Array<f32, D>, Array<u8, D>) {
        (self.image, self.mask)
    }

    /// Distinct label values present in the mask.
    pub fn label_set(&self) -> BTreeSet<u8> {
        self.mask.iter().copied().collect()
    }

    /// Whether the mask has any foreground voxel.
    pub fn has_foreground(&self) -> bool {
        self.mask.iter().any(|&v| v != 0)
    }
}

impl Sample2d {
    /// Builds a slice from 8-bit grayscale images, scaling intensities to `[0, 1]`.
    ///
    /// Mask pixels are taken as class indices unchanged.
    pub fn from_gray_images(image: &GrayImage, mask: &GrayImage) -> Result<Self> {
        let (w, h) = image.dimensions();
        let (mw, mh) = mask.dimensions();
        if (w, h) != (mw, mh) {
            return Err(Error::ShapeMismatch {
                image: vec![h as usize, w as usize],
                mask: vec![mh as usize, mw as usize],
            });
        }

        let shape = (h as usize, w as usize);
        let image = Array2::from_shape_vec(
            shape,
            image.as_raw().iter().map(|&p| p as f32 / 255.0).collect(),
        )
        .map_err(|e| Error::Image(e.to_string()))?;
        let mask = Array2::from_shape_vec(shape, mask.as_raw().clone())
            .map_err(|e| Error::Image(e.to_string()))?;

        Self::new(image, mask)
    }

    /// Converts back to 8-bit grayscale images, clamping intensities to `[0, 1]`.
    pub fn to_gray_images(&self) -> Result<(GrayImage, GrayImage)> {
        let (h, w) = self.image.dim();
        let pixels = self
            .image
            .iter()
            .map(|&v| (v.clamp(0.0, 1.0) * 255.0).round() as u8)
            .collect();
        let image = GrayImage::from_raw(w as u32, h as u32, pixels)
            .ok_or_else(|| Error::Image("image buffer size mismatch".to_string()))?;
        let mask = GrayImage::from_raw(w as u32, h as u32, self.mask.iter().copied().collect())
            .ok_or_else(|| Error::Image("mask buffer size mismatch".to_string()))?;
        Ok((image, mask))
    }
}

/// Mirrors an array along `axis`, returning a fresh standard-layout copy.
pub fn flip_axis<A: Clone, D: Dimension>(array: &Array<A, D>, axis: Axis) -> Array<A, D> {
    let mut view = array.view();
    view.invert_axis(axis);
    view.as_standard_layout().into_owned()
}

/// Inclusive `(min, max)` row and column indices of non-zero mask pixels.
pub fn nonzero_bounds(mask: &Array2<u8>) -> Option<((usize, usize), (usize, usize))> {
    let mut bounds: Option<((usize, usize), (usize, usize))> = None;
    for ((r, c), &v) in mask.indexed_iter() {
        if v == 0 {
            continue;
        }
        bounds = Some(match bounds {
            None => ((r, r), (c, c)),
            Some(((r0, r1), (c0, c1))) => ((r0.min(r), r1.max(r)), (c0.min(c), c1.max(c))),
        });
    }
    bounds
}
