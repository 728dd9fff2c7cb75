//! Sampling and resampling kernels used by the geometric stages.
//!
//! Coordinates are fractional array indices (`row`, `col`), so pixel `i`
//! sits exactly at `i`. Two boundary rules exist: zero fill (rotation, 3D
//! warp) and reflect-101 (elastic distortion), matching what each stage
//! needs at the image border.

use image::imageops::{self, FilterType};
use image::{ImageBuffer, Luma};
use ndarray::{Array2, ArrayView2, ArrayView3};

/// Reflects an index into `[0, n)` without repeating the edge pixel
/// (`... 2 1 | 0 1 2 ... n-1 | n-2 ...`).
pub fn reflect101(i: isize, n: usize) -> usize {
    if n == 1 {
        return 0;
    }
    let period = 2 * n as isize - 2;
    let m = i.rem_euclid(period);
    if m >= n as isize {
        (period - m) as usize
    } else {
        m as usize
    }
}

fn fetch_zero(src: &ArrayView2<f32>, r: isize, c: isize) -> f32 {
    let (h, w) = src.dim();
    if r < 0 || c < 0 || r >= h as isize || c >= w as isize {
        0.0
    } else {
        src[[r as usize, c as usize]]
    }
}

/// Bilinear sample; neighbours outside the array contribute zero.
pub fn bilinear_zero(src: &ArrayView2<f32>, y: f64, x: f64) -> f32 {
    let y0 = y.floor();
    let x0 = x.floor();
    let dy = (y - y0) as f32;
    let dx = (x - x0) as f32;
    let (r, c) = (y0 as isize, x0 as isize);

    fetch_zero(src, r, c) * (1.0 - dx) * (1.0 - dy)
        + fetch_zero(src, r, c + 1) * dx * (1.0 - dy)
        + fetch_zero(src, r + 1, c) * (1.0 - dx) * dy
        + fetch_zero(src, r + 1, c + 1) * dx * dy
}

/// Nearest-neighbour sample; positions outside the array give `T::default()`.
pub fn nearest_zero<T: Copy + Default>(src: &ArrayView2<T>, y: f64, x: f64) -> T {
    let (h, w) = src.dim();
    let r = y.round();
    let c = x.round();
    if r < 0.0 || c < 0.0 || r >= h as f64 || c >= w as f64 {
        T::default()
    } else {
        src[[r as usize, c as usize]]
    }
}

/// Bilinear sample with reflect-101 borders.
pub fn bilinear_reflect(src: &ArrayView2<f32>, y: f64, x: f64) -> f32 {
    let (h, w) = src.dim();
    let y0 = y.floor();
    let x0 = x.floor();
    let dy = (y - y0) as f32;
    let dx = (x - x0) as f32;

    let r0 = reflect101(y0 as isize, h);
    let r1 = reflect101(y0 as isize + 1, h);
    let c0 = reflect101(x0 as isize, w);
    let c1 = reflect101(x0 as isize + 1, w);

    src[[r0, c0]] * (1.0 - dx) * (1.0 - dy)
        + src[[r0, c1]] * dx * (1.0 - dy)
        + src[[r1, c0]] * (1.0 - dx) * dy
        + src[[r1, c1]] * dx * dy
}

/// Nearest-neighbour sample with reflect-101 borders.
pub fn nearest_reflect<T: Copy>(src: &ArrayView2<T>, y: f64, x: f64) -> T {
    let (h, w) = src.dim();
    src[[
        reflect101(y.round() as isize, h),
        reflect101(x.round() as isize, w),
    ]]
}

/// Resizes with bilinear interpolation on pixel centres, clamping at the edges.
pub fn resize_bilinear(src: &ArrayView2<f32>, out: (usize, usize)) -> Array2<f32> {
    let (h, w) = src.dim();
    if h == 0 || w == 0 {
        return Array2::zeros(out);
    }
    let (oh, ow) = out;
    let scale_y = h as f64 / oh as f64;
    let scale_x = w as f64 / ow as f64;

    Array2::from_shape_fn(out, |(i, j)| {
        let sy = ((i as f64 + 0.5) * scale_y - 0.5).clamp(0.0, (h - 1) as f64);
        let sx = ((j as f64 + 0.5) * scale_x - 0.5).clamp(0.0, (w - 1) as f64);
        let y0 = sy.floor() as usize;
        let x0 = sx.floor() as usize;
        let y1 = (y0 + 1).min(h - 1);
        let x1 = (x0 + 1).min(w - 1);
        let dy = (sy - y0 as f64) as f32;
        let dx = (sx - x0 as f64) as f32;

        src[[y0, x0]] * (1.0 - dx) * (1.0 - dy)
            + src[[y0, x1]] * dx * (1.0 - dy)
            + src[[y1, x0]] * (1.0 - dx) * dy
            + src[[y1, x1]] * dx * dy
    })
}

/// Resizes with `imageops`' triangle filter, which antialiases when shrinking.
///
/// `imageops` clamps float pixels to `[0, 1]`, so intensities are mapped
/// linearly onto that range and back. Same-size input is returned as is.
pub fn resize_triangle(src: &ArrayView2<f32>, out: (usize, usize)) -> Array2<f32> {
    let (h, w) = src.dim();
    if (h, w) == out {
        return src.to_owned();
    }
    let (oh, ow) = out;
    let (lo, hi) = src
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let range = hi - lo;
    if h == 0 || w == 0 || oh == 0 || ow == 0 || !(range > 0.0) {
        let fill = if lo.is_finite() { lo } else { 0.0 };
        return Array2::from_elem(out, fill);
    }

    let pixels = src.iter().map(|&v| (v - lo) / range).collect();
    let resized = ImageBuffer::<Luma<f32>, Vec<f32>>::from_raw(w as u32, h as u32, pixels)
        .map(|buffer| imageops::resize(&buffer, ow as u32, oh as u32, FilterType::Triangle));

    match resized {
        Some(buffer) => Array2::from_shape_vec(
            out,
            buffer.into_raw().into_iter().map(|v| v * range + lo).collect(),
        )
        .unwrap_or_else(|_| resize_bilinear(src, out)),
        None => resize_bilinear(src, out),
    }
}

/// Resizes by picking the source pixel whose area contains each output centre.
///
/// An empty source gives `T::default()` everywhere.
pub fn resize_nearest<T: Copy + Default>(src: &ArrayView2<T>, out: (usize, usize)) -> Array2<T> {
    let (h, w) = src.dim();
    if h == 0 || w == 0 {
        return Array2::from_elem(out, T::default());
    }
    let (oh, ow) = out;
    let scale_y = h as f64 / oh as f64;
    let scale_x = w as f64 / ow as f64;

    Array2::from_shape_fn(out, |(i, j)| {
        let r = (((i as f64 + 0.5) * scale_y) as usize).min(h - 1);
        let c = (((j as f64 + 0.5) * scale_x) as usize).min(w - 1);
        src[[r, c]]
    })
}

/// Normalised 1D Gaussian weights of odd length `ksize`.
///
/// A non-positive sigma is derived from the kernel size.
pub fn gaussian_kernel(ksize: usize, sigma: f64) -> Vec<f32> {
    let sigma = if sigma > 0.0 {
        sigma
    } else {
        0.3 * ((ksize as f64 - 1.0) * 0.5 - 1.0) + 0.8
    };
    let center = (ksize as f64 - 1.0) / 2.0;
    let weights: Vec<f64> = (0..ksize)
        .map(|i| {
            let x = i as f64 - center;
            (-(x * x) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let sum: f64 = weights.iter().sum();
    weights.into_iter().map(|v| (v / sum) as f32).collect()
}

/// Separable Gaussian blur with reflect-101 borders.
pub fn gaussian_blur(src: &Array2<f32>, ksize: usize, sigma: f64) -> Array2<f32> {
    let kernel = gaussian_kernel(ksize, sigma);
    let half = (ksize / 2) as isize;
    let (h, w) = src.dim();

    let horizontal = Array2::from_shape_fn((h, w), |(r, c)| {
        kernel
            .iter()
            .enumerate()
            .map(|(k, weight)| weight * src[[r, reflect101(c as isize + k as isize - half, w)]])
            .sum::<f32>()
    });

    Array2::from_shape_fn((h, w), |(r, c)| {
        kernel
            .iter()
            .enumerate()
            .map(|(k, weight)| {
                weight * horizontal[[reflect101(r as isize + k as isize - half, h), c]]
            })
            .sum::<f32>()
    })
}

/// Trilinear sample; neighbours outside the volume contribute zero.
pub fn trilinear_zero(src: &ArrayView3<f32>, z: f64, y: f64, x: f64) -> f32 {
    let (d, h, w) = src.dim();
    let fetch = |k: isize, r: isize, c: isize| -> f32 {
        if k < 0 || r < 0 || c < 0 || k >= d as isize || r >= h as isize || c >= w as isize {
            0.0
        } else {
            src[[k as usize, r as usize, c as usize]]
        }
    };

    let (z0, y0, x0) = (z.floor(), y.floor(), x.floor());
    let (dz, dy, dx) = ((z - z0) as f32, (y - y0) as f32, (x - x0) as f32);
    let (k, r, c) = (z0 as isize, y0 as isize, x0 as isize);

    let plane = |k: isize| -> f32 {
        fetch(k, r, c) * (1.0 - dx) * (1.0 - dy)
            + fetch(k, r, c + 1) * dx * (1.0 - dy)
            + fetch(k, r + 1, c) * (1.0 - dx) * dy
            + fetch(k, r + 1, c + 1) * dx * dy
    };

    plane(k) * (1.0 - dz) + plane(k + 1) * dz
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array3};

    #[test]
    fn test_reflect101() {
        assert_eq!(reflect101(-1, 5), 1);
        assert_eq!(reflect101(-2, 5), 2);
        assert_eq!(reflect101(5, 5), 3);
        assert_eq!(reflect101(6, 5), 2);
        assert_eq!(reflect101(3, 5), 3);
        assert_eq!(reflect101(-7, 1), 0);
    }

    #[test]
    fn test_bilinear_zero_at_integer_is_exact() {
        let a = array![[1.0f32, 2.0], [3.0, 4.0]];
        assert_eq!(bilinear_zero(&a.view(), 1.0, 1.0), 4.0);
        assert_eq!(bilinear_zero(&a.view(), 0.5, 0.5), 2.5);
        assert_eq!(bilinear_zero(&a.view(), 5.0, 0.0), 0.0);
    }

    #[test]
    fn test_nearest_zero_out_of_bounds() {
        let a = array![[7u8, 8], [9, 10]];
        assert_eq!(nearest_zero(&a.view(), 0.4, 1.4), 8);
        assert_eq!(nearest_zero(&a.view(), -0.6, 0.0), 0);
        assert_eq!(nearest_zero(&a.view(), 0.0, 1.6), 0);
    }

    #[test]
    fn test_resize_same_size_is_identity() {
        let a = Array2::from_shape_fn((5, 7), |(r, c)| (r * 7 + c) as f32);
        assert_eq!(resize_bilinear(&a.view(), (5, 7)), a);
        let m = a.mapv(|v| v as u8);
        assert_eq!(resize_nearest(&m.view(), (5, 7)), m);
    }

    #[test]
    fn test_resize_upsample_constant() {
        let a = Array2::from_elem((2, 3), 0.25f32);
        let up = resize_bilinear(&a.view(), (8, 9));
        assert_eq!(up.dim(), (8, 9));
        assert!(up.iter().all(|&v| (v - 0.25).abs() < 1e-6));
    }

    #[test]
    fn test_resize_empty_source() {
        let empty = Array2::<f32>::zeros((0, 3));
        assert_eq!(resize_bilinear(&empty.view(), (2, 2)), Array2::<f32>::zeros((2, 2)));
        let empty_mask = Array2::<u8>::zeros((3, 0));
        assert_eq!(resize_nearest(&empty_mask.view(), (2, 2)), Array2::<u8>::zeros((2, 2)));
    }

    #[test]
    fn test_resize_nearest_keeps_values() {
        let m = array![[1u8, 2], [3, 4]];
        let up = resize_nearest(&m.view(), (4, 4));
        assert_eq!(up[[0, 0]], 1);
        assert_eq!(up[[0, 3]], 2);
        assert_eq!(up[[3, 0]], 3);
        assert_eq!(up[[3, 3]], 4);
    }

    #[test]
    fn test_resize_triangle_keeps_intensity_range() {
        let a = Array2::from_shape_fn((12, 10), |(r, c)| (r as f32 - 6.0) * 0.5 + c as f32 * 0.1);
        let down = resize_triangle(&a.view(), (8, 7));
        assert_eq!(down.dim(), (8, 7));
        let (lo, hi) = (-3.0f32, 2.5f32 + 0.9);
        assert!(down.iter().all(|&v| v >= lo - 1e-4 && v <= hi + 1e-4));
        assert!(down.iter().any(|&v| v < 0.0));

        assert_eq!(resize_triangle(&a.view(), (12, 10)), a);
    }

    #[test]
    fn test_resize_triangle_constant_and_empty() {
        let a = Array2::from_elem((5, 5), -0.75f32);
        assert_eq!(resize_triangle(&a.view(), (3, 4)), Array2::from_elem((3, 4), -0.75));
        let empty = Array2::<f32>::zeros((0, 4));
        assert_eq!(resize_triangle(&empty.view(), (2, 2)).dim(), (2, 2));
    }

    #[test]
    fn test_gaussian_kernel_normalised_and_symmetric() {
        let k = gaussian_kernel(21, 5.0);
        let sum: f32 = k.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert!((k[0] - k[20]).abs() < 1e-7);
        assert!(k[10] > k[9]);
        assert_eq!(gaussian_kernel(1, 0.0), vec![1.0]);
    }

    #[test]
    fn test_gaussian_blur_preserves_constant() {
        let a = Array2::from_elem((6, 4), 0.5f32);
        let blurred = gaussian_blur(&a, 5, 1.0);
        assert!(blurred.iter().all(|&v| (v - 0.5).abs() < 1e-5));
    }

    #[test]
    fn test_trilinear_zero() {
        let v = Array3::from_shape_fn((2, 2, 2), |(d, h, w)| (d * 4 + h * 2 + w) as f32);
        assert_eq!(trilinear_zero(&v.view(), 1.0, 0.0, 1.0), 5.0);
        assert!((trilinear_zero(&v.view(), 0.5, 0.5, 0.5) - 3.5).abs() < 1e-6);
        assert_eq!(trilinear_zero(&v.view(), 3.0, 0.0, 0.0), 0.0);
    }
}
