//! Spectral residual saliency.
//!
//! The image is reduced to a small grayscale working copy, the log amplitude
//! spectrum is compared against a locally averaged version of itself, and the
//! residual is transformed back with the original phase. Whatever stands out
//! from the "expected" spectrum shows up as energy in the spatial domain.
use image::imageops::{self, FilterType};
use image::{GrayImage, ImageBuffer, Luma};
use imageproc::filter::separable_filter_equal;
use num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use tracing::debug;

use super::image::Image;
use crate::error::{Result, RoiError};

/// Per-pixel saliency, normalized to `[0, 1]`, same size as the source image.
pub type SaliencyMap = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Side of the square working image the spectrum is computed on.
const WORKING_SIZE: usize = 64;
const AMPLITUDE_FLOOR: f32 = 1e-9;
const GAUSSIAN_KERNEL_SIZE: usize = 5;
const GAUSSIAN_SIGMA: f32 = 8.0;

/// Compute a normalized saliency map for `image`.
///
/// Fails with [`RoiError::SaliencyComputation`] for images narrower or
/// shorter than two pixels, or when the response is not finite.
pub fn compute_saliency(image: &Image) -> Result<SaliencyMap> {
    let fail = || RoiError::SaliencyComputation {
        source_name: image.source_name().to_string(),
    };

    let (width, height) = (image.width(), image.height());
    if width < 2 || height < 2 {
        return Err(fail());
    }

    let gray = imageops::grayscale(image.pixels());
    let working = imageops::resize(
        &gray,
        WORKING_SIZE as u32,
        WORKING_SIZE as u32,
        FilterType::Triangle,
    );

    let mut response = spectral_residual(&working);
    if response.iter().any(|v| !v.is_finite()) {
        return Err(fail());
    }
    // f32 resampling clamps to [0, 1], so normalize before scaling up
    normalize_in_place(&mut response);

    let small = SaliencyMap::from_raw(WORKING_SIZE as u32, WORKING_SIZE as u32, response)
        .ok_or_else(fail)?;
    let mut map = imageops::resize(&small, width, height, FilterType::Triangle);
    normalize_in_place(&mut map);

    debug!("{}: saliency map {}x{}", image.source_name(), width, height);
    Ok(map)
}

fn spectral_residual(working: &GrayImage) -> Vec<f32> {
    let n = WORKING_SIZE;
    let mut planner = FftPlanner::<f32>::new();
    let forward = planner.plan_fft_forward(n);
    let inverse = planner.plan_fft_inverse(n);

    let mut spectrum: Vec<Complex<f32>> = working
        .pixels()
        .map(|p| Complex::new(p.0[0] as f32 / 255.0, 0.0))
        .collect();
    fft_2d(&mut spectrum, n, forward.as_ref());

    let log_amplitude = working_map(
        spectrum
            .iter()
            .map(|c| c.norm().max(AMPLITUDE_FLOOR).ln())
            .collect(),
    );
    let averaged = separable_filter_equal(&log_amplitude, &[1.0f32 / 3.0; 3]);

    for ((c, log_amp), avg) in spectrum
        .iter_mut()
        .zip(log_amplitude.iter())
        .zip(averaged.iter())
    {
        *c = Complex::from_polar((log_amp - avg).exp(), c.arg());
    }
    fft_2d(&mut spectrum, n, inverse.as_ref());

    let energy = working_map(spectrum.iter().map(|c| c.norm_sqr()).collect());
    separable_filter_equal(&energy, &gaussian_weights()).into_raw()
}

fn working_map(values: Vec<f32>) -> SaliencyMap {
    let side = WORKING_SIZE as u32;
    SaliencyMap::from_vec(side, side, values)
        .unwrap_or_else(|| SaliencyMap::new(side, side))
}

/// Square 2-D transform: every row, then every column.
fn fft_2d(data: &mut [Complex<f32>], n: usize, fft: &dyn Fft<f32>) {
    fft.process(data);
    transpose_square(data, n);
    fft.process(data);
    transpose_square(data, n);
}

fn transpose_square<T>(data: &mut [T], n: usize) {
    for row in 0..n {
        for col in (row + 1)..n {
            data.swap(row * n + col, col * n + row);
        }
    }
}

/// Normalized taps of the post-filter Gaussian.
fn gaussian_weights() -> [f32; GAUSSIAN_KERNEL_SIZE] {
    let center = (GAUSSIAN_KERNEL_SIZE / 2) as f32;
    let mut weights = [0.0f32; GAUSSIAN_KERNEL_SIZE];
    for (i, w) in weights.iter_mut().enumerate() {
        let d = i as f32 - center;
        *w = (-(d * d) / (2.0 * GAUSSIAN_SIGMA * GAUSSIAN_SIGMA)).exp();
    }
    let sum: f32 = weights.iter().sum();
    weights.iter_mut().for_each(|w| *w /= sum);
    weights
}

/// Min-max normalize to `[0, 1]`; a flat input becomes all zeros.
fn normalize_in_place(values: &mut [f32]) {
    let (min, max) = values
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let range = max - min;

    if range.is_nan() || range <= 0.0 {
        values.iter_mut().for_each(|v| *v = 0.0);
        return;
    }
    values.iter_mut().for_each(|v| *v = (*v - min) / range);
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn image_with_square(size: u32, square: (u32, u32, u32)) -> Image {
        let (sx, sy, side) = square;
        let pixels = RgbImage::from_fn(size, size, |x, y| {
            if x >= sx && x < sx + side && y >= sy && y < sy + side {
                Rgb([255, 255, 255])
            } else {
                Rgb([10, 10, 10])
            }
        });
        Image::from_rgb(pixels, "square").unwrap()
    }

    #[test]
    fn test_map_matches_image_and_is_normalized() {
        let pixels = RgbImage::from_fn(120, 80, |x, y| {
            Rgb([(x * 2 % 256) as u8, (y * 3 % 256) as u8, ((x * y) % 256) as u8])
        });
        let image = Image::from_rgb(pixels, "pattern").unwrap();
        let map = compute_saliency(&image).unwrap();

        assert_eq!(map.dimensions(), (120, 80));
        assert!(map.pixels().all(|p| (0.0..=1.0).contains(&p.0[0])));
        let max = map.pixels().map(|p| p.0[0]).fold(0.0f32, f32::max);
        assert_eq!(max, 1.0);
    }

    #[test]
    fn test_degenerate_images_fail() {
        for (w, h) in [(1, 1), (1, 50), (50, 1)] {
            let image = Image::from_rgb(RgbImage::new(w, h), "tiny.png").unwrap();
            match compute_saliency(&image) {
                Err(RoiError::SaliencyComputation { source_name }) => {
                    assert_eq!(source_name, "tiny.png")
                }
                other => panic!("expected saliency failure, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_isolated_square_stands_out() {
        let image = image_with_square(256, (160, 64, 32));
        let map = compute_saliency(&image).unwrap();

        let total: f32 = map.pixels().map(|p| p.0[0]).sum();
        let overall_mean = total / (256.0 * 256.0);

        let mut inside = 0.0f32;
        for y in 64..96 {
            for x in 160..192 {
                inside += map.get_pixel(x, y).0[0];
            }
        }
        let inside_mean = inside / (32.0 * 32.0);
        assert!(
            inside_mean > overall_mean,
            "square mean {inside_mean} not above image mean {overall_mean}"
        );
    }

    #[test]
    fn test_flat_values_normalize_to_zero() {
        let mut values = vec![3.5f32; 16];
        normalize_in_place(&mut values);
        assert!(values.iter().all(|&v| v == 0.0));

        let mut values = vec![2.0f32, 4.0, 6.0];
        normalize_in_place(&mut values);
        assert_eq!(values, vec![0.0, 0.5, 1.0]);
    }

    #[test]
    fn test_gaussian_weights_are_normalized_and_symmetric() {
        let weights = gaussian_weights();
        let sum: f32 = weights.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert_eq!(weights[0], weights[4]);
        assert!(weights[2] > weights[1]);
    }

    #[test]
    fn test_uniform_working_image_gives_finite_response() {
        let flat = GrayImage::from_pixel(WORKING_SIZE as u32, WORKING_SIZE as u32, Luma([90]));
        let response = spectral_residual(&flat);
        assert_eq!(response.len(), WORKING_SIZE * WORKING_SIZE);
        assert!(response.iter().all(|v| v.is_finite() && *v >= 0.0));
    }

    #[test]
    fn test_transpose_square() {
        let mut data = vec![1, 2, 3, 4];
        transpose_square(&mut data, 2);
        assert_eq!(data, vec![1, 3, 2, 4]);
    }
}
