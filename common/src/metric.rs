//! Peak signal-to-noise ratio between two frames.
//!
//! `psnr = 20 * log10(peak / sqrt(mse))`, with `mse` the mean squared
//! difference over every sample. Pixel-identical frames have `mse == 0` and
//! score `f64::INFINITY`; that value is returned explicitly and is the
//! maximum a pair can score.

use ndarray::ArrayView4;
use tracing::debug;

use crate::frame::Frame;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MetricError {
    #[error("frame shapes differ: {left:?} vs {right:?}")]
    ShapeMismatch { left: Vec<usize>, right: Vec<usize> },
    /// Shapes agree but at least one frame is not laid out contiguously in
    /// row-major order, so it cannot be read as a flat slice.
    #[error("frame samples are not contiguous in standard layout")]
    NonContiguous,
    #[error("frames have no samples")]
    Empty,
}

/// Convert a mean squared error into a PSNR score.
pub fn mse_to_psnr(mse: f64, peak: f64) -> f64 {
    if mse == 0.0 {
        return f64::INFINITY;
    }
    20.0 * (peak / mse.sqrt()).log10()
}

/// Score two frames. Higher is more similar.
///
/// Contiguous frames are scored over their flat sample slices. When either
/// frame has a non-standard layout the score is recomputed per batch entry
/// over the logically flattened `(channel, height, width)` axes and the
/// batch scores are averaged; with the usual batch of one this is the same
/// number. Shape mismatches are returned as errors.
pub fn psnr(a: &Frame, b: &Frame, peak: f64) -> Result<f64, MetricError> {
    let (a, b) = (a.pixels(), b.pixels());
    if a.shape() != b.shape() {
        return Err(MetricError::ShapeMismatch {
            left: a.shape().to_vec(),
            right: b.shape().to_vec(),
        });
    }
    if a.is_empty() {
        return Err(MetricError::Empty);
    }

    match contiguous_psnr(a, b, peak) {
        Err(MetricError::NonContiguous) => {
            debug!(shape = ?a.shape(), "non-contiguous frame, scoring per batch");
            let scores = batched_psnr(a, b, peak);
            Ok(scores.iter().sum::<f64>() / scores.len() as f64)
        }
        other => other,
    }
}

/// PSNR over the flat sample slices of two same-shape arrays.
pub fn contiguous_psnr(
    a: ArrayView4<'_, f32>,
    b: ArrayView4<'_, f32>,
    peak: f64,
) -> Result<f64, MetricError> {
    let (Some(xs), Some(ys)) = (a.as_slice(), b.as_slice()) else {
        return Err(MetricError::NonContiguous);
    };
    Ok(mse_to_psnr(mean_squared_error(xs.iter(), ys.iter(), xs.len()), peak))
}

/// One PSNR per batch entry, each over that entry's flattened samples.
/// Works for any memory layout.
pub fn batched_psnr(a: ArrayView4<'_, f32>, b: ArrayView4<'_, f32>, peak: f64) -> Vec<f64> {
    a.outer_iter()
        .zip(b.outer_iter())
        .map(|(x, y)| mse_to_psnr(mean_squared_error(x.iter(), y.iter(), x.len()), peak))
        .collect()
}

fn mean_squared_error<'a>(
    xs: impl Iterator<Item = &'a f32>,
    ys: impl Iterator<Item = &'a f32>,
    len: usize,
) -> f64 {
    let sum: f64 = xs
        .zip(ys)
        .map(|(&x, &y)| {
            let d = x as f64 - y as f64;
            d * d
        })
        .sum();
    sum / len as f64
}
