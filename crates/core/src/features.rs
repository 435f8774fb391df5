//! Scalar features over a magnitude spectrum or a waveform.

use crate::constants::FLATNESS_EPSILON;
use crate::error::{DetectError, Result};

/// Root-mean-square, `sqrt(mean(x^2))`.
pub fn rms(values: &[f64]) -> Result<f64> {
    if values.is_empty() {
        return Err(DetectError::EmptyInput);
    }
    let sum_sq: f64 = values.iter().map(|x| x * x).sum();
    Ok((sum_sq / values.len() as f64).sqrt())
}

/// Geometric over arithmetic mean of a magnitude spectrum.
/// Near 1 for white noise, near 0 for a pure tone. Not used for the decision.
pub fn spectral_flatness(magnitudes: &[f64]) -> Result<f64> {
    if magnitudes.is_empty() {
        return Err(DetectError::EmptyInput);
    }
    let n = magnitudes.len() as f64;
    let mean_log = magnitudes
        .iter()
        .map(|m| (m + FLATNESS_EPSILON).ln())
        .sum::<f64>()
        / n;
    let arithmetic_mean = magnitudes.iter().sum::<f64>() / n;
    Ok(mean_log.exp() / (arithmetic_mean + FLATNESS_EPSILON))
}
