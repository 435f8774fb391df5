//! Magnitude spectrum of a whole block via `rustfft`.
//!
//! No window is applied (rectangular), so off-bin tones leak into
//! neighbouring bins.

use crate::block::AudioBlock;
use crate::error::{DetectError, Result};
use rustfft::{num_complex::Complex, FftPlanner};

/// Per-bin frequency and DFT modulus, both of the block's length.
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrum {
    pub frequency_hz: Vec<f64>,
    pub magnitude: Vec<f64>,
}

impl Spectrum {
    pub fn len(&self) -> usize {
        self.magnitude.len()
    }

    pub fn is_empty(&self) -> bool {
        self.magnitude.is_empty()
    }

    /// (frequency, magnitude) pairs with `0 <= f <= max_hz`, in bin order.
    pub fn positive_up_to(&self, max_hz: f64) -> Vec<(f64, f64)> {
        self.frequency_hz
            .iter()
            .zip(&self.magnitude)
            .filter(|(f, _)| **f >= 0.0 && **f <= max_hz)
            .map(|(f, m)| (*f, *m))
            .collect()
    }
}

/// Bin centre frequencies in FFT order: `0, df, .., ` then negative frequencies from `-fs/2` upwards.
pub fn fft_frequencies(n: usize, sample_rate: u32) -> Vec<f64> {
    if n == 0 {
        return Vec::new();
    }
    let df = sample_rate as f64 / n as f64;
    let positive = (n - 1) / 2;
    (0..n)
        .map(|i| {
            if i <= positive {
                i as f64 * df
            } else {
                (i as f64 - n as f64) * df
            }
        })
        .collect()
}

/// Runs a forward FFT over the block and keeps the modulus of every bin.
pub struct SpectralAnalyzer {
    planner: FftPlanner<f64>,
}

impl Default for SpectralAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl SpectralAnalyzer {
    pub fn new() -> Self {
        Self {
            planner: FftPlanner::new(),
        }
    }

    pub fn analyze(&mut self, block: &AudioBlock) -> Result<Spectrum> {
        let n = block.len();
        if n == 0 {
            return Err(DetectError::EmptyBlock);
        }

        let mut buffer: Vec<Complex<f64>> = block
            .samples()
            .iter()
            .map(|&s| Complex::new(s, 0.0))
            .collect();

        // The planner caches plans, so repeated block lengths are cheap
        let fft = self.planner.plan_fft_forward(n);
        fft.process(&mut buffer);

        Ok(Spectrum {
            frequency_hz: fft_frequencies(n, block.sample_rate()),
            magnitude: buffer.iter().map(|c| c.norm()).collect(),
        })
    }
}
