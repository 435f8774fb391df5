//! Butterworth bandpass design and zero-phase (forward-backward) filtering.
//!
//! The design runs through the analog prototype: Butterworth poles, a
//! lowpass-to-bandpass transform around the pre-warped band edges, then the
//! bilinear transform. Coefficients are kept in transfer-function (b, a) form.

use crate::constants::{FILTER_ORDER, HIGH_CUTOFF_HZ, LOW_CUTOFF_HZ, SAMPLE_RATE};
use crate::error::{DetectError, Result};
use rustfft::num_complex::Complex64;
use std::f64::consts::PI;

/// Bilinear transform runs at fs = 2 in normalised units, so 2 * fs = 4.
const BILINEAR_FS2: f64 = 4.0;

/// Parameters of a bandpass Butterworth design.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterSpec {
    pub sample_rate: u32,
    pub low_cutoff_hz: f64,
    pub high_cutoff_hz: f64,
    pub order: usize,
}

impl Default for FilterSpec {
    fn default() -> Self {
        Self {
            sample_rate: SAMPLE_RATE,
            low_cutoff_hz: LOW_CUTOFF_HZ,
            high_cutoff_hz: HIGH_CUTOFF_HZ,
            order: FILTER_ORDER,
        }
    }
}

impl FilterSpec {
    pub fn nyquist(&self) -> f64 {
        0.5 * self.sample_rate as f64
    }

    /// Checks `0 < low < high < nyquist` and `order >= 1`.
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(DetectError::InvalidSpec("sample rate must be positive".into()));
        }
        if self.order == 0 {
            return Err(DetectError::InvalidSpec("filter order must be at least 1".into()));
        }
        let (low, high) = (self.low_cutoff_hz, self.high_cutoff_hz);
        if !low.is_finite() || !high.is_finite() {
            return Err(DetectError::InvalidSpec(format!(
                "cutoffs must be finite, got {} and {}",
                low, high
            )));
        }
        if low <= 0.0 {
            return Err(DetectError::InvalidSpec(format!(
                "low cutoff {} Hz must be above 0",
                low
            )));
        }
        if low >= high {
            return Err(DetectError::InvalidSpec(format!(
                "low cutoff {} Hz must be below high cutoff {} Hz",
                low, high
            )));
        }
        if high >= self.nyquist() {
            return Err(DetectError::InvalidSpec(format!(
                "high cutoff {} Hz must be below Nyquist ({} Hz)",
                high,
                self.nyquist()
            )));
        }
        Ok(())
    }
}

/// Feedforward (`b`) and feedback (`a`) coefficients, normalised so `a[0] == 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterCoefficients {
    b: Vec<f64>,
    a: Vec<f64>,
}

impl FilterCoefficients {
    /// Builds a coefficient set from raw polynomials, normalising by `a[0]`.
    pub fn new(b: Vec<f64>, a: Vec<f64>) -> Result<Self> {
        if a.is_empty() || b.is_empty() {
            return Err(DetectError::InvalidSpec("empty coefficient polynomial".into()));
        }
        if a.len() != b.len() {
            return Err(DetectError::InvalidSpec(format!(
                "numerator has {} taps but denominator has {}",
                b.len(),
                a.len()
            )));
        }
        let a0 = a[0];
        if a0 == 0.0 || !a0.is_finite() {
            return Err(DetectError::InvalidSpec("leading denominator coefficient must be non-zero".into()));
        }
        Ok(Self {
            b: b.iter().map(|v| v / a0).collect(),
            a: a.iter().map(|v| v / a0).collect(),
        })
    }

    pub fn b(&self) -> &[f64] {
        &self.b
    }

    pub fn a(&self) -> &[f64] {
        &self.a
    }

    /// Samples of odd-symmetric padding added at each end by [`ZeroPhaseFilter`].
    pub fn padlen(&self) -> usize {
        3 * self.a.len().max(self.b.len())
    }
}

/// Designs a Butterworth bandpass. Pure: the same spec always yields the same coefficients.
pub fn design_bandpass(spec: &FilterSpec) -> Result<FilterCoefficients> {
    spec.validate()?;

    let order = spec.order;
    let nyquist = spec.nyquist();

    // Cutoffs as fractions of Nyquist, pre-warped for the bilinear transform
    let warp = |hz: f64| BILINEAR_FS2 * (PI * (hz / nyquist) / 2.0).tan();
    let w_low = warp(spec.low_cutoff_hz);
    let w_high = warp(spec.high_cutoff_hz);
    let bandwidth = w_high - w_low;
    let centre = (w_low * w_high).sqrt();

    // Analog lowpass prototype: poles on the left half of the unit circle, no zeros
    let prototype: Vec<Complex64> = (0..order)
        .map(|i| {
            let m = 2.0 * i as f64 - (order as f64 - 1.0);
            -Complex64::from_polar(1.0, PI * m / (2.0 * order as f64))
        })
        .collect();

    // Lowpass -> bandpass: each pole splits into a pair, `order` zeros land at the origin
    let scaled: Vec<Complex64> = prototype.iter().map(|&p| p * (bandwidth / 2.0)).collect();
    let mut analog_poles = Vec::with_capacity(2 * order);
    for &p in &scaled {
        analog_poles.push(p + (p * p - centre * centre).sqrt());
    }
    for &p in &scaled {
        analog_poles.push(p - (p * p - centre * centre).sqrt());
    }
    let analog_gain = bandwidth.powi(order as i32);

    // Bilinear transform. Origin zeros map to z = 1, zeros at infinity to z = -1.
    let digital_poles: Vec<Complex64> = analog_poles
        .iter()
        .map(|&p| (BILINEAR_FS2 + p) / (BILINEAR_FS2 - p))
        .collect();
    let mut digital_zeros = vec![Complex64::new(1.0, 0.0); order];
    digital_zeros.extend(std::iter::repeat(Complex64::new(-1.0, 0.0)).take(order));

    let pole_product: Complex64 = analog_poles
        .iter()
        .map(|&p| BILINEAR_FS2 - p)
        .product();
    let gain = analog_gain * (Complex64::new(BILINEAR_FS2.powi(order as i32), 0.0) / pole_product).re;

    let b: Vec<f64> = poly(&digital_zeros).iter().map(|c| gain * c.re).collect();
    let a: Vec<f64> = poly(&digital_poles).iter().map(|c| c.re).collect();

    log::info!(
        "Designed order-{} bandpass {:.1}-{:.1} Hz @ {} Hz ({} taps)",
        order,
        spec.low_cutoff_hz,
        spec.high_cutoff_hz,
        spec.sample_rate,
        a.len()
    );

    FilterCoefficients::new(b, a)
}

/// Expands roots into monic polynomial coefficients, highest power first.
fn poly(roots: &[Complex64]) -> Vec<Complex64> {
    let mut coeffs = vec![Complex64::new(1.0, 0.0)];
    for &root in roots {
        coeffs.push(Complex64::new(0.0, 0.0));
        for i in (1..coeffs.len()).rev() {
            let prev = coeffs[i - 1];
            coeffs[i] -= root * prev;
        }
    }
    coeffs
}

/// Forward-backward IIR filter. Amplitude response is the square of a single
/// pass and the phase shifts of the two passes cancel.
#[derive(Debug, Clone)]
pub struct ZeroPhaseFilter {
    coeffs: FilterCoefficients,
    // Steady-state initial conditions for a unit step
    zi: Vec<f64>,
}

impl ZeroPhaseFilter {
    pub fn new(coeffs: FilterCoefficients) -> Self {
        let zi = steady_state(&coeffs);
        Self { coeffs, zi }
    }

    pub fn from_spec(spec: &FilterSpec) -> Result<Self> {
        Ok(Self::new(design_bandpass(spec)?))
    }

    pub fn coefficients(&self) -> &FilterCoefficients {
        &self.coeffs
    }

    /// Smallest block length the filter accepts.
    pub fn min_block_len(&self) -> usize {
        self.coeffs.padlen() + 1
    }

    /// Filters `samples` and returns a new signal of the same length.
    pub fn apply(&self, samples: &[f64]) -> Result<Vec<f64>> {
        let padlen = self.coeffs.padlen();
        if samples.len() <= padlen {
            return Err(DetectError::BlockTooShort {
                len: samples.len(),
                required: padlen,
            });
        }

        let extended = odd_extend(samples, padlen);

        let forward = self.run(&extended, extended[0]);
        let reversed: Vec<f64> = forward.into_iter().rev().collect();
        let mut output = self.run(&reversed, reversed[0]);
        output.reverse();

        output.truncate(output.len() - padlen);
        output.drain(..padlen);
        Ok(output)
    }

    /// One direct-form II transposed pass, state primed for a signal starting at `x0`.
    fn run(&self, x: &[f64], x0: f64) -> Vec<f64> {
        let b = self.coeffs.b();
        let a = self.coeffs.a();
        let mut state: Vec<f64> = self.zi.iter().map(|z| z * x0).collect();
        let last = state.len();

        x.iter()
            .map(|&xn| {
                let yn = b[0] * xn + state.first().copied().unwrap_or(0.0);
                for i in 1..last {
                    state[i - 1] = b[i] * xn + state[i] - a[i] * yn;
                }
                if last > 0 {
                    state[last - 1] = b[last] * xn - a[last] * yn;
                }
                yn
            })
            .collect()
    }
}

/// Delay-line state the filter settles into after a long unit step.
fn steady_state(coeffs: &FilterCoefficients) -> Vec<f64> {
    let b = coeffs.b();
    let a = coeffs.a();
    let n = a.len();
    if n < 2 {
        return Vec::new();
    }

    let b0 = b[0];
    let forcing: f64 = (1..n).map(|k| b[k] - a[k] * b0).sum();
    let a_sum: f64 = a.iter().sum();

    let mut zi = Vec::with_capacity(n - 1);
    let z0 = forcing / a_sum;
    zi.push(z0);

    let mut asum = 1.0;
    let mut csum = 0.0;
    for k in 1..n - 1 {
        asum += a[k];
        csum += b[k] - a[k] * b0;
        zi.push(asum * z0 - csum);
    }
    zi
}

/// Mirrors `padlen` samples about each endpoint (point-symmetric) to tame edge transients.
fn odd_extend(x: &[f64], padlen: usize) -> Vec<f64> {
    let n = x.len();
    let first = x[0];
    let last = x[n - 1];

    let mut out = Vec::with_capacity(n + 2 * padlen);
    out.extend((1..=padlen).rev().map(|i| 2.0 * first - x[i]));
    out.extend_from_slice(x);
    out.extend((2..=padlen + 1).map(|i| 2.0 * last - x[n - i]));
    out
}
