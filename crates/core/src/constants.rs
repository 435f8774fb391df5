//! Shared constants for blow detection.

/// Sample rate used for capture and filter design (44.1kHz)
pub const SAMPLE_RATE: u32 = 44100;

/// Bandpass edges isolating breath noise
pub const LOW_CUTOFF_HZ: f64 = 20.0;
pub const HIGH_CUTOFF_HZ: f64 = 300.0;

/// Butterworth order used when none is configured
pub const FILTER_ORDER: usize = 3;

/// Detection threshold for the spectrum-RMS feature
pub const RMS_THRESHOLD: f64 = 1.0;

/// Block length in continuous mode (50ms)
pub const BLOCK_DURATION_S: f64 = 0.05;

/// Added to magnitudes in the flatness measure to keep ln() and the division finite
pub const FLATNESS_EPSILON: f64 = 1e-10;

/// Longest capture a single acquisition may request (one hour)
pub const MAX_CAPTURE_DURATION_S: f64 = 3600.0;
