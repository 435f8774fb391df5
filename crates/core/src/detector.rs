//! Per-block detection: configuration, the filter -> spectrum -> RMS chain, and the threshold decision.

use crate::block::{samples_for, AudioBlock};
use crate::constants::{BLOCK_DURATION_S, MAX_CAPTURE_DURATION_S, RMS_THRESHOLD};
use crate::error::{DetectError, Result};
use crate::features::{rms, spectral_flatness};
use crate::filter::{FilterSpec, ZeroPhaseFilter};
use crate::spectrum::{SpectralAnalyzer, Spectrum};

/// Which signal the RMS feature is taken over.
///
/// `Spectrum` reproduces the reference numbers. By Parseval its value is
/// `sqrt(N)` times the `Waveform` value, so thresholds do not carry over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeatureSource {
    #[default]
    Spectrum,
    Waveform,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Mode {
    /// Block after block until cancelled.
    Continuous { block_duration_s: f64 },
    /// One capture, one decision, raw and filtered views reported.
    SingleShot { capture_duration_s: f64 },
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Continuous {
            block_duration_s: BLOCK_DURATION_S,
        }
    }
}

impl Mode {
    pub fn duration_s(&self) -> f64 {
        match *self {
            Mode::Continuous { block_duration_s } => block_duration_s,
            Mode::SingleShot { capture_duration_s } => capture_duration_s,
        }
    }
}

/// Run-wide settings, fixed for the lifetime of a detector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorConfig {
    pub threshold: f64,
    pub filter: FilterSpec,
    pub feature: FeatureSource,
    pub mode: Mode,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            threshold: RMS_THRESHOLD,
            filter: FilterSpec::default(),
            feature: FeatureSource::default(),
            mode: Mode::default(),
        }
    }
}

impl DetectorConfig {
    pub fn sample_rate(&self) -> u32 {
        self.filter.sample_rate
    }

    /// Samples per acquired block for the configured mode.
    pub fn block_len(&self) -> usize {
        samples_for(self.mode.duration_s(), self.sample_rate())
    }

    /// Threshold, duration and filter checks. Does not check the block length
    /// against the filter; [`BlowDetector::new`] and the loop do that.
    pub fn validate(&self) -> Result<()> {
        if !self.threshold.is_finite() || self.threshold <= 0.0 {
            return Err(DetectError::InvalidConfig(format!(
                "threshold must be a positive number, got {}",
                self.threshold
            )));
        }
        let duration = self.mode.duration_s();
        if !duration.is_finite() || duration <= 0.0 {
            return Err(DetectError::InvalidConfig(format!(
                "duration must be a positive number of seconds, got {}",
                duration
            )));
        }
        if duration > MAX_CAPTURE_DURATION_S {
            return Err(DetectError::InvalidConfig(format!(
                "duration {}s exceeds the {}s capture limit",
                duration, MAX_CAPTURE_DURATION_S
            )));
        }
        self.filter.validate()
    }
}

/// Outcome of one block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionResult {
    pub rms: f64,
    pub detected: bool,
    /// Spectral flatness of the filtered block. Informational only.
    pub flatness: f64,
}

/// Everything computed for one block, kept for callers that want to show it.
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub filtered: AudioBlock,
    pub spectrum: Spectrum,
    pub result: DetectionResult,
}

/// Filter -> spectrum -> RMS -> threshold, one block at a time.
///
/// Holds no state between blocks apart from the designed filter and the FFT
/// plan cache, so every decision depends on its own block only.
pub struct BlowDetector {
    threshold: f64,
    feature: FeatureSource,
    sample_rate: u32,
    filter: ZeroPhaseFilter,
    analyzer: SpectralAnalyzer,
}

impl BlowDetector {
    pub fn new(config: &DetectorConfig) -> Result<Self> {
        config.validate()?;
        let filter = ZeroPhaseFilter::from_spec(&config.filter)?;

        let block_len = config.block_len();
        if block_len < filter.min_block_len() {
            return Err(DetectError::BlockTooShort {
                len: block_len,
                required: filter.coefficients().padlen(),
            });
        }

        Ok(Self {
            threshold: config.threshold,
            feature: config.feature,
            sample_rate: config.sample_rate(),
            filter,
            analyzer: SpectralAnalyzer::new(),
        })
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn feature(&self) -> FeatureSource {
        self.feature
    }

    pub fn filter(&self) -> &ZeroPhaseFilter {
        &self.filter
    }

    /// Strictly above the threshold counts; equal does not.
    pub fn decide(&self, rms: f64) -> bool {
        rms > self.threshold
    }

    pub fn detect(&mut self, block: &AudioBlock) -> Result<DetectionResult> {
        Ok(self.analyze(block)?.result)
    }

    /// Magnitude spectrum of a block without filtering it.
    pub fn spectrum(&mut self, block: &AudioBlock) -> Result<Spectrum> {
        self.analyzer.analyze(block)
    }

    pub fn analyze(&mut self, block: &AudioBlock) -> Result<Analysis> {
        block.expect_rate(self.sample_rate)?;

        let filtered = block.with_samples(self.filter.apply(block.samples())?);
        let spectrum = self.analyzer.analyze(&filtered)?;

        let rms = match self.feature {
            FeatureSource::Spectrum => rms(&spectrum.magnitude)?,
            FeatureSource::Waveform => rms(filtered.samples())?,
        };
        let flatness = spectral_flatness(&spectrum.magnitude)?;
        let detected = self.decide(rms);

        log::debug!(
            "block of {} samples: rms={:.4} flatness={:.4} detected={}",
            block.len(),
            rms,
            flatness,
            detected
        );

        Ok(Analysis {
            filtered,
            spectrum,
            result: DetectionResult {
                rms,
                detected,
                flatness,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::SAMPLE_RATE;
    use std::f64::consts::PI;

    fn tone(freq: f64, amplitude: f64, duration_s: f64) -> AudioBlock {
        let n = samples_for(duration_s, SAMPLE_RATE);
        let samples = (0..n)
            .map(|i| amplitude * (2.0 * PI * freq * i as f64 / SAMPLE_RATE as f64).sin())
            .collect();
        AudioBlock::new(samples, SAMPLE_RATE)
    }

    // ── DetectorConfig ───────────────────────────────────────────

    #[test]
    fn test_default_config() {
        let config = DetectorConfig::default();
        assert_eq!(config.threshold, 1.0);
        assert_eq!(config.feature, FeatureSource::Spectrum);
        assert_eq!(config.block_len(), 2205);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_non_positive_threshold_rejected() {
        for threshold in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let config = DetectorConfig {
                threshold,
                ..DetectorConfig::default()
            };
            assert!(matches!(config.validate(), Err(DetectError::InvalidConfig(_))));
        }
    }

    #[test]
    fn test_bad_duration_rejected() {
        let config = DetectorConfig {
            mode: Mode::SingleShot {
                capture_duration_s: 0.0,
            },
            ..DetectorConfig::default()
        };
        assert!(matches!(config.validate(), Err(DetectError::InvalidConfig(_))));
    }

    #[test]
    fn test_huge_duration_rejected() {
        for capture_duration_s in [MAX_CAPTURE_DURATION_S + 1.0, 1e6, 1e15] {
            let config = DetectorConfig {
                mode: Mode::SingleShot { capture_duration_s },
                ..DetectorConfig::default()
            };
            assert!(matches!(config.validate(), Err(DetectError::InvalidConfig(_))));
            assert!(matches!(
                BlowDetector::new(&config),
                Err(DetectError::InvalidConfig(_))
            ));
        }

        let longest = DetectorConfig {
            mode: Mode::SingleShot {
                capture_duration_s: MAX_CAPTURE_DURATION_S,
            },
            ..DetectorConfig::default()
        };
        assert!(longest.validate().is_ok());
        assert_eq!(longest.block_len(), 158_760_000);
    }

    #[test]
    fn test_block_shorter_than_filter_rejected_up_front() {
        // 0.0004s at 44.1kHz is 18 samples, order-3 needs more than 21
        let config = DetectorConfig {
            mode: Mode::Continuous {
                block_duration_s: 0.0004,
            },
            ..DetectorConfig::default()
        };
        assert!(matches!(
            BlowDetector::new(&config),
            Err(DetectError::BlockTooShort { len: 18, required: 21 })
        ));
    }

    #[test]
    fn test_invalid_filter_blocks_construction() {
        let config = DetectorConfig {
            filter: FilterSpec {
                low_cutoff_hz: 300.0,
                high_cutoff_hz: 20.0,
                ..FilterSpec::default()
            },
            ..DetectorConfig::default()
        };
        assert!(matches!(
            BlowDetector::new(&config),
            Err(DetectError::InvalidSpec(_))
        ));
    }

    // ── BlowDetector ─────────────────────────────────────────────

    #[test]
    fn test_silence_not_detected() {
        let mut detector = BlowDetector::new(&DetectorConfig::default()).unwrap();
        let result = detector.detect(&AudioBlock::silence(0.05, SAMPLE_RATE)).unwrap();
        assert_eq!(result.rms, 0.0);
        assert!(!result.detected);
    }

    #[test]
    fn test_equal_to_threshold_is_not_detected() {
        let detector = BlowDetector::new(&DetectorConfig::default()).unwrap();
        assert!(!detector.decide(1.0));
        assert!(detector.decide(1.0 + 1e-12));
    }

    #[test]
    fn test_in_band_tone_detected() {
        let mut detector = BlowDetector::new(&DetectorConfig::default()).unwrap();
        let result = detector.detect(&tone(100.0, 0.5, 0.05)).unwrap();
        assert!(result.detected, "rms = {}", result.rms);
    }

    #[test]
    fn test_out_of_band_tone_scores_far_lower() {
        // Short blocks keep some edge transient, so compare against an in-band tone
        let mut detector = BlowDetector::new(&DetectorConfig::default()).unwrap();
        let high = detector.detect(&tone(4000.0, 0.5, 0.05)).unwrap();
        let low = detector.detect(&tone(100.0, 0.5, 0.05)).unwrap();
        assert!(high.rms * 4.0 < low.rms, "{} vs {}", high.rms, low.rms);
    }

    #[test]
    fn test_spectrum_rms_is_sqrt_n_times_waveform_rms() {
        let block = tone(120.0, 0.3, 0.05);
        let mut spectral = BlowDetector::new(&DetectorConfig::default()).unwrap();
        let mut waveform = BlowDetector::new(&DetectorConfig {
            feature: FeatureSource::Waveform,
            ..DetectorConfig::default()
        })
        .unwrap();

        let s = spectral.detect(&block).unwrap().rms;
        let w = waveform.detect(&block).unwrap().rms;
        let n = block.len() as f64;
        assert!((s - w * n.sqrt()).abs() < 1e-9 * s.max(1.0), "{} vs {}", s, w);
    }

    #[test]
    fn test_wrong_sample_rate_rejected() {
        let mut detector = BlowDetector::new(&DetectorConfig::default()).unwrap();
        let block = AudioBlock::new(vec![0.0; 2400], 48000);
        assert!(matches!(detector.detect(&block), Err(DetectError::Device(_))));
    }

    #[test]
    fn test_short_block_fails_per_block() {
        let mut detector = BlowDetector::new(&DetectorConfig::default()).unwrap();
        let block = AudioBlock::new(vec![0.1; 10], SAMPLE_RATE);
        assert!(matches!(
            detector.detect(&block),
            Err(DetectError::BlockTooShort { len: 10, .. })
        ));
    }

    #[test]
    fn test_analysis_keeps_lengths() {
        let mut detector = BlowDetector::new(&DetectorConfig::default()).unwrap();
        let block = tone(60.0, 0.2, 0.05);
        let analysis = detector.analyze(&block).unwrap();
        assert_eq!(analysis.filtered.len(), block.len());
        assert_eq!(analysis.spectrum.len(), block.len());
        assert_eq!(analysis.spectrum.frequency_hz[0], 0.0);
    }
}
