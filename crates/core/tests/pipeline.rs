use blowdetect_core::constants::SAMPLE_RATE;
use blowdetect_core::filter::design_bandpass;
use blowdetect_core::{
    AudioBlock, AudioSource, BlowDetector, DetectError, DetectionLoop, DetectionResult,
    DetectorConfig, FilterSpec, Mode, Observer, Result, RunOutcome, RunSummary, SpectralAnalyzer,
};
use std::sync::atomic::{AtomicBool, Ordering};

/// Deterministic uniform noise in [-1, 1).
struct XorShift(u64);

impl XorShift {
    fn next(&mut self) -> f64 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        (self.0 >> 11) as f64 / (1u64 << 53) as f64 * 2.0 - 1.0
    }

    fn block(&mut self, amplitude: f64, len: usize) -> AudioBlock {
        AudioBlock::new((0..len).map(|_| amplitude * self.next()).collect(), SAMPLE_RATE)
    }
}

#[derive(Default)]
struct Recorder {
    results: Vec<DetectionResult>,
}

impl Observer for Recorder {
    fn on_result(&mut self, result: &DetectionResult) {
        self.results.push(*result);
    }
}

/// Hands out noise blocks and raises the cancel flag while the given block is being captured.
struct CancellingSource<'a> {
    noise: XorShift,
    cancel: &'a AtomicBool,
    cancel_during: usize,
    abandon: bool,
    acquired: usize,
}

impl AudioSource for CancellingSource<'_> {
    fn acquire(&mut self, duration_s: f64, sample_rate: u32) -> Result<Option<AudioBlock>> {
        self.acquired += 1;
        let len = (duration_s * sample_rate as f64).round() as usize;
        if self.acquired == self.cancel_during {
            self.cancel.store(true, Ordering::Relaxed);
            if self.abandon {
                return Ok(None);
            }
        }
        Ok(Some(self.noise.block(1.0, len)))
    }
}

#[test]
fn silent_block_is_not_a_blow() {
    let mut detector = BlowDetector::new(&DetectorConfig::default()).unwrap();
    let result = detector.detect(&AudioBlock::silence(0.05, SAMPLE_RATE)).unwrap();
    assert!(result.rms.abs() < 1e-12);
    assert!(!result.detected);
}

#[test]
fn broadband_noise_is_a_blow() {
    let mut noise = XorShift(0x2545_F491_4F6C_DD1D);
    let mut detector = BlowDetector::new(&DetectorConfig::default()).unwrap();
    let result = detector.detect(&noise.block(1.0, 2205)).unwrap();
    assert!(result.rms > 1.0, "rms = {}", result.rms);
    assert!(result.detected);
}

#[test]
fn inverted_cutoffs_are_rejected() {
    let spec = FilterSpec {
        low_cutoff_hz: 300.0,
        high_cutoff_hz: 20.0,
        ..FilterSpec::default()
    };
    assert!(matches!(design_bandpass(&spec), Err(DetectError::InvalidSpec(_))));
}

#[test]
fn empty_block_has_no_spectrum() {
    let mut analyzer = SpectralAnalyzer::new();
    let empty = AudioBlock::new(Vec::new(), SAMPLE_RATE);
    assert_eq!(analyzer.analyze(&empty), Err(DetectError::EmptyBlock));
}

#[test]
fn raising_the_threshold_never_creates_detections() {
    let mut noise = XorShift(0xD1B5_4A32_D192_ED03);
    let blocks: Vec<AudioBlock> = (0..6).map(|i| noise.block(0.05 * i as f64, 2205)).collect();
    let thresholds = [0.01, 0.1, 0.5, 1.0, 2.0, 5.0, 20.0];

    for block in &blocks {
        let mut previous = true;
        for threshold in thresholds {
            let config = DetectorConfig {
                threshold,
                ..DetectorConfig::default()
            };
            let detected = BlowDetector::new(&config).unwrap().detect(block).unwrap().detected;
            assert!(previous || !detected, "flipped to detected at threshold {}", threshold);
            previous = detected;
        }
    }
}

#[test]
fn cancel_during_capture_reports_the_full_block() {
    let cancel = AtomicBool::new(false);
    let mut source = CancellingSource {
        noise: XorShift(0x9E37_79B9_7F4A_7C15),
        cancel: &cancel,
        cancel_during: 3,
        abandon: false,
        acquired: 0,
    };
    let mut recorder = Recorder::default();
    let mut lp = DetectionLoop::new(DetectorConfig::default()).unwrap();

    let outcome = lp.run(&mut source, &mut recorder, &cancel).unwrap();
    assert_eq!(
        outcome,
        RunOutcome::Stopped(RunSummary {
            blocks: 3,
            detections: 3
        })
    );
    assert_eq!(source.acquired, 3);
    assert_eq!(recorder.results.len(), 3);
}

#[test]
fn abandoned_capture_reports_nothing() {
    let cancel = AtomicBool::new(false);
    let mut source = CancellingSource {
        noise: XorShift(0x9E37_79B9_7F4A_7C15),
        cancel: &cancel,
        cancel_during: 3,
        abandon: true,
        acquired: 0,
    };
    let mut recorder = Recorder::default();
    let mut lp = DetectionLoop::new(DetectorConfig::default()).unwrap();

    let outcome = lp.run(&mut source, &mut recorder, &cancel).unwrap();
    assert_eq!(
        outcome,
        RunOutcome::Stopped(RunSummary {
            blocks: 2,
            detections: 2
        })
    );
    assert_eq!(recorder.results.len(), 2);
}

#[test]
fn invalid_config_fails_before_any_capture() {
    let config = DetectorConfig {
        filter: FilterSpec {
            high_cutoff_hz: 30_000.0,
            ..FilterSpec::default()
        },
        ..DetectorConfig::default()
    };
    assert!(matches!(
        DetectionLoop::new(config),
        Err(DetectError::InvalidSpec(_))
    ));
}

#[test]
fn oversized_capture_rejected_before_any_capture() {
    let config = DetectorConfig {
        mode: Mode::SingleShot {
            capture_duration_s: 1e15,
        },
        ..DetectorConfig::default()
    };
    assert!(matches!(
        DetectionLoop::new(config),
        Err(DetectError::InvalidConfig(_))
    ));
}
