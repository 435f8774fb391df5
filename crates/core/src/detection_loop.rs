//! Drives the detector from an audio source, in continuous or single-shot mode.
//!
//! Acquisition and processing are strictly sequential: the next block is only
//! requested once the previous decision has been reported. Cancellation is
//! observed between blocks, and a source may also abandon an in-flight
//! acquisition, in which case nothing is reported for it.

use crate::block::AudioBlock;
use crate::detector::{BlowDetector, DetectionResult, DetectorConfig, Mode};
use crate::error::Result;
use crate::spectrum::Spectrum;
use crossbeam_channel::{Sender, TrySendError};
use std::sync::atomic::{AtomicBool, Ordering};

/// Supplies blocks of mono samples.
pub trait AudioSource {
    /// Blocks until `duration_s` of audio is captured.
    ///
    /// `Ok(None)` means the capture was abandoned because the run was
    /// cancelled; device failures are `DetectError::Device`.
    fn acquire(&mut self, duration_s: f64, sample_rate: u32) -> Result<Option<AudioBlock>>;
}

/// Receives decisions. Rendering is entirely up to the implementor.
pub trait Observer {
    fn on_result(&mut self, result: &DetectionResult);

    fn on_single_shot(&mut self, report: &SingleShotReport) {
        self.on_result(&report.result);
    }
}

/// A block together with its magnitude spectrum.
#[derive(Debug, Clone, PartialEq)]
pub struct Capture {
    pub block: AudioBlock,
    pub spectrum: Spectrum,
}

impl Capture {
    pub fn time_axis(&self) -> Vec<f64> {
        self.block.time_axis()
    }
}

/// Single-shot output: the decision plus before/after views of the capture.
#[derive(Debug, Clone, PartialEq)]
pub struct SingleShotReport {
    pub result: DetectionResult,
    pub raw: Capture,
    pub filtered: Capture,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunSummary {
    pub blocks: u64,
    pub detections: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Continuous run ended by cancellation.
    Stopped(RunSummary),
    Captured(SingleShotReport),
    /// Single-shot capture abandoned before it completed.
    Interrupted,
}

pub struct DetectionLoop {
    config: DetectorConfig,
    detector: BlowDetector,
}

impl DetectionLoop {
    /// Validates the configuration and designs the filter. Nothing is
    /// acquired if this fails.
    pub fn new(config: DetectorConfig) -> Result<Self> {
        let detector = BlowDetector::new(&config)?;
        Ok(Self { config, detector })
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn detector(&self) -> &BlowDetector {
        &self.detector
    }

    pub fn run<S, O>(&mut self, source: &mut S, observer: &mut O, cancel: &AtomicBool) -> Result<RunOutcome>
    where
        S: AudioSource + ?Sized,
        O: Observer + ?Sized,
    {
        match self.config.mode {
            Mode::Continuous { block_duration_s } => self
                .run_continuous(source, observer, cancel, block_duration_s)
                .map(RunOutcome::Stopped),
            Mode::SingleShot { capture_duration_s } => {
                Ok(match self.run_single_shot(source, observer, capture_duration_s)? {
                    Some(report) => RunOutcome::Captured(report),
                    None => RunOutcome::Interrupted,
                })
            }
        }
    }

    fn run_continuous<S, O>(
        &mut self,
        source: &mut S,
        observer: &mut O,
        cancel: &AtomicBool,
        block_duration_s: f64,
    ) -> Result<RunSummary>
    where
        S: AudioSource + ?Sized,
        O: Observer + ?Sized,
    {
        let sample_rate = self.config.sample_rate();
        let mut summary = RunSummary::default();
        log::info!(
            "Continuous detection: {}s blocks, threshold {:.4}",
            block_duration_s,
            self.detector.threshold()
        );

        while !cancel.load(Ordering::Relaxed) {
            let Some(block) = source.acquire(block_duration_s, sample_rate)? else {
                break;
            };
            let result = self.detector.detect(&block)?;
            observer.on_result(&result);

            summary.blocks += 1;
            if result.detected {
                summary.detections += 1;
            }
        }

        log::info!(
            "Continuous detection stopped after {} blocks ({} detections)",
            summary.blocks,
            summary.detections
        );
        Ok(summary)
    }

    fn run_single_shot<S, O>(
        &mut self,
        source: &mut S,
        observer: &mut O,
        capture_duration_s: f64,
    ) -> Result<Option<SingleShotReport>>
    where
        S: AudioSource + ?Sized,
        O: Observer + ?Sized,
    {
        log::info!("Single-shot capture of {}s", capture_duration_s);
        let Some(block) = source.acquire(capture_duration_s, self.config.sample_rate())? else {
            log::info!("Single-shot capture interrupted");
            return Ok(None);
        };

        let analysis = self.detector.analyze(&block)?;
        let raw_spectrum = self.detector.spectrum(&block)?;

        let report = SingleShotReport {
            result: analysis.result,
            raw: Capture {
                block,
                spectrum: raw_spectrum,
            },
            filtered: Capture {
                block: analysis.filtered,
                spectrum: analysis.spectrum,
            },
        };
        observer.on_single_shot(&report);
        Ok(Some(report))
    }
}

/// Forwards results to another thread. Full channels drop the result; a
/// disconnected receiver disables forwarding for the rest of the run.
pub struct ChannelObserver {
    sender: Option<Sender<DetectionResult>>,
}

impl ChannelObserver {
    pub fn new(sender: Sender<DetectionResult>) -> Self {
        Self {
            sender: Some(sender),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.sender.is_some()
    }
}

impl Observer for ChannelObserver {
    fn on_result(&mut self, result: &DetectionResult) {
        if let Some(sender) = &self.sender {
            if let Err(TrySendError::Disconnected(_)) = sender.try_send(*result) {
                log::warn!("Result receiver disconnected, disabling sender");
                self.sender = None;
            }
        }
    }
}
