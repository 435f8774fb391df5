//! Console output and JSON export of detection results.

use anyhow::{Context, Result};
use blowdetect_core::{Capture, DetectionResult, Observer, SingleShotReport};
use serde::Serialize;
use std::fs;
use std::path::Path;

pub fn format_result(result: &DetectionResult) -> String {
    if result.detected {
        format!("Blow detected! RMS: {:.4}", result.rms)
    } else {
        format!("RMS: {:.4}", result.rms)
    }
}

/// Prints one line per block, plus a summary for single-shot captures.
pub struct ConsoleObserver;

impl Observer for ConsoleObserver {
    fn on_result(&mut self, result: &DetectionResult) {
        println!("{}", format_result(result));
    }

    fn on_single_shot(&mut self, report: &SingleShotReport) {
        println!("Recording complete.");
        println!(
            "Captured {:.2}s ({} samples)",
            report.raw.block.duration_s(),
            report.raw.block.len()
        );
        if let Some((freq, _)) = peak(&report.filtered, f64::INFINITY) {
            println!("Filtered peak at {:.1} Hz", freq);
        }
        println!("Spectral flatness: {:.4}", report.result.flatness);
        println!("{}", format_result(&report.result));
    }
}

/// Strongest non-negative bin at or below `max_hz`.
fn peak(capture: &Capture, max_hz: f64) -> Option<(f64, f64)> {
    capture
        .spectrum
        .positive_up_to(max_hz)
        .into_iter()
        .fold(None, |best: Option<(f64, f64)>, (f, m)| match best {
            Some((_, bm)) if bm >= m => best,
            _ => Some((f, m)),
        })
}

/// Waveform and positive half of the spectrum, ready for an external plotter.
#[derive(Serialize, Debug)]
pub struct ExportedCapture {
    pub time_s: Vec<f64>,
    pub amplitude: Vec<f64>,
    pub frequency_hz: Vec<f64>,
    pub magnitude: Vec<f64>,
}

impl ExportedCapture {
    fn new(capture: &Capture, max_freq_hz: f64) -> Self {
        let (frequency_hz, magnitude) = capture.spectrum.positive_up_to(max_freq_hz).into_iter().unzip();
        Self {
            time_s: capture.time_axis(),
            amplitude: capture.block.samples().to_vec(),
            frequency_hz,
            magnitude,
        }
    }
}

#[derive(Serialize, Debug)]
pub struct ExportedReport {
    pub sample_rate: u32,
    pub threshold: f64,
    pub rms: f64,
    pub detected: bool,
    pub flatness: f64,
    pub raw: ExportedCapture,
    pub filtered: ExportedCapture,
}

impl ExportedReport {
    pub fn new(report: &SingleShotReport, threshold: f64, max_freq_hz: f64) -> Self {
        Self {
            sample_rate: report.raw.block.sample_rate(),
            threshold,
            rms: report.result.rms,
            detected: report.result.detected,
            flatness: report.result.flatness,
            raw: ExportedCapture::new(&report.raw, max_freq_hz),
            filtered: ExportedCapture::new(&report.filtered, max_freq_hz),
        }
    }
}

pub fn export(report: &SingleShotReport, threshold: f64, max_freq_hz: f64, path: &Path) -> Result<()> {
    let exported = ExportedReport::new(report, threshold, max_freq_hz);
    let json = serde_json::to_string(&exported).context("Failed to serialize report")?;
    fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    log::info!("Exported single-shot report to {}", path.display());
    Ok(())
}
