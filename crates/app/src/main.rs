use anyhow::{Context, Result};
use blowdetect_core::{DetectionLoop, Mode, RunOutcome};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

mod audio;
mod config;
mod report;

use config::{AppConfig, FeatureChoice};

#[derive(Parser)]
#[command(name = "blowdetect")]
#[command(about = "Detects blowing into the microphone", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available input devices
    List,
    /// Detect blows block by block (press Ctrl+C to stop)
    Continuous {
        /// Block length in seconds
        #[arg(short, long)]
        block: Option<f64>,
        #[command(flatten)]
        tuning: Tuning,
    },
    /// Record once, decide once, and report raw and filtered views
    Single {
        /// Capture length in seconds
        #[arg(short, long)]
        duration: f64,
        /// Write waveforms and spectra as JSON for plotting
        #[arg(short, long)]
        export: Option<PathBuf>,
        /// Highest frequency kept in the exported spectra
        #[arg(long, requires = "export")]
        max_freq: Option<f64>,
        #[command(flatten)]
        tuning: Tuning,
    },
}

/// Overrides for the saved configuration, applied for this run only unless `--save` is given.
#[derive(Args, Debug, Default)]
struct Tuning {
    #[arg(short, long)]
    input: Option<String>,
    /// RMS above which a block counts as a blow
    #[arg(short, long)]
    threshold: Option<f64>,
    /// Low cutoff of the bandpass in Hz
    #[arg(long)]
    low: Option<f64>,
    /// High cutoff of the bandpass in Hz
    #[arg(long)]
    high: Option<f64>,
    /// Butterworth filter order
    #[arg(long)]
    order: Option<usize>,
    #[arg(long)]
    sample_rate: Option<u32>,
    #[arg(long, value_enum)]
    feature: Option<FeatureChoice>,
    /// Persist the effective settings
    #[arg(long)]
    save: bool,
}

impl Tuning {
    fn apply(&self, config: &mut AppConfig) {
        if let Some(input) = &self.input {
            config.input_device = input.clone();
        }
        if let Some(threshold) = self.threshold {
            config.threshold = threshold;
        }
        if let Some(low) = self.low {
            config.low_cutoff_hz = low;
        }
        if let Some(high) = self.high {
            config.high_cutoff_hz = high;
        }
        if let Some(order) = self.order {
            config.filter_order = order;
        }
        if let Some(sample_rate) = self.sample_rate {
            config.sample_rate = sample_rate;
        }
        if let Some(feature) = self.feature {
            config.feature = feature;
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::List => audio::list_devices()?,
        Commands::Continuous { block, tuning } => {
            let mut config = AppConfig::load();
            tuning.apply(&mut config);
            if let Some(block) = block {
                config.block_duration_s = block;
            }
            let mode = Mode::Continuous {
                block_duration_s: config.block_duration_s,
            };
            if tuning.save {
                config.save_checked(mode).context("Refusing to save invalid settings")?;
            }
            run_continuous(&config, mode)?;
        }
        Commands::Single {
            duration,
            export,
            max_freq,
            tuning,
        } => {
            let mut config = AppConfig::load();
            tuning.apply(&mut config);
            if let Some(max_freq) = max_freq {
                config.plot_max_freq_hz = max_freq;
            }
            let mode = Mode::SingleShot {
                capture_duration_s: duration,
            };
            if tuning.save {
                config.save_checked(mode).context("Refusing to save invalid settings")?;
            }
            run_single(&config, mode, export)?;
        }
    }

    Ok(())
}

/// Ctrl+C raises the returned flag instead of killing the process.
fn install_cancel_handler() -> Result<Arc<AtomicBool>> {
    let cancel = Arc::new(AtomicBool::new(false));
    let c = cancel.clone();
    ctrlc::set_handler(move || {
        c.store(true, Ordering::Relaxed);
    })
    .context("Failed to install Ctrl+C handler")?;
    Ok(cancel)
}

fn run_continuous(config: &AppConfig, mode: Mode) -> Result<()> {
    let mut detection =
        DetectionLoop::new(config.detector_config(mode)).context("Invalid detector configuration")?;

    let cancel = install_cancel_handler()?;
    let mut source = audio::CpalSource::open(&config.input_device, config.sample_rate, cancel.clone())?;

    println!("Blow Detection (RMS) Threshold = {:.4}", config.threshold);
    let outcome = detection.run(&mut source, &mut report::ConsoleObserver, &cancel)?;

    if cancel.load(Ordering::Relaxed) {
        println!("Interrupt detected!");
    }
    if let RunOutcome::Stopped(summary) = outcome {
        println!("{} blocks analysed, {} blows detected", summary.blocks, summary.detections);
    }
    Ok(())
}

fn run_single(config: &AppConfig, mode: Mode, export: Option<PathBuf>) -> Result<()> {
    let mut detection =
        DetectionLoop::new(config.detector_config(mode)).context("Invalid detector configuration")?;

    let cancel = install_cancel_handler()?;
    let mut source = audio::CpalSource::open(&config.input_device, config.sample_rate, cancel.clone())?;

    println!("Recording for {} seconds...", mode.duration_s());
    match detection.run(&mut source, &mut report::ConsoleObserver, &cancel)? {
        RunOutcome::Captured(captured) => {
            if let Some(path) = export {
                report::export(&captured, config.threshold, config.plot_max_freq_hz, &path)?;
                println!("Report written to {}", path.display());
            }
        }
        RunOutcome::Interrupted => println!("Interrupt detected!"),
        RunOutcome::Stopped(_) => {}
    }
    Ok(())
}
