use blowdetect_core::constants::{
    BLOCK_DURATION_S, FILTER_ORDER, HIGH_CUTOFF_HZ, LOW_CUTOFF_HZ, RMS_THRESHOLD, SAMPLE_RATE,
};
use blowdetect_core::{BlowDetector, DetectorConfig, FeatureSource, FilterSpec, Mode};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Signal the RMS feature is computed over.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FeatureChoice {
    /// Magnitude spectrum of the filtered block (reference behaviour)
    #[default]
    Spectrum,
    /// Filtered samples
    Waveform,
}

impl From<FeatureChoice> for FeatureSource {
    fn from(choice: FeatureChoice) -> Self {
        match choice {
            FeatureChoice::Spectrum => FeatureSource::Spectrum,
            FeatureChoice::Waveform => FeatureSource::Waveform,
        }
    }
}

/// Persisted detector settings. Every field falls back to its default when missing.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AppConfig {
    #[serde(default = "default_input_device")]
    pub input_device: String,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(default = "default_low_cutoff")]
    pub low_cutoff_hz: f64,
    #[serde(default = "default_high_cutoff")]
    pub high_cutoff_hz: f64,
    #[serde(default = "default_filter_order")]
    pub filter_order: usize,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_block_duration")]
    pub block_duration_s: f64,
    #[serde(default)]
    pub feature: FeatureChoice,
    /// Upper frequency kept when exporting single-shot spectra
    #[serde(default = "default_plot_max_freq")]
    pub plot_max_freq_hz: f64,
}

fn default_input_device() -> String {
    "default".to_string()
}

fn default_threshold() -> f64 {
    RMS_THRESHOLD
}

fn default_low_cutoff() -> f64 {
    LOW_CUTOFF_HZ
}

fn default_high_cutoff() -> f64 {
    HIGH_CUTOFF_HZ
}

fn default_filter_order() -> usize {
    FILTER_ORDER
}

fn default_sample_rate() -> u32 {
    SAMPLE_RATE
}

fn default_block_duration() -> f64 {
    BLOCK_DURATION_S
}

fn default_plot_max_freq() -> f64 {
    500.0
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            input_device: default_input_device(),
            threshold: default_threshold(),
            low_cutoff_hz: default_low_cutoff(),
            high_cutoff_hz: default_high_cutoff(),
            filter_order: default_filter_order(),
            sample_rate: default_sample_rate(),
            block_duration_s: default_block_duration(),
            feature: FeatureChoice::default(),
            plot_max_freq_hz: default_plot_max_freq(),
        }
    }
}

impl AppConfig {
    /// Loads configuration from disk, or returns default if not found.
    pub fn load() -> Self {
        config_path()
            .map(|path| Self::load_from(&path))
            .unwrap_or_default()
    }

    pub fn load_from(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(cfg) => cfg,
                Err(e) => {
                    log::warn!("Ignoring unreadable config {}: {}", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    /// Saves only if a detector can be built from these settings for `mode`,
    /// so a bad override never ends up on disk.
    pub fn save_checked(&self, mode: Mode) -> blowdetect_core::Result<()> {
        match config_path() {
            Some(path) => self.save_checked_to(mode, &path),
            None => self.check(mode),
        }
    }

    pub fn save_checked_to(&self, mode: Mode, path: &Path) -> blowdetect_core::Result<()> {
        self.check(mode)?;
        self.save_to(path);
        Ok(())
    }

    fn check(&self, mode: Mode) -> blowdetect_core::Result<()> {
        BlowDetector::new(&self.detector_config(mode)).map(|_| ())
    }

    /// Saves configuration to disk in JSON format.
    pub fn save_to(&self, path: &Path) {
        if let Some(parent) = path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        match serde_json::to_string_pretty(self) {
            Ok(json) => {
                if let Err(e) = fs::write(path, json) {
                    log::warn!("Failed to save config to {}: {}", path.display(), e);
                } else {
                    log::info!("Saved config to {}", path.display());
                }
            }
            Err(e) => log::warn!("Failed to serialize config: {}", e),
        }
    }

    pub fn filter_spec(&self) -> FilterSpec {
        FilterSpec {
            sample_rate: self.sample_rate,
            low_cutoff_hz: self.low_cutoff_hz,
            high_cutoff_hz: self.high_cutoff_hz,
            order: self.filter_order,
        }
    }

    pub fn detector_config(&self, mode: Mode) -> DetectorConfig {
        DetectorConfig {
            threshold: self.threshold,
            filter: self.filter_spec(),
            feature: self.feature.into(),
            mode,
        }
    }
}

pub fn config_path() -> Option<PathBuf> {
    ProjectDirs::from("com", "blowdetect", "blowdetect")
        .map(|dirs| dirs.config_dir().join("config.json"))
}
