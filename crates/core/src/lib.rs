pub mod block;
pub mod constants;
pub mod detection_loop;
pub mod detector;
pub mod error;
pub mod features;
pub mod filter;
pub mod spectrum;

pub use block::AudioBlock;
pub use detection_loop::{
    AudioSource, Capture, ChannelObserver, DetectionLoop, Observer, RunOutcome, RunSummary,
    SingleShotReport,
};
pub use detector::{BlowDetector, DetectionResult, DetectorConfig, FeatureSource, Mode};
pub use error::{DetectError, Result};
pub use filter::{FilterCoefficients, FilterSpec, ZeroPhaseFilter};
pub use spectrum::{SpectralAnalyzer, Spectrum};
