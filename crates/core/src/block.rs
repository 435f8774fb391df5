use crate::error::{DetectError, Result};

/// Number of samples captured over `duration_s` at `sample_rate`, rounded to the nearest sample.
pub fn samples_for(duration_s: f64, sample_rate: u32) -> usize {
    (duration_s * sample_rate as f64).round().max(0.0) as usize
}

/// One channel of PCM samples at a fixed rate.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBlock {
    samples: Vec<f64>,
    sample_rate: u32,
}

impl AudioBlock {
    pub fn new(samples: Vec<f64>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn silence(duration_s: f64, sample_rate: u32) -> Self {
        Self::new(vec![0.0; samples_for(duration_s, sample_rate)], sample_rate)
    }

    /// Same rate, different content. Used for the output of each stage.
    pub fn with_samples(&self, samples: Vec<f64>) -> Self {
        Self::new(samples, self.sample_rate)
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<f64> {
        self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_s(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Sample timestamps evenly spread over `[0, duration]`, endpoints included.
    pub fn time_axis(&self) -> Vec<f64> {
        let n = self.samples.len();
        let duration = self.duration_s();
        match n {
            0 => Vec::new(),
            1 => vec![0.0],
            _ => (0..n)
                .map(|i| duration * i as f64 / (n - 1) as f64)
                .collect(),
        }
    }

    /// Rejects blocks whose rate differs from the configured one.
    pub fn expect_rate(&self, sample_rate: u32) -> Result<()> {
        if self.sample_rate != sample_rate {
            return Err(DetectError::Device(format!(
                "source delivered {} Hz, pipeline runs at {} Hz",
                self.sample_rate, sample_rate
            )));
        }
        Ok(())
    }
}
