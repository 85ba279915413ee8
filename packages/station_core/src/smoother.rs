//! Temporal smoothing of raw distance readings.
//!
//! Raw time-of-flight readings are noisy enough that a single sample can flip
//! between buckets. The smoother averages the last [`WINDOW_LEN`] samples and
//! classifies the mean, which lags the true event by up to that many samples.

use std::collections::VecDeque;

use tracing::trace;

use crate::error::ThresholdError;
use crate::state::Classification;

/// One raw reading from the sensor, in millimeters.
pub type DistanceSample = u32;

/// Number of samples averaged per classification.
pub const WINDOW_LEN: usize = 5;

/// Distance cut-offs applied to the smoothed mean.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    /// At or below this mean the reading counts as a wave
    pub wave_mm: u32,
    /// Above this mean nobody is in range
    pub person_mm: u32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            wave_mm: 300,
            person_mm: 5000,
        }
    }
}

impl Thresholds {
    pub fn validate(&self) -> Result<(), ThresholdError> {
        if self.wave_mm >= self.person_mm {
            return Err(ThresholdError::Inverted {
                wave_mm: self.wave_mm,
                person_mm: self.person_mm,
            });
        }
        Ok(())
    }

    /// Map a smoothed distance onto a bucket. Total over every finite mean.
    pub fn classify(&self, mean_mm: f64) -> Classification {
        if mean_mm > f64::from(self.person_mm) {
            Classification::Empty
        } else if mean_mm > f64::from(self.wave_mm) {
            Classification::Present
        } else {
            Classification::Waving
        }
    }
}

/// Sliding window over the most recent samples.
#[derive(Debug, Clone)]
pub struct Smoother {
    window: VecDeque<DistanceSample>,
    thresholds: Thresholds,
}

impl Smoother {
    pub fn new(thresholds: Thresholds) -> Result<Self, ThresholdError> {
        thresholds.validate()?;
        Ok(Self {
            window: VecDeque::with_capacity(WINDOW_LEN + 1),
            thresholds,
        })
    }

    /// Push a sample and classify the new window mean.
    pub fn observe(&mut self, sample: DistanceSample) -> Classification {
        self.window.push_back(sample);
        if self.window.len() > WINDOW_LEN {
            self.window.pop_front();
        }

        let mean = self.mean();
        let class = self.thresholds.classify(mean);
        trace!(sample, mean, %class, "observed sample");
        class
    }

    /// Mean of the current window. Zero while the window is empty.
    pub fn mean(&self) -> f64 {
        if self.window.is_empty() {
            return 0.0;
        }
        let sum: u64 = self.window.iter().map(|&s| u64::from(s)).sum();
        sum as f64 / self.window.len() as f64
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// Samples currently in the window, oldest first.
    pub fn samples(&self) -> impl Iterator<Item = DistanceSample> + '_ {
        self.window.iter().copied()
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }
}
