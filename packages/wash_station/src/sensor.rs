//! Distance sensor sources.
//!
//! The detection loop only needs a blocking "give me one reading" call. Real
//! hardware is read through the Linux IIO sysfs interface, where each read of
//! `in_distance_raw` triggers a ranging measurement that blocks for the
//! configured timing budget.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;

use station_core::DistanceSample;

use crate::config::{SensorConfig, SensorSource};

#[derive(Debug, thiserror::Error)]
pub enum SensorError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unparseable reading {raw:?} from {}", path.display())]
    Parse { path: PathBuf, raw: String },
}

/// Blocking source of distance samples with bounded latency.
pub trait DistanceSensor: Send {
    fn read_mm(&mut self) -> Result<DistanceSample, SensorError>;
}

impl<S: DistanceSensor + ?Sized> DistanceSensor for Box<S> {
    fn read_mm(&mut self) -> Result<DistanceSample, SensorError> {
        (**self).read_mm()
    }
}

/// Build the sensor named by the config.
pub fn from_config(config: &SensorConfig) -> Box<dyn DistanceSensor> {
    match config.source {
        SensorSource::Iio => {
            info!("Reading distance from {}", config.iio_path.display());
            Box::new(IioSensor::new(&config.iio_path))
        }
        SensorSource::Simulated => {
            info!("Using simulated sensor");
            Box::new(SimulatedSensor::new(config.timing_budget, rand::random()))
        }
    }
}

/// Reads a single integer attribute from sysfs on every call.
pub struct IioSensor {
    path: PathBuf,
}

impl IioSensor {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }
}

impl DistanceSensor for IioSensor {
    fn read_mm(&mut self) -> Result<DistanceSample, SensorError> {
        let raw = std::fs::read_to_string(&self.path).map_err(|source| SensorError::Io {
            path: self.path.clone(),
            source,
        })?;
        raw.trim().parse().map_err(|_| SensorError::Parse {
            path: self.path.clone(),
            raw: raw.trim().to_string(),
        })
    }
}

/// One stretch of a simulated visit: a target distance held for a while.
#[derive(Debug, Clone, Copy)]
struct Phase {
    distance_mm: u32,
    duration: Duration,
}

/// A visitor who walks up, waves, washes, and leaves, then an empty room long
/// enough for the station to fall asleep.
const VISIT: &[Phase] = &[
    Phase {
        distance_mm: 8000,
        duration: Duration::from_secs(14),
    },
    Phase {
        distance_mm: 1200,
        duration: Duration::from_secs(3),
    },
    Phase {
        distance_mm: 120,
        duration: Duration::from_secs(2),
    },
    Phase {
        distance_mm: 900,
        duration: Duration::from_secs(27),
    },
    Phase {
        distance_mm: 8000,
        duration: Duration::from_secs(6),
    },
];

/// Synthetic sensor cycling through [`VISIT`] with a little noise.
///
/// Each read sleeps for the timing budget, like the real ranging call.
pub struct SimulatedSensor {
    rng: StdRng,
    timing_budget: Duration,
    phase: usize,
    remaining: u32,
}

impl SimulatedSensor {
    pub fn new(timing_budget: Duration, seed: u64) -> Self {
        let mut sensor = Self {
            rng: StdRng::seed_from_u64(seed),
            timing_budget,
            phase: 0,
            remaining: 0,
        };
        sensor.remaining = sensor.samples_in(VISIT[0]);
        sensor
    }

    fn samples_in(&self, phase: Phase) -> u32 {
        let budget_ms = self.timing_budget.as_millis().max(1);
        (phase.duration.as_millis() / budget_ms).max(1) as u32
    }
}

impl DistanceSensor for SimulatedSensor {
    fn read_mm(&mut self) -> Result<DistanceSample, SensorError> {
        if !self.timing_budget.is_zero() {
            std::thread::sleep(self.timing_budget);
        }

        if self.remaining == 0 {
            self.phase = (self.phase + 1) % VISIT.len();
            self.remaining = self.samples_in(VISIT[self.phase]);
        }
        self.remaining -= 1;

        let target = VISIT[self.phase].distance_mm;
        let jitter = (target / 20).max(10);
        let low = target.saturating_sub(jitter);
        Ok(self.rng.random_range(low..=target + jitter))
    }
}

/// Plays back a fixed list of readings. `None` entries fail the read. Once the
/// list runs out the last good reading repeats forever.
#[cfg(test)]
pub struct ScriptedSensor {
    script: std::collections::VecDeque<Option<DistanceSample>>,
    last: Option<DistanceSample>,
}

#[cfg(test)]
impl ScriptedSensor {
    pub fn new(script: impl IntoIterator<Item = Option<DistanceSample>>) -> Self {
        Self {
            script: script.into_iter().collect(),
            last: None,
        }
    }

    pub fn readings(samples: impl IntoIterator<Item = DistanceSample>) -> Self {
        Self::new(samples.into_iter().map(Some))
    }

    fn failure(msg: &str) -> SensorError {
        SensorError::Io {
            path: PathBuf::from("scripted"),
            source: std::io::Error::other(msg.to_string()),
        }
    }
}

#[cfg(test)]
impl DistanceSensor for ScriptedSensor {
    fn read_mm(&mut self) -> Result<DistanceSample, SensorError> {
        match self.script.pop_front() {
            Some(Some(sample)) => {
                self.last = Some(sample);
                Ok(sample)
            }
            Some(None) => Err(Self::failure("scripted read failure")),
            None => self.last.ok_or_else(|| Self::failure("script is empty")),
        }
    }
}
