//! `washd probe`: print raw samples next to their smoothed classification.
//!
//! Meant for sensor bring-up: mount the sensor, run the probe, and check that
//! an empty room, a person and a hand each land in the right band.

use std::io::Write;

use anyhow::{Context, Result};
use station_core::{Smoother, Thresholds};

use crate::sensor::DistanceSensor;

pub fn probe_samples(
    sensor: &mut dyn DistanceSensor,
    thresholds: Thresholds,
    count: usize,
    out: &mut impl Write,
) -> Result<()> {
    let mut smoother = Smoother::new(thresholds)?;
    writeln!(
        out,
        "thresholds: wave <= {}mm < present <= {}mm < empty",
        thresholds.wave_mm, thresholds.person_mm
    )?;

    for i in 0..count {
        match sensor.read_mm() {
            Ok(sample) => {
                let class = smoother.observe(sample);
                writeln!(
                    out,
                    "{:>4}  {:>6}mm  mean {:>8.1}mm  {}",
                    i,
                    sample,
                    smoother.mean(),
                    class
                )?;
            }
            Err(e) => writeln!(out, "{:>4}  error: {}", i, e)?,
        }
    }

    out.flush().context("Failed to flush probe output")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::ScriptedSensor;

    #[test]
    fn test_probe_prints_each_sample() {
        let mut sensor = ScriptedSensor::new([Some(8000), None, Some(100)]);
        let mut out = Vec::new();
        probe_samples(&mut sensor, Thresholds::default(), 3, &mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[1].contains("8000mm") && lines[1].ends_with("empty"));
        assert!(lines[2].contains("error: failed to read scripted"));
        // Mean of 8000 and 100 is still a person in range
        assert!(lines[3].contains("4050.0mm") && lines[3].ends_with("present"));
    }

    #[test]
    fn test_probe_rejects_inverted_thresholds() {
        let mut sensor = ScriptedSensor::readings([100]);
        let thresholds = Thresholds {
            wave_mm: 500,
            person_mm: 400,
        };
        let mut out = Vec::new();
        assert!(probe_samples(&mut sensor, thresholds, 1, &mut out).is_err());
    }
}
