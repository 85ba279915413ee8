//! Detection loop and the sampler task that drives it.
//!
//! The sampler is the only writer of station state. It runs on a blocking
//! thread because every sensor read blocks for the ranging time, and publishes
//! each state change to a `broadcast` channel (one event per change for stream
//! clients) and a `watch` channel (latest state for health checks and for
//! clients that fell behind).

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use station_core::{
    Smoother, StationState, StationStateMachine, ThresholdError, Thresholds, Timeouts,
};

use crate::event_logger::EventLogger;
use crate::metrics::StationMetrics;
use crate::sensor::DistanceSensor;

/// Owns the sensor, the smoothing window and the state machine.
pub struct DetectionLoop<S> {
    sensor: S,
    smoother: Smoother,
    machine: StationStateMachine,
    logger: EventLogger,
    metrics: Arc<StationMetrics>,
    /// Pause after a failed read
    error_backoff: Duration,
    cancel: CancellationToken,
}

impl<S: DistanceSensor> DetectionLoop<S> {
    pub fn new(
        sensor: S,
        thresholds: Thresholds,
        timeouts: Timeouts,
        logger: EventLogger,
        metrics: Arc<StationMetrics>,
        cancel: CancellationToken,
    ) -> Result<Self, ThresholdError> {
        Ok(Self {
            sensor,
            smoother: Smoother::new(thresholds)?,
            machine: StationStateMachine::new(timeouts),
            logger,
            metrics,
            error_backoff: Duration::ZERO,
            cancel,
        })
    }

    /// How long to wait after a failed read. Usually the sensor timing budget.
    pub fn with_error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff = backoff;
        self
    }

    pub fn state(&self) -> StationState {
        self.machine.state()
    }

    /// Sample until the state changes, report its log event, and return the
    /// new state. Returns `None` once cancelled.
    pub fn next_state(&mut self) -> Option<StationState> {
        loop {
            if self.cancel.is_cancelled() {
                return None;
            }

            let sample = match self.sensor.read_mm() {
                Ok(sample) => sample,
                Err(e) => {
                    self.metrics.sensor_error();
                    warn!("Sensor read failed, skipping sample: {}", e);
                    if !self.error_backoff.is_zero() {
                        std::thread::sleep(self.error_backoff);
                    }
                    continue;
                }
            };
            self.metrics.sample_read();

            let class = self.smoother.observe(sample);
            let eval = self.machine.evaluate(class, Instant::now());
            if !eval.changed {
                continue;
            }

            self.metrics.transition();
            if let Some(event) = eval.log_event {
                self.logger.dispatch(event);
            }
            return Some(eval.state);
        }
    }
}

/// Run the detection loop on a blocking thread until it is cancelled.
pub fn spawn_sampler<S>(
    mut detection: DetectionLoop<S>,
    changes: broadcast::Sender<StationState>,
    current: watch::Sender<StationState>,
) -> JoinHandle<()>
where
    S: DistanceSensor + 'static,
{
    tokio::task::spawn_blocking(move || {
        info!("Sampler started in {}", detection.state());
        while let Some(state) = detection.next_state() {
            current.send_replace(state);
            // Err only means nobody is streaming right now
            if changes.send(state).is_err() {
                debug!(%state, "no stream clients for state change");
            }
        }
        info!("Sampler stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::ScriptedSensor;
    use station_core::LogEvent;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::mpsc;

    fn short_timeouts() -> Timeouts {
        Timeouts {
            idle: Duration::from_millis(20),
            wash: Duration::from_millis(30),
            wash_idle: Duration::from_millis(20),
            done: Duration::from_millis(20),
        }
    }

    fn detection(
        sensor: ScriptedSensor,
        timeouts: Timeouts,
    ) -> (
        DetectionLoop<ScriptedSensor>,
        mpsc::Receiver<LogEvent>,
        Arc<StationMetrics>,
    ) {
        let metrics = Arc::new(StationMetrics::new());
        let (logger, rx) = EventLogger::with_queue(16, metrics.clone());
        let detection = DetectionLoop::new(
            sensor,
            Thresholds::default(),
            timeouts,
            logger,
            metrics.clone(),
            CancellationToken::new(),
        )
        .unwrap();
        (detection, rx, metrics)
    }

    #[test]
    fn test_wave_starts_wash() {
        let (mut detection, mut logs, _) =
            detection(ScriptedSensor::readings([100]), Timeouts::default());

        assert_eq!(detection.next_state(), Some(StationState::InWash));
        // Starting a wash is not a logged milestone
        assert!(logs.try_recv().is_err());
    }

    #[test]
    fn test_empty_room_sleeps_and_logs() {
        let (mut detection, mut logs, _) =
            detection(ScriptedSensor::readings([8000]), short_timeouts());

        assert_eq!(detection.next_state(), Some(StationState::Sleeping));
        assert_eq!(logs.try_recv().unwrap(), LogEvent::Sleep);
    }

    /// Sensor that reports whatever distance the test last set.
    struct Dial(Arc<AtomicU32>);

    impl DistanceSensor for Dial {
        fn read_mm(&mut self) -> Result<u32, crate::sensor::SensorError> {
            Ok(self.0.load(Ordering::Relaxed))
        }
    }

    #[test]
    fn test_full_visit_from_sleep() {
        let distance = Arc::new(AtomicU32::new(8000));
        let metrics = Arc::new(StationMetrics::new());
        let (logger, mut logs) = EventLogger::with_queue(16, metrics.clone());
        let mut detection = DetectionLoop::new(
            Dial(distance.clone()),
            Thresholds::default(),
            short_timeouts(),
            logger,
            metrics.clone(),
            CancellationToken::new(),
        )
        .unwrap();

        assert_eq!(detection.next_state(), Some(StationState::Sleeping));

        // Person walks up, waves, and keeps a hand under the tap
        distance.store(900, Ordering::Relaxed);
        assert_eq!(detection.next_state(), Some(StationState::Idle));
        distance.store(100, Ordering::Relaxed);
        assert_eq!(detection.next_state(), Some(StationState::InWash));
        assert_eq!(detection.next_state(), Some(StationState::Done));

        let logged: Vec<_> = std::iter::from_fn(|| logs.try_recv().ok()).collect();
        assert_eq!(
            logged,
            vec![
                LogEvent::Sleep,
                LogEvent::WakeWaveIncomplete,
                LogEvent::WakeWaveComplete
            ]
        );
        assert_eq!(metrics.transitions.load(Ordering::Relaxed), 4);
    }

    #[test]
    fn test_sensor_errors_are_skipped() {
        let sensor = ScriptedSensor::new([None, None, Some(100)]);
        let (mut detection, _logs, metrics) = detection(sensor, Timeouts::default());
        let mut detection = detection.with_error_backoff(Duration::from_millis(1));

        assert_eq!(detection.next_state(), Some(StationState::InWash));
        assert_eq!(metrics.sensor_errors.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.samples_read.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_cancelled_loop_returns_none() {
        let (mut detection, _logs, metrics) =
            detection(ScriptedSensor::readings([900]), Timeouts::default());
        detection.cancel.cancel();

        assert_eq!(detection.next_state(), None);
        assert_eq!(metrics.samples_read.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_sampler_publishes_changes() {
        let (detection, _logs, _) =
            detection(ScriptedSensor::readings([100]), short_timeouts());
        let cancel = detection.cancel.clone();
        let (changes, mut rx) = broadcast::channel(64);
        let (current_tx, mut current) = watch::channel(StationState::Init);

        let task = spawn_sampler(detection, changes, current_tx);

        // Waving forever: InWash, then Done once the wash runs out
        assert_eq!(rx.recv().await.unwrap(), StationState::InWash);
        assert_eq!(rx.recv().await.unwrap(), StationState::Done);
        current.changed().await.unwrap();
        assert_ne!(*current.borrow(), StationState::Init);

        cancel.cancel();
        task.await.unwrap();
    }
}
