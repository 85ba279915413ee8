//! Station metrics for observability
//!
//! Counters for the sampler, the usage logger and the live streams.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use station_core::StationState;

/// Station-wide metrics
#[derive(Debug, Default)]
pub struct StationMetrics {
    // Sensor metrics
    /// Samples fed to the smoother
    pub samples_read: AtomicU64,
    /// Reads that failed and were skipped
    pub sensor_errors: AtomicU64,

    // State machine metrics
    /// State changes published
    pub transitions: AtomicU64,

    // Usage logging metrics
    /// Events accepted onto the logger queue
    pub log_events_queued: AtomicU64,
    /// Events the collector acknowledged with 2xx
    pub log_events_sent: AtomicU64,
    /// Events lost to network errors or non-2xx replies
    pub log_events_failed: AtomicU64,
    /// Events dropped because the queue was full or closed
    pub log_events_dropped: AtomicU64,

    // Stream metrics
    /// Currently connected stream clients
    pub active_streams: AtomicU64,
    /// Stream clients since start
    pub total_streams: AtomicU64,

    /// Start time (for uptime calculation)
    start_time: Option<Instant>,
}

impl StationMetrics {
    pub fn new() -> Self {
        Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    pub fn sample_read(&self) {
        self.samples_read.fetch_add(1, Ordering::Relaxed);
    }

    pub fn sensor_error(&self) {
        self.sensor_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn transition(&self) {
        self.transitions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn log_queued(&self) {
        self.log_events_queued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn log_sent(&self) {
        self.log_events_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn log_failed(&self) {
        self.log_events_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn log_dropped(&self) {
        self.log_events_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stream_opened(&self) {
        self.active_streams.fetch_add(1, Ordering::Relaxed);
        self.total_streams.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stream_closed(&self) {
        self.active_streams.fetch_sub(1, Ordering::Relaxed);
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.map(|t| t.elapsed().as_secs()).unwrap_or(0)
    }

    /// Create a snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.uptime_secs(),
            sensor: SensorMetrics {
                samples: self.samples_read.load(Ordering::Relaxed),
                errors: self.sensor_errors.load(Ordering::Relaxed),
            },
            transitions: self.transitions.load(Ordering::Relaxed),
            logging: LoggingMetrics {
                queued: self.log_events_queued.load(Ordering::Relaxed),
                sent: self.log_events_sent.load(Ordering::Relaxed),
                failed: self.log_events_failed.load(Ordering::Relaxed),
                dropped: self.log_events_dropped.load(Ordering::Relaxed),
            },
            streams: StreamMetrics {
                active: self.active_streams.load(Ordering::Relaxed),
                total: self.total_streams.load(Ordering::Relaxed),
            },
        }
    }
}

/// Serializable snapshot of metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub sensor: SensorMetrics,
    pub transitions: u64,
    pub logging: LoggingMetrics,
    pub streams: StreamMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorMetrics {
    pub samples: u64,
    pub errors: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingMetrics {
    pub queued: u64,
    pub sent: u64,
    pub failed: u64,
    pub dropped: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamMetrics {
    pub active: u64,
    pub total: u64,
}

/// Health status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    /// Serialized by wire name, e.g. `"INWASH"`
    pub state: StationState,
    pub stream_clients: u64,
    pub uptime_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_tracking() {
        let metrics = StationMetrics::new();

        metrics.stream_opened();
        metrics.stream_opened();
        assert_eq!(metrics.active_streams.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.total_streams.load(Ordering::Relaxed), 2);

        metrics.stream_closed();
        assert_eq!(metrics.active_streams.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.total_streams.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_snapshot() {
        let metrics = StationMetrics::new();
        metrics.sample_read();
        metrics.sample_read();
        metrics.sensor_error();
        metrics.transition();
        metrics.log_queued();
        metrics.log_failed();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.sensor.samples, 2);
        assert_eq!(snapshot.sensor.errors, 1);
        assert_eq!(snapshot.transitions, 1);
        assert_eq!(snapshot.logging.queued, 1);
        assert_eq!(snapshot.logging.failed, 1);
        assert_eq!(snapshot.logging.sent, 0);
    }
}
