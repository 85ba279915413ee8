//! Usage Event Logger
//!
//! Reports station milestones to a remote collector as
//! `POST <base>/log-event?deviceID=<id>&logEventID=<code>`.
//!
//! Delivery is best-effort. `dispatch` never blocks and never fails: events go
//! onto a bounded queue drained by one background task, and anything that
//! goes wrong after that (full queue, refused connection, timeout, non-2xx
//! reply) is logged here and otherwise forgotten. There are no retries.

use anyhow::{Context, Result};
use reqwest::Url;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

use station_core::LogEvent;

use crate::config::LoggerConfig;
use crate::metrics::StationMetrics;

/// Cheap, cloneable handle for reporting log events.
#[derive(Clone)]
pub struct EventLogger {
    tx: Option<mpsc::Sender<LogEvent>>,
    metrics: Arc<StationMetrics>,
}

impl EventLogger {
    /// Start the delivery task and return a handle to it.
    ///
    /// Must be called inside a Tokio runtime. The task exits once every
    /// handle has been dropped and the queue is drained.
    pub fn spawn(
        config: &LoggerConfig,
        metrics: Arc<StationMetrics>,
    ) -> Result<(Self, Option<tokio::task::JoinHandle<()>>)> {
        if !config.enabled {
            info!("Usage logging disabled");
            return Ok((Self::disabled(metrics), None));
        }

        let endpoint = log_endpoint(&config.base_url)?;
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("Failed to build HTTP client for usage logging")?;

        info!(
            "Usage logging to {} as device {} (queue {})",
            endpoint, config.device_id, config.queue_capacity
        );

        let (logger, rx) = Self::with_queue(config.queue_capacity, metrics.clone());
        let worker = Delivery {
            client,
            endpoint,
            device_id: config.device_id.clone(),
            metrics,
        };
        let handle = tokio::spawn(worker.run(rx));
        Ok((logger, Some(handle)))
    }

    /// A handle that drops every event.
    pub fn disabled(metrics: Arc<StationMetrics>) -> Self {
        Self { tx: None, metrics }
    }

    /// A handle plus the receiving end of its queue, with no delivery task.
    pub(crate) fn with_queue(
        capacity: usize,
        metrics: Arc<StationMetrics>,
    ) -> (Self, mpsc::Receiver<LogEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx: Some(tx),
                metrics,
            },
            rx,
        )
    }

    /// Queue an event for delivery. Safe to call from blocking threads.
    pub fn dispatch(&self, event: LogEvent) {
        let Some(tx) = &self.tx else {
            debug!(event = %event, "usage logging disabled, skipping");
            return;
        };

        match tx.try_send(event) {
            Ok(()) => {
                self.metrics.log_queued();
                debug!(event = %event, "queued usage event");
            }
            Err(TrySendError::Full(event)) => {
                self.metrics.log_dropped();
                warn!(event = %event, "usage log queue full, dropping event");
            }
            Err(TrySendError::Closed(event)) => {
                self.metrics.log_dropped();
                warn!(event = %event, "usage logger stopped, dropping event");
            }
        }
    }
}

/// `<base>/log-event`, tolerating a base URL with or without a trailing slash.
pub fn log_endpoint(base_url: &str) -> Result<Url> {
    let mut base = base_url.to_string();
    if !base.ends_with('/') {
        base.push('/');
    }
    let base = Url::parse(&base).with_context(|| format!("Invalid collector URL: {base_url}"))?;
    base.join("log-event")
        .with_context(|| format!("Invalid collector URL: {base_url}"))
}

/// Full request URL for one event.
pub fn build_log_url(endpoint: &Url, device_id: &str, event: LogEvent) -> Url {
    let mut url = endpoint.clone();
    url.query_pairs_mut()
        .append_pair("deviceID", device_id)
        .append_pair("logEventID", &event.code().to_string());
    url
}

struct Delivery {
    client: reqwest::Client,
    endpoint: Url,
    device_id: String,
    metrics: Arc<StationMetrics>,
}

impl Delivery {
    async fn run(self, mut rx: mpsc::Receiver<LogEvent>) {
        while let Some(event) = rx.recv().await {
            self.deliver(event).await;
        }
        debug!("usage logger queue closed");
    }

    async fn deliver(&self, event: LogEvent) {
        let url = build_log_url(&self.endpoint, &self.device_id, event);
        match self.client.post(url).send().await {
            Ok(resp) if resp.status().is_success() => {
                self.metrics.log_sent();
                debug!(event = %event, "usage event delivered");
            }
            Ok(resp) => {
                self.metrics.log_failed();
                warn!(event = %event, status = %resp.status(), "collector rejected usage event");
            }
            Err(e) => {
                self.metrics.log_failed();
                warn!(event = %event, "Error connecting to logging server: {}", e);
            }
        }
    }
}
