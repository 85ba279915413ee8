use std::sync::Arc;

use station_core::{LogEvent, StationState};
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::AppState;
use crate::event_logger::EventLogger;
use crate::metrics::StationMetrics;

/// Build an `AppState` with no sampler and no delivery task behind it.
///
/// Returns the logger's queue so tests can assert on dispatched events. Tests
/// drive state by sending on `state.changes` directly; the `current` receiver
/// starts at `Init` and its sender is already gone.
pub fn test_app_state() -> (AppState, mpsc::Receiver<LogEvent>) {
    let metrics = Arc::new(StationMetrics::new());
    let (logger, logs) = EventLogger::with_queue(16, metrics.clone());
    let (changes, _) = broadcast::channel(16);
    let (_current_tx, current) = watch::channel(StationState::Init);

    let state = AppState {
        changes,
        current,
        logger,
        metrics,
        cancel: CancellationToken::new(),
    };

    (state, logs)
}
