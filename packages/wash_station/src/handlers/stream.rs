use axum::{
    extract::State,
    response::sse::{Event, Sse},
};
use futures::stream::{self, Stream};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use station_core::StationState;

use crate::AppState;
use crate::metrics::StationMetrics;

/// Keeps the active stream count honest however the stream ends.
struct StreamGuard {
    metrics: Arc<StationMetrics>,
}

impl StreamGuard {
    fn new(metrics: Arc<StationMetrics>) -> Self {
        metrics.stream_opened();
        Self { metrics }
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.metrics.stream_closed();
        debug!("stream client disconnected");
    }
}

struct Subscription {
    changes: broadcast::Receiver<StationState>,
    current: watch::Receiver<StationState>,
    cancel: CancellationToken,
    last_sent: Option<StationState>,
    _guard: StreamGuard,
}

impl Subscription {
    /// Next state to push, or `None` when the stream should end.
    async fn next(&mut self) -> Option<StationState> {
        loop {
            let received = tokio::select! {
                _ = self.cancel.cancelled() => return None,
                received = self.changes.recv() => received,
            };
            let state = match received {
                Ok(state) => state,
                Err(RecvError::Lagged(skipped)) => {
                    // Skip the stale tail and jump to where the station is now
                    debug!(skipped, "stream client lagged, sending current state");
                    self.discard_backlog();
                    *self.current.borrow()
                }
                Err(RecvError::Closed) => return None,
            };
            // The sampler updates `current` before broadcasting, so a change
            // racing the resync can arrive again right after it
            if self.last_sent != Some(state) {
                self.last_sent = Some(state);
                return Some(state);
            }
        }
    }

    /// Drop everything already queued for this client.
    fn discard_backlog(&mut self) {
        loop {
            match self.changes.try_recv() {
                Ok(_) | Err(TryRecvError::Lagged(_)) => {}
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
    }
}

/// Live state stream: one `data: <STATE>` event per state change.
pub async fn stream_handler(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let subscription = Subscription {
        changes: state.changes.subscribe(),
        current: state.current.clone(),
        cancel: state.cancel.clone(),
        last_sent: None,
        _guard: StreamGuard::new(state.metrics.clone()),
    };
    debug!("stream client connected");

    let stream = stream::unfold(subscription, |mut sub| async move {
        let station_state = sub.next().await?;
        Some((Ok(Event::default().data(station_state.wire_name())), sub))
    });

    Sse::new(stream)
}
