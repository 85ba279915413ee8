use axum::{Json, extract::State, response::IntoResponse};

use crate::AppState;
use crate::metrics;

/// Health check endpoint - returns station status and current state
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let metrics = state.metrics.snapshot();
    let current = *state.current.borrow();

    // A sensor that has failed more often than it has answered is suspect
    let status = if metrics.sensor.errors > 0 && metrics.sensor.errors >= metrics.sensor.samples {
        "degraded"
    } else {
        "healthy"
    };

    Json(metrics::HealthStatus {
        status: status.to_string(),
        state: current,
        stream_clients: metrics.streams.active,
        uptime_secs: metrics.uptime_secs,
    })
}

/// Metrics endpoint - returns detailed station metrics
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.metrics.snapshot())
}

/// Liveness probe - returns 200 if the server is running
pub async fn health_live_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "alive" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Router,
        body::Body,
        http::{Request, StatusCode},
        routing::get,
    };
    use station_core::StationState;
    use tokio::sync::watch;
    use tower::ServiceExt;

    async fn get_json(app: Router, uri: &str) -> serde_json::Value {
        let resp = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_health_reports_current_state() {
        let (mut state, _logs) = crate::test_helpers::test_app_state();
        let (_current_tx, current) = watch::channel(StationState::InWash);
        state.current = current;
        let app = Router::new()
            .route("/health", get(health_handler))
            .with_state(state);

        let json = get_json(app, "/health").await;
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["state"], "INWASH");
        assert_eq!(json["stream_clients"], 0);
    }

    #[tokio::test]
    async fn test_health_degraded_when_sensor_failing() {
        let (state, _logs) = crate::test_helpers::test_app_state();
        state.metrics.sensor_error();
        let app = Router::new()
            .route("/health", get(health_handler))
            .with_state(state);

        let json = get_json(app, "/health").await;
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["state"], "INIT");
    }

    #[tokio::test]
    async fn test_metrics_snapshot() {
        let (state, _logs) = crate::test_helpers::test_app_state();
        state.metrics.sample_read();
        state.metrics.log_dropped();
        let app = Router::new()
            .route("/metrics", get(metrics_handler))
            .with_state(state);

        let json = get_json(app, "/metrics").await;
        assert_eq!(json["sensor"]["samples"], 1);
        assert_eq!(json["logging"]["dropped"], 1);
        assert_eq!(json["streams"]["active"], 0);
    }

    #[tokio::test]
    async fn test_live_probe() {
        let app = Router::new().route("/health/live", get(health_live_handler));
        let json = get_json(app, "/health/live").await;
        assert_eq!(json["status"], "alive");
    }
}
