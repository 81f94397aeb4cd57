use std::path::PathBuf;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use tracing::{error, info};

#[derive(Clone)]
pub struct HealthState {
    transcript_dir: PathBuf,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub storage: HealthCheck,
    pub checked_at: String,
}

pub fn router(transcript_dir: PathBuf) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { transcript_dir })
}

pub async fn spawn(bind_address: &str, port: u16, transcript_dir: PathBuf) -> std::io::Result<()> {
    let address = format!("{bind_address}:{port}");
    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!(
        event_name = "system.health.start",
        correlation_id = "bootstrap",
        bind_address = %address,
        "health endpoint started"
    );

    tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, router(transcript_dir)).await {
            error!(
                event_name = "system.health.error",
                correlation_id = "bootstrap",
                error = %error,
                "health endpoint server terminated unexpectedly"
            );
        }
    });

    Ok(())
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let storage = storage_check(&state.transcript_dir).await;
    let ready = storage.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "tariffsim-server runtime initialized".to_string(),
        },
        storage,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

/// Writes and removes a probe file so readiness reflects actual transcript
/// writability, not just directory existence.
async fn storage_check(transcript_dir: &PathBuf) -> HealthCheck {
    let probe = transcript_dir.join(".health_probe");
    match tokio::fs::write(&probe, b"probe").await {
        Ok(()) => {
            let _ = tokio::fs::remove_file(&probe).await;
            HealthCheck { status: "ready", detail: "transcript directory is writable".to_string() }
        }
        Err(error) => HealthCheck {
            status: "degraded",
            detail: format!("transcript directory write failed: {error}"),
        },
    }
}

#[cfg(test)]
mod tests {
    use axum::{extract::State, http::StatusCode, Json};

    use crate::health::{health, HealthState};

    #[tokio::test]
    async fn health_returns_ready_when_storage_is_writable() {
        let dir = tempfile::tempdir().expect("tempdir");

        let (status, Json(payload)) =
            health(State(HealthState { transcript_dir: dir.path().to_path_buf() })).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.status, "ready");
        assert_eq!(payload.storage.status, "ready");
        assert_eq!(payload.service.status, "ready");
        assert!(!dir.path().join(".health_probe").exists());
    }

    #[tokio::test]
    async fn health_returns_service_unavailable_when_storage_is_missing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("does-not-exist");

        let (status, Json(payload)) =
            health(State(HealthState { transcript_dir: missing })).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(payload.status, "degraded");
        assert_eq!(payload.storage.status, "degraded");
        assert_eq!(payload.service.status, "ready");
    }
}
