use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;
use tracing::warn;

use crate::app::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) struct HealthReport {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    model_version: Option<u64>,
}

impl HealthReport {
    fn ready(model_version: u64) -> Self {
        Self {
            status: "ready",
            detail: None,
            model_version: Some(model_version),
        }
    }

    fn degraded(detail: impl Into<String>) -> Self {
        Self {
            status: "degraded",
            detail: Some(detail.into()),
            model_version: None,
        }
    }
}

pub(crate) async fn ready(
    State(state): State<AppState>,
) -> Result<Json<HealthReport>, (StatusCode, Json<HealthReport>)> {
    let snapshot = state.classifier().store().snapshot().await;
    state.telemetry().record_ready_probe(snapshot.is_some());

    match snapshot {
        Some(snapshot) => Ok(Json(HealthReport::ready(snapshot.version))),
        None => {
            warn!("readiness check failed: cluster model is not loaded");
            Err((
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthReport::degraded(
                    "cluster model is not trained yet; run train_model first",
                )),
            ))
        }
    }
}

pub(crate) async fn live(State(state): State<AppState>) -> Json<HealthReport> {
    state.telemetry().record_live_probe();
    Json(HealthReport {
        status: "live",
        detail: None,
        model_version: None,
    })
}
