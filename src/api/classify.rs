use std::time::Instant;

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    app::AppState, classifier::Classification, error::ClassifyError, model::ClusterIndex,
    util::text::clean_text,
};

#[derive(Debug, Deserialize)]
pub(crate) struct ClassifyRequest {
    text: String,
}

/// 分類結果をクライアント向けに整形したもの。
#[derive(Debug, Serialize)]
pub(crate) struct ClassificationBody {
    pub(crate) cluster: ClusterIndex,
    pub(crate) category: String,
    pub(crate) confidence: f64,
    pub(crate) confidence_label: &'static str,
    pub(crate) confidence_explanation: String,
    pub(crate) model_version: u64,
}

impl From<Classification> for ClassificationBody {
    fn from(classification: Classification) -> Self {
        Self {
            confidence_label: classification.band.label(),
            confidence_explanation: classification.band.explanation(&classification.category),
            cluster: classification.cluster,
            category: classification.category,
            confidence: classification.confidence,
            model_version: classification.model_version,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ErrorResponse {
    pub(crate) error: String,
}

pub(crate) fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

fn classify_error_response(error: &ClassifyError) -> Response {
    let status = match error {
        ClassifyError::ModelNotReady => StatusCode::SERVICE_UNAVAILABLE,
        ClassifyError::InvalidInput(_) => StatusCode::UNPROCESSABLE_ENTITY,
        ClassifyError::InvalidCluster { .. } | ClassifyError::Embedding(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    error_response(status, error.to_string())
}

/// 要約を整形して分類する。`/v1/classify` と `/process_video` の共通経路。
pub(crate) async fn classify_summary(
    state: &AppState,
    summary: &str,
) -> Result<ClassificationBody, Response> {
    let cleaned = clean_text(summary);
    if cleaned.is_empty() {
        return Err(error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            "text has no classifiable content",
        ));
    }

    let metrics = state.telemetry().metrics();
    let started = Instant::now();
    let result = state.classifier().classify_with_confidence(&cleaned).await;
    metrics
        .classify_duration
        .observe(started.elapsed().as_secs_f64());

    match result {
        Ok(classification) => {
            metrics.classifications.inc();
            info!(
                cluster = classification.cluster,
                category = %classification.category,
                confidence = classification.confidence,
                model_version = classification.model_version,
                "classified summary"
            );
            Ok(classification.into())
        }
        Err(error) => {
            metrics.classification_failures.inc();
            warn!(error = %error, "classification failed");
            Err(classify_error_response(&error))
        }
    }
}

pub(crate) async fn classify(
    State(state): State<AppState>,
    Json(payload): Json<ClassifyRequest>,
) -> Response {
    match classify_summary(&state, &payload.text).await {
        Ok(body) => (StatusCode::OK, Json(body)).into_response(),
        Err(response) => response,
    }
}
