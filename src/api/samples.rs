use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use super::{classify::error_response, process::RetrainDecision};
use crate::{app::AppState, retrain::SampleSubmission};

#[derive(Debug, Deserialize)]
pub(crate) struct SampleRequest {
    transcript: String,
    summary: String,
    category: String,
    confidence: f64,
}

#[derive(Debug, Serialize)]
struct SampleAccepted {
    retraining: RetrainDecision,
    threshold: f64,
}

pub(crate) async fn submit(
    State(state): State<AppState>,
    Json(payload): Json<SampleRequest>,
) -> Response {
    for (field, value) in [
        ("transcript", &payload.transcript),
        ("summary", &payload.summary),
        ("category", &payload.category),
    ] {
        if value.trim().is_empty() {
            return error_response(
                StatusCode::UNPROCESSABLE_ENTITY,
                format!("`{field}` must not be empty"),
            );
        }
    }

    let threshold = state.config().retrain_confidence_threshold();
    let retraining = RetrainDecision::schedule(
        &state,
        SampleSubmission {
            transcript: payload.transcript,
            summary: payload.summary,
            category: payload.category,
            confidence: payload.confidence,
        },
    );

    (
        StatusCode::ACCEPTED,
        Json(SampleAccepted {
            retraining,
            threshold,
        }),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::api::test_support::{get, post_json, ready_registry};
    use crate::app::build_router;
    use crate::retrain::DatasetStore;

    #[tokio::test]
    async fn low_confidence_sample_leaves_dataset_untouched() {
        let (registry, dir) = ready_registry().await;
        let app = build_router(registry);

        let (status, body) = post_json(
            app.clone(),
            "/v1/samples",
            r#"{"transcript":"new transcript","summary":"a quiet day","category":"sports","confidence":15.0}"#,
        )
        .await;

        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["retraining"], "skipped");
        let (_, metrics) = get(app, "/metrics").await;
        assert!(metrics.contains("newsblink_samples_submitted_total 1"));
        assert!(metrics.contains("newsblink_samples_skipped_total 1"));
        let rows = DatasetStore::new(dir.path().join("dataset.json"))
            .load()
            .await
            .unwrap();
        assert_eq!(rows.len(), 4);
    }

    #[tokio::test]
    async fn confident_sample_is_appended_in_background() {
        let (registry, dir) = ready_registry().await;
        let store = registry.classifier().store().clone();
        let app = build_router(registry);

        let (status, body) = post_json(
            app,
            "/v1/samples",
            r#"{"transcript":"a new match report","summary":"The team won again at home","category":"sports","confidence":72.5}"#,
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["retraining"], "scheduled");

        let mut version = 1;
        for _ in 0..100 {
            if let Some(snapshot) = store.snapshot().await {
                version = snapshot.version;
            }
            if version == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert_eq!(version, 2);
        let rows = DatasetStore::new(dir.path().join("dataset.json"))
            .load()
            .await
            .unwrap();
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[4].transcript, "a new match report");
    }

    #[tokio::test]
    async fn empty_fields_are_rejected() {
        let (registry, _dir) = ready_registry().await;
        let (status, body) = post_json(
            build_router(registry),
            "/v1/samples",
            r#"{"transcript":" ","summary":"s","category":"c","confidence":90.0}"#,
        )
        .await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["error"].as_str().unwrap().contains("transcript"));
    }
}
