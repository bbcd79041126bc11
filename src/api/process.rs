use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::classify::{ClassificationBody, classify_summary, error_response};
use crate::{
    app::AppState,
    clients::{extract_video_id, validate_transcript},
    retrain::SampleSubmission,
    util::text::clean_text,
};

#[derive(Debug, Deserialize)]
pub(crate) struct VideoRequest {
    url: String,
}

#[derive(Debug, Serialize)]
struct ProcessVideoResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    video_id: Option<String>,
    summary: String,
    #[serde(flatten)]
    classification: ClassificationBody,
    retraining: RetrainDecision,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum RetrainDecision {
    Scheduled,
    Skipped,
}

impl RetrainDecision {
    /// 再学習を有効化しており、信頼度が閾値以上の場合だけ投入する。
    fn decide(state: &AppState, confidence: f64) -> Self {
        let config = state.config();
        if config.retrain_enabled() && confidence >= config.retrain_confidence_threshold() {
            Self::Scheduled
        } else {
            Self::Skipped
        }
    }

    /// 判定に従ってバックグラウンド投入するか、見送りとして記録する。
    pub(crate) fn schedule(state: &AppState, sample: SampleSubmission) -> Self {
        let threshold = state.config().retrain_confidence_threshold();
        let decision = Self::decide(state, sample.confidence);
        match decision {
            Self::Scheduled => {
                info!(
                    category = %sample.category,
                    confidence = sample.confidence,
                    "retraining scheduled in background"
                );
                let _background = state.orchestrator().spawn_submit(sample, threshold);
            }
            Self::Skipped => {
                let metrics = state.telemetry().metrics();
                metrics.samples_submitted.inc();
                metrics.samples_skipped.inc();
                info!(
                    confidence = sample.confidence,
                    threshold,
                    retrain_enabled = state.config().retrain_enabled(),
                    "retraining skipped; dataset untouched"
                );
            }
        }
        decision
    }
}

/// 文字起こし→要約→分類を行い、十分な信頼度なら再学習をバックグラウンドで予約する。
pub(crate) async fn process_video(
    State(state): State<AppState>,
    Json(payload): Json<VideoRequest>,
) -> Response {
    let transcript = match state.transcripts().extract_transcript(&payload.url).await {
        Ok(transcript) => transcript,
        Err(err) => {
            warn!(url = %payload.url, error = %err, "transcript extraction failed");
            return error_response(StatusCode::BAD_REQUEST, err.to_string());
        }
    };
    if let Err(err) = validate_transcript(&transcript) {
        warn!(url = %payload.url, error = %err, "transcript rejected");
        return error_response(StatusCode::BAD_REQUEST, err.to_string());
    }
    info!(
        url = %payload.url,
        transcript_chars = transcript.chars().count(),
        "transcript extracted"
    );

    let summary = match state.summarizer().summarize(&transcript).await {
        Ok(summary) => summary,
        Err(err) => {
            error!(error = %format!("{err:#}"), "summarization failed");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("summarization failed: {err:#}"),
            );
        }
    };
    let summary = clean_text(&summary);

    let classification = match classify_summary(&state, &summary).await {
        Ok(classification) => classification,
        Err(response) => return response,
    };

    let retraining = RetrainDecision::schedule(
        &state,
        SampleSubmission {
            transcript,
            summary: summary.clone(),
            category: classification.category.clone(),
            confidence: classification.confidence,
        },
    );

    let body = ProcessVideoResponse {
        video_id: extract_video_id(&payload.url),
        summary,
        classification,
        retraining,
    };
    (StatusCode::OK, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::api::test_support::{
        get, post_json, trained_registry_configured, trained_registry_with, untrained_registry,
    };
    use crate::app::build_router;
    use crate::clients::{TranscriptError, TranscriptSource};
    use crate::retrain::DatasetStore;

    #[derive(Debug)]
    struct StaticTranscript(&'static str);

    #[async_trait]
    impl TranscriptSource for StaticTranscript {
        async fn extract_transcript(&self, _url: &str) -> Result<String, TranscriptError> {
            Ok(self.0.to_string())
        }
    }

    const URL_BODY: &str = r#"{"url":"https://www.youtube.com/watch?v=dQw4w9WgXcQ"}"#;

    #[tokio::test]
    async fn unavailable_transcript_is_bad_request() {
        let (registry, _dir) = untrained_registry().await;
        let (status, body) = post_json(build_router(registry), "/process_video", URL_BODY).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("dQw4w9WgXcQ"));
    }

    #[tokio::test]
    async fn invalid_url_is_bad_request() {
        let (registry, _dir) = untrained_registry().await;
        let (status, body) = post_json(
            build_router(registry),
            "/process_video",
            r#"{"url":"https://example.com/video"}"#,
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("invalid video url"));
    }

    #[tokio::test]
    async fn transcript_with_error_text_is_rejected() {
        let (registry, _dir) = trained_registry_with(Arc::new(StaticTranscript(
            "Could not retrieve a transcript: connection reset by peer while downloading captions",
        )))
        .await;
        let (status, body) = post_json(build_router(registry), "/process_video", URL_BODY).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("network or access"));
    }

    #[tokio::test]
    async fn short_transcript_is_rejected() {
        let (registry, _dir) =
            trained_registry_with(Arc::new(StaticTranscript("Too short to use."))).await;
        let (status, _) = post_json(build_router(registry), "/process_video", URL_BODY).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    const MATCH_REPORT: &str =
        "The team won the game in the final minute. Fans celebrated the win downtown all night.";

    #[tokio::test]
    async fn confident_video_schedules_a_background_retrain() {
        let (registry, dir) = trained_registry_configured(
            Arc::new(StaticTranscript(MATCH_REPORT)),
            // コサイン類似度由来の信頼度は常に -100 以上
            |config| config.with_retrain_confidence_threshold(-1000.0),
        )
        .await;
        let store = Arc::clone(registry.classifier().store());
        let (status, body) = post_json(build_router(registry), "/process_video", URL_BODY).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["video_id"], "dQw4w9WgXcQ");
        let summary = body["summary"].as_str().unwrap().to_string();
        assert!(summary.starts_with("the team won the game in the final minute fans"));
        assert!(body["cluster"].as_u64().unwrap() < 2);
        assert_eq!(body["retraining"], "scheduled");

        let mut version = 1;
        for _ in 0..100 {
            version = store.snapshot().await.map_or(version, |snapshot| snapshot.version);
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
        assert_eq!(rows[4].transcript, MATCH_REPORT);
        assert_eq!(rows[4].summary, summary);
        assert_eq!(rows[4].category, body["category"].as_str().unwrap());
    }

    #[tokio::test]
    async fn video_below_threshold_is_recorded_as_skipped() {
        let (registry, dir) = trained_registry_configured(
            Arc::new(StaticTranscript(MATCH_REPORT)),
            |config| config.with_retrain_confidence_threshold(1000.0),
        )
        .await;
        let app = build_router(registry);
        let (status, body) = post_json(app.clone(), "/process_video", URL_BODY).await;

        assert_eq!(status, StatusCode::OK);
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
    async fn disabled_retraining_skips_confident_videos() {
        let (registry, _dir) = trained_registry_configured(
            Arc::new(StaticTranscript(MATCH_REPORT)),
            |config| {
                config
                    .with_retrain_confidence_threshold(-1000.0)
                    .with_retrain_enabled(false)
            },
        )
        .await;
        let (status, body) = post_json(build_router(registry), "/process_video", URL_BODY).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["retraining"], "skipped");
    }
}
