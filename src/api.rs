pub(crate) mod classify;
pub(crate) mod health;
pub(crate) mod metrics;
pub(crate) mod process;
pub(crate) mod samples;

use axum::{
    Json, Router,
    routing::{get, post},
};
use serde::Serialize;

use crate::app::AppState;

#[derive(Debug, Serialize)]
struct Welcome {
    message: &'static str,
}

pub(crate) fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health/ready", get(health::ready))
        .route("/health/live", get(health::live))
        .route("/metrics", get(metrics::exporter))
        .route("/v1/classify", post(classify::classify))
        .route("/process_video", post(process::process_video))
        .route("/v1/samples", post(samples::submit))
        .with_state(state)
}

async fn root() -> Json<Welcome> {
    Json(Welcome {
        message: "Welcome to the NewsBlink API",
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::{num::NonZeroUsize, sync::Arc};

    use axum::{
        Router,
        body::Body,
        http::{Request, StatusCode},
    };
    use serde_json::Value;
    use tempfile::TempDir;
    use tower::ServiceExt;

    use crate::{
        app::ComponentRegistry,
        clients::{ExtractiveSummarizer, TranscriptSource, UnavailableTranscriptSource},
        config::Config,
        embedding::HashingEmbedder,
        observability::Telemetry,
        retrain::{DatasetRow, DatasetStore},
    };

    pub(crate) fn test_config(dir: &TempDir) -> Config {
        Config::with_paths(
            dir.path().join("dataset.json"),
            dir.path().join("models/agnes_model.json"),
            dir.path().join("models/cluster_category_mapping.json"),
        )
        .with_n_clusters(NonZeroUsize::new(2).expect("non-zero"))
        .with_hashing_dim(NonZeroUsize::new(64).expect("non-zero"))
    }

    pub(crate) async fn registry_with(
        dir: &TempDir,
        transcripts: Arc<dyn TranscriptSource>,
    ) -> ComponentRegistry {
        registry_configured(test_config(dir), transcripts).await
    }

    pub(crate) async fn registry_configured(
        config: Config,
        transcripts: Arc<dyn TranscriptSource>,
    ) -> ComponentRegistry {
        let embedder = Arc::new(HashingEmbedder::new(config.hashing_dim().get()));
        ComponentRegistry::with_components(
            config,
            Telemetry::metrics_only().expect("metrics"),
            embedder,
            transcripts,
            Arc::new(ExtractiveSummarizer::default()),
        )
        .await
        .expect("registry builds")
    }

    pub(crate) async fn untrained_registry() -> (ComponentRegistry, TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = registry_with(&dir, Arc::new(UnavailableTranscriptSource)).await;
        (registry, dir)
    }

    pub(crate) async fn seed_dataset(dir: &TempDir) {
        let rows = vec![
            DatasetRow::new(
                "transcript about the final match",
                "The team won the game in extra time",
                "sports",
            ),
            DatasetRow::new(
                "transcript about the league",
                "Fans cheered as the team scored to win the game",
                "sports",
            ),
            DatasetRow::new(
                "transcript about the vote",
                "The president called an election after the vote",
                "politics",
            ),
            DatasetRow::new(
                "transcript about the parliament",
                "Voters head to the election to choose a president",
                "politics",
            ),
        ];
        DatasetStore::new(dir.path().join("dataset.json"))
            .save(&rows)
            .await
            .expect("dataset saved");
    }

    pub(crate) async fn trained_registry_with(
        transcripts: Arc<dyn TranscriptSource>,
    ) -> (ComponentRegistry, TempDir) {
        trained_registry_configured(transcripts, |config| config).await
    }

    /// 既定のテスト設定を `adjust` で変更してから学習済みレジストリを作る。
    pub(crate) async fn trained_registry_configured(
        transcripts: Arc<dyn TranscriptSource>,
        adjust: impl FnOnce(Config) -> Config,
    ) -> (ComponentRegistry, TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        seed_dataset(&dir).await;
        let config = adjust(test_config(&dir));
        let registry = registry_configured(config, transcripts).await;
        registry
            .orchestrator()
            .retrain_from_dataset()
            .await
            .expect("initial training succeeds");
        (registry, dir)
    }

    pub(crate) async fn ready_registry() -> (ComponentRegistry, TempDir) {
        trained_registry_with(Arc::new(UnavailableTranscriptSource)).await
    }

    pub(crate) async fn post_json(app: Router, path: &str, body: &str) -> (StatusCode, Value) {
        let request = Request::post(path)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request builds");
        let response = app.oneshot(request).await.expect("request succeeds");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body collects");
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    pub(crate) async fn get(app: Router, path: &str) -> (StatusCode, String) {
        let request = Request::get(path)
            .body(Body::empty())
            .expect("request builds");
        let response = app.oneshot(request).await.expect("request succeeds");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body collects");
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use super::test_support::{get, ready_registry, untrained_registry};
    use crate::app::build_router;

    #[tokio::test]
    async fn root_returns_welcome_message() {
        let (registry, _dir) = untrained_registry().await;
        let (status, body) = get(build_router(registry), "/").await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("Welcome to the NewsBlink API"));
    }

    #[tokio::test]
    async fn readiness_is_degraded_until_a_model_is_loaded() {
        let (registry, _dir) = untrained_registry().await;
        let (status, body) = get(build_router(registry), "/health/ready").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body.contains("degraded"));

        let (registry, _dir) = ready_registry().await;
        let (status, body) = get(build_router(registry), "/health/ready").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains(r#""model_version":1"#));
    }

    #[tokio::test]
    async fn liveness_does_not_depend_on_the_model() {
        let (registry, _dir) = untrained_registry().await;
        let (status, body) = get(build_router(registry), "/health/live").await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("live"));
    }

    #[tokio::test]
    async fn metrics_expose_retrain_counters() {
        let (registry, _dir) = ready_registry().await;
        let (status, body) = get(build_router(registry), "/metrics").await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("newsblink_retrain_completed_total 1"));
        assert!(body.contains("newsblink_model_version 1"));
    }
}
