use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{
    api,
    classifier::ClusterClassifier,
    clients::{ExtractiveSummarizer, Summarizer, TranscriptSource, UnavailableTranscriptSource},
    config::{Config, EmbedderKind},
    embedding::{BertEmbedder, Embedder, HashingEmbedder},
    model::{ArtifactPaths, ModelStore},
    observability::Telemetry,
    retrain::{DatasetStore, RetrainOrchestrator},
    training::{GreedyKeywordMatcher, Trainer},
};

#[derive(Clone)]
pub(crate) struct AppState {
    registry: Arc<ComponentRegistry>,
}

pub struct ComponentRegistry {
    config: Arc<Config>,
    telemetry: Telemetry,
    classifier: ClusterClassifier,
    orchestrator: Arc<RetrainOrchestrator>,
    transcripts: Arc<dyn TranscriptSource>,
    summarizer: Arc<dyn Summarizer>,
}

impl AppState {
    pub(crate) fn new(registry: ComponentRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    pub(crate) fn telemetry(&self) -> &Telemetry {
        &self.registry.telemetry
    }

    pub(crate) fn config(&self) -> &Config {
        &self.registry.config
    }

    pub(crate) fn classifier(&self) -> &ClusterClassifier {
        &self.registry.classifier
    }

    pub(crate) fn orchestrator(&self) -> &Arc<RetrainOrchestrator> {
        &self.registry.orchestrator
    }

    pub(crate) fn transcripts(&self) -> Arc<dyn TranscriptSource> {
        Arc::clone(&self.registry.transcripts)
    }

    pub(crate) fn summarizer(&self) -> Arc<dyn Summarizer> {
        Arc::clone(&self.registry.summarizer)
    }
}

impl ComponentRegistry {
    /// 構成情報と依存をまとめて初期化し、アプリケーションの共有レジストリを構築する。
    ///
    /// # Errors
    /// Telemetry の初期化、埋め込みモデルのロード、成果物の読み込みが失敗した場合はエラーを返す。
    pub async fn build(config: Config) -> Result<Self> {
        let telemetry = Telemetry::new()?;
        let embedder = build_embedder(&config).await?;
        Self::with_components(
            config,
            telemetry,
            embedder,
            Arc::new(UnavailableTranscriptSource),
            Arc::new(ExtractiveSummarizer::default()),
        )
        .await
    }

    /// 外部協調コンポーネントを差し替えてレジストリを組み立てる。
    ///
    /// # Errors
    /// 永続化済み成果物の読み込みに失敗した場合はエラーを返す。
    pub async fn with_components(
        config: Config,
        telemetry: Telemetry,
        embedder: Arc<dyn Embedder>,
        transcripts: Arc<dyn TranscriptSource>,
        summarizer: Arc<dyn Summarizer>,
    ) -> Result<Self> {
        let config = Arc::new(config);
        let store = Arc::new(ModelStore::empty());
        let trainer = Trainer::new(
            Arc::clone(&embedder),
            Arc::new(GreedyKeywordMatcher),
            config.n_clusters().get(),
            config.top_n_keywords().get(),
        );
        let orchestrator = Arc::new(RetrainOrchestrator::new(
            DatasetStore::new(config.dataset_path()),
            trainer,
            Arc::clone(&store),
            ArtifactPaths::new(config.model_path(), config.category_mapping_path()),
            telemetry.clone(),
        ));
        let loaded = orchestrator
            .load_persisted()
            .await
            .context("failed to load persisted cluster model")?;
        info!(
            model_loaded = loaded,
            embedder = embedder.name(),
            n_clusters = config.n_clusters().get(),
            "component registry ready"
        );

        Ok(Self {
            classifier: ClusterClassifier::new(embedder, store),
            config,
            telemetry,
            orchestrator,
            transcripts,
            summarizer,
        })
    }

    #[must_use]
    pub fn config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    #[must_use]
    pub fn orchestrator(&self) -> Arc<RetrainOrchestrator> {
        Arc::clone(&self.orchestrator)
    }

    #[must_use]
    pub fn classifier(&self) -> &ClusterClassifier {
        &self.classifier
    }
}

/// 設定に従って埋め込みモデルを用意する。
///
/// # Errors
/// rust-bert モデルのダウンロードやロードに失敗した場合はエラーを返す。
pub async fn build_embedder(config: &Config) -> Result<Arc<dyn Embedder>> {
    let embedder: Arc<dyn Embedder> = match config.embedder() {
        EmbedderKind::Bert => {
            let embedder = tokio::task::spawn_blocking(BertEmbedder::new)
                .await
                .context("embedding model loader panicked")?
                .context("failed to load sentence embedding model")?;
            Arc::new(embedder)
        }
        EmbedderKind::Hashing => Arc::new(HashingEmbedder::new(config.hashing_dim().get())),
    };
    Ok(embedder)
}

pub fn build_router(registry: ComponentRegistry) -> Router {
    let state = AppState::new(registry);
    api::router(state).layer(TraceLayer::new_for_http())
}
