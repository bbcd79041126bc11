//! データセット追記と全件再学習の直列化。
//!
//! データセットファイルとモデル成果物の差し替えは1つの非同期ミューテックスで守る。
//! 分類経路はこのロックを取らず、[`ModelStore`] のスナップショットだけを読む。
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Instant;

use anyhow::Context;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::dataset::{DatasetRow, DatasetStore, contains_transcript};
use crate::error::RetrainError;
use crate::model::{ArtifactPaths, ModelSnapshot, ModelStore};
use crate::observability::Telemetry;
use crate::training::{LabeledSummary, Trainer};
use crate::util::text::normalize_for_clustering;

/// 再学習サイクルの進行段階。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum RetrainStage {
    Idle = 0,
    EmbeddingInProgress = 1,
    ClusteringInProgress = 2,
    LabelMatching = 3,
    PersistingArtifacts = 4,
}

impl RetrainStage {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::EmbeddingInProgress,
            2 => Self::ClusteringInProgress,
            3 => Self::LabelMatching,
            4 => Self::PersistingArtifacts,
            _ => Self::Idle,
        }
    }
}

/// サイクル中の段階を記録し、どの経路で抜けても `Idle` に戻す。
struct StageGuard<'a> {
    cell: &'a AtomicU8,
}

impl<'a> StageGuard<'a> {
    fn new(cell: &'a AtomicU8) -> Self {
        Self { cell }
    }

    fn enter(&self, stage: RetrainStage) {
        self.cell.store(stage as u8, Ordering::Release);
    }
}

impl Drop for StageGuard<'_> {
    fn drop(&mut self) {
        self.cell.store(RetrainStage::Idle as u8, Ordering::Release);
    }
}

/// 再学習の対象候補として投入される1件。
#[derive(Debug, Clone, PartialEq)]
pub struct SampleSubmission {
    pub transcript: String,
    pub summary: String,
    pub category: String,
    pub confidence: f64,
}

/// `submit_sample` の結果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// 信頼度が閾値未満のため何もしなかった。
    SkippedLowConfidence,
    /// 同じ transcript が既にあった。保留中の行があれば再学習したバージョンを持つ。
    Duplicate { retrained: Option<u64> },
    /// 追記して再学習した。
    Retrained { version: u64, rows: usize },
}

#[derive(Debug)]
pub struct RetrainOrchestrator {
    dataset: Mutex<DatasetStore>,
    trainer: Trainer,
    store: Arc<ModelStore>,
    artifacts: ArtifactPaths,
    telemetry: Telemetry,
    stage: AtomicU8,
}

impl RetrainOrchestrator {
    #[must_use]
    pub fn new(
        dataset: DatasetStore,
        trainer: Trainer,
        store: Arc<ModelStore>,
        artifacts: ArtifactPaths,
        telemetry: Telemetry,
    ) -> Self {
        Self {
            dataset: Mutex::new(dataset),
            trainer,
            store,
            artifacts,
            telemetry,
            stage: AtomicU8::new(RetrainStage::Idle as u8),
        }
    }

    #[must_use]
    pub fn stage(&self) -> RetrainStage {
        RetrainStage::from_u8(self.stage.load(Ordering::Acquire))
    }

    #[must_use]
    pub fn store(&self) -> &Arc<ModelStore> {
        &self.store
    }

    /// 永続化済みの成果物を読み込んでスナップショットとして公開する。
    ///
    /// 埋め込み次元が現在の埋め込みモデルと合わない成果物は公開しない。
    ///
    /// # Errors
    /// 成果物ファイルの読み込みやパースに失敗した場合はエラーを返す。
    pub async fn load_persisted(&self) -> anyhow::Result<bool> {
        let dataset = self.dataset.lock().await;
        let paths = self.artifacts.clone();
        let loaded = tokio::task::spawn_blocking(move || paths.load())
            .await
            .context("artifact loading task failed")??;

        let rows = dataset.load().await.map_or(0, |rows| rows.len());
        self.telemetry.metrics().dataset_rows.set(count_gauge(rows));

        let Some((model, mapping)) = loaded else {
            info!(model = %self.artifacts.model.display(), "no persisted cluster model; waiting for training");
            return Ok(false);
        };

        let expected = self.trainer.embedder().dimension();
        if model.dimension() != Some(expected) {
            warn!(
                model_dimension = ?model.dimension(),
                embedder_dimension = expected,
                embedder = self.trainer.embedder().name(),
                "persisted model was trained with another embedding space; ignoring it"
            );
            return Ok(false);
        }

        let snapshot = self.store.replace(model, mapping).await;
        self.telemetry.metrics().model_version.set(version_gauge(snapshot.version));
        Ok(true)
    }

    /// 新しいサンプルをデータセットへ追記し、全件で再学習する。
    ///
    /// 信頼度が `threshold` 未満なら何もしない。同じ transcript が既にあれば追記せず、
    /// 読み込み済みモデルがデータセットの全行を反映していない場合にだけ再学習する。
    ///
    /// # Errors
    /// データセットの読み書き、学習、永続化のいずれかが失敗した場合は [`RetrainError`]。
    /// 失敗時も既存の成果物とスナップショットは変更されない。
    pub async fn submit_sample(
        &self,
        sample: SampleSubmission,
        threshold: f64,
    ) -> Result<SubmitOutcome, RetrainError> {
        let metrics = self.telemetry.metrics();
        metrics.samples_submitted.inc();

        if sample.confidence.is_nan() || sample.confidence < threshold {
            metrics.samples_skipped.inc();
            info!(
                confidence = sample.confidence,
                threshold, "confidence below retrain threshold; retraining skipped"
            );
            return Ok(SubmitOutcome::SkippedLowConfidence);
        }

        let dataset = self.dataset.lock().await;
        let mut rows = dataset.load().await?;

        let duplicate = contains_transcript(&rows, &sample.transcript);
        if duplicate {
            metrics.samples_deduplicated.inc();
            let pending = match self.store.snapshot().await {
                Some(snapshot) => snapshot.model.sample_count() != rows.len(),
                None => true,
            };
            if !pending {
                info!(rows = rows.len(), "transcript already in dataset; model is current");
                return Ok(SubmitOutcome::Duplicate { retrained: None });
            }
            info!(rows = rows.len(), "transcript already in dataset; retraining pending rows");
        } else {
            rows.push(DatasetRow {
                transcript: sample.transcript,
                summary: sample.summary,
                category: sample.category,
            });
            dataset.save(&rows).await?;
            metrics.dataset_rows.set(count_gauge(rows.len()));
            info!(rows = rows.len(), "appended sample to dataset");
        }

        let snapshot = self.retrain_locked(&rows).await?;
        drop(dataset);

        Ok(if duplicate {
            SubmitOutcome::Duplicate {
                retrained: Some(snapshot.version),
            }
        } else {
            SubmitOutcome::Retrained {
                version: snapshot.version,
                rows: rows.len(),
            }
        })
    }

    /// `submit_sample` をバックグラウンドで実行する。エラーはログに残して破棄する。
    pub fn spawn_submit(self: &Arc<Self>, sample: SampleSubmission, threshold: f64) -> JoinHandle<()> {
        let orchestrator = Arc::clone(self);
        tokio::spawn(async move {
            match orchestrator.submit_sample(sample, threshold).await {
                Ok(outcome) => info!(?outcome, "background retrain finished"),
                Err(err) => error!(error = %err, "background retrain failed; previous model kept"),
            }
        })
    }

    /// 現在のデータセット全体で再学習する。
    ///
    /// # Errors
    /// データセットの読み込み、学習、永続化のいずれかが失敗した場合は [`RetrainError`]。
    pub async fn retrain_from_dataset(&self) -> Result<Arc<ModelSnapshot>, RetrainError> {
        let dataset = self.dataset.lock().await;
        let rows = dataset.load().await?;
        self.telemetry.metrics().dataset_rows.set(count_gauge(rows.len()));
        let snapshot = self.retrain_locked(&rows).await?;
        drop(dataset);
        Ok(snapshot)
    }

    /// データセットロック保持中に呼ぶこと。
    async fn retrain_locked(&self, rows: &[DatasetRow]) -> Result<Arc<ModelSnapshot>, RetrainError> {
        let started = Instant::now();
        let result = self.run_cycle(rows).await;
        let metrics = self.telemetry.metrics();
        metrics.retrain_duration.observe(started.elapsed().as_secs_f64());
        match &result {
            Ok(snapshot) => {
                metrics.retrain_completed.inc();
                metrics.model_version.set(version_gauge(snapshot.version));
                info!(
                    version = snapshot.version,
                    rows = rows.len(),
                    elapsed_ms = started.elapsed().as_millis(),
                    "retrain cycle completed"
                );
            }
            Err(err) => {
                metrics.retrain_failed.inc();
                warn!(error = %err, rows = rows.len(), "retrain cycle aborted");
            }
        }
        result
    }

    async fn run_cycle(&self, rows: &[DatasetRow]) -> Result<Arc<ModelSnapshot>, RetrainError> {
        let stage = StageGuard::new(&self.stage);
        let metrics = self.telemetry.metrics();

        stage.enter(RetrainStage::EmbeddingInProgress);
        let normalized: Vec<String> = rows
            .iter()
            .map(|row| normalize_for_clustering(&row.summary))
            .collect();
        let embed_started = Instant::now();
        let embeddings = self.trainer.embed(&normalized).await?;
        metrics.embedding_duration.observe(embed_started.elapsed().as_secs_f64());

        stage.enter(RetrainStage::ClusteringInProgress);
        let cluster_started = Instant::now();
        let model = self
            .trainer
            .cluster(embeddings, self.trainer.n_clusters())
            .await?;
        metrics.clustering_duration.observe(cluster_started.elapsed().as_secs_f64());

        stage.enter(RetrainStage::LabelMatching);
        let labeled: Vec<LabeledSummary<'_>> = rows
            .iter()
            .map(|row| LabeledSummary {
                summary: &row.summary,
                category: &row.category,
            })
            .collect();
        let mapping = self.trainer.label(&labeled, &model)?;

        stage.enter(RetrainStage::PersistingArtifacts);
        let paths = self.artifacts.clone();
        let (model, mapping) = tokio::task::spawn_blocking(move || {
            paths.commit(&model, &mapping).map(|()| (model, mapping))
        })
        .await
        .map_err(|error| RetrainError::Training(format!("artifact persistence task failed: {error}")))??;

        Ok(self.store.replace(model, mapping).await)
    }
}

#[allow(clippy::cast_precision_loss)]
fn count_gauge(count: usize) -> f64 {
    count as f64
}

#[allow(clippy::cast_precision_loss)]
fn version_gauge(version: u64) -> f64 {
    version as f64
}
