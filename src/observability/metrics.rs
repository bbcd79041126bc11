/// Prometheusメトリクス定義。
use prometheus::{
    Counter, Gauge, Histogram, HistogramOpts, Registry, register_counter_with_registry,
    register_gauge_with_registry, register_histogram_with_registry,
};
use std::sync::Arc;

/// 再学習は数秒〜数分かかるため既定バケットより広く取る。
const RETRAIN_BUCKETS: &[f64] = &[0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0];

/// メトリクスコレクター。
#[derive(Debug, Clone)]
pub struct Metrics {
    // カウンター
    pub classifications: Counter,
    pub classification_failures: Counter,
    pub samples_submitted: Counter,
    pub samples_skipped: Counter,
    pub samples_deduplicated: Counter,
    pub retrain_completed: Counter,
    pub retrain_failed: Counter,

    // ヒストグラム
    pub classify_duration: Histogram,
    pub retrain_duration: Histogram,
    pub embedding_duration: Histogram,
    pub clustering_duration: Histogram,

    // ゲージ
    pub dataset_rows: Gauge,
    pub model_version: Gauge,
}

impl Metrics {
    /// 新しいメトリクスコレクターを作成する。
    #[allow(clippy::too_many_lines)]
    pub fn new(registry: Arc<Registry>) -> Result<Self, prometheus::Error> {
        Ok(Self {
            classifications: register_counter_with_registry!(
                "newsblink_classifications_total",
                "Total number of successful classifications",
                registry
            )?,
            classification_failures: register_counter_with_registry!(
                "newsblink_classification_failures_total",
                "Total number of classification requests that failed",
                registry
            )?,
            samples_submitted: register_counter_with_registry!(
                "newsblink_samples_submitted_total",
                "Samples handed to the retrain orchestrator",
                registry
            )?,
            samples_skipped: register_counter_with_registry!(
                "newsblink_samples_skipped_total",
                "Samples skipped because their confidence was below the retrain threshold",
                registry
            )?,
            samples_deduplicated: register_counter_with_registry!(
                "newsblink_samples_deduplicated_total",
                "Samples whose transcript already existed in the dataset",
                registry
            )?,
            retrain_completed: register_counter_with_registry!(
                "newsblink_retrain_completed_total",
                "Retrain cycles that published a new model",
                registry
            )?,
            retrain_failed: register_counter_with_registry!(
                "newsblink_retrain_failed_total",
                "Retrain cycles aborted before publishing",
                registry
            )?,
            classify_duration: register_histogram_with_registry!(
                "newsblink_classify_duration_seconds",
                "Duration of embedding plus nearest-centroid lookup",
                registry
            )?,
            retrain_duration: register_histogram_with_registry!(
                HistogramOpts::new(
                    "newsblink_retrain_duration_seconds",
                    "Duration of a full retrain cycle"
                )
                .buckets(RETRAIN_BUCKETS.to_vec()),
                registry
            )?,
            embedding_duration: register_histogram_with_registry!(
                HistogramOpts::new(
                    "newsblink_embedding_duration_seconds",
                    "Duration of the dataset embedding pass"
                )
                .buckets(RETRAIN_BUCKETS.to_vec()),
                registry
            )?,
            clustering_duration: register_histogram_with_registry!(
                HistogramOpts::new(
                    "newsblink_clustering_duration_seconds",
                    "Duration of agglomerative clustering"
                )
                .buckets(RETRAIN_BUCKETS.to_vec()),
                registry
            )?,
            dataset_rows: register_gauge_with_registry!(
                "newsblink_dataset_rows",
                "Number of rows in the training dataset",
                registry
            )?,
            model_version: register_gauge_with_registry!(
                "newsblink_model_version",
                "Version of the currently published model snapshot",
                registry
            )?,
        })
    }
}
