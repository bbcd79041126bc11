//! 重心ベクトルへのコサイン類似度による最近傍クラスタ分類。
use std::sync::Arc;

use serde::Serialize;

use super::labels::ConfidenceBand;
use crate::embedding::{Embedder, Embedding, cosine_similarity};
use crate::error::ClassifyError;
use crate::model::{ClusterIndex, ModelSnapshot, ModelStore, UNKNOWN_CATEGORY};

/// 1回の分類結果。同一スナップショットから計算される。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub cluster: ClusterIndex,
    pub category: String,
    pub confidence: f64,
    pub band: ConfidenceBand,
    pub model_version: u64,
}

/// Cluster classifier
/// 現在のモデルスナップショットを読み取り専用で参照する。
#[derive(Debug, Clone)]
pub struct ClusterClassifier {
    embedder: Arc<dyn Embedder>,
    store: Arc<ModelStore>,
}

impl ClusterClassifier {
    #[must_use]
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<ModelStore>) -> Self {
        Self { embedder, store }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<ModelStore> {
        &self.store
    }

    /// 最も類似度の高い重心のクラスタ番号を返す。
    ///
    /// # Errors
    /// モデル未ロード時は [`ClassifyError::ModelNotReady`]。
    pub async fn classify(&self, text: &str) -> Result<ClusterIndex, ClassifyError> {
        let snapshot = self.current().await?;
        let embedding = self.encode(text, &snapshot).await?;
        nearest_centroid(&embedding, &snapshot.model.centroids)
            .map(|(cluster, _)| cluster)
            .ok_or(ClassifyError::ModelNotReady)
    }

    /// 指定クラスタの重心とのコサイン類似度を百分率（小数2桁）で返す。
    ///
    /// # Errors
    /// モデル未ロード時は [`ClassifyError::ModelNotReady`]、範囲外のクラスタは
    /// [`ClassifyError::InvalidCluster`]。
    pub async fn confidence(&self, text: &str, cluster: ClusterIndex) -> Result<f64, ClassifyError> {
        let snapshot = self.current().await?;
        let centroid = snapshot.model.centroids.get(cluster).ok_or(
            ClassifyError::InvalidCluster {
                cluster,
                n_clusters: snapshot.model.n_clusters(),
            },
        )?;
        let embedding = self.encode(text, &snapshot).await?;
        Ok(similarity_to_confidence(cosine_similarity(&embedding, centroid)))
    }

    /// 対応表に無い場合やモデル未ロード時は `"Unknown"`。
    pub async fn category_name(&self, cluster: ClusterIndex) -> String {
        match self.store.snapshot().await {
            Some(snapshot) => snapshot.category_name(cluster),
            None => UNKNOWN_CATEGORY.to_string(),
        }
    }

    /// 分類・カテゴリ名・信頼度を1つのスナップショットでまとめて求める。
    ///
    /// # Errors
    /// モデル未ロード時は [`ClassifyError::ModelNotReady`]。
    pub async fn classify_with_confidence(&self, text: &str) -> Result<Classification, ClassifyError> {
        let snapshot = self.current().await?;
        let embedding = self.encode(text, &snapshot).await?;
        let (cluster, similarity) = nearest_centroid(&embedding, &snapshot.model.centroids)
            .ok_or(ClassifyError::ModelNotReady)?;
        let confidence = similarity_to_confidence(similarity);
        Ok(Classification {
            cluster,
            category: snapshot.category_name(cluster),
            confidence,
            band: ConfidenceBand::from_score(confidence),
            model_version: snapshot.version,
        })
    }

    async fn current(&self) -> Result<Arc<ModelSnapshot>, ClassifyError> {
        self.store.snapshot().await.ok_or(ClassifyError::ModelNotReady)
    }

    async fn encode(&self, text: &str, snapshot: &ModelSnapshot) -> Result<Embedding, ClassifyError> {
        let embedding = self.embedder.embed(text).await?;
        let expected = snapshot.model.dimension().unwrap_or_default();
        if embedding.len() != expected {
            return Err(ClassifyError::InvalidInput(format!(
                "embedding dimension {} does not match model dimension {expected}",
                embedding.len()
            )));
        }
        Ok(embedding)
    }
}

/// 類似度最大の重心を返す。同値なら小さい番号が勝つ。NaN は候補から外す。
#[must_use]
pub fn nearest_centroid(embedding: &[f32], centroids: &[Embedding]) -> Option<(ClusterIndex, f32)> {
    let mut best: Option<(ClusterIndex, f32)> = None;
    for (index, centroid) in centroids.iter().enumerate() {
        let similarity = cosine_similarity(embedding, centroid);
        if similarity.is_nan() {
            continue;
        }
        match best {
            Some((_, best_similarity)) if similarity <= best_similarity => {}
            _ => best = Some((index, similarity)),
        }
    }
    best
}

/// 類似度 ×100 を小数2桁に丸める。クランプはしない。
#[must_use]
pub fn similarity_to_confidence(similarity: f32) -> f64 {
    (f64::from(similarity) * 100.0 * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use async_trait::async_trait;

    use super::*;
    use crate::embedding::EmbeddingError;
    use crate::model::{CategoryMapping, ClusterModel};

    /// Maps a few fixed words to fixed vectors.
    #[derive(Debug)]
    struct StaticEmbedder;

    #[async_trait]
    impl Embedder for StaticEmbedder {
        fn dimension(&self) -> usize {
            2
        }

        fn name(&self) -> &str {
            "static"
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>, EmbeddingError> {
            Ok(texts
                .iter()
                .map(|text| match text.as_str() {
                    "east" => vec![1.0, 0.0],
                    "north" => vec![0.0, 1.0],
                    "diagonal" => vec![1.0, 1.0],
                    "mostly east" => vec![0.85, 0.526_782_7],
                    "west" => vec![-1.0, 0.0],
                    _ => vec![0.0, 0.0, 0.0],
                })
                .collect())
        }
    }

    async fn classifier_with_model() -> ClusterClassifier {
        let store = Arc::new(ModelStore::empty());
        let model = ClusterModel::from_assignments(
            vec![vec![1.0, 0.0], vec![0.0, 1.0]],
            vec![0, 1],
            2,
            2,
            "static",
        )
        .unwrap();
        let mapping = CategoryMapping::new(
            Some(model.metadata.revision),
            BTreeMap::from([(0, "sports".to_string())]),
        );
        store.replace(model, mapping).await;
        ClusterClassifier::new(Arc::new(StaticEmbedder), store)
    }

    #[tokio::test]
    async fn classify_without_model_is_not_ready() {
        let classifier = ClusterClassifier::new(Arc::new(StaticEmbedder), Arc::new(ModelStore::empty()));
        assert!(matches!(
            classifier.classify("east").await,
            Err(ClassifyError::ModelNotReady)
        ));
        assert!(matches!(
            classifier.confidence("east", 0).await,
            Err(ClassifyError::ModelNotReady)
        ));
        assert_eq!(classifier.category_name(0).await, "Unknown");
    }

    #[tokio::test]
    async fn classify_picks_nearest_centroid() {
        let classifier = classifier_with_model().await;
        assert_eq!(classifier.classify("east").await.unwrap(), 0);
        assert_eq!(classifier.classify("north").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn ties_go_to_lowest_index() {
        let classifier = classifier_with_model().await;
        assert_eq!(classifier.classify("diagonal").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn confidence_of_085_similarity_is_very_high() {
        let classifier = classifier_with_model().await;
        let score = classifier.confidence("mostly east", 0).await.unwrap();
        assert!((score - 85.0).abs() < f64::EPSILON);
        assert_eq!(ConfidenceBand::from_score(score).label(), "Very High");
        assert_eq!(score, classifier.confidence("mostly east", 0).await.unwrap());
    }

    #[tokio::test]
    async fn negative_similarity_is_not_clamped() {
        let classifier = classifier_with_model().await;
        let score = classifier.confidence("west", 0).await.unwrap();
        assert!((score + 100.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn out_of_range_cluster_is_rejected() {
        let classifier = classifier_with_model().await;
        assert!(matches!(
            classifier.confidence("east", 2).await,
            Err(ClassifyError::InvalidCluster {
                cluster: 2,
                n_clusters: 2
            })
        ));
    }

    #[tokio::test]
    async fn dimension_mismatch_is_invalid_input() {
        let classifier = classifier_with_model().await;
        assert!(matches!(
            classifier.classify("gibberish").await,
            Err(ClassifyError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn classification_uses_one_snapshot() {
        let classifier = classifier_with_model().await;
        let result = classifier.classify_with_confidence("north").await.unwrap();
        assert_eq!(result.cluster, 1);
        assert_eq!(result.category, "Unknown");
        assert_eq!(result.model_version, 1);
        assert!((result.confidence - 100.0).abs() < f64::EPSILON);
        assert_eq!(result.band, ConfidenceBand::VeryHigh);
    }

    #[test]
    fn rounding_keeps_two_decimals() {
        assert!((similarity_to_confidence(0.123_456) - 12.35).abs() < 1e-9);
    }
}
