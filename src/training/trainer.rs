//! 全件再学習: 埋め込み → 階層クラスタリング → ラベル対応付け。
use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info};

use super::matching::{CategoryMatcher, top_words, top_words_by_group};
use crate::embedding::{Embedder, Embedding};
use crate::error::RetrainError;
use crate::model::{CategoryMapping, ClusterIndex, ClusterModel};
use crate::util::agglomerative::Agglomerative;

/// 学習時に一度に埋め込むサンプル数。チャンクの合間に分類側の埋め込みが割り込める。
pub const EMBED_CHUNK_SIZE: usize = 16;

/// ラベル付けに使う1サンプル。`summary` は正規化前の要約。
#[derive(Debug, Clone, Copy)]
pub struct LabeledSummary<'a> {
    pub summary: &'a str,
    pub category: &'a str,
}

#[derive(Debug, Clone)]
pub struct Trainer {
    embedder: Arc<dyn Embedder>,
    matcher: Arc<dyn CategoryMatcher>,
    n_clusters: usize,
    top_n: usize,
}

impl Trainer {
    #[must_use]
    pub fn new(
        embedder: Arc<dyn Embedder>,
        matcher: Arc<dyn CategoryMatcher>,
        n_clusters: usize,
        top_n: usize,
    ) -> Self {
        Self {
            embedder,
            matcher,
            n_clusters,
            top_n,
        }
    }

    #[must_use]
    pub fn n_clusters(&self) -> usize {
        self.n_clusters
    }

    #[must_use]
    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    /// サンプルを埋め込んでから `n_clusters` 個に分割する。
    ///
    /// # Errors
    /// サンプルが空、埋め込み失敗、クラスタリング失敗のいずれかで [`RetrainError`] を返す。
    pub async fn train(&self, samples: &[String], n_clusters: usize) -> Result<ClusterModel, RetrainError> {
        let embeddings = self.embed(samples).await?;
        self.cluster(embeddings, n_clusters).await
    }

    /// 正規化済みテキストを [`EMBED_CHUNK_SIZE`] 件ずつ埋め込む。
    ///
    /// 埋め込みモデルは分類経路と共有しているため、全件を1回で渡してモデルを
    /// 占有しないこと。
    ///
    /// # Errors
    /// サンプルが空の場合は [`RetrainError::Training`]、埋め込み失敗は [`RetrainError::Embedding`]。
    pub async fn embed(&self, samples: &[String]) -> Result<Vec<Embedding>, RetrainError> {
        if samples.is_empty() {
            return Err(RetrainError::Training("no samples to train on".to_string()));
        }
        let mut embeddings = Vec::with_capacity(samples.len());
        for chunk in samples.chunks(EMBED_CHUNK_SIZE) {
            embeddings.extend(self.embedder.embed_batch(chunk).await?);
            tokio::task::yield_now().await;
        }
        if embeddings.len() != samples.len() {
            return Err(RetrainError::Training(format!(
                "embedder returned {} vectors for {} samples",
                embeddings.len(),
                samples.len()
            )));
        }
        debug!(samples = samples.len(), embedder = self.embedder.name(), "embedded training samples");
        Ok(embeddings)
    }

    /// 平均連結・コサイン距離の凝集型クラスタリングで重心を求める。
    ///
    /// # Errors
    /// 計算タスクの失敗やモデル不整合を [`RetrainError::Training`] として返す。
    pub async fn cluster(
        &self,
        embeddings: Vec<Embedding>,
        n_clusters: usize,
    ) -> Result<ClusterModel, RetrainError> {
        if n_clusters == 0 {
            return Err(RetrainError::Training("n_clusters must be positive".to_string()));
        }
        let dimension = self.embedder.dimension();
        let embedder_name = self.embedder.name().to_string();

        let model = tokio::task::spawn_blocking(move || {
            let result = Agglomerative::fit(&embeddings, n_clusters);
            ClusterModel::from_assignments(
                embeddings,
                result.assignments,
                n_clusters,
                dimension,
                &embedder_name,
            )
        })
        .await
        .map_err(|error| RetrainError::Training(format!("clustering task failed: {error}")))?
        .map_err(|error| RetrainError::Training(error.to_string()))?;

        info!(
            samples = model.sample_count(),
            clusters = model.n_clusters(),
            sizes = ?model.cluster_sizes(),
            "agglomerative clustering finished"
        );
        Ok(model)
    }

    /// クラスタとカテゴリの頻出語を比べて対応表を作る。
    ///
    /// `samples` は `model.labels` と同じ順序であること。
    ///
    /// # Errors
    /// サンプル数がモデルと一致しない場合は [`RetrainError::Training`]。
    pub fn label(
        &self,
        samples: &[LabeledSummary<'_>],
        model: &ClusterModel,
    ) -> Result<CategoryMapping, RetrainError> {
        if samples.len() != model.sample_count() {
            return Err(RetrainError::Training(format!(
                "{} labeled samples for a model trained on {}",
                samples.len(),
                model.sample_count()
            )));
        }

        let category_keywords = top_words_by_group(
            samples.iter().map(|sample| (sample.category, sample.summary)),
            self.top_n,
        );

        let mut members: Vec<Vec<&str>> = vec![Vec::new(); model.n_clusters()];
        for (sample, &label) in samples.iter().zip(&model.labels) {
            members[label].push(sample.summary);
        }
        let cluster_keywords: BTreeMap<ClusterIndex, Vec<String>> = members
            .into_iter()
            .enumerate()
            .map(|(cluster, texts)| (cluster, top_words(texts, self.top_n)))
            .collect();

        let clusters = self.matcher.match_clusters(&cluster_keywords, &category_keywords);
        info!(
            matcher = self.matcher.name(),
            categories = category_keywords.len(),
            mapping = ?clusters,
            "matched clusters to categories"
        );
        Ok(CategoryMapping::new(Some(model.metadata.revision), clusters))
    }
}
