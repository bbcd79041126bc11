//! クラスタモデルとカテゴリ対応表の成果物、およびその永続化。
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::embedding::Embedding;
use crate::error::RetrainError;

/// クラスタ番号。`[0, n_clusters)` の範囲を取る。
pub type ClusterIndex = usize;

/// 対応表に載っていないクラスタに返すカテゴリ名。
pub const UNKNOWN_CATEGORY: &str = "Unknown";

#[derive(Debug, Error, PartialEq)]
pub enum ModelError {
    #[error("embeddings ({embeddings}) and labels ({labels}) must have the same length")]
    LengthMismatch { embeddings: usize, labels: usize },
    #[error("label {label} at sample {sample} is outside [0, {n_clusters})")]
    LabelOutOfRange {
        sample: usize,
        label: ClusterIndex,
        n_clusters: usize,
    },
    #[error("vector {index} has dimension {actual}, expected {expected}")]
    DimensionMismatch {
        index: usize,
        expected: usize,
        actual: usize,
    },
    #[error("model has no clusters")]
    NoClusters,
}

/// 学習時の付帯情報。`revision` で対応表との組み合わせを照合する。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub revision: Uuid,
    pub trained_at: DateTime<Utc>,
    pub embedder: String,
}

/// 学習済みクラスタモデル。
///
/// `embeddings` と `labels` はサンプル順に対応し、`centroids[i]` はラベル `i`
/// を持つサンプルの平均ベクトル（該当なしの場合はゼロベクトル）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterModel {
    pub embeddings: Vec<Embedding>,
    pub labels: Vec<ClusterIndex>,
    pub centroids: Vec<Embedding>,
    pub metadata: ModelMetadata,
}

impl ClusterModel {
    /// クラスタ割り当てから重心を計算してモデルを組み立てる。
    ///
    /// # Errors
    /// 長さ・次元・ラベル範囲の不整合がある場合に [`ModelError`] を返す。
    pub fn from_assignments(
        embeddings: Vec<Embedding>,
        labels: Vec<ClusterIndex>,
        n_clusters: usize,
        dimension: usize,
        embedder: &str,
    ) -> Result<Self, ModelError> {
        if n_clusters == 0 {
            return Err(ModelError::NoClusters);
        }
        validate_samples(&embeddings, &labels, n_clusters, dimension)?;
        let centroids = compute_centroids(&embeddings, &labels, n_clusters, dimension);
        Ok(Self {
            embeddings,
            labels,
            centroids,
            metadata: ModelMetadata {
                revision: Uuid::now_v7(),
                trained_at: Utc::now(),
                embedder: embedder.to_string(),
            },
        })
    }

    #[must_use]
    pub fn n_clusters(&self) -> usize {
        self.centroids.len()
    }

    #[must_use]
    pub fn sample_count(&self) -> usize {
        self.labels.len()
    }

    /// 重心ベクトルの次元数。
    #[must_use]
    pub fn dimension(&self) -> Option<usize> {
        self.centroids.first().map(Vec::len)
    }

    /// クラスタごとの所属サンプル数（空クラスタを含む）。
    #[must_use]
    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.n_clusters()];
        for &label in &self.labels {
            if let Some(size) = sizes.get_mut(label) {
                *size += 1;
            }
        }
        sizes
    }

    /// 読み込んだ成果物の不変条件を検証する。
    ///
    /// # Errors
    /// 長さ・次元・ラベル範囲の不整合がある場合に [`ModelError`] を返す。
    pub fn validate(&self) -> Result<(), ModelError> {
        let dimension = self.dimension().ok_or(ModelError::NoClusters)?;
        for (index, centroid) in self.centroids.iter().enumerate() {
            if centroid.len() != dimension {
                return Err(ModelError::DimensionMismatch {
                    index,
                    expected: dimension,
                    actual: centroid.len(),
                });
            }
        }
        validate_samples(&self.embeddings, &self.labels, self.n_clusters(), dimension)
    }
}

fn validate_samples(
    embeddings: &[Embedding],
    labels: &[ClusterIndex],
    n_clusters: usize,
    dimension: usize,
) -> Result<(), ModelError> {
    if embeddings.len() != labels.len() {
        return Err(ModelError::LengthMismatch {
            embeddings: embeddings.len(),
            labels: labels.len(),
        });
    }
    for (index, embedding) in embeddings.iter().enumerate() {
        if embedding.len() != dimension {
            return Err(ModelError::DimensionMismatch {
                index,
                expected: dimension,
                actual: embedding.len(),
            });
        }
    }
    for (sample, &label) in labels.iter().enumerate() {
        if label >= n_clusters {
            return Err(ModelError::LabelOutOfRange {
                sample,
                label,
                n_clusters,
            });
        }
    }
    Ok(())
}

/// ラベルごとの平均ベクトルを計算する。所属のないクラスタはゼロベクトル。
#[must_use]
pub fn compute_centroids(
    embeddings: &[Embedding],
    labels: &[ClusterIndex],
    n_clusters: usize,
    dimension: usize,
) -> Vec<Embedding> {
    let mut sums = vec![Array1::<f32>::zeros(dimension); n_clusters];
    let mut counts = vec![0_usize; n_clusters];
    for (embedding, &label) in embeddings.iter().zip(labels) {
        sums[label] += &Array1::from_vec(embedding.clone());
        counts[label] += 1;
    }
    sums.into_iter()
        .zip(counts)
        .map(|(sum, count)| {
            if count == 0 {
                sum.to_vec()
            } else {
                #[allow(clippy::cast_precision_loss)]
                let mean = sum / count as f32;
                mean.to_vec()
            }
        })
        .collect()
}

/// クラスタ番号 → カテゴリ名の対応表。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryMapping {
    /// 対応表を作ったモデルの `revision`。
    #[serde(default)]
    pub model_revision: Option<Uuid>,
    pub clusters: BTreeMap<ClusterIndex, String>,
}

impl CategoryMapping {
    #[must_use]
    pub fn new(model_revision: Option<Uuid>, clusters: BTreeMap<ClusterIndex, String>) -> Self {
        Self {
            model_revision,
            clusters,
        }
    }

    /// 対応表に無いクラスタは `"Unknown"` を返す。
    #[must_use]
    pub fn category_name(&self, cluster: ClusterIndex) -> String {
        self.clusters
            .get(&cluster)
            .cloned()
            .unwrap_or_else(|| UNKNOWN_CATEGORY.to_string())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }
}

/// モデルファイルと対応表ファイルの配置。
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    pub model: PathBuf,
    pub mapping: PathBuf,
}

impl ArtifactPaths {
    #[must_use]
    pub fn new(model: impl Into<PathBuf>, mapping: impl Into<PathBuf>) -> Self {
        Self {
            model: model.into(),
            mapping: mapping.into(),
        }
    }

    /// 永続化済みの成果物を読み込む。モデルが無ければ `None`。
    ///
    /// 対応表が無い、または別リビジョンのモデル用であれば空の対応表を返す
    /// （全クラスタが `"Unknown"` になる）。
    ///
    /// # Errors
    /// ファイルの読み込み・パース・検証に失敗した場合はエラーを返す。
    pub fn load(&self) -> anyhow::Result<Option<(ClusterModel, CategoryMapping)>> {
        use anyhow::Context;

        let raw = match fs::read(&self.model) {
            Ok(raw) => raw,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(error) => {
                return Err(error)
                    .with_context(|| format!("failed to read {}", self.model.display()));
            }
        };
        let model: ClusterModel = serde_json::from_slice(&raw)
            .with_context(|| format!("failed to parse {}", self.model.display()))?;
        model
            .validate()
            .with_context(|| format!("invalid cluster model {}", self.model.display()))?;

        let mapping = match fs::read(&self.mapping) {
            Ok(raw) => serde_json::from_slice::<CategoryMapping>(&raw)
                .with_context(|| format!("failed to parse {}", self.mapping.display()))?,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                warn!(path = %self.mapping.display(), "category mapping file not found");
                CategoryMapping::default()
            }
            Err(error) => {
                return Err(error)
                    .with_context(|| format!("failed to read {}", self.mapping.display()));
            }
        };

        let mapping = match mapping.model_revision {
            Some(revision) if revision != model.metadata.revision => {
                warn!(
                    model_revision = %model.metadata.revision,
                    mapping_revision = %revision,
                    "category mapping belongs to another model revision; ignoring it"
                );
                CategoryMapping::default()
            }
            _ => mapping,
        };

        info!(
            samples = model.sample_count(),
            clusters = model.n_clusters(),
            mapped = mapping.clusters.len(),
            revision = %model.metadata.revision,
            "loaded cluster model artifacts"
        );
        Ok(Some((model, mapping)))
    }

    /// モデルと対応表をまとめて書き出す。
    ///
    /// 両方を一時ファイルに書いてから差し替える。途中で失敗した場合は既存の成果物を残す。
    ///
    /// # Errors
    /// 書き込みやリネームに失敗した場合は [`RetrainError::Persistence`] を返す。
    pub fn commit(&self, model: &ClusterModel, mapping: &CategoryMapping) -> Result<(), RetrainError> {
        let model_bytes = serde_json::to_vec(model)
            .map_err(|error| persistence(&self.model, io::Error::other(error)))?;
        let mapping_bytes = serde_json::to_vec_pretty(mapping)
            .map_err(|error| persistence(&self.mapping, io::Error::other(error)))?;

        let model_tmp = sibling(&self.model, "tmp");
        let mapping_tmp = sibling(&self.mapping, "tmp");
        let model_backup = sibling(&self.model, "bak");

        let staged = ensure_parent(&self.model)
            .and_then(|()| ensure_parent(&self.mapping))
            .and_then(|()| fs::write(&model_tmp, &model_bytes))
            .and_then(|()| fs::write(&mapping_tmp, &mapping_bytes));
        if let Err(error) = staged {
            let _ = fs::remove_file(&model_tmp);
            let _ = fs::remove_file(&mapping_tmp);
            return Err(persistence(&self.model, error));
        }

        let had_previous = self.model.exists();
        if had_previous {
            if let Err(error) = fs::copy(&self.model, &model_backup) {
                let _ = fs::remove_file(&model_tmp);
                let _ = fs::remove_file(&mapping_tmp);
                return Err(persistence(&model_backup, error));
            }
        }

        if let Err(error) = fs::rename(&model_tmp, &self.model) {
            let _ = fs::remove_file(&model_tmp);
            let _ = fs::remove_file(&mapping_tmp);
            let _ = fs::remove_file(&model_backup);
            return Err(persistence(&self.model, error));
        }

        if let Err(error) = fs::rename(&mapping_tmp, &self.mapping) {
            let _ = fs::remove_file(&mapping_tmp);
            let restored = if had_previous {
                fs::rename(&model_backup, &self.model)
            } else {
                fs::remove_file(&self.model)
            };
            if let Err(restore_error) = restored {
                warn!(
                    error = %restore_error,
                    path = %self.model.display(),
                    "failed to roll back model artifact; revision check will reject the pair"
                );
            }
            return Err(persistence(&self.mapping, error));
        }

        if had_previous {
            let _ = fs::remove_file(&model_backup);
        }
        Ok(())
    }
}

fn persistence(path: &Path, source: io::Error) -> RetrainError {
    RetrainError::Persistence {
        path: path.to_path_buf(),
        source,
    }
}

fn sibling(path: &Path, extension: &str) -> PathBuf {
    let mut name = path.file_name().map(std::ffi::OsStr::to_os_string).unwrap_or_default();
    name.push(".");
    name.push(extension);
    path.with_file_name(name)
}

fn ensure_parent(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
}
