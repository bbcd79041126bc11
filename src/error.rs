//! 分類経路と再学習経路のエラー分類。
use std::path::PathBuf;

use thiserror::Error;

use crate::embedding::EmbeddingError;

/// 同期的な分類経路で呼び出し元に返すエラー。
#[derive(Debug, Error)]
pub enum ClassifyError {
    /// クラスタモデルがまだロードされていない。
    #[error("cluster model is not trained yet")]
    ModelNotReady,
    /// テキストをモデル空間にエンコードできなかった。
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// クラスタ番号が `[0, n_clusters)` の範囲外。
    #[error("cluster {cluster} is out of range (n_clusters = {n_clusters})")]
    InvalidCluster { cluster: usize, n_clusters: usize },
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
}

/// データセットファイルの読み書きに関するエラー。
#[derive(Debug, Error)]
pub enum DatasetError {
    /// 必須列が欠けている行がある。
    #[error("dataset row {row} is missing required column `{column}`")]
    MissingColumn { row: usize, column: &'static str },
    #[error("failed to parse dataset {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("dataset i/o failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// 再学習サイクルの失敗。どの段階で失敗しても永続化済みの成果物は変更されない。
#[derive(Debug, Error)]
pub enum RetrainError {
    #[error("training failed: {0}")]
    Training(String),
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
    #[error("failed to persist artifact {path}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("dataset integrity check failed: {0}")]
    DatasetIntegrity(#[source] DatasetError),
    #[error(transparent)]
    Dataset(DatasetError),
}

impl From<DatasetError> for RetrainError {
    fn from(error: DatasetError) -> Self {
        match error {
            DatasetError::MissingColumn { .. } | DatasetError::Malformed { .. } => {
                Self::DatasetIntegrity(error)
            }
            DatasetError::Io { .. } => Self::Dataset(error),
        }
    }
}

impl RetrainError {
    /// 永続化の失敗もロールバック上は学習失敗として扱う。
    #[must_use]
    pub fn is_training_failure(&self) -> bool {
        matches!(
            self,
            Self::Training(_) | Self::Embedding(_) | Self::Persistence { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_column_maps_to_integrity_failure() {
        let error = RetrainError::from(DatasetError::MissingColumn {
            row: 3,
            column: "summary",
        });
        assert!(matches!(error, RetrainError::DatasetIntegrity(_)));
        assert!(!error.is_training_failure());
        assert!(error.to_string().contains("summary"));
    }

    #[test]
    fn persistence_counts_as_training_failure() {
        let error = RetrainError::Persistence {
            path: PathBuf::from("models/agnes_model.json"),
            source: std::io::Error::other("disk full"),
        };
        assert!(error.is_training_failure());
    }
}
