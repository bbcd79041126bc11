//! 学習データセット（transcript / summary / category の表）のファイル入出力。
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::DatasetError;

/// データセットの1行。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetRow {
    pub transcript: String,
    pub summary: String,
    pub category: String,
}

impl DatasetRow {
    #[must_use]
    pub fn new(
        transcript: impl Into<String>,
        summary: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            transcript: transcript.into(),
            summary: summary.into(),
            category: category.into(),
        }
    }
}

/// 列の欠落を検出するための読み込み用表現。表計算由来の大文字列名も受け付ける。
#[derive(Debug, Deserialize)]
struct RawRow {
    #[serde(default, alias = "Transcript")]
    transcript: Option<String>,
    #[serde(default, alias = "Summary")]
    summary: Option<String>,
    #[serde(default, alias = "Category")]
    category: Option<String>,
}

impl RawRow {
    fn into_row(self, row: usize) -> Result<DatasetRow, DatasetError> {
        let missing = |column| DatasetError::MissingColumn { row, column };
        Ok(DatasetRow {
            transcript: self.transcript.ok_or_else(|| missing("transcript"))?,
            summary: self.summary.ok_or_else(|| missing("summary"))?,
            category: self.category.ok_or_else(|| missing("category"))?,
        })
    }
}

/// JSON 配列として保存されたデータセットファイル。
///
/// 読み書きは再学習オーケストレータのロック内からのみ行う。
#[derive(Debug, Clone)]
pub struct DatasetStore {
    path: PathBuf,
}

impl DatasetStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 全行を読み込む。ファイルが無ければ空のデータセット。
    ///
    /// # Errors
    /// 読み込み失敗は [`DatasetError::Io`]、JSON 不正は [`DatasetError::Malformed`]、
    /// 必須列の欠落は [`DatasetError::MissingColumn`]。
    pub async fn load(&self) -> Result<Vec<DatasetRow>, DatasetError> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "dataset file not found; starting empty");
                return Ok(Vec::new());
            }
            Err(source) => {
                return Err(DatasetError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        let rows: Vec<RawRow> =
            serde_json::from_slice(&raw).map_err(|source| DatasetError::Malformed {
                path: self.path.clone(),
                source,
            })?;
        rows.into_iter()
            .enumerate()
            .map(|(index, row)| row.into_row(index))
            .collect()
    }

    /// 全行を書き直す。一時ファイルに書いてから置き換える。
    ///
    /// # Errors
    /// 書き込みに失敗した場合は [`DatasetError::Io`]。
    pub async fn save(&self, rows: &[DatasetRow]) -> Result<(), DatasetError> {
        let io_error = |source| DatasetError::Io {
            path: self.path.clone(),
            source,
        };
        let body = serde_json::to_vec_pretty(rows).map_err(|error| io_error(io::Error::other(error)))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_error)?;
        }
        let mut tmp_name = self.path.file_name().map(std::ffi::OsStr::to_os_string).unwrap_or_default();
        tmp_name.push(".tmp");
        let tmp = self.path.with_file_name(tmp_name);

        tokio::fs::write(&tmp, body).await.map_err(io_error)?;
        if let Err(error) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(io_error(error));
        }
        debug!(path = %self.path.display(), rows = rows.len(), "dataset rewritten");
        Ok(())
    }
}

/// 同一の transcript（完全一致）を持つ行があるか。
#[must_use]
pub fn contains_transcript(rows: &[DatasetRow], transcript: &str) -> bool {
    rows.iter().any(|row| row.transcript == transcript)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_is_empty_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let store = DatasetStore::new(dir.path().join("dataset.json"));
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn save_then_load_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = DatasetStore::new(dir.path().join("nested/dataset.json"));
        let rows = vec![
            DatasetRow::new("t1", "s1", "sports"),
            DatasetRow::new("t2", "s2", "politics"),
        ];
        store.save(&rows).await.unwrap();
        assert_eq!(store.load().await.unwrap(), rows);
    }

    #[tokio::test]
    async fn capitalized_columns_are_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dataset.json");
        std::fs::write(
            &path,
            r#"[{"Transcript": "t", "Summary": "s", "Category": "business"}]"#,
        )
        .unwrap();
        let rows = DatasetStore::new(&path).load().await.unwrap();
        assert_eq!(rows, vec![DatasetRow::new("t", "s", "business")]);
    }

    #[tokio::test]
    async fn missing_column_is_reported_with_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dataset.json");
        std::fs::write(
            &path,
            r#"[{"transcript": "a", "summary": "b", "category": "c"}, {"transcript": "x", "category": "y"}]"#,
        )
        .unwrap();
        let error = DatasetStore::new(&path).load().await.expect_err("missing summary");
        assert!(matches!(
            error,
            DatasetError::MissingColumn {
                row: 1,
                column: "summary"
            }
        ));
    }

    #[test]
    fn transcript_match_is_exact() {
        let rows = vec![DatasetRow::new("Hello world", "s", "c")];
        assert!(contains_transcript(&rows, "Hello world"));
        assert!(!contains_transcript(&rows, "hello world"));
    }
}
