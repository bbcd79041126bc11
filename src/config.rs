use std::{env, net::SocketAddr, num::NonZeroUsize, path::PathBuf, str::FromStr};

use thiserror::Error;

#[cfg(test)]
use once_cell::sync::Lazy;
#[cfg(test)]
pub(crate) static ENV_MUTEX: Lazy<std::sync::Mutex<()>> = Lazy::new(|| std::sync::Mutex::new(()));

/// 学習・分類に使う埋め込みモデルの種類。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedderKind {
    /// rust-bert の all-MiniLM-L6-v2。
    Bert,
    /// 依存モデル無しの特徴ハッシング。
    Hashing,
}

impl FromStr for EmbedderKind {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_lowercase().as_str() {
            "bert" | "minilm" => Ok(Self::Bert),
            "hashing" | "hash" => Ok(Self::Hashing),
            other => Err(anyhow::anyhow!("unknown embedder `{other}` (expected bert or hashing)")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    http_bind: SocketAddr,
    dataset_path: PathBuf,
    model_path: PathBuf,
    category_mapping_path: PathBuf,
    n_clusters: NonZeroUsize,
    top_n_keywords: NonZeroUsize,
    retrain_confidence_threshold: f64,
    retrain_enabled: bool,
    embedder: EmbedderKind,
    hashing_dim: NonZeroUsize,
    otel_exporter_endpoint: Option<String>,
    otel_sampling_ratio: f64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable: {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {source}")]
    Invalid {
        name: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl Config {
    /// 環境変数から NewsBlink の設定値を読み込み、検証する。
    ///
    /// # Errors
    /// `NEWSBLINK_DATASET_PATH` が未設定、もしくは各種値のパースに失敗した場合は [`ConfigError`] を返す。
    pub fn from_env() -> Result<Self, ConfigError> {
        let dataset_path = PathBuf::from(env_var("NEWSBLINK_DATASET_PATH")?);
        let http_bind = parse_socket_addr("NEWSBLINK_HTTP_BIND", "0.0.0.0:8000")?;
        let model_path = parse_path("NEWSBLINK_MODEL_PATH", "models/agnes_model.json");
        let category_mapping_path = parse_path(
            "NEWSBLINK_CATEGORY_MAPPING_PATH",
            "models/cluster_category_mapping.json",
        );
        let n_clusters = parse_non_zero_usize("NEWSBLINK_N_CLUSTERS", 8)?;
        let top_n_keywords = parse_non_zero_usize("NEWSBLINK_TOP_N_KEYWORDS", 10)?;
        let retrain_confidence_threshold =
            parse_f64("NEWSBLINK_RETRAIN_CONFIDENCE_THRESHOLD", 20.0)?;
        let retrain_enabled = parse_bool("NEWSBLINK_RETRAIN_ENABLED", true)?;
        let embedder = parse_embedder("NEWSBLINK_EMBEDDER", "bert")?;
        let hashing_dim = parse_non_zero_usize("NEWSBLINK_HASHING_DIM", 384)?;
        let otel_exporter_endpoint = env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok();
        let otel_sampling_ratio = parse_f64("OTEL_SAMPLING_RATIO", 1.0)?;

        Ok(Self {
            http_bind,
            dataset_path,
            model_path,
            category_mapping_path,
            n_clusters,
            top_n_keywords,
            retrain_confidence_threshold,
            retrain_enabled,
            embedder,
            hashing_dim,
            otel_exporter_endpoint,
            otel_sampling_ratio,
        })
    }

    /// テストやスクリプト向けに、パスだけを指定して既定値で組み立てる。
    #[must_use]
    pub fn with_paths(
        dataset_path: impl Into<PathBuf>,
        model_path: impl Into<PathBuf>,
        category_mapping_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            http_bind: SocketAddr::from(([127, 0, 0, 1], 8000)),
            dataset_path: dataset_path.into(),
            model_path: model_path.into(),
            category_mapping_path: category_mapping_path.into(),
            n_clusters: NonZeroUsize::new(8).unwrap_or(NonZeroUsize::MIN),
            top_n_keywords: NonZeroUsize::new(10).unwrap_or(NonZeroUsize::MIN),
            retrain_confidence_threshold: 20.0,
            retrain_enabled: true,
            embedder: EmbedderKind::Hashing,
            hashing_dim: NonZeroUsize::new(384).unwrap_or(NonZeroUsize::MIN),
            otel_exporter_endpoint: None,
            otel_sampling_ratio: 1.0,
        }
    }

    #[must_use]
    pub fn with_n_clusters(mut self, n_clusters: NonZeroUsize) -> Self {
        self.n_clusters = n_clusters;
        self
    }

    #[must_use]
    pub fn with_hashing_dim(mut self, hashing_dim: NonZeroUsize) -> Self {
        self.hashing_dim = hashing_dim;
        self
    }

    #[must_use]
    pub fn with_embedder(mut self, embedder: EmbedderKind) -> Self {
        self.embedder = embedder;
        self
    }

    #[must_use]
    pub fn with_retrain_confidence_threshold(mut self, threshold: f64) -> Self {
        self.retrain_confidence_threshold = threshold;
        self
    }

    #[must_use]
    pub fn with_retrain_enabled(mut self, enabled: bool) -> Self {
        self.retrain_enabled = enabled;
        self
    }

    #[must_use]
    pub fn http_bind(&self) -> SocketAddr {
        self.http_bind
    }

    #[must_use]
    pub fn dataset_path(&self) -> &PathBuf {
        &self.dataset_path
    }

    #[must_use]
    pub fn model_path(&self) -> &PathBuf {
        &self.model_path
    }

    #[must_use]
    pub fn category_mapping_path(&self) -> &PathBuf {
        &self.category_mapping_path
    }

    #[must_use]
    pub fn n_clusters(&self) -> NonZeroUsize {
        self.n_clusters
    }

    #[must_use]
    pub fn top_n_keywords(&self) -> NonZeroUsize {
        self.top_n_keywords
    }

    #[must_use]
    pub fn retrain_confidence_threshold(&self) -> f64 {
        self.retrain_confidence_threshold
    }

    #[must_use]
    pub fn retrain_enabled(&self) -> bool {
        self.retrain_enabled
    }

    #[must_use]
    pub fn embedder(&self) -> EmbedderKind {
        self.embedder
    }

    #[must_use]
    pub fn hashing_dim(&self) -> NonZeroUsize {
        self.hashing_dim
    }

    #[must_use]
    pub fn otel_exporter_endpoint(&self) -> Option<&str> {
        self.otel_exporter_endpoint.as_deref()
    }

    #[must_use]
    pub fn otel_sampling_ratio(&self) -> f64 {
        self.otel_sampling_ratio
    }
}

fn env_var(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::Missing(name))
}

fn parse_path(name: &'static str, default: &str) -> PathBuf {
    PathBuf::from(env::var(name).unwrap_or_else(|_| default.to_string()))
}

fn parse_socket_addr(name: &'static str, default: &str) -> Result<SocketAddr, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());

    raw.parse().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

fn parse_non_zero_usize(name: &'static str, default: usize) -> Result<NonZeroUsize, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    let parsed = raw.parse::<usize>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })?;
    NonZeroUsize::new(parsed).ok_or_else(|| ConfigError::Invalid {
        name,
        source: anyhow::anyhow!("must be greater than zero"),
    })
}

fn parse_f64(name: &'static str, default: f64) -> Result<f64, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    let parsed = raw.parse::<f64>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })?;
    if !parsed.is_finite() {
        return Err(ConfigError::Invalid {
            name,
            source: anyhow::anyhow!("value must be finite"),
        });
    }
    Ok(parsed)
}

fn parse_bool(name: &'static str, default: bool) -> Result<bool, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    match raw.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            name,
            source: anyhow::anyhow!("invalid boolean value: {raw}"),
        }),
    }
}

fn parse_embedder(name: &'static str, default: &str) -> Result<EmbedderKind, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse()
        .map_err(|source| ConfigError::Invalid { name, source })
}
