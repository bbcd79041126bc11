use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use rust_bert::pipelines::sentence_embeddings::{
    SentenceEmbeddingsBuilder, SentenceEmbeddingsModel, SentenceEmbeddingsModelType,
};
use thiserror::Error;
use tokio::sync::Mutex;
use xxhash_rust::xxh3::xxh3_64;

/// Dense sentence vector shared by samples and centroids.
pub type Embedding = Vec<f32>;

/// Token the hashing embedder substitutes for empty input.
const EMPTY_TEXT_TOKEN: &str = "<empty>";

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("failed to initialize embedding model: {0}")]
    Init(String),
    #[error("failed to encode texts: {0}")]
    Encode(String),
    #[error("embedding task panicked or was cancelled: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Converts normalized text into fixed-dimension vectors.
///
/// Implementations must be deterministic for a fixed model and input, and the
/// empty string must encode to a non-zero vector.
#[async_trait]
pub trait Embedder: Send + Sync + fmt::Debug {
    /// Dimension of every vector this embedder produces.
    fn dimension(&self) -> usize;

    /// Short identifier recorded in model metadata.
    fn name(&self) -> &str;

    /// Encode a batch of texts; the output is index-aligned with the input.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>, EmbeddingError>;

    async fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| EmbeddingError::Encode("embedder returned no vector".to_string()))
    }
}

/// Sentence embedding service backed by rust-bert's MiniLM model.
/// This runs on CPU.
#[derive(Clone)]
pub struct BertEmbedder {
    model: Arc<Mutex<SentenceEmbeddingsModel>>,
    dimension: usize,
}

impl fmt::Debug for BertEmbedder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BertEmbedder")
            .field("model", &"<SentenceEmbeddingsModel>")
            .field("dimension", &self.dimension)
            .finish()
    }
}

impl BertEmbedder {
    /// Initialize the embedding model.
    /// This might take a while to download the model on first run.
    ///
    /// # Errors
    /// Returns [`EmbeddingError::Init`] when the model cannot be downloaded or loaded.
    pub fn new() -> Result<Self, EmbeddingError> {
        // Model creation is blocking and heavy; keep it off the async runtime.
        let model = std::thread::spawn(|| {
            SentenceEmbeddingsBuilder::remote(SentenceEmbeddingsModelType::AllMiniLmL6V2)
                .create_model()
        })
        .join()
        .map_err(|_| EmbeddingError::Init("failed to join model creation thread".to_string()))?
        .map_err(|error| EmbeddingError::Init(error.to_string()))?;

        let dimension = model
            .get_embedding_dim()
            .map_err(|error| EmbeddingError::Init(error.to_string()))?;
        let dimension = usize::try_from(dimension)
            .map_err(|_| EmbeddingError::Init(format!("invalid embedding dim {dimension}")))?;

        Ok(Self {
            model: Arc::new(Mutex::new(model)),
            dimension,
        })
    }
}

#[async_trait]
impl Embedder for BertEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "all-minilm-l6-v2"
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let model = Arc::clone(&self.model);
        let texts = texts.to_vec();

        // Offload to blocking thread
        tokio::task::spawn_blocking(move || {
            let model = model.blocking_lock();
            model
                .encode(&texts)
                .map_err(|error| EmbeddingError::Encode(error.to_string()))
        })
        .await?
    }
}

/// Deterministic signed feature-hashing embedder.
///
/// Used when no transformer model is available (tests, offline training).
/// Texts that share words land close together under cosine similarity.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    #[must_use]
    pub fn encode(&self, text: &str) -> Embedding {
        let mut vector = vec![0.0_f32; self.dimension];
        let mut tokens = text
            .split_whitespace()
            .map(str::to_lowercase)
            .peekable();
        if tokens.peek().is_none() {
            self.accumulate(&mut vector, EMPTY_TEXT_TOKEN);
        }
        for token in tokens {
            self.accumulate(&mut vector, &token);
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }
        vector
    }

    fn accumulate(&self, vector: &mut [f32], token: &str) {
        let hash = xxh3_64(token.as_bytes());
        #[allow(clippy::cast_possible_truncation)]
        let slot = (hash % self.dimension as u64) as usize;
        let sign = if hash >> 63 == 1 { -1.0 } else { 1.0 };
        vector[slot] += sign;
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "feature-hashing"
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>, EmbeddingError> {
        Ok(texts.iter().map(|text| self.encode(text)).collect())
    }
}

/// Compute cosine similarity between two vectors.
///
/// A zero vector on either side yields `0.0`.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot_product: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}
