//! Text encoders.
//!
//! Ghost embeds twice: once in bulk when the corpus is ingested, and once
//! per turn for the query. Both paths must go through the same encoder or
//! query and corpus vectors land in different spaces.
//!
//! - `OnnxEmbeddingService`: a sentence-transformer ONNX export (by default
//!   all-MiniLM-L6-v2) run through ort, tokenized with HuggingFace tokenizers.
//! - `MockEmbedding`: deterministic pseudo-random unit vectors for tests.

use std::collections::hash_map::DefaultHasher;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use ndarray::Array2;
use ort::session::Session;
use ort::value::TensorRef;
use tokenizers::{Encoding, Tokenizer};
use tracing::{debug, info};

use ghost_core::error::GhostError;

/// Boxed embedding future returned by [`DynEmbeddingService`].
pub type EmbedFuture<'a> = Pin<Box<dyn Future<Output = Result<Vec<f32>, GhostError>> + Send + 'a>>;

/// Maps text to a fixed-length vector.
pub trait EmbeddingService: Send + Sync {
    /// Encode one message. Empty text is an `Embedding` error.
    fn embed(&self, text: &str) -> impl Future<Output = Result<Vec<f32>, GhostError>> + Send;

    /// Length of every vector this encoder returns.
    fn dimensions(&self) -> usize;
}

/// `EmbeddingService` behind a vtable, so the session can hold `Arc<dyn _>`.
///
/// Implemented for every `EmbeddingService`.
pub trait DynEmbeddingService: Send + Sync {
    fn embed_boxed<'a>(&'a self, text: &'a str) -> EmbedFuture<'a>;

    fn dimensions(&self) -> usize;
}

impl<T: EmbeddingService> DynEmbeddingService for T {
    fn embed_boxed<'a>(&'a self, text: &'a str) -> EmbedFuture<'a> {
        Box::pin(self.embed(text))
    }

    fn dimensions(&self) -> usize {
        EmbeddingService::dimensions(self)
    }
}

fn reject_empty(text: &str) -> Result<(), GhostError> {
    if text.is_empty() {
        return Err(GhostError::Embedding("refusing to embed empty text".to_string()));
    }
    Ok(())
}

// =============================================================================
// ONNX sentence-transformer
// =============================================================================

/// Sentence-transformer served by ONNX Runtime.
///
/// The model directory holds `model.onnx` and `tokenizer.json`. Token
/// embeddings are averaged over the attention mask and L2-normalised, so the
/// index's cosine distance stays in the range the retrieval thresholds expect.
#[derive(Clone)]
pub struct OnnxEmbeddingService {
    session: Arc<Mutex<Session>>,
    tokenizer: Arc<Tokenizer>,
    dimensions: usize,
}

impl std::fmt::Debug for OnnxEmbeddingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxEmbeddingService")
            .field("dimensions", &self.dimensions)
            .finish_non_exhaustive()
    }
}

/// The three `[1, seq_len]` input tensors a BERT-style export expects.
struct ModelInputs {
    input_ids: Array2<i64>,
    attention_mask: Array2<i64>,
    token_type_ids: Array2<i64>,
}

impl ModelInputs {
    fn from_encoding(encoding: &Encoding) -> Result<Self, GhostError> {
        Ok(Self {
            input_ids: as_row(encoding.get_ids())?,
            attention_mask: as_row(encoding.get_attention_mask())?,
            token_type_ids: as_row(encoding.get_type_ids())?,
        })
    }
}

fn as_row(values: &[u32]) -> Result<Array2<i64>, GhostError> {
    let row: Vec<i64> = values.iter().map(|&v| i64::from(v)).collect();
    Array2::from_shape_vec((1, row.len()), row)
        .map_err(|e| GhostError::Embedding(format!("input tensor shape: {}", e)))
}

fn load_error<E: std::fmt::Display>(path: &Path) -> impl Fn(E) -> GhostError + '_ {
    move |e| GhostError::Embedding(format!("loading {}: {}", path.display(), e))
}

fn tensor_ref(array: &Array2<i64>) -> Result<TensorRef<'_, i64>, GhostError> {
    TensorRef::from_array_view(array)
        .map_err(|e| GhostError::Embedding(format!("input tensor: {}", e)))
}

impl OnnxEmbeddingService {
    /// Open `<model_dir>/model.onnx` and `<model_dir>/tokenizer.json`.
    pub fn from_directory(model_dir: &Path) -> Result<Self, GhostError> {
        Self::from_files(
            &model_dir.join("model.onnx"),
            &model_dir.join("tokenizer.json"),
        )
    }

    /// Open a model and tokenizer by path. Missing files are a startup error.
    pub fn from_files(model_path: &Path, tokenizer_path: &Path) -> Result<Self, GhostError> {
        for (what, path) in [("model", model_path), ("tokenizer", tokenizer_path)] {
            if !path.is_file() {
                return Err(GhostError::Config(format!(
                    "embedding {} missing: {}",
                    what,
                    path.display()
                )));
            }
        }

        let session = Session::builder()
            .map_err(load_error(model_path))?
            .with_intra_threads(1)
            .map_err(load_error(model_path))?
            .commit_from_file(model_path)
            .map_err(load_error(model_path))?;

        // First output is [batch, seq_len, hidden]; hidden is the vector size.
        let dimensions = session
            .outputs()
            .first()
            .and_then(|out| out.dtype().tensor_shape())
            .and_then(|shape| shape.last().copied())
            .filter(|d| *d > 0)
            .map(|d| d as usize)
            .ok_or_else(|| {
                GhostError::Config(format!(
                    "cannot determine embedding dimension of {}",
                    model_path.display()
                ))
            })?;

        let tokenizer = Tokenizer::from_file(tokenizer_path).map_err(load_error(tokenizer_path))?;

        info!(model = %model_path.display(), dimensions, "Sentence encoder ready");

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            tokenizer: Arc::new(tokenizer),
            dimensions,
        })
    }

    /// Blocking encode: tokenize, run the graph, pool.
    fn encode_blocking(&self, text: &str) -> Result<Vec<f32>, GhostError> {
        reject_empty(text)?;

        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| GhostError::Embedding(format!("tokenizer: {}", e)))?;
        let inputs = ModelInputs::from_encoding(&encoding)?;

        let feed = ort::inputs![
            tensor_ref(&inputs.input_ids)?,
            tensor_ref(&inputs.attention_mask)?,
            tensor_ref(&inputs.token_type_ids)?
        ];

        let mut session = self
            .session
            .lock()
            .map_err(|_| GhostError::Embedding("encoder session poisoned".to_string()))?;
        let outputs = session
            .run(feed)
            .map_err(|e| GhostError::Embedding(format!("inference: {}", e)))?;
        let (shape, token_embeddings) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| GhostError::Embedding(format!("reading output: {}", e)))?;

        let dims: Vec<i64> = shape.iter().copied().collect();
        let hidden = dims
            .last()
            .copied()
            .filter(|d| *d > 0)
            .map(|d| d as usize)
            .ok_or_else(|| GhostError::Embedding(format!("output shape {:?}", dims)))?;

        debug!(tokens = encoding.len(), hidden, "Encoded text");
        Ok(mean_pool_normalized(
            token_embeddings,
            encoding.get_attention_mask(),
            hidden,
        ))
    }
}

/// Average the unmasked token rows, then scale to unit length.
fn mean_pool_normalized(token_embeddings: &[f32], mask: &[u32], hidden: usize) -> Vec<f32> {
    let rows = token_embeddings
        .chunks_exact(hidden)
        .zip(mask)
        .filter(|(_, &m)| m > 0)
        .map(|(row, _)| row);

    let mut pooled = vec![0.0f32; hidden];
    let mut count = 0usize;
    for row in rows {
        pooled.iter_mut().zip(row).for_each(|(acc, v)| *acc += v);
        count += 1;
    }
    if count > 0 {
        pooled.iter_mut().for_each(|v| *v /= count as f32);
    }

    normalize(&mut pooled);
    pooled
}

/// Scale to unit L2 norm. The zero vector is left as is.
fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|v| *v /= norm);
    }
}

impl EmbeddingService for OnnxEmbeddingService {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, GhostError> {
        let encoder = self.clone();
        let text = text.to_owned();
        // CPU-bound; runs on the blocking pool.
        tokio::task::spawn_blocking(move || encoder.encode_blocking(&text))
            .await
            .map_err(|e| GhostError::Embedding(format!("encoder task failed: {}", e)))?
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

// =============================================================================
// Deterministic test encoder
// =============================================================================

/// Encoder that needs no model: each text seeds a pseudo-random unit vector.
///
/// Equal texts map to equal vectors (distance 0); different texts land
/// close to orthogonal once the dimension is in the hundreds.
#[derive(Debug, Clone)]
pub struct MockEmbedding {
    dimensions: usize,
}

impl Default for MockEmbedding {
    fn default() -> Self {
        Self { dimensions: 384 }
    }
}

impl MockEmbedding {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dimensions(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        let mut state = hasher.finish();

        // splitmix64
        let mut next = move || {
            state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
            let mut z = state;
            z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
            z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
            z ^ (z >> 31)
        };

        let mut vector: Vec<f32> = (0..self.dimensions)
            .map(|_| ((next() >> 11) as f64 / (1u64 << 53) as f64 * 2.0 - 1.0) as f32)
            .collect();
        normalize(&mut vector);
        vector
    }
}

impl EmbeddingService for MockEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, GhostError> {
        reject_empty(text)?;
        Ok(self.vector_for(text))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
