//! Local embedding generation via fastembed
//!
//! Uses all-MiniLM-L6-v2 (384 dimensions, ~90MB, CPU-friendly).
//! Model auto-downloads on first use. Embedding calls run on the blocking
//! pool so they never stall the async runtime, and results are cached
//! in-process with moka so repeated queries skip the model entirely.

use crate::error::{Error, Result};
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use moka::future::Cache;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

/// Embedding dimensions for all-MiniLM-L6-v2
pub const EMBEDDING_DIM: usize = 384;

/// Anything that can turn text into a fixed-dimension vector
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate an embedding for a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

fn hash_key(s: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    s.hash(&mut hasher);
    hasher.finish()
}

/// Local embedding service wrapping fastembed, with an in-process cache
#[derive(Clone)]
pub struct EmbeddingService {
    model: Arc<TextEmbedding>,
    cache: Cache<u64, Vec<f32>>,
}

impl EmbeddingService {
    /// Create a new embedding service. Failure here is fatal for the agent:
    /// without embeddings there is no memory.
    pub fn new() -> Result<Self> {
        let model = TextEmbedding::try_new(
            InitOptions::new(EmbeddingModel::AllMiniLML6V2).with_show_download_progress(true),
        )
        .map_err(|e| Error::Memory(format!("Failed to init embedding model: {}", e)))?;

        Ok(EmbeddingService {
            model: Arc::new(model),
            cache: Cache::builder()
                .max_capacity(1000)
                .time_to_live(Duration::from_secs(30 * 60))
                .build(),
        })
    }

    /// Embedding dimensions (384 for all-MiniLM-L6-v2)
    pub fn dimensions(&self) -> usize {
        EMBEDDING_DIM
    }
}

#[async_trait]
impl Embedder for EmbeddingService {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let key = hash_key(text);
        if let Some(cached) = self.cache.get(&key).await {
            return Ok(cached);
        }

        let model = self.model.clone();
        let owned = text.to_string();

        let embedding = tokio::task::spawn_blocking(move || {
            let embeddings = model
                .embed(vec![owned], None)
                .map_err(|e| Error::Memory(format!("Embedding error: {}", e)))?;
            embeddings
                .into_iter()
                .next()
                .ok_or_else(|| Error::Memory("No embedding returned".into()))
        })
        .await
        .map_err(|e| Error::Memory(format!("Embedding task join error: {}", e)))??;

        self.cache.insert(key, embedding.clone()).await;
        Ok(embedding)
    }
}
