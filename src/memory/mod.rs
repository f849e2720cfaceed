//! Semantic long-term memory
//!
//! After every non-trivial turn, the store embeds `"user: {input}\nagent:
//! {response}"` and appends it to the vector index. Before generation it
//! retrieves the most similar past turns for prompt injection (lightweight
//! RAG). The nearest-neighbor search always returns K results whether or
//! not they are actually related, so a fixed relevance gate discards the
//! noise before anything reaches the model. Injecting irrelevant context
//! confuses small local models more than no context at all.

mod embedding;
mod index;

pub use embedding::{Embedder, EmbeddingService, EMBEDDING_DIM};
pub use index::{cosine_distance, InMemoryIndex, IndexRecord, QueryHit, VectorIndex};

use crate::config::MemoryConfig;
use crate::error::Result;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Turns where either side is shorter than this are not worth indexing:
/// greetings and one-word acknowledgements only pollute retrieval.
const MIN_STORE_CHARS: usize = 12;

/// Hits at or beyond this cosine distance (0 to 2 scale) are discarded
const RELEVANCE_THRESHOLD: f32 = 0.8;

/// Append-mostly semantic index over past conversation turns
pub struct MemoryStore {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    max_context_chunks: usize,
}

impl MemoryStore {
    /// Create a store from parts (used by tests and custom composition)
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        max_context_chunks: usize,
    ) -> Self {
        MemoryStore {
            embedder,
            index,
            max_context_chunks,
        }
    }

    /// Open the default store: fastembed embeddings plus the embedded
    /// index, persistent when a data path is configured. Construction
    /// failure is fatal: no memory, no agent.
    pub async fn open(config: &MemoryConfig) -> Result<Self> {
        let embedder = EmbeddingService::new()?;

        let index: Arc<dyn VectorIndex> = match &config.data_path {
            Some(path) => Arc::new(InMemoryIndex::open(path.clone()).await?),
            None => Arc::new(InMemoryIndex::new()),
        };

        info!(
            "Memory store initialized: {} records, max_context_chunks={}",
            index.count().await,
            config.max_context_chunks
        );

        Ok(MemoryStore::new(
            Arc::new(embedder),
            index,
            config.max_context_chunks,
        ))
    }

    /// Embed and persist one interaction. No-op when either side is below
    /// the noise threshold. Records are never updated or deleted.
    pub async fn store(&self, user_input: &str, response: &str) -> Result<()> {
        if user_input.trim().chars().count() < MIN_STORE_CHARS
            || response.trim().chars().count() < MIN_STORE_CHARS
        {
            debug!("Skipping memory store: turn below noise threshold");
            return Ok(());
        }

        let document = format!("user: {}\nagent: {}", user_input, response);
        let embedding = self.embedder.embed(&document).await?;
        self.index.add(IndexRecord::new(document, embedding)).await
    }

    /// Retrieve the most relevant past interactions, formatted for prompt
    /// injection. Returns an empty string when the index is empty or no
    /// hit passes the relevance gate.
    pub async fn retrieve(&self, query: &str) -> Result<String> {
        let count = self.index.count().await;
        if count == 0 {
            return Ok(String::new());
        }

        let k = self.max_context_chunks.min(count);
        let embedding = self.embedder.embed(query).await?;
        let hits = self.index.query(&embedding, k).await?;

        let relevant: Vec<QueryHit> = hits
            .into_iter()
            .filter(|hit| hit.distance < RELEVANCE_THRESHOLD)
            .collect();

        if relevant.is_empty() {
            debug!("No memory hits passed the relevance gate");
            return Ok(String::new());
        }

        let chunks: Vec<String> = relevant
            .iter()
            .enumerate()
            .map(|(i, hit)| format!("[Memory {}]\n{}", i + 1, hit.document))
            .collect();

        Ok(chunks.join("\n\n"))
    }

    /// Number of stored records
    pub async fn count(&self) -> usize {
        self.index.count().await
    }

    /// Retrieve, but degrade failures to "no memory this turn"
    pub async fn retrieve_or_empty(&self, query: &str) -> String {
        match self.retrieve(query).await {
            Ok(context) => context,
            Err(e) => {
                warn!("Memory retrieval failed, continuing without: {}", e);
                String::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    /// Deterministic bag-of-words embedder: each word bumps one dimension.
    /// Shared vocabulary between texts yields low cosine distance.
    struct HashEmbedder;

    #[async_trait]
    impl Embedder for HashEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let mut v = vec![0.0f32; 64];
            for word in text
                .to_lowercase()
                .split(|c: char| !c.is_alphanumeric())
                .filter(|w| !w.is_empty())
            {
                let mut hasher = std::collections::hash_map::DefaultHasher::new();
                std::hash::Hash::hash(&word, &mut hasher);
                let idx = (std::hash::Hasher::finish(&hasher) % 64) as usize;
                v[idx] += 1.0;
            }
            Ok(v)
        }
    }

    fn test_store() -> MemoryStore {
        MemoryStore::new(Arc::new(HashEmbedder), Arc::new(InMemoryIndex::new()), 3)
    }

    #[tokio::test]
    async fn test_retrieve_empty_index_returns_empty() {
        let store = test_store();
        assert_eq!(store.retrieve("anything at all").await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_store_below_noise_threshold_is_noop() {
        let store = test_store();
        store.store("hi", "ok").await.unwrap();
        assert_eq!(store.count().await, 0);
    }

    #[tokio::test]
    async fn test_store_creates_exactly_one_record() {
        let store = test_store();
        store
            .store("What is Rust?", "Rust is a systems programming language.")
            .await
            .unwrap();
        assert_eq!(store.count().await, 1);
    }

    #[tokio::test]
    async fn test_retrieve_finds_related_turn() {
        let store = test_store();
        store
            .store(
                "What is Python?",
                "Python is a high-level programming language.",
            )
            .await
            .unwrap();

        let context = store
            .retrieve("Tell me about Python programming")
            .await
            .unwrap();
        assert!(context.contains("[Memory 1]"));
        assert!(context.contains("Python"));
    }

    #[tokio::test]
    async fn test_relevance_gate_discards_unrelated() {
        let store = test_store();
        store
            .store(
                "What is the capital of France?",
                "The capital of France is Paris.",
            )
            .await
            .unwrap();

        // No shared vocabulary: every hit should be gated out
        let context = store
            .retrieve("quantum entanglement superconductor physics")
            .await
            .unwrap();
        assert_eq!(context, "");
    }

    #[tokio::test]
    async fn test_document_format() {
        let index = Arc::new(InMemoryIndex::new());
        let store = MemoryStore::new(Arc::new(HashEmbedder), index.clone(), 3);

        store
            .store("What is Rust?", "Rust is a systems programming language.")
            .await
            .unwrap();

        let embedding = HashEmbedder.embed("What is Rust?").await.unwrap();
        let hits = index.query(&embedding, 1).await.unwrap();
        assert_eq!(
            hits[0].document,
            "user: What is Rust?\nagent: Rust is a systems programming language."
        );
    }

    #[tokio::test]
    async fn test_retrieve_numbering_is_sequential() {
        let store = test_store();
        store
            .store("Tell me about Rust lifetimes", "Lifetimes describe borrow scopes in Rust.")
            .await
            .unwrap();
        store
            .store("Explain Rust ownership rules", "Ownership moves values unless borrowed in Rust.")
            .await
            .unwrap();

        let context = store.retrieve("Rust ownership and lifetimes").await.unwrap();
        assert!(context.contains("[Memory 1]"));
        assert!(context.contains("[Memory 2]"));
    }
}
