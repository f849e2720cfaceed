//! Embedded vector index
//!
//! Append-only store of embedded conversation records with cosine-distance
//! nearest-neighbor queries. Runs fully in-process; an optional JSONL file
//! gives persistence across restarts. The index guards its own state, so
//! concurrent writers from multiple sessions are safe without any locking
//! in the callers.

use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// One stored conversation record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexRecord {
    /// Unique record id
    pub id: Uuid,
    /// The indexed document text
    pub document: String,
    /// Embedding vector
    pub embedding: Vec<f32>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl IndexRecord {
    /// Create a record with a fresh id and the current timestamp
    pub fn new(document: impl Into<String>, embedding: Vec<f32>) -> Self {
        IndexRecord {
            id: Uuid::new_v4(),
            document: document.into(),
            embedding,
            created_at: Utc::now(),
        }
    }
}

/// A nearest-neighbor hit
#[derive(Debug, Clone)]
pub struct QueryHit {
    /// Document text of the matched record
    pub document: String,
    /// Cosine distance to the query (0 = identical, 2 = opposite)
    pub distance: f32,
}

/// Vector index primitives: append and nearest-neighbor query.
/// No update or delete; records are immutable once written.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Append a record to the index
    async fn add(&self, record: IndexRecord) -> Result<()>;

    /// Return up to `k` nearest records by cosine distance, nearest first
    async fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<QueryHit>>;

    /// Number of stored records
    async fn count(&self) -> usize;
}

/// In-process index backed by a guarded Vec, with optional JSONL persistence
pub struct InMemoryIndex {
    records: RwLock<Vec<IndexRecord>>,
    persist_path: Option<PathBuf>,
}

impl InMemoryIndex {
    /// Create an ephemeral index
    pub fn new() -> Self {
        InMemoryIndex {
            records: RwLock::new(Vec::new()),
            persist_path: None,
        }
    }

    /// Open a persistent index, loading any existing records from disk.
    /// A missing file is fine (fresh index); a corrupt line is skipped
    /// with a warning rather than failing the whole load.
    pub async fn open(path: PathBuf) -> Result<Self> {
        let mut records = Vec::new();

        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => {
                for line in contents.lines() {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<IndexRecord>(line) {
                        Ok(record) => records.push(record),
                        Err(e) => warn!("Skipping corrupt index line: {}", e),
                    }
                }
                info!("Loaded {} memory records from {}", records.len(), path.display());
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                info!("Starting fresh memory index at {}", path.display());
            }
            Err(e) => return Err(Error::Memory(format!("Failed to load index: {}", e))),
        }

        Ok(InMemoryIndex {
            records: RwLock::new(records),
            persist_path: Some(path),
        })
    }

    async fn persist(&self, record: &IndexRecord) -> Result<()> {
        let Some(path) = &self.persist_path else {
            return Ok(());
        };

        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        Ok(())
    }
}

impl Default for InMemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn add(&self, record: IndexRecord) -> Result<()> {
        // Write lock held across the file append so persisted order
        // matches in-memory order under concurrent writers
        let mut records = self.records.write().await;
        self.persist(&record).await?;
        records.push(record);
        debug!("Stored memory record (total: {})", records.len());
        Ok(())
    }

    async fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<QueryHit>> {
        let records = self.records.read().await;

        let mut hits: Vec<QueryHit> = records
            .iter()
            .map(|r| QueryHit {
                document: r.document.clone(),
                distance: cosine_distance(embedding, &r.embedding),
            })
            .collect();

        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);
        Ok(hits)
    }

    async fn count(&self) -> usize {
        self.records.read().await.len()
    }
}

/// Cosine distance between two vectors: 0 = identical, 2 = opposite.
/// Mismatched or zero-norm vectors count as maximally distant.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 2.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 2.0;
    }

    1.0 - dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_distance_identical() {
        let v = vec![1.0, 0.0, 0.0];
        assert!(cosine_distance(&v, &v).abs() < 0.001);
    }

    #[test]
    fn test_cosine_distance_opposite() {
        let v1 = vec![1.0, 0.0, 0.0];
        let v2 = vec![-1.0, 0.0, 0.0];
        assert!((cosine_distance(&v1, &v2) - 2.0).abs() < 0.001);
    }

    #[test]
    fn test_cosine_distance_orthogonal() {
        let v1 = vec![1.0, 0.0, 0.0];
        let v2 = vec![0.0, 1.0, 0.0];
        assert!((cosine_distance(&v1, &v2) - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_cosine_distance_zero_norm() {
        let v1 = vec![0.0, 0.0];
        let v2 = vec![1.0, 1.0];
        assert!((cosine_distance(&v1, &v2) - 2.0).abs() < 0.001);
    }

    #[tokio::test]
    async fn test_add_and_count() {
        let index = InMemoryIndex::new();
        assert_eq!(index.count().await, 0);

        index
            .add(IndexRecord::new("doc one", vec![1.0, 0.0]))
            .await
            .unwrap();
        assert_eq!(index.count().await, 1);
    }

    #[tokio::test]
    async fn test_query_nearest_first() {
        let index = InMemoryIndex::new();
        index
            .add(IndexRecord::new("close", vec![1.0, 0.1]))
            .await
            .unwrap();
        index
            .add(IndexRecord::new("far", vec![-1.0, 0.0]))
            .await
            .unwrap();

        let hits = index.query(&[1.0, 0.0], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].document, "close");
        assert!(hits[0].distance < hits[1].distance);
    }

    #[tokio::test]
    async fn test_query_respects_k() {
        let index = InMemoryIndex::new();
        for i in 0..5 {
            index
                .add(IndexRecord::new(format!("doc {}", i), vec![i as f32, 1.0]))
                .await
                .unwrap();
        }

        let hits = index.query(&[1.0, 1.0], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[tokio::test]
    async fn test_persistence_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.jsonl");

        {
            let index = InMemoryIndex::open(path.clone()).await.unwrap();
            index
                .add(IndexRecord::new("persisted doc", vec![0.5, 0.5]))
                .await
                .unwrap();
        }

        let reopened = InMemoryIndex::open(path).await.unwrap();
        assert_eq!(reopened.count().await, 1);
        let hits = reopened.query(&[0.5, 0.5], 1).await.unwrap();
        assert_eq!(hits[0].document, "persisted doc");
    }

    #[tokio::test]
    async fn test_open_skips_corrupt_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.jsonl");
        let good = serde_json::to_string(&IndexRecord::new("good", vec![1.0])).unwrap();
        std::fs::write(&path, format!("{}\nnot json\n", good)).unwrap();

        let index = InMemoryIndex::open(path).await.unwrap();
        assert_eq!(index.count().await, 1);
    }
}
