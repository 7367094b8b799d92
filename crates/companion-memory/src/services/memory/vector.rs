use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use pgvector::Vector;
use std::sync::Arc;
use tracing::debug;

use super::types::SimilarityResult;
use crate::database::Repository;
use crate::utils::error::MemoryError;
use crate::utils::similarity::{cosine_similarity, top_k_by_score};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Similarity index partitioned by document id.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Replaces everything indexed under `document_id`; returns the fragment count.
    async fn replace(&self, document_id: &str, fragments: &[String]) -> Result<usize, MemoryError>;

    /// Top `top_k` fragments by decreasing score. Unknown documents yield `[]`.
    async fn query(
        &self,
        document_id: &str,
        text: &str,
        top_k: usize,
    ) -> Result<Vec<SimilarityResult>, MemoryError>;
}

async fn embed_all(
    embedder: &dyn EmbeddingProvider,
    fragments: &[String],
) -> Result<Vec<Vec<f32>>, MemoryError> {
    let mut embeddings = Vec::with_capacity(fragments.len());
    for fragment in fragments {
        let embedding = embedder
            .embed(fragment)
            .await
            .map_err(|e| MemoryError::Embedding(e.to_string()))?;
        embeddings.push(embedding);
    }
    Ok(embeddings)
}

/// Fragments live in the `companion_fragments` table; search uses pgvector's
/// cosine distance.
pub struct PgVectorIndex {
    repository: Arc<Repository>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl PgVectorIndex {
    pub fn new(repository: Arc<Repository>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            repository,
            embedder,
        }
    }
}

#[async_trait]
impl VectorIndex for PgVectorIndex {
    async fn replace(&self, document_id: &str, fragments: &[String]) -> Result<usize, MemoryError> {
        let embeddings = embed_all(self.embedder.as_ref(), fragments).await?;

        let rows = fragments
            .iter()
            .cloned()
            .zip(embeddings.into_iter().map(Vector::from))
            .collect();

        self.repository
            .replace_fragments(document_id, rows)
            .await
            .map_err(|e| MemoryError::Index(e.to_string()))
    }

    async fn query(
        &self,
        document_id: &str,
        text: &str,
        top_k: usize,
    ) -> Result<Vec<SimilarityResult>, MemoryError> {
        let embedding = self
            .embedder
            .embed(text)
            .await
            .map_err(|e| MemoryError::Embedding(e.to_string()))?;

        let matches = self
            .repository
            .search_fragments(document_id, Vector::from(embedding), top_k as i64)
            .await
            .map_err(|e| MemoryError::Index(e.to_string()))?;

        Ok(matches
            .into_iter()
            .map(|m| SimilarityResult::new(m.document_id, m.content, m.similarity))
            .collect())
    }
}

#[derive(Debug, Clone)]
struct IndexedFragment {
    content: String,
    embedding: Vec<f32>,
}

/// Brute-force cosine index held in process memory.
pub struct InMemoryVectorIndex {
    embedder: Arc<dyn EmbeddingProvider>,
    documents: DashMap<String, Vec<IndexedFragment>>,
}

impl InMemoryVectorIndex {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            embedder,
            documents: DashMap::new(),
        }
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn replace(&self, document_id: &str, fragments: &[String]) -> Result<usize, MemoryError> {
        let embeddings = embed_all(self.embedder.as_ref(), fragments).await?;

        let indexed: Vec<IndexedFragment> = fragments
            .iter()
            .cloned()
            .zip(embeddings)
            .map(|(content, embedding)| IndexedFragment { content, embedding })
            .collect();

        let count = indexed.len();
        self.documents.insert(document_id.to_string(), indexed);
        Ok(count)
    }

    async fn query(
        &self,
        document_id: &str,
        text: &str,
        top_k: usize,
    ) -> Result<Vec<SimilarityResult>, MemoryError> {
        let Some(fragments) = self.documents.get(document_id).map(|f| f.value().clone()) else {
            debug!("No index for {}", document_id);
            return Ok(Vec::new());
        };

        let query = self
            .embedder
            .embed(text)
            .await
            .map_err(|e| MemoryError::Embedding(e.to_string()))?;

        let scored = fragments
            .into_iter()
            .filter_map(|f| cosine_similarity(&query, &f.embedding).map(|s| (f.content, s)))
            .collect();

        Ok(top_k_by_score(scored, top_k)
            .into_iter()
            .map(|(content, score)| SimilarityResult::new(document_id, content, score))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Maps text onto counts of a few marker words.
    struct KeywordEmbedder;

    #[async_trait]
    impl EmbeddingProvider for KeywordEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let lower = text.to_lowercase();
            Ok(["rocket", "car", "music"]
                .iter()
                .map(|w| lower.matches(w).count() as f32)
                .collect())
        }
    }

    fn fragments(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_unknown_document_is_empty() {
        let index = InMemoryVectorIndex::new(Arc::new(KeywordEmbedder));
        assert!(index.query("c9.txt", "rocket", 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_query_ranks_by_score() {
        let index = InMemoryVectorIndex::new(Arc::new(KeywordEmbedder));
        let count = index
            .replace(
                "c1.txt",
                &fragments(&["I love music", "Rocket launches", "Car and rocket factory"]),
            )
            .await
            .unwrap();
        assert_eq!(count, 3);

        let results = index.query("c1.txt", "tell me about the rocket", 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].content, "Rocket launches");
        assert!(results[0].score >= results[1].score);
        assert!(results.iter().all(|r| r.document_id == "c1.txt"));
    }

    #[tokio::test]
    async fn test_replace_discards_previous_fragments() {
        let index = InMemoryVectorIndex::new(Arc::new(KeywordEmbedder));
        index.replace("c1.txt", &fragments(&["old rocket"])).await.unwrap();
        index.replace("c1.txt", &fragments(&["new music"])).await.unwrap();

        let results = index.query("c1.txt", "music", 5).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].content, "new music");
    }

    #[tokio::test]
    async fn test_embedding_failure_surfaces() {
        let mut embedder = MockEmbeddingProvider::new();
        embedder
            .expect_embed()
            .returning(|_| Err(anyhow::anyhow!("embedding server down")));

        let index = InMemoryVectorIndex::new(Arc::new(embedder));
        let err = index.replace("c1.txt", &fragments(&["x"])).await.unwrap_err();
        assert!(matches!(err, MemoryError::Embedding(_)));
    }
}
