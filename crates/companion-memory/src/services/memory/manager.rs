use std::sync::Arc;
use tracing::{debug, info, warn};

use super::chunker::TextChunker;
use super::history::HistoryStore;
use super::key::CompanionKey;
use super::types::SimilarityResult;
use super::vector::VectorIndex;
use crate::config::MemoryConfig;
use crate::utils::error::MemoryError;

/// Per-(companion, user) conversation memory.
///
/// Construct once at startup and share behind an `Arc`; the stores it wraps
/// open their connections lazily and reuse them.
///
/// Callers are expected to follow read → seed-if-empty → write. Nothing here
/// serialises two requests for the same key, so concurrent first turns can
/// both seed, and concurrent writes can interleave. Every mutation is an
/// append followed by a trim, so the damage is limited to extra or reordered
/// lines.
pub struct MemoryManager {
    history: Arc<dyn HistoryStore>,
    index: Arc<dyn VectorIndex>,
    config: MemoryConfig,
}

impl MemoryManager {
    pub fn new(
        history: Arc<dyn HistoryStore>,
        index: Arc<dyn VectorIndex>,
        config: MemoryConfig,
    ) -> Self {
        info!(
            "Initializing memory manager: window={}, top_k={}, model={}",
            config.max_history_turns, config.retrieval_top_k, config.model_name
        );
        Self {
            history,
            index,
            config,
        }
    }

    pub fn companion_key(&self, companion_id: &str, user_id: &str) -> CompanionKey {
        CompanionKey::new(companion_id, user_id, self.config.model_name.as_str())
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// Most recent turns for `key`, oldest first. A key that was never written
    /// yields an empty vector; only store failures are errors.
    pub async fn read_latest_history(&self, key: &CompanionKey) -> Result<Vec<String>, MemoryError> {
        let turns = self
            .history
            .tail(&key.storage_key(), self.config.max_history_turns)
            .await?;
        debug!("Read {} turns for {}", turns.len(), key);
        Ok(turns)
    }

    /// Appends the fragments of `seed_text` to the window in one step.
    ///
    /// Does not check that the window is empty; see the type-level docs.
    pub async fn seed_chat_history(
        &self,
        seed_text: &str,
        separator: &str,
        key: &CompanionKey,
    ) -> Result<(), MemoryError> {
        let fragments = split_seed(seed_text, separator);
        if fragments.is_empty() {
            debug!("Empty seed for {}, nothing to write", key);
            return Ok(());
        }

        info!("Seeding {} with {} fragments", key, fragments.len());
        self.history
            .append(&key.storage_key(), &fragments, self.config.max_history_turns)
            .await
    }

    pub async fn write_to_history(&self, turn: &str, key: &CompanionKey) -> Result<(), MemoryError> {
        self.history
            .append(
                &key.storage_key(),
                &[turn.to_string()],
                self.config.max_history_turns,
            )
            .await
    }

    /// Fragments of `document_id` most similar to the joined `query_context`.
    ///
    /// Never fails: a missing index or an unavailable backend both mean "no
    /// relevant context" and produce an empty vector.
    pub async fn vector_search(
        &self,
        query_context: &[String],
        document_id: &str,
    ) -> Vec<SimilarityResult> {
        if query_context.is_empty() {
            return Vec::new();
        }

        let query = query_context.join("\n");
        match self
            .index
            .query(document_id, &query, self.config.retrieval_top_k)
            .await
        {
            Ok(results) => {
                debug!("Vector search on {} returned {} fragments", document_id, results.len());
                results
            }
            Err(e) => {
                warn!("Vector search on {} failed, continuing without it: {}", document_id, e);
                Vec::new()
            }
        }
    }

    /// Rebuilds the similarity index of `document_id` from `text`.
    pub async fn index_document(&self, document_id: &str, text: &str) -> Result<usize, MemoryError> {
        let chunker = TextChunker::new(self.config.fragment_size, self.config.fragment_overlap)
            .map_err(|e| MemoryError::Index(format!("Invalid fragment settings: {}", e)))?;
        let fragments = chunker.split(text);
        let count = self.index.replace(document_id, &fragments).await?;
        info!("Indexed {} fragments for {}", count, document_id);
        Ok(count)
    }

    pub async fn ping(&self) -> Result<(), MemoryError> {
        self.history.ping().await
    }
}

fn split_seed(seed_text: &str, separator: &str) -> Vec<String> {
    if separator.is_empty() {
        return if seed_text.is_empty() {
            Vec::new()
        } else {
            vec![seed_text.to_string()]
        };
    }

    seed_text
        .split(separator)
        .filter(|fragment| !fragment.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::memory::history::{InMemoryHistoryStore, MockHistoryStore};
    use crate::services::memory::vector::{InMemoryVectorIndex, MockEmbeddingProvider, MockVectorIndex};

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn config(window: usize) -> MemoryConfig {
        MemoryConfig {
            max_history_turns: window,
            ..MemoryConfig::default()
        }
    }

    fn manager_with_index(window: usize, index: Arc<dyn VectorIndex>) -> MemoryManager {
        MemoryManager::new(Arc::new(InMemoryHistoryStore::new()), index, config(window))
    }

    fn manager(window: usize) -> MemoryManager {
        let mut embedder = MockEmbeddingProvider::new();
        embedder.expect_embed().returning(|_| Ok(vec![1.0, 0.0]));
        manager_with_index(window, Arc::new(InMemoryVectorIndex::new(Arc::new(embedder))))
    }

    #[tokio::test]
    async fn test_unwritten_key_reads_empty() {
        let memory = manager(30);
        let key = memory.companion_key("never", "written");
        assert!(memory.read_latest_history(&key).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_seed_then_read_returns_fragments_in_order() {
        let memory = manager(30);
        let key = memory.companion_key("c1", "u1");

        memory
            .seed_chat_history("Human: hi\nElon: hey\n\nHuman: rockets?\nElon: yes", "\n\n", &key)
            .await
            .unwrap();

        assert_eq!(
            memory.read_latest_history(&key).await.unwrap(),
            strings(&["Human: hi\nElon: hey", "Human: rockets?\nElon: yes"])
        );
    }

    #[tokio::test]
    async fn test_writes_preserve_order() {
        let memory = manager(30);
        let key = memory.companion_key("c1", "u1");
        for turn in ["T1", "T2", "T3"] {
            memory.write_to_history(turn, &key).await.unwrap();
        }
        let history = memory.read_latest_history(&key).await.unwrap();
        assert!(history.ends_with(&strings(&["T1", "T2", "T3"])));
    }

    #[tokio::test]
    async fn test_window_keeps_most_recent_turns() {
        let memory = manager(3);
        let key = memory.companion_key("c1", "u1");
        for i in 0..7 {
            memory.write_to_history(&format!("turn {}", i), &key).await.unwrap();
        }
        assert_eq!(
            memory.read_latest_history(&key).await.unwrap(),
            strings(&["turn 4", "turn 5", "turn 6"])
        );
    }

    #[tokio::test]
    async fn test_keys_do_not_share_windows() {
        let memory = manager(30);
        let alice = memory.companion_key("c1", "alice");
        let bob = memory.companion_key("c1", "bob");
        memory.write_to_history("hello from alice", &alice).await.unwrap();
        assert!(memory.read_latest_history(&bob).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_end_to_end_seed_and_write() {
        let memory = manager(30);
        let key = CompanionKey::new("c1", "u1", "llame2-13b");
        assert_eq!(key, memory.companion_key("c1", "u1"));

        assert!(memory.read_latest_history(&key).await.unwrap().is_empty());
        memory.seed_chat_history("A\n\nB\n\nC", "\n\n", &key).await.unwrap();
        assert_eq!(memory.read_latest_history(&key).await.unwrap(), strings(&["A", "B", "C"]));

        memory.write_to_history("User: hi\n", &key).await.unwrap();
        assert_eq!(
            memory.read_latest_history(&key).await.unwrap(),
            strings(&["A", "B", "C", "User: hi\n"])
        );
    }

    #[tokio::test]
    async fn test_seed_is_appended_as_one_batch() {
        let mut history = MockHistoryStore::new();
        history
            .expect_append()
            .withf(|key, entries, max_len| {
                key == "companion:c1:llame2-13b:u1"
                    && entries.to_vec() == vec!["A".to_string(), "B".to_string()]
                    && *max_len == 30
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let memory = MemoryManager::new(
            Arc::new(history),
            Arc::new(MockVectorIndex::new()),
            MemoryConfig::default(),
        );
        let key = memory.companion_key("c1", "u1");
        memory.seed_chat_history("A\n\nB\n\n", "\n\n", &key).await.unwrap();
    }

    #[tokio::test]
    async fn test_store_failure_propagates_on_read() {
        let mut history = MockHistoryStore::new();
        history
            .expect_tail()
            .returning(|_, _| Err(MemoryError::History("connection refused".into())));

        let memory = MemoryManager::new(
            Arc::new(history),
            Arc::new(MockVectorIndex::new()),
            MemoryConfig::default(),
        );
        let key = memory.companion_key("c1", "u1");
        assert!(memory.read_latest_history(&key).await.is_err());
    }

    #[tokio::test]
    async fn test_vector_search_unknown_document_is_empty() {
        let memory = manager(30);
        let results = memory.vector_search(&strings(&["User: hi\n"]), "missing.txt").await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_vector_search_backend_error_is_empty() {
        let mut index = MockVectorIndex::new();
        index
            .expect_query()
            .returning(|_, _, _| Err(MemoryError::Index("pgvector unavailable".into())));

        let memory = manager_with_index(30, Arc::new(index));
        let results = memory.vector_search(&strings(&["User: hi\n"]), "c1.txt").await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_vector_search_passes_joined_context_and_top_k() {
        let mut index = MockVectorIndex::new();
        index
            .expect_query()
            .withf(|doc, text, top_k| doc == "c1.txt" && text == "A\nB" && *top_k == 3)
            .times(1)
            .returning(|_, _, _| Ok(vec![SimilarityResult::new("c1.txt", "A", 0.8)]));

        let memory = manager_with_index(30, Arc::new(index));
        let results = memory.vector_search(&strings(&["A", "B"]), "c1.txt").await;
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn test_index_document_then_search() {
        let memory = manager(30);
        let count = memory
            .index_document("c1.txt", "You are Elon.\n\nHuman: hi\nElon: hey")
            .await
            .unwrap();
        assert_eq!(count, 2);

        let results = memory.vector_search(&strings(&["hi"]), "c1.txt").await;
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn test_index_document_rejects_bad_fragment_settings() {
        let memory = MemoryManager::new(
            Arc::new(InMemoryHistoryStore::new()),
            Arc::new(MockVectorIndex::new()),
            MemoryConfig {
                fragment_size: 10,
                fragment_overlap: 50,
                ..MemoryConfig::default()
            },
        );
        let err = memory.index_document("c1.txt", "text").await.unwrap_err();
        assert!(matches!(err, MemoryError::Index(_)));
    }

    #[test]
    fn test_split_seed_edge_cases() {
        assert_eq!(split_seed("A\n\nB", "\n\n"), strings(&["A", "B"]));
        assert_eq!(split_seed("A\n\n\n\nB\n\n", "\n\n"), strings(&["A", "B"]));
        assert_eq!(split_seed("whole seed", ""), strings(&["whole seed"]));
        assert!(split_seed("", "\n\n").is_empty());
    }
}
