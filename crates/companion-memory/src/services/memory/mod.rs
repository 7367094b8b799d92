//! Conversation memory for companion chats
//!
//! - Trailing history windows per (companion, user, model) key
//! - One-time seeding from the companion's example dialogue
//! - Similarity lookup over the companion's indexed text
//! - Prompt assembly and reply post-processing

mod chunker;
pub mod history;
pub mod key;
pub mod manager;
pub mod prompt;
pub mod types;
pub mod vector;

pub use chunker::TextChunker;
pub use history::{HistoryStore, InMemoryHistoryStore, RedisHistoryStore};
pub use key::{document_id_for, CompanionKey};
pub use manager::MemoryManager;
pub use prompt::{PromptBuilder, ReplyPolicy};
pub use types::SimilarityResult;
pub use vector::{EmbeddingProvider, InMemoryVectorIndex, PgVectorIndex, VectorIndex};
