pub mod chat_service;
pub mod embedding_service;
pub mod llm_service;
pub mod memory;

pub use chat_service::{ChatService, CompanionStore, LlmProvider};
pub use embedding_service::EmbeddingService;
pub use llm_service::LlmService;
pub use memory::MemoryManager;
