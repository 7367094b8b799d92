pub mod chat;

pub use chat::{ChatReply, ChatRequest, CompletionInfo, IndexResponse, MessageChunk};
