use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ===== REQUEST MODELS =====

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub prompt: Option<String>,
}

// ===== RESPONSE MODELS =====

/// Outcome of one chat turn. `reply` is empty when the model produced nothing
/// worth keeping.
#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub companion_id: String,
    pub reply: String,
    pub relevant_fragments: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IndexResponse {
    pub document_id: String,
    pub fragments: usize,
}

// ===== SSE EVENT MODELS =====

#[derive(Debug, Serialize)]
pub struct MessageChunk {
    pub delta: String,
}

#[derive(Debug, Serialize)]
pub struct CompletionInfo {
    pub companion_id: String,
    pub relevant_fragments: usize,
    pub processing_time_ms: u64,
    pub timestamp: DateTime<Utc>,
}
