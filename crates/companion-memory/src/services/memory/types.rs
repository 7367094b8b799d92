use serde::Serialize;

/// One fragment returned by a similarity lookup. Produced per call, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarityResult {
    pub document_id: String,
    pub content: String,
    /// Higher is more relevant.
    pub score: f32,
}

impl SimilarityResult {
    pub fn new(document_id: impl Into<String>, content: impl Into<String>, score: f32) -> Self {
        Self {
            document_id: document_id.into(),
            content: content.into(),
            score,
        }
    }
}

/// Joins retrieved fragments into the "relevant history" block of a prompt.
pub fn join_contents(results: &[SimilarityResult]) -> String {
    results
        .iter()
        .map(|r| r.content.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}
