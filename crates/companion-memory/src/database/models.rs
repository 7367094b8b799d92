use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Companion record as authored by its creator.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
pub struct Companion {
    pub id: String,
    pub user_id: String,
    pub user_name: String,
    pub name: String,
    pub description: String,
    pub instructions: String,
    /// Example dialogue used to seed new conversations.
    pub seed: String,
    pub category_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    System,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::System => "system",
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct FragmentMatch {
    pub document_id: String,
    pub content: String,
    pub similarity: f32,
}
