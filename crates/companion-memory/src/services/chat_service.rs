use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::PromptsConfig;
use crate::database::{Companion, MessageRole, Repository};
use crate::models::chat::{ChatReply, IndexResponse};
use crate::services::memory::{document_id_for, MemoryManager, PromptBuilder, ReplyPolicy};
use crate::utils::error::ApiError;

/// Text generation backend.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Companion records and the durable message log.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CompanionStore: Send + Sync {
    async fn find_companion(&self, companion_id: &str) -> Result<Option<Companion>>;

    async fn record_message(
        &self,
        companion_id: &str,
        user_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<()>;

    async fn ping(&self) -> Result<()>;
}

#[async_trait]
impl CompanionStore for Repository {
    async fn find_companion(&self, companion_id: &str) -> Result<Option<Companion>> {
        Repository::find_companion(self, companion_id).await
    }

    async fn record_message(
        &self,
        companion_id: &str,
        user_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<()> {
        let id = self.insert_message(companion_id, user_id, role, content).await?;
        debug!("Recorded {} message {}", role.as_str(), id);
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Repository::ping(self).await
    }
}

/// Runs one chat turn against a companion: history upkeep, retrieval,
/// completion and reply cleanup.
pub struct ChatService {
    memory: Arc<MemoryManager>,
    companions: Arc<dyn CompanionStore>,
    llm: Arc<dyn LlmProvider>,
    prompt_builder: PromptBuilder,
    reply_policy: ReplyPolicy,
}

impl ChatService {
    pub fn new(
        memory: Arc<MemoryManager>,
        companions: Arc<dyn CompanionStore>,
        llm: Arc<dyn LlmProvider>,
        prompts: &PromptsConfig,
    ) -> Self {
        Self {
            memory,
            companions,
            llm,
            prompt_builder: PromptBuilder::new(prompts),
            reply_policy: ReplyPolicy::new(&prompts.reply),
        }
    }

    async fn load_companion(&self, companion_id: &str) -> Result<Companion, ApiError> {
        self.companions
            .find_companion(companion_id)
            .await
            .map_err(|e| ApiError::DatabaseError(e.to_string()))?
            .ok_or_else(|| ApiError::NotFound(format!("Companion {} not found", companion_id)))
    }

    pub async fn handle_turn(
        &self,
        companion_id: &str,
        user_id: &str,
        prompt: &str,
    ) -> Result<ChatReply, ApiError> {
        let companion = self.load_companion(companion_id).await?;

        self.companions
            .record_message(companion_id, user_id, MessageRole::User, prompt)
            .await
            .map_err(|e| ApiError::DatabaseError(e.to_string()))?;

        let key = self.memory.companion_key(companion_id, user_id);

        let existing = self.memory.read_latest_history(&key).await?;
        if existing.is_empty() {
            let separator = self.memory.config().seed_separator.clone();
            self.memory
                .seed_chat_history(&companion.seed, &separator, &key)
                .await?;
        }

        self.memory
            .write_to_history(&format!("User: {}\n", prompt), &key)
            .await?;

        let recent = self.memory.read_latest_history(&key).await?;
        let relevant = self
            .memory
            .vector_search(&recent, &document_id_for(companion_id))
            .await;

        let full_prompt = self.prompt_builder.build(
            &companion.name,
            &companion.instructions,
            &relevant,
            &recent,
        );

        let raw = self
            .llm
            .generate(&full_prompt)
            .await
            .map_err(|e| ApiError::LlmError(e.to_string()))?;

        // Length is judged on the untrimmed segment; whitespace-only segments
        // are never stored.
        let segment = self.reply_policy.extract(&raw);
        let reply = segment.trim().to_string();

        if segment.chars().count() > 1 && !reply.is_empty() {
            self.memory.write_to_history(&reply, &key).await?;
            self.companions
                .record_message(companion_id, user_id, MessageRole::System, &reply)
                .await
                .map_err(|e| ApiError::DatabaseError(e.to_string()))?;
        } else {
            warn!("Discarding empty reply from {} for {}", companion.name, key);
        }

        info!(
            "Turn complete for {}: {} relevant fragments, reply {} chars",
            key,
            relevant.len(),
            reply.chars().count()
        );

        Ok(ChatReply {
            companion_id: companion_id.to_string(),
            reply,
            relevant_fragments: relevant.len(),
        })
    }

    /// Rebuilds the similarity index of a companion from its instructions and
    /// seed dialogue. Only the companion's creator may do this.
    pub async fn index_companion(
        &self,
        companion_id: &str,
        user_id: &str,
    ) -> Result<IndexResponse, ApiError> {
        let companion = self.load_companion(companion_id).await?;
        if companion.user_id != user_id {
            return Err(ApiError::Forbidden(format!(
                "User {} does not own companion {}",
                user_id, companion_id
            )));
        }
        let document_id = document_id_for(companion_id);
        let text = format!("{}\n\n{}", companion.instructions, companion.seed);

        let fragments = self.memory.index_document(&document_id, &text).await?;

        Ok(IndexResponse {
            document_id,
            fragments,
        })
    }
}
