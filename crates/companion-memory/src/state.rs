use std::sync::Arc;
use axum::extract::FromRef;

use crate::services::{ChatService, CompanionStore, MemoryManager};
use crate::utils::ChatRateLimiter;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub chat_service: Arc<ChatService>,
    pub memory: Arc<MemoryManager>,
    pub companions: Arc<dyn CompanionStore>,
    pub rate_limiter: Arc<ChatRateLimiter>,
}

impl FromRef<AppState> for Arc<ChatService> {
    fn from_ref(state: &AppState) -> Self {
        state.chat_service.clone()
    }
}

impl FromRef<AppState> for Arc<MemoryManager> {
    fn from_ref(state: &AppState) -> Self {
        state.memory.clone()
    }
}
