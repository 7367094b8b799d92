use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use companion_memory::config::{HistoryBackend, IndexBackend, Settings};
use companion_memory::database::{DbPool, Repository};
use companion_memory::router::build_router;
use companion_memory::services::memory::{
    EmbeddingProvider, HistoryStore, InMemoryHistoryStore, InMemoryVectorIndex, PgVectorIndex,
    RedisHistoryStore, VectorIndex,
};
use companion_memory::services::{ChatService, EmbeddingService, LlmService, MemoryManager};
use companion_memory::state::AppState;
use companion_memory::utils::{logger, ChatRateLimiter};

#[tokio::main]
async fn main() -> Result<()> {
    logger::init_logger()?;

    info!("Starting companion memory server...");

    let settings = Settings::load()?;
    info!("Configuration loaded");

    let db_pool = DbPool::new(&settings.database).await?;
    info!("Database connection established");

    let repository = Arc::new(Repository::new(db_pool));

    let embedding_service: Arc<dyn EmbeddingProvider> =
        Arc::new(EmbeddingService::new(settings.embedding.clone())?);

    let history: Arc<dyn HistoryStore> = match settings.memory.history_backend {
        HistoryBackend::Redis => Arc::new(RedisHistoryStore::new(
            &settings.redis.url,
            settings.memory.history_ttl_seconds,
        )?),
        HistoryBackend::Memory => {
            info!("Using in-process history store, windows are lost on restart");
            Arc::new(InMemoryHistoryStore::new())
        }
    };

    let index: Arc<dyn VectorIndex> = match settings.memory.index_backend {
        IndexBackend::Pgvector => Arc::new(PgVectorIndex::new(
            repository.clone(),
            embedding_service.clone(),
        )),
        IndexBackend::Memory => Arc::new(InMemoryVectorIndex::new(embedding_service.clone())),
    };

    let memory = Arc::new(MemoryManager::new(history, index, settings.memory.clone()));

    let llm_service = Arc::new(LlmService::new(settings.llm.clone())?);

    let chat_service = Arc::new(ChatService::new(
        memory.clone(),
        repository.clone(),
        llm_service,
        &settings.prompts,
    ));

    let rate_limiter = Arc::new(ChatRateLimiter::new(&settings.rate_limit));
    {
        let rate_limiter = rate_limiter.clone();
        let period = Duration::from_secs(settings.rate_limit.period_seconds.max(1) * 6);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                rate_limiter.retain_recent();
            }
        });
    }

    let addr = SocketAddr::from((
        settings.server.host.parse::<std::net::IpAddr>()?,
        settings.server.port,
    ));

    let state = AppState {
        chat_service,
        memory,
        companions: repository,
        rate_limiter,
    };

    let app = build_router(state);

    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
