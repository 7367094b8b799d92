use crate::handlers::chat::user_id_from;
use crate::models::chat::IndexResponse;
use crate::state::AppState;
use crate::utils::error::ApiError;
use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use tracing::info;

/// Rebuilds the similarity index a companion's chats retrieve from.
pub async fn index_handler(
    State(state): State<AppState>,
    Path(companion_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<IndexResponse>, ApiError> {
    let user_id = user_id_from(&headers)?;

    info!("Index request for companion {} by {}", companion_id, user_id);

    let response = state
        .chat_service
        .index_companion(&companion_id, &user_id)
        .await?;

    Ok(Json(response))
}
