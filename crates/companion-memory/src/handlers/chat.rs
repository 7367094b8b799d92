use crate::models::chat::{ChatRequest, CompletionInfo, MessageChunk};
use crate::state::AppState;
use crate::utils::error::ApiError;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{HeaderMap, Uri},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Instant;
use tracing::info;

pub const USER_ID_HEADER: &str = "x-user-id";

/// Caller identity as forwarded by the authenticating proxy in front of us.
pub(crate) fn user_id_from(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ApiError::Unauthorized("Missing user identity".to_string()))
}

pub async fn chat_handler(
    State(state): State<AppState>,
    Path(companion_id): Path<String>,
    uri: Uri,
    headers: HeaderMap,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let start_time = Instant::now();

    let user_id = user_id_from(&headers)?;

    let identifier = format!("{}-{}", uri.path(), user_id);
    if !state.rate_limiter.check(&identifier) {
        return Err(ApiError::TooManyRequests(identifier));
    }

    let prompt = body
        .ok()
        .and_then(|Json(request)| request.prompt)
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("Missing required field: prompt".to_string()))?;

    info!(
        "Chat request: companion={}, user={}, prompt_len={}",
        companion_id,
        user_id,
        prompt.len()
    );

    let reply = state
        .chat_service
        .handle_turn(&companion_id, &user_id, &prompt)
        .await?;

    let stream = async_stream::stream! {
        yield Ok::<Event, Infallible>(create_sse_event("message", &MessageChunk {
            delta: reply.reply.clone(),
        }));

        yield Ok(create_sse_event("done", &CompletionInfo {
            companion_id: reply.companion_id.clone(),
            relevant_fragments: reply.relevant_fragments,
            processing_time_ms: start_time.elapsed().as_millis() as u64,
            timestamp: chrono::Utc::now(),
        }));
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn create_sse_event<T: serde::Serialize>(event_type: &str, data: &T) -> Event {
    Event::default()
        .event(event_type)
        .data(serde_json::to_string(data).unwrap_or_else(|_| "{}".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_user_id_is_required_and_trimmed() {
        let mut headers = HeaderMap::new();
        assert!(matches!(user_id_from(&headers), Err(ApiError::Unauthorized(_))));

        headers.insert(USER_ID_HEADER, HeaderValue::from_static("   "));
        assert!(matches!(user_id_from(&headers), Err(ApiError::Unauthorized(_))));

        headers.insert(USER_ID_HEADER, HeaderValue::from_static(" user_42 "));
        assert_eq!(user_id_from(&headers).unwrap(), "user_42");
    }
}
