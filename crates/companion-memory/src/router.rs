use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};

use crate::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/health/ready", get(handlers::health::readiness_check));

    let api_routes = Router::new()
        .route("/api/chat/{companion_id}", post(handlers::chat::chat_handler))
        .route(
            "/api/companion/{companion_id}/index",
            post(handlers::companion::index_handler),
        );

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .layer(
            CorsLayer::permissive()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(false)),
        )
        .with_state(state)
}
