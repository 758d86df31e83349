mod config;
mod events;
mod manifest;
mod pull;
mod rooms;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::proxy_handler::reverse_proxy;
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/rooms", get(rooms::list_rooms).post(rooms::create_room))
        .route("/rooms/:id", get(rooms::get_room).delete(rooms::delete_room))
        .route("/rooms/:id/by-name", get(rooms::get_room_by_name))
        .route("/rooms/:id/settings", get(rooms::get_room_settings))
        .route("/rooms/:id/stats", get(rooms::get_room_stats))
        .route("/rooms/:id/start", post(rooms::start_room))
        .route("/rooms/:id/stop", post(rooms::stop_room))
        .route("/rooms/:id/restart", post(rooms::restart_room))
        .route("/rooms/:id/pause", post(rooms::pause_room))
        .route("/rooms/:id/recreate", post(rooms::recreate_room))
        .route("/pull", get(pull::get_pull_state).post(pull::start_pull).delete(pull::stop_pull))
        .route("/pull/sse", get(pull::pull_sse))
        .route("/events", get(events::get_events))
        .route("/config/rooms", get(config::get_rooms_config))
        .route("/docker-compose.yaml", get(manifest::get_manifest))
        .fallback(reverse_proxy)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
