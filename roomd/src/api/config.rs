use axum::extract::State;
use axum::Json;

use room_core::config::RoomsConfig;

use crate::state::AppState;

pub async fn get_rooms_config(State(state): State<AppState>) -> Json<RoomsConfig> {
    Json(RoomsConfig::from(state.rooms.config()))
}
