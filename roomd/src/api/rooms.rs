use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use room_core::model::{Room, RoomSpec, RoomStats};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct StartQuery {
    start: Option<bool>,
}

pub async fn list_rooms(
    State(state): State<AppState>,
    Query(labels): Query<HashMap<String, String>>,
) -> Result<Json<Vec<Room>>, ApiError> {
    Ok(Json(state.rooms.list(&labels).await?))
}

pub async fn create_room(
    State(state): State<AppState>,
    Query(q): Query<StartQuery>,
    Json(spec): Json<RoomSpec>,
) -> Result<(StatusCode, Json<Room>), ApiError> {
    let id = state.rooms.create(spec, q.start.unwrap_or(false)).await?;
    let room = state.rooms.get(&id).await?;
    Ok((StatusCode::CREATED, Json(room)))
}

pub async fn get_room(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Room>, ApiError> {
    Ok(Json(state.rooms.get(&id).await?))
}

pub async fn get_room_by_name(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Room>, ApiError> {
    Ok(Json(state.rooms.get_by_name(&name).await?))
}

pub async fn get_room_settings(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RoomSpec>, ApiError> {
    Ok(Json(state.rooms.get_settings(&id).await?))
}

pub async fn get_room_stats(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RoomStats>, ApiError> {
    Ok(Json(state.rooms.get_stats(&id).await?))
}

pub async fn start_room(State(state): State<AppState>, Path(id): Path<String>) -> Result<StatusCode, ApiError> {
    state.rooms.start(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn stop_room(State(state): State<AppState>, Path(id): Path<String>) -> Result<StatusCode, ApiError> {
    state.rooms.stop(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn restart_room(State(state): State<AppState>, Path(id): Path<String>) -> Result<StatusCode, ApiError> {
    state.rooms.restart(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn pause_room(State(state): State<AppState>, Path(id): Path<String>) -> Result<StatusCode, ApiError> {
    state.rooms.pause(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn recreate_room(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(q): Query<StartQuery>,
    Json(spec): Json<RoomSpec>,
) -> Result<Json<Room>, ApiError> {
    let new_id = state.rooms.recreate(&id, spec, q.start.unwrap_or(false)).await?;
    Ok(Json(state.rooms.get(&new_id).await?))
}

pub async fn delete_room(State(state): State<AppState>, Path(id): Path<String>) -> Result<StatusCode, ApiError> {
    state.rooms.remove(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}
