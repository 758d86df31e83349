use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};

use crate::error::ApiError;
use crate::state::AppState;

pub async fn get_manifest(State(state): State<AppState>) -> Result<Response, ApiError> {
    let yaml = state.rooms.export_manifest().await?;
    Ok((
        [(header::CONTENT_TYPE, "application/x-yaml")],
        yaml,
    )
        .into_response())
}
