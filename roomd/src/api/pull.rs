use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures::Stream;
use serde::Deserialize;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use room_core::host::RegistryAuth;
use room_core::model::PullState;
use room_core::pull_manager::{PullManager, SubscriberId};

use crate::error::ApiError;
use crate::state::AppState;

pub async fn get_pull_state(State(state): State<AppState>) -> Json<PullState> {
    Json(state.pulls.state())
}

#[derive(Debug, Deserialize)]
pub struct StartPullBody {
    image: String,
    username: Option<String>,
    password: Option<String>,
}

pub async fn start_pull(
    State(state): State<AppState>,
    Json(body): Json<StartPullBody>,
) -> Result<StatusCode, ApiError> {
    let auth = match (body.username, body.password) {
        (Some(username), Some(password)) => Some(RegistryAuth { username, password }),
        _ => None,
    };
    state.pulls.start(&body.image, auth)?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn stop_pull(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    state.pulls.stop()?;
    Ok(StatusCode::NO_CONTENT)
}

/// Drops the subscription from [`PullManager`]'s fan-out list once the
/// client disconnects and this stream is torn down.
struct Unsubscribe {
    manager: Arc<PullManager>,
    id: SubscriberId,
}

impl Drop for Unsubscribe {
    fn drop(&mut self) {
        self.manager.unsubscribe(self.id);
    }
}

pub async fn pull_sse(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (id, rx) = state.pulls.subscribe(32);
    let guard = Unsubscribe { manager: state.pulls.clone(), id };
    let stream = ReceiverStream::new(rx).map(move |line| {
        let _keep_alive = &guard;
        Ok(Event::default().data(line))
    });
    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
