use std::collections::HashMap;
use std::convert::Infallible;

use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures::Stream;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use room_core::model::RoomEvent;
use room_core::room_manager::RoomManager;

use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Envelope {
    Event(RoomEvent),
    Error { message: String },
}

/// Drains both the event and error halves of a `RoomManager::events()`
/// subscription into a single ordered channel.
fn fan_in(manager: &RoomManager) -> mpsc::Receiver<Envelope> {
    let mut sub = manager.events();
    let (tx, rx) = mpsc::channel(64);
    tokio::spawn(async move {
        loop {
            tokio::select! {
                event = sub.events.recv() => {
                    match event {
                        Some(event) => {
                            if tx.send(Envelope::Event(event)).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                error = sub.errors.recv() => {
                    match error {
                        Some(error) => {
                            if tx.send(Envelope::Error { message: error.to_string() }).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
            }
        }
    });
    rx
}

pub async fn get_events(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let rx = fan_in(&state.rooms);
    if params.contains_key("sse") {
        sse_response(rx).into_response()
    } else {
        ndjson_response(rx).into_response()
    }
}

fn sse_response(
    rx: mpsc::Receiver<Envelope>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = ReceiverStream::new(rx).map(|envelope| {
        let data = serde_json::to_string(&envelope).unwrap_or_default();
        Ok(Event::default().data(data))
    });
    Sse::new(stream).keep_alive(KeepAlive::new())
}

fn ndjson_response(rx: mpsc::Receiver<Envelope>) -> Response {
    let stream = ReceiverStream::new(rx).map(|envelope| {
        let mut line = serde_json::to_vec(&envelope).unwrap_or_default();
        line.push(b'\n');
        Ok::<_, Infallible>(line)
    });
    let body = axum::body::Body::from_stream(stream);
    Response::builder()
        .header(axum::http::header::CONTENT_TYPE, "application/x-ndjson")
        .body(body)
        .unwrap()
}
