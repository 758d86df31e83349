//! Turns a [`Dispatch`] decision from `room_core::proxy` into an actual
//! HTTP response: redirect, rendered lobby page, or a forwarded call to
//! the room's backend.

use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{Html, IntoResponse, Redirect, Response};
use tracing::warn;

use room_core::proxy::{Dispatch, LobbyKind, ProxyTarget};

use crate::state::AppState;

const WAIT_TIMEOUT: Duration = Duration::from_secs(30);

fn wants_wait(query: Option<&str>) -> bool {
    query
        .map(|q| q.split('&').any(|kv| kv == "wait" || kv.starts_with("wait=")))
        .unwrap_or(false)
}

pub async fn reverse_proxy(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri.path().to_string();
    let query = uri.query().map(str::to_string);
    let has_trailing_slash = path.len() > 1 && path.ends_with('/');

    let mut dispatch = state
        .proxy
        .dispatch(&path, has_trailing_slash, wants_wait(query.as_deref()));

    if let Dispatch::Wait { path: wait_path } = &dispatch {
        let woken = state
            .proxy
            .wait_for_ready(wait_path, tokio::time::sleep(WAIT_TIMEOUT))
            .await;
        dispatch = if woken {
            state.proxy.dispatch(&path, has_trailing_slash, false)
        } else {
            Dispatch::Lobby {
                kind: LobbyKind::NotFound,
                wait_url: None,
            }
        };
    }

    match dispatch {
        Dispatch::Redirect { location } => Redirect::temporary(&location).into_response(),
        Dispatch::Lobby { kind, wait_url } => {
            Html(room_core::proxy::lobby_html(kind, wait_url.as_deref())).into_response()
        }
        Dispatch::Wait { .. } => unreachable!("resolved above"),
        Dispatch::Proxy { target, prefix } => {
            forward(&state.http, &target, &prefix, &path, query.as_deref(), method, headers, body).await
        }
    }
}

// TODO: this forwards request/response bodies in full rather than passing
// the `Upgrade` header through, so websocket signaling connections won't
// traverse the proxy yet.
async fn forward(
    client: &reqwest::Client,
    target: &ProxyTarget,
    prefix: &str,
    path: &str,
    query: Option<&str>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let stripped = path.strip_prefix(prefix).unwrap_or(path);
    let stripped = if stripped.is_empty() { "/" } else { stripped };
    let mut url = format!("http://{}:{}{}", target.host, target.port, stripped);
    if let Some(query) = query.filter(|q| !q.is_empty()) {
        url.push('?');
        url.push_str(query);
    }

    let mut request = client.request(method, &url);
    for (name, value) in headers.iter() {
        if name == axum::http::header::HOST {
            continue;
        }
        request = request.header(name, value);
    }

    match request.body(body).send().await {
        Ok(upstream) => {
            let status = upstream.status();
            let response_headers = upstream.headers().clone();
            let bytes = match upstream.bytes().await {
                Ok(bytes) => bytes,
                Err(err) => {
                    warn!(prefix, error = %err, "reverse proxy failed reading upstream body");
                    return StatusCode::BAD_GATEWAY.into_response();
                }
            };
            let mut builder = Response::builder().status(status);
            for (name, value) in response_headers.iter() {
                builder = builder.header(name, value);
            }
            builder.body(axum::body::Body::from(bytes)).unwrap_or_else(|_| {
                StatusCode::BAD_GATEWAY.into_response()
            })
        }
        Err(err) => {
            warn!(prefix, error = %err, "reverse proxy upstream unreachable");
            StatusCode::BAD_GATEWAY.into_response()
        }
    }
}
