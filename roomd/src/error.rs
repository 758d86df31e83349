//! Maps [`room_core::ErrorKind`] to HTTP status per the status-code
//! policy table: 404 only for `NotFound`, 400 for bad input, 500
//! otherwise (including `Conflict`, which the policy surfaces as a
//! bare 5xx rather than 409). `HostFailure`/`Fatal` log at `error!`
//! before responding since those indicate an operator-actionable fault.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use room_core::{Error, ErrorKind};
use serde::Serialize;
use tracing::error;

#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let Error { kind, message, source } = self.0;

        let status = match kind {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::InvalidInput | ErrorKind::PolicyRefused => StatusCode::BAD_REQUEST,
            ErrorKind::Conflict
            | ErrorKind::HostFailure
            | ErrorKind::DecodeDamage
            | ErrorKind::Fatal => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if matches!(kind, ErrorKind::HostFailure | ErrorKind::Fatal) {
            error!(kind = ?kind, error = ?source, "{message}");
        }

        (status, Json(ErrorBody { error: message })).into_response()
    }
}
