// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bearer-token authentication middleware. Disabled entirely when the
//! server is started without `--auth-token`.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use platform_core::error::ErrorCode;

use crate::error::{ApiError, ErrorResponse};
use crate::state::AppState;

/// Constant-time comparison to avoid leaking token contents through
/// response-timing side channels.
fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut acc = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        acc |= x ^ y;
    }
    acc == 0
}

pub fn validate_bearer(headers: &HeaderMap, expected: Option<&str>) -> Result<(), ApiError> {
    let Some(expected) = expected else { return Ok(()) };

    let header = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::new(ErrorCode::InvalidRequest, "missing authorization header"))?;
    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| ApiError::new(ErrorCode::InvalidRequest, "expected a bearer token"))?;

    if constant_time_eq(token, expected) {
        Ok(())
    } else {
        Err(ApiError::new(ErrorCode::InvalidRequest, "invalid bearer token"))
    }
}

pub fn validate_ws_query(token: Option<&str>, expected: Option<&str>) -> bool {
    match (expected, token) {
        (None, _) => true,
        (Some(expected), Some(token)) => constant_time_eq(token, expected),
        (Some(_), None) => false,
    }
}

/// Enforces the bearer token on every HTTP route except `/api/health` and
/// the WebSocket upgrades (those authenticate via `?token=`).
pub async fn auth_layer(state: State<Arc<AppState>>, req: Request<axum::body::Body>, next: Next) -> Response {
    let path = req.uri().path();
    if path == "/api/health" || path.starts_with("/ws/") {
        return next.run(req).await;
    }

    if let Err(err) = validate_bearer(req.headers(), state.config.auth_token.as_deref()) {
        let body = ErrorResponse { error: err.to_error_body() };
        return (StatusCode::from_u16(err.code.http_status()).unwrap_or(StatusCode::BAD_REQUEST), Json(body)).into_response();
    }

    next.run(req).await
}
