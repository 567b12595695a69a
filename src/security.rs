use crate::models::ApiResponse;
use axum::{
    Json,
    body::Body,
    extract::State,
    http::{self, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::{convert::Infallible, sync::Arc};
use tracing::{info, warn};

/// Optional shared secret for the listing routes. With no password configured every
/// request passes.
#[derive(Clone, Default)]
pub struct AuthState {
    password: Option<Arc<str>>,
}

impl AuthState {
    pub fn new(password: Option<String>) -> Self {
        match &password {
            Some(_) => info!(target = "snaplist.api", "shared-secret auth enabled"),
            None => info!(target = "snaplist.api", "AUTH_PASSWORD not set; auth disabled"),
        }
        Self {
            password: password.map(Arc::from),
        }
    }

    fn accepts(&self, presented: Option<&str>) -> bool {
        match (&self.password, presented) {
            (None, _) => true,
            (Some(expected), Some(given)) => constant_time_eq(expected.as_bytes(), given.as_bytes()),
            (Some(_), None) => false,
        }
    }
}

pub async fn require_shared_secret(
    State(state): State<AuthState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, Infallible> {
    let presented = extract_secret(request.headers());
    if state.accepts(presented.as_deref()) {
        return Ok(next.run(request).await);
    }
    warn!(
        target = "snaplist.api",
        path = %request.uri().path(),
        presented = presented.is_some(),
        "unauthorized_request"
    );
    Ok((
        StatusCode::UNAUTHORIZED,
        Json(ApiResponse::failure("Unauthorized")),
    )
        .into_response())
}

fn extract_secret(headers: &http::HeaderMap) -> Option<String> {
    if let Some(value) = headers.get(http::header::AUTHORIZATION)
        && let Ok(raw) = value.to_str()
        && raw.len() >= 7
        && raw[..6].eq_ignore_ascii_case("bearer")
    {
        return Some(raw[6..].trim().to_string());
    }
    headers
        .get("X-Auth-Password")
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
