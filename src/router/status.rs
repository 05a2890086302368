//! Health check and Prometheus exposition.

use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::{Choice, ConstantTimeEq};

use crate::AppState;
use crate::config::BasicAuth;
use crate::error::{Result, ServerError};

const BASIC: &str = "Basic ";

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct Health {
    status: String,
    env: String,
    version: String,
}

fn is_authorized(headers: &HeaderMap, credentials: &BasicAuth) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .and_then(|header| header.strip_prefix(BASIC))
        .and_then(|encoded| STANDARD.decode(encoded).ok())
        .and_then(|decoded| String::from_utf8(decoded).ok())
        .and_then(|pair| {
            pair.split_once(':').map(|(user, pwd)| {
                let matches = same(user, &credentials.username)
                    & same(pwd, &credentials.password);
                bool::from(matches)
            })
        })
        .unwrap_or(false)
}

/// Digests first so lengths leak nothing either.
fn same(candidate: &str, expected: &str) -> Choice {
    Sha256::digest(candidate)
        .as_slice()
        .ct_eq(Sha256::digest(expected).as_slice())
}

/// Server status, protected by basic authentication when configured.
pub async fn health(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Health>> {
    if let Some(credentials) = &state.config.basic_auth {
        if !is_authorized(&headers, credentials) {
            return Err(ServerError::Unauthorized);
        }
    }

    Ok(Json(Health {
        status: "available".into(),
        env: state.config.env.clone(),
        version: state.config.version().to_owned(),
    }))
}

/// Prometheus text format, 404 when no recorder is installed.
pub async fn metrics(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
