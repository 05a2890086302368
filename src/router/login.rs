use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use validator::Validate;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::AppState;
use crate::error::{Result, ServerError};
use crate::router::Valid;

pub const TOKEN_TYPE: &str = "Bearer";

#[derive(Debug, Validate, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct Body {
    #[validate(email(message = "Email must be formatted."))]
    email: String,
    #[validate(length(
        min = 8,
        max = 72,
        message = "Password must contain between 8 and 72 characters."
    ))]
    password: String,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub token_type: String,
    pub token: String,
    pub expires_in: u64,
}

/// Handler to exchange credentials for a JWT.
pub async fn handler(
    State(state): State<AppState>,
    Valid(body): Valid<Body>,
) -> Result<(StatusCode, Json<Response>)> {
    // unknown and pending accounts look like a wrong password.
    let user = state
        .users()
        .find_by_email(&body.email.to_lowercase())
        .await
        .map_err(|err| match err {
            ServerError::NotFound => ServerError::CredentialMismatch,
            err => err,
        })?;

    user.password.compare(&state.crypto.pwd, &body.password)?;

    let token = state.token.create(user.id)?;
    tracing::debug!(user_id = user.id, "user logged in");

    Ok((
        StatusCode::CREATED,
        Json(Response {
            token_type: TOKEN_TYPE.to_owned(),
            token,
            expires_in: state.token.expiration(),
        }),
    ))
}
