//! HTTP handlers.
pub mod create;
pub mod login;
pub mod posts;
pub mod status;
pub mod users;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;
use serde::de::DeserializeOwned;
use validator::{Validate, ValidationError};

use crate::AppState;
use crate::error::{Result, ServerError};
use crate::user::User;

const BEARER: &str = "Bearer ";

/// PostgreSQL refuses NUL in `text` values.
pub(crate) fn validate_text(value: &str) -> std::result::Result<(), ValidationError> {
    if value.contains('\0') {
        return Err(ValidationError::new("nul_byte"));
    }

    Ok(())
}

pub(crate) fn validate_tags(tags: &[String]) -> std::result::Result<(), ValidationError> {
    tags.iter().try_for_each(|tag| validate_text(tag))
}

/// JSON body checked with [`Validate`] before reaching the handler.
#[derive(Debug, Clone, Copy, Default)]
pub struct Valid<T>(pub T);

impl<T, S> FromRequest<S> for Valid<T>
where
    T: DeserializeOwned + Validate + Send,
    S: Send + Sync,
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
{
    type Rejection = ServerError;

    async fn from_request(req: Request, state: &S) -> Result<Self> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        value.validate()?;
        Ok(Valid(value))
    }
}

/// Active user, read from cache first.
pub(crate) async fn find_user(state: &AppState, id: i64) -> Result<User> {
    if let Some(user) = state.cache.get(id).await {
        return Ok(user);
    }

    let user = state.users().find_by_id(id).await?;
    state.cache.set(&user).await;
    Ok(user)
}

/// Resolve the bearer token into an [`Extension<User>`](axum::Extension).
pub(crate) async fn auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .and_then(|header| header.strip_prefix(BEARER))
        .ok_or(ServerError::Unauthorized)?;

    let user_id = state
        .token
        .decode(token)
        .map_err(|_| ServerError::Unauthorized)?
        .user_id()?;

    // deleted or never activated.
    let user = find_user(&state, user_id).await.map_err(|err| match err {
        ServerError::NotFound => ServerError::Unauthorized,
        err => err,
    })?;

    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

/// MUST NEVER be used in production.
#[cfg(test)]
pub fn state(pool: sqlx::PgPool) -> AppState {
    use std::sync::Arc;
    use std::time::Duration;

    use crate::config::{Argon2, BasicAuth, Configuration};

    const URL: &str = "https://api.example.com";

    let mut config = Configuration::default();
    config.name = "social".into();
    config.url = URL.into();
    config.frontend_url = "http://localhost:3000".into();
    config.env = "test".into();
    config.basic_auth = Some(BasicAuth {
        username: "admin".into(),
        password: "hunter2".into(),
    });

    let argon2 = Argon2 {
        memory_cost: 1024,
        iterations: 1,
        parallelism: 1,
        hash_length: 32,
    };

    AppState {
        config: Arc::new(config),
        db: crate::database::Database::from_pool(pool, Duration::from_secs(5)),
        crypto: Arc::new(crate::crypto::Crypto::new(Some(argon2), "pepper").unwrap()),
        token: crate::token::TokenManager::new(URL, URL, b"secret", 3600),
        mail: crate::mail::Mailer::sandbox(),
        cache: crate::cache::UserCache::memory(Duration::from_secs(60)),
        limiter: None,
        metrics: None,
    }
}
