//! Social is a small social-media API: accounts activated by e-mail, posts,
//! comments and per-user feeds.
#![forbid(unsafe_code)]

mod cache;
mod comment;
mod crypto;
mod database;
pub mod error;
mod feed;
mod mail;
mod post;
mod ratelimit;
mod router;
pub mod telemetry;
mod token;
mod user;

pub mod config;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::http::{Method, StatusCode, header};
use axum::routing::{get, post};
use axum::{Router, middleware as AxumMiddleware};
use metrics_exporter_prometheus::PrometheusHandle;
use tower::ServiceBuilder;
use tower_http::LatencyUnit;
use tower_http::cors::{Any, CorsLayer};
use tower_http::sensitive_headers::SetSensitiveHeadersLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{
    DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer,
};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// MUST NEVER be used in production.
#[cfg(test)]
pub async fn make_request(
    token: Option<String>,
    app: Router,
    method: Method,
    path: &str,
    body: String,
) -> axum::http::Response<axum::body::Body> {
    use axum::extract::Request;
    use tower::util::ServiceExt;

    let mut request = Request::builder()
        .method(method)
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        request =
            request.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }

    app.oneshot(request.body(axum::body::Body::from(body)).unwrap())
        .await
        .unwrap()
}

/// State sharing between routes.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<config::Configuration>,
    pub db: database::Database,
    pub crypto: Arc<crypto::Crypto>,
    pub token: token::TokenManager,
    pub mail: mail::Mailer,
    pub cache: cache::UserCache,
    pub limiter: Option<Arc<ratelimit::RateLimiter>>,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub(crate) fn users(&self) -> user::UserRepository {
        user::UserRepository::new(
            self.db.postgres.clone(),
            self.crypto.hasher.clone(),
            self.db.timeout,
        )
    }

    pub(crate) fn posts(&self) -> post::PostRepository {
        post::PostRepository::new(self.db.postgres.clone(), self.db.timeout)
    }

    pub(crate) fn comments(&self) -> comment::CommentRepository {
        comment::CommentRepository::new(
            self.db.postgres.clone(),
            self.db.timeout,
        )
    }
}

/// Create router.
pub fn app(state: AppState) -> Router {
    let middleware = ServiceBuilder::new()
        // Add high level tracing/logging to all requests.
        .layer(
            TraceLayer::new_for_http()
                .on_body_chunk(|chunk: &Bytes, latency: Duration, _span: &tracing::Span| {
                    tracing::trace!(size_bytes = chunk.len(), latency = ?latency, "sending body chunk")
                })
                .make_span_with(DefaultMakeSpan::new().include_headers(true).level(tracing::Level::INFO))
                .on_request(DefaultOnRequest::new())
                .on_response(DefaultOnResponse::new().include_headers(true).latency_unit(LatencyUnit::Micros)),
        )
        // Set a timeout.
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, Duration::from_secs(10)))
        // Remove senstive headers from trace.
        .layer(SetSensitiveHeadersLayer::new([header::AUTHORIZATION, header::COOKIE]))
        // Add CORS preflight support.
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE, Method::OPTIONS])
                .allow_headers(Any)
                .vary([header::AUTHORIZATION]),
        );

    let v1 = Router::new()
        // `GET /v1/health` goes to `health`. Basic authentication.
        .route("/health", get(router::status::health))
        // `POST /v1/authentication/user` goes to `create`.
        .route("/authentication/user", post(router::create::handler))
        // `POST /v1/authentication/token` goes to `login`.
        .route("/authentication/token", post(router::login::handler))
        .nest("/users", router::users::router(state.clone()))
        .nest("/posts", router::posts::router(state.clone()));

    Router::new()
        .nest("/v1", v1)
        // `GET /metrics` exposes Prometheus metrics.
        .route("/metrics", get(router::status::metrics))
        .with_state(state.clone())
        .route_layer(AxumMiddleware::from_fn(telemetry::track))
        // Limit requests per client address.
        .layer(AxumMiddleware::from_fn_with_state(state, ratelimit::limit))
        .layer(middleware)
}

/// Initialize the application state.
pub async fn initialize_state(
    config: Arc<config::Configuration>,
) -> Result<AppState, BoxError> {
    let Some(postgres) = &config.postgres else {
        return Err("missing `postgres` entry on `config.yaml` file".into());
    };
    let db = database::Database::new(
        &postgres.address,
        postgres
            .username
            .as_deref()
            .unwrap_or(database::DEFAULT_CREDENTIALS),
        postgres
            .password
            .as_deref()
            .unwrap_or(database::DEFAULT_CREDENTIALS),
        postgres
            .database
            .as_deref()
            .unwrap_or(database::DEFAULT_DATABASE_NAME),
        postgres.pool_size.unwrap_or(database::DEFAULT_POOL_SIZE),
        config.query_timeout(),
    )
    .await?;

    // execute migrations scripts on start.
    sqlx::migrate!().run(&db.postgres).await?;

    let salt = std::env::var("SALT")
        .map_err(|_| "missing `SALT` environnement variable")?;
    let crypto = Arc::new(crypto::Crypto::new(config.argon2.clone(), salt)?);

    // handle jwt.
    let token = config.token.clone().unwrap_or_default();
    if token.secret.is_empty() {
        return Err("missing `token.secret` entry or `TOKEN_SECRET` variable".into());
    }
    let token = token::TokenManager::new(
        token.issuer.as_deref().unwrap_or(&config.url),
        token.audience.as_deref().unwrap_or(&config.url),
        token.secret.as_bytes(),
        token.expiration.unwrap_or(token::DEFAULT_EXPIRATION),
    );

    // handle mail sender.
    let mail = match &config.mail {
        Some(cfg) => mail::Mailer::new(cfg)?,
        None => {
            tracing::warn!("missing `mail` entry, e-mails will only be logged");
            mail::Mailer::sandbox()
        },
    };

    let cache = match &config.cache {
        Some(cfg) => {
            let expiration = Duration::from_secs(
                cfg.expiration.unwrap_or(cache::DEFAULT_EXPIRATION),
            );
            match cfg.address.as_deref().filter(|a| !a.is_empty()) {
                Some(address) => cache::UserCache::redis(address, expiration).await?,
                None if cfg.memory => cache::UserCache::memory(expiration),
                None => cache::UserCache::disabled(),
            }
        },
        None => cache::UserCache::disabled(),
    };

    let limiter = ratelimit::RateLimiter::from_config(config.rate_limit.as_ref())
        .map(Arc::new);
    match &limiter {
        Some(limiter) => limiter.spawn_purge(),
        None => tracing::warn!("rate limiter disabled"),
    }

    let metrics = if config.telemetry.as_ref().is_some_and(|t| t.metrics) {
        Some(telemetry::setup_metrics_recorder()?)
    } else {
        None
    };

    Ok(AppState {
        config,
        db,
        crypto,
        token,
        mail,
        cache,
        limiter,
        metrics,
    })
}
