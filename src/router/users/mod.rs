//! Users-related HTTP API.
mod activate;
mod feed;
mod get;

use axum::routing::{get, put};
use axum::{Router, middleware};

use crate::AppState;

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        // `GET /users/feed` goes to `feed`. Authorization required.
        .route("/feed", get(feed::handler))
        // `GET /users/:ID` goes to `get`. Authorization required.
        .route("/{user_id}", get(get::handler))
        .route_layer(middleware::from_fn_with_state(state, super::auth))
        // `PUT /users/activate/:TOKEN` goes to `activate`.
        .route("/activate/{token}", put(activate::handler))
}
