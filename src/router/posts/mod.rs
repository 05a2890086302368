//! Posts-related HTTP API. Authorization required everywhere.
mod comment;
mod create;
mod delete;
mod get;
mod update;

use axum::routing::{get, post};
use axum::{Router, middleware};

use crate::AppState;
use crate::error::{Result, ServerError};
use crate::post::Post;
use crate::user::User;

/// Load a post `user` is allowed to modify.
async fn owned_post(state: &AppState, post_id: i64, user: &User) -> Result<Post> {
    let post = state.posts().find_by_id(post_id).await?;

    if post.user_id != user.id {
        tracing::debug!(post_id, user_id = user.id, "post belongs to someone else");
        return Err(ServerError::Forbidden);
    }

    Ok(post)
}

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        // `POST /posts` goes to `create`.
        .route("/", post(create::handler))
        // `GET`, `PATCH` and `DELETE /posts/:ID`.
        .route(
            "/{post_id}",
            get(get::handler)
                .patch(update::handler)
                .delete(delete::handler),
        )
        // `POST /posts/:ID/comments` goes to `comment`.
        .route("/{post_id}/comments", post(comment::handler))
        .route_layer(middleware::from_fn_with_state(state, super::auth))
}
