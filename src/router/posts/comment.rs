use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};

use crate::AppState;
use crate::comment::{Body, Comment};
use crate::error::Result;
use crate::router::Valid;
use crate::user::User;

/// Comment a post.
pub async fn handler(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(post_id): Path<i64>,
    Valid(body): Valid<Body>,
) -> Result<(StatusCode, Json<Comment>)> {
    // 404 rather than a foreign key violation.
    let post = state.posts().find_by_id(post_id).await?;

    let mut comment = Comment {
        post_id: post.id,
        user_id: user.id,
        content: body.content,
        username: user.username,
        ..Default::default()
    };
    state.comments().create(&mut comment).await?;

    Ok((StatusCode::CREATED, Json(comment)))
}
