use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};

use crate::AppState;
use crate::error::Result;
use crate::post::{Create, Post};
use crate::router::Valid;
use crate::user::User;

pub async fn handler(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Valid(body): Valid<Create>,
) -> Result<(StatusCode, Json<Post>)> {
    let mut post = Post {
        user_id: user.id,
        title: body.title,
        content: body.content,
        tags: body.tags,
        ..Default::default()
    };
    state.posts().create(&mut post).await?;

    tracing::debug!(post_id = post.id, user_id = user.id, "post created");
    Ok((StatusCode::CREATED, Json(post)))
}
