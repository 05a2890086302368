use axum::Json;
use axum::extract::{Path, State};

use crate::AppState;
use crate::error::Result;
use crate::post::Post;

/// Post with its comments, newest first.
pub async fn handler(
    State(state): State<AppState>,
    Path(post_id): Path<i64>,
) -> Result<Json<Post>> {
    let mut post = state.posts().find_by_id(post_id).await?;
    post.comments = state.comments().find_by_post_id(post_id).await?;

    Ok(Json(post))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use http_body_util::BodyExt;
    use sqlx::PgPool;

    use crate::post::Post;
    use crate::*;

    #[sqlx::test(fixtures(
        "../../../fixtures/users.sql",
        "../../../fixtures/posts.sql"
    ))]
    async fn test_get_post_handler(pool: PgPool) {
        let state = router::state(pool);
        let app = app(state.clone());

        // any authenticated user can read.
        let response = make_request(
            Some(state.token.create(2).unwrap()),
            app.clone(),
            Method::GET,
            "/v1/posts/1",
            String::default(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let post: Post = serde_json::from_slice(&body).unwrap();
        assert_eq!(post.title, "Hello world");
        assert_eq!(post.comments.len(), 2);
        assert_eq!(post.comments[0].username, "alice");

        let response = make_request(
            Some(state.token.create(2).unwrap()),
            app,
            Method::GET,
            "/v1/posts/404",
            String::default(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
