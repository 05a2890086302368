//! Partial update guarded by the post version.

use axum::extract::{Path, State};
use axum::{Extension, Json};

use crate::AppState;
use crate::error::{Result, ServerError};
use crate::post::{Post, Update};
use crate::router::Valid;
use crate::user::User;

pub async fn handler(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(post_id): Path<i64>,
    Valid(body): Valid<Update>,
) -> Result<Json<Post>> {
    let mut post = super::owned_post(&state, post_id, &user).await?;

    let expected_version = body.version;
    body.apply(&mut post);

    if let Err(err) = state.posts().update(&mut post, expected_version).await {
        if matches!(err, ServerError::EditConflict) {
            metrics::counter!("post_edit_conflicts_total").increment(1);
        }
        return Err(err);
    }

    Ok(Json(post))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use http_body_util::BodyExt;
    use serde_json::json;
    use sqlx::PgPool;

    use crate::post::Post;
    use crate::*;

    #[sqlx::test(fixtures(
        "../../../fixtures/users.sql",
        "../../../fixtures/posts.sql"
    ))]
    async fn test_update_post_handler(pool: PgPool) {
        let state = router::state(pool);
        let app = app(state.clone());
        let token = state.token.create(2).unwrap();

        let response = make_request(
            Some(token.clone()),
            app.clone(),
            Method::PATCH,
            "/v1/posts/6",
            json!({ "content": "Rust is still fun.", "version": 3 }).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let post: Post = serde_json::from_slice(&body).unwrap();
        assert_eq!(post.version, 4);
        assert_eq!(post.title, "Bob writes");
        assert_eq!(post.content, "Rust is still fun.");

        // replaying the same version conflicts.
        let response = make_request(
            Some(token),
            app,
            Method::PATCH,
            "/v1/posts/6",
            json!({ "title": "Again", "version": 3 }).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(state.posts().find_by_id(6).await.unwrap().title, "Bob writes");
    }

    #[sqlx::test(fixtures(
        "../../../fixtures/users.sql",
        "../../../fixtures/posts.sql"
    ))]
    async fn test_update_someone_else_post(pool: PgPool) {
        let state = router::state(pool);
        let app = app(state.clone());

        let response = make_request(
            Some(state.token.create(1).unwrap()),
            app,
            Method::PATCH,
            "/v1/posts/6",
            json!({ "title": "Mine now", "version": 3 }).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[sqlx::test(fixtures(
        "../../../fixtures/users.sql",
        "../../../fixtures/posts.sql"
    ))]
    async fn test_update_missing_post(pool: PgPool) {
        let state = router::state(pool);
        let app = app(state.clone());

        let response = make_request(
            Some(state.token.create(1).unwrap()),
            app,
            Method::PATCH,
            "/v1/posts/404",
            json!({ "title": "Ghost", "version": 0 }).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[sqlx::test(fixtures(
        "../../../fixtures/users.sql",
        "../../../fixtures/posts.sql"
    ))]
    async fn test_update_post_with_nul(pool: PgPool) {
        let state = router::state(pool);
        let app = app(state.clone());

        let response = make_request(
            Some(state.token.create(2).unwrap()),
            app,
            Method::PATCH,
            "/v1/posts/6",
            json!({ "tags": ["rust", "a\u{0}b"], "version": 3 }).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(state.posts().find_by_id(6).await.unwrap().version, 3);
    }
}
