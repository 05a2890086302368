use axum::Extension;
use axum::extract::{Path, State};
use axum::http::StatusCode;

use crate::AppState;
use crate::error::Result;
use crate::user::User;

pub async fn handler(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(post_id): Path<i64>,
) -> Result<StatusCode> {
    let post = super::owned_post(&state, post_id, &user).await?;
    state.posts().delete_by_id(post.id).await?;

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use sqlx::PgPool;

    use crate::*;

    #[sqlx::test(fixtures(
        "../../../fixtures/users.sql",
        "../../../fixtures/posts.sql"
    ))]
    async fn test_delete_post_handler(pool: PgPool) {
        let state = router::state(pool);
        let app = app(state.clone());
        let alice = state.token.create(1).unwrap();

        // bob cannot delete alice's post.
        let response = make_request(
            Some(state.token.create(2).unwrap()),
            app.clone(),
            Method::DELETE,
            "/v1/posts/1",
            String::default(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = make_request(
            Some(alice.clone()),
            app.clone(),
            Method::DELETE,
            "/v1/posts/1",
            String::default(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = make_request(
            Some(alice),
            app,
            Method::GET,
            "/v1/posts/1",
            String::default(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
