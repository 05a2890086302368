use axum::extract::State;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;
use crate::crypto::random_token;
use crate::error::Result;
use crate::router::Valid;
use crate::user::{Password, User};

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct Body {
    #[validate(
        length(min = 3, max = 30, message = "Username must be between 3 and 30 characters."),
        custom(
            function = "crate::router::validate_text",
            message = "Username must not contain NUL characters."
        )
    )]
    pub username: String,
    #[validate(email(message = "Email must be formatted."))]
    pub email: String,
    #[validate(length(
        min = 8,
        max = 72,
        message = "Password must contain between 8 and 72 characters."
    ))]
    pub password: String,
}

/// Handler to register a pending user and mail its activation link.
pub async fn handler(
    State(state): State<AppState>,
    Valid(body): Valid<Body>,
) -> Result<StatusCode> {
    let mut user = User {
        username: body.username,
        email: body.email.to_lowercase(),
        password: Password::set(&state.crypto.pwd, &body.password)?,
        ..Default::default()
    };
    let token = random_token();

    let users = state.users();
    users
        .create_and_invite(&mut user, &token, state.config.invitation_expiration())
        .await?;

    let activation_url = format!("{}/confirm/{token}", state.config.frontend_url);
    if let Err(err) = state
        .mail
        .send_invitation(&user.username, &user.email, &activation_url)
        .await
    {
        tracing::error!(user_id = user.id, error = %err, "invitation not sent, removing user");

        if let Err(err) = users.delete_by_id(user.id).await {
            tracing::error!(user_id = user.id, error = %err, "cannot remove user after mail failure");
        }
        state.cache.remove(user.id).await;

        return Err(err);
    }

    metrics::counter!("users_registered_total").increment(1);
    tracing::info!(user_id = user.id, "user registered");

    Ok(StatusCode::CREATED)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::*;
    use serde_json::json;
    use sqlx::PgPool;

    fn body(username: &str) -> Body {
        Body {
            username: username.into(),
            email: format!("{username}@Example.com"),
            password: "correct horse battery".into(),
        }
    }

    async fn users(pool: &PgPool) -> Vec<(String, String, bool)> {
        sqlx::query_as("SELECT username, email, is_active FROM users")
            .fetch_all(pool)
            .await
            .unwrap()
    }

    #[sqlx::test]
    async fn test_create_handler(pool: PgPool) {
        let state = router::state(pool.clone());
        let app = app(state);

        let response = make_request(
            None,
            app,
            Method::POST,
            "/v1/authentication/user",
            json!(body("dave")).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let users = users(&pool).await;
        assert_eq!(
            users,
            vec![("dave".into(), "dave@example.com".into(), false)]
        );

        let invitations: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM user_invitations")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(invitations, 1);

        let hash: String = sqlx::query_scalar("SELECT password_hash FROM users")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert!(hash.starts_with("$argon2id$"));
    }

    #[sqlx::test]
    async fn test_create_invalid_body(pool: PgPool) {
        let app = app(router::state(pool));

        let mut short = body("dave");
        short.password = "short".into();
        let response = make_request(
            None,
            app.clone(),
            Method::POST,
            "/v1/authentication/user",
            json!(short).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = make_request(
            None,
            app.clone(),
            Method::POST,
            "/v1/authentication/user",
            json!(body("da")).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let mut nul = body("dave");
        nul.username = "da\u{0}ve".into();
        let response = make_request(
            None,
            app,
            Method::POST,
            "/v1/authentication/user",
            json!(nul).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[sqlx::test(fixtures("../../fixtures/users.sql"))]
    async fn test_create_duplicate(pool: PgPool) {
        let app = app(router::state(pool));

        let response = make_request(
            None,
            app,
            Method::POST,
            "/v1/authentication/user",
            json!(body("alice")).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[sqlx::test]
    async fn test_mail_failure_removes_user(pool: PgPool) {
        let mut state = router::state(pool.clone());
        state.mail = crate::mail::tests::unreachable(0);
        let app = app(state);

        let response = make_request(
            None,
            app,
            Method::POST,
            "/v1/authentication/user",
            json!(body("dave")).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        assert!(users(&pool).await.is_empty());
        let invitations: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM user_invitations")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(invitations, 0);
    }
}
