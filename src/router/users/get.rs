use axum::Json;
use axum::extract::{Path, State};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::Result;
use crate::router::find_user;

/// Public profile.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: i64,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

pub async fn handler(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<Response>> {
    let user = find_user(&state, user_id).await?;

    Ok(Json(Response {
        id: user.id,
        username: user.username,
        created_at: user.created_at,
    }))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use http_body_util::BodyExt;
    use sqlx::PgPool;

    use super::*;
    use crate::*;

    #[sqlx::test(fixtures("../../../fixtures/users.sql"))]
    async fn test_get_user_handler(pool: PgPool) {
        let state = router::state(pool);
        let app = app(state.clone());
        let token = state.token.create(1).unwrap();

        let response = make_request(
            Some(token),
            app,
            Method::GET,
            "/v1/users/2",
            String::default(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(json.get("email").is_none());
        assert!(json.get("password").is_none());

        let body: Response = serde_json::from_value(json).unwrap();
        assert_eq!(body.id, 2);
        assert_eq!(body.username, "bob");

        // served from cache afterwards.
        assert_eq!(state.cache.get(2).await.unwrap().username, "bob");
    }

    #[sqlx::test(fixtures("../../../fixtures/users.sql"))]
    async fn test_get_unknown_or_pending(pool: PgPool) {
        let state = router::state(pool);
        let app = app(state.clone());

        for path in ["/v1/users/3", "/v1/users/404"] {
            let response = make_request(
                Some(state.token.create(1).unwrap()),
                app.clone(),
                Method::GET,
                path,
                String::default(),
            )
            .await;
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
        }
    }
}
