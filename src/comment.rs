//! Comments attached to posts.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use validator::Validate;

use crate::database::deadline;
use crate::error::Result;

/// Comment as returned with its post.
#[derive(
    Clone, Debug, Default, PartialEq, Serialize, Deserialize, sqlx::FromRow,
)]
pub struct Comment {
    pub id: i64,
    pub post_id: i64,
    pub user_id: i64,
    pub content: String,
    pub created_at: DateTime<Utc>,
    /// Author name, joined from `users`.
    pub username: String,
}

/// Body of `POST /v1/posts/{id}/comments`.
#[derive(Debug, Deserialize, Validate)]
pub struct Body {
    #[validate(
        length(min = 1, max = 1000, message = "Content must be between 1 and 1000 characters."),
        custom(
            function = "crate::router::validate_text",
            message = "Content must not contain NUL characters."
        )
    )]
    pub content: String,
}

#[derive(Clone)]
pub struct CommentRepository {
    pool: PgPool,
    timeout: Duration,
}

impl CommentRepository {
    pub fn new(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    /// Comments of a post, newest first.
    pub async fn find_by_post_id(&self, post_id: i64) -> Result<Vec<Comment>> {
        let comments = deadline(
            self.timeout,
            sqlx::query_as::<_, Comment>(
                r#"SELECT c.id, c.post_id, c.user_id, c.content, c.created_at, u.username
                    FROM comments c
                    JOIN users u ON u.id = c.user_id
                    WHERE c.post_id = $1
                    ORDER BY c.created_at DESC, c.id DESC"#,
            )
            .bind(post_id)
            .fetch_all(&self.pool),
        )
        .await?;

        Ok(comments)
    }

    /// Insert `comment`, writing back `id` and `created_at`.
    pub async fn create(&self, comment: &mut Comment) -> Result<()> {
        let (id, created_at): (i64, DateTime<Utc>) = deadline(
            self.timeout,
            sqlx::query_as(
                r#"INSERT INTO comments (post_id, user_id, content)
                    VALUES ($1, $2, $3)
                    RETURNING id, created_at"#,
            )
            .bind(comment.post_id)
            .bind(comment.user_id)
            .bind(&comment.content)
            .fetch_one(&self.pool),
        )
        .await?;

        comment.id = id;
        comment.created_at = created_at;
        Ok(())
    }
}
