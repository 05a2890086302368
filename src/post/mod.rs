mod repository;

pub use repository::*;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::comment::Comment;

/// Post as saved on database.
#[derive(
    Clone, Debug, Default, PartialEq, Serialize, Deserialize, sqlx::FromRow,
)]
pub struct Post {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    /// Incremented by one on every update.
    pub version: i32,
    #[sqlx(skip)]
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub comments: Vec<Comment>,
}

/// Feed entry.
#[derive(Clone, Debug, PartialEq, Serialize, sqlx::FromRow)]
pub struct PostWithMetadata {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub post: Post,
    pub username: String,
    pub comments_count: i64,
}

/// Body of `POST /v1/posts`.
#[derive(Debug, Deserialize, Validate)]
pub struct Create {
    #[validate(
        length(min = 1, max = 100, message = "Title must be between 1 and 100 characters."),
        custom(
            function = "crate::router::validate_text",
            message = "Title must not contain NUL characters."
        )
    )]
    pub title: String,
    #[validate(
        length(min = 1, max = 1000, message = "Content must be between 1 and 1000 characters."),
        custom(
            function = "crate::router::validate_text",
            message = "Content must not contain NUL characters."
        )
    )]
    pub content: String,
    #[serde(default)]
    #[validate(
        length(max = 10, message = "At most 10 tags are allowed."),
        custom(
            function = "crate::router::validate_tags",
            message = "Tags must not contain NUL characters."
        )
    )]
    pub tags: Vec<String>,
}

/// Body of `PATCH /v1/posts/{id}`.
///
/// Omitted fields are left unchanged.
#[derive(Debug, Deserialize, Validate)]
pub struct Update {
    #[validate(
        length(min = 1, max = 100, message = "Title must be between 1 and 100 characters."),
        custom(
            function = "crate::router::validate_text",
            message = "Title must not contain NUL characters."
        )
    )]
    pub title: Option<String>,
    #[validate(
        length(min = 1, max = 1000, message = "Content must be between 1 and 1000 characters."),
        custom(
            function = "crate::router::validate_text",
            message = "Content must not contain NUL characters."
        )
    )]
    pub content: Option<String>,
    #[validate(
        length(max = 10, message = "At most 10 tags are allowed."),
        custom(
            function = "crate::router::validate_tags",
            message = "Tags must not contain NUL characters."
        )
    )]
    pub tags: Option<Vec<String>>,
    /// Version the client read.
    pub version: i32,
}

impl Update {
    /// Apply present fields onto `post`.
    pub fn apply(self, post: &mut Post) {
        if let Some(title) = self.title {
            post.title = title;
        }
        if let Some(content) = self.content {
            post.content = content;
        }
        if let Some(tags) = self.tags {
            post.tags = tags;
        }
    }
}
