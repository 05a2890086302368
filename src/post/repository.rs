//! Handle database requests.

use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::database::deadline;
use crate::error::{Result, ServerError};
use crate::feed::FeedQuery;
use crate::post::{Post, PostWithMetadata};

const POST_COLUMNS: &str =
    "id, user_id, title, content, tags, created_at, version";

#[derive(Clone)]
pub struct PostRepository {
    pool: PgPool,
    timeout: Duration,
}

impl PostRepository {
    /// Create a new [`PostRepository`].
    pub fn new(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    /// Insert `post`; `id`, `created_at` and `version` are written back.
    pub async fn create(&self, post: &mut Post) -> Result<()> {
        let (id, created_at, version): (i64, DateTime<Utc>, i32) = deadline(
            self.timeout,
            sqlx::query_as(
                r#"INSERT INTO posts (user_id, title, content, tags)
                    VALUES ($1, $2, $3, $4)
                    RETURNING id, created_at, version"#,
            )
            .bind(post.user_id)
            .bind(&post.title)
            .bind(&post.content)
            .bind(&post.tags)
            .fetch_one(&self.pool),
        )
        .await?;

        post.id = id;
        post.created_at = created_at;
        post.version = version;
        Ok(())
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Post> {
        let query = format!("SELECT {POST_COLUMNS} FROM posts WHERE id = $1");

        deadline(
            self.timeout,
            sqlx::query_as::<_, Post>(&query)
                .bind(id)
                .fetch_optional(&self.pool),
        )
        .await?
        .ok_or(ServerError::NotFound)
    }

    /// Delete a post and, by cascade, its comments.
    pub async fn delete_by_id(&self, id: i64) -> Result<()> {
        let result = deadline(
            self.timeout,
            sqlx::query(r#"DELETE FROM posts WHERE id = $1"#)
                .bind(id)
                .execute(&self.pool),
        )
        .await?;

        if result.rows_affected() == 0 {
            return Err(ServerError::NotFound);
        }

        Ok(())
    }

    /// Save `post` only if its stored version is still `expected_version`.
    ///
    /// On success `post.version` holds the new version. A concurrent writer,
    /// or a deleted row, yields [`ServerError::EditConflict`].
    pub async fn update(
        &self,
        post: &mut Post,
        expected_version: i32,
    ) -> Result<()> {
        let version: Option<i32> = deadline(
            self.timeout,
            sqlx::query_scalar(
                r#"UPDATE posts
                    SET title = $1, content = $2, tags = $3, version = version + 1
                    WHERE id = $4 AND version = $5
                    RETURNING version"#,
            )
            .bind(&post.title)
            .bind(&post.content)
            .bind(&post.tags)
            .bind(post.id)
            .bind(expected_version)
            .fetch_optional(&self.pool),
        )
        .await?;

        match version {
            Some(version) => {
                post.version = version;
                Ok(())
            },
            None => {
                tracing::debug!(
                    post_id = post.id,
                    expected_version,
                    "post update conflict"
                );
                Err(ServerError::EditConflict)
            },
        }
    }

    /// Posts of `user_id` matching `query`, with author name and comment
    /// count.
    pub async fn user_feed(
        &self,
        user_id: i64,
        query: &FeedQuery,
    ) -> Result<Vec<PostWithMetadata>> {
        let mut builder = feed_query(user_id, query);

        let posts = deadline(
            self.timeout,
            builder
                .build_query_as::<PostWithMetadata>()
                .fetch_all(&self.pool),
        )
        .await?;

        Ok(posts)
    }
}

fn feed_query(user_id: i64, query: &FeedQuery) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new(
        r#"SELECT p.id, p.user_id, p.title, p.content, p.tags, p.created_at, p.version,
            u.username, COUNT(c.id) AS comments_count
            FROM posts p
            JOIN users u ON u.id = p.user_id
            LEFT JOIN comments c ON c.post_id = p.id
            WHERE p.user_id = "#,
    );
    builder.push_bind(user_id);

    if !query.search.is_empty() {
        let pattern = format!("%{}%", escape_like(&query.search));
        builder
            .push(" AND (p.title ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR p.content ILIKE ")
            .push_bind(pattern)
            .push(")");
    }

    if !query.tags.is_empty() {
        builder.push(" AND p.tags @> ").push_bind(query.tags.clone());
    }

    if let Some(since) = query.since {
        builder
            .push(" AND p.created_at >= ")
            .push_bind(start_of_day(since));
    }

    // `until` is inclusive of the whole day.
    if let Some(until) = query.until {
        match until.succ_opt() {
            Some(next) => builder
                .push(" AND p.created_at < ")
                .push_bind(start_of_day(next)),
            None => builder
                .push(" AND (p.created_at AT TIME ZONE 'UTC')::date <= ")
                .push_bind(until),
        };
    }

    let order = query.order().as_sql();
    builder
        .push(" GROUP BY p.id, u.username")
        .push(format!(" ORDER BY p.created_at {order}, p.id {order}"))
        .push(" LIMIT ")
        .push_bind(query.limit)
        .push(" OFFSET ")
        .push_bind(query.offset);

    builder
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

/// Escape `LIKE` wildcards so `search` matches literally.
fn escape_like(search: &str) -> String {
    let mut escaped = String::with_capacity(search.len());
    for c in search.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
