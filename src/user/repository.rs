//! Handle database requests.

use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};

use crate::crypto::Hasher;
use crate::database::deadline;
use crate::error::{Result, ServerError};
use crate::user::User;

const USER_COLUMNS: &str =
    "id, username, email, password_hash, created_at, is_active";

#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
    hasher: Hasher,
    timeout: Duration,
}

impl UserRepository {
    /// Create a new [`UserRepository`].
    pub fn new(pool: PgPool, hasher: Hasher, timeout: Duration) -> Self {
        Self {
            pool,
            hasher,
            timeout,
        }
    }

    /// Insert a pending [`User`] using caller's transaction.
    ///
    /// `id` and `created_at` are written back into `user`.
    pub async fn create(
        &self,
        conn: &mut PgConnection,
        user: &mut User,
    ) -> Result<()> {
        let (id, created_at): (i64, DateTime<Utc>) = deadline(
            self.timeout,
            sqlx::query_as(
                r#"INSERT INTO users (username, email, password_hash)
                    VALUES ($1, $2, $3)
                    RETURNING id, created_at"#,
            )
            .bind(&user.username)
            .bind(&user.email)
            .bind(&user.password)
            .fetch_one(&mut *conn),
        )
        .await?;

        user.id = id;
        user.created_at = created_at;
        user.is_active = false;
        Ok(())
    }

    /// Insert user and its invitation atomically.
    ///
    /// Only the digest of `token` is persisted.
    pub async fn create_and_invite(
        &self,
        user: &mut User,
        token: &str,
        invitation_exp: Duration,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        self.insert_with_invitation(&mut tx, user, token, invitation_exp)
            .await?;
        tx.commit().await?;

        tracing::debug!(user_id = user.id, "user invited");
        Ok(())
    }

    pub(crate) async fn insert_with_invitation(
        &self,
        conn: &mut PgConnection,
        user: &mut User,
        token: &str,
        invitation_exp: Duration,
    ) -> Result<()> {
        self.create(conn, user).await?;
        self.create_invitation(conn, token, invitation_exp, user.id)
            .await
    }

    async fn create_invitation(
        &self,
        conn: &mut PgConnection,
        token: &str,
        invitation_exp: Duration,
        user_id: i64,
    ) -> Result<()> {
        let exp = chrono::Duration::from_std(invitation_exp).map_err(|err| {
            ServerError::internal("invitation expiration out of range", err)
        })?;

        deadline(
            self.timeout,
            sqlx::query(
                r#"INSERT INTO user_invitations (token_hash, user_id, expiry)
                    VALUES ($1, $2, $3)"#,
            )
            .bind(self.hasher.digest(token))
            .bind(user_id)
            .bind(Utc::now() + exp)
            .execute(&mut *conn),
        )
        .await?;

        Ok(())
    }

    /// Redeem an invitation `token`.
    ///
    /// Activates its user and consumes the invitation in one transaction.
    pub async fn activate(&self, token: &str) -> Result<User> {
        let mut tx = self.pool.begin().await?;

        let mut user = self.find_by_invitation(&mut tx, token).await?;
        user.is_active = true;
        self.update(&mut tx, &user).await?;
        self.delete_invitations(&mut tx, user.id).await?;

        tx.commit().await?;

        tracing::info!(user_id = user.id, "user activated");
        Ok(user)
    }

    async fn find_by_invitation(
        &self,
        conn: &mut PgConnection,
        token: &str,
    ) -> Result<User> {
        deadline(
            self.timeout,
            sqlx::query_as::<_, User>(
                r#"SELECT u.id, u.username, u.email, u.password_hash, u.created_at, u.is_active
                    FROM users u
                    JOIN user_invitations ui ON u.id = ui.user_id
                    WHERE ui.token_hash = $1 AND ui.expiry > NOW()
                    FOR UPDATE OF u"#,
            )
            .bind(self.hasher.digest(token))
            .fetch_optional(&mut *conn),
        )
        .await?
        .ok_or(ServerError::InvalidOrExpiredToken)
    }

    async fn update(&self, conn: &mut PgConnection, user: &User) -> Result<()> {
        deadline(
            self.timeout,
            sqlx::query(
                r#"UPDATE users SET username = $1, email = $2, is_active = $3
                    WHERE id = $4"#,
            )
            .bind(&user.username)
            .bind(&user.email)
            .bind(user.is_active)
            .bind(user.id)
            .execute(&mut *conn),
        )
        .await?;

        Ok(())
    }

    async fn delete_invitations(
        &self,
        conn: &mut PgConnection,
        user_id: i64,
    ) -> Result<()> {
        deadline(
            self.timeout,
            sqlx::query(r#"DELETE FROM user_invitations WHERE user_id = $1"#)
                .bind(user_id)
                .execute(&mut *conn),
        )
        .await?;

        Ok(())
    }

    /// Delete user and any pending invitation.
    ///
    /// Missing invitation is not an error.
    pub async fn delete_by_id(&self, id: i64) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let result = deadline(
            self.timeout,
            sqlx::query(r#"DELETE FROM users WHERE id = $1"#)
                .bind(id)
                .execute(&mut *tx),
        )
        .await?;
        self.delete_invitations(&mut tx, id).await?;

        tx.commit().await?;

        tracing::debug!(
            user_id = id,
            deleted = result.rows_affected(),
            "user deleted"
        );
        Ok(())
    }

    /// Find an active user using `id` field.
    pub async fn find_by_id(&self, id: i64) -> Result<User> {
        let query = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1 AND is_active = TRUE"
        );

        deadline(
            self.timeout,
            sqlx::query_as::<_, User>(&query)
                .bind(id)
                .fetch_optional(&self.pool),
        )
        .await?
        .ok_or(ServerError::NotFound)
    }

    /// Find an active user using `email` field.
    pub async fn find_by_email(&self, email: &str) -> Result<User> {
        let query = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1 AND is_active = TRUE"
        );

        deadline(
            self.timeout,
            sqlx::query_as::<_, User>(&query)
                .bind(email)
                .fetch_optional(&self.pool),
        )
        .await?
        .ok_or(ServerError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::user::Password;

    const EXP: Duration = Duration::from_secs(60 * 60);

    fn repository(pool: PgPool) -> UserRepository {
        UserRepository::new(pool, Hasher::new("pepper"), Duration::from_secs(5))
    }

    fn pending(username: &str) -> User {
        User {
            username: username.into(),
            email: format!("{username}@example.com"),
            password: Password::default(),
            ..Default::default()
        }
    }

    async fn count(pool: &PgPool, table: &str) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[sqlx::test]
    async fn test_pending_user_is_hidden(pool: PgPool) {
        let repo = repository(pool.clone());
        let mut user = pending("dave");

        repo.create_and_invite(&mut user, "token", EXP).await.unwrap();
        assert!(user.id > 0);
        assert!(!user.is_active);

        assert!(matches!(
            repo.find_by_id(user.id).await,
            Err(ServerError::NotFound)
        ));
        assert!(matches!(
            repo.find_by_email("dave@example.com").await,
            Err(ServerError::NotFound)
        ));
    }

    #[sqlx::test]
    async fn test_token_is_stored_hashed(pool: PgPool) {
        let repo = repository(pool.clone());
        let mut user = pending("dave");

        repo.create_and_invite(&mut user, "plain-token", EXP)
            .await
            .unwrap();

        let stored: String = sqlx::query_scalar(
            "SELECT token_hash FROM user_invitations WHERE user_id = $1",
        )
        .bind(user.id)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_ne!(stored, "plain-token");
        assert_eq!(stored, Hasher::new("pepper").digest("plain-token"));
    }

    #[sqlx::test]
    async fn test_uncommitted_invite_leaves_nothing(pool: PgPool) {
        let repo = repository(pool.clone());
        let mut user = pending("dave");

        let mut tx = pool.begin().await.unwrap();
        repo.insert_with_invitation(&mut tx, &mut user, "token", EXP)
            .await
            .unwrap();
        // crash before commit.
        drop(tx);

        assert_eq!(count(&pool, "users").await, 0);
        assert_eq!(count(&pool, "user_invitations").await, 0);
    }

    #[sqlx::test]
    async fn test_failed_invite_rolls_back_user(pool: PgPool) {
        let repo = repository(pool.clone());

        let mut first = pending("dave");
        repo.create_and_invite(&mut first, "token", EXP).await.unwrap();

        // Same username, must fail on insert and leave no row behind.
        let mut second = pending("dave");
        second.email = "other@example.com".into();
        assert!(repo.create_and_invite(&mut second, "token2", EXP).await.is_err());

        assert_eq!(count(&pool, "users").await, 1);
        assert_eq!(count(&pool, "user_invitations").await, 1);
    }

    #[sqlx::test]
    async fn test_activate(pool: PgPool) {
        let repo = repository(pool.clone());
        let mut user = pending("dave");
        repo.create_and_invite(&mut user, "token", EXP).await.unwrap();

        let activated = repo.activate("token").await.unwrap();
        assert_eq!(activated.id, user.id);
        assert!(activated.is_active);

        assert_eq!(repo.find_by_id(user.id).await.unwrap().username, "dave");
        assert_eq!(
            repo.find_by_email("dave@example.com").await.unwrap().id,
            user.id
        );
        assert_eq!(count(&pool, "user_invitations").await, 0);

        // single use.
        assert!(matches!(
            repo.activate("token").await,
            Err(ServerError::InvalidOrExpiredToken)
        ));
    }

    #[sqlx::test]
    async fn test_activate_expired(pool: PgPool) {
        let repo = repository(pool.clone());
        let mut user = pending("dave");
        repo.create_and_invite(&mut user, "token", EXP).await.unwrap();

        sqlx::query(
            "UPDATE user_invitations SET expiry = NOW() - INTERVAL '1 hour'",
        )
        .execute(&pool)
        .await
        .unwrap();

        assert!(matches!(
            repo.activate("token").await,
            Err(ServerError::InvalidOrExpiredToken)
        ));
        // expired invitation is kept, user stays pending.
        assert_eq!(count(&pool, "user_invitations").await, 1);
        assert!(repo.find_by_id(user.id).await.is_err());
    }

    #[sqlx::test]
    async fn test_activate_unknown_token(pool: PgPool) {
        let repo = repository(pool);

        assert!(matches!(
            repo.activate("nope").await,
            Err(ServerError::InvalidOrExpiredToken)
        ));
    }

    #[sqlx::test]
    async fn test_delete_removes_invitation(pool: PgPool) {
        let repo = repository(pool.clone());
        let mut user = pending("dave");
        repo.create_and_invite(&mut user, "token", EXP).await.unwrap();

        repo.delete_by_id(user.id).await.unwrap();

        assert_eq!(count(&pool, "users").await, 0);
        assert_eq!(count(&pool, "user_invitations").await, 0);
    }

    #[sqlx::test(fixtures("../../fixtures/users.sql"))]
    async fn test_delete_without_invitation(pool: PgPool) {
        let repo = repository(pool.clone());

        repo.delete_by_id(1).await.unwrap();
        assert!(matches!(repo.find_by_id(1).await, Err(ServerError::NotFound)));

        // Already gone.
        repo.delete_by_id(1).await.unwrap();
    }

    #[sqlx::test(fixtures("../../fixtures/users.sql"))]
    async fn test_find_active(pool: PgPool) {
        let repo = repository(pool);

        let alice = repo.find_by_id(1).await.unwrap();
        assert_eq!(alice.username, "alice");
        assert!(alice.is_active);
        assert!(alice.password.as_str().starts_with("$argon2id$"));

        let bob = repo.find_by_email("bob@example.com").await.unwrap();
        assert_eq!(bob.id, 2);

        // carol is pending.
        assert!(matches!(repo.find_by_id(3).await, Err(ServerError::NotFound)));
        assert!(matches!(repo.find_by_id(404).await, Err(ServerError::NotFound)));
    }
}
