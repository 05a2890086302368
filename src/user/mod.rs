mod repository;

pub use repository::*;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::crypto::{CryptoError, PasswordManager};
use crate::error::{Result, ServerError};

/// User as saved on database.
#[derive(
    Clone, Debug, Default, PartialEq, Serialize, Deserialize, sqlx::FromRow,
)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip)]
    #[sqlx(rename = "password_hash")]
    pub password: Password,
    pub created_at: DateTime<Utc>,
    pub is_active: bool,
}

/// Argon2id PHC string of a user secret.
///
/// The plaintext never leaves [`Password::set`].
#[derive(Clone, Default, PartialEq, sqlx::Type)]
#[sqlx(transparent)]
pub struct Password(String);

impl Password {
    /// Hash `plaintext` with a fresh salt.
    pub fn set(
        manager: &PasswordManager,
        plaintext: impl AsRef<[u8]>,
    ) -> std::result::Result<Self, CryptoError> {
        manager.hash_password(plaintext).map(Self)
    }

    /// Check `candidate` against the stored hash.
    pub fn compare(
        &self,
        manager: &PasswordManager,
        candidate: impl AsRef<[u8]>,
    ) -> Result<()> {
        manager
            .verify_password(candidate, &self.0)
            .map_err(|_| ServerError::CredentialMismatch)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Password(**)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Argon2;

    fn manager() -> PasswordManager {
        PasswordManager::new(Some(Argon2 {
            memory_cost: 1024,
            iterations: 1,
            parallelism: 1,
            hash_length: 32,
        }))
        .unwrap()
    }

    #[test]
    fn test_set_then_compare() {
        let manager = manager();
        let password = Password::set(&manager, "correct horse").unwrap();

        assert!(password.compare(&manager, "correct horse").is_ok());
        assert!(matches!(
            password.compare(&manager, "battery staple"),
            Err(ServerError::CredentialMismatch)
        ));
    }

    #[test]
    fn test_password_is_hidden() {
        let user = User {
            username: "alice".into(),
            password: Password::set(&manager(), "correct horse").unwrap(),
            ..Default::default()
        };

        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password").is_none());
        assert!(!format!("{user:?}").contains("argon2"));
    }
}
