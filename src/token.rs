//! Manage json web tokens.

use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode,
    get_current_timestamp,
};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ServerError};

/// Seconds.
pub const DEFAULT_EXPIRATION: u64 = 60 * 60 * 24 * 3; // 3 days.

/// Pieces of information asserted on a JWT.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Recipients that the JWT is intended for.
    pub aud: String,
    /// Identifies the expiration time on or after which the JWT must not be
    /// accepted for processing.
    pub exp: u64,
    /// Identifies the time at which the JWT was issued.
    pub iat: u64,
    /// Identifies the time before which the JWT must not be accepted.
    pub nbf: u64,
    /// Identifies the organization that issued the JWT.
    pub iss: String,
    /// User ID.
    pub sub: String,
}

impl Claims {
    /// User ID carried by `sub`.
    pub fn user_id(&self) -> Result<i64> {
        self.sub.parse().map_err(|_| ServerError::Unauthorized)
    }
}

/// Manage JWT tokens.
#[derive(Clone)]
pub struct TokenManager {
    algorithm: Algorithm,
    decoding_key: DecodingKey,
    encoding_key: EncodingKey,
    issuer: String,
    audience: String,
    expiration: u64,
}

impl TokenManager {
    /// Create a new [`TokenManager`] signing with HMAC `secret`.
    pub fn new(
        issuer: &str,
        audience: &str,
        secret: &[u8],
        expiration: u64,
    ) -> Self {
        Self {
            algorithm: Algorithm::HS256,
            decoding_key: DecodingKey::from_secret(secret),
            encoding_key: EncodingKey::from_secret(secret),
            issuer: issuer.to_owned(),
            audience: audience.to_owned(),
            expiration,
        }
    }

    /// Token lifetime, in seconds.
    pub fn expiration(&self) -> u64 {
        self.expiration
    }

    /// Create a new [`jsonwebtoken`] for `user_id`.
    pub fn create(&self, user_id: i64) -> Result<String> {
        let time = get_current_timestamp();
        let claims = Claims {
            aud: self.audience.clone(),
            exp: time + self.expiration,
            iat: time,
            nbf: time,
            iss: self.issuer.clone(),
            sub: user_id.to_string(),
        };

        Ok(encode(&Header::new(self.algorithm), &claims, &self.encoding_key)?)
    }

    /// Decode and check a token.
    pub fn decode(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::new(self.algorithm);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        validation.validate_nbf = true;

        Ok(decode::<Claims>(token, &self.decoding_key, &validation)?.claims)
    }
}
