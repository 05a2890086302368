//! Error handler for social.

use axum::extract::rejection::JsonRejection;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use sqlx::Error as SQLxError;
use thiserror::Error;
use validator::ValidationErrors;

pub type Result<T> = std::result::Result<T, ServerError>;

/// Enum representing server-side errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("validation error occurred")]
    Validation(#[from] ValidationErrors),

    #[error(transparent)]
    Axum(#[from] JsonRejection),

    #[error("SQL request failed: {0}")]
    Sql(#[from] SQLxError),

    #[error("query exceeded its deadline")]
    Timeout,

    #[error("resource not found")]
    NotFound,

    #[error("resource was modified concurrently")]
    EditConflict,

    #[error("invitation token is invalid or expired")]
    InvalidOrExpiredToken,

    #[error("invalid credentials")]
    CredentialMismatch,

    #[error("invalid 'Authorization' header")]
    Unauthorized,

    #[error("you are not allowed to access this resource")]
    Forbidden,

    #[error("too many requests, retry in {0:?}")]
    TooManyRequests(std::time::Duration),

    #[error(transparent)]
    Crypto(#[from] crate::crypto::CryptoError),

    #[error("json web token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error("mail delivery failed: {0}")]
    Mail(String),

    #[error("internal server error, {details}")]
    Internal {
        details: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl ServerError {
    /// Build an [`ServerError::Internal`] from any error.
    pub fn internal<E>(details: impl ToString, err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Internal {
            details: details.to_string(),
            source: Some(Box::new(err)),
        }
    }
}

/// Structure for detailed error responses.
#[derive(Debug, Serialize)]
pub struct ResponseError {
    r#type: Option<String>,
    title: String,
    status: u16,
    detail: String,
    instance: Option<String>,
    errors: Option<Vec<FieldError>>,
}

impl ResponseError {
    /// Update error status code.
    pub fn status(mut self, code: StatusCode) -> Self {
        self.status = code.as_u16();
        self
    }

    /// Update `title` field.
    pub fn title(mut self, title: &str) -> Self {
        self.title = title.into();
        self
    }

    /// Add detailed error.
    pub fn details(mut self, description: &str) -> Self {
        self.detail = description.into();
        self
    }

    /// Automatically add errors field.
    pub fn errors(mut self, errors: &ValidationErrors) -> Self {
        self.errors = Some(parse_validation_errors(errors));
        self
    }

    /// Transform [`ResponseError`] into axum [`Response`].
    pub fn into_response(
        self,
    ) -> std::result::Result<Response, axum::http::Error> {
        if let Ok(body) = serde_json::to_string(&self) {
            Response::builder()
                .status(self.status)
                .header(header::CONTENT_TYPE, "application/json")
                .body(body.into())
        } else {
            Ok(internal_server_error())
        }
    }
}

impl Default for ResponseError {
    fn default() -> Self {
        Self {
            r#type: None,
            title: "Internal server error.".to_owned(),
            status: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
            detail: String::default(),
            instance: None,
            errors: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct FieldError {
    field: String,
    message: String,
}

fn parse_validation_errors(errors: &ValidationErrors) -> Vec<FieldError> {
    errors
        .field_errors()
        .iter()
        .flat_map(|(field, issues)| {
            issues.iter().map(move |issue| FieldError {
                field: field.to_string(),
                message: issue
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| issue.code.to_string()),
            })
        })
        .collect()
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let response = ResponseError::default()
            .title("There were validation errors with your request.")
            .details(&self.to_string())
            .status(StatusCode::BAD_REQUEST);

        let response = match &self {
            ServerError::Validation(validation_errors) => {
                response.errors(validation_errors)
            },

            ServerError::Sql(err)
                if err
                    .as_database_error()
                    .is_some_and(|e| e.is_unique_violation()) =>
            {
                response
                    .title("Resource already exists.")
                    .details("Username or email is already taken.")
            },

            ServerError::NotFound => response
                .title("Resource not found.")
                .status(StatusCode::NOT_FOUND),

            ServerError::EditConflict => response
                .title("Edit conflict.")
                .details("Resource was modified by someone else, fetch it again then retry.")
                .status(StatusCode::CONFLICT),

            ServerError::InvalidOrExpiredToken => {
                response.title("Invalid activation token.")
            },

            ServerError::CredentialMismatch => response
                .title("Invalid credentials.")
                .details("Email or password is wrong.")
                .status(StatusCode::UNAUTHORIZED),

            ServerError::Unauthorized => response
                .title("Missing or invalid 'Authorization' header.")
                .status(StatusCode::UNAUTHORIZED),

            ServerError::Forbidden => {
                response.title("Forbidden.").status(StatusCode::FORBIDDEN)
            },

            ServerError::TooManyRequests(_) => response
                .title("Too many requests.")
                .details("Rate limit exceeded, slow down.")
                .status(StatusCode::TOO_MANY_REQUESTS),

            ServerError::Sql(_)
            | ServerError::Timeout
            | ServerError::Crypto(_)
            | ServerError::Token(_)
            | ServerError::Mail(_) => {
                tracing::error!(error = %self, "server returned 500 status");

                ResponseError::default()
            },

            ServerError::Internal { details, source } => {
                tracing::error!(err = ?source, %details, "server returned 500 status");

                ResponseError::default()
            },

            ServerError::Axum(_) => response,
        };

        let mut response = response
            .into_response()
            .unwrap_or_else(|_| internal_server_error());

        if let ServerError::TooManyRequests(retry_after) = self {
            // whole seconds, rounded up.
            let seconds = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(seconds.max(1)));
        }

        response
    }
}

fn internal_server_error() -> Response {
    Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .header(header::CONTENT_TYPE, "application/json")
        .body(
            serde_json::json!({
                "type": null,
                "title": "Internal server error.",
                "status": StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
                "detail": null,
                "instance": null,
                "errors": null,
            })
            .to_string()
            .into(),
        )
        .unwrap_or_else(|_| Response::new("Internal server error".into()))
}
