//! Error handler for activo.

use std::collections::BTreeMap;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;
use validator::ValidationErrors;

use crate::messages::Field;

pub type Result<T> = std::result::Result<T, ServerError>;

/// Enum representing server-side errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("validation error occurred")]
    Validation(#[from] ValidationErrors),

    #[error(transparent)]
    Axum(#[from] JsonRejection),

    #[error("{0}")]
    InvalidInput(String),

    #[error("value of '{0}' already exists")]
    Duplicate(Field),

    #[error("Authentication credentials were not provided.")]
    Unauthenticated,

    #[error("Given token not valid for any token type")]
    InvalidToken,

    #[error("Token is invalid or expired")]
    InvalidRefreshToken,

    #[error("User not found")]
    UserNotFound,

    #[error("User is inactive")]
    InactiveUser,

    #[error("No active account found with the given credentials")]
    InvalidCredentials,

    #[error("You do not have permission to perform this action.")]
    Forbidden,

    #[error("Not found.")]
    NotFound,

    #[error("SQL request failed: {0}")]
    Sql(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error(transparent)]
    Crypto(#[from] crate::crypto::CryptoError),

    #[error("token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error("amqp error: {0}")]
    Lapin(#[from] lapin::Error),

    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    #[error("invalid amqp scheme")]
    InvalidScheme,

    #[error("template error: {0}")]
    Template(#[from] handlebars::RenderError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal server error, {details}")]
    Internal {
        details: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl ServerError {
    /// Status code sent to the client.
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::Validation(_)
            | ServerError::InvalidInput(_)
            | ServerError::Duplicate(_) => StatusCode::BAD_REQUEST,
            ServerError::Axum(rejection) => rejection.status(),
            ServerError::Unauthenticated
            | ServerError::InvalidToken
            | ServerError::InvalidRefreshToken
            | ServerError::UserNotFound
            | ServerError::InactiveUser
            | ServerError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ServerError::Forbidden => StatusCode::FORBIDDEN,
            ServerError::NotFound => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Body used for every non-validation error.
#[derive(Debug, Serialize)]
pub struct Detail {
    pub detail: String,
}

/// Render validation errors as `{field: [message, ...]}`.
pub fn field_messages(errors: &ValidationErrors) -> BTreeMap<String, Vec<String>> {
    errors
        .field_errors()
        .iter()
        .map(|(field, issues)| {
            let messages = issues
                .iter()
                .map(|issue| match &issue.message {
                    Some(message) => message.to_string(),
                    None => issue.code.to_string(),
                })
                .collect();
            (field.to_string(), messages)
        })
        .collect()
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();

        match self {
            ServerError::Validation(errors) => {
                (status, Json(field_messages(&errors))).into_response()
            },
            ServerError::Duplicate(field) => {
                let mut body = BTreeMap::new();
                body.insert(field.to_string(), vec![message]);
                (status, Json(body)).into_response()
            },
            ServerError::Axum(rejection) => (
                status,
                Json(Detail {
                    detail: rejection.body_text(),
                }),
            )
                .into_response(),
            err if status.is_server_error() => {
                match &err {
                    ServerError::Internal { details, source } => {
                        tracing::error!(source = ?source, %details, "server returned 500 status")
                    },
                    _ => tracing::error!(error = %err, "server returned 500 status"),
                }

                (
                    status,
                    Json(Detail {
                        detail: "Internal server error.".to_owned(),
                    }),
                )
                    .into_response()
            },
            _ => (status, Json(Detail { detail: message })).into_response(),
        }
    }
}
