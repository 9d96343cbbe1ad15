use axum::{
    Json,
    extract::rejection::{FormRejection, QueryRejection},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
    #[error("Record already exists: {0}")]
    Conflict(String),
}

/// Protocol-level failures of the authorization server.
///
/// Every variant is terminal for the request and maps to exactly one wire
/// code and HTTP status.
#[derive(Debug, Error)]
pub enum OAuth2Error {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Client authentication failed")]
    InvalidClient,
    #[error("Client is not permitted to use this grant")]
    UnauthorizedClient,
    #[error("Access denied")]
    AccessDenied,
    #[error("Unsupported response type")]
    UnsupportedResponseType,
    #[error("Unsupported grant type")]
    UnsupportedGrantType,
    #[error("Invalid grant: {0}")]
    InvalidGrant(String),
    #[error("Invalid resource owner credentials")]
    InvalidCredentials,
    #[error("Invalid token: {0}")]
    InvalidToken(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Random number generator failure: {0}")]
    Randomness(#[from] getrandom::Error),
    #[error("Internal error: {0}")]
    Internal(&'static str),
}

impl OAuth2Error {
    pub fn invalid_request(description: impl Into<String>) -> Self {
        OAuth2Error::InvalidRequest(description.into())
    }

    pub fn invalid_grant(description: impl Into<String>) -> Self {
        OAuth2Error::InvalidGrant(description.into())
    }

    pub fn invalid_token(description: impl Into<String>) -> Self {
        OAuth2Error::InvalidToken(description.into())
    }

    /// The `error` value placed on the wire.
    pub fn code(&self) -> &'static str {
        match self {
            OAuth2Error::InvalidRequest(_) => "invalid_request",
            OAuth2Error::InvalidClient => "invalid_client",
            OAuth2Error::UnauthorizedClient => "unauthorized_client",
            OAuth2Error::AccessDenied => "access_denied",
            OAuth2Error::UnsupportedResponseType => "unsupported_response_type",
            OAuth2Error::UnsupportedGrantType => "unsupported_grant_type",
            OAuth2Error::InvalidGrant(_) => "invalid_grant",
            OAuth2Error::InvalidCredentials => "invalid_credentials",
            OAuth2Error::InvalidToken(_) => "invalid_token",
            OAuth2Error::Store(_) | OAuth2Error::Randomness(_) | OAuth2Error::Internal(_) => {
                "server_error"
            }
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            OAuth2Error::InvalidRequest(_)
            | OAuth2Error::UnsupportedGrantType
            | OAuth2Error::InvalidGrant(_) => StatusCode::BAD_REQUEST,
            OAuth2Error::InvalidClient
            | OAuth2Error::InvalidCredentials
            | OAuth2Error::InvalidToken(_) => StatusCode::UNAUTHORIZED,
            OAuth2Error::UnauthorizedClient | OAuth2Error::AccessDenied => StatusCode::FORBIDDEN,
            OAuth2Error::UnsupportedResponseType => StatusCode::NOT_IMPLEMENTED,
            OAuth2Error::Store(_) | OAuth2Error::Randomness(_) | OAuth2Error::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Human-readable detail. Server failures are never described to callers.
    pub fn description(&self) -> Option<String> {
        match self {
            OAuth2Error::InvalidRequest(d)
            | OAuth2Error::InvalidGrant(d)
            | OAuth2Error::InvalidToken(d) => Some(d.clone()),
            OAuth2Error::Store(_) | OAuth2Error::Randomness(_) | OAuth2Error::Internal(_) => None,
            other => Some(other.to_string()),
        }
    }
}

/// Malformed or wrongly typed form bodies are protocol errors, not plain-text 4xx.
impl From<FormRejection> for OAuth2Error {
    fn from(rejection: FormRejection) -> Self {
        OAuth2Error::InvalidRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for OAuth2Error {
    fn from(rejection: QueryRejection) -> Self {
        OAuth2Error::InvalidRequest(rejection.body_text())
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl From<&OAuth2Error> for ErrorResponse {
    fn from(err: &OAuth2Error) -> Self {
        ErrorResponse {
            error: err.code().to_string(),
            error_description: err.description(),
        }
    }
}

impl IntoResponse for OAuth2Error {
    fn into_response(self) -> Response {
        match &self {
            OAuth2Error::Store(e) => tracing::error!("Credential store failure: {}", e),
            OAuth2Error::Randomness(e) => tracing::error!("Token generation failure: {}", e),
            OAuth2Error::Internal(e) => tracing::error!("Internal error: {}", e),
            _ => {}
        }

        let challenge = match &self {
            OAuth2Error::InvalidClient | OAuth2Error::InvalidCredentials => {
                Some(r#"Basic realm="oauth2""#)
            }
            OAuth2Error::InvalidToken(_) => Some(r#"Bearer error="invalid_token""#),
            _ => None,
        };

        let mut response = (self.status(), Json(ErrorResponse::from(&self))).into_response();
        if let Some(challenge) = challenge {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static(challenge));
        }
        response
    }
}
