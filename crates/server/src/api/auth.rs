//! Resource-owner extractor and the error body of the account API.

use crate::AppResources;
use crate::error::{OAuth2Error, StoreError};
use crate::oauth2::authenticate::{authenticate_user, basic_credentials};
use crate::store::User;
use axum::{
    Json,
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

fn resources(parts: &Parts) -> Result<AppResources, OAuth2Error> {
    parts.extensions.get::<AppResources>().cloned().ok_or_else(|| {
        tracing::error!("AppResources not found in extensions");
        OAuth2Error::Internal("application resources missing")
    })
}

/// Resource owner authenticated with HTTP Basic credentials.
pub struct ResourceOwner(pub User);

impl<S> FromRequestParts<S> for ResourceOwner
where
    S: Send + Sync,
{
    type Rejection = OAuth2Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let resources = resources(parts)?;
        let (username, password) =
            basic_credentials(&parts.headers).ok_or(OAuth2Error::InvalidCredentials)?;
        let user = authenticate_user(resources.store.as_ref(), &username, &password).await?;
        Ok(ResourceOwner(user))
    }
}

/// Error body of the account administration API.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// Error code (e.g., "conflict", "bad_request")
    pub error: String,
    /// Human-readable error description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl ApiError {
    pub fn conflict(description: impl Into<String>) -> Self {
        Self {
            error: "conflict".to_string(),
            error_description: Some(description.into()),
        }
    }

    pub fn bad_request(description: impl Into<String>) -> Self {
        Self {
            error: "bad_request".to_string(),
            error_description: Some(description.into()),
        }
    }

    pub fn server_error() -> Self {
        Self {
            error: "server_error".to_string(),
            error_description: None,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(what) => ApiError::conflict(format!("{what} already exists")),
            StoreError::Database(e) => {
                tracing::error!("Database error: {}", e);
                ApiError::server_error()
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.error.as_str() {
            "conflict" => StatusCode::CONFLICT,
            "bad_request" => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_status_codes() {
        let response = ApiError::conflict("test").into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = ApiError::bad_request("test").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = ApiError::server_error().into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn store_conflict_becomes_409() {
        let err = ApiError::from(StoreError::Conflict("user bob".into()));
        assert_eq!(err.error, "conflict");
        assert_eq!(err.error_description.as_deref(), Some("user bob already exists"));
    }
}
