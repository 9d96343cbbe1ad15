//! Client and resource-owner authentication.

use crate::error::OAuth2Error;
use crate::oauth2::password::verify_password;
use crate::oauth2::state::OAuth2State;
use crate::store::{AccessToken, Client, CredentialStore, User};
use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header, request::Parts},
};
use base64::Engine;

/// Credentials a client presented on a request.
#[derive(Clone)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

impl ClientCredentials {
    /// Basic auth wins; otherwise fall back to `client_id`/`client_secret`
    /// body fields. A body `client_id` without a secret is kept with an empty
    /// secret so it fails authentication instead of being ignored.
    pub fn from_request(
        headers: &HeaderMap,
        client_id: Option<&str>,
        client_secret: Option<&str>,
    ) -> Option<Self> {
        if let Some((client_id, client_secret)) = basic_credentials(headers) {
            return Some(Self {
                client_id,
                client_secret,
            });
        }

        client_id.filter(|id| !id.is_empty()).map(|id| Self {
            client_id: id.to_string(),
            client_secret: client_secret.unwrap_or_default().to_string(),
        })
    }
}

/// Decode an `Authorization: Basic` header into `(user, password)`.
pub fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let encoded = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Basic "))?;
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .ok()?;
    let creds = String::from_utf8(decoded).ok()?;
    let (id, secret) = creds.split_once(':')?;
    Some((id.to_string(), secret.to_string()))
}

/// Resolve the client and check its secret.
pub async fn authenticate_client(
    store: &dyn CredentialStore,
    credentials: &ClientCredentials,
) -> Result<Client, OAuth2Error> {
    match store.find_client(&credentials.client_id).await? {
        Some(client) if client.secret_matches(&credentials.client_secret) => Ok(client),
        Some(_) => {
            tracing::debug!(client_id = %credentials.client_id, "Client secret mismatch");
            Err(OAuth2Error::InvalidClient)
        }
        None => {
            tracing::debug!(client_id = %credentials.client_id, "Unknown client");
            Err(OAuth2Error::InvalidClient)
        }
    }
}

/// Resolve the resource owner and verify the password.
pub async fn authenticate_user(
    store: &dyn CredentialStore,
    username: &str,
    password: &str,
) -> Result<User, OAuth2Error> {
    let Some(user) = store.find_user(username).await? else {
        tracing::debug!(username, "Unknown resource owner");
        return Err(OAuth2Error::InvalidCredentials);
    };

    if verify_password(password, &user.password) {
        Ok(user)
    } else {
        tracing::debug!(username, "Resource owner password mismatch");
        Err(OAuth2Error::InvalidCredentials)
    }
}

/// A live access token presented as `Authorization: Bearer <token>`.
///
/// Expired tokens are removed from the store when they are presented.
pub struct BearerToken(pub AccessToken);

impl FromRequestParts<OAuth2State> for BearerToken {
    type Rejection = OAuth2Error;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &OAuth2State,
    ) -> Result<Self, Self::Rejection> {
        let access_token = match parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
        {
            Some(value) => value.strip_prefix("Bearer ").ok_or_else(|| {
                OAuth2Error::invalid_token("Authorization header must use Bearer scheme")
            })?,
            None => return Err(OAuth2Error::invalid_token("Missing Authorization header")),
        };

        let token = live_token(state.store.as_ref(), access_token.trim()).await?;
        Ok(BearerToken(token))
    }
}

/// Look up an access token, deleting it if it has expired.
pub async fn live_token(
    store: &dyn CredentialStore,
    access_token: &str,
) -> Result<AccessToken, OAuth2Error> {
    let token = store
        .find_token(access_token)
        .await?
        .ok_or_else(|| OAuth2Error::invalid_token("Token not found"))?;

    if token.is_expired() {
        store.find_and_delete_token(access_token).await?;
        return Err(OAuth2Error::invalid_token("Token has expired"));
    }
    Ok(token)
}
