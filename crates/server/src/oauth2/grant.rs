//! Token request dispatch.
//!
//! A token request is authenticated as a client first, then parsed into a
//! [`Grant`] and handed to the [`TokenIssuer`].

use crate::error::OAuth2Error;
use crate::oauth2::authenticate::{ClientCredentials, authenticate_client};
use crate::oauth2::issuer::{IssuedToken, TokenIssuer};
use crate::oauth2::state::OAuth2State;
use crate::store::Client;
use serde::Deserialize;
use utoipa::ToSchema;

/// Form body of `POST /oauth2/token`.
#[derive(Clone, Default, Deserialize, ToSchema)]
pub struct TokenRequest {
    pub grant_type: Option<String>,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

impl std::fmt::Debug for TokenRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenRequest")
            .field("grant_type", &self.grant_type)
            .field("client_id", &self.client_id)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

/// One supported grant with its required fields.
#[derive(Clone)]
pub enum Grant {
    AuthorizationCode {
        code: String,
        redirect_uri: String,
    },
    Password {
        username: String,
        password: String,
        scope: Option<String>,
    },
    ClientCredentials {
        scope: Option<String>,
    },
    RefreshToken {
        refresh_token: String,
    },
}

fn required(value: &Option<String>, name: &str) -> Result<String, OAuth2Error> {
    value
        .clone()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| OAuth2Error::invalid_request(format!("{name} is required")))
}

impl Grant {
    pub fn from_request(request: &TokenRequest) -> Result<Self, OAuth2Error> {
        let grant_type = request
            .grant_type
            .as_deref()
            .ok_or_else(|| OAuth2Error::invalid_request("grant_type is required"))?;

        match grant_type {
            "authorization_code" => Ok(Grant::AuthorizationCode {
                code: required(&request.code, "code")?,
                redirect_uri: required(&request.redirect_uri, "redirect_uri")?,
            }),
            "password" => Ok(Grant::Password {
                username: required(&request.username, "username")?,
                password: required(&request.password, "password")?,
                scope: request.scope.clone(),
            }),
            "client_credentials" => Ok(Grant::ClientCredentials {
                scope: request.scope.clone(),
            }),
            "refresh_token" => Ok(Grant::RefreshToken {
                refresh_token: required(&request.refresh_token, "refresh_token")?,
            }),
            other => {
                tracing::debug!(grant_type = other, "Unsupported grant type");
                Err(OAuth2Error::UnsupportedGrantType)
            }
        }
    }

    pub fn grant_type(&self) -> &'static str {
        match self {
            Grant::AuthorizationCode { .. } => "authorization_code",
            Grant::Password { .. } => "password",
            Grant::ClientCredentials { .. } => "client_credentials",
            Grant::RefreshToken { .. } => "refresh_token",
        }
    }

    pub async fn issue(
        self,
        issuer: &TokenIssuer<'_>,
        client: &Client,
    ) -> Result<IssuedToken, OAuth2Error> {
        match self {
            Grant::AuthorizationCode { code, redirect_uri } => {
                issuer
                    .authorization_code(client, &code, &redirect_uri)
                    .await
            }
            Grant::Password {
                username,
                password,
                scope,
            } => {
                issuer
                    .password(client, &username, &password, scope.as_deref())
                    .await
            }
            Grant::ClientCredentials { scope } => {
                issuer.client_credentials(client, scope.as_deref()).await
            }
            Grant::RefreshToken { refresh_token } => {
                issuer.refresh_token(client, &refresh_token).await
            }
        }
    }
}

/// Authenticate the client, then run the requested grant.
#[tracing::instrument(
    skip_all,
    fields(client_id = tracing::field::Empty, grant_type = tracing::field::Empty)
)]
pub async fn dispatch(
    state: &OAuth2State,
    credentials: Option<ClientCredentials>,
    request: &TokenRequest,
) -> Result<IssuedToken, OAuth2Error> {
    let credentials = credentials.ok_or(OAuth2Error::InvalidClient)?;
    tracing::Span::current().record("client_id", credentials.client_id.as_str());
    let client = authenticate_client(state.store.as_ref(), &credentials).await?;

    let grant = Grant::from_request(request)?;
    tracing::Span::current().record("grant_type", grant.grant_type());

    let issued = grant.issue(&TokenIssuer::new(state), &client).await?;
    tracing::info!(
        refresh_token = issued.refresh_token.is_some(),
        "Issued access token"
    );
    Ok(issued)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OAuth2Config;
    use crate::store::{CredentialStore, MemoryStore};
    use std::sync::Arc;
    use time::OffsetDateTime;

    fn form(grant_type: Option<&str>) -> TokenRequest {
        TokenRequest {
            grant_type: grant_type.map(String::from),
            ..TokenRequest::default()
        }
    }

    #[test]
    fn parses_grant_types() {
        assert!(matches!(
            Grant::from_request(&form(None)),
            Err(OAuth2Error::InvalidRequest(_))
        ));
        assert!(matches!(
            Grant::from_request(&form(Some("implicit"))),
            Err(OAuth2Error::UnsupportedGrantType)
        ));
        assert!(matches!(
            Grant::from_request(&form(Some("client_credentials"))),
            Ok(Grant::ClientCredentials { scope: None })
        ));
        assert!(matches!(
            Grant::from_request(&form(Some("authorization_code"))),
            Err(OAuth2Error::InvalidRequest(_))
        ));
        assert!(matches!(
            Grant::from_request(&form(Some("refresh_token"))),
            Err(OAuth2Error::InvalidRequest(_))
        ));

        let request = TokenRequest {
            username: Some("bob".into()),
            password: Some("".into()),
            ..form(Some("password"))
        };
        assert!(matches!(
            Grant::from_request(&request),
            Err(OAuth2Error::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn client_authentication_runs_before_grant_parsing() {
        let store = MemoryStore::new();
        store
            .create_client(Client {
                id: "abc123".into(),
                name: "Samplr".into(),
                secret: "ssh-secret".into(),
                trusted: false,
                redirect_uri: None,
                created_at: OffsetDateTime::now_utc(),
            })
            .await
            .unwrap();
        let state = OAuth2State::new(Arc::new(store), &OAuth2Config::default());

        let bad = ClientCredentials {
            client_id: "abc123".into(),
            client_secret: "nope".into(),
        };
        assert!(matches!(
            dispatch(&state, Some(bad), &form(Some("implicit"))).await,
            Err(OAuth2Error::InvalidClient)
        ));
        assert!(matches!(
            dispatch(&state, None, &form(Some("client_credentials"))).await,
            Err(OAuth2Error::InvalidClient)
        ));

        let good = ClientCredentials {
            client_id: "abc123".into(),
            client_secret: "ssh-secret".into(),
        };
        assert!(matches!(
            dispatch(&state, Some(good.clone()), &form(Some("implicit"))).await,
            Err(OAuth2Error::UnsupportedGrantType)
        ));
        assert!(
            dispatch(&state, Some(good), &form(Some("client_credentials")))
                .await
                .is_ok()
        );
    }
}
