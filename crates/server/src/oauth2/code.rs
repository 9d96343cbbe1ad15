//! Authorization code issuance.
//!
//! The authorization endpoint validates the request first, then hands the
//! resource owner's decision to [`CodeIssuer::issue`] as an explicit
//! [`ApprovalContext`].

use crate::error::OAuth2Error;
use crate::oauth2::state::{OAuth2State, expires_after};
use crate::store::{AuthorizationCode, Client};
use serde::Deserialize;
use time::OffsetDateTime;
use url::Url;
use utoipa::{IntoParams, ToSchema};

/// Parameters of an authorization request, as received.
#[derive(Clone, Debug, Default, Deserialize, ToSchema, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AuthorizationRequest {
    /// Client identifier issued during registration
    pub client_id: Option<String>,
    /// Where the user-agent is sent back to
    pub redirect_uri: Option<String>,
    /// Must be "code"
    pub response_type: Option<String>,
    /// Space-separated list of requested scopes
    pub scope: Option<String>,
    /// Opaque value echoed back on the redirect
    pub state: Option<String>,
}

/// An authorization request that passed every precondition.
#[derive(Clone, Debug)]
pub struct ValidatedAuthorization {
    pub client: Client,
    /// Exactly as the client sent it; redemption compares against this
    pub redirect_uri: String,
    pub scope: String,
    pub state: Option<String>,
}

/// Who approved the request, and whether they did.
#[derive(Clone, Debug)]
pub struct ApprovalContext {
    pub user_id: String,
    pub approved: bool,
}

pub struct CodeIssuer<'a> {
    state: &'a OAuth2State,
}

impl<'a> CodeIssuer<'a> {
    pub fn new(state: &'a OAuth2State) -> Self {
        Self { state }
    }

    /// Check the request preconditions in order. Each failure is terminal.
    pub async fn validate(
        &self,
        request: &AuthorizationRequest,
    ) -> Result<ValidatedAuthorization, OAuth2Error> {
        let client_id = request
            .client_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| OAuth2Error::invalid_request("client_id is required"))?;

        let Some(client) = self.state.store.find_client(client_id).await? else {
            tracing::warn!(client_id, "Authorization request for unknown client");
            return Err(OAuth2Error::AccessDenied);
        };

        if request.response_type.as_deref() != Some("code") {
            return Err(OAuth2Error::UnsupportedResponseType);
        }

        let redirect_uri = request
            .redirect_uri
            .as_deref()
            .filter(|uri| !uri.is_empty())
            .ok_or_else(|| OAuth2Error::invalid_request("redirect_uri is required"))?;
        if !client.is_redirect_uri_allowed(redirect_uri) {
            return Err(OAuth2Error::invalid_request(
                "redirect_uri does not match the registered redirect",
            ));
        }
        parse_redirect(redirect_uri)?;

        Ok(ValidatedAuthorization {
            client,
            redirect_uri: redirect_uri.to_string(),
            scope: normalize_scope(request.scope.as_deref()),
            state: request.state.clone(),
        })
    }

    /// Persist a single-use code and build the redirect back to the client.
    #[tracing::instrument(skip_all, fields(client_id = %request.client.id))]
    pub async fn issue(
        &self,
        request: ValidatedAuthorization,
        approval: ApprovalContext,
    ) -> Result<Url, OAuth2Error> {
        if !approval.approved {
            tracing::info!("Resource owner denied the authorization request");
            return Err(OAuth2Error::AccessDenied);
        }

        let mut redirect = parse_redirect(&request.redirect_uri)?;
        let now = OffsetDateTime::now_utc();
        let expires_at = expires_after(now, self.state.code_lifetime)?;
        let code = self.state.generate_token()?;
        self.state
            .store
            .create_code(AuthorizationCode {
                code: code.clone(),
                client_id: request.client.id.clone(),
                redirect_uri: request.redirect_uri,
                user_id: approval.user_id,
                scope: request.scope,
                expires_at,
                created_at: now,
            })
            .await?;
        tracing::info!("Issued authorization code");

        redirect.query_pairs_mut().append_pair("code", &code);
        if let Some(state) = &request.state {
            redirect.query_pairs_mut().append_pair("state", state);
        }
        Ok(redirect)
    }
}

pub(crate) fn parse_redirect(uri: &str) -> Result<Url, OAuth2Error> {
    Url::parse(uri).map_err(|_| OAuth2Error::invalid_request("redirect_uri is not an absolute URL"))
}

/// Collapse runs of whitespace so stored scopes compare predictably.
pub(crate) fn normalize_scope(scope: Option<&str>) -> String {
    scope
        .unwrap_or_default()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OAuth2Config;
    use crate::store::{CredentialStore, MemoryStore};
    use std::sync::Arc;

    async fn state() -> (OAuth2State, MemoryStore) {
        let store = MemoryStore::new();
        store
            .create_client(Client {
                id: "abc123".into(),
                name: "Samplr".into(),
                secret: "ssh-secret".into(),
                trusted: false,
                redirect_uri: Some("https://app.example/cb".into()),
                created_at: OffsetDateTime::now_utc(),
            })
            .await
            .unwrap();
        let state = OAuth2State::new(Arc::new(store.clone()), &OAuth2Config::default());
        (state, store)
    }

    fn request() -> AuthorizationRequest {
        AuthorizationRequest {
            client_id: Some("abc123".into()),
            redirect_uri: Some("https://app.example/cb".into()),
            response_type: Some("code".into()),
            scope: Some("read  offline_access".into()),
            state: Some("xyz".into()),
        }
    }

    #[tokio::test]
    async fn preconditions_are_checked_in_order() {
        let (state, _) = state().await;
        let issuer = CodeIssuer::new(&state);

        // An unknown client is reported before a bad response_type.
        let req = AuthorizationRequest {
            client_id: Some("bogus".into()),
            response_type: Some("token".into()),
            ..request()
        };
        assert!(matches!(
            issuer.validate(&req).await,
            Err(OAuth2Error::AccessDenied)
        ));

        let req = AuthorizationRequest {
            client_id: None,
            ..request()
        };
        assert!(matches!(
            issuer.validate(&req).await,
            Err(OAuth2Error::InvalidRequest(_))
        ));

        let req = AuthorizationRequest {
            response_type: Some("token".into()),
            redirect_uri: None,
            ..request()
        };
        assert!(matches!(
            issuer.validate(&req).await,
            Err(OAuth2Error::UnsupportedResponseType)
        ));

        let req = AuthorizationRequest {
            redirect_uri: Some("https://evil.example/cb".into()),
            ..request()
        };
        assert!(matches!(
            issuer.validate(&req).await,
            Err(OAuth2Error::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn approved_request_persists_code() {
        let (state, store) = state().await;
        let issuer = CodeIssuer::new(&state);
        let validated = issuer.validate(&request()).await.unwrap();
        assert_eq!(validated.scope, "read offline_access");

        let redirect = issuer
            .issue(
                validated,
                ApprovalContext {
                    user_id: "u-1".into(),
                    approved: true,
                },
            )
            .await
            .unwrap();

        let pairs: Vec<(String, String)> = redirect.query_pairs().into_owned().collect();
        assert_eq!(pairs[0].0, "code");
        assert_eq!(pairs[1], ("state".to_string(), "xyz".to_string()));

        let stored = store.take_code(&pairs[0].1).await.unwrap().unwrap();
        assert_eq!(stored.user_id, "u-1");
        assert_eq!(stored.client_id, "abc123");
        assert_eq!(stored.redirect_uri, "https://app.example/cb");
        assert!(!stored.is_expired());
    }

    #[tokio::test]
    async fn denied_request_issues_nothing() {
        let (state, _) = state().await;
        let issuer = CodeIssuer::new(&state);
        let validated = issuer.validate(&request()).await.unwrap();
        let result = issuer
            .issue(
                validated,
                ApprovalContext {
                    user_id: "u-1".into(),
                    approved: false,
                },
            )
            .await;
        assert!(matches!(result, Err(OAuth2Error::AccessDenied)));
    }
}
