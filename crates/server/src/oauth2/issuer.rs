//! Access and refresh token issuance for the four grants.

use crate::entity::scope_contains;
use crate::error::OAuth2Error;
use crate::oauth2::authenticate::authenticate_user;
use crate::oauth2::code::normalize_scope;
use crate::oauth2::state::{OAuth2State, expires_after};
use crate::store::{AccessToken, Client, RefreshToken};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::ToSchema;

/// Scope value that asks for a refresh token alongside the access token.
pub const OFFLINE_ACCESS: &str = "offline_access";

/// Outcome of a successful grant.
#[derive(Clone, Debug)]
pub struct IssuedToken {
    pub access_token: String,
    pub expiration_date: OffsetDateTime,
    pub scope: String,
    pub refresh_token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    /// Always "bearer"
    pub token_type: String,
    /// Seconds until the access token expires
    pub expires_in: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl From<IssuedToken> for TokenResponse {
    fn from(issued: IssuedToken) -> Self {
        TokenResponse {
            access_token: issued.access_token,
            token_type: "bearer".to_string(),
            expires_in: (issued.expiration_date - OffsetDateTime::now_utc())
                .whole_seconds()
                .max(0),
            scope: (!issued.scope.is_empty()).then_some(issued.scope),
            refresh_token: issued.refresh_token,
        }
    }
}

pub struct TokenIssuer<'a> {
    state: &'a OAuth2State,
}

impl<'a> TokenIssuer<'a> {
    pub fn new(state: &'a OAuth2State) -> Self {
        Self { state }
    }

    /// Redeem an authorization code. The code is consumed before any check so
    /// that a failed redemption can never be retried.
    pub async fn authorization_code(
        &self,
        client: &Client,
        code: &str,
        redirect_uri: &str,
    ) -> Result<IssuedToken, OAuth2Error> {
        let Some(grant) = self.state.store.take_code(code).await? else {
            tracing::warn!(client_id = %client.id, "Unknown or already redeemed authorization code");
            return Err(OAuth2Error::invalid_grant(
                "authorization code is invalid or already redeemed",
            ));
        };

        if grant.is_expired() {
            return Err(OAuth2Error::invalid_grant("authorization code expired"));
        }
        if grant.client_id != client.id {
            tracing::warn!(client_id = %client.id, "Authorization code bound to another client");
            return Err(OAuth2Error::invalid_grant(
                "authorization code was issued to another client",
            ));
        }
        if grant.redirect_uri != redirect_uri {
            return Err(OAuth2Error::invalid_grant("redirect_uri mismatch"));
        }

        self.mint(client, Some(grant.user_id), grant.scope, true)
            .await
    }

    /// Resource-owner password grant; trusted clients only.
    pub async fn password(
        &self,
        client: &Client,
        username: &str,
        password: &str,
        scope: Option<&str>,
    ) -> Result<IssuedToken, OAuth2Error> {
        if !client.trusted {
            tracing::warn!(client_id = %client.id, "Untrusted client attempted password grant");
            return Err(OAuth2Error::UnauthorizedClient);
        }
        let user = authenticate_user(self.state.store.as_ref(), username, password).await?;

        self.mint(client, Some(user.id), normalize_scope(scope), true)
            .await
    }

    /// The token stands for the client itself and never carries a user.
    pub async fn client_credentials(
        &self,
        client: &Client,
        scope: Option<&str>,
    ) -> Result<IssuedToken, OAuth2Error> {
        self.mint(client, None, normalize_scope(scope), false).await
    }

    /// Mint a fresh access token from a stored refresh token. The refresh
    /// token stays valid and is not returned again.
    pub async fn refresh_token(
        &self,
        client: &Client,
        refresh_token: &str,
    ) -> Result<IssuedToken, OAuth2Error> {
        let Some(stored) = self.state.store.find_refresh_token(refresh_token).await? else {
            return Err(OAuth2Error::invalid_grant("unknown refresh token"));
        };
        if stored.client_id != client.id {
            tracing::warn!(client_id = %client.id, "Refresh token bound to another client");
            return Err(OAuth2Error::invalid_grant(
                "refresh token was issued to another client",
            ));
        }
        if stored.is_expired() {
            return Err(OAuth2Error::invalid_grant("refresh token expired"));
        }

        self.mint(client, Some(stored.user_id), stored.scope, false)
            .await
    }

    async fn mint(
        &self,
        client: &Client,
        user_id: Option<String>,
        scope: String,
        allow_refresh: bool,
    ) -> Result<IssuedToken, OAuth2Error> {
        let now = OffsetDateTime::now_utc();
        let access_token = self.state.generate_token()?;
        let expiration_date = expires_after(now, self.state.access_token_lifetime)?;

        let refresh_token = match &user_id {
            Some(user_id) if allow_refresh && scope_contains(&scope, OFFLINE_ACCESS) => {
                let token = self.state.generate_token()?;
                self.state
                    .store
                    .create_refresh_token(RefreshToken {
                        refresh_token: token.clone(),
                        user_id: user_id.clone(),
                        client_id: client.id.clone(),
                        scope: scope.clone(),
                        expires_at: expires_after(now, self.state.refresh_token_lifetime)?,
                        created_at: now,
                    })
                    .await?;
                Some(token)
            }
            _ => None,
        };

        let stored = self
            .state
            .store
            .create_token(AccessToken {
                token: access_token.clone(),
                user_id,
                client_id: client.id.clone(),
                expiration_date,
                scope: scope.clone(),
                created_at: now,
            })
            .await;
        if let Err(e) = stored {
            // Never leave a refresh token behind without the grant it belongs to
            if let Some(token) = &refresh_token
                && let Err(cleanup) = self.state.store.delete_refresh_token(token).await
            {
                tracing::error!("Failed to drop orphaned refresh token: {}", cleanup);
            }
            return Err(e.into());
        }

        Ok(IssuedToken {
            access_token,
            expiration_date,
            scope,
            refresh_token,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OAuth2Config;
    use crate::oauth2::password::hash_password;
    use crate::error::StoreError;
    use crate::store::{AuthorizationCode, CredentialStore, MemoryStore, SweepReport, User};
    use async_trait::async_trait;
    use std::sync::Arc;
    use time::Duration;

    /// Delegates to a `MemoryStore` but refuses to persist access tokens.
    struct RejectAccessTokens(MemoryStore);

    #[async_trait]
    impl CredentialStore for RejectAccessTokens {
        async fn find_client(&self, id: &str) -> Result<Option<Client>, StoreError> {
            self.0.find_client(id).await
        }
        async fn create_client(&self, client: Client) -> Result<(), StoreError> {
            self.0.create_client(client).await
        }
        async fn list_clients(&self) -> Result<Vec<Client>, StoreError> {
            self.0.list_clients().await
        }
        async fn find_user(&self, username: &str) -> Result<Option<User>, StoreError> {
            self.0.find_user(username).await
        }
        async fn find_user_by_id(&self, id: &str) -> Result<Option<User>, StoreError> {
            self.0.find_user_by_id(id).await
        }
        async fn create_user(&self, user: User) -> Result<(), StoreError> {
            self.0.create_user(user).await
        }
        async fn list_users(&self) -> Result<Vec<User>, StoreError> {
            self.0.list_users().await
        }
        async fn create_code(&self, code: AuthorizationCode) -> Result<(), StoreError> {
            self.0.create_code(code).await
        }
        async fn take_code(&self, code: &str) -> Result<Option<AuthorizationCode>, StoreError> {
            self.0.take_code(code).await
        }
        async fn create_token(&self, token: AccessToken) -> Result<(), StoreError> {
            Err(StoreError::Conflict(format!("access token {}", token.token)))
        }
        async fn find_token(&self, token: &str) -> Result<Option<AccessToken>, StoreError> {
            self.0.find_token(token).await
        }
        async fn find_and_delete_token(
            &self,
            token: &str,
        ) -> Result<Option<AccessToken>, StoreError> {
            self.0.find_and_delete_token(token).await
        }
        async fn create_refresh_token(&self, token: RefreshToken) -> Result<(), StoreError> {
            self.0.create_refresh_token(token).await
        }
        async fn find_refresh_token(
            &self,
            token: &str,
        ) -> Result<Option<RefreshToken>, StoreError> {
            self.0.find_refresh_token(token).await
        }
        async fn delete_refresh_token(&self, token: &str) -> Result<bool, StoreError> {
            self.0.delete_refresh_token(token).await
        }
        async fn delete_expired(&self, now: OffsetDateTime) -> Result<SweepReport, StoreError> {
            self.0.delete_expired(now).await
        }
    }

    fn client(id: &str, trusted: bool) -> Client {
        Client {
            id: id.into(),
            name: format!("{id}-name"),
            secret: "ssh-secret".into(),
            trusted,
            redirect_uri: None,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    async fn setup() -> (OAuth2State, MemoryStore) {
        let store = MemoryStore::new();
        store.create_client(client("trusted", true)).await.unwrap();
        store.create_client(client("untrusted", false)).await.unwrap();
        store
            .create_user(User {
                id: "u-1".into(),
                username: "bob".into(),
                password: hash_password("bob-pass").unwrap(),
                created_at: OffsetDateTime::now_utc(),
            })
            .await
            .unwrap();
        let state = OAuth2State::new(Arc::new(store.clone()), &OAuth2Config::default());
        (state, store)
    }

    async fn seed_code(store: &MemoryStore, code: &str, scope: &str, ttl: Duration) {
        let now = OffsetDateTime::now_utc();
        store
            .create_code(AuthorizationCode {
                code: code.into(),
                client_id: "untrusted".into(),
                redirect_uri: "https://app.example/cb".into(),
                user_id: "u-1".into(),
                scope: scope.into(),
                expires_at: now + ttl,
                created_at: now,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn code_is_redeemed_once() {
        let (state, store) = setup().await;
        seed_code(&store, "c1", "read", Duration::minutes(5)).await;
        let issuer = TokenIssuer::new(&state);
        let client = client("untrusted", false);

        let issued = issuer
            .authorization_code(&client, "c1", "https://app.example/cb")
            .await
            .unwrap();
        assert!(issued.refresh_token.is_none());
        let token = store.find_token(&issued.access_token).await.unwrap().unwrap();
        assert_eq!(token.user_id.as_deref(), Some("u-1"));

        let replay = issuer
            .authorization_code(&client, "c1", "https://app.example/cb")
            .await;
        assert!(matches!(replay, Err(OAuth2Error::InvalidGrant(_))));
    }

    #[tokio::test]
    async fn code_binding_is_enforced_and_consumes_code() {
        let (state, store) = setup().await;
        seed_code(&store, "c1", "", Duration::minutes(5)).await;
        seed_code(&store, "c2", "", Duration::minutes(5)).await;
        seed_code(&store, "c3", "", Duration::seconds(-1)).await;
        let issuer = TokenIssuer::new(&state);

        let other = client("trusted", true);
        assert!(matches!(
            issuer
                .authorization_code(&other, "c1", "https://app.example/cb")
                .await,
            Err(OAuth2Error::InvalidGrant(_))
        ));
        assert!(store.take_code("c1").await.unwrap().is_none());

        let owner = client("untrusted", false);
        assert!(matches!(
            issuer
                .authorization_code(&owner, "c2", "https://app.example/other")
                .await,
            Err(OAuth2Error::InvalidGrant(_))
        ));
        assert!(matches!(
            issuer
                .authorization_code(&owner, "c3", "https://app.example/cb")
                .await,
            Err(OAuth2Error::InvalidGrant(_))
        ));
    }

    #[tokio::test]
    async fn offline_access_adds_refresh_token() {
        let (state, store) = setup().await;
        seed_code(&store, "c1", "read offline_access", Duration::minutes(5)).await;
        let issuer = TokenIssuer::new(&state);

        let issued = issuer
            .authorization_code(&client("untrusted", false), "c1", "https://app.example/cb")
            .await
            .unwrap();
        let refresh = issued.refresh_token.unwrap();
        let stored = store.find_refresh_token(&refresh).await.unwrap().unwrap();
        assert_eq!(stored.user_id, "u-1");
        assert_eq!(stored.scope, "read offline_access");
    }

    #[tokio::test]
    async fn password_grant_requires_trusted_client() {
        let (state, _) = setup().await;
        let issuer = TokenIssuer::new(&state);

        assert!(matches!(
            issuer
                .password(&client("untrusted", false), "bob", "bob-pass", None)
                .await,
            Err(OAuth2Error::UnauthorizedClient)
        ));
        assert!(matches!(
            issuer
                .password(&client("trusted", true), "bob", "wrong", None)
                .await,
            Err(OAuth2Error::InvalidCredentials)
        ));

        let issued = issuer
            .password(&client("trusted", true), "bob", "bob-pass", Some("offline_access"))
            .await
            .unwrap();
        assert!(issued.refresh_token.is_some());
    }

    #[tokio::test]
    async fn client_credentials_has_no_user_or_refresh_token() {
        let (state, store) = setup().await;
        let issuer = TokenIssuer::new(&state);

        let issued = issuer
            .client_credentials(&client("untrusted", false), Some("offline_access"))
            .await
            .unwrap();
        assert!(issued.refresh_token.is_none());
        let token = store.find_token(&issued.access_token).await.unwrap().unwrap();
        assert!(token.user_id.is_none());
    }

    #[tokio::test]
    async fn refresh_token_is_not_rotated() {
        let (state, store) = setup().await;
        let issuer = TokenIssuer::new(&state);
        let trusted = client("trusted", true);
        let refresh = issuer
            .password(&trusted, "bob", "bob-pass", Some("offline_access"))
            .await
            .unwrap()
            .refresh_token
            .unwrap();

        let first = issuer.refresh_token(&trusted, &refresh).await.unwrap();
        let second = issuer.refresh_token(&trusted, &refresh).await.unwrap();
        assert_ne!(first.access_token, second.access_token);
        assert!(first.refresh_token.is_none());
        assert!(store.find_refresh_token(&refresh).await.unwrap().is_some());

        assert!(matches!(
            issuer
                .refresh_token(&client("untrusted", false), &refresh)
                .await,
            Err(OAuth2Error::InvalidGrant(_))
        ));
        assert!(matches!(
            issuer.refresh_token(&trusted, "bogus").await,
            Err(OAuth2Error::InvalidGrant(_))
        ));
    }

    #[tokio::test]
    async fn failed_access_token_write_drops_refresh_token() {
        let (_, store) = setup().await;
        let state = OAuth2State::new(
            Arc::new(RejectAccessTokens(store.clone())),
            &OAuth2Config::default(),
        );
        let issuer = TokenIssuer::new(&state);

        let result = issuer
            .password(&client("trusted", true), "bob", "bob-pass", Some("offline_access"))
            .await;
        assert!(matches!(result, Err(OAuth2Error::Store(_))));

        // Everything left in the store would be swept at the end of time
        let far_future = OffsetDateTime::now_utc() + Duration::days(365 * 100);
        let report = store.delete_expired(far_future).await.unwrap();
        assert_eq!(report.refresh_tokens, 0);
    }

    #[tokio::test]
    async fn oversized_lifetime_is_an_error_not_a_panic() {
        let (_, store) = setup().await;
        let config = OAuth2Config {
            access_token_lifetime: i64::MAX / 2,
            ..OAuth2Config::default()
        };
        let state = OAuth2State::new(Arc::new(store), &config);

        let result = TokenIssuer::new(&state)
            .client_credentials(&client("untrusted", false), None)
            .await;
        assert!(matches!(result, Err(OAuth2Error::Internal(_))));
    }

    #[test]
    fn empty_scope_is_omitted_from_response() {
        let response = TokenResponse::from(IssuedToken {
            access_token: "t".into(),
            expiration_date: OffsetDateTime::now_utc() + Duration::hours(1),
            scope: String::new(),
            refresh_token: None,
        });
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["token_type"], "bearer");
        assert!(json.get("scope").is_none());
        assert!(json.get("refresh_token").is_none());
        assert!(json["expires_in"].as_i64().unwrap() > 3590);
    }
}
