//! Concurrent redemption of codes and refresh tokens.

use futures::future::join_all;
use oauth2_grant_server::{
    config::OAuth2Config,
    error::OAuth2Error,
    oauth2::{OAuth2State, issuer::TokenIssuer},
    store::{AuthorizationCode, Client, CredentialStore, MemoryStore, RefreshToken},
};
use std::collections::HashSet;
use std::sync::Arc;
use time::{Duration, OffsetDateTime};

const REDIRECT: &str = "https://app.example/cb";

async fn create_test_state() -> (OAuth2State, Client) {
    let store = MemoryStore::new();
    let client = Client {
        id: "abc123".into(),
        name: "Samplr".into(),
        secret: "ssh-secret".into(),
        trusted: true,
        redirect_uri: Some(REDIRECT.into()),
        created_at: OffsetDateTime::now_utc(),
    };
    store.create_client(client.clone()).await.unwrap();
    (
        OAuth2State::new(Arc::new(store), &OAuth2Config::default()),
        client,
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_code_redemption_succeeds_once() {
    let (state, client) = create_test_state().await;
    let now = OffsetDateTime::now_utc();
    state
        .store
        .create_code(AuthorizationCode {
            code: "contested".into(),
            client_id: client.id.clone(),
            redirect_uri: REDIRECT.into(),
            user_id: "user-1".into(),
            scope: "offline_access".into(),
            expires_at: now + Duration::minutes(10),
            created_at: now,
        })
        .await
        .unwrap();

    let attempts = (0..16).map(|_| {
        let state = state.clone();
        let client = client.clone();
        tokio::spawn(async move {
            TokenIssuer::new(&state)
                .authorization_code(&client, "contested", REDIRECT)
                .await
        })
    });
    let results: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.expect("task panicked"))
        .collect();

    let successes = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1);
    assert!(
        results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, OAuth2Error::InvalidGrant(_)))
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_refresh_keeps_token_valid() {
    let (state, client) = create_test_state().await;
    let now = OffsetDateTime::now_utc();
    state
        .store
        .create_refresh_token(RefreshToken {
            refresh_token: "shared".into(),
            user_id: "user-1".into(),
            client_id: client.id.clone(),
            scope: "offline_access".into(),
            expires_at: now + Duration::days(1),
            created_at: now,
        })
        .await
        .unwrap();

    let attempts = (0..8).map(|_| {
        let state = state.clone();
        let client = client.clone();
        tokio::spawn(async move {
            TokenIssuer::new(&state)
                .refresh_token(&client, "shared")
                .await
        })
    });
    let issued: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.expect("task panicked").expect("refresh succeeds"))
        .collect();

    let distinct: HashSet<_> = issued.iter().map(|t| t.access_token.clone()).collect();
    assert_eq!(distinct.len(), issued.len());
    assert!(issued.iter().all(|t| t.refresh_token.is_none()));
    assert!(
        state
            .store
            .find_refresh_token("shared")
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn test_expired_code_is_consumed() {
    let (state, client) = create_test_state().await;
    let now = OffsetDateTime::now_utc();
    state
        .store
        .create_code(AuthorizationCode {
            code: "stale".into(),
            client_id: client.id.clone(),
            redirect_uri: REDIRECT.into(),
            user_id: "user-1".into(),
            scope: String::new(),
            expires_at: now - Duration::seconds(1),
            created_at: now - Duration::minutes(10),
        })
        .await
        .unwrap();

    let issuer = TokenIssuer::new(&state);
    let err = issuer
        .authorization_code(&client, "stale", REDIRECT)
        .await
        .unwrap_err();
    assert!(matches!(err, OAuth2Error::InvalidGrant(_)));
    assert!(state.store.take_code("stale").await.unwrap().is_none());
}
