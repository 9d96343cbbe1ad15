//! OAuth2 state management.
//!
//! Provides the state shared by the authorization server handlers.

use crate::config::OAuth2Config;
use crate::error::OAuth2Error;
use crate::store::CredentialStore;
use base64::Engine;
use std::sync::Arc;
use time::{Duration, OffsetDateTime};

/// OAuth2 state containing all components needed for the authorization server.
#[derive(Clone)]
pub struct OAuth2State {
    pub store: Arc<dyn CredentialStore>,
    /// Base URL for the OAuth2 server (advertised as issuer)
    pub issuer_url: String,
    pub access_token_lifetime: Duration,
    pub refresh_token_lifetime: Duration,
    pub code_lifetime: Duration,
    token_entropy_bytes: usize,
}

impl OAuth2State {
    pub fn new(store: Arc<dyn CredentialStore>, config: &OAuth2Config) -> Self {
        Self {
            store,
            issuer_url: config.issuer_url.trim_end_matches('/').to_string(),
            access_token_lifetime: Duration::seconds(config.access_token_lifetime),
            refresh_token_lifetime: Duration::seconds(config.refresh_token_lifetime),
            code_lifetime: Duration::seconds(config.authorization_code_lifetime),
            token_entropy_bytes: config.token_entropy_bytes,
        }
    }

    /// Generate a secure random code or token
    pub fn generate_token(&self) -> Result<String, getrandom::Error> {
        let mut bytes = vec![0u8; self.token_entropy_bytes];
        getrandom::fill(&mut bytes)?;
        Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
    }
}

/// `now + lifetime`, failing instead of overflowing the calendar.
pub(crate) fn expires_after(
    now: OffsetDateTime,
    lifetime: Duration,
) -> Result<OffsetDateTime, OAuth2Error> {
    now.checked_add(lifetime)
        .ok_or(OAuth2Error::Internal("credential lifetime out of range"))
}
