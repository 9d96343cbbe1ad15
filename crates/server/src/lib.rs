//! An OAuth2 authorization server.
//!
//! Issues, validates and revokes authorization codes, access tokens and
//! refresh tokens for the authorization-code, password, client-credentials
//! and refresh-token grants.

use std::sync::Arc;

use crate::config::AppConfig;
use crate::store::CredentialStore;

pub mod api;
pub mod config;
pub mod entity;
pub mod error;
pub mod oauth2;
pub mod store;

#[derive(Clone)]
pub struct AppResources {
    pub store: Arc<dyn CredentialStore>,
    pub config: Arc<AppConfig>,
}
