//! SeaORM entities for the credential tables.
//!
//! The models double as the records exchanged through
//! [`CredentialStore`](crate::store::CredentialStore).

pub mod oauth2_access_token;
pub mod oauth2_authorization_code;
pub mod oauth2_client;
pub mod oauth2_refresh_token;
pub mod oauth2_user;

/// Check whether a space-delimited scope string contains `wanted`.
pub(crate) fn scope_contains(scope: &str, wanted: &str) -> bool {
    scope.split_whitespace().any(|s| s == wanted)
}
