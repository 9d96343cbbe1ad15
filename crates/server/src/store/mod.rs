//! Credential store.
//!
//! The protocol core reaches persistence only through [`CredentialStore`].
//! Every mutation is scoped to a single key; the one operation with a
//! concurrency contract is [`CredentialStore::take_code`], which must hand a
//! given authorization code to at most one caller.

mod db;
mod memory;
mod sweep;

pub use db::DbStore;
pub use memory::MemoryStore;
pub use sweep::{spawn_expiry_sweep, sweep_expired};

use crate::entity::{
    oauth2_access_token, oauth2_authorization_code, oauth2_client, oauth2_refresh_token,
    oauth2_user,
};
use crate::error::StoreError;
use async_trait::async_trait;
use time::OffsetDateTime;

pub type Client = oauth2_client::Model;
pub type User = oauth2_user::Model;
pub type AuthorizationCode = oauth2_authorization_code::Model;
pub type AccessToken = oauth2_access_token::Model;
pub type RefreshToken = oauth2_refresh_token::Model;

/// Rows removed by [`CredentialStore::delete_expired`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub codes: u64,
    pub access_tokens: u64,
    pub refresh_tokens: u64,
}

impl SweepReport {
    pub fn total(&self) -> u64 {
        self.codes + self.access_tokens + self.refresh_tokens
    }
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_client(&self, id: &str) -> Result<Option<Client>, StoreError>;

    /// Fails with [`StoreError::Conflict`] when the id or name is taken.
    async fn create_client(&self, client: Client) -> Result<(), StoreError>;

    async fn list_clients(&self) -> Result<Vec<Client>, StoreError>;

    async fn find_user(&self, username: &str) -> Result<Option<User>, StoreError>;

    async fn find_user_by_id(&self, id: &str) -> Result<Option<User>, StoreError>;

    /// Fails with [`StoreError::Conflict`] when the username is taken.
    async fn create_user(&self, user: User) -> Result<(), StoreError>;

    async fn list_users(&self) -> Result<Vec<User>, StoreError>;

    async fn create_code(&self, code: AuthorizationCode) -> Result<(), StoreError>;

    /// Atomically read and delete the code. Under concurrent calls for the
    /// same code exactly one caller receives `Some`.
    async fn take_code(&self, code: &str) -> Result<Option<AuthorizationCode>, StoreError>;

    async fn create_token(&self, token: AccessToken) -> Result<(), StoreError>;

    async fn find_token(&self, token: &str) -> Result<Option<AccessToken>, StoreError>;

    async fn find_and_delete_token(&self, token: &str)
    -> Result<Option<AccessToken>, StoreError>;

    async fn create_refresh_token(&self, token: RefreshToken) -> Result<(), StoreError>;

    async fn find_refresh_token(&self, token: &str) -> Result<Option<RefreshToken>, StoreError>;

    /// Revocation only; redemption never deletes a refresh token.
    async fn delete_refresh_token(&self, token: &str) -> Result<bool, StoreError>;

    /// Remove every code and token whose expiry lies before `now`.
    async fn delete_expired(&self, now: OffsetDateTime) -> Result<SweepReport, StoreError>;
}
