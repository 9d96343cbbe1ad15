//! In-process credential store backed by `DashMap`.
//!
//! Used by tests and by deployments that accept losing credentials on restart.

use super::{
    AccessToken, AuthorizationCode, Client, CredentialStore, RefreshToken, SweepReport, User,
};
use crate::error::StoreError;
use async_trait::async_trait;
use dashmap::{DashMap, mapref::entry::Entry};
use std::sync::Arc;
use time::OffsetDateTime;

#[derive(Clone, Default)]
pub struct MemoryStore {
    clients: Arc<DashMap<String, Client>>,
    /// Client name to id
    client_names: Arc<DashMap<String, String>>,
    /// Keyed by username
    users: Arc<DashMap<String, User>>,
    codes: Arc<DashMap<String, AuthorizationCode>>,
    tokens: Arc<DashMap<String, AccessToken>>,
    refresh_tokens: Arc<DashMap<String, RefreshToken>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn insert_unique<T>(map: &DashMap<String, T>, key: String, value: T) -> Result<(), StoreError> {
    match map.entry(key) {
        Entry::Occupied(e) => Err(StoreError::Conflict(e.key().clone())),
        Entry::Vacant(e) => {
            e.insert(value);
            Ok(())
        }
    }
}

fn sweep<T>(map: &DashMap<String, T>, expired: impl Fn(&T) -> bool) -> u64 {
    let before = map.len();
    map.retain(|_, v| !expired(v));
    (before.saturating_sub(map.len())) as u64
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn find_client(&self, id: &str) -> Result<Option<Client>, StoreError> {
        Ok(self.clients.get(id).map(|c| c.value().clone()))
    }

    async fn create_client(&self, client: Client) -> Result<(), StoreError> {
        // The name slot stays locked until the id insert has either landed or failed
        match self.client_names.entry(client.name.clone()) {
            Entry::Occupied(_) => Err(StoreError::Conflict(format!("client {}", client.name))),
            Entry::Vacant(name) => {
                let id = client.id.clone();
                insert_unique(&self.clients, id.clone(), client)?;
                name.insert(id);
                Ok(())
            }
        }
    }

    async fn list_clients(&self) -> Result<Vec<Client>, StoreError> {
        let mut clients: Vec<Client> = self.clients.iter().map(|c| c.value().clone()).collect();
        clients.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(clients)
    }

    async fn find_user(&self, username: &str) -> Result<Option<User>, StoreError> {
        Ok(self.users.get(username).map(|u| u.value().clone()))
    }

    async fn find_user_by_id(&self, id: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .users
            .iter()
            .find(|u| u.id == id)
            .map(|u| u.value().clone()))
    }

    async fn create_user(&self, user: User) -> Result<(), StoreError> {
        insert_unique(&self.users, user.username.clone(), user)
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let mut users: Vec<User> = self.users.iter().map(|u| u.value().clone()).collect();
        users.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(users)
    }

    async fn create_code(&self, code: AuthorizationCode) -> Result<(), StoreError> {
        insert_unique(&self.codes, code.code.clone(), code)
    }

    async fn take_code(&self, code: &str) -> Result<Option<AuthorizationCode>, StoreError> {
        Ok(self.codes.remove(code).map(|(_, c)| c))
    }

    async fn create_token(&self, token: AccessToken) -> Result<(), StoreError> {
        insert_unique(&self.tokens, token.token.clone(), token)
    }

    async fn find_token(&self, token: &str) -> Result<Option<AccessToken>, StoreError> {
        Ok(self.tokens.get(token).map(|t| t.value().clone()))
    }

    async fn find_and_delete_token(
        &self,
        token: &str,
    ) -> Result<Option<AccessToken>, StoreError> {
        Ok(self.tokens.remove(token).map(|(_, t)| t))
    }

    async fn create_refresh_token(&self, token: RefreshToken) -> Result<(), StoreError> {
        insert_unique(&self.refresh_tokens, token.refresh_token.clone(), token)
    }

    async fn find_refresh_token(&self, token: &str) -> Result<Option<RefreshToken>, StoreError> {
        Ok(self.refresh_tokens.get(token).map(|t| t.value().clone()))
    }

    async fn delete_refresh_token(&self, token: &str) -> Result<bool, StoreError> {
        Ok(self.refresh_tokens.remove(token).is_some())
    }

    async fn delete_expired(&self, now: OffsetDateTime) -> Result<SweepReport, StoreError> {
        Ok(SweepReport {
            codes: sweep(&self.codes, |c| c.expires_at < now),
            access_tokens: sweep(&self.tokens, |t| t.expiration_date < now),
            refresh_tokens: sweep(&self.refresh_tokens, |t| t.expires_at < now),
        })
    }
}
