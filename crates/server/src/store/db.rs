//! SeaORM-backed credential store (Postgres or SQLite).

use super::{
    AccessToken, AuthorizationCode, Client, CredentialStore, RefreshToken, SweepReport, User,
};
use crate::entity::{
    oauth2_access_token, oauth2_authorization_code, oauth2_client, oauth2_refresh_token,
    oauth2_user,
};
use crate::error::StoreError;
use async_trait::async_trait;
use sea_orm::{
    ActiveValue::Set, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QueryOrder, SqlErr,
};
use std::sync::Arc;
use time::OffsetDateTime;

#[derive(Clone)]
pub struct DbStore {
    db: Arc<DatabaseConnection>,
}

impl DbStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

fn insert_error(err: DbErr, what: impl Into<String>) -> StoreError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => StoreError::Conflict(what.into()),
        _ => StoreError::Database(err),
    }
}

#[async_trait]
impl CredentialStore for DbStore {
    async fn find_client(&self, id: &str) -> Result<Option<Client>, StoreError> {
        Ok(oauth2_client::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?)
    }

    async fn create_client(&self, client: Client) -> Result<(), StoreError> {
        let id = client.id.clone();
        let active = oauth2_client::ActiveModel {
            id: Set(client.id),
            name: Set(client.name),
            secret: Set(client.secret),
            trusted: Set(client.trusted),
            redirect_uri: Set(client.redirect_uri),
            created_at: Set(client.created_at),
        };
        oauth2_client::Entity::insert(active)
            .exec_without_returning(self.db.as_ref())
            .await
            .map_err(|e| insert_error(e, format!("client {id}")))?;
        Ok(())
    }

    async fn list_clients(&self) -> Result<Vec<Client>, StoreError> {
        Ok(oauth2_client::Entity::find()
            .order_by_asc(oauth2_client::Column::Name)
            .all(self.db.as_ref())
            .await?)
    }

    async fn find_user(&self, username: &str) -> Result<Option<User>, StoreError> {
        Ok(oauth2_user::Entity::find()
            .filter(oauth2_user::Column::Username.eq(username))
            .one(self.db.as_ref())
            .await?)
    }

    async fn find_user_by_id(&self, id: &str) -> Result<Option<User>, StoreError> {
        Ok(oauth2_user::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?)
    }

    async fn create_user(&self, user: User) -> Result<(), StoreError> {
        let username = user.username.clone();
        let active = oauth2_user::ActiveModel {
            id: Set(user.id),
            username: Set(user.username),
            password: Set(user.password),
            created_at: Set(user.created_at),
        };
        oauth2_user::Entity::insert(active)
            .exec_without_returning(self.db.as_ref())
            .await
            .map_err(|e| insert_error(e, format!("user {username}")))?;
        Ok(())
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        Ok(oauth2_user::Entity::find()
            .order_by_asc(oauth2_user::Column::Username)
            .all(self.db.as_ref())
            .await?)
    }

    async fn create_code(&self, code: AuthorizationCode) -> Result<(), StoreError> {
        let active = oauth2_authorization_code::ActiveModel {
            code: Set(code.code),
            client_id: Set(code.client_id),
            redirect_uri: Set(code.redirect_uri),
            user_id: Set(code.user_id),
            scope: Set(code.scope),
            expires_at: Set(code.expires_at),
            created_at: Set(code.created_at),
        };
        oauth2_authorization_code::Entity::insert(active)
            .exec_without_returning(self.db.as_ref())
            .await
            .map_err(|e| insert_error(e, "authorization code"))?;
        Ok(())
    }

    async fn take_code(&self, code: &str) -> Result<Option<AuthorizationCode>, StoreError> {
        let Some(found) = oauth2_authorization_code::Entity::find_by_id(code)
            .one(self.db.as_ref())
            .await?
        else {
            return Ok(None);
        };

        // Only the caller whose DELETE removes the row owns the code.
        let deleted = oauth2_authorization_code::Entity::delete_by_id(code)
            .exec(self.db.as_ref())
            .await?;
        if deleted.rows_affected == 1 {
            Ok(Some(found))
        } else {
            Ok(None)
        }
    }

    async fn create_token(&self, token: AccessToken) -> Result<(), StoreError> {
        let active = oauth2_access_token::ActiveModel {
            token: Set(token.token),
            user_id: Set(token.user_id),
            client_id: Set(token.client_id),
            expiration_date: Set(token.expiration_date),
            scope: Set(token.scope),
            created_at: Set(token.created_at),
        };
        oauth2_access_token::Entity::insert(active)
            .exec_without_returning(self.db.as_ref())
            .await
            .map_err(|e| insert_error(e, "access token"))?;
        Ok(())
    }

    async fn find_token(&self, token: &str) -> Result<Option<AccessToken>, StoreError> {
        Ok(oauth2_access_token::Entity::find_by_id(token)
            .one(self.db.as_ref())
            .await?)
    }

    async fn find_and_delete_token(
        &self,
        token: &str,
    ) -> Result<Option<AccessToken>, StoreError> {
        let Some(found) = self.find_token(token).await? else {
            return Ok(None);
        };
        let deleted = oauth2_access_token::Entity::delete_by_id(token)
            .exec(self.db.as_ref())
            .await?;
        Ok((deleted.rows_affected == 1).then_some(found))
    }

    async fn create_refresh_token(&self, token: RefreshToken) -> Result<(), StoreError> {
        let active = oauth2_refresh_token::ActiveModel {
            refresh_token: Set(token.refresh_token),
            user_id: Set(token.user_id),
            client_id: Set(token.client_id),
            scope: Set(token.scope),
            expires_at: Set(token.expires_at),
            created_at: Set(token.created_at),
        };
        oauth2_refresh_token::Entity::insert(active)
            .exec_without_returning(self.db.as_ref())
            .await
            .map_err(|e| insert_error(e, "refresh token"))?;
        Ok(())
    }

    async fn find_refresh_token(&self, token: &str) -> Result<Option<RefreshToken>, StoreError> {
        Ok(oauth2_refresh_token::Entity::find_by_id(token)
            .one(self.db.as_ref())
            .await?)
    }

    async fn delete_refresh_token(&self, token: &str) -> Result<bool, StoreError> {
        let deleted = oauth2_refresh_token::Entity::delete_by_id(token)
            .exec(self.db.as_ref())
            .await?;
        Ok(deleted.rows_affected > 0)
    }

    async fn delete_expired(&self, now: OffsetDateTime) -> Result<SweepReport, StoreError> {
        let codes = oauth2_authorization_code::Entity::delete_many()
            .filter(oauth2_authorization_code::Column::ExpiresAt.lt(now))
            .exec(self.db.as_ref())
            .await?
            .rows_affected;
        let access_tokens = oauth2_access_token::Entity::delete_many()
            .filter(oauth2_access_token::Column::ExpirationDate.lt(now))
            .exec(self.db.as_ref())
            .await?
            .rows_affected;
        let refresh_tokens = oauth2_refresh_token::Entity::delete_many()
            .filter(oauth2_refresh_token::Column::ExpiresAt.lt(now))
            .exec(self.db.as_ref())
            .await?
            .rows_affected;

        Ok(SweepReport {
            codes,
            access_tokens,
            refresh_tokens,
        })
    }
}
