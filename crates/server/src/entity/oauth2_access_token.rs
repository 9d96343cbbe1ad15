//! OAuth2 Access Token entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "oauth2_access_token")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub token: String,
    /// Absent for tokens minted by the client_credentials grant
    pub user_id: Option<String>,
    pub client_id: String,
    pub expiration_date: OffsetDateTime,
    pub scope: String,
    pub created_at: OffsetDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Check if the access token has expired
    pub fn is_expired(&self) -> bool {
        self.expiration_date < OffsetDateTime::now_utc()
    }

    /// Whole seconds until expiry, floored at zero
    pub fn expires_in(&self) -> i64 {
        (self.expiration_date - OffsetDateTime::now_utc())
            .whole_seconds()
            .max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    fn token(expires_in: Duration) -> Model {
        let now = OffsetDateTime::now_utc();
        Model {
            token: "t".into(),
            user_id: None,
            client_id: "c".into(),
            expiration_date: now + expires_in,
            scope: String::new(),
            created_at: now,
        }
    }

    #[test]
    fn expiry_is_evaluated_against_now() {
        assert!(!token(Duration::minutes(5)).is_expired());
        assert!(token(Duration::seconds(-1)).is_expired());
        assert_eq!(token(Duration::seconds(-30)).expires_in(), 0);
        assert!(token(Duration::minutes(5)).expires_in() > 290);
    }
}
