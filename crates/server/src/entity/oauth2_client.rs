//! OAuth2 Client entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "oauth2_client")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    /// Human-readable client name
    #[sea_orm(unique)]
    pub name: String,
    pub secret: String,
    /// Trusted clients may use the password grant and skip the consent prompt
    pub trusted: bool,
    /// Registered redirect URI. When unset any absolute URL is accepted.
    pub redirect_uri: Option<String>,
    pub created_at: OffsetDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Check the presented secret against the stored one.
    pub fn secret_matches(&self, presented: &str) -> bool {
        self.secret == presented
    }

    /// Check if a redirect URI is consistent with the registration
    pub fn is_redirect_uri_allowed(&self, uri: &str) -> bool {
        match &self.redirect_uri {
            Some(registered) => registered == uri,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(redirect_uri: Option<&str>) -> Model {
        Model {
            id: "abc123".into(),
            name: "Samplr".into(),
            secret: "ssh-secret".into(),
            trusted: false,
            redirect_uri: redirect_uri.map(String::from),
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn registered_redirect_must_match_exactly() {
        let c = client(Some("https://localhost:3000/cb"));
        assert!(c.is_redirect_uri_allowed("https://localhost:3000/cb"));
        assert!(!c.is_redirect_uri_allowed("https://localhost:3000/cb/"));
        assert!(!c.is_redirect_uri_allowed("https://evil.example/cb"));
    }

    #[test]
    fn unregistered_redirect_accepts_anything() {
        assert!(client(None).is_redirect_uri_allowed("https://app.example/cb"));
    }

    #[test]
    fn secret_comparison() {
        let c = client(None);
        assert!(c.secret_matches("ssh-secret"));
        assert!(!c.secret_matches("ssh-secret "));
        assert!(!c.secret_matches(""));
    }
}
