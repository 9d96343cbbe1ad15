//! OAuth2 authorization server.
//!
//! ## Supported Flows
//!
//! - Authorization Code
//! - Resource Owner Password (trusted clients)
//! - Client Credentials
//! - Refresh Token (multi-use, never rotated)
//!
//! ## Endpoints
//!
//! - `GET /oauth2/authorize` - Authorization endpoint
//! - `POST /oauth2/authorize` - Consent decision
//! - `POST /oauth2/token` - Token endpoint
//! - `POST /oauth2/revoke` - Token revocation
//! - `GET /oauth2/tokeninfo` - Token introspection
//! - `GET /oauth2/userinfo` - Resource owner behind a token
//! - `GET /oauth2/clientinfo` - Client behind a token
//! - `GET /.well-known/oauth-authorization-server` - Server metadata

pub mod authenticate;
pub mod code;
pub mod endpoints;
pub mod grant;
pub mod issuer;
pub mod password;
mod state;

pub use endpoints::{router, well_known_router};
pub use password::{hash_password, verify_password};
pub use state::OAuth2State;

/// OpenAPI tag for OAuth2 endpoints
pub const OAUTH2_TAG: &str = "OAuth2";
