//! OAuth2 HTTP endpoints.
//!
//! Implements the OAuth2 authorization server endpoints:
//! - Authorization endpoint and consent decision
//! - Token endpoint
//! - Token revocation
//! - Token, user and client info
//! - Authorization server metadata

use crate::error::{ErrorResponse, OAuth2Error};
use crate::oauth2::authenticate::{
    BearerToken, ClientCredentials, authenticate_client, authenticate_user, basic_credentials,
    live_token,
};
use crate::oauth2::code::{ApprovalContext, AuthorizationRequest, CodeIssuer};
use crate::oauth2::grant::{TokenRequest, dispatch};
use crate::oauth2::issuer::TokenResponse;
use crate::oauth2::{OAUTH2_TAG, state::OAuth2State};
use crate::store::User;
use axum::{
    Form, Json,
    extract::{
        Query, State,
        rejection::{FormRejection, QueryRejection},
    },
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Redirect, Response},
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use utoipa_axum::{router::OpenApiRouter, routes};

/// Creates the router mounted under `/oauth2`.
pub fn router(state: OAuth2State) -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(authorize, authorize_decision))
        .routes(routes!(token))
        .routes(routes!(revoke))
        .routes(routes!(tokeninfo))
        .routes(routes!(userinfo))
        .routes(routes!(clientinfo))
        .with_state(state)
}

/// Creates the router for the root-level discovery document.
pub fn well_known_router(state: OAuth2State) -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(authorization_server_metadata))
        .with_state(state)
}

// =============================================================================
// Request/Response Types
// =============================================================================

/// Shown to the resource owner when an untrusted client asks for a code.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ConsentPrompt {
    pub client_id: String,
    pub client_name: String,
    pub redirect_uri: String,
    pub scope: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// The authenticated resource owner
    pub username: String,
}

/// Form body of `POST /oauth2/authorize`.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct AuthorizationDecision {
    pub client_id: Option<String>,
    pub redirect_uri: Option<String>,
    pub response_type: Option<String>,
    pub scope: Option<String>,
    pub state: Option<String>,
    /// "approve" grants the request; any other value denies it
    pub decision: Option<String>,
}

impl AuthorizationDecision {
    fn approved(&self) -> bool {
        self.decision.as_deref() == Some("approve")
    }

    fn request(&self) -> AuthorizationRequest {
        AuthorizationRequest {
            client_id: self.client_id.clone(),
            redirect_uri: self.redirect_uri.clone(),
            response_type: self.response_type.clone(),
            scope: self.scope.clone(),
            state: self.state.clone(),
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct RevokeRequest {
    pub token: Option<String>,
    /// "access_token" or "refresh_token"; other values are ignored
    pub token_type_hint: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TokenInfoQuery {
    pub access_token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TokenInfo {
    /// Absent for tokens issued to a client on its own behalf
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub client_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Seconds until the token expires
    pub expires_in: i64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UserInfo {
    pub user_id: String,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ClientInfo {
    pub client_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// RFC 8414 authorization server metadata.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AuthorizationServerMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub revocation_endpoint: String,
    pub userinfo_endpoint: String,
    pub response_types_supported: Vec<String>,
    pub grant_types_supported: Vec<String>,
    pub token_endpoint_auth_methods_supported: Vec<String>,
    pub revocation_endpoint_auth_methods_supported: Vec<String>,
}

// =============================================================================
// Endpoints
// =============================================================================

/// OAuth2 Authorization endpoint.
///
/// The resource owner authenticates with HTTP Basic credentials. Trusted
/// clients get a code straight away; untrusted ones get a consent prompt.
#[tracing::instrument(skip_all)]
#[utoipa::path(
    get,
    path = "/authorize",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Authorize",
    summary = "Start the authorization code flow",
    description = "Validates the authorization request, then authenticates the resource owner via HTTP Basic.\n\n\
                   - Trusted clients: the code is issued immediately and the user-agent is redirected to \
                   `redirect_uri?code=...&state=...`.\n\
                   - Untrusted clients: a consent prompt is returned; submit the decision to `POST /oauth2/authorize`.",
    params(AuthorizationRequest),
    security(("basic_auth" = [])),
    responses(
        (status = 200, description = "Consent required", body = ConsentPrompt),
        (status = 303, description = "Redirect back to the client with an authorization code"),
        (status = 400, description = "Missing or inconsistent parameters", body = ErrorResponse),
        (status = 401, description = "Resource owner authentication failed", body = ErrorResponse),
        (status = 403, description = "Unknown client", body = ErrorResponse),
        (status = 501, description = "Unsupported response_type", body = ErrorResponse),
    )
)]
pub async fn authorize(
    State(state): State<OAuth2State>,
    headers: HeaderMap,
    query: Result<Query<AuthorizationRequest>, QueryRejection>,
) -> Result<Response, OAuth2Error> {
    let Query(params) = query?;
    let issuer = CodeIssuer::new(&state);
    let validated = issuer.validate(&params).await?;
    let owner = authenticate_owner(&state, &headers).await?;

    if validated.client.trusted {
        let redirect = issuer
            .issue(
                validated,
                ApprovalContext {
                    user_id: owner.id,
                    approved: true,
                },
            )
            .await?;
        return Ok(Redirect::to(redirect.as_str()).into_response());
    }

    Ok(Json(ConsentPrompt {
        client_id: validated.client.id,
        client_name: validated.client.name,
        redirect_uri: validated.redirect_uri,
        scope: validated.scope,
        state: validated.state,
        username: owner.username,
    })
    .into_response())
}

/// OAuth2 Authorization decision endpoint.
#[tracing::instrument(skip_all)]
#[utoipa::path(
    post,
    path = "/authorize",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Authorize Decision",
    summary = "Approve or deny an authorization request",
    description = "Re-validates the authorization request and records the resource owner's decision. \
                   `decision=approve` issues a code; any other value redirects with `error=access_denied`.",
    request_body(
        content = AuthorizationDecision,
        content_type = "application/x-www-form-urlencoded",
    ),
    security(("basic_auth" = [])),
    responses(
        (status = 303, description = "Redirect back to the client with a code or an error"),
        (status = 400, description = "Missing or inconsistent parameters", body = ErrorResponse),
        (status = 401, description = "Resource owner authentication failed", body = ErrorResponse),
        (status = 403, description = "Unknown client", body = ErrorResponse),
        (status = 501, description = "Unsupported response_type", body = ErrorResponse),
    )
)]
pub async fn authorize_decision(
    State(state): State<OAuth2State>,
    headers: HeaderMap,
    form: Result<Form<AuthorizationDecision>, FormRejection>,
) -> Result<Response, OAuth2Error> {
    let Form(params) = form?;
    let issuer = CodeIssuer::new(&state);
    let validated = issuer.validate(&params.request()).await?;
    let owner = authenticate_owner(&state, &headers).await?;

    if !params.approved() {
        tracing::info!(client_id = %validated.client.id, "Resource owner denied access");
        return Ok(error_redirect(
            &validated.redirect_uri,
            validated.state.as_deref(),
            &OAuth2Error::AccessDenied,
        ));
    }

    let redirect = issuer
        .issue(
            validated,
            ApprovalContext {
                user_id: owner.id,
                approved: true,
            },
        )
        .await?;
    Ok(Redirect::to(redirect.as_str()).into_response())
}

/// OAuth2 Token endpoint.
#[tracing::instrument(skip_all)]
#[utoipa::path(
    post,
    path = "/token",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Token",
    summary = "Exchange a grant for an access token",
    description = "**Supported grant types:**\n\
                   - `authorization_code`: requires `code` and `redirect_uri`\n\
                   - `password`: requires `username` and `password`; trusted clients only\n\
                   - `client_credentials`: the token represents the client itself\n\
                   - `refresh_token`: requires `refresh_token`; the refresh token stays valid\n\n\
                   **Client authentication:** HTTP Basic, or `client_id` and `client_secret` in the body.\n\n\
                   A `refresh_token` is returned when the granted scope contains `offline_access` \
                   on the `authorization_code` and `password` grants.",
    request_body(
        content = TokenRequest,
        content_type = "application/x-www-form-urlencoded",
        description = "Token request parameters"
    ),
    security((), ("basic_auth" = [])),
    responses(
        (status = 200, description = "Token issued", body = TokenResponse),
        (status = 400, description = "Invalid request, grant or grant type", body = ErrorResponse),
        (status = 401, description = "Client or resource owner authentication failed", body = ErrorResponse),
        (status = 403, description = "Client may not use this grant", body = ErrorResponse),
    )
)]
pub async fn token(
    State(state): State<OAuth2State>,
    headers: HeaderMap,
    form: Result<Form<TokenRequest>, FormRejection>,
) -> Result<Response, OAuth2Error> {
    let Form(params) = form?;
    let credentials = ClientCredentials::from_request(
        &headers,
        params.client_id.as_deref(),
        params.client_secret.as_deref(),
    );
    let issued = dispatch(&state, credentials, &params).await?;

    Ok((
        StatusCode::OK,
        [(header::CACHE_CONTROL, "no-store")],
        Json(TokenResponse::from(issued)),
    )
        .into_response())
}

/// Token revocation endpoint (RFC 7009).
///
/// Only tokens issued to the authenticated client are removed.
#[tracing::instrument(skip_all)]
#[utoipa::path(
    post,
    path = "/revoke",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Revoke Token",
    summary = "Revoke an access or refresh token",
    description = "Deletes an access token or refresh token that belongs to the authenticated client.\n\n\
                   Returns 200 OK even if the token was already revoked or doesn't exist (per RFC 7009). \
                   `token_type_hint` selects which kind is tried first.",
    request_body(
        content = RevokeRequest,
        content_type = "application/x-www-form-urlencoded",
        description = "Token revocation request"
    ),
    security((), ("basic_auth" = [])),
    responses(
        (status = 200, description = "Token revoked (or was already invalid)"),
        (status = 400, description = "Missing token parameter", body = ErrorResponse),
        (status = 401, description = "Client authentication failed", body = ErrorResponse),
    )
)]
pub async fn revoke(
    State(state): State<OAuth2State>,
    headers: HeaderMap,
    form: Result<Form<RevokeRequest>, FormRejection>,
) -> Result<StatusCode, OAuth2Error> {
    let Form(params) = form?;
    let credentials = ClientCredentials::from_request(
        &headers,
        params.client_id.as_deref(),
        params.client_secret.as_deref(),
    )
    .ok_or(OAuth2Error::InvalidClient)?;
    let client = authenticate_client(state.store.as_ref(), &credentials).await?;

    let token = params
        .token
        .as_deref()
        .filter(|t| !t.is_empty())
        .ok_or_else(|| OAuth2Error::invalid_request("token is required"))?;

    let revoked = if params.token_type_hint.as_deref() == Some("refresh_token") {
        revoke_refresh_token(&state, &client.id, token).await?
            || revoke_access_token(&state, &client.id, token).await?
    } else {
        revoke_access_token(&state, &client.id, token).await?
            || revoke_refresh_token(&state, &client.id, token).await?
    };
    tracing::info!(client_id = %client.id, revoked, "Processed revocation request");

    Ok(StatusCode::OK)
}

/// Token introspection for resource servers.
#[tracing::instrument(skip_all)]
#[utoipa::path(
    get,
    path = "/tokeninfo",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Token Info",
    summary = "Describe an access token",
    description = "Returns the owner, client, scope and remaining lifetime of an access token. \
                   Expired tokens are deleted and rejected. Tokens from the `client_credentials` grant \
                   carry no `user_id`.",
    params(TokenInfoQuery),
    responses(
        (status = 200, description = "Token details", body = TokenInfo),
        (status = 400, description = "Missing access_token parameter", body = ErrorResponse),
        (status = 401, description = "Unknown or expired token", body = ErrorResponse),
    )
)]
pub async fn tokeninfo(
    State(state): State<OAuth2State>,
    query: Result<Query<TokenInfoQuery>, QueryRejection>,
) -> Result<Json<TokenInfo>, OAuth2Error> {
    let Query(params) = query?;
    let access_token = params
        .access_token
        .as_deref()
        .filter(|t| !t.is_empty())
        .ok_or_else(|| OAuth2Error::invalid_request("access_token is required"))?;
    let token = live_token(state.store.as_ref(), access_token).await?;

    Ok(Json(TokenInfo {
        expires_in: token.expires_in(),
        scope: non_empty(token.scope),
        user_id: token.user_id,
        client_id: token.client_id,
    }))
}

/// Profile of the resource owner behind a bearer token.
#[tracing::instrument(skip_all)]
#[utoipa::path(
    get,
    path = "/userinfo",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 UserInfo",
    summary = "Get the resource owner behind the access token",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Resource owner", body = UserInfo),
        (status = 401, description = "Missing, invalid or client-only access token", body = ErrorResponse),
    )
)]
pub async fn userinfo(
    State(state): State<OAuth2State>,
    BearerToken(token): BearerToken,
) -> Result<Json<UserInfo>, OAuth2Error> {
    let user_id = token
        .user_id
        .as_deref()
        .ok_or_else(|| OAuth2Error::invalid_token("Token is not bound to a user"))?;
    let user = state
        .store
        .find_user_by_id(user_id)
        .await?
        .ok_or_else(|| OAuth2Error::invalid_token("User no longer exists"))?;

    Ok(Json(UserInfo {
        user_id: user.id,
        username: user.username,
        scope: non_empty(token.scope),
    }))
}

/// Client that a bearer token was issued to.
#[tracing::instrument(skip_all)]
#[utoipa::path(
    get,
    path = "/clientinfo",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 ClientInfo",
    summary = "Get the client behind the access token",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Client", body = ClientInfo),
        (status = 401, description = "Missing or invalid access token", body = ErrorResponse),
    )
)]
pub async fn clientinfo(
    State(state): State<OAuth2State>,
    BearerToken(token): BearerToken,
) -> Result<Json<ClientInfo>, OAuth2Error> {
    let client = state
        .store
        .find_client(&token.client_id)
        .await?
        .ok_or_else(|| OAuth2Error::invalid_token("Client no longer exists"))?;

    Ok(Json(ClientInfo {
        client_id: client.id,
        name: client.name,
        scope: non_empty(token.scope),
    }))
}

/// Authorization server metadata (RFC 8414).
#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/.well-known/oauth-authorization-server",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Server Metadata",
    summary = "Authorization server metadata document",
    responses(
        (status = 200, description = "Metadata document", body = AuthorizationServerMetadata),
    )
)]
pub async fn authorization_server_metadata(
    State(state): State<OAuth2State>,
) -> Json<AuthorizationServerMetadata> {
    let auth_methods = vec![
        "client_secret_basic".to_string(),
        "client_secret_post".to_string(),
    ];
    Json(AuthorizationServerMetadata {
        issuer: state.issuer_url.clone(),
        authorization_endpoint: format!("{}/oauth2/authorize", state.issuer_url),
        token_endpoint: format!("{}/oauth2/token", state.issuer_url),
        revocation_endpoint: format!("{}/oauth2/revoke", state.issuer_url),
        userinfo_endpoint: format!("{}/oauth2/userinfo", state.issuer_url),
        response_types_supported: vec!["code".to_string()],
        grant_types_supported: vec![
            "authorization_code".to_string(),
            "password".to_string(),
            "client_credentials".to_string(),
            "refresh_token".to_string(),
        ],
        token_endpoint_auth_methods_supported: auth_methods.clone(),
        revocation_endpoint_auth_methods_supported: auth_methods,
    })
}

// =============================================================================
// Helper Functions
// =============================================================================

async fn authenticate_owner(state: &OAuth2State, headers: &HeaderMap) -> Result<User, OAuth2Error> {
    let (username, password) =
        basic_credentials(headers).ok_or(OAuth2Error::InvalidCredentials)?;
    authenticate_user(state.store.as_ref(), &username, &password).await
}

async fn revoke_access_token(
    state: &OAuth2State,
    client_id: &str,
    token: &str,
) -> Result<bool, OAuth2Error> {
    match state.store.find_token(token).await? {
        Some(found) if found.client_id == client_id => {
            Ok(state.store.find_and_delete_token(token).await?.is_some())
        }
        _ => Ok(false),
    }
}

async fn revoke_refresh_token(
    state: &OAuth2State,
    client_id: &str,
    token: &str,
) -> Result<bool, OAuth2Error> {
    match state.store.find_refresh_token(token).await? {
        Some(found) if found.client_id == client_id => {
            Ok(state.store.delete_refresh_token(token).await?)
        }
        _ => Ok(false),
    }
}

fn non_empty(scope: String) -> Option<String> {
    (!scope.is_empty()).then_some(scope)
}

/// Send the user-agent back to the client with an error. The URI was already
/// validated, so a parse failure falls back to a JSON error.
fn error_redirect(redirect_uri: &str, state: Option<&str>, error: &OAuth2Error) -> Response {
    let mut redirect_url = match url::Url::parse(redirect_uri) {
        Ok(u) => u,
        Err(_) => {
            return (error.status(), Json(ErrorResponse::from(error))).into_response();
        }
    };

    redirect_url
        .query_pairs_mut()
        .append_pair("error", error.code());
    if let Some(s) = state {
        redirect_url.query_pairs_mut().append_pair("state", s);
    }

    Redirect::to(redirect_url.as_str()).into_response()
}
