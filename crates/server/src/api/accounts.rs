//! Account administration endpoints (/api/users, /api/clients).

use crate::AppResources;
use crate::api::auth::{ApiError, ResourceOwner};
use crate::error::ErrorResponse;
use crate::oauth2::hash_password;
use crate::store::{Client, User};
use axum::{Extension, Json, http::StatusCode};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

pub const ACCOUNTS_TAG: &str = "Accounts";

pub fn router() -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(create_user, list_users))
        .routes(routes!(create_client, list_clients))
}

#[derive(Deserialize, ToSchema)]
pub struct NewUser {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UserSummary {
    pub id: String,
    pub username: String,
}

impl From<User> for UserSummary {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct NewClient {
    pub id: String,
    pub name: String,
    pub secret: String,
    #[serde(default)]
    pub trusted: bool,
    pub redirect_uri: Option<String>,
}

/// A registered client, without its secret.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ClientSummary {
    pub id: String,
    pub name: String,
    pub trusted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,
}

impl From<Client> for ClientSummary {
    fn from(client: Client) -> Self {
        Self {
            id: client.id,
            name: client.name,
            trusted: client.trusted,
            redirect_uri: client.redirect_uri,
        }
    }
}

/// Register a resource owner.
#[tracing::instrument(skip_all, fields(username = %body.username))]
#[utoipa::path(
    post,
    path = "/users",
    tag = ACCOUNTS_TAG,
    operation_id = "Create User",
    summary = "Register a resource owner",
    request_body = NewUser,
    responses(
        (status = 201, description = "User created", body = UserSummary),
        (status = 400, description = "Empty username or password", body = ApiError),
        (status = 409, description = "Username already taken", body = ApiError),
    )
)]
pub async fn create_user(
    Extension(resources): Extension<AppResources>,
    Json(body): Json<NewUser>,
) -> Result<(StatusCode, Json<UserSummary>), ApiError> {
    if body.username.trim().is_empty() || body.password.is_empty() {
        return Err(ApiError::bad_request("username and password are required"));
    }

    let password = hash_password(&body.password).map_err(|e| {
        tracing::error!("Failed to hash password: {}", e);
        ApiError::server_error()
    })?;
    let user = User {
        id: uuid::Uuid::new_v4().to_string(),
        username: body.username,
        password,
        created_at: OffsetDateTime::now_utc(),
    };
    resources.store.create_user(user.clone()).await?;
    tracing::info!(user_id = %user.id, "Registered user");

    Ok((StatusCode::CREATED, Json(user.into())))
}

/// List resource owners.
#[tracing::instrument(skip_all)]
#[utoipa::path(
    get,
    path = "/users",
    tag = ACCOUNTS_TAG,
    operation_id = "List Users",
    summary = "List resource owners",
    security(("basic_auth" = [])),
    responses(
        (status = 200, description = "Registered users", body = Vec<UserSummary>),
        (status = 401, description = "Resource owner authentication failed", body = ErrorResponse),
    )
)]
pub async fn list_users(
    Extension(resources): Extension<AppResources>,
    ResourceOwner(_owner): ResourceOwner,
) -> Result<Json<Vec<UserSummary>>, ApiError> {
    let users = resources.store.list_users().await?;
    Ok(Json(users.into_iter().map(UserSummary::from).collect()))
}

/// Register a client application.
#[tracing::instrument(skip_all, fields(client_id = %body.id))]
#[utoipa::path(
    post,
    path = "/clients",
    tag = ACCOUNTS_TAG,
    operation_id = "Create Client",
    summary = "Register a client application",
    request_body = NewClient,
    security(("basic_auth" = [])),
    responses(
        (status = 201, description = "Client created", body = ClientSummary),
        (status = 400, description = "Invalid client registration", body = ApiError),
        (status = 401, description = "Resource owner authentication failed", body = ErrorResponse),
        (status = 409, description = "Client id or name already taken", body = ApiError),
    )
)]
pub async fn create_client(
    Extension(resources): Extension<AppResources>,
    ResourceOwner(owner): ResourceOwner,
    Json(body): Json<NewClient>,
) -> Result<(StatusCode, Json<ClientSummary>), ApiError> {
    if body.id.trim().is_empty() || body.name.trim().is_empty() || body.secret.is_empty() {
        return Err(ApiError::bad_request("id, name and secret are required"));
    }
    if let Some(uri) = &body.redirect_uri
        && url::Url::parse(uri).is_err()
    {
        return Err(ApiError::bad_request("redirect_uri must be an absolute URL"));
    }

    let client = Client {
        id: body.id,
        name: body.name,
        secret: body.secret,
        trusted: body.trusted,
        redirect_uri: body.redirect_uri,
        created_at: OffsetDateTime::now_utc(),
    };
    resources.store.create_client(client.clone()).await?;
    tracing::info!(registered_by = %owner.username, trusted = client.trusted, "Registered client");

    Ok((StatusCode::CREATED, Json(client.into())))
}

/// List client applications.
#[tracing::instrument(skip_all)]
#[utoipa::path(
    get,
    path = "/clients",
    tag = ACCOUNTS_TAG,
    operation_id = "List Clients",
    summary = "List client applications",
    security(("basic_auth" = [])),
    responses(
        (status = 200, description = "Registered clients", body = Vec<ClientSummary>),
        (status = 401, description = "Resource owner authentication failed", body = ErrorResponse),
    )
)]
pub async fn list_clients(
    Extension(resources): Extension<AppResources>,
    ResourceOwner(_owner): ResourceOwner,
) -> Result<Json<Vec<ClientSummary>>, ApiError> {
    let clients = resources.store.list_clients().await?;
    Ok(Json(clients.into_iter().map(ClientSummary::from).collect()))
}
