//! HTTP surface of the authorization server.
//!
//! - `auth` - Basic and Bearer extractors
//! - `accounts` - User and client administration (/api/*)
//! - `health` - Health check endpoint (/healthz)
//! - `openapi` - OpenAPI/Utoipa configuration
//!
//! The OAuth2 endpoints themselves live in [`crate::oauth2`].

pub mod accounts;
pub mod auth;
pub mod health;
pub mod openapi;

pub use accounts::ACCOUNTS_TAG;
pub use health::MISC_TAG;

use crate::AppResources;
use crate::oauth2::{self, OAuth2State};
use axum::Router;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_axum::{router::OpenApiRouter, routes};
use utoipa_redoc::{Redoc, Servable};

/// Assemble every route, the shared resources and the trace layer.
pub fn build_router(app_resources: AppResources) -> Router {
    let oauth2_state = OAuth2State::new(app_resources.store.clone(), &app_resources.config.oauth2);

    let (router, api) = OpenApiRouter::with_openapi(openapi::ApiDoc::openapi())
        .nest("/oauth2", oauth2::router(oauth2_state.clone()))
        .merge(oauth2::well_known_router(oauth2_state))
        .nest("/api", accounts::router())
        .routes(routes!(health::health))
        .layer(axum::Extension(app_resources))
        .layer(TraceLayer::new_for_http())
        .split_for_parts();

    router.merge(Redoc::with_url("/api-docs", api))
}

/// Starts the web server with all configured routes.
#[tracing::instrument(skip(app_resources))]
pub async fn start_webserver(app_resources: AppResources) -> color_eyre::Result<()> {
    let addr = app_resources.config.listen_addr.clone();
    let router = build_router(app_resources);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "Server running");
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await
    .map_err(|e| color_eyre::Report::msg(format!("Failed to start server: {e}")))?;

    Ok(())
}
