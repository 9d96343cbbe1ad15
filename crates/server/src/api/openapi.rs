//! OpenAPI/Utoipa configuration.

use crate::api::{accounts::ACCOUNTS_TAG, health::MISC_TAG};
use crate::oauth2::OAUTH2_TAG;
use utoipa::{
    Modify, OpenApi,
    openapi::security::{
        AuthorizationCode, ClientCredentials, Flow, HttpAuthScheme, HttpBuilder, OAuth2, Password,
        Scopes, SecurityScheme,
    },
};

/// Security addon for OpenAPI documentation.
pub struct SecurityAddon;

impl Modify for SecurityAddon {
    #[tracing::instrument(skip(self, openapi))]
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            let basic = HttpBuilder::new()
                .scheme(HttpAuthScheme::Basic)
                .description(Some(
                    "Client id and secret on the token and revocation endpoints; \
                     resource owner username and password elsewhere.",
                ))
                .build();
            components.add_security_scheme("basic_auth", SecurityScheme::Http(basic));

            let bearer = HttpBuilder::new()
                .scheme(HttpAuthScheme::Bearer)
                .description(Some("Access token issued by `/oauth2/token`."))
                .build();
            components.add_security_scheme("bearer_auth", SecurityScheme::Http(bearer));

            let scopes = || {
                Scopes::from_iter([("offline_access", "Also issue a multi-use refresh token")])
            };
            let oauth2 = OAuth2::new([
                Flow::AuthorizationCode(AuthorizationCode::new(
                    "/oauth2/authorize",
                    "/oauth2/token",
                    scopes(),
                )),
                Flow::Password(Password::new("/oauth2/token", scopes())),
                Flow::ClientCredentials(ClientCredentials::new("/oauth2/token", scopes())),
            ]);
            components.add_security_scheme("OAuth2", SecurityScheme::OAuth2(oauth2));
        }
    }
}

/// OpenAPI documentation configuration.
#[derive(OpenApi)]
#[openapi(
    modifiers(&SecurityAddon),
    info(
        title = "OAuth2 Grant Server API",
        version = "1.0.0",
        description = "Issues, introspects and revokes OAuth2 authorization codes, access tokens and refresh tokens."
    ),
    tags(
        (name = MISC_TAG, description = "Miscellaneous endpoints"),
        (name = OAUTH2_TAG, description = "OAuth2 authorization server endpoints"),
        (name = ACCOUNTS_TAG, description = "Resource owner and client administration")
    )
)]
pub struct ApiDoc;
