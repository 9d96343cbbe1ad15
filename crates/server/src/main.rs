use oauth2_grant_server::AppResources;
use oauth2_grant_server::api::start_webserver;
use oauth2_grant_server::config::load_config_or_panic;
use oauth2_grant_server::store::{DbStore, spawn_expiry_sweep};
use sea_orm::Database;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn initialize_standard_tracing() {
    let default_directives = "oauth2_grant_server=info,tower_http=info,sea_orm=warn";
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));

    let registry = tracing_subscriber::registry().with(env_filter);
    let layer = fmt::layer().with_target(true).with_level(true);

    registry.with(layer).init();
}

#[tokio::main]
async fn main() -> color_eyre::eyre::Result<()> {
    color_eyre::install()?;
    initialize_standard_tracing();

    let config = Arc::new(load_config_or_panic());

    let db = Arc::new(Database::connect(&config.database_url).await?);
    let store = Arc::new(DbStore::new(db));

    spawn_expiry_sweep(
        store.clone(),
        Duration::from_secs(config.oauth2.sweep_interval),
    );
    tracing::info!(
        issuer = %config.oauth2.issuer_url,
        access_token_lifetime = config.oauth2.access_token_lifetime,
        sweep_interval = config.oauth2.sweep_interval,
        "oauth2 configuration"
    );

    start_webserver(AppResources { store, config }).await?;
    Ok(())
}
