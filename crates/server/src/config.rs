use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration build error: {0}")]
    Build(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default)]
    pub oauth2: OAuth2Config,
}

/// Lifetimes are in seconds.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct OAuth2Config {
    /// Base URL advertised in the authorization server metadata
    pub issuer_url: String,
    pub access_token_lifetime: i64,
    pub refresh_token_lifetime: i64,
    pub authorization_code_lifetime: i64,
    /// Bytes of OS randomness behind every generated code and token
    pub token_entropy_bytes: usize,
    /// Seconds between expiry sweeps of the credential store
    pub sweep_interval: u64,
}

impl Default for OAuth2Config {
    fn default() -> Self {
        Self {
            issuer_url: "http://localhost:8080".to_string(),
            access_token_lifetime: 3600,            // 1 hour
            refresh_token_lifetime: 86400 * 30,     // 30 days
            authorization_code_lifetime: 600,       // 10 minutes
            token_entropy_bytes: 32,
            sweep_interval: 300,
        }
    }
}

/// Lower bound for `token_entropy_bytes`.
pub const MIN_TOKEN_ENTROPY_BYTES: usize = 16;

/// Upper bound for every lifetime, in seconds (10 years).
pub const MAX_LIFETIME_SECONDS: i64 = 10 * 365 * 86400;

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

impl AppConfig {
    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database_url.trim().is_empty() {
            return Err(ConfigError::Validation(
                "database_url must not be empty".into(),
            ));
        }
        self.oauth2.validate()
    }
}

impl OAuth2Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("oauth2.access_token_lifetime", self.access_token_lifetime),
            ("oauth2.refresh_token_lifetime", self.refresh_token_lifetime),
            (
                "oauth2.authorization_code_lifetime",
                self.authorization_code_lifetime,
            ),
        ] {
            if value <= 0 {
                return Err(ConfigError::Validation(format!("{name} must be > 0")));
            }
            if value > MAX_LIFETIME_SECONDS {
                return Err(ConfigError::Validation(format!(
                    "{name} must be at most {MAX_LIFETIME_SECONDS} seconds"
                )));
            }
        }
        if self.token_entropy_bytes < MIN_TOKEN_ENTROPY_BYTES {
            return Err(ConfigError::Validation(format!(
                "oauth2.token_entropy_bytes must be at least {MIN_TOKEN_ENTROPY_BYTES}"
            )));
        }
        if self.sweep_interval == 0 {
            return Err(ConfigError::Validation(
                "oauth2.sweep_interval must be > 0".into(),
            ));
        }
        Ok(())
    }
}

/// Load application configuration from `config.yaml` + environment overrides.
///
/// Any environment variable matching the key path with double-underscore
/// separators (e.g. `OAUTH2__ACCESS_TOKEN_LIFETIME`) overrides the file value.
///
/// Returns a `ConfigError` instead of panicking so the caller can decide how to fail.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    use config::{Config, Environment, File};
    let cfg = Config::builder()
        .add_source(File::with_name("config.yaml").required(false))
        .add_source(Environment::default().separator("__"))
        .build()?;

    let app: AppConfig = cfg.try_deserialize()?;
    app.validate()?;
    Ok(app)
}

/// Convenience helper for binaries wanting panic-on-error behaviour.
pub fn load_config_or_panic() -> AppConfig {
    match load_config() {
        Ok(c) => c,
        Err(e) => panic!("Failed to load configuration: {e}"),
    }
}
