use rocket::{
    figment::{
        providers::{Env, Format, Toml},
        Figment,
    },
    Build, Rocket,
};
use serde::{Deserialize, Serialize};

/// Main server config (settings are merged with Rocket's default config)
#[derive(Debug, Serialize, Deserialize)]
pub struct AppConfig {
    /// Postgres Database URL
    pub database_url: String,
    /// HMAC secret used to verify HS256 session tokens
    pub auth_secret: Option<String>,
    /// PEM-encoded RSA public key used to verify RS256 session tokens.
    /// Takes precedence over `auth_secret`.
    pub auth_public_key: Option<String>,
    /// Expected `iss` claim of session tokens
    pub auth_issuer: Option<String>,
    /// Base URL of the retrieval service. The lorem ipsum provider is used if not set.
    pub retrieval_url: Option<String>,
    /// Bearer token for the retrieval service
    pub retrieval_api_key: Option<String>,
    /// Path to a TOML model catalog (default: built-in catalog)
    pub models_path: Option<String>,
    /// Free message allowance given to new users
    pub default_free_messages: Option<i32>,
    /// Interval between words of the lorem ipsum provider, in milliseconds
    pub lorem_interval_ms: Option<u64>,
}

/// Get the server configuration variables from Rocket
pub fn get_app_config(rocket: &Rocket<Build>) -> &AppConfig {
    rocket
        .state::<AppConfig>()
        .expect("Server configuration not loaded")
}

/// Builds and returns a Figment configuration provider that merges settings from:
/// 1. Default Rocket config
/// 2. Rocket.toml file
/// 3. Environment variables prefixed with `DOC_CHAT_`. In debug/dev mode, will load
/// variables from local `.env` file
pub fn get_config_provider() -> Figment {
    #[cfg(debug_assertions)]
    if let Err(e) = dotenvy::dotenv() {
        println!("Failed to read .env file: {}", e);
    }

    Figment::from(rocket::Config::default())
        .merge(Toml::file("Rocket.toml").nested())
        .merge(Env::prefixed("DOC_CHAT_").global())
}
