//! Runtime configuration for the interception layer.
//!
//! Values come from `TETHER_*` environment variables, then the TOML file named by
//! `TETHER_CONFIG_FILE`, then built-in defaults that point at web.dev.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Origin, cache, route and lifecycle settings. See [`AppConfig::load`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Origin server whose requests are intercepted.
    ///
    /// Set via TETHER_ORIGIN environment variable.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Address the HTTP front listens on.
    ///
    /// Set via TETHER_LISTEN_ADDR environment variable.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Path to SQLite cache database.
    ///
    /// Set via TETHER_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// User-Agent string for origin requests.
    ///
    /// Set via TETHER_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// HTTP request timeout in milliseconds.
    ///
    /// Set via TETHER_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum bytes to fetch per request.
    ///
    /// Set via TETHER_MAX_BYTES environment variable.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// Architecture revision of this build. A change forces every open client to resync.
    ///
    /// Set via TETHER_ARCHITECTURE_REVISION environment variable.
    #[serde(default = "default_architecture_revision")]
    pub architecture_revision: String,

    /// Same-origin path of the template endpoint.
    #[serde(default = "default_template_path")]
    pub template_path: String,

    /// Same-origin path of the precached offline partial.
    #[serde(default = "default_offline_partial_path")]
    pub offline_partial_path: String,

    /// Site name used for untitled pages and the default feed title.
    #[serde(default = "default_site_name")]
    pub site_name: String,

    /// Feed linked from pages whose partial names none.
    #[serde(default = "default_feed_path")]
    pub default_feed_path: String,

    /// Origin serving font stylesheets.
    #[serde(default = "default_font_stylesheet_origin")]
    pub font_stylesheet_origin: String,

    /// Origin serving font files.
    #[serde(default = "default_font_file_origin")]
    pub font_file_origin: String,

    /// Maximum concurrent fetches while precaching the template manifest.
    #[serde(default = "default_precache_concurrency")]
    pub precache_concurrency: usize,
}

fn default_origin() -> String {
    "http://localhost:8080".into()
}

fn default_listen_addr() -> String {
    "127.0.0.1:8787".into()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./tether-cache.sqlite")
}

fn default_user_agent() -> String {
    "tether/0.1".into()
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_max_bytes() -> usize {
    5_242_880 // 5MB
}

fn default_architecture_revision() -> String {
    "1".into()
}

fn default_template_path() -> String {
    "/sw-partial-layout.partial".into()
}

fn default_offline_partial_path() -> String {
    "/offline/index.json".into()
}

fn default_site_name() -> String {
    "web.dev".into()
}

fn default_feed_path() -> String {
    "/feed.xml".into()
}

fn default_font_stylesheet_origin() -> String {
    "https://fonts.googleapis.com".into()
}

fn default_font_file_origin() -> String {
    "https://fonts.gstatic.com".into()
}

fn default_precache_concurrency() -> usize {
    4
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            origin: default_origin(),
            listen_addr: default_listen_addr(),
            db_path: default_db_path(),
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            max_bytes: default_max_bytes(),
            architecture_revision: default_architecture_revision(),
            template_path: default_template_path(),
            offline_partial_path: default_offline_partial_path(),
            site_name: default_site_name(),
            default_feed_path: default_feed_path(),
            font_stylesheet_origin: default_font_stylesheet_origin(),
            font_file_origin: default_font_file_origin(),
            precache_concurrency: default_precache_concurrency(),
        }
    }
}

impl AppConfig {
    /// Per-request network timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// The origin parsed as a URL.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if `origin` is not an absolute URL.
    pub fn origin_url(&self) -> Result<url::Url, ConfigError> {
        url::Url::parse(&self.origin)
            .map_err(|e| ConfigError::Invalid { field: "origin".into(), reason: e.to_string() })
    }

    /// Merge defaults, the optional TOML file and the environment, then validate.
    ///
    /// Nested keys use `__` in variable names. Load and validation failures both
    /// surface as `ConfigError`.
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("TETHER_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("TETHER_")
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
