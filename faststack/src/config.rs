//! Application configuration, separate from [settings](crate::settings) consumed by the container.
//!
//! By default, the config is created with opinionated default values, which can then be overwritten
//! by the `faststack.json` file or environment variables prefixed with `FASTSTACK_`. Nested keys
//! are separated with `__`, e.g. `FASTSTACK_SERVER__LISTEN_ADDRESS`.

use crate::settings::CONFIG_FILE;
use config::{Config, ConfigError, Environment, File, Map};
use serde::Deserialize;

const CONFIG_ENV_PREFIX: &str = "FASTSTACK";

/// Server configuration.
#[non_exhaustive]
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Address on which to listen.
    pub listen_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: "0.0.0.0:8000".to_string(),
        }
    }
}

impl From<OptionalServerConfig> for ServerConfig {
    fn from(value: OptionalServerConfig) -> Self {
        let default = Self::default();
        Self {
            listen_address: value.listen_address.unwrap_or(default.listen_address),
        }
    }
}

/// Framework configuration used by [FaststackApp](crate::app::FaststackApp).
#[non_exhaustive]
#[derive(Clone, Debug)]
pub struct ApplicationConfig {
    /// Should a default tracing logger be installed when running the application.
    pub install_tracing_logger: bool,
    pub server: ServerConfig,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            install_tracing_logger: true,
            server: Default::default(),
        }
    }
}

impl From<OptionalApplicationConfig> for ApplicationConfig {
    fn from(value: OptionalApplicationConfig) -> Self {
        let default = Self::default();
        Self {
            install_tracing_logger: value
                .install_tracing_logger
                .unwrap_or(default.install_tracing_logger),
            server: value.server.map(|server| server.into()).unwrap_or_default(),
        }
    }
}

impl ApplicationConfig {
    pub fn init_from_environment() -> Result<Self, ConfigError> {
        Self::init_from_source(None)
    }

    /// Reads config from given variables instead of the process environment.
    pub fn init_from_variables(variables: Map<String, String>) -> Result<Self, ConfigError> {
        Self::init_from_source(Some(variables))
    }

    fn init_from_source(variables: Option<Map<String, String>>) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .source(variables),
            )
            .build()
            .and_then(|config| config.try_deserialize::<OptionalApplicationConfig>())
            .map(|config| config.into())
    }
}

#[derive(Deserialize)]
struct OptionalServerConfig {
    listen_address: Option<String>,
}

#[derive(Deserialize)]
struct OptionalApplicationConfig {
    install_tracing_logger: Option<bool>,
    server: Option<OptionalServerConfig>,
}
