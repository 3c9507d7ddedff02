//! Environment-driven settings.
//!
//! [FaststackSettings] are read from an optional `faststack.json` file, overridden by `DB_DSN` and
//! `SECRET_KEY` environment variables. The database DSN is validated against supported backends,
//! and a random secret key is generated (with a warning) when none is configured.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use config::{Config, ConfigError, Environment, File, Map};
use rand::RngCore;
use serde::Deserialize;
use std::fmt::{Debug, Display, Formatter};
use thiserror::Error;
use tracing::warn;
use url::Url;

/// Name of the default config file.
pub const CONFIG_FILE: &str = "faststack.json";

const SECRET_KEY_BYTES: usize = 32;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Error loading settings: {0}")]
    ConfigError(#[source] ConfigError),
    #[error("Invalid database DSN: {0}")]
    InvalidDsn(String),
}

/// Database backend selected by the DSN scheme.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DatabaseBackend {
    Postgres,
    MySql,
    Sqlite,
}

impl DatabaseBackend {
    fn from_scheme(scheme: &str) -> Option<Self> {
        match scheme {
            "postgres" | "postgresql" | "postgresql+asyncpg" | "postgresql+psycopg" => {
                Some(Self::Postgres)
            }
            "mysql" | "mysql+aiomysql" | "mysql+asyncmy" => Some(Self::MySql),
            "sqlite" | "sqlite+aiosqlite" => Some(Self::Sqlite),
            _ => None,
        }
    }

    fn driver_scheme(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::MySql => "mysql",
            Self::Sqlite => "sqlite",
        }
    }
}

/// Validated database connection string.
#[derive(Clone, PartialEq, Eq)]
pub struct DatabaseDsn {
    raw: String,
    backend: DatabaseBackend,
    driver_url: String,
}

impl DatabaseDsn {
    pub fn parse(dsn: &str) -> Result<Self, SettingsError> {
        let (scheme, rest) = dsn
            .split_once(':')
            .ok_or_else(|| SettingsError::InvalidDsn(format!("missing scheme in '{dsn}'")))?;
        let scheme = scheme.to_ascii_lowercase();
        let backend = DatabaseBackend::from_scheme(&scheme).ok_or_else(|| {
            SettingsError::InvalidDsn(format!("unsupported scheme '{scheme}'"))
        })?;

        let driver_url = match backend {
            DatabaseBackend::Sqlite => sqlite_driver_url(rest)?,
            DatabaseBackend::Postgres | DatabaseBackend::MySql => {
                let url = Url::parse(dsn)
                    .map_err(|error| SettingsError::InvalidDsn(error.to_string()))?;
                if url.host_str().map_or(true, str::is_empty) {
                    return Err(SettingsError::InvalidDsn(format!(
                        "missing host for scheme '{scheme}'"
                    )));
                }

                format!("{}:{rest}", backend.driver_scheme())
            }
        };

        Ok(Self {
            raw: dsn.to_string(),
            backend,
            driver_url,
        })
    }

    #[inline]
    pub fn backend(&self) -> DatabaseBackend {
        self.backend
    }

    /// URL understood by the database driver, with driver suffixes removed and SQLite paths
    /// converted.
    #[inline]
    pub fn to_driver_url(&self) -> &str {
        &self.driver_url
    }

    /// Checks if this DSN points to an in-memory SQLite database.
    pub fn is_in_memory(&self) -> bool {
        self.backend == DatabaseBackend::Sqlite && self.driver_url.starts_with("sqlite::memory:")
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl Debug for DatabaseDsn {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseDsn")
            .field("backend", &self.backend)
            .finish_non_exhaustive()
    }
}

impl Display for DatabaseDsn {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

// `rest` is everything after "sqlite:"
fn sqlite_driver_url(rest: &str) -> Result<String, SettingsError> {
    let (location, query) = match rest.split_once('?') {
        Some((location, query)) => (location, Some(query)),
        None => (rest, None),
    };

    let path = if let Some(absolute) = location.strip_prefix("////") {
        format!("/{absolute}")
    } else if let Some(relative) = location.strip_prefix("///") {
        relative.to_string()
    } else if location == "//" {
        String::new()
    } else if location.starts_with("//") {
        return Err(SettingsError::InvalidDsn(
            "SQLite DSN must not specify a host".to_string(),
        ));
    } else {
        location.to_string()
    };

    if path.is_empty() || path == ":memory:" {
        return Ok(match query {
            Some(query) => format!("sqlite::memory:?{query}"),
            None => "sqlite::memory:".to_string(),
        });
    }

    Ok(match query {
        Some(query) if query.contains("mode=") => format!("sqlite:{path}?{query}"),
        Some(query) => format!("sqlite:{path}?{query}&mode=rwc"),
        None => format!("sqlite:{path}?mode=rwc"),
    })
}

/// Application secret. Never printed through [Debug] or [Display].
#[derive(Clone, PartialEq, Eq)]
pub struct SecretKey(String);

impl SecretKey {
    pub fn new<S: Into<String>>(secret: S) -> Self {
        Self(secret.into())
    }

    /// Generates a random URL-safe secret.
    pub fn generate() -> Self {
        let mut bytes = [0u8; SECRET_KEY_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(URL_SAFE_NO_PAD.encode(bytes))
    }

    #[inline]
    pub fn expose_secret(&self) -> &str {
        &self.0
    }
}

impl Debug for SecretKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretKey(**********)")
    }
}

impl Display for SecretKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("**********")
    }
}

/// Validated application settings.
#[derive(Clone, Debug)]
pub struct FaststackSettings {
    db_dsn: DatabaseDsn,
    secret_key: SecretKey,
}

impl FaststackSettings {
    /// Creates settings from explicit values. A missing secret key is generated.
    pub fn new(db_dsn: &str, secret_key: Option<String>) -> Result<Self, SettingsError> {
        let db_dsn = DatabaseDsn::parse(db_dsn)?;
        let secret_key = match secret_key {
            Some(secret_key) => SecretKey::new(secret_key),
            None => {
                warn!("Using default secret key, this should not be used in production");
                SecretKey::generate()
            }
        };

        Ok(Self { db_dsn, secret_key })
    }

    /// Loads settings from `faststack.json` and the process environment.
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::load(
            Config::builder()
                .add_source(File::with_name(CONFIG_FILE).required(false))
                .add_source(Environment::default()),
        )
    }

    /// Loads settings from given key/value pairs, using the same keys as environment variables.
    pub fn from_map(values: Map<String, String>) -> Result<Self, SettingsError> {
        Self::load(Config::builder().add_source(Environment::default().source(Some(values))))
    }

    fn load(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self, SettingsError> {
        let raw = builder
            .build()
            .and_then(|config| config.try_deserialize::<RawSettings>())
            .map_err(SettingsError::ConfigError)?;

        Self::new(&raw.db_dsn, raw.secret_key.filter(|key| !key.is_empty()))
    }

    #[inline]
    pub fn db_dsn(&self) -> &DatabaseDsn {
        &self.db_dsn
    }

    #[inline]
    pub fn secret_key(&self) -> &SecretKey {
        &self.secret_key
    }
}

#[derive(Deserialize)]
struct RawSettings {
    db_dsn: String,
    secret_key: Option<String>,
}
