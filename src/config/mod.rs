//! Application configuration.
//!
//! Settings come from the process environment (optionally pre-populated from a `.env`
//! file by `dotenvy` in `main`). `DATABASE_URL` is mandatory; everything else has a
//! default. The investment seed catalog is a separate TOML file, see [`investments`].

/// Database connection, capability check and schema creation
pub mod database;

/// Investment catalog loading from TOML
pub mod investments;

use crate::errors::{Error, Result};
use crate::store::IsolationLevel;
use std::path::PathBuf;
use tracing::{debug, info};

/// Environment variable naming the backing store
pub const DATABASE_URL_VAR: &str = "DATABASE_URL";
/// Environment variable selecting the transaction isolation level
pub const ISOLATION_LEVEL_VAR: &str = "STOCKPULSE_ISOLATION_LEVEL";
/// Environment variable pointing at the investment seed catalog
pub const SEED_FILE_VAR: &str = "STOCKPULSE_SEED_FILE";

/// Fully resolved startup configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// Connection string of the backing store (e.g. `sqlite://data/stockpulse.sqlite?mode=rwc`)
    pub database_url: String,
    /// Isolation level for transactions opened through the store, backend default if `None`
    pub isolation_level: Option<IsolationLevel>,
    /// Investment catalog to seed at startup, if any
    pub seed_file: Option<PathBuf>,
}

impl AppConfig {
    /// Builds the configuration from an arbitrary variable lookup.
    ///
    /// `lookup` returns the value of a variable or `None` when unset. Empty values count as
    /// unset.
    ///
    /// # Errors
    /// Returns [`Error::Config`] when `DATABASE_URL` is missing or malformed, or when the
    /// isolation level is not one of the known names.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let database_url = non_empty(DATABASE_URL_VAR).ok_or_else(|| Error::Config {
            message: format!("{DATABASE_URL_VAR} is not set"),
        })?;
        validate_database_url(&database_url)?;

        let isolation_level = non_empty(ISOLATION_LEVEL_VAR)
            .map(|raw| {
                raw.parse::<IsolationLevel>().map_err(|e| Error::Config {
                    message: format!("{ISOLATION_LEVEL_VAR}: {e}"),
                })
            })
            .transpose()?;

        let seed_file = non_empty(SEED_FILE_VAR).map(PathBuf::from);

        debug!(?isolation_level, ?seed_file, "Resolved configuration");
        Ok(Self {
            database_url: database_url.trim().to_string(),
            isolation_level,
            seed_file,
        })
    }
}

/// Loads the configuration from the process environment.
///
/// # Errors
/// See [`AppConfig::from_lookup`].
pub fn load_app_configuration() -> Result<AppConfig> {
    let config = AppConfig::from_lookup(|key| std::env::var(key).ok())?;
    info!(
        "Configuration loaded (backend: {}).",
        database_scheme(&config.database_url).unwrap_or("unknown")
    );
    Ok(config)
}

/// Returns the scheme part of a connection string (`"sqlite"` for `sqlite://...`).
#[must_use]
pub fn database_scheme(url: &str) -> Option<&str> {
    let (scheme, _) = url.trim().split_once(':')?;
    let valid = !scheme.is_empty()
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    valid.then_some(scheme)
}

fn validate_database_url(url: &str) -> Result<()> {
    let Some(scheme) = database_scheme(url) else {
        return Err(Error::Config {
            message: format!("{DATABASE_URL_VAR} `{url}` is not of the form <scheme>:<location>"),
        });
    };
    let rest = &url.trim()[scheme.len() + 1..];
    if rest.trim_start_matches('/').is_empty() {
        return Err(Error::Config {
            message: format!("{DATABASE_URL_VAR} `{url}` does not name a location"),
        });
    }
    Ok(())
}
