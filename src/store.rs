//! The store handle: one explicitly opened connection pool with a defined lifecycle.
//!
//! `Store::open` checks the backend, connects and ensures the schema. The handle is then
//! passed by reference to whoever needs the database, and `Store::close` releases it at
//! shutdown.

use crate::config::AppConfig;
use crate::config::database::{create_connection, create_tables};
use crate::errors::{Error, Result};
use sea_orm::{
    ConnectionTrait, DatabaseConnection, DatabaseTransaction, DbBackend, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use tracing::{info, instrument, warn};

/// Transaction isolation level, passed through to the backend
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IsolationLevel {
    /// Dirty reads allowed
    ReadUncommitted,
    /// Only committed data is visible
    ReadCommitted,
    /// Rows read once stay stable for the transaction
    RepeatableRead,
    /// Full serializability
    Serializable,
}

impl IsolationLevel {
    /// Canonical upper-snake name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ReadUncommitted => "READ_UNCOMMITTED",
            Self::ReadCommitted => "READ_COMMITTED",
            Self::RepeatableRead => "REPEATABLE_READ",
            Self::Serializable => "SERIALIZABLE",
        }
    }
}

impl FromStr for IsolationLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().replace(['-', ' '], "_").as_str() {
            "READ_UNCOMMITTED" => Ok(Self::ReadUncommitted),
            "READ_COMMITTED" => Ok(Self::ReadCommitted),
            "REPEATABLE_READ" => Ok(Self::RepeatableRead),
            "SERIALIZABLE" => Ok(Self::Serializable),
            _ => Err(Error::Validation {
                message: format!("unknown isolation level `{s}`"),
            }),
        }
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<IsolationLevel> for sea_orm::IsolationLevel {
    fn from(level: IsolationLevel) -> Self {
        match level {
            IsolationLevel::ReadUncommitted => Self::ReadUncommitted,
            IsolationLevel::ReadCommitted => Self::ReadCommitted,
            IsolationLevel::RepeatableRead => Self::RepeatableRead,
            IsolationLevel::Serializable => Self::Serializable,
        }
    }
}

/// Handle to the backing store
#[derive(Debug)]
pub struct Store {
    db: DatabaseConnection,
    isolation_level: Option<IsolationLevel>,
}

impl Store {
    /// Opens the store described by `config` and ensures the schema exists.
    ///
    /// # Errors
    /// [`Error::EnvironmentUnsupported`] for a backend this build lacks,
    /// [`Error::Connection`] when the store is unreachable, or a database error while
    /// creating tables.
    #[instrument(skip(config))]
    pub async fn open(config: &AppConfig) -> Result<Self> {
        let db = create_connection(&config.database_url).await?;
        create_tables(&db).await?;
        info!("Store opened.");
        Ok(Self::from_connection(db, config.isolation_level))
    }

    /// Wraps an existing connection without touching the schema.
    #[must_use]
    pub const fn from_connection(
        db: DatabaseConnection,
        isolation_level: Option<IsolationLevel>,
    ) -> Self {
        Self {
            db,
            isolation_level,
        }
    }

    /// The underlying connection, for contract operations.
    #[must_use]
    pub const fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Configured isolation level, if any.
    #[must_use]
    pub const fn isolation_level(&self) -> Option<IsolationLevel> {
        self.isolation_level
    }

    /// Starts a transaction at the configured isolation level.
    ///
    /// `SQLite` has no per-transaction isolation setting (its transactions are
    /// serializable), so the level is only forwarded to other backends.
    pub async fn begin(&self) -> Result<DatabaseTransaction> {
        let level = match (self.isolation_level, self.db.get_database_backend()) {
            (Some(level), DbBackend::Sqlite) => {
                warn!(%level, "Isolation level ignored by the SQLite backend");
                None
            }
            (level, _) => level.map(Into::into),
        };
        Ok(self.db.begin_with_config(level, None).await?)
    }

    /// Closes the connection pool.
    pub async fn close(self) -> Result<()> {
        self.db.close().await?;
        info!("Store closed.");
        Ok(())
    }
}
