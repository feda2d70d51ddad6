//! Unified error type for the persistence layer.
//!
//! Every contract operation returns [`Result`]. Database errors are classified on the way
//! in: unique-index violations become [`Error::Conflict`] and connection failures become
//! [`Error::Connection`], so callers never have to inspect driver messages themselves.

use sea_orm::{DbErr, SqlErr};
use thiserror::Error;

/// All errors surfaced by `StockPulse`.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or malformed configuration. Fatal at startup.
    #[error("Configuration error: {message}")]
    Config {
        /// What was wrong with the configuration
        message: String,
    },

    /// The backing store could not be reached.
    #[error("Connection error: {message}")]
    Connection {
        /// Driver-level description of the failure
        message: String,
    },

    /// A unique constraint rejected the write.
    #[error("Conflict: {entity} with the same {field} already exists")]
    Conflict {
        /// Table that rejected the row
        entity: String,
        /// Column (or comma-separated columns) that collided
        field: String,
    },

    /// Lookup by id or unique key found nothing.
    #[error("{entity} not found: {key}")]
    NotFound {
        /// Kind of record that was looked up
        entity: &'static str,
        /// Id or key used for the lookup
        key: String,
    },

    /// Input had the wrong shape (empty name, unknown enum value, ...).
    #[error("Validation error: {message}")]
    Validation {
        /// Human-readable reason
        message: String,
    },

    /// A price, fee or value was negative, NaN or infinite.
    #[error("Invalid amount: {amount}")]
    InvalidAmount {
        /// The rejected amount
        amount: f64,
    },

    /// A sell asked for more units than the holding contains.
    #[error("Insufficient quantity: holding {held}, requested {requested}")]
    InsufficientQuantity {
        /// Units currently held
        held: i32,
        /// Units requested
        requested: i32,
    },

    /// The requested backend is not available in this build.
    #[error(
        "Backend `{backend}` is not supported by {runtime}. \
         Point DATABASE_URL at a sqlite database (e.g. `sqlite://data/stockpulse.sqlite?mode=rwc`) \
         or rebuild with the matching sea-orm driver feature enabled."
    )]
    EnvironmentUnsupported {
        /// URL scheme that was requested
        backend: String,
        /// Name and version of the running build
        runtime: String,
    },

    /// Any other database error.
    #[error("Database error: {0}")]
    Database(DbErr),

    /// File system error (configuration files).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<DbErr> for Error {
    fn from(err: DbErr) -> Self {
        if let Some(SqlErr::UniqueConstraintViolation(message)) = err.sql_err() {
            let (entity, field) = parse_unique_violation(&message);
            return Self::Conflict { entity, field };
        }
        match err {
            DbErr::Conn(inner) => Self::Connection {
                message: inner.to_string(),
            },
            DbErr::ConnectionAcquire(inner) => Self::Connection {
                message: inner.to_string(),
            },
            other => Self::Database(other),
        }
    }
}

/// Extracts table and column names from a unique violation message.
///
/// `SQLite` reports `UNIQUE constraint failed: users.email` or, for composite indexes,
/// `UNIQUE constraint failed: favorites.user_id, favorites.investment_id`. Anything else
/// is returned whole as the field so no information is lost.
pub(crate) fn parse_unique_violation(message: &str) -> (String, String) {
    let Some((_, columns)) = message.split_once("UNIQUE constraint failed:") else {
        return ("unknown".to_string(), message.trim().to_string());
    };

    let mut entity = String::new();
    let mut fields = Vec::new();
    for qualified in columns.split(',').map(str::trim).filter(|c| !c.is_empty()) {
        match qualified.split_once('.') {
            Some((table, column)) => {
                if entity.is_empty() {
                    entity = table.to_string();
                }
                fields.push(column.to_string());
            }
            None => fields.push(qualified.to_string()),
        }
    }

    if entity.is_empty() {
        entity = "unknown".to_string();
    }
    (entity, fields.join(", "))
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
