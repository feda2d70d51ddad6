//! System log entity - Append-only audit trail of operations.
//!
//! Rows are written by `core::system_log` and never updated or deleted.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::errors::Error as StoreError;

/// Severity of a log row
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogLevel {
    /// Normal operation
    #[sea_orm(string_value = "INFO")]
    Info,
    /// Something unexpected that did not fail the operation
    #[sea_orm(string_value = "WARNING")]
    Warning,
    /// The operation failed
    #[sea_orm(string_value = "ERROR")]
    Error,
}

impl FromStr for LogLevel {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        super::parse_string_enum("log level", s)
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_value())
    }
}

/// System log database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "system_logs")]
pub struct Model {
    /// Opaque unique identifier (UUID text)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    /// Severity
    #[sea_orm(column_name = "type")]
    pub level: LogLevel,
    /// What happened
    pub message: String,
    /// Component that wrote the row (e.g., `"REPOSITORY"`, `"SERVICE"`)
    pub source: String,
    /// Name of the operation, if the row describes one
    pub operation: Option<String>,
    /// Wall-clock duration of the operation in milliseconds
    pub execution_time_ms: Option<f64>,
    /// Acting user, if any
    pub user_id: Option<String>,
    /// When the row was written
    #[sea_orm(indexed)]
    pub created_at: DateTimeUtc,
}

/// `SystemLog` has no relationships with other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
