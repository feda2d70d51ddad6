//! System log business logic - Append-only audit trail.
//!
//! Rows can be appended and read, never changed. [`timed_operation`] wraps any fallible
//! future and records how long it took and whether it failed.

use crate::{
    core::{query::ListOptions, require_text},
    entities::{LogLevel, SystemLog, system_log},
    errors::{Error, Result},
};
use chrono::{DateTime, Utc};
use sea_orm::{FromQueryResult, QuerySelect, Set, prelude::*};
use std::{collections::BTreeMap, time::Instant};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// Input for [`append_log`]
#[derive(Debug, Clone)]
pub struct NewSystemLog {
    /// Severity
    pub level: LogLevel,
    /// Component that produced the row (e.g. "portfolio")
    pub source: String,
    /// What happened
    pub message: String,
    /// Operation name
    pub operation: Option<String>,
    /// Duration in milliseconds
    pub execution_time_ms: Option<f64>,
    /// Acting user
    pub user_id: Option<String>,
}

impl NewSystemLog {
    /// A bare log row.
    pub fn new(level: LogLevel, source: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            source: source.into(),
            message: message.into(),
            operation: None,
            execution_time_ms: None,
            user_id: None,
        }
    }

    /// Same row tagged with an operation name.
    #[must_use]
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    /// Same row with a duration.
    #[must_use]
    pub const fn with_execution_time(mut self, millis: f64) -> Self {
        self.execution_time_ms = Some(millis);
        self
    }

    /// Same row attributed to a user.
    #[must_use]
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}

/// Filters for [`list_logs`]; unset fields match everything
#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    /// Only this severity
    pub level: Option<LogLevel>,
    /// Only this source
    pub source: Option<String>,
    /// Only rows attributed to this user
    pub user_id: Option<String>,
    /// Created at or after
    pub since: Option<DateTime<Utc>>,
    /// Created before
    pub until: Option<DateTime<Utc>>,
}

#[derive(Debug, FromQueryResult)]
struct LevelCount {
    level: LogLevel,
    log_count: i64,
}

/// Appends a log row.
///
/// # Errors
/// [`Error::Validation`] for an empty source or message, [`Error::InvalidAmount`] for a
/// negative or non-finite duration.
pub async fn append_log<C>(db: &C, entry: NewSystemLog) -> Result<system_log::Model>
where
    C: ConnectionTrait,
{
    let source = require_text("Log source", &entry.source)?;
    let message = require_text("Log message", &entry.message)?;
    if let Some(millis) = entry.execution_time_ms {
        crate::core::validate_amount(millis)?;
    }

    let model = system_log::ActiveModel {
        id: Set(Uuid::new_v4().to_string()),
        level: Set(entry.level),
        message: Set(message),
        source: Set(source),
        operation: Set(entry.operation),
        execution_time_ms: Set(entry.execution_time_ms),
        user_id: Set(entry.user_id),
        created_at: Set(Utc::now()),
    };
    let created = model.insert(db).await?;
    debug!("Appended {} log {} from {}", created.level, created.id, created.source);
    Ok(created)
}

/// Runs `operation`, then appends an INFO row with its duration or an ERROR row with the
/// error text, and hands back the operation's own result.
///
/// A failure to write the log row is reported through `tracing` and does not replace the
/// operation's result.
#[instrument(skip(db, future))]
pub async fn timed_operation<C, T, F>(db: &C, source: &str, operation: &str, future: F) -> Result<T>
where
    C: ConnectionTrait,
    F: Future<Output = Result<T>>,
{
    let started = Instant::now();
    let outcome = future.await;
    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

    let entry = match &outcome {
        Ok(_) => NewSystemLog::new(LogLevel::Info, source, format!("{operation} completed")),
        Err(e) => NewSystemLog::new(LogLevel::Error, source, format!("{operation} failed: {e}")),
    }
    .with_operation(operation)
    .with_execution_time(elapsed_ms);

    if let Err(log_err) = append_log(db, entry).await {
        warn!("Could not record timing for {}: {}", operation, log_err);
    }
    outcome
}

/// Lists log rows matching `filter`, ordered by creation time.
pub async fn list_logs<C>(db: &C, filter: LogFilter, options: ListOptions) -> Result<Vec<system_log::Model>>
where
    C: ConnectionTrait,
{
    let mut select = SystemLog::find();
    if let Some(level) = filter.level {
        select = select.filter(system_log::Column::Level.eq(level));
    }
    if let Some(source) = filter.source {
        select = select.filter(system_log::Column::Source.eq(source));
    }
    if let Some(user_id) = filter.user_id {
        select = select.filter(system_log::Column::UserId.eq(user_id));
    }
    if let Some(since) = filter.since {
        select = select.filter(system_log::Column::CreatedAt.gte(since));
    }
    if let Some(until) = filter.until {
        select = select.filter(system_log::Column::CreatedAt.lt(until));
    }

    options
        .apply(select, system_log::Column::CreatedAt)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Number of rows per level, optionally only those created at or after `since`.
pub async fn count_logs_by_level<C>(db: &C, since: Option<DateTime<Utc>>) -> Result<BTreeMap<LogLevel, u64>>
where
    C: ConnectionTrait,
{
    let mut select = SystemLog::find()
        .select_only()
        .column_as(system_log::Column::Level, "level")
        .column_as(Expr::col(system_log::Column::Id).count(), "log_count")
        .group_by(system_log::Column::Level);
    if let Some(since) = since {
        select = select.filter(system_log::Column::CreatedAt.gte(since));
    }

    let rows = select.into_model::<LevelCount>().all(db).await?;
    rows.into_iter()
        .map(|row| {
            let count = u64::try_from(row.log_count).map_err(|_| Error::Validation {
                message: format!("negative count for {}", row.level),
            })?;
            Ok((row.level, count))
        })
        .collect()
}
