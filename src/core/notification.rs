//! Notification business logic - Messages delivered to a user's inbox.

use crate::{
    core::{investment::require_investment, require_text},
    entities::{Notification, User, investment, notification},
    errors::{Error, Result},
};
use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::{QueryOrder, Set, prelude::*};
use std::collections::BTreeMap;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Outcome of [`broadcast_notification`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastSummary {
    /// Notifications stored
    pub sent: usize,
    /// Recipients that do not exist
    pub failed: usize,
}

/// Stores an unread notification for an existing user.
///
/// # Errors
/// [`Error::NotFound`] when the user does not exist, [`Error::Validation`] for an empty message.
#[instrument(skip(db, message))]
pub async fn send_notification<C>(db: &C, user_id: &str, message: &str) -> Result<notification::Model>
where
    C: ConnectionTrait,
{
    let message = require_text("Notification message", message)?;
    if User::find_by_id(user_id).one(db).await?.is_none() {
        return Err(Error::NotFound {
            entity: "user",
            key: user_id.to_string(),
        });
    }

    let now = Utc::now();
    let model = notification::ActiveModel {
        id: Set(Uuid::new_v4().to_string()),
        user_id: Set(user_id.to_string()),
        message: Set(message),
        is_read: Set(false),
        sent_at: Set(now),
        created_at: Set(now),
    };
    let created = model.insert(db).await?;
    info!("Sent notification {} to user {}", created.id, user_id);
    Ok(created)
}

/// Formats the price movement message, e.g. `Vale ON (VALE3) rose 5.00% from 60.00 to 63.00`.
///
/// # Errors
/// [`Error::InvalidAmount`] when `old_price` is not a positive finite number.
pub fn price_change_message(investment: &investment::Model, old_price: f64, new_price: f64) -> Result<String> {
    if !old_price.is_finite() || old_price <= 0.0 {
        return Err(Error::InvalidAmount { amount: old_price });
    }
    crate::core::validate_amount(new_price)?;

    let change = (new_price - old_price) / old_price * 100.0;
    let direction = if change > 0.0 { "rose" } else { "fell" };
    Ok(format!(
        "{} ({}) {direction} {:.2}% from {old_price:.2} to {new_price:.2}",
        investment.name,
        investment.code,
        change.abs()
    ))
}

/// Notifies a user that an investment's price moved.
pub async fn send_price_change_notification<C>(
    db: &C,
    user_id: &str,
    investment: &investment::Model,
    old_price: f64,
    new_price: f64,
) -> Result<notification::Model>
where
    C: ConnectionTrait,
{
    let message = price_change_message(investment, old_price, new_price)?;
    send_notification(db, user_id, &message).await
}

/// Formats the maturity reminder, e.g. `Tesouro IPCA (IPCA29) matures in 30 days`.
///
/// # Errors
/// [`Error::Validation`] when the investment has no maturity date or matured before `now`.
pub fn maturity_message(investment: &investment::Model, now: DateTime<Utc>) -> Result<String> {
    let Some(maturity) = investment.maturity_date else {
        return Err(Error::Validation {
            message: format!("{} has no maturity date", investment.code),
        });
    };
    if maturity < now {
        return Err(Error::Validation {
            message: format!("{} matured on {}", investment.code, maturity.date_naive()),
        });
    }

    let when = match (maturity - now).num_days() {
        0 => "today".to_string(),
        1 => "in 1 day".to_string(),
        days => format!("in {days} days"),
    };
    Ok(format!("{} ({}) matures {when}", investment.name, investment.code))
}

/// Reminds a user that a fixed income investment is about to mature.
///
/// # Errors
/// [`Error::NotFound`] for an unknown user or investment, plus the errors of
/// [`maturity_message`].
#[instrument(skip(db))]
pub async fn send_maturity_notification<C>(
    db: &C,
    user_id: &str,
    investment_id: &str,
    now: DateTime<Utc>,
) -> Result<notification::Model>
where
    C: ConnectionTrait,
{
    let investment = require_investment(db, investment_id).await?;
    let message = maturity_message(&investment, now)?;
    send_notification(db, user_id, &message).await
}

/// Formats a dividend announcement; the stored dividend yield is appended when known.
///
/// # Errors
/// [`Error::InvalidAmount`] unless `amount_per_unit` is a positive finite number.
pub fn dividend_message(investment: &investment::Model, amount_per_unit: f64, ex_date: NaiveDate) -> Result<String> {
    if !amount_per_unit.is_finite() || amount_per_unit <= 0.0 {
        return Err(Error::InvalidAmount {
            amount: amount_per_unit,
        });
    }
    let mut message = format!(
        "{} ({}) pays a dividend of {amount_per_unit:.2} per unit, ex-date {ex_date}",
        investment.name, investment.code
    );
    if let Some(dividend_yield) = investment.dividend_yield {
        message.push_str(&format!(" (yield {dividend_yield:.2}%)"));
    }
    Ok(message)
}

/// Tells a user about an upcoming dividend.
#[instrument(skip(db))]
pub async fn send_dividend_notification<C>(
    db: &C,
    user_id: &str,
    investment_id: &str,
    amount_per_unit: f64,
    ex_date: NaiveDate,
) -> Result<notification::Model>
where
    C: ConnectionTrait,
{
    let investment = require_investment(db, investment_id).await?;
    let message = dividend_message(&investment, amount_per_unit, ex_date)?;
    send_notification(db, user_id, &message).await
}

/// Sends the same message to several users; unknown users are counted, not fatal.
#[instrument(skip(db, user_ids, message), fields(recipients = user_ids.len()))]
pub async fn broadcast_notification<C>(db: &C, user_ids: &[String], message: &str) -> Result<BroadcastSummary>
where
    C: ConnectionTrait,
{
    let mut summary = BroadcastSummary::default();
    for user_id in user_ids {
        match send_notification(db, user_id, message).await {
            Ok(_) => summary.sent += 1,
            Err(Error::NotFound { key, .. }) => {
                warn!("Skipping broadcast to unknown user {}", key);
                summary.failed += 1;
            }
            Err(e) => return Err(e),
        }
    }
    Ok(summary)
}

/// A user's notifications, newest first.
pub async fn list_notifications_for_user<C>(db: &C, user_id: &str) -> Result<Vec<notification::Model>>
where
    C: ConnectionTrait,
{
    Notification::find()
        .filter(notification::Column::UserId.eq(user_id))
        .order_by_desc(notification::Column::SentAt)
        .all(db)
        .await
        .map_err(Into::into)
}

/// A user's unread notifications, newest first.
pub async fn list_unread_for_user<C>(db: &C, user_id: &str) -> Result<Vec<notification::Model>>
where
    C: ConnectionTrait,
{
    Notification::find()
        .filter(notification::Column::UserId.eq(user_id))
        .filter(notification::Column::IsRead.eq(false))
        .order_by_desc(notification::Column::SentAt)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Number of unread notifications for a user.
pub async fn count_unread_for_user<C>(db: &C, user_id: &str) -> Result<u64>
where
    C: ConnectionTrait,
{
    Notification::find()
        .filter(notification::Column::UserId.eq(user_id))
        .filter(notification::Column::IsRead.eq(false))
        .count(db)
        .await
        .map_err(Into::into)
}

/// Marks one notification as read.
#[instrument(skip(db))]
pub async fn mark_as_read<C>(db: &C, notification_id: &str) -> Result<notification::Model>
where
    C: ConnectionTrait,
{
    let existing = Notification::find_by_id(notification_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::NotFound {
            entity: "notification",
            key: notification_id.to_string(),
        })?;
    if existing.is_read {
        return Ok(existing);
    }

    let mut model: notification::ActiveModel = existing.into();
    model.is_read = Set(true);
    model.update(db).await.map_err(Into::into)
}

/// Marks every unread notification of a user as read; returns how many changed.
#[instrument(skip(db))]
pub async fn mark_all_as_read<C>(db: &C, user_id: &str) -> Result<u64>
where
    C: ConnectionTrait,
{
    let result = Notification::update_many()
        .col_expr(notification::Column::IsRead, Expr::value(true))
        .filter(notification::Column::UserId.eq(user_id))
        .filter(notification::Column::IsRead.eq(false))
        .exec(db)
        .await?;
    info!("Marked {} notifications read for {}", result.rows_affected, user_id);
    Ok(result.rows_affected)
}

/// Deletes notifications sent before `cutoff`; returns how many were removed.
#[instrument(skip(db))]
pub async fn delete_notifications_before<C>(db: &C, cutoff: DateTime<Utc>) -> Result<u64>
where
    C: ConnectionTrait,
{
    let result = Notification::delete_many()
        .filter(notification::Column::SentAt.lt(cutoff))
        .exec(db)
        .await?;
    info!("Deleted {} notifications older than {}", result.rows_affected, cutoff);
    Ok(result.rows_affected)
}

/// Read/unread counts of one inbox
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InboxCounts {
    /// Notifications received
    pub total: u64,
    /// Of which still unread
    pub unread: u64,
}

/// Aggregate figures over every stored notification
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotificationStats {
    /// Notifications stored
    pub total: u64,
    /// Notifications not yet read
    pub unread: u64,
    /// Counts per recipient id
    pub by_user: BTreeMap<String, InboxCounts>,
    /// Mean time since sending, in days, measured at `now`
    pub average_age_days: f64,
}

/// Computes totals, per-user inbox counts and the mean age of all notifications.
#[instrument(skip(db))]
pub async fn notification_stats<C>(db: &C, now: DateTime<Utc>) -> Result<NotificationStats>
where
    C: ConnectionTrait,
{
    let notifications = Notification::find().all(db).await?;

    let mut stats = NotificationStats::default();
    let mut total_age_ms = 0_i64;
    for notification in &notifications {
        let counts = stats.by_user.entry(notification.user_id.clone()).or_default();
        counts.total += 1;
        stats.total += 1;
        if !notification.is_read {
            counts.unread += 1;
            stats.unread += 1;
        }
        total_age_ms += (now - notification.sent_at).num_milliseconds();
    }
    if stats.total > 0 {
        #[allow(clippy::cast_precision_loss)]
        let average_ms = total_age_ms as f64 / stats.total as f64;
        stats.average_age_days = average_ms / MILLIS_PER_DAY;
    }
    Ok(stats)
}

const MILLIS_PER_DAY: f64 = 86_400_000.0;
