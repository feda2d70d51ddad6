//! Price alert business logic - One-shot price thresholds.
//!
//! An alert fires at most once: evaluation deactivates every alert whose condition is met,
//! stamps `triggered_at` and notifies the owner. Re-activating an alert clears the stamp so
//! it can fire again.

use crate::{
    core::{investment::require_investment, notification::send_notification, validate_amount},
    entities::{AlertCondition, PriceAlert, User, investment, price_alert},
    errors::{Error, Result},
};
use chrono::Utc;
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*};
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Input for [`create_alert`]
#[derive(Debug, Clone)]
pub struct NewPriceAlert {
    /// Owner
    pub user_id: String,
    /// Watched investment
    pub investment_id: String,
    /// Threshold price
    pub target_price: f64,
    /// Which side of the threshold triggers
    pub condition: AlertCondition,
}

impl NewPriceAlert {
    /// Convenience constructor.
    pub fn new(
        user_id: impl Into<String>,
        investment_id: impl Into<String>,
        target_price: f64,
        condition: AlertCondition,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            investment_id: investment_id.into(),
            target_price,
            condition,
        }
    }
}

fn alert_message(investment: &investment::Model, alert: &price_alert::Model, price: f64) -> String {
    let side = match alert.condition {
        AlertCondition::GreaterThan => "above",
        AlertCondition::LessThan => "below",
    };
    format!(
        "{} ({}) is at {price:.2}, {side} your target of {:.2}",
        investment.name, investment.code, alert.target_price
    )
}

/// Creates an active alert.
///
/// # Errors
/// [`Error::InvalidAmount`] for a bad target, [`Error::NotFound`] for an unknown user or
/// investment.
#[instrument(skip(db, alert), fields(user_id = %alert.user_id, investment_id = %alert.investment_id))]
pub async fn create_alert<C>(db: &C, alert: NewPriceAlert) -> Result<price_alert::Model>
where
    C: ConnectionTrait,
{
    validate_amount(alert.target_price)?;
    if User::find_by_id(alert.user_id.as_str()).one(db).await?.is_none() {
        return Err(Error::NotFound {
            entity: "user",
            key: alert.user_id,
        });
    }
    require_investment(db, &alert.investment_id).await?;

    let now = Utc::now();
    let model = price_alert::ActiveModel {
        id: Set(Uuid::new_v4().to_string()),
        user_id: Set(alert.user_id),
        investment_id: Set(alert.investment_id),
        target_price: Set(alert.target_price),
        condition: Set(alert.condition),
        is_active: Set(true),
        triggered_at: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    };
    let created = model.insert(db).await?;
    info!("Created alert {} ({} {})", created.id, created.condition, created.target_price);
    Ok(created)
}

/// Finds an alert by id.
pub async fn get_alert_by_id<C>(db: &C, alert_id: &str) -> Result<Option<price_alert::Model>>
where
    C: ConnectionTrait,
{
    PriceAlert::find_by_id(alert_id)
        .one(db)
        .await
        .map_err(Into::into)
}

/// A user's alerts, newest first; only active ones when `active_only`.
pub async fn list_alerts_for_user<C>(db: &C, user_id: &str, active_only: bool) -> Result<Vec<price_alert::Model>>
where
    C: ConnectionTrait,
{
    let mut select = PriceAlert::find().filter(price_alert::Column::UserId.eq(user_id));
    if active_only {
        select = select.filter(price_alert::Column::IsActive.eq(true));
    }
    select
        .order_by_desc(price_alert::Column::CreatedAt)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Active alerts watching an investment, oldest first.
pub async fn list_active_alerts_for_investment<C>(db: &C, investment_id: &str) -> Result<Vec<price_alert::Model>>
where
    C: ConnectionTrait,
{
    PriceAlert::find()
        .filter(price_alert::Column::InvestmentId.eq(investment_id))
        .filter(price_alert::Column::IsActive.eq(true))
        .order_by_asc(price_alert::Column::CreatedAt)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Activates or deactivates an alert. Activation clears `triggered_at`.
#[instrument(skip(db))]
pub async fn set_alert_active<C>(db: &C, alert_id: &str, active: bool) -> Result<price_alert::Model>
where
    C: ConnectionTrait,
{
    let existing = get_alert_by_id(db, alert_id).await?.ok_or_else(|| Error::NotFound {
        entity: "price alert",
        key: alert_id.to_string(),
    })?;

    let mut model: price_alert::ActiveModel = existing.into();
    model.is_active = Set(active);
    if active {
        model.triggered_at = Set(None);
    }
    model.updated_at = Set(Utc::now());
    model.update(db).await.map_err(Into::into)
}

/// Deletes an alert.
#[instrument(skip(db))]
pub async fn delete_alert<C>(db: &C, alert_id: &str) -> Result<()>
where
    C: ConnectionTrait,
{
    let result = PriceAlert::delete_by_id(alert_id).exec(db).await?;
    if result.rows_affected == 0 {
        return Err(Error::NotFound {
            entity: "price alert",
            key: alert_id.to_string(),
        });
    }
    info!("Deleted alert {}", alert_id);
    Ok(())
}

/// Fires every active alert on `investment_id` that `price` satisfies.
///
/// Each fired alert is deactivated, stamped and turned into a notification for its owner,
/// all in one database transaction. Alerts whose owner no longer exists are still
/// deactivated. Returns the fired alerts.
#[instrument(skip(db))]
pub async fn evaluate_alerts<C>(db: &C, investment_id: &str, price: f64) -> Result<Vec<price_alert::Model>>
where
    C: TransactionTrait,
{
    validate_amount(price)?;
    let txn = db.begin().await?;
    let investment = require_investment(&txn, investment_id).await?;
    let candidates = list_active_alerts_for_investment(&txn, investment_id).await?;

    let now = Utc::now();
    let mut fired = Vec::new();
    for alert in candidates {
        if !alert.condition.is_met(alert.target_price, price) {
            continue;
        }
        let message = alert_message(&investment, &alert, price);
        let user_id = alert.user_id.clone();

        let mut model: price_alert::ActiveModel = alert.into();
        model.is_active = Set(false);
        model.triggered_at = Set(Some(now));
        model.updated_at = Set(now);
        let triggered = model.update(&txn).await?;

        match send_notification(&txn, &user_id, &message).await {
            Ok(_) => {}
            Err(Error::NotFound { .. }) => warn!("Alert {} belongs to missing user {}", triggered.id, user_id),
            Err(e) => return Err(e),
        }
        fired.push(triggered);
    }

    txn.commit().await?;
    info!("{} alerts fired for {} at {}", fired.len(), investment.code, price);
    Ok(fired)
}
