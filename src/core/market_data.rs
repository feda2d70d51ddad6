//! Market data business logic - Latest quote per instrument code.
//!
//! Quotes are append-only: a code is recorded once and there is no update or delete.

use crate::{
    core::{investment::normalize_code, query::ListOptions, require_text, validate_amount},
    entities::{MarketData, market_data},
    errors::{Error, Result},
};
use chrono::{DateTime, Utc};
use sea_orm::{QueryOrder, Set, prelude::*};
use tracing::{info, instrument};
use uuid::Uuid;

/// Input for [`record_quote`]
#[derive(Debug, Clone)]
pub struct NewQuote {
    /// Instrument code
    pub code: String,
    /// Last traded price
    pub price: f64,
    /// Change since previous close
    pub change: f64,
    /// Traded volume
    pub volume: i64,
    /// Quote time, now when `None`
    pub quoted_at: Option<DateTime<Utc>>,
}

impl NewQuote {
    /// A quote taken now.
    pub fn new(code: impl Into<String>, price: f64, change: f64, volume: i64) -> Self {
        Self {
            code: code.into(),
            price,
            change,
            volume,
            quoted_at: None,
        }
    }
}

/// Stores a quote.
///
/// # Errors
/// [`Error::InvalidAmount`] for a bad price, [`Error::Validation`] for an empty code, a
/// non-finite change or negative volume, [`Error::Conflict`] when the code was already quoted.
#[instrument(skip(db, quote), fields(code = %quote.code))]
pub async fn record_quote<C>(db: &C, quote: NewQuote) -> Result<market_data::Model>
where
    C: ConnectionTrait,
{
    let code = normalize_code(&require_text("Quote code", &quote.code)?);
    validate_amount(quote.price)?;
    if !quote.change.is_finite() {
        return Err(Error::Validation {
            message: format!("Quote change must be finite: {}", quote.change),
        });
    }
    if quote.volume < 0 {
        return Err(Error::Validation {
            message: format!("Quote volume cannot be negative: {}", quote.volume),
        });
    }

    let now = Utc::now();
    let model = market_data::ActiveModel {
        id: Set(Uuid::new_v4().to_string()),
        code: Set(code),
        price: Set(quote.price),
        change: Set(quote.change),
        volume: Set(quote.volume),
        quoted_at: Set(quote.quoted_at.unwrap_or(now)),
        created_at: Set(now),
    };
    let created = model.insert(db).await?;
    info!("Recorded quote {} at {}", created.code, created.price);
    Ok(created)
}

/// Finds the quote for a code, ignoring case.
pub async fn get_quote_by_code<C>(db: &C, code: &str) -> Result<Option<market_data::Model>>
where
    C: ConnectionTrait,
{
    MarketData::find()
        .filter(market_data::Column::Code.eq(normalize_code(code)))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Lists quotes ordered by quote time.
pub async fn list_quotes<C>(db: &C, options: ListOptions) -> Result<Vec<market_data::Model>>
where
    C: ConnectionTrait,
{
    options
        .apply(MarketData::find(), market_data::Column::QuotedAt)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Quotes taken at or after `cutoff`, newest first.
pub async fn list_quotes_since<C>(db: &C, cutoff: DateTime<Utc>) -> Result<Vec<market_data::Model>>
where
    C: ConnectionTrait,
{
    MarketData::find()
        .filter(market_data::Column::QuotedAt.gte(cutoff))
        .order_by_desc(market_data::Column::QuotedAt)
        .all(db)
        .await
        .map_err(Into::into)
}
