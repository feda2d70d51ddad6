//! Investment business logic - The shared asset catalog.
//!
//! Codes are trimmed and upper-cased before every write and lookup; the unique index on
//! `investments.code` makes duplicate detection atomic. Each investment type owns a set of
//! optional attributes (see [`InvestmentDetails`]) and attributes belonging to another
//! type are rejected.

use crate::{
    core::{
        query::{ListOptions, text_contains},
        require_text, validate_amount,
    },
    entities::{Favorite, Investment, InvestmentType, PortfolioItem, favorite, investment,
        portfolio_item},
    errors::{Error, Result},
};
use chrono::{DateTime, Utc};
use sea_orm::{Condition, QueryOrder, Set, TransactionTrait, prelude::*};
use std::collections::BTreeMap;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Type-specific attributes of an investment
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InvestmentDetails {
    /// EQUITY: annualised volatility in percent
    pub volatility: Option<f64>,
    /// EQUITY: dividend yield in percent
    pub dividend_yield: Option<f64>,
    /// `FIXED_INCOME`: interest rate in percent
    pub interest_rate: Option<f64>,
    /// `FIXED_INCOME`: maturity date
    pub maturity_date: Option<DateTime<Utc>>,
    /// FUND: administration fee in percent
    pub admin_fee: Option<f64>,
    /// FUND: assets under management
    pub total_assets: Option<f64>,
}

impl InvestmentDetails {
    /// Checks every set attribute belongs to `kind` and holds a valid amount.
    ///
    /// # Errors
    /// [`Error::Validation`] for an attribute of another type, [`Error::InvalidAmount`] for
    /// a negative or non-finite number.
    pub fn validate(&self, kind: InvestmentType) -> Result<()> {
        let numeric = [
            ("volatility", self.volatility, InvestmentType::Equity),
            ("dividend_yield", self.dividend_yield, InvestmentType::Equity),
            ("interest_rate", self.interest_rate, InvestmentType::FixedIncome),
            ("admin_fee", self.admin_fee, InvestmentType::Fund),
            ("total_assets", self.total_assets, InvestmentType::Fund),
        ];
        for (field, value, owner) in numeric {
            let Some(value) = value else { continue };
            if owner != kind {
                return Err(Error::Validation {
                    message: format!("`{field}` only applies to {owner} investments, not {kind}"),
                });
            }
            validate_amount(value)?;
        }
        if self.maturity_date.is_some() && kind != InvestmentType::FixedIncome {
            return Err(Error::Validation {
                message: format!(
                    "`maturity_date` only applies to {} investments, not {kind}",
                    InvestmentType::FixedIncome
                ),
            });
        }
        Ok(())
    }
}

/// Input for [`create_investment`]
#[derive(Debug, Clone)]
pub struct NewInvestment {
    /// Display name
    pub name: String,
    /// Ticker or instrument code
    pub code: String,
    /// Investment type
    pub kind: InvestmentType,
    /// Known prices, oldest first
    pub price_history: Vec<f64>,
    /// Type-specific attributes
    pub details: InvestmentDetails,
}

impl NewInvestment {
    /// An investment with no history and no type-specific attributes.
    pub fn new(name: impl Into<String>, code: impl Into<String>, kind: InvestmentType) -> Self {
        Self {
            name: name.into(),
            code: code.into(),
            kind,
            price_history: Vec::new(),
            details: InvestmentDetails::default(),
        }
    }

    /// Same investment with the given price history.
    #[must_use]
    pub fn with_history(mut self, history: Vec<f64>) -> Self {
        self.price_history = history;
        self
    }

    /// Same investment with the given type-specific attributes.
    #[must_use]
    pub const fn with_details(mut self, details: InvestmentDetails) -> Self {
        self.details = details;
        self
    }
}

/// Partial update for [`update_investment`]; `None` leaves a field unchanged
#[derive(Debug, Clone, Default)]
pub struct InvestmentUpdate {
    /// New display name
    pub name: Option<String>,
    /// New code
    pub code: Option<String>,
    /// Replacement price history
    pub price_history: Option<Vec<f64>>,
    /// Replacement type-specific attributes (all six are overwritten)
    pub details: Option<InvestmentDetails>,
}

/// Rows removed by [`delete_investment`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InvestmentDeletion {
    /// Holdings of the investment across all portfolios
    pub portfolio_items: u64,
    /// Favorites pointing at the investment
    pub favorites: u64,
}

/// An investment ranked by price movement
#[derive(Debug, Clone, PartialEq)]
pub struct Performer {
    /// The ranked investment
    pub investment: investment::Model,
    /// Percentage change over the requested window
    pub change_percent: f64,
}

/// Catalog-wide figures
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InvestmentStats {
    /// Number of investments
    pub total: u64,
    /// Number of investments per type; types with none are absent
    pub by_type: BTreeMap<InvestmentType, u64>,
    /// Mean current price over investments that have a history
    pub average_price: f64,
}

pub(crate) fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

fn validate_history(history: &[f64]) -> Result<()> {
    history.iter().copied().try_for_each(validate_amount)
}

/// Creates an investment.
///
/// # Errors
/// [`Error::Validation`] for empty name or code and misplaced type attributes,
/// [`Error::InvalidAmount`] for bad prices, [`Error::Conflict`] when the code exists.
#[instrument(skip(db, new_investment), fields(code = %new_investment.code))]
pub async fn create_investment<C>(db: &C, new_investment: NewInvestment) -> Result<investment::Model>
where
    C: ConnectionTrait,
{
    let name = require_text("Investment name", &new_investment.name)?;
    let code = normalize_code(&require_text("Investment code", &new_investment.code)?);
    validate_history(&new_investment.price_history)?;
    new_investment.details.validate(new_investment.kind)?;

    let details = new_investment.details;
    let now = Utc::now();
    let model = investment::ActiveModel {
        id: Set(Uuid::new_v4().to_string()),
        name: Set(name),
        code: Set(code),
        kind: Set(new_investment.kind),
        price_history: Set(Json::from(new_investment.price_history)),
        volatility: Set(details.volatility),
        dividend_yield: Set(details.dividend_yield),
        interest_rate: Set(details.interest_rate),
        maturity_date: Set(details.maturity_date),
        admin_fee: Set(details.admin_fee),
        total_assets: Set(details.total_assets),
        created_at: Set(now),
        updated_at: Set(now),
    };

    let created = model.insert(db).await?;
    info!("Created investment {} ({})", created.code, created.id);
    Ok(created)
}

/// Finds an investment by id.
pub async fn get_investment_by_id<C>(db: &C, investment_id: &str) -> Result<Option<investment::Model>>
where
    C: ConnectionTrait,
{
    Investment::find_by_id(investment_id)
        .one(db)
        .await
        .map_err(Into::into)
}

/// Finds an investment by code, ignoring case.
pub async fn get_investment_by_code<C>(db: &C, code: &str) -> Result<Option<investment::Model>>
where
    C: ConnectionTrait,
{
    Investment::find()
        .filter(investment::Column::Code.eq(normalize_code(code)))
        .one(db)
        .await
        .map_err(Into::into)
}

pub(crate) async fn require_investment<C>(db: &C, investment_id: &str) -> Result<investment::Model>
where
    C: ConnectionTrait,
{
    get_investment_by_id(db, investment_id)
        .await?
        .ok_or_else(|| Error::NotFound {
            entity: "investment",
            key: investment_id.to_string(),
        })
}

/// Lists investments of one type, ordered by name.
pub async fn list_investments_by_type<C>(db: &C, kind: InvestmentType) -> Result<Vec<investment::Model>>
where
    C: ConnectionTrait,
{
    Investment::find()
        .filter(investment::Column::Kind.eq(kind))
        .order_by_asc(investment::Column::Name)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Investments whose current price lies within `[min, max]`, ordered by name.
///
/// # Errors
/// [`Error::InvalidAmount`] for a negative or non-finite bound, [`Error::Validation`] when
/// `min` exceeds `max`.
pub async fn list_investments_by_price_range<C>(db: &C, min: f64, max: f64) -> Result<Vec<investment::Model>>
where
    C: ConnectionTrait,
{
    validate_amount(min)?;
    validate_amount(max)?;
    if min > max {
        return Err(Error::Validation {
            message: format!("Price range is empty: {min} > {max}"),
        });
    }

    // The current price lives inside the JSON history
    let investments = Investment::find()
        .order_by_asc(investment::Column::Name)
        .all(db)
        .await?;
    Ok(investments
        .into_iter()
        .filter(|investment| (min..=max).contains(&investment.current_price()))
        .collect())
}

/// Fixed income investments maturing within `[from, until]`, soonest first.
pub async fn list_maturing_between<C>(
    db: &C,
    from: DateTime<Utc>,
    until: DateTime<Utc>,
) -> Result<Vec<investment::Model>>
where
    C: ConnectionTrait,
{
    Investment::find()
        .filter(investment::Column::MaturityDate.between(from, until))
        .order_by_asc(investment::Column::MaturityDate)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Case-insensitive substring search over name and code.
pub async fn search_investments<C>(db: &C, query: &str) -> Result<Vec<investment::Model>>
where
    C: ConnectionTrait,
{
    Investment::find()
        .filter(
            Condition::any()
                .add(text_contains(investment::Column::Name, query))
                .add(text_contains(investment::Column::Code, query)),
        )
        .order_by_asc(investment::Column::Name)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Lists investments ordered by name.
pub async fn list_investments<C>(db: &C, options: ListOptions) -> Result<Vec<investment::Model>>
where
    C: ConnectionTrait,
{
    options
        .apply(Investment::find(), investment::Column::Name)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Applies a partial update and refreshes `updated_at`.
#[instrument(skip(db, update))]
pub async fn update_investment<C>(
    db: &C,
    investment_id: &str,
    update: InvestmentUpdate,
) -> Result<investment::Model>
where
    C: ConnectionTrait,
{
    let existing = require_investment(db, investment_id).await?;
    let kind = existing.kind;
    let mut model: investment::ActiveModel = existing.into();

    if let Some(name) = update.name {
        model.name = Set(require_text("Investment name", &name)?);
    }
    if let Some(code) = update.code {
        model.code = Set(normalize_code(&require_text("Investment code", &code)?));
    }
    if let Some(history) = update.price_history {
        validate_history(&history)?;
        model.price_history = Set(Json::from(history));
    }
    if let Some(details) = update.details {
        details.validate(kind)?;
        model.volatility = Set(details.volatility);
        model.dividend_yield = Set(details.dividend_yield);
        model.interest_rate = Set(details.interest_rate);
        model.maturity_date = Set(details.maturity_date);
        model.admin_fee = Set(details.admin_fee);
        model.total_assets = Set(details.total_assets);
    }
    model.updated_at = Set(Utc::now());

    let updated = model.update(db).await?;
    info!("Updated investment {}", updated.code);
    Ok(updated)
}

/// Appends `price` to the history; it becomes the current price.
#[instrument(skip(db))]
pub async fn record_price<C>(db: &C, investment_id: &str, price: f64) -> Result<investment::Model>
where
    C: TransactionTrait,
{
    validate_amount(price)?;
    let txn = db.begin().await?;
    let now = Utc::now();

    // Write first: the history must be read while holding the write lock
    Investment::update_many()
        .col_expr(investment::Column::UpdatedAt, Expr::value(now))
        .filter(investment::Column::Id.eq(investment_id))
        .exec(&txn)
        .await?;
    let existing = require_investment(&txn, investment_id).await?;

    let mut history = existing.prices();
    history.push(price);

    let mut model: investment::ActiveModel = existing.into();
    model.price_history = Set(Json::from(history));
    model.updated_at = Set(now);

    let updated = model.update(&txn).await?;
    txn.commit().await?;
    debug!("Recorded price {} for {}", price, updated.code);
    Ok(updated)
}

async fn ranked<C>(db: &C, periods: usize) -> Result<Vec<Performer>>
where
    C: ConnectionTrait,
{
    let investments = Investment::find().all(db).await?;
    Ok(investments
        .into_iter()
        .filter_map(|investment| {
            let points = investment.prices().len();
            if points < 2 {
                return None;
            }
            // Windows longer than the history fall back to the whole history
            let window = periods.clamp(1, points - 1);
            let change_percent = investment.price_change_percent(window);
            Some(Performer {
                investment,
                change_percent,
            })
        })
        .collect())
}

/// The `limit` investments with the largest rise over the last `periods` points.
pub async fn top_performers<C>(db: &C, limit: usize, periods: usize) -> Result<Vec<Performer>>
where
    C: ConnectionTrait,
{
    let mut performers = ranked(db, periods).await?;
    performers.sort_by(|a, b| b.change_percent.total_cmp(&a.change_percent));
    performers.truncate(limit);
    Ok(performers)
}

/// The `limit` investments with the largest fall over the last `periods` points.
pub async fn worst_performers<C>(db: &C, limit: usize, periods: usize) -> Result<Vec<Performer>>
where
    C: ConnectionTrait,
{
    let mut performers = ranked(db, periods).await?;
    performers.sort_by(|a, b| a.change_percent.total_cmp(&b.change_percent));
    performers.truncate(limit);
    Ok(performers)
}

/// Counts per type and the mean current price.
#[allow(clippy::cast_precision_loss)]
pub async fn investment_stats<C>(db: &C) -> Result<InvestmentStats>
where
    C: ConnectionTrait,
{
    let investments = Investment::find().all(db).await?;

    let mut stats = InvestmentStats::default();
    let mut priced = 0_u32;
    let mut price_sum = 0.0;
    for investment in &investments {
        stats.total += 1;
        *stats.by_type.entry(investment.kind).or_default() += 1;
        if !investment.prices().is_empty() {
            priced += 1;
            price_sum += investment.current_price();
        }
    }
    if priced > 0 {
        stats.average_price = price_sum / f64::from(priced);
    }
    Ok(stats)
}

/// Deletes an investment together with its holdings and favorites.
#[instrument(skip(db))]
pub async fn delete_investment<C>(db: &C, investment_id: &str) -> Result<InvestmentDeletion>
where
    C: TransactionTrait,
{
    let txn = db.begin().await?;
    require_investment(&txn, investment_id).await?;

    let portfolio_items = PortfolioItem::delete_many()
        .filter(portfolio_item::Column::InvestmentId.eq(investment_id))
        .exec(&txn)
        .await?
        .rows_affected;
    let favorites = Favorite::delete_many()
        .filter(favorite::Column::InvestmentId.eq(investment_id))
        .exec(&txn)
        .await?
        .rows_affected;
    Investment::delete_by_id(investment_id).exec(&txn).await?;
    txn.commit().await?;

    let deletion = InvestmentDeletion {
        portfolio_items,
        favorites,
    };
    info!(?deletion, "Deleted investment {}", investment_id);
    Ok(deletion)
}
