//! Investment entity - A tradable asset shared by every user.
//!
//! Investments come in three kinds. Each kind has its own optional attributes; the others
//! stay empty. The price history is an ordered JSON array of numbers, oldest first, and
//! the last point is the current price.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::errors::Error;

/// Kind of investment
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvestmentType {
    /// Listed shares
    #[sea_orm(string_value = "EQUITY")]
    Equity,
    /// Bonds and other fixed-rate instruments
    #[sea_orm(string_value = "FIXED_INCOME")]
    FixedIncome,
    /// Managed investment funds
    #[sea_orm(string_value = "FUND")]
    Fund,
}

impl FromStr for InvestmentType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        super::parse_string_enum("investment type", s)
    }
}

impl fmt::Display for InvestmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_value())
    }
}

/// Investment database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "investments")]
pub struct Model {
    /// Opaque unique identifier (UUID text)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    /// Human-readable name (e.g., "Petrobras PN")
    #[sea_orm(indexed)]
    pub name: String,
    /// Ticker or instrument code, unique and upper-cased (e.g., "PETR4")
    #[sea_orm(unique)]
    pub code: String,
    /// Kind of investment
    #[sea_orm(column_name = "type", indexed)]
    pub kind: InvestmentType,
    /// Historical prices, oldest first
    pub price_history: Json,
    /// Equity only: annualised volatility in percent
    pub volatility: Option<f64>,
    /// Equity only: dividend yield in percent
    pub dividend_yield: Option<f64>,
    /// Fixed income only: interest rate in percent
    pub interest_rate: Option<f64>,
    /// Fixed income only: maturity date
    pub maturity_date: Option<DateTimeUtc>,
    /// Fund only: administration fee in percent
    pub admin_fee: Option<f64>,
    /// Fund only: total assets under management
    pub total_assets: Option<f64>,
    /// When the investment was created
    pub created_at: DateTimeUtc,
    /// When the row was last modified
    pub updated_at: DateTimeUtc,
}

impl Model {
    /// Price history as plain numbers, oldest first.
    #[must_use]
    pub fn prices(&self) -> Vec<f64> {
        self.price_history
            .as_array()
            .map(|points| points.iter().filter_map(Json::as_f64).collect())
            .unwrap_or_default()
    }

    /// Latest known price, or 0 when there is no history yet.
    #[must_use]
    pub fn current_price(&self) -> f64 {
        self.prices().last().copied().unwrap_or(0.0)
    }

    /// Percentage change between the latest price and the one `periods` points earlier.
    ///
    /// Returns 0 when the history is too short or the reference price is zero.
    #[must_use]
    pub fn price_change_percent(&self, periods: usize) -> f64 {
        let prices = self.prices();
        if periods == 0 || prices.len() < periods + 1 {
            return 0.0;
        }
        let current = prices[prices.len() - 1];
        let previous = prices[prices.len() - 1 - periods];
        if previous == 0.0 {
            return 0.0;
        }
        ((current - previous) / previous) * 100.0
    }

    /// Mean of the last `periods` prices, or of the whole history when `None`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn average_price(&self, periods: Option<usize>) -> f64 {
        let prices = self.prices();
        let window = match periods {
            Some(n) if n < prices.len() => &prices[prices.len() - n..],
            _ => &prices[..],
        };
        if window.is_empty() {
            return 0.0;
        }
        window.iter().sum::<f64>() / window.len() as f64
    }
}

/// Defines relationships between Investment and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One investment is held by many portfolio items
    #[sea_orm(has_many = "super::portfolio_item::Entity")]
    PortfolioItems,
    /// One investment is favorited by many users
    #[sea_orm(has_many = "super::favorite::Entity")]
    Favorites,
}

impl Related<super::portfolio_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PortfolioItems.def()
    }
}

impl Related<super::favorite::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Favorites.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
