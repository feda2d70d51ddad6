//! Transaction entity - Append-only record of a buy or sell.
//!
//! Each transaction has a `portfolio_id`, `investment_id`, kind, quantity, unit price,
//! fees (0 when omitted), execution time and optional notes. The references are plain ids
//! without foreign keys so history survives deletion of the portfolio or investment.
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::errors::Error;

/// Direction of a transaction
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    /// Units acquired
    #[sea_orm(string_value = "BUY")]
    Buy,
    /// Units disposed of
    #[sea_orm(string_value = "SELL")]
    Sell,
}

impl FromStr for TransactionKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        super::parse_string_enum("transaction type", s)
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_value())
    }
}

/// Transaction database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "transactions")]
pub struct Model {
    /// Opaque unique identifier (UUID text)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    /// Portfolio the transaction was booked against
    #[sea_orm(indexed)]
    pub portfolio_id: String,
    /// Investment traded
    #[sea_orm(indexed)]
    pub investment_id: String,
    /// Buy or sell
    #[sea_orm(column_name = "type", indexed)]
    pub kind: TransactionKind,
    /// Units traded, always positive
    pub quantity: i32,
    /// Unit price
    pub price: f64,
    /// Brokerage and other fees
    pub fees: f64,
    /// When the trade happened
    #[sea_orm(indexed)]
    pub executed_at: DateTimeUtc,
    /// Free-text notes
    pub notes: Option<String>,
    /// When the row was created
    pub created_at: DateTimeUtc,
}

impl Model {
    /// Cash amount of the trade: quantity times price, plus fees for buys and minus fees
    /// for sells.
    #[must_use]
    pub fn total_amount(&self) -> f64 {
        let gross = f64::from(self.quantity) * self.price;
        match self.kind {
            TransactionKind::Buy => gross + self.fees,
            TransactionKind::Sell => gross - self.fees,
        }
    }
}

/// Transactions keep plain ids, no enforced relationships
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
