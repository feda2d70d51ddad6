//! Market data entity - Latest quote per instrument code. Append-only.
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Market data database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "market_data")]
pub struct Model {
    /// Opaque unique identifier (UUID text)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    /// Instrument code, unique and upper-cased
    #[sea_orm(unique)]
    pub code: String,
    /// Quoted price
    pub price: f64,
    /// Change versus the previous close
    pub change: f64,
    /// Traded volume
    pub volume: i64,
    /// When the quote was taken
    #[sea_orm(indexed)]
    pub quoted_at: DateTimeUtc,
    /// When the row was created
    pub created_at: DateTimeUtc,
}

/// `MarketData` has no relationships with other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
