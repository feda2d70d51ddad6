//! Portfolio item entity - One holding of an investment inside a portfolio.
//!
//! A portfolio holds each investment at most once; repeated purchases are merged into the
//! existing row with a weighted average `purchase_price`. The row disappears when either
//! its portfolio or its investment is deleted.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Portfolio item database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "portfolio_items")]
pub struct Model {
    /// Opaque unique identifier (UUID text)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    /// Portfolio holding the investment
    #[sea_orm(indexed)]
    pub portfolio_id: String,
    /// Investment being held
    #[sea_orm(indexed)]
    pub investment_id: String,
    /// Units held, never negative
    pub quantity: i32,
    /// Average price paid per unit
    pub purchase_price: f64,
    /// When the holding was (first) bought
    pub purchased_at: DateTimeUtc,
    /// When the row was created
    pub created_at: DateTimeUtc,
    /// When the row was last modified
    pub updated_at: DateTimeUtc,
}

impl Model {
    /// Amount paid for the whole holding.
    #[must_use]
    pub fn invested_value(&self) -> f64 {
        f64::from(self.quantity) * self.purchase_price
    }
}

/// Defines relationships between `PortfolioItem` and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each item belongs to one portfolio
    #[sea_orm(
        belongs_to = "super::portfolio::Entity",
        from = "Column::PortfolioId",
        to = "super::portfolio::Column::Id",
        on_delete = "Cascade"
    )]
    Portfolio,
    /// Each item references one investment
    #[sea_orm(
        belongs_to = "super::investment::Entity",
        from = "Column::InvestmentId",
        to = "super::investment::Column::Id",
        on_delete = "Cascade"
    )]
    Investment,
}

impl Related<super::portfolio::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Portfolio.def()
    }
}

impl Related<super::investment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Investment.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
