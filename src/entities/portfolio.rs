//! Portfolio entity - A named collection of holdings owned by one user.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Portfolio database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "portfolios")]
pub struct Model {
    /// Opaque unique identifier (UUID text)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    /// Portfolio name (e.g., "Retirement")
    #[sea_orm(indexed)]
    pub name: String,
    /// Optional free-text description
    pub description: Option<String>,
    /// Owning user
    #[sea_orm(indexed)]
    pub user_id: String,
    /// When the portfolio was created
    pub created_at: DateTimeUtc,
    /// When the row was last modified
    pub updated_at: DateTimeUtc,
}

/// Defines relationships between Portfolio and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each portfolio belongs to one user; removed with it
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id",
        on_delete = "Cascade"
    )]
    User,
    /// One portfolio has many holdings
    #[sea_orm(has_many = "super::portfolio_item::Entity")]
    Items,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl Related<super::portfolio_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Items.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
