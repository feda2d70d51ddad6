//! Price alert entity - Fires once when an investment crosses a target price.
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::errors::Error;

/// Which side of the target price triggers the alert
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertCondition {
    /// Price strictly above the target
    #[sea_orm(string_value = "GREATER_THAN")]
    GreaterThan,
    /// Price strictly below the target
    #[sea_orm(string_value = "LESS_THAN")]
    LessThan,
}

impl AlertCondition {
    /// Whether `price` satisfies the condition against `target`.
    #[must_use]
    pub fn is_met(self, target: f64, price: f64) -> bool {
        match self {
            Self::GreaterThan => price > target,
            Self::LessThan => price < target,
        }
    }
}

impl FromStr for AlertCondition {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        super::parse_string_enum("alert condition", s)
    }
}

impl fmt::Display for AlertCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_value())
    }
}

/// Price alert database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "price_alerts")]
pub struct Model {
    /// Opaque unique identifier (UUID text)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    /// User to notify
    #[sea_orm(indexed)]
    pub user_id: String,
    /// Investment being watched
    #[sea_orm(indexed)]
    pub investment_id: String,
    /// Threshold price
    pub target_price: f64,
    /// Trigger side
    pub condition: AlertCondition,
    /// Inactive alerts are never evaluated
    #[sea_orm(indexed)]
    pub is_active: bool,
    /// When the alert fired, if it has
    pub triggered_at: Option<DateTimeUtc>,
    /// When the alert was created
    pub created_at: DateTimeUtc,
    /// When the row was last modified
    pub updated_at: DateTimeUtc,
}

/// Alerts keep plain ids, no enforced relationships
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
