//! Entity module - Contains all `SeaORM` entity definitions for the database.
//! These entities represent the database tables and their relationships.
//! Each entity has a Model struct for data and an Entity struct for operations.

pub mod favorite;
pub mod investment;
pub mod market_data;
pub mod notification;
pub mod performance_report;
pub mod portfolio;
pub mod portfolio_item;
pub mod price_alert;
pub mod system_log;
pub mod transaction;
pub mod user;

// Re-export specific types to avoid conflicts
pub use favorite::{Column as FavoriteColumn, Entity as Favorite, Model as FavoriteModel};
pub use investment::{
    Column as InvestmentColumn, Entity as Investment, InvestmentType, Model as InvestmentModel,
};
pub use market_data::{
    Column as MarketDataColumn, Entity as MarketData, Model as MarketDataModel,
};
pub use notification::{
    Column as NotificationColumn, Entity as Notification, Model as NotificationModel,
};
pub use performance_report::{
    Column as PerformanceReportColumn, Entity as PerformanceReport,
    Model as PerformanceReportModel, ReportPeriod,
};
pub use portfolio::{Column as PortfolioColumn, Entity as Portfolio, Model as PortfolioModel};
pub use portfolio_item::{
    Column as PortfolioItemColumn, Entity as PortfolioItem, Model as PortfolioItemModel,
};
pub use price_alert::{
    AlertCondition, Column as PriceAlertColumn, Entity as PriceAlert, Model as PriceAlertModel,
};
pub use system_log::{
    Column as SystemLogColumn, Entity as SystemLog, LogLevel, Model as SystemLogModel,
};
pub use transaction::{
    Column as TransactionColumn, Entity as Transaction, Model as TransactionModel,
    TransactionKind,
};
pub use user::{Column as UserColumn, Entity as User, Model as UserModel};

use crate::errors::{Error, Result};
use sea_orm::{ActiveEnum, Iterable};

/// Parses the canonical upper-snake form of a string-backed enum.
///
/// Input is trimmed and upper-cased, and dashes or spaces are read as underscores, so
/// `"fixed-income"` and `"FIXED_INCOME"` are the same value.
pub(crate) fn parse_string_enum<E>(kind: &str, raw: &str) -> Result<E>
where
    E: ActiveEnum<Value = String> + Iterable,
{
    let wanted = raw.trim().to_uppercase().replace(['-', ' '], "_");
    E::iter()
        .find(|variant| variant.to_value() == wanted)
        .ok_or_else(|| Error::Validation {
            message: format!("unknown {kind} `{raw}`"),
        })
}
