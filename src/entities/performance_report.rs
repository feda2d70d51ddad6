//! Performance report entity - Return of a portfolio over a period.
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::errors::Error;

/// Length of the period a report covers
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportPeriod {
    /// One day
    #[sea_orm(string_value = "DAILY")]
    Daily,
    /// One week
    #[sea_orm(string_value = "WEEKLY")]
    Weekly,
    /// One month
    #[sea_orm(string_value = "MONTHLY")]
    Monthly,
    /// One year
    #[sea_orm(string_value = "ANNUAL")]
    Annual,
}

impl FromStr for ReportPeriod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        super::parse_string_enum("report period", s)
    }
}

impl fmt::Display for ReportPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_value())
    }
}

/// Performance report database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "performance_reports")]
pub struct Model {
    /// Opaque unique identifier (UUID text)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    /// Portfolio the report describes
    #[sea_orm(indexed)]
    pub portfolio_id: String,
    /// Period label
    #[sea_orm(indexed)]
    pub period: ReportPeriod,
    /// Portfolio value at `period_start`
    pub initial_value: f64,
    /// Portfolio value at `period_end`
    pub final_value: f64,
    /// Return over the period in percent
    pub return_rate: f64,
    /// Benchmark return over the same period in percent
    pub benchmark: Option<f64>,
    /// Start of the period
    pub period_start: DateTimeUtc,
    /// End of the period
    pub period_end: DateTimeUtc,
    /// When the row was created
    pub created_at: DateTimeUtc,
}

impl Model {
    /// Return minus benchmark, when a benchmark was recorded.
    #[must_use]
    pub fn excess_return(&self) -> Option<f64> {
        self.benchmark.map(|b| self.return_rate - b)
    }
}

/// Reports keep plain ids, no enforced relationships
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
