//! Investment catalog loading from TOML
//!
//! This module provides functionality to load the initial investment catalog from a TOML
//! file. The investments defined there are used to seed the database on first run or when
//! codes are missing.

use crate::entities::InvestmentType;
use crate::errors::{Error, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::Path;

/// Configuration structure representing the whole catalog file
#[derive(Debug, Deserialize, Default)]
pub struct Catalog {
    /// Investments to seed
    #[serde(default)]
    pub investments: Vec<InvestmentConfig>,
}

/// Configuration for a single investment
#[derive(Debug, Deserialize, Clone)]
pub struct InvestmentConfig {
    /// Name of the investment
    pub name: String,
    /// Unique code (e.g., "PETR4")
    pub code: String,
    /// Kind as written in the file; parsed by [`InvestmentConfig::investment_type`]
    #[serde(rename = "type")]
    pub kind: String,
    /// Known prices, oldest first
    #[serde(default)]
    pub history: Vec<f64>,
    /// Equity volatility in percent
    pub volatility: Option<f64>,
    /// Equity dividend yield in percent
    pub dividend_yield: Option<f64>,
    /// Fixed income interest rate in percent
    pub interest_rate: Option<f64>,
    /// Fixed income maturity date
    pub maturity_date: Option<DateTime<Utc>>,
    /// Fund administration fee in percent
    pub admin_fee: Option<f64>,
    /// Fund total assets
    pub total_assets: Option<f64>,
}

impl InvestmentConfig {
    /// Parses the `type` field.
    ///
    /// # Errors
    /// Returns [`Error::Validation`] for anything outside EQUITY, `FIXED_INCOME` and FUND.
    pub fn investment_type(&self) -> Result<InvestmentType> {
        self.kind.parse()
    }
}

/// Parses a catalog from TOML text.
///
/// # Errors
/// Returns [`Error::Config`] when the TOML is invalid or required fields are missing.
pub fn parse_catalog(contents: &str) -> Result<Catalog> {
    toml::from_str(contents).map_err(|e| Error::Config {
        message: format!("Failed to parse investment catalog: {e}"),
    })
}

/// Loads an investment catalog from a TOML file
///
/// # Errors
/// Returns an error if:
/// - The file cannot be read ([`Error::Io`])
/// - The TOML syntax is invalid
/// - Required fields are missing
pub fn load_catalog<P: AsRef<Path>>(path: P) -> Result<Catalog> {
    let path_ref = path.as_ref();
    tracing::debug!("Loading investment catalog from: {:?}", path_ref);
    let contents = std::fs::read_to_string(path_ref)?;
    parse_catalog(&contents)
}
