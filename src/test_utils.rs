//! Shared test utilities for `StockPulse`.
//!
//! This module provides common helper functions for setting up test databases
//! and creating test entities with sensible defaults.

use crate::{
    core::{
        investment::{self, NewInvestment},
        portfolio::{self, NewPortfolio, NewPortfolioItem},
        user::{self, NewUser},
    },
    entities::{self, InvestmentType},
    errors::Result,
};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use tempfile::TempDir;

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all integration tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// Creates a file-backed `SQLite` database served by a pool of `max_connections`.
///
/// Use this when a test needs real concurrent connections. The database lives as long as
/// the returned directory.
pub async fn setup_file_test_db(max_connections: u32) -> Result<(TempDir, DatabaseConnection)> {
    let dir = tempfile::tempdir()?;
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("test.sqlite").display());

    let mut options = ConnectOptions::new(url);
    options.max_connections(max_connections).sqlx_logging(false);
    let db = Database::connect(options).await?;
    crate::config::database::create_tables(&db).await?;
    Ok((dir, db))
}

/// Routes `tracing` output through the test harness. Safe to call from every test.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init();
}

/// Creates a test user named after the local part of `email`.
///
/// # Defaults
/// * password: "Test@1234"
pub async fn create_test_user(db: &DatabaseConnection, email: &str) -> Result<entities::user::Model> {
    let name = email.split('@').next().unwrap_or(email);
    user::create_user(db, NewUser::new(name, email, "Test@1234")).await
}

/// Creates an equity investment with a short price history.
///
/// # Defaults
/// * name: "`<code>` Test"
/// * history: [25.0, 27.0, 28.5] (current price 28.5)
pub async fn create_test_investment(
    db: &DatabaseConnection,
    code: &str,
) -> Result<entities::investment::Model> {
    investment::create_investment(
        db,
        NewInvestment::new(format!("{code} Test"), code, InvestmentType::Equity)
            .with_history(vec![25.0, 27.0, 28.5]),
    )
    .await
}

/// Creates a portfolio without description for `user_id`.
pub async fn create_test_portfolio(
    db: &DatabaseConnection,
    user_id: &str,
    name: &str,
) -> Result<entities::portfolio::Model> {
    portfolio::create_portfolio(db, NewPortfolio::new(user_id, name)).await
}

/// Adds a holding purchased now.
pub async fn create_test_item(
    db: &DatabaseConnection,
    portfolio_id: &str,
    investment_id: &str,
    quantity: i32,
    purchase_price: f64,
) -> Result<entities::portfolio_item::Model> {
    portfolio::add_item(
        db,
        NewPortfolioItem::new(portfolio_id, investment_id, quantity, purchase_price),
    )
    .await
}

/// Creates a user, one of their portfolios and an investment (code "PETR4").
/// Use this when a test only needs somewhere to put holdings.
pub async fn setup_portfolio_with_investment(
    db: &DatabaseConnection,
) -> Result<(entities::portfolio::Model, entities::investment::Model)> {
    let owner = create_test_user(db, "owner@x.com").await?;
    let portfolio = create_test_portfolio(db, &owner.id, "Main").await?;
    let investment = create_test_investment(db, "PETR4").await?;
    Ok((portfolio, investment))
}
