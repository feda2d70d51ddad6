//! Database configuration module for `StockPulse`.
//!
//! This module handles the backend capability check, the `SQLite` connection and table
//! creation using `SeaORM`. Tables and single-column indexes are generated from the entity
//! definitions with `Schema::create_table_from_entity` and
//! `Schema::create_index_from_entity`, so the database schema always matches the Rust
//! structs. Composite indexes, which the entity attributes cannot express, are declared
//! here. Every statement is `IF NOT EXISTS`, so opening an existing database is a no-op.

use crate::config::database_scheme;
use crate::entities::{
    Favorite, Investment, MarketData, Notification, PerformanceReport, Portfolio, PortfolioItem,
    PriceAlert, SystemLog, Transaction, User, favorite, performance_report, portfolio_item,
    system_log,
};
use crate::errors::{Error, Result};
use sea_orm::sea_query::{Index, IndexCreateStatement};
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, EntityTrait, Schema};
use tracing::{debug, info, instrument};

/// URL schemes this build can serve.
pub const SUPPORTED_SCHEMES: &[&str] = &["sqlite"];

/// Fails fast when the configured backend is not compiled into this build.
///
/// # Errors
/// Returns [`Error::EnvironmentUnsupported`] naming the requested backend and this build,
/// or [`Error::Config`] when the URL has no scheme at all.
pub fn ensure_backend_supported(database_url: &str) -> Result<()> {
    let scheme = database_scheme(database_url).ok_or_else(|| Error::Config {
        message: format!("`{database_url}` has no backend scheme"),
    })?;

    if SUPPORTED_SCHEMES.contains(&scheme) {
        return Ok(());
    }

    Err(Error::EnvironmentUnsupported {
        backend: scheme.to_string(),
        runtime: format!(
            "{} {} (drivers: {})",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
            SUPPORTED_SCHEMES.join(", ")
        ),
    })
}

/// Establishes a connection to the database named by `database_url`.
///
/// The backend is checked before any connection attempt. Connection failures surface as
/// [`Error::Connection`].
#[instrument(skip(database_url))]
pub async fn create_connection(database_url: &str) -> Result<DatabaseConnection> {
    ensure_backend_supported(database_url)?;
    debug!("Connecting to backing store");
    Database::connect(database_url)
        .await
        .map_err(|e| Error::Connection {
            message: e.to_string(),
        })
}

/// Creates all tables and indexes using `SeaORM`'s schema generation from entity definitions.
///
/// Parents are created before children so foreign keys resolve.
#[instrument(skip(db))]
pub async fn create_tables(db: &DatabaseConnection) -> Result<()> {
    let schema = Schema::new(db.get_database_backend());

    create_entity_table(db, &schema, User).await?;
    create_entity_table(db, &schema, Investment).await?;
    create_entity_table(db, &schema, Portfolio).await?;
    create_entity_table(db, &schema, PortfolioItem).await?;
    create_entity_table(db, &schema, Favorite).await?;
    create_entity_table(db, &schema, Notification).await?;
    create_entity_table(db, &schema, SystemLog).await?;
    create_entity_table(db, &schema, MarketData).await?;
    create_entity_table(db, &schema, Transaction).await?;
    create_entity_table(db, &schema, PriceAlert).await?;
    create_entity_table(db, &schema, PerformanceReport).await?;

    let builder = db.get_database_backend();
    for index in composite_indexes() {
        db.execute(builder.build(&index)).await?;
    }

    info!("Database tables ensured.");
    Ok(())
}

async fn create_entity_table<E>(db: &DatabaseConnection, schema: &Schema, entity: E) -> Result<()>
where
    E: EntityTrait,
{
    let builder = db.get_database_backend();

    let mut table = schema.create_table_from_entity(entity);
    table.if_not_exists();
    db.execute(builder.build(&table)).await?;

    for mut index in schema.create_index_from_entity(entity) {
        index.if_not_exists();
        db.execute(builder.build(&index)).await?;
    }
    Ok(())
}

fn composite_indexes() -> Vec<IndexCreateStatement> {
    vec![
        Index::create()
            .name("idx_portfolio_items_portfolio_investment")
            .table(PortfolioItem)
            .col(portfolio_item::Column::PortfolioId)
            .col(portfolio_item::Column::InvestmentId)
            .unique()
            .if_not_exists()
            .to_owned(),
        Index::create()
            .name("idx_favorites_user_investment")
            .table(Favorite)
            .col(favorite::Column::UserId)
            .col(favorite::Column::InvestmentId)
            .unique()
            .if_not_exists()
            .to_owned(),
        Index::create()
            .name("idx_system_logs_type_source")
            .table(SystemLog)
            .col(system_log::Column::Level)
            .col(system_log::Column::Source)
            .if_not_exists()
            .to_owned(),
        Index::create()
            .name("idx_performance_reports_period_range")
            .table(PerformanceReport)
            .col(performance_report::Column::PeriodStart)
            .col(performance_report::Column::PeriodEnd)
            .if_not_exists()
            .to_owned(),
    ]
}
