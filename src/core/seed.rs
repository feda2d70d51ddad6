//! Catalog seeding - Inserts configured investments that are not in the database yet.

use crate::{
    config::investments::{Catalog, InvestmentConfig},
    core::investment::{InvestmentDetails, NewInvestment, create_investment, get_investment_by_code},
    errors::Result,
};
use sea_orm::TransactionTrait;
use tracing::{info, instrument, warn};

/// Outcome of [`seed_investments`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedSummary {
    /// Catalog entries inserted
    pub inserted: usize,
    /// Catalog entries whose code already existed
    pub skipped: usize,
}

fn to_new_investment(entry: &InvestmentConfig) -> Result<NewInvestment> {
    Ok(NewInvestment::new(&entry.name, &entry.code, entry.investment_type()?)
        .with_history(entry.history.clone())
        .with_details(InvestmentDetails {
            volatility: entry.volatility,
            dividend_yield: entry.dividend_yield,
            interest_rate: entry.interest_rate,
            maturity_date: entry.maturity_date,
            admin_fee: entry.admin_fee,
            total_assets: entry.total_assets,
        }))
}

/// Inserts every catalog investment whose code is not present yet.
///
/// Runs in one database transaction: an invalid entry aborts the whole seed and nothing
/// is inserted.
#[instrument(skip(db, catalog), fields(entries = catalog.investments.len()))]
pub async fn seed_investments<C>(db: &C, catalog: &Catalog) -> Result<SeedSummary>
where
    C: TransactionTrait,
{
    let txn = db.begin().await?;
    let mut summary = SeedSummary::default();

    for entry in &catalog.investments {
        let new_investment = to_new_investment(entry)?;
        if get_investment_by_code(&txn, &new_investment.code).await?.is_some() {
            warn!("Investment {} already exists, skipping", entry.code);
            summary.skipped += 1;
            continue;
        }
        create_investment(&txn, new_investment).await?;
        summary.inserted += 1;
    }

    txn.commit().await?;
    info!(
        "Seeded investments: {} inserted, {} skipped",
        summary.inserted, summary.skipped
    );
    Ok(summary)
}
