//! Report generation business logic.
//!
//! [`portfolio_summary`] values a portfolio's holdings at the investments' current prices
//! and derives totals, return and allocation. Performance reports store the outcome of a
//! period; they keep a plain portfolio id and survive the portfolio's deletion.

use crate::{
    core::{portfolio::require_portfolio, validate_amount},
    entities::{Investment, InvestmentType, PerformanceReport, Portfolio, PortfolioItem, ReportPeriod,
        investment, performance_report, portfolio, portfolio_item},
    errors::{Error, Result},
};
use chrono::{DateTime, Utc};
use sea_orm::{QueryOrder, Set, prelude::*};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Largest share of one investment type, in percent, that still counts as diversified.
pub const MAX_TYPE_SHARE_PERCENT: f64 = 70.0;

/// One valued holding
#[derive(Debug, Clone, PartialEq)]
pub struct HoldingSummary {
    /// The holding
    pub item: portfolio_item::Model,
    /// The investment held
    pub investment: investment::Model,
    /// Latest price of the investment
    pub current_price: f64,
    /// Quantity times current price
    pub market_value: f64,
    /// Quantity times purchase price
    pub invested_value: f64,
    /// Market value minus invested value
    pub profit_loss: f64,
    /// Profit or loss relative to invested value, in percent
    pub return_percent: f64,
}

/// A portfolio valued at current prices
#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioSummary {
    /// Portfolio summarised
    pub portfolio_id: String,
    /// Valued holdings, in the order they were added
    pub holdings: Vec<HoldingSummary>,
    /// Sum of market values
    pub total_value: f64,
    /// Sum of invested values
    pub invested_value: f64,
    /// Total value minus invested value
    pub profit_loss: f64,
    /// Profit or loss relative to invested value, in percent
    pub return_percent: f64,
    /// Share of total value per investment type, in percent
    pub allocation: BTreeMap<InvestmentType, f64>,
    /// At least two types held and none above [`MAX_TYPE_SHARE_PERCENT`]
    pub diversified: bool,
}

impl PortfolioSummary {
    /// One investment type holds more than [`MAX_TYPE_SHARE_PERCENT`] of the value.
    #[must_use]
    pub fn needs_rebalancing(&self) -> bool {
        self.allocation.values().any(|share| *share > MAX_TYPE_SHARE_PERCENT)
    }
}

/// Aggregate figures over all portfolios
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PortfolioStats {
    /// Number of portfolios
    pub total: u64,
    /// Sum of all portfolio values at current prices
    pub total_value: f64,
    /// Mean portfolio value, 0 without portfolios
    pub average_value: f64,
    /// Mean number of holdings per portfolio
    pub average_holdings: f64,
    /// Portfolio count per owner id
    pub by_user: BTreeMap<String, u64>,
}

/// Input for [`create_performance_report`]
#[derive(Debug, Clone)]
pub struct NewPerformanceReport {
    /// Portfolio reported on
    pub portfolio_id: String,
    /// Length of the period
    pub period: ReportPeriod,
    /// Value at the start of the period
    pub initial_value: f64,
    /// Value at the end of the period
    pub final_value: f64,
    /// Benchmark return for the period, in percent
    pub benchmark: Option<f64>,
    /// Start of the period
    pub period_start: DateTime<Utc>,
    /// End of the period
    pub period_end: DateTime<Utc>,
}

/// Return in percent; 0 when nothing was invested.
#[must_use]
pub fn return_percent(initial: f64, current: f64) -> f64 {
    if initial == 0.0 {
        return 0.0;
    }
    (current - initial) / initial * 100.0
}

/// Values every holding of a portfolio at current prices.
///
/// # Errors
/// [`Error::NotFound`] when the portfolio does not exist.
#[instrument(skip(db))]
pub async fn portfolio_summary<C>(db: &C, portfolio_id: &str) -> Result<PortfolioSummary>
where
    C: ConnectionTrait,
{
    require_portfolio(db, portfolio_id).await?;
    let rows = PortfolioItem::find()
        .find_also_related(Investment)
        .filter(portfolio_item::Column::PortfolioId.eq(portfolio_id))
        .order_by_asc(portfolio_item::Column::CreatedAt)
        .all(db)
        .await?;

    Ok(summarise(portfolio_id.to_string(), rows))
}

fn summarise(
    portfolio_id: String,
    rows: Vec<(portfolio_item::Model, Option<investment::Model>)>,
) -> PortfolioSummary {
    let holdings: Vec<HoldingSummary> = rows
        .into_iter()
        .filter_map(|(item, investment)| investment.map(|investment| (item, investment)))
        .map(|(item, investment)| {
            let current_price = investment.current_price();
            let market_value = f64::from(item.quantity) * current_price;
            let invested_value = item.invested_value();
            HoldingSummary {
                current_price,
                market_value,
                invested_value,
                profit_loss: market_value - invested_value,
                return_percent: return_percent(invested_value, market_value),
                item,
                investment,
            }
        })
        .collect();

    let total_value: f64 = holdings.iter().map(|h| h.market_value).sum();
    let invested_value: f64 = holdings.iter().map(|h| h.invested_value).sum();

    let mut by_type: BTreeMap<InvestmentType, f64> = BTreeMap::new();
    for holding in &holdings {
        *by_type.entry(holding.investment.kind).or_default() += holding.market_value;
    }
    let allocation: BTreeMap<InvestmentType, f64> = by_type
        .into_iter()
        .map(|(kind, value)| {
            let share = if total_value > 0.0 { value / total_value * 100.0 } else { 0.0 };
            (kind, share)
        })
        .collect();
    let diversified = allocation.len() >= 2
        && allocation.values().all(|share| *share <= MAX_TYPE_SHARE_PERCENT);

    PortfolioSummary {
        portfolio_id,
        holdings,
        total_value,
        invested_value,
        profit_loss: total_value - invested_value,
        return_percent: return_percent(invested_value, total_value),
        allocation,
        diversified,
    }
}

/// Every portfolio with its summary, oldest portfolio first.
///
/// Holdings are loaded in one query and grouped in memory.
pub async fn all_portfolio_summaries<C>(db: &C) -> Result<Vec<(portfolio::Model, PortfolioSummary)>>
where
    C: ConnectionTrait,
{
    let portfolios = Portfolio::find()
        .order_by_asc(portfolio::Column::CreatedAt)
        .all(db)
        .await?;
    let mut rows_by_portfolio: HashMap<String, Vec<_>> = HashMap::new();
    for (item, investment) in PortfolioItem::find()
        .find_also_related(Investment)
        .order_by_asc(portfolio_item::Column::CreatedAt)
        .all(db)
        .await?
    {
        rows_by_portfolio
            .entry(item.portfolio_id.clone())
            .or_default()
            .push((item, investment));
    }

    Ok(portfolios
        .into_iter()
        .map(|portfolio| {
            let rows = rows_by_portfolio.remove(&portfolio.id).unwrap_or_default();
            let summary = summarise(portfolio.id.clone(), rows);
            (portfolio, summary)
        })
        .collect())
}

/// Portfolios, across all users, holding at least two types with none above
/// [`MAX_TYPE_SHARE_PERCENT`].
pub async fn list_diversified_portfolios<C>(db: &C) -> Result<Vec<portfolio::Model>>
where
    C: ConnectionTrait,
{
    Ok(all_portfolio_summaries(db)
        .await?
        .into_iter()
        .filter(|(_, summary)| summary.diversified)
        .map(|(portfolio, _)| portfolio)
        .collect())
}

/// Portfolios, across all users, where one type exceeds [`MAX_TYPE_SHARE_PERCENT`].
pub async fn list_portfolios_needing_rebalancing<C>(db: &C) -> Result<Vec<portfolio::Model>>
where
    C: ConnectionTrait,
{
    Ok(all_portfolio_summaries(db)
        .await?
        .into_iter()
        .filter(|(_, summary)| summary.needs_rebalancing())
        .map(|(portfolio, _)| portfolio)
        .collect())
}

/// Totals over every portfolio at current prices.
#[instrument(skip(db))]
pub async fn portfolio_stats<C>(db: &C) -> Result<PortfolioStats>
where
    C: ConnectionTrait,
{
    let summaries = all_portfolio_summaries(db).await?;

    let mut stats = PortfolioStats::default();
    let mut holdings = 0_usize;
    for (portfolio, summary) in &summaries {
        stats.total += 1;
        stats.total_value += summary.total_value;
        holdings += summary.holdings.len();
        *stats.by_user.entry(portfolio.user_id.clone()).or_default() += 1;
    }
    if stats.total > 0 {
        #[allow(clippy::cast_precision_loss)]
        let total = stats.total as f64;
        stats.average_value = stats.total_value / total;
        #[allow(clippy::cast_precision_loss)]
        let held = holdings as f64;
        stats.average_holdings = held / total;
    }
    debug!(total = stats.total, "Computed portfolio stats");
    Ok(stats)
}

/// Stores a performance report, computing its return rate.
///
/// # Errors
/// [`Error::InvalidAmount`] unless the initial value is positive and the final value valid,
/// [`Error::Validation`] when the period ends before it starts, [`Error::NotFound`] for an
/// unknown portfolio.
#[instrument(skip(db, report), fields(portfolio_id = %report.portfolio_id, period = %report.period))]
pub async fn create_performance_report<C>(db: &C, report: NewPerformanceReport) -> Result<performance_report::Model>
where
    C: ConnectionTrait,
{
    if !report.initial_value.is_finite() || report.initial_value <= 0.0 {
        return Err(Error::InvalidAmount {
            amount: report.initial_value,
        });
    }
    validate_amount(report.final_value)?;
    if let Some(benchmark) = report.benchmark.filter(|b| !b.is_finite()) {
        return Err(Error::InvalidAmount { amount: benchmark });
    }
    if report.period_end < report.period_start {
        return Err(Error::Validation {
            message: format!(
                "Report period ends ({}) before it starts ({})",
                report.period_end, report.period_start
            ),
        });
    }
    require_portfolio(db, &report.portfolio_id).await?;

    let model = performance_report::ActiveModel {
        id: Set(Uuid::new_v4().to_string()),
        portfolio_id: Set(report.portfolio_id),
        period: Set(report.period),
        initial_value: Set(report.initial_value),
        final_value: Set(report.final_value),
        return_rate: Set(return_percent(report.initial_value, report.final_value)),
        benchmark: Set(report.benchmark),
        period_start: Set(report.period_start),
        period_end: Set(report.period_end),
        created_at: Set(Utc::now()),
    };
    let created = model.insert(db).await?;
    info!("Stored {} report {} ({:.2}%)", created.period, created.id, created.return_rate);
    Ok(created)
}

/// Stores a report ending now whose final value is the portfolio's current total value.
pub async fn record_performance_snapshot<C>(
    db: &C,
    portfolio_id: &str,
    period: ReportPeriod,
    initial_value: f64,
    period_start: DateTime<Utc>,
) -> Result<performance_report::Model>
where
    C: ConnectionTrait,
{
    let summary = portfolio_summary(db, portfolio_id).await?;
    create_performance_report(
        db,
        NewPerformanceReport {
            portfolio_id: portfolio_id.to_string(),
            period,
            initial_value,
            final_value: summary.total_value,
            benchmark: None,
            period_start,
            period_end: Utc::now(),
        },
    )
    .await
}

/// A portfolio's reports, latest period first, optionally of one period length.
pub async fn list_reports_for_portfolio<C>(
    db: &C,
    portfolio_id: &str,
    period: Option<ReportPeriod>,
) -> Result<Vec<performance_report::Model>>
where
    C: ConnectionTrait,
{
    let mut select = PerformanceReport::find().filter(performance_report::Column::PortfolioId.eq(portfolio_id));
    if let Some(period) = period {
        select = select.filter(performance_report::Column::Period.eq(period));
    }
    select
        .order_by_desc(performance_report::Column::PeriodStart)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Reports whose period intersects `[start, end]`, earliest first.
pub async fn list_reports_overlapping<C>(
    db: &C,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<performance_report::Model>>
where
    C: ConnectionTrait,
{
    PerformanceReport::find()
        .filter(performance_report::Column::PeriodStart.lte(end))
        .filter(performance_report::Column::PeriodEnd.gte(start))
        .order_by_asc(performance_report::Column::PeriodStart)
        .all(db)
        .await
        .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::core::investment::{NewInvestment, create_investment};
    use crate::test_utils::*;
    use chrono::Duration;

    #[test]
    fn test_return_percent() {
        assert_eq!(return_percent(100.0, 110.0), 10.0);
        assert_eq!(return_percent(200.0, 150.0), -25.0);
        assert_eq!(return_percent(0.0, 50.0), 0.0);
    }

    #[tokio::test]
    async fn test_summary_of_empty_portfolio() -> Result<()> {
        let db = setup_test_db().await?;
        let user = create_test_user(&db, "a@x.com").await?;
        let portfolio = create_test_portfolio(&db, &user.id, "Empty").await?;

        let summary = portfolio_summary(&db, &portfolio.id).await?;
        assert!(summary.holdings.is_empty());
        assert_eq!(summary.total_value, 0.0);
        assert_eq!(summary.return_percent, 0.0);
        assert!(!summary.diversified);

        assert!(matches!(
            portfolio_summary(&db, "ghost").await,
            Err(Error::NotFound { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_screening_and_stats_across_users() -> Result<()> {
        let db = setup_test_db().await?;
        let ana = create_test_user(&db, "ana@x.com").await?;
        let bob = create_test_user(&db, "bob@x.com").await?;
        let mixed = create_test_portfolio(&db, &ana.id, "Mixed").await?;
        create_test_portfolio(&db, &ana.id, "Empty").await?;
        let concentrated = create_test_portfolio(&db, &bob.id, "Concentrated").await?;

        let equity = create_investment(
            &db,
            NewInvestment::new("Equity", "EQTY3", InvestmentType::Equity).with_history(vec![10.0, 12.0]),
        )
        .await?;
        let fund = create_investment(
            &db,
            NewInvestment::new("Fund", "FUND11", InvestmentType::Fund).with_history(vec![100.0]),
        )
        .await?;
        create_test_item(&db, &mixed.id, &equity.id, 50, 10.0).await?;
        create_test_item(&db, &mixed.id, &fund.id, 4, 100.0).await?;
        create_test_item(&db, &concentrated.id, &equity.id, 10, 10.0).await?;

        let diversified = list_diversified_portfolios(&db).await?;
        assert_eq!(diversified.len(), 1);
        assert_eq!(diversified[0].id, mixed.id);

        let rebalance = list_portfolios_needing_rebalancing(&db).await?;
        assert_eq!(rebalance.len(), 1);
        assert_eq!(rebalance[0].id, concentrated.id);

        let stats = portfolio_stats(&db).await?;
        assert_eq!(stats.total, 3);
        assert_eq!(stats.total_value, 1120.0);
        assert!((stats.average_value - 373.333_333).abs() < 1e-5);
        assert_eq!(stats.average_holdings, 1.0);
        assert_eq!(stats.by_user.get(&ana.id), Some(&2));
        assert_eq!(stats.by_user.get(&bob.id), Some(&1));
        Ok(())
    }

    #[tokio::test]
    async fn test_stats_without_portfolios() -> Result<()> {
        let db = setup_test_db().await?;
        assert_eq!(portfolio_stats(&db).await?, PortfolioStats::default());
        assert!(list_diversified_portfolios(&db).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_summary_values_and_allocation() -> Result<()> {
        let db = setup_test_db().await?;
        let user = create_test_user(&db, "a@x.com").await?;
        let portfolio = create_test_portfolio(&db, &user.id, "Mixed").await?;
        let equity = create_investment(
            &db,
            NewInvestment::new("Equity", "EQTY3", InvestmentType::Equity).with_history(vec![10.0, 12.0]),
        )
        .await?;
        let fund = create_investment(
            &db,
            NewInvestment::new("Fund", "FUND11", InvestmentType::Fund).with_history(vec![100.0]),
        )
        .await?;
        create_test_item(&db, &portfolio.id, &equity.id, 50, 10.0).await?;
        create_test_item(&db, &portfolio.id, &fund.id, 4, 100.0).await?;

        let summary = portfolio_summary(&db, &portfolio.id).await?;
        assert_eq!(summary.holdings.len(), 2);
        assert_eq!(summary.holdings[0].market_value, 600.0);
        assert_eq!(summary.holdings[0].profit_loss, 100.0);
        assert_eq!(summary.total_value, 1000.0);
        assert_eq!(summary.invested_value, 900.0);
        assert_eq!(summary.profit_loss, 100.0);
        assert!((summary.return_percent - 11.111_111).abs() < 1e-5);
        assert_eq!(summary.allocation.get(&InvestmentType::Equity), Some(&60.0));
        assert_eq!(summary.allocation.get(&InvestmentType::Fund), Some(&40.0));
        assert!(summary.diversified);
        Ok(())
    }

    #[tokio::test]
    async fn test_concentrated_portfolio_is_not_diversified() -> Result<()> {
        let db = setup_test_db().await?;
        let user = create_test_user(&db, "a@x.com").await?;
        let portfolio = create_test_portfolio(&db, &user.id, "Heavy").await?;
        let equity = create_investment(
            &db,
            NewInvestment::new("Equity", "EQTY3", InvestmentType::Equity).with_history(vec![10.0]),
        )
        .await?;
        let fund = create_investment(
            &db,
            NewInvestment::new("Fund", "FUND11", InvestmentType::Fund).with_history(vec![10.0]),
        )
        .await?;
        create_test_item(&db, &portfolio.id, &equity.id, 80, 10.0).await?;
        create_test_item(&db, &portfolio.id, &fund.id, 20, 10.0).await?;

        let summary = portfolio_summary(&db, &portfolio.id).await?;
        assert_eq!(summary.allocation.get(&InvestmentType::Equity), Some(&80.0));
        assert!(!summary.diversified);
        Ok(())
    }

    #[tokio::test]
    async fn test_create_performance_report() -> Result<()> {
        let db = setup_test_db().await?;
        let user = create_test_user(&db, "a@x.com").await?;
        let portfolio = create_test_portfolio(&db, &user.id, "Main").await?;
        let start = Utc::now() - Duration::days(30);
        let end = Utc::now();

        let report = create_performance_report(
            &db,
            NewPerformanceReport {
                portfolio_id: portfolio.id.clone(),
                period: ReportPeriod::Monthly,
                initial_value: 1000.0,
                final_value: 1150.0,
                benchmark: Some(10.0),
                period_start: start,
                period_end: end,
            },
        )
        .await?;
        assert_eq!(report.return_rate, 15.0);
        assert_eq!(report.excess_return(), Some(5.0));

        let zero_initial = create_performance_report(
            &db,
            NewPerformanceReport {
                initial_value: 0.0,
                ..new_report(&portfolio.id, start, end)
            },
        )
        .await;
        assert!(matches!(zero_initial, Err(Error::InvalidAmount { .. })));

        let reversed = create_performance_report(&db, new_report(&portfolio.id, end, start)).await;
        assert!(matches!(reversed, Err(Error::Validation { .. })));
        Ok(())
    }

    fn new_report(portfolio_id: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> NewPerformanceReport {
        NewPerformanceReport {
            portfolio_id: portfolio_id.to_string(),
            period: ReportPeriod::Weekly,
            initial_value: 100.0,
            final_value: 100.0,
            benchmark: None,
            period_start: start,
            period_end: end,
        }
    }

    #[tokio::test]
    async fn test_snapshot_and_report_queries() -> Result<()> {
        let db = setup_test_db().await?;
        let (portfolio, investment) = setup_portfolio_with_investment(&db).await?;
        create_test_item(&db, &portfolio.id, &investment.id, 10, investment.current_price()).await?;
        let now = Utc::now();

        let snapshot =
            record_performance_snapshot(&db, &portfolio.id, ReportPeriod::Daily, 200.0, now - Duration::days(1))
                .await?;
        assert_eq!(snapshot.final_value, 10.0 * investment.current_price());

        create_performance_report(
            &db,
            NewPerformanceReport {
                period: ReportPeriod::Annual,
                ..new_report(&portfolio.id, now - Duration::days(400), now - Duration::days(35))
            },
        )
        .await?;

        assert_eq!(list_reports_for_portfolio(&db, &portfolio.id, None).await?.len(), 2);
        let daily = list_reports_for_portfolio(&db, &portfolio.id, Some(ReportPeriod::Daily)).await?;
        assert_eq!(daily.len(), 1);
        assert_eq!(daily[0].id, snapshot.id);

        let last_week = list_reports_overlapping(&db, now - Duration::days(7), now).await?;
        assert_eq!(last_week.len(), 1);
        let everything = list_reports_overlapping(&db, now - Duration::days(500), now).await?;
        assert_eq!(everything.len(), 2);
        assert_eq!(everything[0].period, ReportPeriod::Annual);
        Ok(())
    }
}
