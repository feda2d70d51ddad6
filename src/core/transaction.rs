//! Transaction business logic - Buys and sells against a portfolio.
//!
//! Recording a transaction also moves the matching holding, and both writes happen inside
//! one database transaction: a rejected sell leaves neither a transaction row nor a changed
//! holding behind. Transaction rows are append-only and outlive the portfolio and
//! investment they refer to.

use crate::{
    core::{
        investment::require_investment,
        portfolio::{find_holding, merge_purchase, remove_item, require_portfolio, update_item_quantity},
        validate_amount,
    },
    entities::{Transaction, TransactionKind, transaction},
    errors::{Error, Result},
};
use chrono::{DateTime, Utc};
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*};
use tracing::{info, instrument};
use uuid::Uuid;

/// Input for [`record_transaction`]
#[derive(Debug, Clone)]
pub struct NewTransaction {
    /// Portfolio the units move in or out of
    pub portfolio_id: String,
    /// Investment traded
    pub investment_id: String,
    /// Buy or sell
    pub kind: TransactionKind,
    /// Units traded, must be positive
    pub quantity: i32,
    /// Unit price
    pub price: f64,
    /// Brokerage fees
    pub fees: f64,
    /// Execution time, now when `None`
    pub executed_at: Option<DateTime<Utc>>,
    /// Free-text notes
    pub notes: Option<String>,
}

impl NewTransaction {
    fn new(
        kind: TransactionKind,
        portfolio_id: impl Into<String>,
        investment_id: impl Into<String>,
        quantity: i32,
        price: f64,
    ) -> Self {
        Self {
            portfolio_id: portfolio_id.into(),
            investment_id: investment_id.into(),
            kind,
            quantity,
            price,
            fees: 0.0,
            executed_at: None,
            notes: None,
        }
    }

    /// A buy executed now without fees.
    pub fn buy(portfolio_id: impl Into<String>, investment_id: impl Into<String>, quantity: i32, price: f64) -> Self {
        Self::new(TransactionKind::Buy, portfolio_id, investment_id, quantity, price)
    }

    /// A sell executed now without fees.
    pub fn sell(portfolio_id: impl Into<String>, investment_id: impl Into<String>, quantity: i32, price: f64) -> Self {
        Self::new(TransactionKind::Sell, portfolio_id, investment_id, quantity, price)
    }

    /// Same transaction with fees.
    #[must_use]
    pub const fn with_fees(mut self, fees: f64) -> Self {
        self.fees = fees;
        self
    }

    /// Same transaction with notes.
    #[must_use]
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Same transaction at a given time.
    #[must_use]
    pub const fn executed_at(mut self, at: DateTime<Utc>) -> Self {
        self.executed_at = Some(at);
        self
    }
}

/// Records a buy or sell and adjusts the holding in the same database transaction.
///
/// A buy merges into the holding at the weighted average price. A sell decrements the
/// holding and removes it when nothing is left.
///
/// # Errors
/// - [`Error::Validation`] when quantity is not positive
/// - [`Error::InvalidAmount`] for a bad price or fees
/// - [`Error::NotFound`] for an unknown portfolio or investment
/// - [`Error::InsufficientQuantity`] when selling more than is held
#[instrument(skip(db, new_transaction), fields(
    portfolio_id = %new_transaction.portfolio_id,
    investment_id = %new_transaction.investment_id,
    kind = %new_transaction.kind,
))]
pub async fn record_transaction<C>(db: &C, new_transaction: NewTransaction) -> Result<transaction::Model>
where
    C: TransactionTrait,
{
    if new_transaction.quantity <= 0 {
        return Err(Error::Validation {
            message: format!("Transaction quantity must be positive: {}", new_transaction.quantity),
        });
    }
    validate_amount(new_transaction.price)?;
    validate_amount(new_transaction.fees)?;

    let txn = db.begin().await?;
    require_portfolio(&txn, &new_transaction.portfolio_id).await?;
    require_investment(&txn, &new_transaction.investment_id).await?;

    let holding = find_holding(&txn, &new_transaction.portfolio_id, &new_transaction.investment_id).await?;
    if new_transaction.kind == TransactionKind::Sell {
        let held = holding.as_ref().map_or(0, |item| item.quantity);
        if held < new_transaction.quantity {
            return Err(Error::InsufficientQuantity {
                held,
                requested: new_transaction.quantity,
            });
        }
    }

    let now = Utc::now();
    let executed_at = new_transaction.executed_at.unwrap_or(now);
    let model = transaction::ActiveModel {
        id: Set(Uuid::new_v4().to_string()),
        portfolio_id: Set(new_transaction.portfolio_id.clone()),
        investment_id: Set(new_transaction.investment_id.clone()),
        kind: Set(new_transaction.kind),
        quantity: Set(new_transaction.quantity),
        price: Set(new_transaction.price),
        fees: Set(new_transaction.fees),
        executed_at: Set(executed_at),
        notes: Set(new_transaction.notes),
        created_at: Set(now),
    };
    let recorded = model.insert(&txn).await?;

    match (recorded.kind, holding) {
        (TransactionKind::Buy, _) => {
            merge_purchase(
                &txn,
                &recorded.portfolio_id,
                &recorded.investment_id,
                recorded.quantity,
                recorded.price,
                Some(executed_at),
            )
            .await?;
        }
        (TransactionKind::Sell, Some(item)) if item.quantity == recorded.quantity => {
            remove_item(&txn, &item.id).await?;
        }
        (TransactionKind::Sell, Some(item)) => {
            update_item_quantity(&txn, &item.id, item.quantity - recorded.quantity).await?;
        }
        (TransactionKind::Sell, None) => {
            return Err(Error::InsufficientQuantity {
                held: 0,
                requested: recorded.quantity,
            });
        }
    }

    txn.commit().await?;
    info!(
        "Recorded {} of {} units at {} ({})",
        recorded.kind, recorded.quantity, recorded.price, recorded.id
    );
    Ok(recorded)
}

/// Finds a transaction by id.
pub async fn get_transaction_by_id<C>(db: &C, transaction_id: &str) -> Result<Option<transaction::Model>>
where
    C: ConnectionTrait,
{
    Transaction::find_by_id(transaction_id)
        .one(db)
        .await
        .map_err(Into::into)
}

/// A portfolio's transactions, most recent first.
pub async fn list_transactions_for_portfolio<C>(db: &C, portfolio_id: &str) -> Result<Vec<transaction::Model>>
where
    C: ConnectionTrait,
{
    Transaction::find()
        .filter(transaction::Column::PortfolioId.eq(portfolio_id))
        .order_by_desc(transaction::Column::ExecutedAt)
        .all(db)
        .await
        .map_err(Into::into)
}

/// An investment's transactions across portfolios, most recent first.
pub async fn list_transactions_for_investment<C>(db: &C, investment_id: &str) -> Result<Vec<transaction::Model>>
where
    C: ConnectionTrait,
{
    Transaction::find()
        .filter(transaction::Column::InvestmentId.eq(investment_id))
        .order_by_desc(transaction::Column::ExecutedAt)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Transactions executed within `[start, end]`, oldest first.
pub async fn list_transactions_between<C>(
    db: &C,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<transaction::Model>>
where
    C: ConnectionTrait,
{
    Transaction::find()
        .filter(transaction::Column::ExecutedAt.between(start, end))
        .order_by_asc(transaction::Column::ExecutedAt)
        .all(db)
        .await
        .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::core::portfolio;
    use crate::test_utils::*;
    use chrono::Duration;

    #[tokio::test]
    async fn test_buy_creates_and_merges_holding() -> Result<()> {
        let db = setup_test_db().await?;
        let (portfolio, investment) = setup_portfolio_with_investment(&db).await?;

        let first = record_transaction(&db, NewTransaction::buy(&portfolio.id, &investment.id, 10, 20.0)).await?;
        assert_eq!(first.fees, 0.0);
        assert_eq!(first.total_amount(), 200.0);

        record_transaction(
            &db,
            NewTransaction::buy(&portfolio.id, &investment.id, 10, 30.0).with_fees(2.5),
        )
        .await?;

        let holding = portfolio::find_holding(&db, &portfolio.id, &investment.id).await?.unwrap();
        assert_eq!(holding.quantity, 20);
        assert_eq!(holding.purchase_price, 25.0);
        assert_eq!(list_transactions_for_portfolio(&db, &portfolio.id).await?.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_sell_decrements_then_removes_holding() -> Result<()> {
        let db = setup_test_db().await?;
        let (portfolio, investment) = setup_portfolio_with_investment(&db).await?;
        record_transaction(&db, NewTransaction::buy(&portfolio.id, &investment.id, 10, 20.0)).await?;

        record_transaction(&db, NewTransaction::sell(&portfolio.id, &investment.id, 4, 25.0)).await?;
        let holding = portfolio::find_holding(&db, &portfolio.id, &investment.id).await?.unwrap();
        assert_eq!(holding.quantity, 6);
        assert_eq!(holding.purchase_price, 20.0);

        record_transaction(&db, NewTransaction::sell(&portfolio.id, &investment.id, 6, 25.0)).await?;
        assert!(portfolio::find_holding(&db, &portfolio.id, &investment.id).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_oversell_is_rejected_without_writes() -> Result<()> {
        let db = setup_test_db().await?;
        let (portfolio, investment) = setup_portfolio_with_investment(&db).await?;
        record_transaction(&db, NewTransaction::buy(&portfolio.id, &investment.id, 5, 20.0)).await?;

        let result = record_transaction(&db, NewTransaction::sell(&portfolio.id, &investment.id, 6, 21.0)).await;
        assert!(matches!(
            result,
            Err(Error::InsufficientQuantity { held: 5, requested: 6 })
        ));

        let never_held = record_transaction(&db, NewTransaction::sell(&portfolio.id, "missing", 1, 1.0)).await;
        assert!(matches!(never_held, Err(Error::NotFound { .. })));

        assert_eq!(list_transactions_for_portfolio(&db, &portfolio.id).await?.len(), 1);
        let holding = portfolio::find_holding(&db, &portfolio.id, &investment.id).await?.unwrap();
        assert_eq!(holding.quantity, 5);
        Ok(())
    }

    #[tokio::test]
    async fn test_transaction_validation() -> Result<()> {
        let db = setup_test_db().await?;
        let (portfolio, investment) = setup_portfolio_with_investment(&db).await?;

        assert!(matches!(
            record_transaction(&db, NewTransaction::buy(&portfolio.id, &investment.id, 0, 1.0)).await,
            Err(Error::Validation { .. })
        ));
        assert!(matches!(
            record_transaction(
                &db,
                NewTransaction::buy(&portfolio.id, &investment.id, 1, 1.0).with_fees(-0.5)
            )
            .await,
            Err(Error::InvalidAmount { .. })
        ));
        assert!(matches!(
            record_transaction(&db, NewTransaction::buy("ghost", &investment.id, 1, 1.0)).await,
            Err(Error::NotFound { entity: "portfolio", .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_transaction_queries() -> Result<()> {
        let db = setup_test_db().await?;
        let (portfolio, investment) = setup_portfolio_with_investment(&db).await?;
        let now = Utc::now();

        let old = record_transaction(
            &db,
            NewTransaction::buy(&portfolio.id, &investment.id, 3, 10.0)
                .executed_at(now - Duration::days(10))
                .with_notes("first lot"),
        )
        .await?;
        let recent = record_transaction(&db, NewTransaction::buy(&portfolio.id, &investment.id, 2, 12.0)).await?;

        assert_eq!(get_transaction_by_id(&db, &old.id).await?.unwrap().notes.as_deref(), Some("first lot"));

        let by_investment = list_transactions_for_investment(&db, &investment.id).await?;
        assert_eq!(by_investment[0].id, recent.id);

        let window = list_transactions_between(&db, now - Duration::days(11), now - Duration::days(9)).await?;
        assert_eq!(window.len(), 1);
        assert_eq!(window[0].id, old.id);
        Ok(())
    }

    #[tokio::test]
    async fn test_history_survives_portfolio_deletion() -> Result<()> {
        let db = setup_test_db().await?;
        let (portfolio, investment) = setup_portfolio_with_investment(&db).await?;
        let recorded = record_transaction(&db, NewTransaction::buy(&portfolio.id, &investment.id, 1, 9.0)).await?;

        portfolio::delete_portfolio(&db, &portfolio.id).await?;
        assert!(get_transaction_by_id(&db, &recorded.id).await?.is_some());
        Ok(())
    }
}
