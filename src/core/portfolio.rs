//! Portfolio business logic - Portfolios and the holdings inside them.
//!
//! A portfolio belongs to exactly one user. Each holding (portfolio item) pairs a portfolio
//! with an investment; the unique index on `(portfolio_id, investment_id)` keeps at most one
//! holding per investment, and repeated purchases are folded in with [`merge_purchase`].

use crate::{
    core::{
        investment::require_investment,
        query::{ListOptions, text_contains},
        require_text, validate_amount, validate_quantity,
    },
    entities::{Portfolio, PortfolioItem, User, portfolio, portfolio_item},
    errors::{Error, Result},
};
use chrono::{DateTime, Utc};
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*};
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Input for [`create_portfolio`]
#[derive(Debug, Clone)]
pub struct NewPortfolio {
    /// Owner
    pub user_id: String,
    /// Display name
    pub name: String,
    /// Free-text description
    pub description: Option<String>,
}

impl NewPortfolio {
    /// A portfolio without description.
    pub fn new(user_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            name: name.into(),
            description: None,
        }
    }

    /// Same portfolio with a description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Partial update for [`update_portfolio`]
#[derive(Debug, Clone, Default)]
pub struct PortfolioUpdate {
    /// New name
    pub name: Option<String>,
    /// New description; `Some(None)` clears it
    pub description: Option<Option<String>>,
}

/// Input for [`add_item`]
#[derive(Debug, Clone)]
pub struct NewPortfolioItem {
    /// Portfolio receiving the holding
    pub portfolio_id: String,
    /// Investment held
    pub investment_id: String,
    /// Units held
    pub quantity: i32,
    /// Price paid per unit
    pub purchase_price: f64,
    /// When the units were bought, now when `None`
    pub purchased_at: Option<DateTime<Utc>>,
}

impl NewPortfolioItem {
    /// A holding purchased now.
    pub fn new(
        portfolio_id: impl Into<String>,
        investment_id: impl Into<String>,
        quantity: i32,
        purchase_price: f64,
    ) -> Self {
        Self {
            portfolio_id: portfolio_id.into(),
            investment_id: investment_id.into(),
            quantity,
            purchase_price,
            purchased_at: None,
        }
    }
}

/// Creates a portfolio for an existing user.
///
/// # Errors
/// [`Error::NotFound`] when the owner does not exist, [`Error::Validation`] for an empty name.
#[instrument(skip(db, new_portfolio), fields(user_id = %new_portfolio.user_id))]
pub async fn create_portfolio<C>(db: &C, new_portfolio: NewPortfolio) -> Result<portfolio::Model>
where
    C: ConnectionTrait,
{
    let name = require_text("Portfolio name", &new_portfolio.name)?;
    if User::find_by_id(new_portfolio.user_id.as_str()).one(db).await?.is_none() {
        return Err(Error::NotFound {
            entity: "user",
            key: new_portfolio.user_id,
        });
    }

    let now = Utc::now();
    let model = portfolio::ActiveModel {
        id: Set(Uuid::new_v4().to_string()),
        name: Set(name),
        description: Set(new_portfolio.description),
        user_id: Set(new_portfolio.user_id),
        created_at: Set(now),
        updated_at: Set(now),
    };

    let created = model.insert(db).await?;
    info!("Created portfolio {} ({})", created.name, created.id);
    Ok(created)
}

/// Finds a portfolio by id.
pub async fn get_portfolio_by_id<C>(db: &C, portfolio_id: &str) -> Result<Option<portfolio::Model>>
where
    C: ConnectionTrait,
{
    Portfolio::find_by_id(portfolio_id)
        .one(db)
        .await
        .map_err(Into::into)
}

pub(crate) async fn require_portfolio<C>(db: &C, portfolio_id: &str) -> Result<portfolio::Model>
where
    C: ConnectionTrait,
{
    get_portfolio_by_id(db, portfolio_id)
        .await?
        .ok_or_else(|| Error::NotFound {
            entity: "portfolio",
            key: portfolio_id.to_string(),
        })
}

/// Lists a user's portfolios ordered by creation time.
pub async fn list_portfolios_for_user<C>(
    db: &C,
    user_id: &str,
    options: ListOptions,
) -> Result<Vec<portfolio::Model>>
where
    C: ConnectionTrait,
{
    options
        .apply(
            Portfolio::find().filter(portfolio::Column::UserId.eq(user_id)),
            portfolio::Column::CreatedAt,
        )
        .all(db)
        .await
        .map_err(Into::into)
}

/// Case-insensitive name search within one user's portfolios.
pub async fn search_portfolios<C>(db: &C, user_id: &str, query: &str) -> Result<Vec<portfolio::Model>>
where
    C: ConnectionTrait,
{
    Portfolio::find()
        .filter(portfolio::Column::UserId.eq(user_id))
        .filter(text_contains(portfolio::Column::Name, query))
        .order_by_asc(portfolio::Column::Name)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Renames a portfolio or changes its description.
#[instrument(skip(db, update))]
pub async fn update_portfolio<C>(
    db: &C,
    portfolio_id: &str,
    update: PortfolioUpdate,
) -> Result<portfolio::Model>
where
    C: ConnectionTrait,
{
    let mut model: portfolio::ActiveModel = require_portfolio(db, portfolio_id).await?.into();
    if let Some(name) = update.name {
        model.name = Set(require_text("Portfolio name", &name)?);
    }
    if let Some(description) = update.description {
        model.description = Set(description);
    }
    model.updated_at = Set(Utc::now());

    let updated = model.update(db).await?;
    info!("Updated portfolio {}", updated.id);
    Ok(updated)
}

/// Deletes a portfolio and its holdings; returns the number of holdings removed.
#[instrument(skip(db))]
pub async fn delete_portfolio<C>(db: &C, portfolio_id: &str) -> Result<u64>
where
    C: TransactionTrait,
{
    let txn = db.begin().await?;
    require_portfolio(&txn, portfolio_id).await?;

    let items = PortfolioItem::delete_many()
        .filter(portfolio_item::Column::PortfolioId.eq(portfolio_id))
        .exec(&txn)
        .await?
        .rows_affected;
    Portfolio::delete_by_id(portfolio_id).exec(&txn).await?;
    txn.commit().await?;

    info!("Deleted portfolio {} with {} items", portfolio_id, items);
    Ok(items)
}

/// Adds a new holding to a portfolio.
///
/// # Errors
/// [`Error::NotFound`] for an unknown portfolio or investment, [`Error::Conflict`] when the
/// portfolio already holds the investment (use [`merge_purchase`] to add to it).
#[instrument(skip(db, item), fields(portfolio_id = %item.portfolio_id, investment_id = %item.investment_id))]
pub async fn add_item<C>(db: &C, item: NewPortfolioItem) -> Result<portfolio_item::Model>
where
    C: ConnectionTrait,
{
    validate_quantity(item.quantity)?;
    validate_amount(item.purchase_price)?;
    require_portfolio(db, &item.portfolio_id).await?;
    require_investment(db, &item.investment_id).await?;

    let now = Utc::now();
    let model = portfolio_item::ActiveModel {
        id: Set(Uuid::new_v4().to_string()),
        portfolio_id: Set(item.portfolio_id),
        investment_id: Set(item.investment_id),
        quantity: Set(item.quantity),
        purchase_price: Set(item.purchase_price),
        purchased_at: Set(item.purchased_at.unwrap_or(now)),
        created_at: Set(now),
        updated_at: Set(now),
    };

    let created = model.insert(db).await?;
    info!("Added item {} to portfolio {}", created.id, created.portfolio_id);
    Ok(created)
}

/// Finds a holding by id.
pub async fn get_item<C>(db: &C, item_id: &str) -> Result<Option<portfolio_item::Model>>
where
    C: ConnectionTrait,
{
    PortfolioItem::find_by_id(item_id)
        .one(db)
        .await
        .map_err(Into::into)
}

/// Finds the holding of `investment_id` in `portfolio_id`, if any.
pub async fn find_holding<C>(
    db: &C,
    portfolio_id: &str,
    investment_id: &str,
) -> Result<Option<portfolio_item::Model>>
where
    C: ConnectionTrait,
{
    PortfolioItem::find()
        .filter(portfolio_item::Column::PortfolioId.eq(portfolio_id))
        .filter(portfolio_item::Column::InvestmentId.eq(investment_id))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Lists a portfolio's holdings in the order they were added.
pub async fn list_items<C>(db: &C, portfolio_id: &str) -> Result<Vec<portfolio_item::Model>>
where
    C: ConnectionTrait,
{
    PortfolioItem::find()
        .filter(portfolio_item::Column::PortfolioId.eq(portfolio_id))
        .order_by_asc(portfolio_item::Column::CreatedAt)
        .order_by_asc(portfolio_item::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Sets the quantity of a holding.
#[instrument(skip(db))]
pub async fn update_item_quantity<C>(db: &C, item_id: &str, quantity: i32) -> Result<portfolio_item::Model>
where
    C: ConnectionTrait,
{
    validate_quantity(quantity)?;
    let existing = get_item(db, item_id).await?.ok_or_else(|| Error::NotFound {
        entity: "portfolio item",
        key: item_id.to_string(),
    })?;

    let mut model: portfolio_item::ActiveModel = existing.into();
    model.quantity = Set(quantity);
    model.updated_at = Set(Utc::now());
    let updated = model.update(db).await?;
    debug!("Item {} quantity set to {}", updated.id, quantity);
    Ok(updated)
}

/// Removes a holding.
#[instrument(skip(db))]
pub async fn remove_item<C>(db: &C, item_id: &str) -> Result<()>
where
    C: ConnectionTrait,
{
    let result = PortfolioItem::delete_by_id(item_id).exec(db).await?;
    if result.rows_affected == 0 {
        return Err(Error::NotFound {
            entity: "portfolio item",
            key: item_id.to_string(),
        });
    }
    info!("Removed item {}", item_id);
    Ok(())
}

/// Weighted average unit price after adding `added_qty` units at `added_price`.
#[must_use]
pub fn weighted_average_price(held_qty: i32, held_price: f64, added_qty: i32, added_price: f64) -> f64 {
    let total = f64::from(held_qty) + f64::from(added_qty);
    if total == 0.0 {
        return added_price;
    }
    f64::from(held_qty).mul_add(held_price, f64::from(added_qty) * added_price) / total
}

/// Creates a holding or adds units to an existing one.
///
/// The purchase price of an existing holding becomes the weighted average of old and new
/// units; its original purchase time is kept. The read and the write share one transaction
/// (a savepoint when `db` is already a transaction), so concurrent purchases never overwrite
/// each other.
///
/// # Errors
/// [`Error::Validation`] unless `quantity` is positive, [`Error::InvalidAmount`] for a bad
/// price, [`Error::NotFound`] for an unknown portfolio or investment.
#[instrument(skip(db))]
pub async fn merge_purchase<C>(
    db: &C,
    portfolio_id: &str,
    investment_id: &str,
    quantity: i32,
    price: f64,
    purchased_at: Option<DateTime<Utc>>,
) -> Result<portfolio_item::Model>
where
    C: TransactionTrait,
{
    if quantity <= 0 {
        return Err(Error::Validation {
            message: format!("Purchase quantity must be positive: {quantity}"),
        });
    }
    validate_amount(price)?;

    let txn = db.begin().await?;
    let now = Utc::now();

    // Write first: the holding must be read while holding the write lock
    PortfolioItem::update_many()
        .col_expr(portfolio_item::Column::UpdatedAt, Expr::value(now))
        .filter(portfolio_item::Column::PortfolioId.eq(portfolio_id))
        .filter(portfolio_item::Column::InvestmentId.eq(investment_id))
        .exec(&txn)
        .await?;

    let Some(existing) = find_holding(&txn, portfolio_id, investment_id).await? else {
        let created = add_item(
            &txn,
            NewPortfolioItem {
                portfolio_id: portfolio_id.to_string(),
                investment_id: investment_id.to_string(),
                quantity,
                purchase_price: price,
                purchased_at,
            },
        )
        .await?;
        txn.commit().await?;
        return Ok(created);
    };

    let merged_qty = existing
        .quantity
        .checked_add(quantity)
        .ok_or_else(|| Error::Validation {
            message: format!("Holding quantity would overflow: {} + {quantity}", existing.quantity),
        })?;
    let merged_price = weighted_average_price(existing.quantity, existing.purchase_price, quantity, price);

    let mut model: portfolio_item::ActiveModel = existing.into();
    model.quantity = Set(merged_qty);
    model.purchase_price = Set(merged_price);
    model.updated_at = Set(now);
    let updated = model.update(&txn).await?;
    txn.commit().await?;
    info!(
        "Merged {} units into item {} (now {} @ {:.4})",
        quantity, updated.id, updated.quantity, updated.purchase_price
    );
    Ok(updated)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::test_utils::*;
    use sea_orm::{DatabaseBackend, MockDatabase};

    #[test]
    fn test_weighted_average_price() {
        assert_eq!(weighted_average_price(10, 20.0, 10, 30.0), 25.0);
        assert_eq!(weighted_average_price(0, 0.0, 5, 12.0), 12.0);
        assert_eq!(weighted_average_price(0, 0.0, 0, 12.0), 12.0);
        assert!((weighted_average_price(3, 10.0, 1, 14.0) - 11.0).abs() < 1e-9);
        assert_eq!(weighted_average_price(i32::MAX, 10.0, i32::MAX, 10.0), 10.0);
    }

    #[tokio::test]
    async fn test_item_validation_before_db() -> Result<()> {
        let db = MockDatabase::new(DatabaseBackend::Sqlite).into_connection();

        let negative_qty = add_item(&db, NewPortfolioItem::new("p", "i", -1, 10.0)).await;
        assert!(matches!(negative_qty, Err(Error::Validation { .. })));

        let bad_price = add_item(&db, NewPortfolioItem::new("p", "i", 1, f64::INFINITY)).await;
        assert!(matches!(bad_price, Err(Error::InvalidAmount { .. })));

        let zero_merge = merge_purchase(&db, "p", "i", 0, 10.0, None).await;
        assert!(matches!(zero_merge, Err(Error::Validation { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_create_portfolio_requires_owner() -> Result<()> {
        let db = setup_test_db().await?;
        let result = create_portfolio(&db, NewPortfolio::new("ghost", "Growth")).await;
        assert!(matches!(result, Err(Error::NotFound { entity: "user", .. })));

        let user = create_test_user(&db, "a@x.com").await?;
        let created = create_portfolio(
            &db,
            NewPortfolio::new(&user.id, " Growth ").with_description("Long term"),
        )
        .await?;
        assert_eq!(created.name, "Growth");
        assert_eq!(created.description.as_deref(), Some("Long term"));
        assert_eq!(created.user_id, user.id);
        Ok(())
    }

    #[tokio::test]
    async fn test_list_search_and_update_portfolios() -> Result<()> {
        let db = setup_test_db().await?;
        let user = create_test_user(&db, "a@x.com").await?;
        let other = create_test_user(&db, "b@x.com").await?;
        let growth = create_test_portfolio(&db, &user.id, "Growth").await?;
        create_test_portfolio(&db, &user.id, "Dividends").await?;
        create_test_portfolio(&db, &other.id, "Growth too").await?;

        let mine = list_portfolios_for_user(&db, &user.id, ListOptions::default()).await?;
        assert_eq!(mine.len(), 2);
        assert_eq!(mine[0].id, growth.id);

        let found = search_portfolios(&db, &user.id, "GROW").await?;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, growth.id);

        let updated = update_portfolio(
            &db,
            &growth.id,
            PortfolioUpdate {
                name: Some("Aggressive".to_string()),
                description: Some(Some("High risk".to_string())),
            },
        )
        .await?;
        assert_eq!(updated.name, "Aggressive");
        assert_eq!(updated.description.as_deref(), Some("High risk"));

        let cleared = update_portfolio(
            &db,
            &growth.id,
            PortfolioUpdate {
                description: Some(None),
                ..Default::default()
            },
        )
        .await?;
        assert!(cleared.description.is_none());
        assert_eq!(cleared.name, "Aggressive");
        Ok(())
    }

    #[tokio::test]
    async fn test_add_item_defaults_and_uniqueness() -> Result<()> {
        let db = setup_test_db().await?;
        let (portfolio, investment) = setup_portfolio_with_investment(&db).await?;

        let before = Utc::now();
        let item = add_item(&db, NewPortfolioItem::new(&portfolio.id, &investment.id, 10, 28.5)).await?;
        assert!(item.purchased_at >= before);
        assert_eq!(item.invested_value(), 285.0);

        let duplicate = add_item(&db, NewPortfolioItem::new(&portfolio.id, &investment.id, 1, 30.0)).await;
        assert!(matches!(
            duplicate,
            Err(Error::Conflict { ref entity, ref field })
                if entity == "portfolio_items" && field == "portfolio_id, investment_id"
        ));

        let unknown = add_item(&db, NewPortfolioItem::new(&portfolio.id, "missing", 1, 30.0)).await;
        assert!(matches!(unknown, Err(Error::NotFound { entity: "investment", .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_item_quantity_and_removal() -> Result<()> {
        let db = setup_test_db().await?;
        let (portfolio, investment) = setup_portfolio_with_investment(&db).await?;
        let item = create_test_item(&db, &portfolio.id, &investment.id, 10, 28.5).await?;

        let updated = update_item_quantity(&db, &item.id, 4).await?;
        assert_eq!(updated.quantity, 4);
        assert!(matches!(
            update_item_quantity(&db, &item.id, -4).await,
            Err(Error::Validation { .. })
        ));

        let held = find_holding(&db, &portfolio.id, &investment.id).await?.unwrap();
        assert_eq!(held.id, item.id);

        remove_item(&db, &item.id).await?;
        assert!(get_item(&db, &item.id).await?.is_none());
        assert!(matches!(
            remove_item(&db, &item.id).await,
            Err(Error::NotFound { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_merge_purchase_weighted_average() -> Result<()> {
        let db = setup_test_db().await?;
        let (portfolio, investment) = setup_portfolio_with_investment(&db).await?;

        let first = merge_purchase(&db, &portfolio.id, &investment.id, 10, 20.0, None).await?;
        let second = merge_purchase(&db, &portfolio.id, &investment.id, 30, 40.0, None).await?;

        assert_eq!(first.id, second.id);
        assert_eq!(second.quantity, 40);
        assert_eq!(second.purchase_price, 35.0);
        assert_eq!(second.purchased_at, first.purchased_at);
        assert_eq!(list_items(&db, &portfolio.id).await?.len(), 1);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_purchases_keep_every_unit() -> Result<()> {
        init_test_tracing();
        let (_dir, db) = setup_file_test_db(8).await?;
        let (portfolio, investment) = setup_portfolio_with_investment(&db).await?;
        create_test_item(&db, &portfolio.id, &investment.id, 1, 10.0).await?;
        let db = std::sync::Arc::new(db);

        let handles: Vec<_> = (0..12)
            .map(|_| {
                let db = db.clone();
                let (portfolio_id, investment_id) = (portfolio.id.clone(), investment.id.clone());
                tokio::spawn(async move {
                    merge_purchase(&*db, &portfolio_id, &investment_id, 1, 10.0, None).await
                })
            })
            .collect();

        let mut merged = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                merged += 1;
            }
        }

        let held = find_holding(&*db, &portfolio.id, &investment.id).await?.unwrap();
        assert!(merged > 0);
        assert_eq!(held.quantity, 1 + merged);
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_portfolio_removes_items() -> Result<()> {
        let db = setup_test_db().await?;
        let (portfolio, investment) = setup_portfolio_with_investment(&db).await?;
        create_test_item(&db, &portfolio.id, &investment.id, 10, 28.5).await?;

        assert_eq!(delete_portfolio(&db, &portfolio.id).await?, 1);
        assert!(get_portfolio_by_id(&db, &portfolio.id).await?.is_none());
        assert!(list_items(&db, &portfolio.id).await?.is_empty());
        assert!(crate::core::investment::get_investment_by_id(&db, &investment.id).await?.is_some());
        Ok(())
    }
}
