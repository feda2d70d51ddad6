//! Favorite business logic - Investments a user keeps an eye on.

use crate::{
    core::investment::require_investment,
    entities::{Favorite, Investment, User, favorite, investment},
    errors::{Error, Result},
};
use chrono::Utc;
use sea_orm::{FromQueryResult, QueryOrder, QuerySelect, Set, prelude::*};
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// An investment and how many users favorited it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FavoriteCount {
    /// Favorited investment
    pub investment_id: String,
    /// Number of users
    pub count: u64,
}

#[derive(Debug, FromQueryResult)]
struct FavoriteCountRow {
    investment_id: String,
    favorite_count: i64,
}

/// Marks an investment as favorite for a user.
///
/// # Errors
/// [`Error::NotFound`] for an unknown user or investment, [`Error::Conflict`] when the pair
/// is already a favorite.
#[instrument(skip(db))]
pub async fn add_favorite<C>(db: &C, user_id: &str, investment_id: &str) -> Result<favorite::Model>
where
    C: ConnectionTrait,
{
    if User::find_by_id(user_id).one(db).await?.is_none() {
        return Err(Error::NotFound {
            entity: "user",
            key: user_id.to_string(),
        });
    }
    require_investment(db, investment_id).await?;

    let now = Utc::now();
    let model = favorite::ActiveModel {
        id: Set(Uuid::new_v4().to_string()),
        user_id: Set(user_id.to_string()),
        investment_id: Set(investment_id.to_string()),
        added_at: Set(now),
        created_at: Set(now),
    };
    let created = model.insert(db).await?;
    info!("User {} favorited {}", user_id, investment_id);
    Ok(created)
}

/// Removes a favorite; returns whether one existed.
#[instrument(skip(db))]
pub async fn remove_favorite<C>(db: &C, user_id: &str, investment_id: &str) -> Result<bool>
where
    C: ConnectionTrait,
{
    let result = Favorite::delete_many()
        .filter(favorite::Column::UserId.eq(user_id))
        .filter(favorite::Column::InvestmentId.eq(investment_id))
        .exec(db)
        .await?;
    debug!("Removed {} favorite rows", result.rows_affected);
    Ok(result.rows_affected > 0)
}

/// Whether the user has favorited the investment.
pub async fn is_favorite<C>(db: &C, user_id: &str, investment_id: &str) -> Result<bool>
where
    C: ConnectionTrait,
{
    let count = Favorite::find()
        .filter(favorite::Column::UserId.eq(user_id))
        .filter(favorite::Column::InvestmentId.eq(investment_id))
        .count(db)
        .await?;
    Ok(count > 0)
}

/// A user's favorite investments, most recently added first.
pub async fn list_favorites_for_user<C>(
    db: &C,
    user_id: &str,
) -> Result<Vec<(favorite::Model, investment::Model)>>
where
    C: ConnectionTrait,
{
    let rows = Favorite::find()
        .find_also_related(Investment)
        .filter(favorite::Column::UserId.eq(user_id))
        .order_by_desc(favorite::Column::AddedAt)
        .order_by_desc(favorite::Column::Id)
        .all(db)
        .await?;

    // The foreign key guarantees the investment exists
    Ok(rows
        .into_iter()
        .filter_map(|(fav, inv)| inv.map(|inv| (fav, inv)))
        .collect())
}

/// Number of favorites a user has.
pub async fn count_favorites_for_user<C>(db: &C, user_id: &str) -> Result<u64>
where
    C: ConnectionTrait,
{
    Favorite::find()
        .filter(favorite::Column::UserId.eq(user_id))
        .count(db)
        .await
        .map_err(Into::into)
}

/// The `limit` most favorited investments, ties broken by investment id.
pub async fn most_favorited<C>(db: &C, limit: u64) -> Result<Vec<FavoriteCount>>
where
    C: ConnectionTrait,
{
    let rows = Favorite::find()
        .select_only()
        .column(favorite::Column::InvestmentId)
        .column_as(Expr::col(favorite::Column::Id).count(), "favorite_count")
        .group_by(favorite::Column::InvestmentId)
        .order_by_desc(Expr::cust("favorite_count"))
        .order_by_asc(favorite::Column::InvestmentId)
        .limit(limit)
        .into_model::<FavoriteCountRow>()
        .all(db)
        .await?;

    Ok(rows
        .into_iter()
        .map(|row| FavoriteCount {
            investment_id: row.investment_id,
            count: u64::try_from(row.favorite_count).unwrap_or_default(),
        })
        .collect())
}
