//! User business logic - Accounts, credentials and the user cascade.
//!
//! Emails are normalised (trimmed, lower-cased) before every write and lookup, so the
//! unique index on `users.email` behaves case-insensitively. Passwords are stored as
//! `<salt>$<hex sha256(salt || password)>`.
//!
//! Deleting a user removes their portfolios, the items in those portfolios, their
//! favorites and their notifications in one database transaction.

use crate::{
    core::{
        query::{ListOptions, Page, StringMatch, fetch_page, text_contains, text_eq},
        require_text,
    },
    entities::{Favorite, Notification, Portfolio, PortfolioItem, User, favorite, notification,
        portfolio, portfolio_item, user},
    errors::{Error, Result},
};
use chrono::{DateTime, Utc};
use sea_orm::{Condition, QueryOrder, QuerySelect, Set, TransactionTrait, prelude::*};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Input for [`create_user`]
#[derive(Debug, Clone)]
pub struct NewUser {
    /// Display name
    pub name: String,
    /// Login email
    pub email: String,
    /// Clear-text password, hashed before storage
    pub password: String,
}

impl NewUser {
    /// Convenience constructor.
    pub fn new(name: impl Into<String>, email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            password: password.into(),
        }
    }
}

/// Partial update for [`update_user`]; `None` leaves a field unchanged
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    /// New display name
    pub name: Option<String>,
    /// New email
    pub email: Option<String>,
    /// New clear-text password
    pub password: Option<String>,
}

/// Rows removed by [`delete_user`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserDeletion {
    /// Portfolios owned by the user
    pub portfolios: u64,
    /// Holdings inside those portfolios
    pub portfolio_items: u64,
    /// Favorites of the user
    pub favorites: u64,
    /// Notifications of the user
    pub notifications: u64,
}

impl UserDeletion {
    /// Dependent rows removed, not counting the user row itself.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.portfolios + self.portfolio_items + self.favorites + self.notifications
    }
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn validate_email(email: &str) -> Result<()> {
    let valid = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.') && !email.contains(' '));
    if valid {
        Ok(())
    } else {
        Err(Error::Validation {
            message: format!("`{email}` is not a valid email address"),
        })
    }
}

fn validate_password(password: &str) -> Result<()> {
    if password.is_empty() {
        return Err(Error::Validation {
            message: "Password cannot be empty".to_string(),
        });
    }
    Ok(())
}

fn digest(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

fn hash_password(password: &str) -> String {
    let salt = Uuid::new_v4().simple().to_string();
    format!("{salt}${}", digest(&salt, password))
}

fn verify_password(stored: &str, password: &str) -> bool {
    stored
        .split_once('$')
        .is_some_and(|(salt, expected)| {
            digest(salt, password)
                .as_bytes()
                .ct_eq(expected.as_bytes())
                .into()
        })
}

/// Creates a user after validating name, email and password.
///
/// # Errors
/// [`Error::Validation`] for an empty name, malformed email or empty password;
/// [`Error::Conflict`] when the email is taken.
#[instrument(skip(db, new_user), fields(email = %new_user.email))]
pub async fn create_user<C>(db: &C, new_user: NewUser) -> Result<user::Model>
where
    C: ConnectionTrait,
{
    let name = require_text("User name", &new_user.name)?;
    let email = normalize_email(&new_user.email);
    validate_email(&email)?;
    validate_password(&new_user.password)?;

    let now = Utc::now();
    let user = user::ActiveModel {
        id: Set(Uuid::new_v4().to_string()),
        name: Set(name),
        email: Set(email),
        password_hash: Set(hash_password(&new_user.password)),
        created_at: Set(now),
        last_login_at: Set(None),
        updated_at: Set(now),
    };

    let created = user.insert(db).await?;
    info!("Created user {}", created.id);
    Ok(created)
}

/// Finds a user by id.
pub async fn get_user_by_id<C>(db: &C, user_id: &str) -> Result<Option<user::Model>>
where
    C: ConnectionTrait,
{
    User::find_by_id(user_id).one(db).await.map_err(Into::into)
}

/// Finds a user by email, ignoring case and surrounding whitespace.
pub async fn get_user_by_email<C>(db: &C, email: &str) -> Result<Option<user::Model>>
where
    C: ConnectionTrait,
{
    User::find()
        .filter(user::Column::Email.eq(normalize_email(email)))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Finds users whose name equals `name` under `mode`, ordered by name.
pub async fn find_users_by_name<C>(db: &C, name: &str, mode: StringMatch) -> Result<Vec<user::Model>>
where
    C: ConnectionTrait,
{
    User::find()
        .filter(text_eq(user::Column::Name, name, mode))
        .order_by_asc(user::Column::Name)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Case-insensitive substring search over name and email.
pub async fn search_users<C>(db: &C, query: &str) -> Result<Vec<user::Model>>
where
    C: ConnectionTrait,
{
    User::find()
        .filter(
            Condition::any()
                .add(text_contains(user::Column::Name, query))
                .add(text_contains(user::Column::Email, query)),
        )
        .order_by_asc(user::Column::Name)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Lists users ordered by creation time.
pub async fn list_users<C>(db: &C, options: ListOptions) -> Result<Vec<user::Model>>
where
    C: ConnectionTrait,
{
    options
        .apply(User::find(), user::Column::CreatedAt)
        .all(db)
        .await
        .map_err(Into::into)
}

/// One page of users ordered by creation time (oldest first).
pub async fn list_users_page<C>(db: &C, page: u64, per_page: u64) -> Result<Page<user::Model>>
where
    C: ConnectionTrait,
{
    let select = User::find()
        .order_by_asc(user::Column::CreatedAt)
        .order_by_asc(user::Column::Id);
    fetch_page(db, select, page, per_page).await
}

/// Whether `email` is free, optionally ignoring the user `exclude_id` (for renames).
pub async fn is_email_available<C>(db: &C, email: &str, exclude_id: Option<&str>) -> Result<bool>
where
    C: ConnectionTrait,
{
    let existing = get_user_by_email(db, email).await?;
    Ok(match existing {
        None => true,
        Some(found) => exclude_id == Some(found.id.as_str()),
    })
}

/// Counts users created within `[start, end]`.
pub async fn count_users_created_between<C>(
    db: &C,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<u64>
where
    C: ConnectionTrait,
{
    User::find()
        .filter(user::Column::CreatedAt.between(start, end))
        .count(db)
        .await
        .map_err(Into::into)
}

/// Applies a partial update and refreshes `updated_at`.
///
/// # Errors
/// [`Error::NotFound`] for an unknown id, [`Error::Validation`] for bad values,
/// [`Error::Conflict`] when the new email belongs to someone else.
#[instrument(skip(db, update))]
pub async fn update_user<C>(db: &C, user_id: &str, update: UserUpdate) -> Result<user::Model>
where
    C: ConnectionTrait,
{
    let existing = User::find_by_id(user_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::NotFound {
            entity: "user",
            key: user_id.to_string(),
        })?;

    let mut model: user::ActiveModel = existing.into();
    if let Some(name) = update.name {
        model.name = Set(require_text("User name", &name)?);
    }
    if let Some(email) = update.email {
        let email = normalize_email(&email);
        validate_email(&email)?;
        model.email = Set(email);
    }
    if let Some(password) = update.password {
        validate_password(&password)?;
        model.password_hash = Set(hash_password(&password));
    }
    model.updated_at = Set(Utc::now());

    let updated = model.update(db).await?;
    info!("Updated user {}", updated.id);
    Ok(updated)
}

/// Verifies a credential pair and stamps `last_login_at` on success.
///
/// Returns `None` when the email is unknown or the password is wrong; the two cases are
/// deliberately indistinguishable to the caller.
#[instrument(skip(db, password))]
pub async fn authenticate<C>(db: &C, email: &str, password: &str) -> Result<Option<user::Model>>
where
    C: ConnectionTrait,
{
    let Some(found) = get_user_by_email(db, email).await? else {
        debug!("Authentication failed: unknown email");
        return Ok(None);
    };
    if !verify_password(&found.password_hash, password) {
        debug!("Authentication failed: wrong password for {}", found.id);
        return Ok(None);
    }

    let mut model: user::ActiveModel = found.into();
    model.last_login_at = Set(Some(Utc::now()));
    let logged_in = model.update(db).await?;
    info!("User {} authenticated", logged_in.id);
    Ok(Some(logged_in))
}

/// Deletes a user and everything they own, atomically.
///
/// # Errors
/// [`Error::NotFound`] when the user does not exist; nothing is deleted in that case.
#[instrument(skip(db))]
pub async fn delete_user<C>(db: &C, user_id: &str) -> Result<UserDeletion>
where
    C: TransactionTrait,
{
    let txn = db.begin().await?;

    User::find_by_id(user_id)
        .one(&txn)
        .await?
        .ok_or_else(|| Error::NotFound {
            entity: "user",
            key: user_id.to_string(),
        })?;

    let portfolio_ids: Vec<String> = Portfolio::find()
        .select_only()
        .column(portfolio::Column::Id)
        .filter(portfolio::Column::UserId.eq(user_id))
        .into_tuple()
        .all(&txn)
        .await?;

    let portfolio_items = if portfolio_ids.is_empty() {
        0
    } else {
        PortfolioItem::delete_many()
            .filter(portfolio_item::Column::PortfolioId.is_in(portfolio_ids))
            .exec(&txn)
            .await?
            .rows_affected
    };
    let portfolios = Portfolio::delete_many()
        .filter(portfolio::Column::UserId.eq(user_id))
        .exec(&txn)
        .await?
        .rows_affected;
    let favorites = Favorite::delete_many()
        .filter(favorite::Column::UserId.eq(user_id))
        .exec(&txn)
        .await?
        .rows_affected;
    let notifications = Notification::delete_many()
        .filter(notification::Column::UserId.eq(user_id))
        .exec(&txn)
        .await?
        .rows_affected;

    User::delete_by_id(user_id).exec(&txn).await?;
    txn.commit().await?;

    let deletion = UserDeletion {
        portfolios,
        portfolio_items,
        favorites,
        notifications,
    };
    info!(?deletion, "Deleted user {}", user_id);
    Ok(deletion)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::panic)]
    use super::*;
    use crate::core::{favorite as favorites, notification as notifications, portfolio as portfolios};
    use crate::test_utils::*;
    use chrono::Duration;
    use sea_orm::{DatabaseBackend, MockDatabase};

    #[test]
    fn test_verify_password() {
        let stored = hash_password("Basic@1234");
        assert!(verify_password(&stored, "Basic@1234"));
        assert!(!verify_password(&stored, "Basic@12345"));

        let truncated = &stored[..stored.len() - 1];
        assert!(!verify_password(truncated, "Basic@1234"));
        assert!(!verify_password("no-separator", "Basic@1234"));
    }

    #[tokio::test]
    async fn test_create_user_validation() -> Result<()> {
        let db = MockDatabase::new(DatabaseBackend::Sqlite).into_connection();

        let result = create_user(&db, NewUser::new("  ", "a@x.com", "pw")).await;
        assert!(matches!(result, Err(Error::Validation { .. })));

        let result = create_user(&db, NewUser::new("Ana", "not-an-email", "pw")).await;
        assert!(matches!(result, Err(Error::Validation { .. })));

        let result = create_user(&db, NewUser::new("Ana", "a@x.com", "")).await;
        assert!(matches!(result, Err(Error::Validation { .. })));

        Ok(())
    }

    #[tokio::test]
    async fn test_create_user_integration() -> Result<()> {
        let db = setup_test_db().await?;

        let created = create_user(&db, NewUser::new(" Ana Costa ", " Ana@X.com ", "Basic@1234")).await?;
        assert_eq!(created.name, "Ana Costa");
        assert_eq!(created.email, "ana@x.com");
        assert_ne!(created.password_hash, "Basic@1234");
        assert!(created.last_login_at.is_none());
        assert_eq!(created.created_at, created.updated_at);

        Ok(())
    }

    #[tokio::test]
    async fn test_duplicate_email_conflicts() -> Result<()> {
        let db = setup_test_db().await?;

        let first = create_user(&db, NewUser::new("A", "a@x.com", "pw1")).await;
        let second = create_user(&db, NewUser::new("B", "A@X.COM", "pw2")).await;

        assert!(first.is_ok());
        match second {
            Err(Error::Conflict { entity, field }) => {
                assert_eq!(entity, "users");
                assert_eq!(field, "email");
            }
            other => panic!("expected conflict, got {other:?}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_lookup_by_email_and_id_is_stable() -> Result<()> {
        let db = setup_test_db().await?;
        let created = create_test_user(&db, "joao.silva@email.com").await?;

        let by_email = get_user_by_email(&db, "JOAO.SILVA@email.com").await?.unwrap();
        assert_eq!(by_email.id, created.id);

        let first_read = get_user_by_id(&db, &created.id).await?;
        let second_read = get_user_by_id(&db, &created.id).await?;
        assert_eq!(first_read, second_read);
        assert_eq!(first_read.unwrap(), created);

        assert!(get_user_by_id(&db, "missing").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_find_and_search_by_name() -> Result<()> {
        let db = setup_test_db().await?;
        create_user(&db, NewUser::new("Maria Santos", "maria@x.com", "pw")).await?;
        create_user(&db, NewUser::new("Pedro Oliveira", "pedro@x.com", "pw")).await?;

        assert!(find_users_by_name(&db, "maria santos", StringMatch::Exact).await?.is_empty());
        assert_eq!(
            find_users_by_name(&db, "maria santos", StringMatch::CaseInsensitive)
                .await?
                .len(),
            1
        );

        let hits = search_users(&db, "OLIV").await?;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "Pedro Oliveira");

        let by_email = search_users(&db, "maria@").await?;
        assert_eq!(by_email.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_list_users_ordering_and_paging() -> Result<()> {
        let db = setup_test_db().await?;
        for i in 0..5 {
            create_test_user(&db, &format!("user{i}@x.com")).await?;
        }

        let ascending = list_users(&db, ListOptions::default()).await?;
        let descending = list_users(&db, ListOptions::descending().with_limit(2)).await?;
        assert_eq!(ascending.len(), 5);
        assert_eq!(descending.len(), 2);
        assert_eq!(descending[0].created_at, ascending[4].created_at);

        let page = list_users_page(&db, 2, 2).await?;
        assert_eq!(page.total, 5);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.items.len(), 2);

        let last = list_users_page(&db, 3, 2).await?;
        assert_eq!(last.items.len(), 1);

        assert!(matches!(
            list_users_page(&db, 0, 2).await,
            Err(Error::Validation { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_update_user() -> Result<()> {
        let db = setup_test_db().await?;
        let ana = create_test_user(&db, "ana@x.com").await?;
        let joao = create_test_user(&db, "joao@x.com").await?;

        let renamed = update_user(
            &db,
            &ana.id,
            UserUpdate {
                name: Some("Ana C.".to_string()),
                ..Default::default()
            },
        )
        .await?;
        assert_eq!(renamed.name, "Ana C.");
        assert_eq!(renamed.email, "ana@x.com");
        assert!(renamed.updated_at >= ana.updated_at);

        let clash = update_user(
            &db,
            &joao.id,
            UserUpdate {
                email: Some("ANA@x.com".to_string()),
                ..Default::default()
            },
        )
        .await;
        assert!(matches!(clash, Err(Error::Conflict { .. })));

        let missing = update_user(&db, "nope", UserUpdate::default()).await;
        assert!(matches!(missing, Err(Error::NotFound { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_email_availability() -> Result<()> {
        let db = setup_test_db().await?;
        let ana = create_test_user(&db, "ana@x.com").await?;

        assert!(is_email_available(&db, "free@x.com", None).await?);
        assert!(!is_email_available(&db, "ANA@x.com", None).await?);
        assert!(is_email_available(&db, "ana@x.com", Some(&ana.id)).await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_authenticate_stamps_last_login() -> Result<()> {
        let db = setup_test_db().await?;
        create_user(&db, NewUser::new("Ana", "ana@x.com", "Basic@1234")).await?;

        assert!(authenticate(&db, "ana@x.com", "wrong").await?.is_none());
        assert!(authenticate(&db, "nobody@x.com", "Basic@1234").await?.is_none());

        let logged_in = authenticate(&db, "ANA@x.com", "Basic@1234").await?.unwrap();
        assert!(logged_in.last_login_at.is_some());

        let stored = get_user_by_email(&db, "ana@x.com").await?.unwrap();
        assert_eq!(stored.last_login_at, logged_in.last_login_at);
        Ok(())
    }

    #[tokio::test]
    async fn test_password_change_invalidates_old_password() -> Result<()> {
        let db = setup_test_db().await?;
        let ana = create_user(&db, NewUser::new("Ana", "ana@x.com", "old-pass")).await?;

        update_user(
            &db,
            &ana.id,
            UserUpdate {
                password: Some("new-pass".to_string()),
                ..Default::default()
            },
        )
        .await?;

        assert!(authenticate(&db, "ana@x.com", "old-pass").await?.is_none());
        assert!(authenticate(&db, "ana@x.com", "new-pass").await?.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn test_count_users_created_between() -> Result<()> {
        let db = setup_test_db().await?;
        let before = Utc::now() - Duration::seconds(1);
        create_test_user(&db, "a@x.com").await?;
        create_test_user(&db, "b@x.com").await?;
        let after = Utc::now() + Duration::seconds(1);

        assert_eq!(count_users_created_between(&db, before, after).await?, 2);
        assert_eq!(
            count_users_created_between(&db, after, after + Duration::days(1)).await?,
            0
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_user_cascades() -> Result<()> {
        let db = setup_test_db().await?;
        let owner = create_test_user(&db, "owner@x.com").await?;
        let other = create_test_user(&db, "other@x.com").await?;
        let petr = create_test_investment(&db, "PETR4").await?;
        let vale = create_test_investment(&db, "VALE3").await?;

        let growth = create_test_portfolio(&db, &owner.id, "Growth").await?;
        let income = create_test_portfolio(&db, &owner.id, "Income").await?;
        let others_portfolio = create_test_portfolio(&db, &other.id, "Other").await?;
        create_test_item(&db, &growth.id, &petr.id, 10, 28.5).await?;
        create_test_item(&db, &growth.id, &vale.id, 5, 65.8).await?;
        create_test_item(&db, &income.id, &petr.id, 1, 28.0).await?;
        create_test_item(&db, &others_portfolio.id, &petr.id, 3, 27.0).await?;

        favorites::add_favorite(&db, &owner.id, &petr.id).await?;
        favorites::add_favorite(&db, &owner.id, &vale.id).await?;
        favorites::add_favorite(&db, &other.id, &petr.id).await?;
        notifications::send_notification(&db, &owner.id, "Welcome").await?;

        let deletion = delete_user(&db, &owner.id).await?;
        assert_eq!(
            deletion,
            UserDeletion {
                portfolios: 2,
                portfolio_items: 3,
                favorites: 2,
                notifications: 1,
            }
        );
        assert_eq!(deletion.total(), 8);

        assert!(get_user_by_id(&db, &owner.id).await?.is_none());
        assert!(portfolios::get_portfolio_by_id(&db, &growth.id).await?.is_none());
        assert!(portfolios::list_items(&db, &growth.id).await?.is_empty());
        assert!(favorites::list_favorites_for_user(&db, &owner.id).await?.is_empty());
        assert_eq!(notifications::count_unread_for_user(&db, &owner.id).await?, 0);

        // The other user's data and the shared investments survive
        assert_eq!(portfolios::list_items(&db, &others_portfolio.id).await?.len(), 1);
        assert_eq!(favorites::count_favorites_for_user(&db, &other.id).await?, 1);
        assert!(crate::core::investment::get_investment_by_id(&db, &petr.id).await?.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_missing_user() -> Result<()> {
        let db = setup_test_db().await?;
        let result = delete_user(&db, "ghost").await;
        assert!(matches!(result, Err(Error::NotFound { entity: "user", .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_deleting_owner_keeps_shared_investment() -> Result<()> {
        let db = setup_test_db().await?;
        let owner = create_user(&db, NewUser::new("U", "a@x.com", "secret")).await?;
        let portfolio = create_test_portfolio(&db, &owner.id, "P").await?;
        let investment = create_test_investment(&db, "PETR4").await?;
        let item = create_test_item(&db, &portfolio.id, &investment.id, 10, 28.50).await?;

        delete_user(&db, &owner.id).await?;

        assert!(portfolios::get_portfolio_by_id(&db, &portfolio.id).await?.is_none());
        assert!(portfolios::get_item(&db, &item.id).await?.is_none());
        let remaining = crate::core::investment::get_investment_by_id(&db, &investment.id).await?;
        assert_eq!(remaining.map(|i| i.code).as_deref(), Some("PETR4"));
        Ok(())
    }

    #[tokio::test]
    async fn test_schema_cascade_without_contract() -> Result<()> {
        let db = setup_test_db().await?;
        let owner = create_test_user(&db, "a@x.com").await?;
        let portfolio = create_test_portfolio(&db, &owner.id, "P").await?;
        let investment = create_test_investment(&db, "PETR4").await?;
        create_test_item(&db, &portfolio.id, &investment.id, 1, 1.0).await?;
        favorites::add_favorite(&db, &owner.id, &investment.id).await?;

        // A raw delete still leaves no orphans behind
        User::delete_by_id(owner.id.as_str()).exec(&db).await?;

        assert_eq!(Portfolio::find().count(&db).await?, 0);
        assert_eq!(PortfolioItem::find().count(&db).await?, 0);
        assert_eq!(Favorite::find().count(&db).await?, 0);
        Ok(())
    }
}
