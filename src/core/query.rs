//! Shared read options: ordering, null placement, text matching and paging.
//!
//! List operations in the other `core` modules pick the column to sort on; callers choose
//! the direction, where NULLs go, and how many rows to skip or take.

use crate::errors::{Error, Result};
use sea_orm::sea_query::{Expr, Func, LikeExpr, NullOrdering, SimpleExpr};
use sea_orm::{
    ColumnTrait, ConnectionTrait, EntityTrait, Order, PaginatorTrait, QueryOrder, QuerySelect,
    Select,
};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Sort direction
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    /// Smallest first
    #[default]
    Ascending,
    /// Largest first
    Descending,
}

impl From<SortDirection> for Order {
    fn from(direction: SortDirection) -> Self {
        match direction {
            SortDirection::Ascending => Self::Asc,
            SortDirection::Descending => Self::Desc,
        }
    }
}

/// Where NULL values land in an ordering
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NullsOrder {
    /// NULLs before any value
    First,
    /// NULLs after every value
    Last,
}

impl From<NullsOrder> for NullOrdering {
    fn from(nulls: NullsOrder) -> Self {
        match nulls {
            NullsOrder::First => Self::First,
            NullsOrder::Last => Self::Last,
        }
    }
}

/// How a text filter compares values
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StringMatch {
    /// Byte-for-byte equality
    #[default]
    Exact,
    /// Equality after lower-casing both sides
    CaseInsensitive,
}

/// Looks `raw` up in `names` after normalising it to upper-snake case.
fn parse_named<T: Copy>(kind: &str, raw: &str, names: &[(&str, T)]) -> Result<T> {
    let wanted = raw.trim().to_uppercase().replace(['-', ' '], "_");
    names
        .iter()
        .find(|(name, _)| *name == wanted)
        .map(|(_, value)| *value)
        .ok_or_else(|| Error::Validation {
            message: format!("unknown {kind} `{raw}`"),
        })
}

impl SortDirection {
    const NAMES: [(&'static str, Self); 2] = [("ASC", Self::Ascending), ("DESC", Self::Descending)];
}

impl NullsOrder {
    const NAMES: [(&'static str, Self); 2] = [("NULLS_FIRST", Self::First), ("NULLS_LAST", Self::Last)];
}

impl StringMatch {
    const NAMES: [(&'static str, Self); 2] = [
        ("EXACT", Self::Exact),
        ("CASE_INSENSITIVE", Self::CaseInsensitive),
    ];
}

macro_rules! named_enum {
    ($ty:ty, $kind:literal) => {
        impl FromStr for $ty {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                parse_named($kind, s, &Self::NAMES)
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let name = Self::NAMES
                    .iter()
                    .find(|(_, value)| value == self)
                    .map_or("", |(name, _)| name);
                f.write_str(name)
            }
        }
    };
}

named_enum!(SortDirection, "sort direction");
named_enum!(NullsOrder, "null ordering");
named_enum!(StringMatch, "string match mode");

/// Ordering and paging for list operations
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ListOptions {
    /// Sort direction on the operation's sort column
    pub direction: SortDirection,
    /// NULL placement, backend default when `None`
    pub nulls: Option<NullsOrder>,
    /// Maximum rows to return
    pub limit: Option<u64>,
    /// Rows to skip
    pub offset: Option<u64>,
}

impl ListOptions {
    /// Newest (or largest) first.
    #[must_use]
    pub fn descending() -> Self {
        Self {
            direction: SortDirection::Descending,
            ..Self::default()
        }
    }

    /// Same options with a row limit.
    #[must_use]
    pub const fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Same options with a NULL placement.
    #[must_use]
    pub const fn with_nulls(mut self, nulls: NullsOrder) -> Self {
        self.nulls = Some(nulls);
        self
    }

    /// Applies ordering on `column`, then limit and offset, to `select`.
    #[must_use]
    pub fn apply<E, C>(&self, select: Select<E>, column: C) -> Select<E>
    where
        E: EntityTrait,
        C: ColumnTrait,
    {
        let order: Order = self.direction.into();
        let mut select = match self.nulls {
            Some(nulls) => select.order_by_with_nulls(column, order, nulls.into()),
            None => select.order_by(column, order),
        };
        if let Some(limit) = self.limit {
            select = select.limit(limit);
        }
        if let Some(offset) = self.offset {
            select = select.offset(offset);
        }
        select
    }
}

/// Builds an equality filter on a text column honouring `mode`.
pub fn text_eq<C>(column: C, value: &str, mode: StringMatch) -> SimpleExpr
where
    C: ColumnTrait,
{
    match mode {
        StringMatch::Exact => column.eq(value),
        StringMatch::CaseInsensitive => {
            Expr::expr(Func::lower(Expr::col(column))).eq(value.to_lowercase())
        }
    }
}

/// Builds a case-insensitive substring filter on a text column.
///
/// `needle` is matched literally: `%` and `_` in it carry no wildcard meaning.
pub fn text_contains<C>(column: C, needle: &str) -> SimpleExpr
where
    C: ColumnTrait,
{
    let pattern = format!("%{}%", escape_like(&needle.to_lowercase()));
    Expr::expr(Func::lower(Expr::col(column))).like(LikeExpr::new(pattern).escape(LIKE_ESCAPE))
}

const LIKE_ESCAPE: char = '!';

fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | LIKE_ESCAPE) {
            escaped.push(LIKE_ESCAPE);
        }
        escaped.push(c);
    }
    escaped
}

/// One page of results
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Page<T> {
    /// Rows on this page
    pub items: Vec<T>,
    /// Rows across all pages
    pub total: u64,
    /// 1-based page number
    pub page: u64,
    /// Page size
    pub per_page: u64,
    /// Number of pages
    pub total_pages: u64,
}

/// Fetches page `page` (1-based) of `select`, `per_page` rows at a time.
///
/// # Errors
/// Returns [`Error::Validation`] when `page` or `per_page` is zero.
pub async fn fetch_page<C, E>(
    db: &C,
    select: Select<E>,
    page: u64,
    per_page: u64,
) -> Result<Page<E::Model>>
where
    C: ConnectionTrait,
    E: EntityTrait,
    E::Model: Sync,
{
    if page == 0 || per_page == 0 {
        return Err(Error::Validation {
            message: "page and per_page must be at least 1".to_string(),
        });
    }

    let paginator = select.paginate(db, per_page);
    let total = paginator.num_items().await?;
    let items = paginator.fetch_page(page - 1).await?;

    Ok(Page {
        items,
        total,
        page,
        per_page,
        total_pages: total.div_ceil(per_page),
    })
}
