//! Core business logic - The storage access contract, one module per entity.
//!
//! Functions take any `sea-orm` connection (or an open transaction) and return the crate
//! [`Result`](crate::errors::Result). Writes that touch more than one row open their own
//! database transaction.

pub mod favorite;
pub mod investment;
pub mod market_data;
pub mod notification;
pub mod portfolio;
pub mod price_alert;
pub mod query;
pub mod report;
pub mod seed;
pub mod system_log;
pub mod transaction;
pub mod user;

use crate::errors::{Error, Result};

/// Rejects prices, fees and values that are negative, NaN or infinite.
pub(crate) fn validate_amount(amount: f64) -> Result<()> {
    if !amount.is_finite() || amount < 0.0 {
        return Err(Error::InvalidAmount { amount });
    }
    Ok(())
}

/// Rejects negative quantities.
pub(crate) fn validate_quantity(quantity: i32) -> Result<()> {
    if quantity < 0 {
        return Err(Error::Validation {
            message: format!("Quantity cannot be negative: {quantity}"),
        });
    }
    Ok(())
}

/// Trims `value` and rejects it when nothing is left.
pub(crate) fn require_text(field: &str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::Validation {
            message: format!("{field} cannot be empty"),
        });
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_amount() {
        assert!(validate_amount(0.0).is_ok());
        assert!(validate_amount(28.5).is_ok());
        assert!(matches!(validate_amount(-0.01), Err(Error::InvalidAmount { .. })));
        assert!(validate_amount(f64::NAN).is_err());
        assert!(validate_amount(f64::INFINITY).is_err());
    }

    #[test]
    fn test_require_text_trims() {
        assert_eq!(require_text("Name", "  Growth ").ok().as_deref(), Some("Growth"));
        assert!(matches!(require_text("Name", " \t"), Err(Error::Validation { .. })));
    }
}
