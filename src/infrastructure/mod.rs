use std::str::FromStr;

use crate::domain::errors::DomainError;

pub mod bookshelf;
pub mod cart_repo;
pub mod inventory;
pub mod message_repo;
pub mod models;
pub mod notifier;
pub mod order_repo;
pub mod outbox;
pub mod service_repo;
pub mod stripe;
pub mod webhook_events;

#[cfg(test)]
pub(crate) mod test_support;

// ── Error conversions (infrastructure concern only) ──────────────────────────

impl From<diesel::result::Error> for DomainError {
    fn from(e: diesel::result::Error) -> Self {
        DomainError::Internal(e.to_string())
    }
}

impl From<r2d2::Error> for DomainError {
    fn from(e: r2d2::Error) -> Self {
        DomainError::Internal(e.to_string())
    }
}

/// Parses a stored enum column. A value the CHECK constraint let through
/// but the code does not know is a server-side fault, not bad input.
pub(crate) fn parse_column<T>(value: &str) -> Result<T, DomainError>
where
    T: FromStr<Err = DomainError>,
{
    value
        .parse()
        .map_err(|e: DomainError| DomainError::Internal(e.to_string()))
}
