use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::errors::DomainError;

status_enum!(
    QuoteStatus, "quote status" {
        Draft => "draft",
        Sent => "sent",
        Accepted => "accepted",
        Rejected => "rejected",
    }
);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct QuoteItem {
    pub description: String,
    pub unit_amount: i64,
    pub quantity: i32,
}

impl QuoteItem {
    pub fn amount(&self) -> i64 {
        self.unit_amount * i64::from(self.quantity)
    }
}

/// Quote terms as submitted by the creator, before pricing is checked.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct QuoteInput {
    pub items: Vec<QuoteItem>,
    #[serde(default)]
    pub tax: i64,
    pub estimated_delivery_days: Option<i32>,
    pub note: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewQuote {
    pub items: Vec<QuoteItem>,
    pub subtotal: i64,
    pub tax: i64,
    pub total: i64,
    pub estimated_delivery_days: Option<i32>,
    pub note: Option<String>,
}

impl QuoteInput {
    pub fn price(self) -> Result<NewQuote, DomainError> {
        if self.items.is_empty() {
            return Err(DomainError::invalid("a quote needs at least one line item"));
        }
        if let Some(item) = self
            .items
            .iter()
            .find(|i| i.description.trim().is_empty() || i.quantity <= 0 || i.unit_amount < 0)
        {
            return Err(DomainError::invalid(format!(
                "invalid quote line '{}'",
                item.description
            )));
        }
        if self.tax < 0 {
            return Err(DomainError::invalid("tax cannot be negative"));
        }
        if matches!(self.estimated_delivery_days, Some(days) if days <= 0) {
            return Err(DomainError::invalid(
                "estimated delivery must be at least one day",
            ));
        }

        let subtotal: i64 = self.items.iter().map(QuoteItem::amount).sum();
        Ok(NewQuote {
            subtotal,
            tax: self.tax,
            total: subtotal + self.tax,
            items: self.items,
            estimated_delivery_days: self.estimated_delivery_days,
            note: self.note.filter(|n| !n.trim().is_empty()),
        })
    }
}

#[derive(Debug, Clone)]
pub struct Quote {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub version: i32,
    pub items: Vec<QuoteItem>,
    pub subtotal: i64,
    pub tax: i64,
    pub total: i64,
    pub estimated_delivery_days: Option<i32>,
    pub note: Option<String>,
    pub status: QuoteStatus,
    pub created_at: DateTime<Utc>,
}
