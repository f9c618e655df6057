use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde_json::Value;
use uuid::Uuid;

use crate::domain::actor::ParticipantRole;
use crate::domain::cart::ProductSnapshot;
use crate::domain::errors::DomainError;
use crate::domain::message::{AttachmentView, MessageView, Visibility};
use crate::domain::order::{OrderItemView, OrderView, ShippingAddress};
use crate::domain::quote::Quote;
use crate::domain::service::{CustomerRef, ServiceTransaction};
use crate::schema::{
    bookshelf_entries, cart_items, commerce_outbox, order_items, orders, processed_webhook_events,
    products, service_message_attachments, service_messages, service_quotes,
    service_transactions, services,
};

use super::parse_column;

// ── Catalogue / cart ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = products)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ProductRow {
    pub id: Uuid,
    pub creator_id: Option<Uuid>,
    pub name: String,
    pub product_type: String,
    pub price: i64,
    pub stock: i32,
    pub is_out_of_stock: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProductRow {
    pub fn into_snapshot(self) -> Result<ProductSnapshot, DomainError> {
        Ok(ProductSnapshot {
            id: self.id,
            name: self.name,
            product_type: parse_column(&self.product_type)?,
            price: self.price,
            stock: self.stock,
            is_out_of_stock: self.is_out_of_stock,
        })
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = products)]
pub struct NewProductRow {
    pub id: Uuid,
    pub creator_id: Option<Uuid>,
    pub name: String,
    pub product_type: String,
    pub price: i64,
    pub stock: i32,
    pub is_out_of_stock: bool,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = cart_items)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CartItemRow {
    pub id: Uuid,
    pub member_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = cart_items)]
pub struct NewCartItemRow {
    pub id: Uuid,
    pub member_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
}

// ── Orders ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = orders)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OrderRow {
    pub id: Uuid,
    pub member_id: Uuid,
    pub subtotal: i64,
    pub shipping_fee: i64,
    pub total: i64,
    pub payment_status: String,
    pub order_status: String,
    pub checkout_session_id: Option<String>,
    pub payment_intent_id: Option<String>,
    pub refund_amount: i64,
    pub external_refund_id: Option<String>,
    pub failure_reason: Option<String>,
    pub tracking_number: Option<String>,
    pub shipping_name: Option<String>,
    pub shipping_postal_code: Option<String>,
    pub shipping_address: Option<String>,
    pub shipping_phone: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderRow {
    pub fn into_view(self, items: Vec<OrderItemRow>) -> Result<OrderView, DomainError> {
        let shipping = match (self.shipping_name, self.shipping_postal_code, self.shipping_address) {
            (Some(name), Some(postal_code), Some(address)) => Some(ShippingAddress {
                name,
                postal_code,
                address,
                phone: self.shipping_phone,
            }),
            _ => None,
        };
        Ok(OrderView {
            id: self.id,
            member_id: self.member_id,
            subtotal: self.subtotal,
            shipping_fee: self.shipping_fee,
            total: self.total,
            payment_status: parse_column(&self.payment_status)?,
            order_status: parse_column(&self.order_status)?,
            checkout_session_id: self.checkout_session_id,
            payment_intent_id: self.payment_intent_id,
            refund_amount: self.refund_amount,
            external_refund_id: self.external_refund_id,
            failure_reason: self.failure_reason,
            tracking_number: self.tracking_number,
            shipping,
            paid_at: self.paid_at,
            created_at: self.created_at,
            items: items
                .into_iter()
                .map(OrderItemRow::into_view)
                .collect::<Result<_, _>>()?,
        })
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = orders)]
pub struct NewOrderRow {
    pub id: Uuid,
    pub member_id: Uuid,
    pub subtotal: i64,
    pub shipping_fee: i64,
    pub total: i64,
    pub payment_status: String,
    pub order_status: String,
    pub checkout_session_id: Option<String>,
    pub shipping_name: Option<String>,
    pub shipping_postal_code: Option<String>,
    pub shipping_address: Option<String>,
    pub shipping_phone: Option<String>,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Associations)]
#[diesel(table_name = order_items)]
#[diesel(belongs_to(OrderRow, foreign_key = order_id))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OrderItemRow {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub product_type: String,
    pub unit_price: i64,
    pub quantity: i32,
    pub subtotal: i64,
    pub created_at: DateTime<Utc>,
}

impl OrderItemRow {
    fn into_view(self) -> Result<OrderItemView, DomainError> {
        Ok(OrderItemView {
            id: self.id,
            product_id: self.product_id,
            product_name: self.product_name,
            product_type: parse_column(&self.product_type)?,
            unit_price: self.unit_price,
            quantity: self.quantity,
            subtotal: self.subtotal,
        })
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = order_items)]
pub struct NewOrderItemRow {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub product_type: String,
    pub unit_price: i64,
    pub quantity: i32,
    pub subtotal: i64,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = bookshelf_entries)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct BookshelfEntryRow {
    pub id: Uuid,
    pub member_id: Uuid,
    pub product_id: Uuid,
    pub order_id: Uuid,
    pub granted_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = bookshelf_entries)]
pub struct NewBookshelfEntryRow {
    pub id: Uuid,
    pub member_id: Uuid,
    pub product_id: Uuid,
    pub order_id: Uuid,
}

// ── Outbox / webhook bookkeeping ─────────────────────────────────────────────

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = commerce_outbox)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OutboxEventRow {
    pub id: Uuid,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub event_type: String,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = commerce_outbox)]
pub struct NewOutboxEventRow {
    pub id: Uuid,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub event_type: String,
    pub payload: Value,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = processed_webhook_events)]
pub struct NewProcessedEventRow<'a> {
    pub event_id: &'a str,
    pub event_type: &'a str,
}

// ── Service transactions ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = services)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ServiceRow {
    pub id: Uuid,
    pub creator_id: Uuid,
    pub title: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = services)]
pub struct NewServiceRow {
    pub id: Uuid,
    pub creator_id: Uuid,
    pub title: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = service_transactions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ServiceTransactionRow {
    pub id: Uuid,
    pub code: String,
    pub service_id: Uuid,
    pub creator_id: Uuid,
    pub customer_member_id: Option<Uuid>,
    pub guest_email: Option<String>,
    pub guest_name: Option<String>,
    pub status: String,
    pub total_amount: Option<i64>,
    pub deadline: Option<DateTime<Utc>>,
    pub checkout_session_id: Option<String>,
    pub payment_reference: Option<String>,
    pub refund_amount: Option<i64>,
    pub external_refund_id: Option<String>,
    pub cancel_reason: Option<String>,
    pub guest_token: Option<String>,
    pub guest_token_expires_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ServiceTransactionRow {
    pub fn into_domain(self) -> Result<ServiceTransaction, DomainError> {
        let customer = match (self.customer_member_id, self.guest_email) {
            (Some(member_id), _) => CustomerRef::Member(member_id),
            (None, Some(email)) => CustomerRef::Guest {
                email,
                name: self.guest_name.unwrap_or_default(),
            },
            (None, None) => {
                return Err(DomainError::Internal(format!(
                    "service transaction {} has no customer",
                    self.id
                )))
            }
        };
        Ok(ServiceTransaction {
            id: self.id,
            code: self.code,
            service_id: self.service_id,
            creator_id: self.creator_id,
            customer,
            status: parse_column(&self.status)?,
            total_amount: self.total_amount,
            deadline: self.deadline,
            checkout_session_id: self.checkout_session_id,
            payment_reference: self.payment_reference,
            refund_amount: self.refund_amount,
            external_refund_id: self.external_refund_id,
            cancel_reason: self.cancel_reason,
            guest_token: self.guest_token,
            guest_token_expires_at: self.guest_token_expires_at,
            paid_at: self.paid_at,
            delivered_at: self.delivered_at,
            completed_at: self.completed_at,
            cancelled_at: self.cancelled_at,
            refunded_at: self.refunded_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = service_transactions)]
pub struct NewServiceTransactionRow {
    pub id: Uuid,
    pub code: String,
    pub service_id: Uuid,
    pub creator_id: Uuid,
    pub customer_member_id: Option<Uuid>,
    pub guest_email: Option<String>,
    pub guest_name: Option<String>,
    pub status: String,
    pub deadline: Option<DateTime<Utc>>,
    pub guest_token: Option<String>,
    pub guest_token_expires_at: Option<DateTime<Utc>>,
}

/// Columns a lifecycle step may touch. `None` leaves the column as is.
#[derive(Debug, Default, AsChangeset)]
#[diesel(table_name = service_transactions)]
pub struct TransactionChangeset {
    pub status: Option<String>,
    pub total_amount: Option<i64>,
    pub deadline: Option<DateTime<Utc>>,
    pub checkout_session_id: Option<String>,
    pub payment_reference: Option<String>,
    pub refund_amount: Option<i64>,
    pub external_refund_id: Option<String>,
    pub cancel_reason: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = service_quotes)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ServiceQuoteRow {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub version: i32,
    pub items: Value,
    pub subtotal: i64,
    pub tax: i64,
    pub total: i64,
    pub estimated_delivery_days: Option<i32>,
    pub note: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl ServiceQuoteRow {
    pub fn into_domain(self) -> Result<Quote, DomainError> {
        Ok(Quote {
            id: self.id,
            transaction_id: self.transaction_id,
            version: self.version,
            items: serde_json::from_value(self.items)
                .map_err(|e| DomainError::Internal(format!("quote {} items: {}", self.id, e)))?,
            subtotal: self.subtotal,
            tax: self.tax,
            total: self.total,
            estimated_delivery_days: self.estimated_delivery_days,
            note: self.note,
            status: parse_column(&self.status)?,
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = service_quotes)]
pub struct NewServiceQuoteRow {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub version: i32,
    pub items: Value,
    pub subtotal: i64,
    pub tax: i64,
    pub total: i64,
    pub estimated_delivery_days: Option<i32>,
    pub note: Option<String>,
    pub status: String,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = service_messages)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ServiceMessageRow {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub sender_role: String,
    pub sender_id: Option<Uuid>,
    pub body: String,
    pub visible_to_customer: bool,
    pub visible_to_creator: bool,
    pub visible_to_admin: bool,
    pub read_by_customer: bool,
    pub read_by_creator: bool,
    pub read_by_admin: bool,
    pub created_at: DateTime<Utc>,
}

impl ServiceMessageRow {
    /// `read` is reported from the viewer's own flag.
    pub fn into_view(
        self,
        viewer: ParticipantRole,
        attachments: Vec<AttachmentRow>,
    ) -> Result<MessageView, DomainError> {
        let read = match viewer {
            ParticipantRole::Customer => self.read_by_customer,
            ParticipantRole::Creator => self.read_by_creator,
            ParticipantRole::Admin => self.read_by_admin,
        };
        Ok(MessageView {
            id: self.id,
            transaction_id: self.transaction_id,
            sender_role: parse_column(&self.sender_role)?,
            sender_id: self.sender_id,
            body: self.body,
            visibility: Visibility {
                customer: self.visible_to_customer,
                creator: self.visible_to_creator,
                admin: self.visible_to_admin,
            },
            read,
            created_at: self.created_at,
            attachments: attachments
                .into_iter()
                .map(|a| AttachmentView {
                    id: a.id,
                    file_name: a.file_name,
                    storage_path: a.storage_path,
                    content_type: a.content_type,
                    size_bytes: a.size_bytes,
                })
                .collect(),
        })
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = service_messages)]
pub struct NewServiceMessageRow {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub sender_role: String,
    pub sender_id: Option<Uuid>,
    pub body: String,
    pub visible_to_customer: bool,
    pub visible_to_creator: bool,
    pub visible_to_admin: bool,
    pub read_by_customer: bool,
    pub read_by_creator: bool,
    pub read_by_admin: bool,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Associations)]
#[diesel(table_name = service_message_attachments)]
#[diesel(belongs_to(ServiceMessageRow, foreign_key = message_id))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct AttachmentRow {
    pub id: Uuid,
    pub message_id: Uuid,
    pub file_name: String,
    pub storage_path: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = service_message_attachments)]
pub struct NewAttachmentRow {
    pub id: Uuid,
    pub message_id: Uuid,
    pub file_name: String,
    pub storage_path: String,
    pub content_type: String,
    pub size_bytes: i64,
}
