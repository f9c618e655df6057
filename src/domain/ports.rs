use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::actor::ParticipantRole;
use super::cart::{CartLine, ProductSnapshot};
use super::errors::DomainError;
use super::message::{MessageView, NewMessage};
use super::notification::{Notification, NotifyError};
use super::order::{ListResult, OrderDraft, OrderStatus, OrderView, RefundRecord};
use super::payment::{
    CheckoutRequest, CheckoutSession, Completion, GatewayError, RefundResult, SessionStatus,
    SignatureError, WebhookEvent,
};
use super::quote::{NewQuote, Quote, QuoteStatus};
use super::service::{GuestAccess, NewInquiry, ServiceTransaction, StatusChange};

/// Durable record of orders and their items.
pub trait OrderLedger: Send + Sync + 'static {
    /// Writes the order and its item snapshots in one transaction.
    fn place_order(&self, draft: &OrderDraft, session: &CheckoutSession)
        -> Result<OrderView, DomainError>;
    fn find_by_id(&self, id: Uuid) -> Result<Option<OrderView>, DomainError>;
    fn find_id_by_payment_intent(&self, payment_intent: &str) -> Result<Option<Uuid>, DomainError>;
    fn list_for_member(
        &self,
        member_id: Uuid,
        page: i64,
        limit: i64,
    ) -> Result<ListResult, DomainError>;
    /// pending → paid exactly once: grants bookshelf entries, decrements
    /// stock and clears the cart inside the same transaction.
    fn complete_order(
        &self,
        order_id: Uuid,
        payment_reference: &str,
        paid_at: DateTime<Utc>,
    ) -> Result<Completion<OrderView>, DomainError>;
    /// Returns the order if it was still pending.
    fn mark_payment_failed(
        &self,
        order_id: Uuid,
        reason: Option<&str>,
    ) -> Result<Option<OrderView>, DomainError>;
    /// Applies an absolute refund state. Stale (lower) totals are ignored.
    fn record_refund(
        &self,
        order_id: Uuid,
        refund: &RefundRecord,
    ) -> Result<Option<OrderView>, DomainError>;
    fn advance_status(
        &self,
        order_id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
        tracking_number: Option<&str>,
    ) -> Result<bool, DomainError>;
    /// Cancels an order nobody has paid for yet.
    fn cancel_unpaid(&self, order_id: Uuid) -> Result<bool, DomainError>;
}

pub trait CartRepository: Send + Sync + 'static {
    fn find_product(&self, product_id: Uuid) -> Result<Option<ProductSnapshot>, DomainError>;
    /// Sets the quantity of a product in the member's cart.
    fn upsert_item(&self, member_id: Uuid, product_id: Uuid, quantity: i32)
        -> Result<(), DomainError>;
    fn remove_item(&self, member_id: Uuid, product_id: Uuid) -> Result<bool, DomainError>;
    fn lines(&self, member_id: Uuid) -> Result<Vec<CartLine>, DomainError>;
}

#[derive(Debug, Clone)]
pub struct BookshelfItem {
    pub product_id: Uuid,
    pub product_name: String,
    pub order_id: Uuid,
    pub granted_at: DateTime<Utc>,
}

pub trait BookshelfRepository: Send + Sync + 'static {
    fn list(&self, member_id: Uuid) -> Result<Vec<BookshelfItem>, DomainError>;
    fn owns(&self, member_id: Uuid, product_id: Uuid) -> Result<bool, DomainError>;
}

/// Remembers gateway event ids so replays are absorbed.
pub trait WebhookEventLog: Send + Sync + 'static {
    /// `false` if the event id was already recorded.
    fn record(&self, event_id: &str, event_type: &str) -> Result<bool, DomainError>;
    /// Removes a record so a failed delivery can be retried by the gateway.
    fn forget(&self, event_id: &str) -> Result<(), DomainError>;
}

#[derive(Debug, Clone)]
pub struct InquiryCreated {
    pub transaction: ServiceTransaction,
    pub guest_access: Option<GuestAccess>,
}

pub trait ServiceTransactionRepository: Send + Sync + 'static {
    /// Creates the transaction in `inquiry` together with the opening message.
    fn create_inquiry(
        &self,
        inquiry: &NewInquiry,
        code: &str,
        guest_access: Option<&GuestAccess>,
    ) -> Result<ServiceTransaction, DomainError>;
    fn find(&self, id: Uuid) -> Result<Option<ServiceTransaction>, DomainError>;
    /// Only returns the transaction while the token is unexpired at `now`.
    fn find_by_guest_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<ServiceTransaction>, DomainError>;
    fn find_id_by_payment_reference(&self, reference: &str) -> Result<Option<Uuid>, DomainError>;
    fn list_for_participant(
        &self,
        role: ParticipantRole,
        participant_id: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<ServiceTransaction>, DomainError>;
    /// Applies `change` only if the transaction is still in `change.from`.
    /// Returns the updated transaction, or `None` when the gate did not match.
    fn apply(
        &self,
        id: Uuid,
        change: &StatusChange,
    ) -> Result<Option<ServiceTransaction>, DomainError>;
    /// Stores the next quote version and applies `change` atomically.
    fn add_quote(
        &self,
        id: Uuid,
        quote: &NewQuote,
        status: QuoteStatus,
        change: &StatusChange,
    ) -> Result<Option<Quote>, DomainError>;
    fn list_quotes(&self, id: Uuid) -> Result<Vec<Quote>, DomainError>;
    fn current_quote(&self, id: Uuid) -> Result<Option<Quote>, DomainError>;
}

pub trait MessageRepository: Send + Sync + 'static {
    fn post(&self, transaction_id: Uuid, message: &NewMessage) -> Result<MessageView, DomainError>;
    /// Filtering by audience happens in the query itself.
    fn list_visible(
        &self,
        transaction_id: Uuid,
        viewer: ParticipantRole,
    ) -> Result<Vec<MessageView>, DomainError>;
    fn mark_read(&self, transaction_id: Uuid, reader: ParticipantRole) -> Result<usize, DomainError>;
    fn unread_count(&self, transaction_id: Uuid, reader: ParticipantRole) -> Result<i64, DomainError>;
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, GatewayError>;
    async fn retrieve_checkout_session(&self, session_id: &str)
        -> Result<SessionStatus, GatewayError>;
    fn verify_webhook(&self, payload: &[u8], signature_header: &str)
        -> Result<WebhookEvent, SignatureError>;
    async fn refund(
        &self,
        payment_reference: &str,
        amount: Option<i64>,
    ) -> Result<RefundResult, GatewayError>;
}

/// Black-box mail/archive transport.
pub trait Notifier: Send + Sync {
    fn send(&self, notification: &Notification) -> Result<(), NotifyError>;
}

