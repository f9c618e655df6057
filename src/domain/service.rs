//! Bespoke-service transaction lifecycle.
//!
//! Every status change is a pattern match over `(status, action)`; anything
//! not listed is rejected with [`DomainError::InvalidTransition`].

use chrono::{DateTime, Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::{Rng, RngCore};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use super::actor::{Actor, ParticipantRole};
use super::errors::DomainError;
use super::message::NewMessage;
use super::quote::QuoteStatus;

status_enum!(
    ServiceStatus, "service status" {
        Inquiry => "inquiry",
        QuotePending => "quote_pending",
        QuoteSent => "quote_sent",
        QuoteRevision => "quote_revision",
        QuoteAccepted => "quote_accepted",
        PaymentPending => "payment_pending",
        Paid => "paid",
        InProgress => "in_progress",
        Delivered => "delivered",
        RevisionRequested => "revision_requested",
        Completed => "completed",
        Cancelled => "cancelled",
        Refunded => "refunded",
    }
);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceAction {
    SaveQuoteDraft,
    SendQuote,
    RequestQuoteRevision,
    AcceptQuote,
    BeginPayment,
    ConfirmPayment,
    StartProduction,
    Deliver,
    RequestRevision,
    Complete,
    Cancel,
    Refund,
}

impl ServiceAction {
    pub fn label(self) -> &'static str {
        match self {
            ServiceAction::SaveQuoteDraft => "save a quote draft",
            ServiceAction::SendQuote => "send a quote",
            ServiceAction::RequestQuoteRevision => "request a quote revision",
            ServiceAction::AcceptQuote => "accept the quote",
            ServiceAction::BeginPayment => "start payment",
            ServiceAction::ConfirmPayment => "confirm payment",
            ServiceAction::StartProduction => "start production",
            ServiceAction::Deliver => "deliver",
            ServiceAction::RequestRevision => "request a revision",
            ServiceAction::Complete => "complete",
            ServiceAction::Cancel => "cancel",
            ServiceAction::Refund => "refund",
        }
    }

    /// Participants allowed to trigger the action. Payment confirmation is
    /// driven by the gateway and is not a participant action.
    pub fn permitted_roles(self) -> &'static [ParticipantRole] {
        use ParticipantRole::*;
        match self {
            ServiceAction::SaveQuoteDraft
            | ServiceAction::SendQuote
            | ServiceAction::StartProduction
            | ServiceAction::Deliver => &[Creator, Admin],
            ServiceAction::RequestQuoteRevision
            | ServiceAction::AcceptQuote
            | ServiceAction::BeginPayment
            | ServiceAction::RequestRevision => &[Customer],
            ServiceAction::Complete => &[Customer, Admin],
            ServiceAction::Cancel | ServiceAction::Refund => &[Customer, Creator, Admin],
            ServiceAction::ConfirmPayment => &[],
        }
    }
}

impl ServiceStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ServiceStatus::Completed | ServiceStatus::Cancelled | ServiceStatus::Refunded
        )
    }

    /// Money has not moved yet, so the transaction may simply be cancelled.
    pub fn is_cancellable(self) -> bool {
        matches!(
            self,
            ServiceStatus::Inquiry
                | ServiceStatus::QuotePending
                | ServiceStatus::QuoteSent
                | ServiceStatus::QuoteRevision
                | ServiceStatus::QuoteAccepted
                | ServiceStatus::PaymentPending
        )
    }

    pub fn next(self, action: ServiceAction) -> Result<ServiceStatus, DomainError> {
        use ServiceAction as A;
        use ServiceStatus as S;

        let next = match (self, action) {
            (S::Inquiry | S::QuotePending, A::SaveQuoteDraft) => S::QuotePending,
            (S::QuoteRevision, A::SaveQuoteDraft) => S::QuoteRevision,
            (S::Inquiry | S::QuotePending | S::QuoteRevision, A::SendQuote) => S::QuoteSent,
            (S::QuoteSent, A::RequestQuoteRevision) => S::QuoteRevision,
            (S::QuoteSent, A::AcceptQuote) => S::QuoteAccepted,
            (S::QuoteAccepted | S::PaymentPending, A::BeginPayment) => S::PaymentPending,
            (S::PaymentPending, A::ConfirmPayment) => S::Paid,
            (S::Paid, A::StartProduction) => S::InProgress,
            (S::InProgress | S::RevisionRequested, A::Deliver) => S::Delivered,
            (S::Delivered, A::RequestRevision) => S::RevisionRequested,
            (S::Delivered, A::Complete) => S::Completed,
            (status, A::Cancel) if status.is_cancellable() => S::Cancelled,
            (status, A::Cancel) if !status.is_terminal() => {
                return Err(DomainError::policy(format!(
                    "payment has already been made ({status}); request a refund instead of cancelling"
                )));
            }
            (status, A::Refund) => {
                refund_policy_check(status)?;
                S::Refunded
            }
            (from, action) => {
                return Err(DomainError::InvalidTransition {
                    from: from.as_str(),
                    action: action.label(),
                })
            }
        };
        Ok(next)
    }
}

/// What the customer is entitled to if the transaction stops now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CancellationPolicy {
    /// Nothing has been paid; cancelling is a pure status change.
    Cancel { refund_rate: u8 },
    /// Money has moved; stopping requires a refund at this rate.
    Refund { refund_rate: u8 },
    NotPermitted,
}

/// Single source of truth for both the UI and enforcement.
pub fn cancellation_policy(status: ServiceStatus) -> CancellationPolicy {
    if status.is_cancellable() {
        return CancellationPolicy::Cancel { refund_rate: 100 };
    }
    match refund_rate(status) {
        0 => CancellationPolicy::NotPermitted,
        rate => CancellationPolicy::Refund { refund_rate: rate },
    }
}

/// Percentage of the paid total that is returned when refunding from `status`.
pub fn refund_rate(status: ServiceStatus) -> u8 {
    match status {
        ServiceStatus::Paid => 100,
        ServiceStatus::InProgress => 50,
        _ => 0,
    }
}

pub fn refundable_amount(total: i64, rate: u8) -> i64 {
    total * i64::from(rate) / 100
}

fn refund_policy_check(status: ServiceStatus) -> Result<(), DomainError> {
    match status {
        ServiceStatus::Refunded => Err(DomainError::policy("this transaction has already been refunded")),
        ServiceStatus::Cancelled => Err(DomainError::policy("this transaction has been cancelled")),
        ServiceStatus::Delivered | ServiceStatus::RevisionRequested | ServiceStatus::Completed => {
            Err(DomainError::policy("cannot refund after delivery"))
        }
        status if refund_rate(status) == 0 => Err(DomainError::policy(format!(
            "nothing has been paid yet ({status}); cancel the transaction instead"
        ))),
        _ => Ok(()),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CustomerRef {
    Member(Uuid),
    Guest { email: String, name: String },
}

#[derive(Debug, Clone)]
pub struct GuestAccess {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl GuestAccess {
    pub fn issue(now: DateTime<Utc>, ttl: Duration) -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self {
            token: hex::encode(bytes),
            expires_at: now + ttl,
        }
    }
}

/// Human-readable transaction code, e.g. `SV240601-K3P9QZ`.
pub fn generate_code(now: DateTime<Utc>) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(|b| char::from(b).to_ascii_uppercase())
        .collect();
    format!("SV{}-{}", now.format("%y%m%d"), suffix)
}

#[derive(Debug, Clone)]
pub struct NewInquiry {
    pub service_id: Uuid,
    pub customer: CustomerRef,
    pub message: String,
    pub requested_deadline: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct ServiceTransaction {
    pub id: Uuid,
    pub code: String,
    pub service_id: Uuid,
    pub creator_id: Uuid,
    pub customer: CustomerRef,
    pub status: ServiceStatus,
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

impl ServiceTransaction {
    /// Which audience `actor` belongs to for this transaction, if any.
    /// Guest tokens are checked against their expiry here, at lookup time.
    pub fn role_of(&self, actor: &Actor, now: DateTime<Utc>) -> Option<ParticipantRole> {
        match actor {
            Actor::Admin(_) => Some(ParticipantRole::Admin),
            Actor::Creator(id) if *id == self.creator_id => Some(ParticipantRole::Creator),
            Actor::Member(id) if self.customer == CustomerRef::Member(*id) => {
                Some(ParticipantRole::Customer)
            }
            Actor::Guest(token) => {
                let valid = self.guest_token.as_deref() == Some(token.as_str())
                    && self.guest_token_expires_at.is_some_and(|exp| exp > now);
                valid.then_some(ParticipantRole::Customer)
            }
            _ => None,
        }
    }

    pub fn authorize(
        &self,
        actor: &Actor,
        action: ServiceAction,
        now: DateTime<Utc>,
    ) -> Result<ParticipantRole, DomainError> {
        let role = self
            .role_of(actor, now)
            .ok_or_else(|| DomainError::forbidden("you are not a participant of this transaction"))?;
        if !action.permitted_roles().contains(&role) {
            return Err(DomainError::forbidden(format!(
                "a {role} cannot {}",
                action.label()
            )));
        }
        Ok(role)
    }

    pub fn customer_member_id(&self) -> Option<Uuid> {
        match &self.customer {
            CustomerRef::Member(id) => Some(*id),
            CustomerRef::Guest { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedRefund {
    pub amount: i64,
    pub refund_id: String,
}

/// A validated lifecycle step, persisted atomically and only if the
/// transaction is still in `from`.
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub from: ServiceStatus,
    pub to: ServiceStatus,
    pub at: DateTime<Utc>,
    pub total_amount: Option<i64>,
    pub deadline: Option<DateTime<Utc>>,
    pub checkout_session_id: Option<String>,
    pub payment_reference: Option<String>,
    pub refund: Option<AppliedRefund>,
    pub cancel_reason: Option<String>,
    pub quote_update: Option<(Uuid, QuoteStatus)>,
    pub message: Option<NewMessage>,
}

impl StatusChange {
    pub fn new(from: ServiceStatus, to: ServiceStatus, at: DateTime<Utc>) -> Self {
        Self {
            from,
            to,
            at,
            total_amount: None,
            deadline: None,
            checkout_session_id: None,
            payment_reference: None,
            refund: None,
            cancel_reason: None,
            quote_update: None,
            message: None,
        }
    }

    pub fn with_message(mut self, message: NewMessage) -> Self {
        self.message = Some(message);
        self
    }

    pub fn with_quote_status(mut self, quote_id: Uuid, status: QuoteStatus) -> Self {
        self.quote_update = Some((quote_id, status));
        self
    }
}

/// A refund that passed the policy check and may be sent to the gateway.
#[derive(Debug, Clone)]
pub struct ServiceRefundPlan {
    pub transaction_id: Uuid,
    pub from: ServiceStatus,
    pub payment_reference: String,
    pub rate: u8,
    pub amount: i64,
}

impl ServiceRefundPlan {
    pub fn for_transaction(
        tx: &ServiceTransaction,
        requested: Option<i64>,
    ) -> Result<Self, DomainError> {
        tx.status.next(ServiceAction::Refund)?;
        let payment_reference = tx
            .payment_reference
            .clone()
            .filter(|r| !r.is_empty())
            .ok_or_else(|| DomainError::policy("no payment has been recorded for this transaction"))?;

        let rate = refund_rate(tx.status);
        let cap = refundable_amount(tx.total_amount.unwrap_or(0), rate);
        let amount = requested.unwrap_or(cap);
        if amount <= 0 {
            return Err(DomainError::invalid("refund amount must be positive"));
        }
        if amount > cap {
            return Err(DomainError::policy(format!(
                "refund amount {amount} exceeds the {rate}% allowed at this stage ({cap})"
            )));
        }

        Ok(Self {
            transaction_id: tx.id,
            from: tx.status,
            payment_reference,
            rate,
            amount,
        })
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn transaction(status: ServiceStatus) -> ServiceTransaction {
        let now = Utc::now();
        ServiceTransaction {
            id: Uuid::new_v4(),
            code: generate_code(now),
            service_id: Uuid::new_v4(),
            creator_id: Uuid::new_v4(),
            customer: CustomerRef::Member(Uuid::new_v4()),
            status,
            total_amount: Some(20000),
            deadline: None,
            checkout_session_id: None,
            payment_reference: Some("pi_service".to_string()),
            refund_amount: None,
            external_refund_id: None,
            cancel_reason: None,
            guest_token: None,
            guest_token_expires_at: None,
            paid_at: None,
            delivered_at: None,
            completed_at: None,
            cancelled_at: None,
            refunded_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}
