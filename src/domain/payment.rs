use thiserror::Error;
use uuid::Uuid;

/// What a checkout session pays for. Carried in session metadata so the
/// webhook can route the confirmation back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentSubject {
    Order(Uuid),
    ServiceTransaction(Uuid),
}

impl PaymentSubject {
    pub const ORDER_KIND: &'static str = "order";
    pub const SERVICE_KIND: &'static str = "service";

    pub fn kind(&self) -> &'static str {
        match self {
            PaymentSubject::Order(_) => Self::ORDER_KIND,
            PaymentSubject::ServiceTransaction(_) => Self::SERVICE_KIND,
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            PaymentSubject::Order(id) | PaymentSubject::ServiceTransaction(id) => *id,
        }
    }

    /// Rebuilds the subject from metadata values. A missing kind means an
    /// order, matching sessions created before service payments existed.
    pub fn from_metadata(kind: Option<&str>, id: Option<&str>) -> Option<Self> {
        let id = Uuid::parse_str(id?).ok()?;
        match kind.unwrap_or(Self::ORDER_KIND) {
            Self::ORDER_KIND => Some(PaymentSubject::Order(id)),
            Self::SERVICE_KIND => Some(PaymentSubject::ServiceTransaction(id)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CheckoutLine {
    pub name: String,
    pub unit_amount: i64,
    pub quantity: i32,
}

#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub subject: PaymentSubject,
    pub lines: Vec<CheckoutLine>,
    pub currency: String,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSession {
    pub session_id: String,
    pub redirect_url: String,
}

/// A checkout session as the gateway currently sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    pub session_id: String,
    pub paid: bool,
    pub payment_intent: Option<String>,
    pub subject: Option<PaymentSubject>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundResult {
    pub refund_id: String,
    pub amount: i64,
    pub status: String,
}

/// Outcome of an idempotent completion step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion<T> {
    Completed(T),
    AlreadyCompleted,
    NotFound,
}

impl<T> Completion<T> {
    pub fn label(&self) -> &'static str {
        match self {
            Completion::Completed(_) => "completed",
            Completion::AlreadyCompleted => "already_completed",
            Completion::NotFound => "not_found",
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Completion<U> {
        match self {
            Completion::Completed(v) => Completion::Completed(f(v)),
            Completion::AlreadyCompleted => Completion::AlreadyCompleted,
            Completion::NotFound => Completion::NotFound,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookEvent {
    pub id: String,
    pub event_type: String,
    pub kind: WebhookEventKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEventKind {
    CheckoutSessionCompleted {
        session_id: String,
        payment_intent: Option<String>,
        paid: bool,
        subject: Option<PaymentSubject>,
    },
    PaymentIntentSucceeded {
        payment_intent: String,
        subject: Option<PaymentSubject>,
    },
    PaymentIntentFailed {
        payment_intent: String,
        subject: Option<PaymentSubject>,
        reason: Option<String>,
    },
    ChargeRefunded {
        payment_intent: Option<String>,
        amount: i64,
        amount_refunded: i64,
        refund_id: Option<String>,
    },
    Ignored,
}

/// Rejections at the webhook boundary. The display string is returned to
/// the gateway verbatim with a 400.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("Missing signature header")]
    MissingHeader,
    #[error("Invalid signature header")]
    MalformedHeader,
    #[error("Webhook signature mismatch")]
    Mismatch,
    #[error("Webhook timestamp outside tolerance")]
    Expired,
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("payment gateway unreachable: {0}")]
    Network(String),
    #[error("payment gateway timed out")]
    Timeout,
    #[error("card declined: {0}")]
    Card(String),
    #[error("payment gateway misconfigured: {0}")]
    Configuration(String),
    #[error("payment gateway rejected the request: {0}")]
    Rejected(String),
}

impl GatewayError {
    /// Message safe to show a buyer. Raw processor payloads stay in the logs.
    pub fn user_message(&self) -> &'static str {
        match self {
            GatewayError::Network(_) | GatewayError::Timeout => {
                "We could not reach the payment service. Please try again in a moment."
            }
            GatewayError::Card(_) => {
                "Your card was declined. Please check the details or use another card."
            }
            GatewayError::Configuration(_) => {
                "Payments are temporarily unavailable. Please contact support."
            }
            GatewayError::Rejected(_) => {
                "The payment could not be processed. Please try again."
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_round_trips_through_metadata_values() {
        let id = Uuid::new_v4();
        let subject = PaymentSubject::ServiceTransaction(id);
        let rebuilt =
            PaymentSubject::from_metadata(Some(subject.kind()), Some(&id.to_string()));
        assert_eq!(rebuilt, Some(subject));
    }

    #[test]
    fn metadata_without_kind_is_an_order() {
        let id = Uuid::new_v4();
        assert_eq!(
            PaymentSubject::from_metadata(None, Some(&id.to_string())),
            Some(PaymentSubject::Order(id))
        );
        assert_eq!(PaymentSubject::from_metadata(Some("order"), Some("nope")), None);
        assert_eq!(PaymentSubject::from_metadata(Some("gift"), Some(&id.to_string())), None);
    }

    #[test]
    fn user_messages_hide_processor_details() {
        let err = GatewayError::Card("insufficient_funds: raw payload".into());
        assert!(!err.user_message().contains("insufficient_funds"));
        assert_eq!(
            GatewayError::Timeout.user_message(),
            GatewayError::Network("dns".into()).user_message()
        );
    }
}
