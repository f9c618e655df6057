use thiserror::Error;
use uuid::Uuid;

use super::actor::ParticipantRole;
use super::message::SenderRole;
use super::service::{CustomerRef, ServiceStatus};

/// Side effects emitted after a transition has been committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    OrderConfirmed {
        order_id: Uuid,
        member_id: Uuid,
        total: i64,
    },
    AdminOrderAlert {
        order_id: Uuid,
        total: i64,
    },
    ReceiptArchive {
        order_id: Uuid,
        member_id: Uuid,
        lines: Vec<(String, i32, i64)>,
        shipping_fee: i64,
        total: i64,
    },
    OrderPaymentFailed {
        order_id: Uuid,
        member_id: Uuid,
    },
    OrderRefunded {
        order_id: Uuid,
        member_id: Uuid,
        amount_refunded: i64,
        full: bool,
    },
    ServiceStatusChanged {
        transaction_id: Uuid,
        code: String,
        status: ServiceStatus,
        customer: CustomerRef,
        creator_id: Uuid,
    },
    ServiceRefunded {
        transaction_id: Uuid,
        code: String,
        amount: i64,
        customer: CustomerRef,
    },
    ServiceMessagePosted {
        transaction_id: Uuid,
        sender_role: SenderRole,
        audience: Vec<ParticipantRole>,
    },
}

impl Notification {
    pub fn kind(&self) -> &'static str {
        match self {
            Notification::OrderConfirmed { .. } => "order_confirmed",
            Notification::AdminOrderAlert { .. } => "admin_order_alert",
            Notification::ReceiptArchive { .. } => "receipt_archive",
            Notification::OrderPaymentFailed { .. } => "order_payment_failed",
            Notification::OrderRefunded { .. } => "order_refunded",
            Notification::ServiceStatusChanged { .. } => "service_status_changed",
            Notification::ServiceRefunded { .. } => "service_refunded",
            Notification::ServiceMessagePosted { .. } => "service_message_posted",
        }
    }
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification transport failed: {0}")]
    Transport(String),
    #[error("notification rejected: {0}")]
    Rejected(String),
}
