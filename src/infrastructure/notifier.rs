use crate::domain::notification::{Notification, NotifyError};
use crate::domain::ports::Notifier;
use crate::domain::service::CustomerRef;

/// Writes every notification to the log. Stands in for the mail and
/// receipt-archive transports, which live outside this service.
pub struct LogNotifier {
    admin_email: String,
}

impl LogNotifier {
    pub fn new(admin_email: impl Into<String>) -> Self {
        Self {
            admin_email: admin_email.into(),
        }
    }
}

fn customer_label(customer: &CustomerRef) -> String {
    match customer {
        CustomerRef::Member(id) => format!("member {id}"),
        CustomerRef::Guest { email, .. } => email.clone(),
    }
}

impl Notifier for LogNotifier {
    fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        match notification {
            Notification::OrderConfirmed {
                order_id,
                member_id,
                total,
            } => log::info!("mail: order {order_id} confirmed for member {member_id} (total {total})"),
            Notification::AdminOrderAlert { order_id, total } => log::info!(
                "mail to {}: new paid order {order_id} (total {total})",
                self.admin_email
            ),
            Notification::ReceiptArchive {
                order_id,
                lines,
                shipping_fee,
                total,
                ..
            } => log::info!(
                "archive: receipt for order {order_id}, {} line(s), shipping {shipping_fee}, total {total}",
                lines.len()
            ),
            Notification::OrderPaymentFailed { order_id, member_id } => {
                log::info!("mail: payment failed for order {order_id} (member {member_id})")
            }
            Notification::OrderRefunded {
                order_id,
                amount_refunded,
                full,
                ..
            } => log::info!(
                "mail: order {order_id} {} refunded ({amount_refunded})",
                if *full { "fully" } else { "partially" }
            ),
            Notification::ServiceStatusChanged {
                code,
                status,
                customer,
                creator_id,
                ..
            } => log::info!(
                "mail: {code} is now {status} (customer {}, creator {creator_id})",
                customer_label(customer)
            ),
            Notification::ServiceRefunded {
                code,
                amount,
                customer,
                ..
            } => log::info!(
                "mail to {}: {code} refunded {amount}",
                customer_label(customer)
            ),
            Notification::ServiceMessagePosted {
                transaction_id,
                sender_role,
                audience,
            } => {
                if audience.is_empty() {
                    return Ok(());
                }
                let audience: Vec<&str> = audience.iter().map(|r| r.as_str()).collect();
                log::info!(
                    "mail: new {sender_role} message on {transaction_id} for {}",
                    audience.join(", ")
                )
            }
        }
        Ok(())
    }
}
