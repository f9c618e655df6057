use chrono::Utc;
use uuid::Uuid;

use crate::domain::errors::DomainError;
use crate::domain::notification::Notification;
use crate::domain::order::{OrderView, RefundRecord};
use crate::domain::payment::{Completion, PaymentSubject, SessionStatus};
use crate::domain::ports::OrderLedger;

use super::notifications::NotificationDispatcher;

/// Finalises paid orders. Both the browser redirect and the webhook land
/// here; the ledger's pending gate guarantees one winner.
pub struct OrderReconciler<L> {
    ledger: L,
    dispatcher: NotificationDispatcher,
}

impl<L: OrderLedger> OrderReconciler<L> {
    pub fn new(ledger: L, dispatcher: NotificationDispatcher) -> Self {
        Self { ledger, dispatcher }
    }

    pub fn complete_order(
        &self,
        order_id: Uuid,
        payment_reference: &str,
    ) -> Result<Completion<OrderView>, DomainError> {
        let completion = self
            .ledger
            .complete_order(order_id, payment_reference, Utc::now())?;

        match &completion {
            Completion::Completed(order) => {
                log::info!(
                    "order {} paid ({}), {} item(s) finalised",
                    order.id,
                    payment_reference,
                    order.items.len()
                );
                self.dispatcher.dispatch(&confirmation_notifications(order));
            }
            Completion::AlreadyCompleted => {
                log::info!("order {} already finalised, nothing to do", order_id);
            }
            Completion::NotFound => {
                log::warn!("completion requested for unknown order {}", order_id);
            }
        }
        Ok(completion)
    }

    /// Success-redirect path. The session is re-read from the gateway, so a
    /// forged query string cannot mark an order paid. `None` means the
    /// gateway has not confirmed payment yet.
    pub fn complete_from_redirect(
        &self,
        order_id: Uuid,
        session: &SessionStatus,
    ) -> Result<Option<Completion<OrderView>>, DomainError> {
        if session.subject != Some(PaymentSubject::Order(order_id)) {
            return Err(DomainError::forbidden(
                "checkout session does not belong to this order",
            ));
        }
        let order = self
            .ledger
            .find_by_id(order_id)?
            .ok_or(DomainError::NotFound("Order"))?;
        if order.checkout_session_id.as_deref() != Some(session.session_id.as_str()) {
            return Err(DomainError::forbidden(
                "checkout session does not belong to this order",
            ));
        }
        if !session.paid {
            return Ok(None);
        }

        let reference = session
            .payment_intent
            .as_deref()
            .unwrap_or(session.session_id.as_str());
        self.complete_order(order_id, reference).map(Some)
    }

    #[cfg(test)]
    pub(crate) fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn order_for_payment_intent(&self, payment_intent: &str) -> Result<Option<Uuid>, DomainError> {
        self.ledger.find_id_by_payment_intent(payment_intent)
    }

    pub fn fail_payment(
        &self,
        order_id: Uuid,
        reason: Option<&str>,
    ) -> Result<bool, DomainError> {
        match self.ledger.mark_payment_failed(order_id, reason)? {
            Some(order) => {
                log::info!("order {} payment failed: {}", order.id, reason.unwrap_or("-"));
                self.dispatcher.dispatch(&[Notification::OrderPaymentFailed {
                    order_id: order.id,
                    member_id: order.member_id,
                }]);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn apply_refund(
        &self,
        order_id: Uuid,
        refund: &RefundRecord,
    ) -> Result<Option<OrderView>, DomainError> {
        let updated = self.ledger.record_refund(order_id, refund)?;
        if let Some(order) = &updated {
            log::info!(
                "order {} refunded {} of {} ({})",
                order.id,
                order.refund_amount,
                order.total,
                order.payment_status
            );
            self.dispatcher.dispatch(&[Notification::OrderRefunded {
                order_id: order.id,
                member_id: order.member_id,
                amount_refunded: order.refund_amount,
                full: refund.amount_refunded >= refund.charge_amount,
            }]);
        }
        Ok(updated)
    }
}

fn confirmation_notifications(order: &OrderView) -> Vec<Notification> {
    vec![
        Notification::OrderConfirmed {
            order_id: order.id,
            member_id: order.member_id,
            total: order.total,
        },
        Notification::AdminOrderAlert {
            order_id: order.id,
            total: order.total,
        },
        Notification::ReceiptArchive {
            order_id: order.id,
            member_id: order.member_id,
            lines: order
                .items
                .iter()
                .map(|i| (i.product_name.clone(), i.quantity, i.subtotal))
                .collect(),
            shipping_fee: order.shipping_fee,
            total: order.total,
        },
    ]
}

#[cfg(test)]
pub(crate) mod fakes {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use chrono::{DateTime, Utc};

    use super::*;
    use crate::domain::order::{
        ListResult, OrderDraft, OrderStatus, PaymentStatus,
    };
    use crate::domain::payment::CheckoutSession;

    /// In-memory ledger honouring the same pending gate as the database.
    #[derive(Default)]
    pub struct MemoryLedger {
        pub orders: Mutex<HashMap<Uuid, OrderView>>,
        pub completions: Mutex<u32>,
    }

    impl MemoryLedger {
        pub fn with(order: OrderView) -> Self {
            let ledger = Self::default();
            ledger.orders.lock().unwrap().insert(order.id, order);
            ledger
        }

        pub fn get(&self, id: Uuid) -> OrderView {
            self.orders.lock().unwrap()[&id].clone()
        }
    }

    impl OrderLedger for MemoryLedger {
        fn place_order(
            &self,
            _draft: &OrderDraft,
            _session: &CheckoutSession,
        ) -> Result<OrderView, DomainError> {
            unimplemented!("not used by reconciler tests")
        }

        fn find_by_id(&self, id: Uuid) -> Result<Option<OrderView>, DomainError> {
            Ok(self.orders.lock().unwrap().get(&id).cloned())
        }

        fn find_id_by_payment_intent(&self, reference: &str) -> Result<Option<Uuid>, DomainError> {
            Ok(self
                .orders
                .lock()
                .unwrap()
                .values()
                .find(|o| o.payment_intent_id.as_deref() == Some(reference))
                .map(|o| o.id))
        }

        fn list_for_member(&self, _: Uuid, _: i64, _: i64) -> Result<ListResult, DomainError> {
            unimplemented!("not used by reconciler tests")
        }

        fn complete_order(
            &self,
            order_id: Uuid,
            payment_reference: &str,
            paid_at: DateTime<Utc>,
        ) -> Result<Completion<OrderView>, DomainError> {
            let mut orders = self.orders.lock().unwrap();
            let Some(order) = orders.get_mut(&order_id) else {
                return Ok(Completion::NotFound);
            };
            if order.payment_status != PaymentStatus::Pending {
                return Ok(Completion::AlreadyCompleted);
            }
            order.payment_status = PaymentStatus::Paid;
            order.order_status = OrderStatus::Confirmed;
            order.payment_intent_id = Some(payment_reference.to_string());
            order.paid_at = Some(paid_at);
            *self.completions.lock().unwrap() += 1;
            Ok(Completion::Completed(order.clone()))
        }

        fn mark_payment_failed(
            &self,
            order_id: Uuid,
            reason: Option<&str>,
        ) -> Result<Option<OrderView>, DomainError> {
            let mut orders = self.orders.lock().unwrap();
            match orders.get_mut(&order_id) {
                Some(o) if o.payment_status == PaymentStatus::Pending => {
                    o.payment_status = PaymentStatus::Failed;
                    o.failure_reason = reason.map(str::to_string);
                    Ok(Some(o.clone()))
                }
                _ => Ok(None),
            }
        }

        fn record_refund(
            &self,
            order_id: Uuid,
            refund: &RefundRecord,
        ) -> Result<Option<OrderView>, DomainError> {
            let mut orders = self.orders.lock().unwrap();
            match orders.get_mut(&order_id) {
                Some(o) if refund.amount_refunded > o.refund_amount => {
                    o.refund_amount = refund.amount_refunded;
                    o.payment_status = refund.payment_status();
                    o.order_status = OrderStatus::Refunded;
                    Ok(Some(o.clone()))
                }
                _ => Ok(None),
            }
        }

        fn advance_status(
            &self,
            order_id: Uuid,
            from: OrderStatus,
            to: OrderStatus,
            _tracking_number: Option<&str>,
        ) -> Result<bool, DomainError> {
            let mut orders = self.orders.lock().unwrap();
            match orders.get_mut(&order_id) {
                Some(o) if o.order_status == from => {
                    o.order_status = to;
                    Ok(true)
                }
                _ => Ok(false),
            }
        }

        fn cancel_unpaid(&self, order_id: Uuid) -> Result<bool, DomainError> {
            let mut orders = self.orders.lock().unwrap();
            match orders.get_mut(&order_id) {
                Some(o) if o.payment_status == PaymentStatus::Pending => {
                    o.payment_status = PaymentStatus::Failed;
                    o.order_status = OrderStatus::Cancelled;
                    Ok(true)
                }
                _ => Ok(false),
            }
        }
    }
}
