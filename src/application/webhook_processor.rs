use crate::domain::errors::DomainError;
use crate::domain::order::RefundRecord;
use crate::domain::payment::{Completion, PaymentSubject, WebhookEvent, WebhookEventKind};
use crate::domain::ports::{OrderLedger, ServiceTransactionRepository, WebhookEventLog};

use super::order_reconciler::OrderReconciler;
use super::service_transactions::ServiceTransactionService;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// The event id was seen before; nothing was touched.
    Duplicate,
    Applied,
    /// Valid event that required no state change.
    Ignored,
}

/// Routes verified gateway events to the order or service ledger.
pub struct WebhookProcessor<L, R, E> {
    orders: OrderReconciler<L>,
    services: ServiceTransactionService<R>,
    events: E,
}

impl<L, R, E> WebhookProcessor<L, R, E>
where
    L: OrderLedger,
    R: ServiceTransactionRepository,
    E: WebhookEventLog,
{
    pub fn new(
        orders: OrderReconciler<L>,
        services: ServiceTransactionService<R>,
        events: E,
    ) -> Self {
        Self {
            orders,
            services,
            events,
        }
    }

    /// The event id is recorded before anything else. If handling fails the
    /// record is dropped again so the gateway's retry is not swallowed.
    pub fn process(&self, event: &WebhookEvent) -> Result<WebhookOutcome, DomainError> {
        if !self.events.record(&event.id, &event.event_type)? {
            log::info!("webhook event {} ({}) already processed", event.id, event.event_type);
            return Ok(WebhookOutcome::Duplicate);
        }

        match self.route(&event.kind) {
            Ok(outcome) => {
                log::info!(
                    "webhook event {} ({}) -> {:?}",
                    event.id,
                    event.event_type,
                    outcome
                );
                Ok(outcome)
            }
            Err(e) => {
                log::error!("webhook event {} failed: {}", event.id, e);
                if let Err(forget_err) = self.events.forget(&event.id) {
                    log::error!("could not release webhook event {}: {}", event.id, forget_err);
                }
                Err(e)
            }
        }
    }

    fn route(&self, kind: &WebhookEventKind) -> Result<WebhookOutcome, DomainError> {
        match kind {
            WebhookEventKind::CheckoutSessionCompleted {
                session_id,
                payment_intent,
                paid,
                subject,
            } => {
                if !paid {
                    // async payment methods settle later via payment_intent.succeeded
                    return Ok(WebhookOutcome::Ignored);
                }
                let reference = payment_intent.as_deref().unwrap_or(session_id.as_str());
                self.confirm(*subject, reference)
            }
            WebhookEventKind::PaymentIntentSucceeded {
                payment_intent,
                subject,
            } => {
                let subject = match subject {
                    Some(s) => Some(*s),
                    None => self.subject_for_reference(payment_intent)?,
                };
                self.confirm(subject, payment_intent)
            }
            WebhookEventKind::PaymentIntentFailed {
                payment_intent,
                subject,
                reason,
            } => {
                let applied = match subject {
                    Some(PaymentSubject::Order(id)) => {
                        self.orders.fail_payment(*id, reason.as_deref())?
                    }
                    Some(PaymentSubject::ServiceTransaction(id)) => self
                        .services
                        .record_payment_failure(*id, reason.as_deref())?,
                    None => {
                        log::warn!("payment failure for {} without metadata", payment_intent);
                        false
                    }
                };
                Ok(outcome(applied))
            }
            WebhookEventKind::ChargeRefunded {
                payment_intent,
                amount,
                amount_refunded,
                refund_id,
            } => {
                let Some(payment_intent) = payment_intent else {
                    return Ok(WebhookOutcome::Ignored);
                };
                let Some(order_id) = self.orders.order_for_payment_intent(payment_intent)? else {
                    // service refunds are recorded when they are issued
                    return Ok(WebhookOutcome::Ignored);
                };
                let record = RefundRecord {
                    amount_refunded: *amount_refunded,
                    charge_amount: *amount,
                    refund_id: refund_id.clone(),
                };
                Ok(outcome(self.orders.apply_refund(order_id, &record)?.is_some()))
            }
            WebhookEventKind::Ignored => Ok(WebhookOutcome::Ignored),
        }
    }

    fn confirm(
        &self,
        subject: Option<PaymentSubject>,
        reference: &str,
    ) -> Result<WebhookOutcome, DomainError> {
        let completed = match subject {
            Some(PaymentSubject::Order(id)) => {
                matches!(self.orders.complete_order(id, reference)?, Completion::Completed(_))
            }
            Some(PaymentSubject::ServiceTransaction(id)) => matches!(
                self.services.confirm_payment(id, reference)?,
                Completion::Completed(_)
            ),
            None => {
                log::warn!("payment {} carries no order or transaction reference", reference);
                false
            }
        };
        Ok(outcome(completed))
    }

    fn subject_for_reference(&self, reference: &str) -> Result<Option<PaymentSubject>, DomainError> {
        if let Some(id) = self.orders.order_for_payment_intent(reference)? {
            return Ok(Some(PaymentSubject::Order(id)));
        }
        Ok(self
            .services
            .transaction_for_payment_reference(reference)?
            .map(PaymentSubject::ServiceTransaction))
    }
}

fn outcome(applied: bool) -> WebhookOutcome {
    if applied {
        WebhookOutcome::Applied
    } else {
        WebhookOutcome::Ignored
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};

    use chrono::Duration;

    use super::*;
    use crate::application::notifications::fakes::RecordingNotifier;
    use crate::application::notifications::NotificationDispatcher;
    use crate::application::order_reconciler::fakes::MemoryLedger;
    use crate::application::service_transactions::fakes::MemoryRepo;
    use crate::domain::order::fixtures::paid_order;
    use crate::domain::order::{OrderStatus, OrderView, PaymentStatus};
    use crate::domain::service::fixtures::transaction;
    use crate::domain::service::ServiceStatus;

    #[derive(Default)]
    struct MemoryEventLog {
        seen: Mutex<HashSet<String>>,
    }

    impl WebhookEventLog for MemoryEventLog {
        fn record(&self, event_id: &str, _event_type: &str) -> Result<bool, DomainError> {
            Ok(self.seen.lock().unwrap().insert(event_id.to_string()))
        }

        fn forget(&self, event_id: &str) -> Result<(), DomainError> {
            self.seen.lock().unwrap().remove(event_id);
            Ok(())
        }
    }

    fn processor(
        ledger: MemoryLedger,
        repo: MemoryRepo,
    ) -> WebhookProcessor<MemoryLedger, MemoryRepo, MemoryEventLog> {
        let dispatcher = NotificationDispatcher::new(Arc::new(RecordingNotifier::default()));
        WebhookProcessor::new(
            OrderReconciler::new(ledger, dispatcher.clone()),
            ServiceTransactionService::new(repo, dispatcher, Duration::days(7)),
            MemoryEventLog::default(),
        )
    }

    fn pending_order(total: i64) -> OrderView {
        let mut order = paid_order(total);
        order.payment_status = PaymentStatus::Pending;
        order.order_status = OrderStatus::Pending;
        order.payment_intent_id = None;
        order.paid_at = None;
        order
    }

    fn event(id: &str, kind: WebhookEventKind) -> WebhookEvent {
        WebhookEvent {
            id: id.to_string(),
            event_type: "test.event".to_string(),
            kind,
        }
    }

    #[test]
    fn replayed_event_is_absorbed() {
        let order = pending_order(3500);
        let id = order.id;
        let processor = processor(MemoryLedger::with(order), MemoryRepo::default());
        let completed = event(
            "evt_1",
            WebhookEventKind::CheckoutSessionCompleted {
                session_id: "cs_test".to_string(),
                payment_intent: Some("pi_1".to_string()),
                paid: true,
                subject: Some(PaymentSubject::Order(id)),
            },
        );

        assert_eq!(processor.process(&completed).unwrap(), WebhookOutcome::Applied);
        assert_eq!(processor.process(&completed).unwrap(), WebhookOutcome::Duplicate);
        assert_eq!(*processor.orders_ledger().completions.lock().unwrap(), 1);
    }

    #[test]
    fn unpaid_session_waits_for_payment_intent() {
        let order = pending_order(3500);
        let id = order.id;
        let processor = processor(MemoryLedger::with(order), MemoryRepo::default());

        let unpaid = event(
            "evt_1",
            WebhookEventKind::CheckoutSessionCompleted {
                session_id: "cs_test".to_string(),
                payment_intent: None,
                paid: false,
                subject: Some(PaymentSubject::Order(id)),
            },
        );
        assert_eq!(processor.process(&unpaid).unwrap(), WebhookOutcome::Ignored);

        let succeeded = event(
            "evt_2",
            WebhookEventKind::PaymentIntentSucceeded {
                payment_intent: "pi_late".to_string(),
                subject: Some(PaymentSubject::Order(id)),
            },
        );
        assert_eq!(processor.process(&succeeded).unwrap(), WebhookOutcome::Applied);
        assert_eq!(
            processor.orders_ledger().get(id).payment_intent_id.as_deref(),
            Some("pi_late")
        );
    }

    #[test]
    fn service_payment_is_confirmed_once() {
        let repo = MemoryRepo::default();
        let tx = transaction(ServiceStatus::PaymentPending);
        let id = tx.id;
        repo.insert(tx);
        let processor = processor(MemoryLedger::default(), repo);

        let succeeded = |evt: &str| {
            event(
                evt,
                WebhookEventKind::PaymentIntentSucceeded {
                    payment_intent: "pi_svc".to_string(),
                    subject: Some(PaymentSubject::ServiceTransaction(id)),
                },
            )
        };
        assert_eq!(processor.process(&succeeded("evt_a")).unwrap(), WebhookOutcome::Applied);
        assert_eq!(processor.process(&succeeded("evt_b")).unwrap(), WebhookOutcome::Ignored);
    }

    #[test]
    fn failed_service_payment_keeps_status_and_leaves_a_note() {
        let repo = MemoryRepo::default();
        let tx = transaction(ServiceStatus::PaymentPending);
        let id = tx.id;
        repo.insert(tx);
        let processor = processor(MemoryLedger::default(), repo);

        let failed = event(
            "evt_f",
            WebhookEventKind::PaymentIntentFailed {
                payment_intent: "pi_svc".to_string(),
                subject: Some(PaymentSubject::ServiceTransaction(id)),
                reason: Some("card_declined".to_string()),
            },
        );
        assert_eq!(processor.process(&failed).unwrap(), WebhookOutcome::Applied);

        let repo = processor.services_repo();
        assert_eq!(
            repo.txs.lock().unwrap()[&id].status,
            ServiceStatus::PaymentPending
        );
        assert!(repo.messages.lock().unwrap()[0].1.contains("card_declined"));
    }

    #[test]
    fn partial_refund_event_updates_order() {
        let order = paid_order(10000);
        let id = order.id;
        let processor = processor(MemoryLedger::with(order), MemoryRepo::default());

        let refunded = event(
            "evt_r",
            WebhookEventKind::ChargeRefunded {
                payment_intent: Some("pi_test".to_string()),
                amount: 10000,
                amount_refunded: 4000,
                refund_id: Some("re_1".to_string()),
            },
        );
        assert_eq!(processor.process(&refunded).unwrap(), WebhookOutcome::Applied);

        let order = processor.orders_ledger().get(id);
        assert_eq!(order.payment_status, PaymentStatus::PartialRefund);
        assert_eq!(order.refund_amount, 4000);
    }

    impl WebhookProcessor<MemoryLedger, MemoryRepo, MemoryEventLog> {
        fn orders_ledger(&self) -> &MemoryLedger {
            self.orders.ledger()
        }

        fn services_repo(&self) -> &MemoryRepo {
            self.services.repo()
        }
    }
}
