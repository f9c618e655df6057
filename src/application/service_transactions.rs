use chrono::{Duration, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::domain::actor::{Actor, ParticipantRole};
use crate::domain::errors::DomainError;
use crate::domain::message::NewMessage;
use crate::domain::notification::Notification;
use crate::domain::payment::{
    CheckoutLine, CheckoutRequest, CheckoutSession, Completion, PaymentSubject, RefundResult,
    SessionStatus,
};
use crate::domain::ports::{InquiryCreated, ServiceTransactionRepository};
use crate::domain::quote::{Quote, QuoteInput, QuoteStatus};
use crate::domain::service::{
    cancellation_policy, generate_code, refund_rate, refundable_amount, AppliedRefund,
    CancellationPolicy, CustomerRef, GuestAccess, NewInquiry, ServiceAction, ServiceRefundPlan,
    ServiceStatus, ServiceTransaction, StatusChange,
};

use super::checkout_service::CheckoutUrls;
use super::notifications::NotificationDispatcher;

#[derive(Debug, Clone)]
pub struct InquiryRequest {
    pub service_id: Uuid,
    pub message: String,
    pub requested_deadline: Option<chrono::DateTime<Utc>>,
    pub guest_email: Option<String>,
    pub guest_name: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, ToSchema)]
pub struct PolicyQuote {
    pub status: ServiceStatus,
    pub policy: CancellationPolicy,
    pub refundable_amount: i64,
}

/// Drives a bespoke-service request from inquiry to completion.
pub struct ServiceTransactionService<R> {
    repo: R,
    dispatcher: NotificationDispatcher,
    guest_token_ttl: Duration,
}

impl<R: ServiceTransactionRepository> ServiceTransactionService<R> {
    pub fn new(repo: R, dispatcher: NotificationDispatcher, guest_token_ttl: Duration) -> Self {
        Self {
            repo,
            dispatcher,
            guest_token_ttl,
        }
    }

    #[cfg(test)]
    pub(crate) fn repo(&self) -> &R {
        &self.repo
    }

    pub fn submit_inquiry(
        &self,
        actor: Option<&Actor>,
        request: InquiryRequest,
    ) -> Result<InquiryCreated, DomainError> {
        if request.message.trim().is_empty() {
            return Err(DomainError::invalid("please describe what you would like to order"));
        }
        let now = Utc::now();
        let customer = match actor {
            Some(Actor::Member(id)) => CustomerRef::Member(*id),
            Some(_) => {
                return Err(DomainError::forbidden(
                    "only customers can open a service request",
                ))
            }
            None => {
                let email = request
                    .guest_email
                    .filter(|e| e.contains('@'))
                    .ok_or_else(|| DomainError::invalid("a valid email address is required"))?;
                let name = request
                    .guest_name
                    .filter(|n| !n.trim().is_empty())
                    .ok_or_else(|| DomainError::invalid("your name is required"))?;
                CustomerRef::Guest { email, name }
            }
        };
        if matches!(request.requested_deadline, Some(d) if d <= now) {
            return Err(DomainError::invalid("the requested deadline is in the past"));
        }

        let guest_access = matches!(customer, CustomerRef::Guest { .. })
            .then(|| GuestAccess::issue(now, self.guest_token_ttl));
        let inquiry = NewInquiry {
            service_id: request.service_id,
            customer,
            message: request.message,
            requested_deadline: request.requested_deadline,
        };

        let transaction =
            self.repo
                .create_inquiry(&inquiry, &generate_code(now), guest_access.as_ref())?;
        log::info!(
            "service transaction {} opened for service {}",
            transaction.code,
            transaction.service_id
        );
        self.notify_status(&transaction);

        Ok(InquiryCreated {
            transaction,
            guest_access,
        })
    }

    pub fn view(
        &self,
        actor: &Actor,
        id: Uuid,
    ) -> Result<(ServiceTransaction, ParticipantRole), DomainError> {
        let tx = self.load(id)?;
        let role = tx
            .role_of(actor, Utc::now())
            .ok_or(DomainError::NotFound("Service transaction"))?;
        Ok((tx, role))
    }

    pub fn view_by_guest_token(&self, token: &str) -> Result<ServiceTransaction, DomainError> {
        self.repo
            .find_by_guest_token(token, Utc::now())?
            .ok_or(DomainError::NotFound("Service transaction"))
    }

    /// Inbox listing, most recently active first.
    pub fn list(&self, actor: &Actor, limit: i64) -> Result<Vec<ServiceTransaction>, DomainError> {
        let limit = limit.clamp(1, 100);
        match actor {
            Actor::Member(id) => {
                self.repo
                    .list_for_participant(ParticipantRole::Customer, Some(*id), limit)
            }
            Actor::Creator(id) => {
                self.repo
                    .list_for_participant(ParticipantRole::Creator, Some(*id), limit)
            }
            Actor::Admin(_) => self
                .repo
                .list_for_participant(ParticipantRole::Admin, None, limit),
            Actor::Guest(token) => Ok(self.view_by_guest_token(token).into_iter().collect()),
        }
    }

    pub fn save_quote_draft(
        &self,
        actor: &Actor,
        id: Uuid,
        input: QuoteInput,
    ) -> Result<Quote, DomainError> {
        self.add_quote(actor, id, input, ServiceAction::SaveQuoteDraft, QuoteStatus::Draft)
    }

    /// Stores a new quote version (max + 1); earlier versions stay untouched.
    pub fn send_quote(
        &self,
        actor: &Actor,
        id: Uuid,
        input: QuoteInput,
    ) -> Result<Quote, DomainError> {
        self.add_quote(actor, id, input, ServiceAction::SendQuote, QuoteStatus::Sent)
    }

    pub fn request_quote_revision(
        &self,
        actor: &Actor,
        id: Uuid,
        note: Option<String>,
    ) -> Result<ServiceTransaction, DomainError> {
        let quote = self.current_sent_quote(id)?;
        self.step(actor, id, ServiceAction::RequestQuoteRevision, |_, change| {
            let body = match note.as_deref().map(str::trim) {
                Some(n) if !n.is_empty() => {
                    format!("Revision of quote v{} requested: {}", quote.version, n)
                }
                _ => format!("Revision of quote v{} requested", quote.version),
            };
            Ok(change
                .with_quote_status(quote.id, QuoteStatus::Rejected)
                .with_message(NewMessage::system(body)))
        })
    }

    pub fn accept_quote(&self, actor: &Actor, id: Uuid) -> Result<ServiceTransaction, DomainError> {
        let quote = self.current_sent_quote(id)?;
        self.step(actor, id, ServiceAction::AcceptQuote, |_, mut change| {
            let at = change.at;
            change.total_amount = Some(quote.total);
            change.deadline = quote
                .estimated_delivery_days
                .map(|days| at + Duration::days(i64::from(days)));
            Ok(change
                .with_quote_status(quote.id, QuoteStatus::Accepted)
                .with_message(NewMessage::system(format!(
                    "Quote v{} accepted (total {})",
                    quote.version, quote.total
                ))))
        })
    }

    /// Validates that the customer may pay now and builds the gateway request.
    pub fn prepare_payment(
        &self,
        actor: &Actor,
        id: Uuid,
        currency: &str,
        urls: CheckoutUrls,
    ) -> Result<CheckoutRequest, DomainError> {
        let tx = self.load(id)?;
        tx.authorize(actor, ServiceAction::BeginPayment, Utc::now())?;
        tx.status.next(ServiceAction::BeginPayment)?;
        let total = tx
            .total_amount
            .filter(|t| *t > 0)
            .ok_or_else(|| DomainError::policy("the accepted quote has no payable amount"))?;

        Ok(CheckoutRequest {
            subject: PaymentSubject::ServiceTransaction(tx.id),
            lines: vec![CheckoutLine {
                name: format!("Service request {}", tx.code),
                unit_amount: total,
                quantity: 1,
            }],
            currency: currency.to_string(),
            success_url: urls.success_url,
            cancel_url: urls.cancel_url,
        })
    }

    pub fn record_checkout_session(
        &self,
        actor: &Actor,
        id: Uuid,
        session: &CheckoutSession,
    ) -> Result<ServiceTransaction, DomainError> {
        self.step(actor, id, ServiceAction::BeginPayment, |_, mut change| {
            change.checkout_session_id = Some(session.session_id.clone());
            Ok(change)
        })
    }

    /// Gateway-driven and idempotent: only the caller that moves the
    /// transaction out of `payment_pending` gets `Completed`.
    pub fn confirm_payment(
        &self,
        id: Uuid,
        payment_reference: &str,
    ) -> Result<Completion<ServiceTransaction>, DomainError> {
        let Some(tx) = self.repo.find(id)? else {
            log::warn!("payment confirmation for unknown service transaction {}", id);
            return Ok(Completion::NotFound);
        };
        if tx.status != ServiceStatus::PaymentPending {
            return Ok(Completion::AlreadyCompleted);
        }

        let mut change = StatusChange::new(tx.status, ServiceStatus::Paid, Utc::now())
            .with_message(NewMessage::system("Payment received"));
        change.payment_reference = Some(payment_reference.to_string());

        match self.repo.apply(id, &change)? {
            Some(updated) => {
                log::info!("service transaction {} paid ({})", updated.code, payment_reference);
                self.notify_status(&updated);
                Ok(Completion::Completed(updated))
            }
            None => Ok(Completion::AlreadyCompleted),
        }
    }

    /// A declined payment keeps the transaction in `payment_pending` so the
    /// customer can retry; the thread records what happened.
    pub fn record_payment_failure(
        &self,
        id: Uuid,
        reason: Option<&str>,
    ) -> Result<bool, DomainError> {
        let Some(tx) = self.repo.find(id)? else {
            return Ok(false);
        };
        if tx.status != ServiceStatus::PaymentPending {
            return Ok(false);
        }
        let body = match reason {
            Some(r) => format!("Payment failed: {r}"),
            None => "Payment failed".to_string(),
        };
        let change = StatusChange::new(tx.status, tx.status, Utc::now())
            .with_message(NewMessage::system(body));
        let applied = self.repo.apply(id, &change)?.is_some();
        if applied {
            log::info!("service transaction {} payment failed", tx.code);
        }
        Ok(applied)
    }

    pub fn transaction_for_payment_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Uuid>, DomainError> {
        self.repo.find_id_by_payment_reference(reference)
    }

    pub fn confirm_from_redirect(
        &self,
        id: Uuid,
        session: &SessionStatus,
    ) -> Result<Option<Completion<ServiceTransaction>>, DomainError> {
        if session.subject != Some(PaymentSubject::ServiceTransaction(id)) {
            return Err(DomainError::forbidden(
                "checkout session does not belong to this transaction",
            ));
        }
        let tx = self.load(id)?;
        if tx.checkout_session_id.as_deref() != Some(session.session_id.as_str()) {
            return Err(DomainError::forbidden(
                "checkout session does not belong to this transaction",
            ));
        }
        if !session.paid {
            return Ok(None);
        }
        let reference = session
            .payment_intent
            .as_deref()
            .unwrap_or(session.session_id.as_str());
        self.confirm_payment(id, reference).map(Some)
    }

    pub fn start_production(
        &self,
        actor: &Actor,
        id: Uuid,
    ) -> Result<ServiceTransaction, DomainError> {
        self.step(actor, id, ServiceAction::StartProduction, |_, change| {
            Ok(change.with_message(NewMessage::system("Production started")))
        })
    }

    pub fn deliver(
        &self,
        actor: &Actor,
        id: Uuid,
        note: Option<String>,
    ) -> Result<ServiceTransaction, DomainError> {
        self.step(actor, id, ServiceAction::Deliver, |_, change| {
            let body = match note.as_deref().map(str::trim) {
                Some(n) if !n.is_empty() => format!("Delivered: {n}"),
                _ => "Delivered".to_string(),
            };
            Ok(change.with_message(NewMessage::system(body)))
        })
    }

    pub fn request_revision(
        &self,
        actor: &Actor,
        id: Uuid,
        note: String,
    ) -> Result<ServiceTransaction, DomainError> {
        if note.trim().is_empty() {
            return Err(DomainError::invalid("please describe the revision you need"));
        }
        self.step(actor, id, ServiceAction::RequestRevision, |_, change| {
            Ok(change.with_message(NewMessage::system(format!(
                "Revision requested: {}",
                note.trim()
            ))))
        })
    }

    pub fn complete(&self, actor: &Actor, id: Uuid) -> Result<ServiceTransaction, DomainError> {
        self.step(actor, id, ServiceAction::Complete, |_, change| {
            Ok(change.with_message(NewMessage::system("Marked as completed")))
        })
    }

    /// Pure status change; only valid before any money has moved.
    pub fn cancel(
        &self,
        actor: &Actor,
        id: Uuid,
        reason: Option<String>,
    ) -> Result<ServiceTransaction, DomainError> {
        let reason = reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| "no reason given".to_string());
        self.step(actor, id, ServiceAction::Cancel, |_, mut change| {
            change.cancel_reason = Some(reason.clone());
            Ok(change.with_message(NewMessage::system(format!(
                "Cancelled by {}: {}",
                actor.label(),
                reason
            ))))
        })
    }

    pub fn cancellation_policy(&self, actor: &Actor, id: Uuid) -> Result<PolicyQuote, DomainError> {
        let (tx, _) = self.view(actor, id)?;
        Ok(PolicyQuote {
            status: tx.status,
            policy: cancellation_policy(tx.status),
            refundable_amount: refundable_amount(
                tx.total_amount.unwrap_or(0),
                refund_rate(tx.status),
            ),
        })
    }

    /// First half of a refund: policy check before the gateway is called.
    pub fn plan_refund(
        &self,
        actor: &Actor,
        id: Uuid,
        amount: Option<i64>,
    ) -> Result<ServiceRefundPlan, DomainError> {
        let tx = self.load(id)?;
        tx.authorize(actor, ServiceAction::Refund, Utc::now())?;
        ServiceRefundPlan::for_transaction(&tx, amount)
    }

    /// Second half: records the refund the gateway has already issued.
    pub fn apply_refund(
        &self,
        actor: &Actor,
        plan: &ServiceRefundPlan,
        result: &RefundResult,
        reason: Option<String>,
    ) -> Result<ServiceTransaction, DomainError> {
        let mut change = StatusChange::new(plan.from, ServiceStatus::Refunded, Utc::now());
        change.refund = Some(AppliedRefund {
            amount: result.amount,
            refund_id: result.refund_id.clone(),
        });
        change.cancel_reason = reason.clone();
        let reason = reason.unwrap_or_else(|| "no reason given".to_string());
        change.message = Some(NewMessage::system(format!(
            "Refunded {} ({}% policy) by {}: {}",
            result.amount,
            plan.rate,
            actor.label(),
            reason
        )));

        let updated = self
            .repo
            .apply(plan.transaction_id, &change)?
            .ok_or_else(|| {
                log::error!(
                    "refund {} issued but transaction {} left '{}' concurrently",
                    result.refund_id,
                    plan.transaction_id,
                    plan.from
                );
                conflict()
            })?;

        log::info!(
            "service transaction {} refunded {} ({})",
            updated.code,
            result.amount,
            result.refund_id
        );
        self.dispatcher.dispatch(&[
            status_notification(&updated),
            Notification::ServiceRefunded {
                transaction_id: updated.id,
                code: updated.code.clone(),
                amount: result.amount,
                customer: updated.customer.clone(),
            },
        ]);
        Ok(updated)
    }

    pub fn list_quotes(&self, actor: &Actor, id: Uuid) -> Result<Vec<Quote>, DomainError> {
        let (_, role) = self.view(actor, id)?;
        let quotes = self.repo.list_quotes(id)?;
        Ok(hide_drafts(quotes, role))
    }

    pub fn current_quote(&self, actor: &Actor, id: Uuid) -> Result<Quote, DomainError> {
        let (_, role) = self.view(actor, id)?;
        self.repo
            .current_quote(id)?
            .filter(|q| role != ParticipantRole::Customer || q.status != QuoteStatus::Draft)
            .ok_or(DomainError::NotFound("Quote"))
    }

    fn add_quote(
        &self,
        actor: &Actor,
        id: Uuid,
        input: QuoteInput,
        action: ServiceAction,
        status: QuoteStatus,
    ) -> Result<Quote, DomainError> {
        let priced = input.price()?;
        let now = Utc::now();
        let tx = self.load(id)?;
        tx.authorize(actor, action, now)?;
        let to = tx.status.next(action)?;

        let mut change = StatusChange::new(tx.status, to, now);
        if status == QuoteStatus::Sent {
            change.message = Some(NewMessage::system(format!(
                "New quote sent (total {})",
                priced.total
            )));
        }

        let quote = self
            .repo
            .add_quote(id, &priced, status, &change)?
            .ok_or_else(conflict)?;
        log::info!(
            "service transaction {} quote v{} saved as {}",
            tx.code,
            quote.version,
            quote.status
        );
        if to != tx.status {
            if let Some(updated) = self.repo.find(id)? {
                self.notify_status(&updated);
            }
        }
        Ok(quote)
    }

    fn current_sent_quote(&self, id: Uuid) -> Result<Quote, DomainError> {
        self.repo
            .current_quote(id)?
            .filter(|q| q.status == QuoteStatus::Sent)
            .ok_or_else(|| DomainError::policy("there is no open quote to respond to"))
    }

    fn step<F>(
        &self,
        actor: &Actor,
        id: Uuid,
        action: ServiceAction,
        customize: F,
    ) -> Result<ServiceTransaction, DomainError>
    where
        F: FnOnce(&ServiceTransaction, StatusChange) -> Result<StatusChange, DomainError>,
    {
        let now = Utc::now();
        let tx = self.load(id)?;
        tx.authorize(actor, action, now)?;
        let to = tx.status.next(action)?;
        let change = customize(&tx, StatusChange::new(tx.status, to, now))?;

        let updated = self.repo.apply(id, &change)?.ok_or_else(conflict)?;
        log::info!(
            "service transaction {} {} -> {} by {}",
            updated.code,
            tx.status,
            updated.status,
            actor.label()
        );
        self.notify_status(&updated);
        Ok(updated)
    }

    fn load(&self, id: Uuid) -> Result<ServiceTransaction, DomainError> {
        self.repo
            .find(id)?
            .ok_or(DomainError::NotFound("Service transaction"))
    }

    fn notify_status(&self, tx: &ServiceTransaction) {
        self.dispatcher.dispatch(&[status_notification(tx)]);
    }
}

fn status_notification(tx: &ServiceTransaction) -> Notification {
    Notification::ServiceStatusChanged {
        transaction_id: tx.id,
        code: tx.code.clone(),
        status: tx.status,
        customer: tx.customer.clone(),
        creator_id: tx.creator_id,
    }
}

fn hide_drafts(quotes: Vec<Quote>, role: ParticipantRole) -> Vec<Quote> {
    if role != ParticipantRole::Customer {
        return quotes;
    }
    quotes
        .into_iter()
        .filter(|q| q.status != QuoteStatus::Draft)
        .collect()
}

fn conflict() -> DomainError {
    DomainError::policy("the transaction changed in the meantime; reload and try again")
}

#[cfg(test)]
pub(crate) mod fakes {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use chrono::DateTime;

    use super::*;
    use crate::domain::quote::NewQuote;
    use crate::domain::service::fixtures::transaction;

    /// Keeps transactions and quotes in memory with the same status gate as
    /// the database repository.
    #[derive(Default)]
    pub struct MemoryRepo {
        pub txs: Mutex<HashMap<Uuid, ServiceTransaction>>,
        pub quotes: Mutex<Vec<Quote>>,
        pub messages: Mutex<Vec<(Uuid, String)>>,
    }

    impl MemoryRepo {
        pub fn insert(&self, tx: ServiceTransaction) {
            self.txs.lock().unwrap().insert(tx.id, tx);
        }
    }

    impl ServiceTransactionRepository for MemoryRepo {
        fn create_inquiry(
            &self,
            inquiry: &NewInquiry,
            code: &str,
            guest_access: Option<&GuestAccess>,
        ) -> Result<ServiceTransaction, DomainError> {
            let mut tx = transaction(ServiceStatus::Inquiry);
            tx.code = code.to_string();
            tx.service_id = inquiry.service_id;
            tx.customer = inquiry.customer.clone();
            tx.payment_reference = None;
            tx.total_amount = None;
            tx.guest_token = guest_access.map(|g| g.token.clone());
            tx.guest_token_expires_at = guest_access.map(|g| g.expires_at);
            self.insert(tx.clone());
            Ok(tx)
        }

        fn find(&self, id: Uuid) -> Result<Option<ServiceTransaction>, DomainError> {
            Ok(self.txs.lock().unwrap().get(&id).cloned())
        }

        fn find_by_guest_token(
            &self,
            token: &str,
            now: DateTime<Utc>,
        ) -> Result<Option<ServiceTransaction>, DomainError> {
            Ok(self
                .txs
                .lock()
                .unwrap()
                .values()
                .find(|t| {
                    t.guest_token.as_deref() == Some(token)
                        && t.guest_token_expires_at.is_some_and(|e| e > now)
                })
                .cloned())
        }

        fn find_id_by_payment_reference(&self, _: &str) -> Result<Option<Uuid>, DomainError> {
            Ok(None)
        }

        fn list_for_participant(
            &self,
            _: ParticipantRole,
            _: Option<Uuid>,
            _: i64,
        ) -> Result<Vec<ServiceTransaction>, DomainError> {
            Ok(self.txs.lock().unwrap().values().cloned().collect())
        }

        fn apply(
            &self,
            id: Uuid,
            change: &StatusChange,
        ) -> Result<Option<ServiceTransaction>, DomainError> {
            let mut txs = self.txs.lock().unwrap();
            let Some(tx) = txs.get_mut(&id).filter(|t| t.status == change.from) else {
                return Ok(None);
            };
            tx.status = change.to;
            if let Some(total) = change.total_amount {
                tx.total_amount = Some(total);
            }
            if let Some(reference) = &change.payment_reference {
                tx.payment_reference = Some(reference.clone());
            }
            if let Some(session) = &change.checkout_session_id {
                tx.checkout_session_id = Some(session.clone());
            }
            if let Some(refund) = &change.refund {
                tx.refund_amount = Some(refund.amount);
                tx.external_refund_id = Some(refund.refund_id.clone());
            }
            if let Some((quote_id, status)) = change.quote_update {
                for q in self.quotes.lock().unwrap().iter_mut() {
                    if q.id == quote_id {
                        q.status = status;
                    }
                }
            }
            if let Some(message) = &change.message {
                self.messages.lock().unwrap().push((id, message.body.clone()));
            }
            Ok(Some(tx.clone()))
        }

        fn add_quote(
            &self,
            id: Uuid,
            quote: &NewQuote,
            status: QuoteStatus,
            change: &StatusChange,
        ) -> Result<Option<Quote>, DomainError> {
            if self.apply(id, change)?.is_none() {
                return Ok(None);
            }
            let mut quotes = self.quotes.lock().unwrap();
            let version = quotes
                .iter()
                .filter(|q| q.transaction_id == id)
                .map(|q| q.version)
                .max()
                .unwrap_or(0)
                + 1;
            let stored = Quote {
                id: Uuid::new_v4(),
                transaction_id: id,
                version,
                items: quote.items.clone(),
                subtotal: quote.subtotal,
                tax: quote.tax,
                total: quote.total,
                estimated_delivery_days: quote.estimated_delivery_days,
                note: quote.note.clone(),
                status,
                created_at: Utc::now(),
            };
            quotes.push(stored.clone());
            Ok(Some(stored))
        }

        fn list_quotes(&self, id: Uuid) -> Result<Vec<Quote>, DomainError> {
            Ok(self
                .quotes
                .lock()
                .unwrap()
                .iter()
                .filter(|q| q.transaction_id == id)
                .cloned()
                .collect())
        }

        fn current_quote(&self, id: Uuid) -> Result<Option<Quote>, DomainError> {
            Ok(self.list_quotes(id)?.into_iter().max_by_key(|q| q.version))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::fakes::MemoryRepo;
    use super::*;
    use crate::application::notifications::fakes::RecordingNotifier;
    use crate::domain::quote::QuoteItem;
    use crate::domain::service::fixtures::transaction;

    fn service(repo: MemoryRepo) -> ServiceTransactionService<MemoryRepo> {
        ServiceTransactionService::new(
            repo,
            NotificationDispatcher::new(Arc::new(RecordingNotifier::default())),
            Duration::days(7),
        )
    }

    fn quote_input(amount: i64) -> QuoteInput {
        QuoteInput {
            items: vec![QuoteItem {
                description: "Portrait commission".to_string(),
                unit_amount: amount,
                quantity: 1,
            }],
            tax: 0,
            estimated_delivery_days: Some(10),
            note: None,
        }
    }

    fn refund_result(amount: i64) -> RefundResult {
        RefundResult {
            refund_id: "re_1".to_string(),
            amount,
            status: "succeeded".to_string(),
        }
    }

    #[test]
    fn lifecycle_from_inquiry_to_completion() {
        let customer = Uuid::new_v4();
        let svc = service(MemoryRepo::default());
        let created = svc
            .submit_inquiry(
                Some(&Actor::Member(customer)),
                InquiryRequest {
                    service_id: Uuid::new_v4(),
                    message: "Could you draw my cat?".to_string(),
                    requested_deadline: None,
                    guest_email: None,
                    guest_name: None,
                },
            )
            .unwrap();
        let id = created.transaction.id;
        let creator = Actor::Creator(created.transaction.creator_id);
        let buyer = Actor::Member(customer);
        assert!(created.guest_access.is_none());

        let v1 = svc.send_quote(&creator, id, quote_input(20000)).unwrap();
        svc.request_quote_revision(&buyer, id, Some("too expensive".into()))
            .unwrap();
        let v2 = svc.send_quote(&creator, id, quote_input(15000)).unwrap();
        assert_eq!((v1.version, v2.version), (1, 2));

        let accepted = svc.accept_quote(&buyer, id).unwrap();
        assert_eq!(accepted.status, ServiceStatus::QuoteAccepted);
        assert_eq!(accepted.total_amount, Some(15000));

        let session = CheckoutSession {
            session_id: "cs_svc".to_string(),
            redirect_url: "https://pay.test/cs_svc".to_string(),
        };
        svc.record_checkout_session(&buyer, id, &session).unwrap();
        assert!(matches!(
            svc.confirm_payment(id, "pi_svc").unwrap(),
            Completion::Completed(_)
        ));
        assert!(matches!(
            svc.confirm_payment(id, "pi_svc").unwrap(),
            Completion::AlreadyCompleted
        ));

        svc.start_production(&creator, id).unwrap();
        svc.deliver(&creator, id, None).unwrap();
        let done = svc.complete(&buyer, id).unwrap();
        assert_eq!(done.status, ServiceStatus::Completed);

        let quotes = svc.list_quotes(&buyer, id).unwrap();
        assert_eq!(quotes.len(), 2);
        assert_eq!(quotes[0].status, QuoteStatus::Rejected);
        assert_eq!(quotes[0].total, 20000);
        assert_eq!(quotes[1].status, QuoteStatus::Accepted);
    }

    #[test]
    fn guests_receive_a_token_and_must_give_an_email() {
        let svc = service(MemoryRepo::default());
        let request = InquiryRequest {
            service_id: Uuid::new_v4(),
            message: "Logo please".to_string(),
            requested_deadline: None,
            guest_email: Some("guest@example.com".to_string()),
            guest_name: Some("Guest".to_string()),
        };
        let created = svc.submit_inquiry(None, request.clone()).unwrap();
        let token = created.guest_access.expect("token").token;

        let found = svc.view_by_guest_token(&token).unwrap();
        assert_eq!(found.id, created.transaction.id);
        assert!(svc.view(&Actor::Guest(token), found.id).is_ok());

        let missing_email = InquiryRequest {
            guest_email: None,
            ..request
        };
        assert!(svc.submit_inquiry(None, missing_email).is_err());
    }

    #[test]
    fn cancel_records_actor_and_reason() {
        let repo = MemoryRepo::default();
        let tx = transaction(ServiceStatus::QuoteSent);
        let id = tx.id;
        let admin = Actor::Admin(Uuid::new_v4());
        repo.insert(tx);
        let svc = service(repo);

        let cancelled = svc.cancel(&admin, id, Some("duplicate request".into())).unwrap();
        assert_eq!(cancelled.status, ServiceStatus::Cancelled);
        assert_eq!(cancelled.cancel_reason.as_deref(), Some("duplicate request"));
        let messages = svc.repo.messages.lock().unwrap();
        assert!(messages[0].1.contains("admin"));
        assert!(messages[0].1.contains("duplicate request"));
    }

    #[test]
    fn cancel_after_delivery_surfaces_policy_message() {
        let repo = MemoryRepo::default();
        let tx = transaction(ServiceStatus::Delivered);
        let id = tx.id;
        let customer = Actor::Member(tx.customer_member_id().unwrap());
        repo.insert(tx);
        let svc = service(repo);

        let err = svc.cancel(&customer, id, None).unwrap_err();
        assert!(matches!(err, DomainError::PolicyViolation(_)));
    }

    #[test]
    fn refund_in_progress_applies_half_rate() {
        let repo = MemoryRepo::default();
        let tx = transaction(ServiceStatus::InProgress);
        let id = tx.id;
        let creator = Actor::Creator(tx.creator_id);
        repo.insert(tx);
        let svc = service(repo);

        let policy = svc.cancellation_policy(&creator, id).unwrap();
        assert_eq!(policy.refundable_amount, 10000);

        let plan = svc.plan_refund(&creator, id, None).unwrap();
        assert_eq!(plan.amount, 10000);
        let refunded = svc
            .apply_refund(&creator, &plan, &refund_result(plan.amount), None)
            .unwrap();
        assert_eq!(refunded.status, ServiceStatus::Refunded);
        assert_eq!(refunded.refund_amount, Some(10000));
        assert_eq!(refunded.external_refund_id.as_deref(), Some("re_1"));

        assert!(svc.plan_refund(&creator, id, None).is_err());
    }

    #[test]
    fn refund_rejected_once_delivered() {
        let repo = MemoryRepo::default();
        let tx = transaction(ServiceStatus::Delivered);
        let id = tx.id;
        let admin = Actor::Admin(Uuid::new_v4());
        repo.insert(tx);
        let svc = service(repo);

        let err = svc.plan_refund(&admin, id, None).unwrap_err();
        assert_eq!(err.to_string(), "cannot refund after delivery");
    }

    #[test]
    fn strangers_cannot_see_or_act() {
        let repo = MemoryRepo::default();
        let tx = transaction(ServiceStatus::QuoteSent);
        let id = tx.id;
        repo.insert(tx);
        let svc = service(repo);
        let stranger = Actor::Member(Uuid::new_v4());

        assert!(matches!(
            svc.view(&stranger, id),
            Err(DomainError::NotFound(_))
        ));
        assert!(matches!(
            svc.cancel(&stranger, id, None),
            Err(DomainError::Forbidden(_))
        ));
    }

    #[test]
    fn customers_do_not_see_quote_drafts() {
        let repo = MemoryRepo::default();
        let tx = transaction(ServiceStatus::Inquiry);
        let id = tx.id;
        let creator = Actor::Creator(tx.creator_id);
        let customer = Actor::Member(tx.customer_member_id().unwrap());
        repo.insert(tx);
        let svc = service(repo);

        svc.save_quote_draft(&creator, id, quote_input(9000)).unwrap();
        assert!(svc.list_quotes(&customer, id).unwrap().is_empty());
        assert_eq!(svc.list_quotes(&creator, id).unwrap().len(), 1);
        assert!(svc.current_quote(&customer, id).is_err());
        assert!(svc.accept_quote(&customer, id).is_err());
    }
}
