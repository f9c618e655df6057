use std::sync::Arc;

use crate::application::cart_service::CartService;
use crate::application::checkout_service::CheckoutService;
use crate::application::messaging::MessagingService;
use crate::application::notifications::NotificationDispatcher;
use crate::application::order_reconciler::OrderReconciler;
use crate::application::order_service::OrderService;
use crate::application::service_transactions::ServiceTransactionService;
use crate::application::webhook_processor::WebhookProcessor;
use crate::config::Settings;
use crate::db::DbPool;
use crate::domain::ports::{Notifier, PaymentGateway};
use crate::infrastructure::bookshelf::DieselBookshelfRepository;
use crate::infrastructure::cart_repo::DieselCartRepository;
use crate::infrastructure::message_repo::DieselMessageRepository;
use crate::infrastructure::order_repo::DieselOrderLedger;
use crate::infrastructure::service_repo::DieselServiceTransactionRepository;
use crate::infrastructure::webhook_events::DieselWebhookEventLog;

/// Shared by every worker. Services are assembled per request from the
/// pool; they hold no state of their own.
#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub settings: Arc<Settings>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub notifier: Arc<dyn Notifier>,
}

pub type Transactions = ServiceTransactionService<DieselServiceTransactionRepository>;

impl AppState {
    pub fn dispatcher(&self) -> NotificationDispatcher {
        NotificationDispatcher::new(self.notifier.clone())
    }

    pub fn cart(&self) -> CartService<DieselCartRepository, DieselBookshelfRepository> {
        CartService::new(
            DieselCartRepository::new(self.pool.clone()),
            DieselBookshelfRepository::new(self.pool.clone()),
        )
    }

    pub fn bookshelf(&self) -> DieselBookshelfRepository {
        DieselBookshelfRepository::new(self.pool.clone())
    }

    pub fn checkout(&self) -> CheckoutService<DieselCartRepository, DieselOrderLedger> {
        CheckoutService::new(
            DieselCartRepository::new(self.pool.clone()),
            DieselOrderLedger::new(self.pool.clone()),
            self.settings.shipping,
        )
    }

    pub fn orders(&self) -> OrderService<DieselOrderLedger> {
        OrderService::new(DieselOrderLedger::new(self.pool.clone()))
    }

    pub fn reconciler(&self) -> OrderReconciler<DieselOrderLedger> {
        OrderReconciler::new(DieselOrderLedger::new(self.pool.clone()), self.dispatcher())
    }

    pub fn transactions(&self) -> Transactions {
        ServiceTransactionService::new(
            DieselServiceTransactionRepository::new(self.pool.clone()),
            self.dispatcher(),
            self.settings.guest_token_ttl,
        )
    }

    pub fn messaging(
        &self,
    ) -> MessagingService<DieselServiceTransactionRepository, DieselMessageRepository> {
        MessagingService::new(
            DieselServiceTransactionRepository::new(self.pool.clone()),
            DieselMessageRepository::new(self.pool.clone()),
            self.dispatcher(),
        )
    }

    pub fn webhooks(
        &self,
    ) -> WebhookProcessor<DieselOrderLedger, DieselServiceTransactionRepository, DieselWebhookEventLog>
    {
        WebhookProcessor::new(
            self.reconciler(),
            self.transactions(),
            DieselWebhookEventLog::new(self.pool.clone()),
        )
    }
}
