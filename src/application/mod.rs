pub mod cart_service;
pub mod checkout_service;
pub mod messaging;
pub mod notifications;
pub mod order_reconciler;
pub mod order_service;
pub mod service_transactions;
pub mod webhook_processor;
