use utoipa::OpenApi;

use super::{messages, orders, services, store, webhook};

#[derive(OpenApi)]
#[openapi(
    info(title = "Storefront engine", description = "Orders, payments and bespoke service transactions"),
    paths(
        store::get_cart,
        store::set_cart_item,
        store::remove_cart_item,
        store::checkout,
        store::complete,
        store::bookshelf,
        webhook::receive,
        orders::list_orders,
        orders::get_order,
        orders::advance_order,
        orders::refund_order,
        services::submit_inquiry,
        services::list_transactions,
        services::get_transaction,
        services::get_by_guest_token,
        services::list_quotes,
        services::current_quote,
        services::send_quote,
        services::save_quote_draft,
        services::accept_quote,
        services::request_quote_revision,
        services::begin_payment,
        services::payment_complete,
        services::start_production,
        services::deliver,
        services::request_revision,
        services::complete,
        services::cancellation_policy,
        services::cancel,
        services::refund,
        messages::list_messages,
        messages::post_message,
        messages::mark_read,
        messages::unread_count,
    ),
    tags(
        (name = "store", description = "Cart, checkout and bookshelf"),
        (name = "orders", description = "Member order history"),
        (name = "admin", description = "Order fulfilment and refunds"),
        (name = "services", description = "Bespoke service transactions"),
        (name = "messages", description = "Per-transaction message threads"),
    )
)]
pub struct ApiDoc;
