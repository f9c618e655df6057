use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::domain::order::{
    OrderItemView, OrderStatus, OrderView, PaymentStatus, ProductType, ShippingAddress,
};
use crate::errors::AppError;
use crate::state::AppState;

use super::actor::Caller;
use super::blocking;

// ── Request / response DTOs ──────────────────────────────────────────────────

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderItemResponse {
    pub id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub product_type: ProductType,
    pub unit_price: i64,
    pub quantity: i32,
    pub subtotal: i64,
}

impl From<OrderItemView> for OrderItemResponse {
    fn from(item: OrderItemView) -> Self {
        Self {
            id: item.id,
            product_id: item.product_id,
            product_name: item.product_name,
            product_type: item.product_type,
            unit_price: item.unit_price,
            quantity: item.quantity,
            subtotal: item.subtotal,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderResponse {
    pub id: Uuid,
    pub member_id: Uuid,
    pub subtotal: i64,
    pub shipping_fee: i64,
    pub total: i64,
    pub payment_status: PaymentStatus,
    pub order_status: OrderStatus,
    pub refund_amount: i64,
    pub tracking_number: Option<String>,
    pub shipping: Option<ShippingAddress>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub items: Vec<OrderItemResponse>,
}

impl From<OrderView> for OrderResponse {
    fn from(order: OrderView) -> Self {
        Self {
            id: order.id,
            member_id: order.member_id,
            subtotal: order.subtotal,
            shipping_fee: order.shipping_fee,
            total: order.total,
            payment_status: order.payment_status,
            order_status: order.order_status,
            refund_amount: order.refund_amount,
            tracking_number: order.tracking_number,
            shipping: order.shipping,
            paid_at: order.paid_at,
            created_at: order.created_at,
            items: order.items.into_iter().map(OrderItemResponse::from).collect(),
        }
    }
}

// ── Pagination ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, ToSchema)]
pub struct ListOrdersParams {
    /// Page number (1-based). Defaults to 1.
    #[serde(default = "default_page")]
    pub page: i64,
    /// Number of items per page. Defaults to 20, maximum 100.
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_page() -> i64 {
    1
}

fn default_limit() -> i64 {
    20
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ListOrdersResponse {
    pub items: Vec<OrderResponse>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AdvanceOrderRequest {
    pub status: OrderStatus,
    pub tracking_number: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RefundOrderRequest {
    /// Defaults to everything not yet refunded.
    pub amount: Option<i64>,
}

// ── Handlers ─────────────────────────────────────────────────────────────────

/// GET /store/orders
///
/// The calling member's orders, newest first.
#[utoipa::path(
    get,
    path = "/store/orders",
    params(
        ("page" = Option<i64>, Query, description = "Page number (1-based, default 1)"),
        ("limit" = Option<i64>, Query, description = "Items per page (default 20, max 100)"),
    ),
    responses(
        (status = 200, description = "Paginated list of orders", body = ListOrdersResponse),
        (status = 403, description = "Not a member"),
    ),
    tag = "orders"
)]
pub async fn list_orders(
    state: web::Data<AppState>,
    caller: Caller,
    query: web::Query<ListOrdersParams>,
) -> Result<HttpResponse, AppError> {
    let member_id = caller.0.require_member()?;
    let params = query.into_inner();
    let page = params.page.max(1);
    let limit = params.limit.clamp(1, 100);

    let result = blocking(move || state.orders().list_orders(member_id, page, limit)).await?;

    Ok(HttpResponse::Ok().json(ListOrdersResponse {
        items: result.items.into_iter().map(OrderResponse::from).collect(),
        total: result.total,
        page,
        limit,
    }))
}

/// GET /store/orders/{id}
#[utoipa::path(
    get,
    path = "/store/orders/{id}",
    params(
        ("id" = Uuid, Path, description = "Order UUID"),
    ),
    responses(
        (status = 200, description = "Order found", body = OrderResponse),
        (status = 404, description = "Order not found"),
    ),
    tag = "orders"
)]
pub async fn get_order(
    state: web::Data<AppState>,
    caller: Caller,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let order_id = path.into_inner();

    let order = blocking(move || state.orders().get_order(&caller.0, order_id)).await?;

    Ok(HttpResponse::Ok().json(OrderResponse::from(order)))
}

/// POST /admin/orders/{id}/status
///
/// Fulfilment steps (confirmed → processing → shipped → completed) and
/// cancellation of unpaid orders.
#[utoipa::path(
    post,
    path = "/admin/orders/{id}/status",
    params(
        ("id" = Uuid, Path, description = "Order UUID"),
    ),
    request_body = AdvanceOrderRequest,
    responses(
        (status = 200, description = "Order updated", body = OrderResponse),
        (status = 403, description = "Not an administrator"),
        (status = 422, description = "Transition not allowed"),
    ),
    tag = "admin"
)]
pub async fn advance_order(
    state: web::Data<AppState>,
    caller: Caller,
    path: web::Path<Uuid>,
    body: web::Json<AdvanceOrderRequest>,
) -> Result<HttpResponse, AppError> {
    caller.0.require_admin()?;
    let order_id = path.into_inner();
    let body = body.into_inner();

    let order = blocking(move || {
        state
            .orders()
            .advance_status(order_id, body.status, body.tracking_number.as_deref())
    })
    .await?;

    Ok(HttpResponse::Ok().json(OrderResponse::from(order)))
}

/// POST /admin/orders/{id}/refund
///
/// Issues the refund at the gateway, then records it. The charge.refunded
/// webhook that follows is absorbed by the monotonic refund record.
#[utoipa::path(
    post,
    path = "/admin/orders/{id}/refund",
    params(
        ("id" = Uuid, Path, description = "Order UUID"),
    ),
    request_body = RefundOrderRequest,
    responses(
        (status = 200, description = "Refund recorded", body = OrderResponse),
        (status = 422, description = "Refund not allowed"),
        (status = 502, description = "Payment gateway error"),
    ),
    tag = "admin"
)]
pub async fn refund_order(
    state: web::Data<AppState>,
    caller: Caller,
    path: web::Path<Uuid>,
    body: web::Json<RefundOrderRequest>,
) -> Result<HttpResponse, AppError> {
    caller.0.require_admin()?;
    let order_id = path.into_inner();
    let amount = body.into_inner().amount;

    let plan = {
        let state = state.clone();
        blocking(move || state.orders().plan_refund(order_id, amount)).await?
    };
    let refund = state
        .gateway
        .refund(&plan.payment_reference, Some(plan.amount))
        .await?;
    log::info!(
        "refund {} issued for order {} ({})",
        refund.refund_id,
        order_id,
        refund.amount
    );

    let record = plan.record(refund.refund_id);
    let order = blocking(move || {
        state.reconciler().apply_refund(order_id, &record)?;
        state.orders().get_order(&caller.0, order_id)
    })
    .await?;

    Ok(HttpResponse::Ok().json(OrderResponse::from(order)))
}
