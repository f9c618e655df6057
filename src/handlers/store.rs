use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::application::cart_service::CartSummary;
use crate::application::checkout_service::{checkout_request, CheckoutUrls};
use crate::domain::order::{ProductType, ShippingAddress};
use crate::domain::payment::Completion;
use crate::domain::ports::BookshelfRepository;
use crate::errors::AppError;
use crate::state::AppState;

use super::actor::Caller;
use super::blocking;
use super::orders::OrderResponse;

// ── Request / response DTOs ──────────────────────────────────────────────────

#[derive(Debug, Serialize, ToSchema)]
pub struct CartLineResponse {
    pub product_id: Uuid,
    pub name: String,
    pub product_type: ProductType,
    pub unit_price: i64,
    pub quantity: i32,
    pub subtotal: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CartResponse {
    pub lines: Vec<CartLineResponse>,
    pub subtotal: i64,
}

impl From<CartSummary> for CartResponse {
    fn from(summary: CartSummary) -> Self {
        Self {
            lines: summary
                .lines
                .iter()
                .map(|line| CartLineResponse {
                    product_id: line.product.id,
                    name: line.product.name.clone(),
                    product_type: line.product.product_type,
                    unit_price: line.product.price,
                    quantity: line.quantity,
                    subtotal: line.subtotal(),
                })
                .collect(),
            subtotal: summary.subtotal,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SetQuantityRequest {
    pub quantity: i32,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckoutBody {
    /// Required when the cart holds physical items.
    pub shipping: Option<ShippingAddress>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CheckoutResponse {
    pub order_id: Uuid,
    pub session_id: String,
    pub redirect_url: String,
    pub total: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CompleteParams {
    pub order_id: Uuid,
    pub session_id: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CompletionResponse {
    /// `completed`, `already_completed`, `not_found` or `pending`.
    pub status: String,
    pub order_id: Uuid,
    pub order: Option<OrderResponse>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BookshelfItemResponse {
    pub product_id: Uuid,
    pub product_name: String,
    pub order_id: Uuid,
    pub granted_at: DateTime<Utc>,
}

// ── Cart ─────────────────────────────────────────────────────────────────────

/// GET /store/cart
#[utoipa::path(
    get,
    path = "/store/cart",
    responses(
        (status = 200, description = "Current cart", body = CartResponse),
        (status = 403, description = "Not a member"),
    ),
    tag = "store"
)]
pub async fn get_cart(
    state: web::Data<AppState>,
    caller: Caller,
) -> Result<HttpResponse, AppError> {
    let member_id = caller.0.require_member()?;

    let summary = blocking(move || state.cart().summary(member_id)).await?;

    Ok(HttpResponse::Ok().json(CartResponse::from(summary)))
}

/// PUT /store/cart/items/{product_id}
///
/// Sets the quantity of one product. Stock is checked, not reserved.
#[utoipa::path(
    put,
    path = "/store/cart/items/{product_id}",
    params(
        ("product_id" = Uuid, Path, description = "Product UUID"),
    ),
    request_body = SetQuantityRequest,
    responses(
        (status = 200, description = "Updated cart", body = CartResponse),
        (status = 404, description = "Product not found"),
        (status = 422, description = "Out of stock or already owned"),
    ),
    tag = "store"
)]
pub async fn set_cart_item(
    state: web::Data<AppState>,
    caller: Caller,
    path: web::Path<Uuid>,
    body: web::Json<SetQuantityRequest>,
) -> Result<HttpResponse, AppError> {
    let member_id = caller.0.require_member()?;
    let product_id = path.into_inner();
    let quantity = body.into_inner().quantity;

    let summary =
        blocking(move || state.cart().set_quantity(member_id, product_id, quantity)).await?;

    Ok(HttpResponse::Ok().json(CartResponse::from(summary)))
}

/// DELETE /store/cart/items/{product_id}
#[utoipa::path(
    delete,
    path = "/store/cart/items/{product_id}",
    params(
        ("product_id" = Uuid, Path, description = "Product UUID"),
    ),
    responses(
        (status = 200, description = "Updated cart", body = CartResponse),
        (status = 404, description = "Not in cart"),
    ),
    tag = "store"
)]
pub async fn remove_cart_item(
    state: web::Data<AppState>,
    caller: Caller,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let member_id = caller.0.require_member()?;
    let product_id = path.into_inner();

    let summary = blocking(move || state.cart().remove(member_id, product_id)).await?;

    Ok(HttpResponse::Ok().json(CartResponse::from(summary)))
}

// ── Checkout ─────────────────────────────────────────────────────────────────

/// POST /store/checkout
///
/// Prices the cart, opens a gateway session and only then writes the
/// pending order. A gateway failure leaves nothing behind.
#[utoipa::path(
    post,
    path = "/store/checkout",
    request_body = CheckoutBody,
    responses(
        (status = 201, description = "Checkout session created", body = CheckoutResponse),
        (status = 422, description = "Cart cannot be checked out"),
        (status = 502, description = "Payment gateway error"),
    ),
    tag = "store"
)]
pub async fn checkout(
    state: web::Data<AppState>,
    caller: Caller,
    body: web::Json<CheckoutBody>,
) -> Result<HttpResponse, AppError> {
    let member_id = caller.0.require_member()?;
    let shipping = body.into_inner().shipping;

    let draft = {
        let state = state.clone();
        blocking(move || state.checkout().prepare(member_id, shipping)).await?
    };

    let urls = CheckoutUrls {
        success_url: state.settings.order_success_url(draft.id),
        cancel_url: state.settings.order_cancel_url(),
    };
    let request = checkout_request(&draft, &state.settings.currency, urls);
    let session = state.gateway.create_checkout_session(&request).await?;
    let redirect_url = session.redirect_url.clone();
    let session_id = session.session_id.clone();

    let order = blocking(move || state.checkout().place(&draft, &session)).await?;

    Ok(HttpResponse::Created().json(CheckoutResponse {
        order_id: order.id,
        session_id,
        redirect_url,
        total: order.total,
    }))
}

/// GET /store/complete.php
///
/// Browser success redirect. Runs the same idempotent completion as the
/// webhook, after asking the gateway whether the session is really paid.
#[utoipa::path(
    get,
    path = "/store/complete.php",
    params(
        ("order_id" = Uuid, Query, description = "Order UUID"),
        ("session_id" = String, Query, description = "Checkout session id"),
    ),
    responses(
        (status = 200, description = "Completion outcome", body = CompletionResponse),
        (status = 403, description = "Session does not belong to the order"),
        (status = 404, description = "Order not found"),
    ),
    tag = "store"
)]
pub async fn complete(
    state: web::Data<AppState>,
    query: web::Query<CompleteParams>,
) -> Result<HttpResponse, AppError> {
    let CompleteParams {
        order_id,
        session_id,
    } = query.into_inner();

    let session = match state.gateway.retrieve_checkout_session(&session_id).await {
        Ok(session) => session,
        Err(e) => {
            // not confirmed yet; the webhook will finish the order
            log::warn!("could not confirm session {} for order {}: {}", session_id, order_id, e);
            return Ok(HttpResponse::Ok().json(CompletionResponse {
                status: "pending".to_string(),
                order_id,
                order: None,
            }));
        }
    };

    let outcome =
        blocking(move || state.reconciler().complete_from_redirect(order_id, &session)).await?;

    let response = match outcome {
        None => CompletionResponse {
            status: "pending".to_string(),
            order_id,
            order: None,
        },
        Some(completion) => CompletionResponse {
            status: completion.label().to_string(),
            order_id,
            order: match completion {
                Completion::Completed(order) => Some(OrderResponse::from(order)),
                _ => None,
            },
        },
    };
    Ok(HttpResponse::Ok().json(response))
}

// ── Bookshelf ────────────────────────────────────────────────────────────────

/// GET /store/bookshelf
#[utoipa::path(
    get,
    path = "/store/bookshelf",
    responses(
        (status = 200, description = "Digital products owned by the member", body = [BookshelfItemResponse]),
        (status = 403, description = "Not a member"),
    ),
    tag = "store"
)]
pub async fn bookshelf(
    state: web::Data<AppState>,
    caller: Caller,
) -> Result<HttpResponse, AppError> {
    let member_id = caller.0.require_member()?;

    let items = blocking(move || state.bookshelf().list(member_id)).await?;

    let items: Vec<BookshelfItemResponse> = items
        .into_iter()
        .map(|item| BookshelfItemResponse {
            product_id: item.product_id,
            product_name: item.product_name,
            order_id: item.order_id,
            granted_at: item.granted_at,
        })
        .collect();
    Ok(HttpResponse::Ok().json(items))
}
