use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::application::checkout_service::CheckoutUrls;
use crate::application::service_transactions::{InquiryRequest, PolicyQuote};
use crate::domain::actor::{Actor, ParticipantRole};
use crate::domain::quote::{Quote, QuoteInput, QuoteItem, QuoteStatus};
use crate::domain::service::{CustomerRef, ServiceStatus, ServiceTransaction};
use crate::errors::AppError;
use crate::state::AppState;

use super::actor::{Caller, MaybeCaller};
use super::blocking;

// ── Request / response DTOs ──────────────────────────────────────────────────

#[derive(Debug, Deserialize, ToSchema)]
pub struct InquiryBody {
    pub service_id: Uuid,
    pub message: String,
    pub requested_deadline: Option<DateTime<Utc>>,
    /// Required when no member is signed in.
    pub guest_email: Option<String>,
    pub guest_name: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TransactionResponse {
    pub id: Uuid,
    pub code: String,
    pub service_id: Uuid,
    pub creator_id: Uuid,
    pub customer_member_id: Option<Uuid>,
    pub guest_name: Option<String>,
    pub status: ServiceStatus,
    pub total_amount: Option<i64>,
    pub deadline: Option<DateTime<Utc>>,
    pub refund_amount: Option<i64>,
    pub cancel_reason: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// How the caller takes part in this transaction.
    pub role: Option<ParticipantRole>,
}

impl TransactionResponse {
    fn new(tx: ServiceTransaction, role: Option<ParticipantRole>) -> Self {
        let guest_name = match &tx.customer {
            CustomerRef::Guest { name, .. } => Some(name.clone()),
            CustomerRef::Member(_) => None,
        };
        Self {
            id: tx.id,
            customer_member_id: tx.customer_member_id(),
            code: tx.code,
            service_id: tx.service_id,
            creator_id: tx.creator_id,
            guest_name,
            status: tx.status,
            total_amount: tx.total_amount,
            deadline: tx.deadline,
            refund_amount: tx.refund_amount,
            cancel_reason: tx.cancel_reason,
            paid_at: tx.paid_at,
            delivered_at: tx.delivered_at,
            completed_at: tx.completed_at,
            cancelled_at: tx.cancelled_at,
            refunded_at: tx.refunded_at,
            created_at: tx.created_at,
            updated_at: tx.updated_at,
            role,
        }
    }

    fn for_actor(tx: ServiceTransaction, actor: &Actor) -> Self {
        let role = tx.role_of(actor, Utc::now());
        Self::new(tx, role)
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct InquiryResponse {
    pub transaction: TransactionResponse,
    /// Only for guests. Keep it: it is the only way back to the request.
    pub guest_token: Option<String>,
    pub guest_token_expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct QuoteResponse {
    pub id: Uuid,
    pub version: i32,
    pub items: Vec<QuoteItem>,
    pub subtotal: i64,
    pub tax: i64,
    pub total: i64,
    pub estimated_delivery_days: Option<i32>,
    pub note: Option<String>,
    pub status: QuoteStatus,
    pub created_at: DateTime<Utc>,
}

impl From<Quote> for QuoteResponse {
    fn from(q: Quote) -> Self {
        Self {
            id: q.id,
            version: q.version,
            items: q.items,
            subtotal: q.subtotal,
            tax: q.tax,
            total: q.total,
            estimated_delivery_days: q.estimated_delivery_days,
            note: q.note,
            status: q.status,
            created_at: q.created_at,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ListParams {
    /// Defaults to 20, maximum 100.
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    20
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct NoteBody {
    pub note: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct CancelBody {
    pub reason: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct RefundBody {
    /// Defaults to the full amount the policy allows at this stage.
    pub amount: Option<i64>,
    pub reason: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentResponse {
    pub session_id: String,
    pub redirect_url: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PaymentCompleteParams {
    pub transaction_id: Uuid,
    pub session_id: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentCompleteResponse {
    /// `completed`, `already_completed`, `not_found` or `pending`.
    pub status: String,
    pub transaction_id: Uuid,
}

// ── Lifecycle ────────────────────────────────────────────────────────────────

/// POST /services/inquiries
///
/// Opens a request as the signed-in member, or as a guest when no member
/// headers are sent.
#[utoipa::path(
    post,
    path = "/services/inquiries",
    request_body = InquiryBody,
    responses(
        (status = 201, description = "Inquiry opened", body = InquiryResponse),
        (status = 404, description = "Service not found"),
        (status = 422, description = "Invalid inquiry"),
    ),
    tag = "services"
)]
pub async fn submit_inquiry(
    state: web::Data<AppState>,
    caller: MaybeCaller,
    body: web::Json<InquiryBody>,
) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();
    // a guest token from an earlier request does not identify anyone here
    let actor = caller.0.filter(|a| !matches!(a, Actor::Guest(_)));
    let request = InquiryRequest {
        service_id: body.service_id,
        message: body.message,
        requested_deadline: body.requested_deadline,
        guest_email: body.guest_email,
        guest_name: body.guest_name,
    };

    let created =
        blocking(move || state.transactions().submit_inquiry(actor.as_ref(), request)).await?;

    let (guest_token, guest_token_expires_at) = match created.guest_access {
        Some(access) => (Some(access.token), Some(access.expires_at)),
        None => (None, None),
    };
    Ok(HttpResponse::Created().json(InquiryResponse {
        transaction: TransactionResponse::new(created.transaction, Some(ParticipantRole::Customer)),
        guest_token,
        guest_token_expires_at,
    }))
}

/// GET /services/transactions
#[utoipa::path(
    get,
    path = "/services/transactions",
    params(
        ("limit" = Option<i64>, Query, description = "Maximum number of transactions (default 20, max 100)"),
    ),
    responses(
        (status = 200, description = "Transactions, most recently active first", body = [TransactionResponse]),
    ),
    tag = "services"
)]
pub async fn list_transactions(
    state: web::Data<AppState>,
    caller: Caller,
    query: web::Query<ListParams>,
) -> Result<HttpResponse, AppError> {
    let limit = query.into_inner().limit;
    let actor = caller.0;

    let (txs, actor) = blocking(move || {
        let txs = state.transactions().list(&actor, limit)?;
        Ok((txs, actor))
    })
    .await?;

    let items: Vec<TransactionResponse> = txs
        .into_iter()
        .map(|tx| TransactionResponse::for_actor(tx, &actor))
        .collect();
    Ok(HttpResponse::Ok().json(items))
}

/// GET /services/transactions/{id}
#[utoipa::path(
    get,
    path = "/services/transactions/{id}",
    params(
        ("id" = Uuid, Path, description = "Service transaction UUID"),
    ),
    responses(
        (status = 200, description = "Transaction", body = TransactionResponse),
        (status = 404, description = "Not found or not a participant"),
    ),
    tag = "services"
)]
pub async fn get_transaction(
    state: web::Data<AppState>,
    caller: Caller,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();

    let (tx, role) = blocking(move || state.transactions().view(&caller.0, id)).await?;

    Ok(HttpResponse::Ok().json(TransactionResponse::new(tx, Some(role))))
}

/// GET /services/guest/{token}
///
/// Guest lookup by access token; expired tokens find nothing.
#[utoipa::path(
    get,
    path = "/services/guest/{token}",
    params(
        ("token" = String, Path, description = "Guest access token"),
    ),
    responses(
        (status = 200, description = "Transaction", body = TransactionResponse),
        (status = 404, description = "Unknown or expired token"),
    ),
    tag = "services"
)]
pub async fn get_by_guest_token(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let token = path.into_inner();

    let tx = blocking(move || state.transactions().view_by_guest_token(&token)).await?;

    Ok(HttpResponse::Ok().json(TransactionResponse::new(tx, Some(ParticipantRole::Customer))))
}

// ── Quotes ───────────────────────────────────────────────────────────────────

/// GET /services/transactions/{id}/quotes
///
/// All versions, oldest first. Customers never see drafts.
#[utoipa::path(
    get,
    path = "/services/transactions/{id}/quotes",
    params(
        ("id" = Uuid, Path, description = "Service transaction UUID"),
    ),
    responses(
        (status = 200, description = "Quote versions", body = [QuoteResponse]),
    ),
    tag = "services"
)]
pub async fn list_quotes(
    state: web::Data<AppState>,
    caller: Caller,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();

    let quotes = blocking(move || state.transactions().list_quotes(&caller.0, id)).await?;

    let quotes: Vec<QuoteResponse> = quotes.into_iter().map(QuoteResponse::from).collect();
    Ok(HttpResponse::Ok().json(quotes))
}

/// GET /services/transactions/{id}/quotes/current
#[utoipa::path(
    get,
    path = "/services/transactions/{id}/quotes/current",
    params(
        ("id" = Uuid, Path, description = "Service transaction UUID"),
    ),
    responses(
        (status = 200, description = "Latest quote", body = QuoteResponse),
        (status = 404, description = "No quote yet"),
    ),
    tag = "services"
)]
pub async fn current_quote(
    state: web::Data<AppState>,
    caller: Caller,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();

    let quote = blocking(move || state.transactions().current_quote(&caller.0, id)).await?;

    Ok(HttpResponse::Ok().json(QuoteResponse::from(quote)))
}

/// POST /services/transactions/{id}/quotes
///
/// Sends a new quote version to the customer.
#[utoipa::path(
    post,
    path = "/services/transactions/{id}/quotes",
    params(
        ("id" = Uuid, Path, description = "Service transaction UUID"),
    ),
    request_body = QuoteInput,
    responses(
        (status = 201, description = "Quote sent", body = QuoteResponse),
        (status = 422, description = "Invalid quote or transition"),
    ),
    tag = "services"
)]
pub async fn send_quote(
    state: web::Data<AppState>,
    caller: Caller,
    path: web::Path<Uuid>,
    body: web::Json<QuoteInput>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    let input = body.into_inner();

    let quote = blocking(move || state.transactions().send_quote(&caller.0, id, input)).await?;

    Ok(HttpResponse::Created().json(QuoteResponse::from(quote)))
}

/// POST /services/transactions/{id}/quotes/drafts
#[utoipa::path(
    post,
    path = "/services/transactions/{id}/quotes/drafts",
    params(
        ("id" = Uuid, Path, description = "Service transaction UUID"),
    ),
    request_body = QuoteInput,
    responses(
        (status = 201, description = "Draft saved", body = QuoteResponse),
        (status = 422, description = "Invalid quote or transition"),
    ),
    tag = "services"
)]
pub async fn save_quote_draft(
    state: web::Data<AppState>,
    caller: Caller,
    path: web::Path<Uuid>,
    body: web::Json<QuoteInput>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    let input = body.into_inner();

    let quote =
        blocking(move || state.transactions().save_quote_draft(&caller.0, id, input)).await?;

    Ok(HttpResponse::Created().json(QuoteResponse::from(quote)))
}

/// POST /services/transactions/{id}/quotes/accept
#[utoipa::path(
    post,
    path = "/services/transactions/{id}/quotes/accept",
    params(
        ("id" = Uuid, Path, description = "Service transaction UUID"),
    ),
    responses(
        (status = 200, description = "Quote accepted", body = TransactionResponse),
        (status = 422, description = "No sent quote to accept"),
    ),
    tag = "services"
)]
pub async fn accept_quote(
    state: web::Data<AppState>,
    caller: Caller,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();

    let tx = blocking(move || state.transactions().accept_quote(&caller.0, id)).await?;

    Ok(HttpResponse::Ok().json(TransactionResponse::new(tx, Some(ParticipantRole::Customer))))
}

/// POST /services/transactions/{id}/quotes/revision
#[utoipa::path(
    post,
    path = "/services/transactions/{id}/quotes/revision",
    params(
        ("id" = Uuid, Path, description = "Service transaction UUID"),
    ),
    request_body = NoteBody,
    responses(
        (status = 200, description = "Revision requested", body = TransactionResponse),
    ),
    tag = "services"
)]
pub async fn request_quote_revision(
    state: web::Data<AppState>,
    caller: Caller,
    path: web::Path<Uuid>,
    body: web::Json<NoteBody>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    let note = body.into_inner().note;

    let tx = blocking(move || {
        state
            .transactions()
            .request_quote_revision(&caller.0, id, note)
    })
    .await?;

    Ok(HttpResponse::Ok().json(TransactionResponse::new(tx, Some(ParticipantRole::Customer))))
}

// ── Payment ──────────────────────────────────────────────────────────────────

/// POST /services/transactions/{id}/payment
///
/// Opens a checkout session for the accepted quote.
#[utoipa::path(
    post,
    path = "/services/transactions/{id}/payment",
    params(
        ("id" = Uuid, Path, description = "Service transaction UUID"),
    ),
    responses(
        (status = 201, description = "Checkout session created", body = PaymentResponse),
        (status = 422, description = "Not ready for payment"),
        (status = 502, description = "Payment gateway error"),
    ),
    tag = "services"
)]
pub async fn begin_payment(
    state: web::Data<AppState>,
    caller: Caller,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    let actor = caller.0;

    let request = {
        let state = state.clone();
        let actor = actor.clone();
        let urls = CheckoutUrls {
            success_url: state.settings.service_success_url(id),
            cancel_url: state.settings.service_cancel_url(id),
        };
        blocking(move || {
            state
                .transactions()
                .prepare_payment(&actor, id, &state.settings.currency, urls)
        })
        .await?
    };
    let session = state.gateway.create_checkout_session(&request).await?;
    let response = PaymentResponse {
        session_id: session.session_id.clone(),
        redirect_url: session.redirect_url.clone(),
    };

    blocking(move || {
        state
            .transactions()
            .record_checkout_session(&actor, id, &session)
    })
    .await?;

    Ok(HttpResponse::Created().json(response))
}

/// GET /services/payment/complete
///
/// Browser success redirect for service payments.
#[utoipa::path(
    get,
    path = "/services/payment/complete",
    params(
        ("transaction_id" = Uuid, Query, description = "Service transaction UUID"),
        ("session_id" = String, Query, description = "Checkout session id"),
    ),
    responses(
        (status = 200, description = "Completion outcome", body = PaymentCompleteResponse),
        (status = 403, description = "Session does not belong to the transaction"),
    ),
    tag = "services"
)]
pub async fn payment_complete(
    state: web::Data<AppState>,
    query: web::Query<PaymentCompleteParams>,
) -> Result<HttpResponse, AppError> {
    let PaymentCompleteParams {
        transaction_id,
        session_id,
    } = query.into_inner();

    let session = match state.gateway.retrieve_checkout_session(&session_id).await {
        Ok(session) => session,
        Err(e) => {
            log::warn!(
                "could not confirm session {} for {}: {}",
                session_id,
                transaction_id,
                e
            );
            return Ok(HttpResponse::Ok().json(PaymentCompleteResponse {
                status: "pending".to_string(),
                transaction_id,
            }));
        }
    };

    let outcome = blocking(move || {
        state
            .transactions()
            .confirm_from_redirect(transaction_id, &session)
    })
    .await?;

    let status = outcome.map_or("pending", |completion| completion.label());
    Ok(HttpResponse::Ok().json(PaymentCompleteResponse {
        status: status.to_string(),
        transaction_id,
    }))
}

// ── Production ───────────────────────────────────────────────────────────────

/// POST /services/transactions/{id}/start
#[utoipa::path(
    post,
    path = "/services/transactions/{id}/start",
    params(
        ("id" = Uuid, Path, description = "Service transaction UUID"),
    ),
    responses(
        (status = 200, description = "Production started", body = TransactionResponse),
    ),
    tag = "services"
)]
pub async fn start_production(
    state: web::Data<AppState>,
    caller: Caller,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    let actor = caller.0;

    let (tx, actor) = blocking(move || {
        let tx = state.transactions().start_production(&actor, id)?;
        Ok((tx, actor))
    })
    .await?;

    Ok(HttpResponse::Ok().json(TransactionResponse::for_actor(tx, &actor)))
}

/// POST /services/transactions/{id}/deliver
#[utoipa::path(
    post,
    path = "/services/transactions/{id}/deliver",
    params(
        ("id" = Uuid, Path, description = "Service transaction UUID"),
    ),
    request_body = NoteBody,
    responses(
        (status = 200, description = "Delivered", body = TransactionResponse),
    ),
    tag = "services"
)]
pub async fn deliver(
    state: web::Data<AppState>,
    caller: Caller,
    path: web::Path<Uuid>,
    body: web::Json<NoteBody>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    let note = body.into_inner().note;
    let actor = caller.0;

    let (tx, actor) = blocking(move || {
        let tx = state.transactions().deliver(&actor, id, note)?;
        Ok((tx, actor))
    })
    .await?;

    Ok(HttpResponse::Ok().json(TransactionResponse::for_actor(tx, &actor)))
}

/// POST /services/transactions/{id}/revision
#[utoipa::path(
    post,
    path = "/services/transactions/{id}/revision",
    params(
        ("id" = Uuid, Path, description = "Service transaction UUID"),
    ),
    request_body = NoteBody,
    responses(
        (status = 200, description = "Revision requested", body = TransactionResponse),
        (status = 422, description = "A note is required"),
    ),
    tag = "services"
)]
pub async fn request_revision(
    state: web::Data<AppState>,
    caller: Caller,
    path: web::Path<Uuid>,
    body: web::Json<NoteBody>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    let note = body.into_inner().note.unwrap_or_default();

    let tx = blocking(move || state.transactions().request_revision(&caller.0, id, note)).await?;

    Ok(HttpResponse::Ok().json(TransactionResponse::new(tx, Some(ParticipantRole::Customer))))
}

/// POST /services/transactions/{id}/complete
#[utoipa::path(
    post,
    path = "/services/transactions/{id}/complete",
    params(
        ("id" = Uuid, Path, description = "Service transaction UUID"),
    ),
    responses(
        (status = 200, description = "Completed", body = TransactionResponse),
    ),
    tag = "services"
)]
pub async fn complete(
    state: web::Data<AppState>,
    caller: Caller,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    let actor = caller.0;

    let (tx, actor) = blocking(move || {
        let tx = state.transactions().complete(&actor, id)?;
        Ok((tx, actor))
    })
    .await?;

    Ok(HttpResponse::Ok().json(TransactionResponse::for_actor(tx, &actor)))
}

// ── Cancellation and refunds ─────────────────────────────────────────────────

/// GET /services/transactions/{id}/cancellation-policy
///
/// The same table enforcement uses, for display before the user commits.
#[utoipa::path(
    get,
    path = "/services/transactions/{id}/cancellation-policy",
    params(
        ("id" = Uuid, Path, description = "Service transaction UUID"),
    ),
    responses(
        (status = 200, description = "What stopping now would mean", body = PolicyQuote),
    ),
    tag = "services"
)]
pub async fn cancellation_policy(
    state: web::Data<AppState>,
    caller: Caller,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();

    let policy = blocking(move || state.transactions().cancellation_policy(&caller.0, id)).await?;

    Ok(HttpResponse::Ok().json(policy))
}

/// POST /services/transactions/{id}/cancel
#[utoipa::path(
    post,
    path = "/services/transactions/{id}/cancel",
    params(
        ("id" = Uuid, Path, description = "Service transaction UUID"),
    ),
    request_body = CancelBody,
    responses(
        (status = 200, description = "Cancelled", body = TransactionResponse),
        (status = 422, description = "Payment already made; refund instead"),
    ),
    tag = "services"
)]
pub async fn cancel(
    state: web::Data<AppState>,
    caller: Caller,
    path: web::Path<Uuid>,
    body: web::Json<CancelBody>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    let reason = body.into_inner().reason;
    let actor = caller.0;

    let (tx, actor) = blocking(move || {
        let tx = state.transactions().cancel(&actor, id, reason)?;
        Ok((tx, actor))
    })
    .await?;

    Ok(HttpResponse::Ok().json(TransactionResponse::for_actor(tx, &actor)))
}

/// POST /services/transactions/{id}/refund
///
/// Policy check, then the gateway refund, then the ledger update. If the
/// gateway fails nothing is recorded.
#[utoipa::path(
    post,
    path = "/services/transactions/{id}/refund",
    params(
        ("id" = Uuid, Path, description = "Service transaction UUID"),
    ),
    request_body = RefundBody,
    responses(
        (status = 200, description = "Refunded", body = TransactionResponse),
        (status = 422, description = "Refund not permitted at this stage"),
        (status = 502, description = "Payment gateway error"),
    ),
    tag = "services"
)]
pub async fn refund(
    state: web::Data<AppState>,
    caller: Caller,
    path: web::Path<Uuid>,
    body: web::Json<RefundBody>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    let RefundBody { amount, reason } = body.into_inner();
    let actor = caller.0;

    let plan = {
        let state = state.clone();
        let actor = actor.clone();
        blocking(move || state.transactions().plan_refund(&actor, id, amount)).await?
    };
    let result = state
        .gateway
        .refund(&plan.payment_reference, Some(plan.amount))
        .await?;

    let (tx, actor) = blocking(move || {
        let tx = state
            .transactions()
            .apply_refund(&actor, &plan, &result, reason)?;
        Ok((tx, actor))
    })
    .await?;

    Ok(HttpResponse::Ok().json(TransactionResponse::for_actor(tx, &actor)))
}
