use actix_web::{web, HttpRequest, HttpResponse};
use serde_json::json;

use crate::application::webhook_processor::WebhookOutcome;
use crate::domain::payment::SignatureError;
use crate::errors::AppError;
use crate::state::AppState;

use super::blocking;

pub const SIGNATURE_HEADER: &str = "Stripe-Signature";

/// POST /store/webhook.php
///
/// Gateway callbacks. Signature or payload problems are a plain-text 400
/// and touch nothing. Replays and events we do not act on still get 200 so
/// the gateway stops retrying; a processing failure returns 500 so it
/// retries later.
#[utoipa::path(
    post,
    path = "/store/webhook.php",
    request_body(content = String, description = "Raw gateway event", content_type = "application/json"),
    params(
        ("Stripe-Signature" = String, Header, description = "t=<timestamp>,v1=<hex hmac>"),
    ),
    responses(
        (status = 200, description = "Event received"),
        (status = 400, description = "Bad signature or payload", body = String, content_type = "text/plain"),
    ),
    tag = "store"
)]
pub async fn receive(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Bytes,
) -> Result<HttpResponse, AppError> {
    let signature = req
        .headers()
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(SignatureError::MissingHeader)?;

    let event = state.gateway.verify_webhook(&body, signature)?;
    log::info!("webhook event {} ({}) received", event.id, event.event_type);

    let event_id = event.id.clone();
    let outcome = blocking(move || state.webhooks().process(&event)).await?;
    if outcome != WebhookOutcome::Applied {
        log::debug!("webhook event {} left state unchanged ({:?})", event_id, outcome);
    }

    Ok(HttpResponse::Ok().json(json!({ "received": true })))
}
