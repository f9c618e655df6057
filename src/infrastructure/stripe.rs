//! Stripe integration over the REST API (form-encoded, no SDK).

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::{Client, Response, StatusCode};
use serde_json::Value;
use sha2::Sha256;

use crate::config::StripeSettings;
use crate::domain::payment::{
    CheckoutRequest, CheckoutSession, GatewayError, PaymentSubject, RefundResult, SessionStatus,
    SignatureError, WebhookEvent, WebhookEventKind,
};
use crate::domain::ports::PaymentGateway;

const METADATA_KIND: &str = "kind";
const METADATA_SUBJECT: &str = "subject_id";

pub struct StripeGateway {
    http: Client,
    secret_key: String,
    webhook_secret: String,
    api_base: String,
    tolerance_secs: i64,
}

impl StripeGateway {
    pub fn new(settings: &StripeSettings) -> Result<Self, GatewayError> {
        let http = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| GatewayError::Configuration(e.to_string()))?;
        Ok(Self {
            http,
            secret_key: settings.secret_key.clone(),
            webhook_secret: settings.webhook_secret.clone(),
            api_base: settings.api_base.clone(),
            tolerance_secs: settings.webhook_tolerance_secs,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    async fn post_form(&self, path: &str, form: &[(String, String)]) -> Result<Value, GatewayError> {
        let resp = self
            .http
            .post(self.url(path))
            .basic_auth(&self.secret_key, None::<&str>)
            .form(form)
            .send()
            .await
            .map_err(transport_error)?;
        read_response(resp).await
    }
}

fn transport_error(e: reqwest::Error) -> GatewayError {
    if e.is_timeout() {
        GatewayError::Timeout
    } else {
        GatewayError::Network(e.to_string())
    }
}

async fn read_response(resp: Response) -> Result<Value, GatewayError> {
    let status = resp.status();
    let body: Value = resp.json().await.map_err(transport_error)?;
    if status.is_success() {
        Ok(body)
    } else {
        Err(classify_error(status, &body))
    }
}

/// Maps a Stripe error body onto the gateway error categories.
fn classify_error(status: StatusCode, body: &Value) -> GatewayError {
    let error = &body["error"];
    let message = error["message"].as_str().unwrap_or("unknown error");
    let detail = match error["code"].as_str() {
        Some(code) => format!("{code}: {message}"),
        None => message.to_string(),
    };

    if error["type"].as_str() == Some("card_error") || status == StatusCode::PAYMENT_REQUIRED {
        return GatewayError::Card(detail);
    }
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => GatewayError::Configuration(detail),
        StatusCode::TOO_MANY_REQUESTS => GatewayError::Network(detail),
        s if s.is_server_error() => GatewayError::Network(detail),
        _ => GatewayError::Rejected(detail),
    }
}

fn checkout_form(request: &CheckoutRequest) -> Vec<(String, String)> {
    let subject_id = request.subject.id().to_string();
    let mut form = vec![
        ("mode".to_string(), "payment".to_string()),
        ("success_url".to_string(), request.success_url.clone()),
        ("cancel_url".to_string(), request.cancel_url.clone()),
        ("client_reference_id".to_string(), subject_id.clone()),
    ];
    for (i, line) in request.lines.iter().enumerate() {
        let prefix = format!("line_items[{i}]");
        form.push((
            format!("{prefix}[price_data][currency]"),
            request.currency.clone(),
        ));
        form.push((
            format!("{prefix}[price_data][product_data][name]"),
            line.name.clone(),
        ));
        form.push((
            format!("{prefix}[price_data][unit_amount]"),
            line.unit_amount.to_string(),
        ));
        form.push((format!("{prefix}[quantity]"), line.quantity.to_string()));
    }
    // Stamped on both the session and the payment intent so either event
    // type can be routed back to its subject.
    for scope in ["metadata", "payment_intent_data[metadata]"] {
        form.push((
            format!("{scope}[{METADATA_KIND}]"),
            request.subject.kind().to_string(),
        ));
        form.push((format!("{scope}[{METADATA_SUBJECT}]"), subject_id.clone()));
    }
    form
}

fn subject_from(metadata: &Value) -> Option<PaymentSubject> {
    let id = metadata[METADATA_SUBJECT]
        .as_str()
        .or_else(|| metadata["order_id"].as_str());
    PaymentSubject::from_metadata(metadata[METADATA_KIND].as_str(), id)
}

/// `payment_intent` is a plain id unless the caller asked Stripe to expand it.
fn payment_intent_id(value: &Value) -> Option<String> {
    value
        .as_str()
        .or_else(|| value["id"].as_str())
        .map(String::from)
}

fn session_status(session: &Value) -> Result<SessionStatus, GatewayError> {
    let session_id = session["id"]
        .as_str()
        .ok_or_else(|| GatewayError::Rejected("checkout session without id".to_string()))?;
    Ok(SessionStatus {
        session_id: session_id.to_string(),
        paid: session["payment_status"].as_str() == Some("paid"),
        payment_intent: payment_intent_id(&session["payment_intent"]),
        subject: subject_from(&session["metadata"]),
    })
}

/// Verifies a `t=<ts>,v1=<hex>` signature header over `"<ts>.<payload>"`.
/// Any of several `v1` entries may match (Stripe sends more than one
/// while a secret is being rolled).
pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    tolerance_secs: i64,
    now: i64,
) -> Result<(), SignatureError> {
    if header.trim().is_empty() {
        return Err(SignatureError::MissingHeader);
    }

    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        if let Some(t) = part.trim().strip_prefix("t=") {
            timestamp = Some(t);
        } else if let Some(v) = part.trim().strip_prefix("v1=") {
            signatures.push(v);
        }
    }
    let timestamp = timestamp.ok_or(SignatureError::MalformedHeader)?;
    let ts: i64 = timestamp
        .parse()
        .map_err(|_| SignatureError::MalformedHeader)?;
    if signatures.is_empty() {
        return Err(SignatureError::MalformedHeader);
    }

    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|_| SignatureError::Mismatch)?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);

    // verify_slice compares in constant time
    let matched = signatures.iter().any(|sig| {
        hex::decode(sig)
            .map(|bytes| mac.clone().verify_slice(&bytes).is_ok())
            .unwrap_or(false)
    });
    if !matched {
        return Err(SignatureError::Mismatch);
    }
    if (now - ts).abs() > tolerance_secs {
        return Err(SignatureError::Expired);
    }
    Ok(())
}

fn required_str<'a>(value: &'a Value, field: &str) -> Result<&'a str, SignatureError> {
    value[field]
        .as_str()
        .ok_or_else(|| SignatureError::InvalidPayload(format!("missing {field}")))
}

/// Decodes the events this engine acts on; everything else is `Ignored`.
pub fn parse_event(payload: &[u8]) -> Result<WebhookEvent, SignatureError> {
    let event: Value = serde_json::from_slice(payload)
        .map_err(|e| SignatureError::InvalidPayload(e.to_string()))?;
    let id = required_str(&event, "id")?.to_string();
    let event_type = required_str(&event, "type")?.to_string();
    let object = &event["data"]["object"];

    let kind = match event_type.as_str() {
        "checkout.session.completed" | "checkout.session.async_payment_succeeded" => {
            WebhookEventKind::CheckoutSessionCompleted {
                session_id: required_str(object, "id")?.to_string(),
                payment_intent: payment_intent_id(&object["payment_intent"]),
                paid: object["payment_status"].as_str() == Some("paid"),
                subject: subject_from(&object["metadata"]),
            }
        }
        "payment_intent.succeeded" => WebhookEventKind::PaymentIntentSucceeded {
            payment_intent: required_str(object, "id")?.to_string(),
            subject: subject_from(&object["metadata"]),
        },
        "payment_intent.payment_failed" => WebhookEventKind::PaymentIntentFailed {
            payment_intent: required_str(object, "id")?.to_string(),
            subject: subject_from(&object["metadata"]),
            reason: object["last_payment_error"]["message"]
                .as_str()
                .map(String::from),
        },
        "charge.refunded" => WebhookEventKind::ChargeRefunded {
            payment_intent: payment_intent_id(&object["payment_intent"]),
            amount: object["amount"].as_i64().unwrap_or(0),
            amount_refunded: object["amount_refunded"].as_i64().unwrap_or(0),
            refund_id: object["refunds"]["data"][0]["id"]
                .as_str()
                .map(String::from),
        },
        _ => WebhookEventKind::Ignored,
    };

    Ok(WebhookEvent {
        id,
        event_type,
        kind,
    })
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, GatewayError> {
        let resp = self
            .post_form("/v1/checkout/sessions", &checkout_form(request))
            .await?;

        let session_id = resp["id"].as_str();
        let url = resp["url"].as_str();
        match (session_id, url) {
            (Some(id), Some(url)) => Ok(CheckoutSession {
                session_id: id.to_string(),
                redirect_url: url.to_string(),
            }),
            _ => {
                log::error!("Stripe create_checkout_session returned no id/url: {resp}");
                Err(GatewayError::Rejected(
                    "checkout session response without id or url".to_string(),
                ))
            }
        }
    }

    async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<SessionStatus, GatewayError> {
        let resp = self
            .http
            .get(self.url(&format!("/v1/checkout/sessions/{session_id}")))
            .basic_auth(&self.secret_key, None::<&str>)
            .send()
            .await
            .map_err(transport_error)?;
        session_status(&read_response(resp).await?)
    }

    fn verify_webhook(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<WebhookEvent, SignatureError> {
        verify_signature(
            payload,
            signature_header,
            &self.webhook_secret,
            self.tolerance_secs,
            chrono::Utc::now().timestamp(),
        )?;
        parse_event(payload)
    }

    async fn refund(
        &self,
        payment_reference: &str,
        amount: Option<i64>,
    ) -> Result<RefundResult, GatewayError> {
        let mut form = vec![("payment_intent".to_string(), payment_reference.to_string())];
        if let Some(amount) = amount {
            form.push(("amount".to_string(), amount.to_string()));
        }
        let resp = self.post_form("/v1/refunds", &form).await?;

        let refund_id = resp["id"]
            .as_str()
            .ok_or_else(|| GatewayError::Rejected("refund response without id".to_string()))?;
        Ok(RefundResult {
            refund_id: refund_id.to_string(),
            amount: resp["amount"].as_i64().unwrap_or_else(|| amount.unwrap_or(0)),
            status: resp["status"].as_str().unwrap_or("pending").to_string(),
        })
    }
}
