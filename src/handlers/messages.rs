use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::domain::message::{MessageView, NewAttachment, SenderRole, Visibility};
use crate::errors::AppError;
use crate::state::AppState;

use super::actor::Caller;
use super::blocking;

// ── Request / response DTOs ──────────────────────────────────────────────────

#[derive(Debug, Deserialize, ToSchema)]
pub struct PostMessageRequest {
    #[serde(default)]
    pub body: String,
    /// Honoured for administrators only.
    pub visibility: Option<Visibility>,
    #[serde(default)]
    pub attachments: Vec<NewAttachment>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AttachmentResponse {
    pub id: Uuid,
    pub file_name: String,
    pub storage_path: String,
    pub content_type: String,
    pub size_bytes: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    pub id: Uuid,
    pub sender_role: SenderRole,
    pub sender_id: Option<Uuid>,
    pub body: String,
    pub visibility: Visibility,
    /// Read by the caller's audience.
    pub read: bool,
    pub created_at: DateTime<Utc>,
    pub attachments: Vec<AttachmentResponse>,
}

impl From<MessageView> for MessageResponse {
    fn from(m: MessageView) -> Self {
        Self {
            id: m.id,
            sender_role: m.sender_role,
            sender_id: m.sender_id,
            body: m.body,
            visibility: m.visibility,
            read: m.read,
            created_at: m.created_at,
            attachments: m
                .attachments
                .into_iter()
                .map(|a| AttachmentResponse {
                    id: a.id,
                    file_name: a.file_name,
                    storage_path: a.storage_path,
                    content_type: a.content_type,
                    size_bytes: a.size_bytes,
                })
                .collect(),
        }
    }
}

// ── Handlers ─────────────────────────────────────────────────────────────────

/// GET /services/transactions/{id}/messages
///
/// Only messages visible to the caller's audience are returned.
#[utoipa::path(
    get,
    path = "/services/transactions/{id}/messages",
    params(
        ("id" = Uuid, Path, description = "Service transaction UUID"),
    ),
    responses(
        (status = 200, description = "Thread, oldest first", body = [MessageResponse]),
        (status = 404, description = "Not found or not a participant"),
    ),
    tag = "messages"
)]
pub async fn list_messages(
    state: web::Data<AppState>,
    caller: Caller,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();

    let messages = blocking(move || state.messaging().list(&caller.0, id)).await?;

    let messages: Vec<MessageResponse> = messages.into_iter().map(MessageResponse::from).collect();
    Ok(HttpResponse::Ok().json(messages))
}

/// POST /services/transactions/{id}/messages
#[utoipa::path(
    post,
    path = "/services/transactions/{id}/messages",
    params(
        ("id" = Uuid, Path, description = "Service transaction UUID"),
    ),
    request_body = PostMessageRequest,
    responses(
        (status = 201, description = "Message posted", body = MessageResponse),
        (status = 422, description = "Empty message"),
    ),
    tag = "messages"
)]
pub async fn post_message(
    state: web::Data<AppState>,
    caller: Caller,
    path: web::Path<Uuid>,
    body: web::Json<PostMessageRequest>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    let PostMessageRequest {
        body,
        visibility,
        attachments,
    } = body.into_inner();

    let posted = blocking(move || {
        state
            .messaging()
            .post(&caller.0, id, body, visibility, attachments)
    })
    .await?;

    Ok(HttpResponse::Created().json(MessageResponse::from(posted)))
}

/// POST /services/transactions/{id}/messages/read
#[utoipa::path(
    post,
    path = "/services/transactions/{id}/messages/read",
    params(
        ("id" = Uuid, Path, description = "Service transaction UUID"),
    ),
    responses(
        (status = 200, description = "Number of messages marked read"),
    ),
    tag = "messages"
)]
pub async fn mark_read(
    state: web::Data<AppState>,
    caller: Caller,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();

    let marked = blocking(move || state.messaging().mark_read(&caller.0, id)).await?;

    Ok(HttpResponse::Ok().json(json!({ "marked": marked })))
}

/// GET /services/transactions/{id}/messages/unread
#[utoipa::path(
    get,
    path = "/services/transactions/{id}/messages/unread",
    params(
        ("id" = Uuid, Path, description = "Service transaction UUID"),
    ),
    responses(
        (status = 200, description = "Unread count for the caller's audience"),
    ),
    tag = "messages"
)]
pub async fn unread_count(
    state: web::Data<AppState>,
    caller: Caller,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();

    let unread = blocking(move || state.messaging().unread_count(&caller.0, id)).await?;

    Ok(HttpResponse::Ok().json(json!({ "unread": unread })))
}
