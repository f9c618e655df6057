use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::actor::ParticipantRole;
use super::errors::DomainError;

status_enum!(
    SenderRole, "sender role" {
        Customer => "customer",
        Creator => "creator",
        Admin => "admin",
        System => "system",
    }
);

impl From<ParticipantRole> for SenderRole {
    fn from(role: ParticipantRole) -> Self {
        match role {
            ParticipantRole::Customer => SenderRole::Customer,
            ParticipantRole::Creator => SenderRole::Creator,
            ParticipantRole::Admin => SenderRole::Admin,
        }
    }
}

/// Per-audience visibility. Each flag is independent, so an admin note can
/// be hidden from both customer and creator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Visibility {
    pub customer: bool,
    pub creator: bool,
    pub admin: bool,
}

impl Default for Visibility {
    fn default() -> Self {
        Self::everyone()
    }
}

impl Visibility {
    pub const fn everyone() -> Self {
        Self {
            customer: true,
            creator: true,
            admin: true,
        }
    }

    pub const fn admin_only() -> Self {
        Self {
            customer: false,
            creator: false,
            admin: true,
        }
    }

    pub fn includes(&self, role: ParticipantRole) -> bool {
        match role {
            ParticipantRole::Customer => self.customer,
            ParticipantRole::Creator => self.creator,
            ParticipantRole::Admin => self.admin,
        }
    }

    /// Senders always see their own messages and admins see every
    /// participant message; only admins may narrow the audience further.
    pub fn for_sender(sender: SenderRole, requested: Option<Visibility>) -> Visibility {
        let requested = requested.unwrap_or_default();
        match sender {
            SenderRole::Admin => Visibility {
                admin: true,
                ..requested
            },
            SenderRole::Customer => Visibility {
                customer: true,
                admin: true,
                ..requested
            },
            SenderRole::Creator => Visibility {
                creator: true,
                admin: true,
                ..requested
            },
            SenderRole::System => requested,
        }
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewAttachment {
    pub file_name: String,
    pub storage_path: String,
    pub content_type: String,
    pub size_bytes: i64,
}

#[derive(Debug, Clone)]
pub struct NewMessage {
    pub sender_role: SenderRole,
    pub sender_id: Option<Uuid>,
    pub body: String,
    pub visibility: Visibility,
    pub attachments: Vec<NewAttachment>,
}

impl NewMessage {
    pub fn from_participant(
        role: ParticipantRole,
        sender_id: Option<Uuid>,
        body: String,
        requested: Option<Visibility>,
        attachments: Vec<NewAttachment>,
    ) -> Result<Self, DomainError> {
        if body.trim().is_empty() && attachments.is_empty() {
            return Err(DomainError::invalid("a message needs a body or an attachment"));
        }
        if attachments
            .iter()
            .any(|a| a.file_name.trim().is_empty() || a.size_bytes < 0)
        {
            return Err(DomainError::invalid("invalid attachment"));
        }
        let sender_role = SenderRole::from(role);
        Ok(Self {
            sender_role,
            sender_id,
            body,
            visibility: Visibility::for_sender(sender_role, requested),
            attachments,
        })
    }

    pub fn system(body: impl Into<String>) -> Self {
        Self {
            sender_role: SenderRole::System,
            sender_id: None,
            body: body.into(),
            visibility: Visibility::everyone(),
            attachments: vec![],
        }
    }

    /// The audience whose read flag is pre-set because they wrote it.
    pub fn author_audience(&self) -> Option<ParticipantRole> {
        match self.sender_role {
            SenderRole::Customer => Some(ParticipantRole::Customer),
            SenderRole::Creator => Some(ParticipantRole::Creator),
            SenderRole::Admin => Some(ParticipantRole::Admin),
            SenderRole::System => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AttachmentView {
    pub id: Uuid,
    pub file_name: String,
    pub storage_path: String,
    pub content_type: String,
    pub size_bytes: i64,
}

#[derive(Debug, Clone)]
pub struct MessageView {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub sender_role: SenderRole,
    pub sender_id: Option<Uuid>,
    pub body: String,
    pub visibility: Visibility,
    pub read: bool,
    pub created_at: DateTime<Utc>,
    pub attachments: Vec<AttachmentView>,
}
