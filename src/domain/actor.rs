use uuid::Uuid;

use super::errors::DomainError;

/// The authenticated party behind a request, resolved by the session layer
/// before any engine function runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Actor {
    Member(Uuid),
    Creator(Uuid),
    Admin(Uuid),
    /// Bearer of a guest access token for one service transaction.
    Guest(String),
}

impl Actor {
    pub fn require_member(&self) -> Result<Uuid, DomainError> {
        match self {
            Actor::Member(id) => Ok(*id),
            _ => Err(DomainError::forbidden("a member account is required")),
        }
    }

    pub fn require_admin(&self) -> Result<Uuid, DomainError> {
        match self {
            Actor::Admin(id) => Ok(*id),
            _ => Err(DomainError::forbidden("administrator access is required")),
        }
    }

    pub fn id(&self) -> Option<Uuid> {
        match self {
            Actor::Member(id) | Actor::Creator(id) | Actor::Admin(id) => Some(*id),
            Actor::Guest(_) => None,
        }
    }

    pub fn label(&self) -> String {
        match self {
            Actor::Member(id) => format!("member {id}"),
            Actor::Creator(id) => format!("creator {id}"),
            Actor::Admin(id) => format!("admin {id}"),
            Actor::Guest(_) => "guest".to_string(),
        }
    }
}

status_enum!(
    /// Audience a participant belongs to for one service transaction.
    ParticipantRole, "participant role" {
        Customer => "customer",
        Creator => "creator",
        Admin => "admin",
    }
);
