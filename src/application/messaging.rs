use chrono::Utc;
use uuid::Uuid;

use crate::domain::actor::{Actor, ParticipantRole};
use crate::domain::errors::DomainError;
use crate::domain::message::{MessageView, NewAttachment, NewMessage, Visibility};
use crate::domain::notification::Notification;
use crate::domain::ports::{MessageRepository, ServiceTransactionRepository};

use super::notifications::NotificationDispatcher;

/// Per-transaction message thread with audience filtering.
pub struct MessagingService<R, M> {
    transactions: R,
    messages: M,
    dispatcher: NotificationDispatcher,
}

impl<R: ServiceTransactionRepository, M: MessageRepository> MessagingService<R, M> {
    pub fn new(transactions: R, messages: M, dispatcher: NotificationDispatcher) -> Self {
        Self {
            transactions,
            messages,
            dispatcher,
        }
    }

    /// Only admins can narrow visibility; for everyone else the requested
    /// audience is ignored.
    pub fn post(
        &self,
        actor: &Actor,
        transaction_id: Uuid,
        body: String,
        visibility: Option<Visibility>,
        attachments: Vec<NewAttachment>,
    ) -> Result<MessageView, DomainError> {
        let role = self.role(actor, transaction_id)?;
        let requested = if role == ParticipantRole::Admin {
            visibility
        } else {
            None
        };
        let message =
            NewMessage::from_participant(role, actor.id(), body, requested, attachments)?;
        let posted = self.messages.post(transaction_id, &message)?;

        let audience: Vec<ParticipantRole> = ParticipantRole::ALL
            .iter()
            .copied()
            .filter(|r| *r != role && posted.visibility.includes(*r))
            .collect();
        log::debug!(
            "message {} posted on {} by {} (audience {:?})",
            posted.id,
            transaction_id,
            role,
            audience
        );
        if !audience.is_empty() {
            self.dispatcher.dispatch(&[Notification::ServiceMessagePosted {
                transaction_id,
                sender_role: posted.sender_role,
                audience,
            }]);
        }
        Ok(posted)
    }

    pub fn list(&self, actor: &Actor, transaction_id: Uuid) -> Result<Vec<MessageView>, DomainError> {
        let role = self.role(actor, transaction_id)?;
        self.messages.list_visible(transaction_id, role)
    }

    pub fn mark_read(&self, actor: &Actor, transaction_id: Uuid) -> Result<usize, DomainError> {
        let role = self.role(actor, transaction_id)?;
        self.messages.mark_read(transaction_id, role)
    }

    pub fn unread_count(&self, actor: &Actor, transaction_id: Uuid) -> Result<i64, DomainError> {
        let role = self.role(actor, transaction_id)?;
        self.messages.unread_count(transaction_id, role)
    }

    fn role(&self, actor: &Actor, transaction_id: Uuid) -> Result<ParticipantRole, DomainError> {
        self.transactions
            .find(transaction_id)?
            .and_then(|tx| tx.role_of(actor, Utc::now()))
            .ok_or(DomainError::NotFound("Service transaction"))
    }
}
