use chrono::Utc;
use diesel::pg::{Pg, PgConnection};
use diesel::prelude::*;
use diesel::sql_types::Bool;
use uuid::Uuid;

use crate::db::DbPool;
use crate::domain::actor::ParticipantRole;
use crate::domain::errors::DomainError;
use crate::domain::message::{MessageView, NewMessage};
use crate::domain::ports::MessageRepository;
use crate::schema::{service_message_attachments, service_messages, service_transactions};

use super::models::{AttachmentRow, NewAttachmentRow, NewServiceMessageRow, ServiceMessageRow};

type MessageFilter = Box<dyn BoxableExpression<service_messages::table, Pg, SqlType = Bool>>;

/// Messages `viewer` is allowed to see. Audience isolation lives here, in
/// the query, and nowhere else.
fn visible_to(viewer: ParticipantRole) -> MessageFilter {
    match viewer {
        ParticipantRole::Customer => Box::new(service_messages::visible_to_customer.eq(true)),
        ParticipantRole::Creator => Box::new(service_messages::visible_to_creator.eq(true)),
        ParticipantRole::Admin => Box::new(service_messages::visible_to_admin.eq(true)),
    }
}

fn unread_by(reader: ParticipantRole) -> MessageFilter {
    match reader {
        ParticipantRole::Customer => Box::new(service_messages::read_by_customer.eq(false)),
        ParticipantRole::Creator => Box::new(service_messages::read_by_creator.eq(false)),
        ParticipantRole::Admin => Box::new(service_messages::read_by_admin.eq(false)),
    }
}

/// Writes a message and its attachments on the caller's connection. The
/// author's own read flag starts set.
pub fn insert_message(
    conn: &mut PgConnection,
    transaction_id: Uuid,
    message: &NewMessage,
) -> Result<MessageView, DomainError> {
    let author = message.author_audience();
    let row = diesel::insert_into(service_messages::table)
        .values(&NewServiceMessageRow {
            id: Uuid::new_v4(),
            transaction_id,
            sender_role: message.sender_role.to_string(),
            sender_id: message.sender_id,
            body: message.body.clone(),
            visible_to_customer: message.visibility.customer,
            visible_to_creator: message.visibility.creator,
            visible_to_admin: message.visibility.admin,
            read_by_customer: author == Some(ParticipantRole::Customer),
            read_by_creator: author == Some(ParticipantRole::Creator),
            read_by_admin: author == Some(ParticipantRole::Admin),
        })
        .returning(ServiceMessageRow::as_returning())
        .get_result(conn)?;

    let attachments: Vec<NewAttachmentRow> = message
        .attachments
        .iter()
        .map(|a| NewAttachmentRow {
            id: Uuid::new_v4(),
            message_id: row.id,
            file_name: a.file_name.clone(),
            storage_path: a.storage_path.clone(),
            content_type: a.content_type.clone(),
            size_bytes: a.size_bytes,
        })
        .collect();
    let stored = if attachments.is_empty() {
        vec![]
    } else {
        diesel::insert_into(service_message_attachments::table)
            .values(&attachments)
            .returning(AttachmentRow::as_returning())
            .get_results(conn)?
    };

    row.into_view(author.unwrap_or(ParticipantRole::Admin), stored)
}

pub struct DieselMessageRepository {
    pool: DbPool,
}

impl DieselMessageRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl MessageRepository for DieselMessageRepository {
    fn post(&self, transaction_id: Uuid, message: &NewMessage) -> Result<MessageView, DomainError> {
        let mut conn = self.pool.get()?;

        conn.transaction::<_, DomainError, _>(|conn| {
            let touched = diesel::update(service_transactions::table.find(transaction_id))
                .set(service_transactions::updated_at.eq(Utc::now()))
                .execute(conn)?;
            if touched == 0 {
                return Err(DomainError::NotFound("Service transaction"));
            }
            insert_message(conn, transaction_id, message)
        })
    }

    fn list_visible(
        &self,
        transaction_id: Uuid,
        viewer: ParticipantRole,
    ) -> Result<Vec<MessageView>, DomainError> {
        let mut conn = self.pool.get()?;

        let rows = service_messages::table
            .filter(service_messages::transaction_id.eq(transaction_id))
            .into_boxed()
            .filter(visible_to(viewer))
            .order((service_messages::created_at.asc(), service_messages::id.asc()))
            .select(ServiceMessageRow::as_select())
            .load(&mut conn)?;

        let attachments = AttachmentRow::belonging_to(&rows)
            .select(AttachmentRow::as_select())
            .load(&mut conn)?
            .grouped_by(&rows);

        rows.into_iter()
            .zip(attachments)
            .map(|(row, files)| row.into_view(viewer, files))
            .collect()
    }

    fn mark_read(&self, transaction_id: Uuid, reader: ParticipantRole) -> Result<usize, DomainError> {
        let mut conn = self.pool.get()?;

        let target = service_messages::table
            .filter(service_messages::transaction_id.eq(transaction_id));
        let updated = match reader {
            ParticipantRole::Customer => diesel::update(
                target
                    .filter(service_messages::visible_to_customer.eq(true))
                    .filter(service_messages::read_by_customer.eq(false)),
            )
            .set(service_messages::read_by_customer.eq(true))
            .execute(&mut conn)?,
            ParticipantRole::Creator => diesel::update(
                target
                    .filter(service_messages::visible_to_creator.eq(true))
                    .filter(service_messages::read_by_creator.eq(false)),
            )
            .set(service_messages::read_by_creator.eq(true))
            .execute(&mut conn)?,
            ParticipantRole::Admin => diesel::update(
                target
                    .filter(service_messages::visible_to_admin.eq(true))
                    .filter(service_messages::read_by_admin.eq(false)),
            )
            .set(service_messages::read_by_admin.eq(true))
            .execute(&mut conn)?,
        };
        Ok(updated)
    }

    fn unread_count(&self, transaction_id: Uuid, reader: ParticipantRole) -> Result<i64, DomainError> {
        let mut conn = self.pool.get()?;

        Ok(service_messages::table
            .filter(service_messages::transaction_id.eq(transaction_id))
            .into_boxed()
            .filter(visible_to(reader))
            .filter(unread_by(reader))
            .count()
            .get_result(&mut conn)?)
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::DieselMessageRepository;
    use crate::domain::actor::ParticipantRole;
    use crate::domain::message::{NewAttachment, NewMessage, Visibility};
    use crate::domain::ports::{MessageRepository, ServiceTransactionRepository};
    use crate::domain::service::{generate_code, CustomerRef, NewInquiry};
    use crate::infrastructure::service_repo::DieselServiceTransactionRepository;
    use crate::infrastructure::test_support::{seed_service, setup_db};

    fn open_transaction(
        repo: &DieselServiceTransactionRepository,
        service_id: Uuid,
    ) -> Uuid {
        repo.create_inquiry(
            &NewInquiry {
                service_id,
                customer: CustomerRef::Member(Uuid::new_v4()),
                message: "Hello".to_string(),
                requested_deadline: None,
            },
            &generate_code(chrono::Utc::now()),
            None,
        )
        .expect("inquiry")
        .id
    }

    #[tokio::test]
    async fn internal_admin_notes_stay_internal() {
        let (_container, pool) = setup_db().await;
        let service = seed_service(&pool, Uuid::new_v4(), true);
        let transactions = DieselServiceTransactionRepository::new(pool.clone());
        let messages = DieselMessageRepository::new(pool);
        let tx = open_transaction(&transactions, service.id);

        let note = NewMessage::from_participant(
            ParticipantRole::Admin,
            Some(Uuid::new_v4()),
            "Customer disputed a previous order".to_string(),
            Some(Visibility::admin_only()),
            vec![],
        )
        .expect("message");
        messages.post(tx, &note).expect("post");

        let customer_view = messages
            .list_visible(tx, ParticipantRole::Customer)
            .expect("list");
        let creator_view = messages
            .list_visible(tx, ParticipantRole::Creator)
            .expect("list");
        let admin_view = messages.list_visible(tx, ParticipantRole::Admin).expect("list");

        // opening inquiry message is visible to everyone
        assert_eq!(customer_view.len(), 1);
        assert_eq!(creator_view.len(), 1);
        assert_eq!(admin_view.len(), 2);
        assert!(customer_view.iter().all(|m| m.visibility.customer));
    }

    #[tokio::test]
    async fn read_flags_are_per_audience() {
        let (_container, pool) = setup_db().await;
        let service = seed_service(&pool, Uuid::new_v4(), true);
        let transactions = DieselServiceTransactionRepository::new(pool.clone());
        let messages = DieselMessageRepository::new(pool);
        let tx = open_transaction(&transactions, service.id);

        let reply = NewMessage::from_participant(
            ParticipantRole::Creator,
            Some(service.creator_id),
            "Sure, here is a sketch".to_string(),
            None,
            vec![NewAttachment {
                file_name: "sketch.png".to_string(),
                storage_path: "uploads/sketch.png".to_string(),
                content_type: "image/png".to_string(),
                size_bytes: 2048,
            }],
        )
        .expect("message");
        let posted = messages.post(tx, &reply).expect("post");
        assert!(posted.read);
        assert_eq!(posted.attachments.len(), 1);

        // the customer wrote the inquiry, so only the reply is unread for them
        assert_eq!(messages.unread_count(tx, ParticipantRole::Customer).expect("count"), 1);
        assert_eq!(messages.unread_count(tx, ParticipantRole::Creator).expect("count"), 1);

        messages.mark_read(tx, ParticipantRole::Customer).expect("mark");
        assert_eq!(messages.unread_count(tx, ParticipantRole::Customer).expect("count"), 0);
        assert_eq!(messages.unread_count(tx, ParticipantRole::Creator).expect("count"), 1);

        let thread = messages.list_visible(tx, ParticipantRole::Customer).expect("list");
        assert_eq!(thread[1].attachments[0].file_name, "sketch.png");
    }
}
