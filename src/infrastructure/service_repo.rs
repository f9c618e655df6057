use chrono::{DateTime, Utc};
use diesel::dsl::max;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde_json::json;
use uuid::Uuid;

use crate::db::DbPool;
use crate::domain::actor::ParticipantRole;
use crate::domain::errors::DomainError;
use crate::domain::message::NewMessage;
use crate::domain::ports::ServiceTransactionRepository;
use crate::domain::quote::{NewQuote, Quote, QuoteStatus};
use crate::domain::service::{
    CustomerRef, GuestAccess, NewInquiry, ServiceStatus, ServiceTransaction, StatusChange,
};
use crate::schema::{service_quotes, service_transactions, services};

use super::message_repo::insert_message;
use super::models::{
    NewServiceQuoteRow, NewServiceTransactionRow, ServiceQuoteRow, ServiceRow,
    ServiceTransactionRow, TransactionChangeset,
};
use super::outbox::{record_event, SERVICE_AGGREGATE};

pub struct DieselServiceTransactionRepository {
    pool: DbPool,
}

impl DieselServiceTransactionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn changeset_for(change: &StatusChange) -> TransactionChangeset {
    let at = Some(change.at);
    let mut set = TransactionChangeset {
        status: Some(change.to.to_string()),
        total_amount: change.total_amount,
        deadline: change.deadline,
        checkout_session_id: change.checkout_session_id.clone(),
        payment_reference: change.payment_reference.clone(),
        refund_amount: change.refund.as_ref().map(|r| r.amount),
        external_refund_id: change.refund.as_ref().map(|r| r.refund_id.clone()),
        cancel_reason: change.cancel_reason.clone(),
        updated_at: at,
        ..TransactionChangeset::default()
    };
    if change.from != change.to {
        match change.to {
            ServiceStatus::Paid => set.paid_at = at,
            ServiceStatus::Delivered => set.delivered_at = at,
            ServiceStatus::Completed => set.completed_at = at,
            ServiceStatus::Cancelled => set.cancelled_at = at,
            ServiceStatus::Refunded => set.refunded_at = at,
            _ => {}
        }
    }
    set
}

/// The status gate: the row is only touched while it is still in
/// `change.from`, so concurrent or replayed steps apply at most once.
fn apply_change(
    conn: &mut PgConnection,
    id: Uuid,
    change: &StatusChange,
) -> Result<Option<ServiceTransactionRow>, DomainError> {
    let updated = diesel::update(
        service_transactions::table
            .filter(service_transactions::id.eq(id))
            .filter(service_transactions::status.eq(change.from.as_str())),
    )
    .set(&changeset_for(change))
    .returning(ServiceTransactionRow::as_returning())
    .get_result(conn)
    .optional()?;

    let Some(row) = updated else {
        return Ok(None);
    };

    if let Some((quote_id, status)) = change.quote_update {
        diesel::update(
            service_quotes::table
                .filter(service_quotes::id.eq(quote_id))
                .filter(service_quotes::transaction_id.eq(id)),
        )
        .set(service_quotes::status.eq(status.as_str()))
        .execute(conn)?;
    }
    if let Some(message) = &change.message {
        insert_message(conn, id, message)?;
    }

    record_event(
        conn,
        SERVICE_AGGREGATE,
        id,
        "ServiceStatusChanged",
        json!({
            "transaction_id": id,
            "code": row.code,
            "from": change.from,
            "to": change.to,
        }),
    )?;
    Ok(Some(row))
}

impl ServiceTransactionRepository for DieselServiceTransactionRepository {
    fn create_inquiry(
        &self,
        inquiry: &NewInquiry,
        code: &str,
        guest_access: Option<&GuestAccess>,
    ) -> Result<ServiceTransaction, DomainError> {
        let mut conn = self.pool.get()?;

        conn.transaction::<_, DomainError, _>(|conn| {
            let service = services::table
                .find(inquiry.service_id)
                .select(ServiceRow::as_select())
                .first(conn)
                .optional()?
                .ok_or(DomainError::NotFound("Service"))?;
            if !service.is_active {
                return Err(DomainError::policy(
                    "this service is not accepting new requests",
                ));
            }

            let (member_id, guest_email, guest_name) = match &inquiry.customer {
                CustomerRef::Member(id) => (Some(*id), None, None),
                CustomerRef::Guest { email, name } => (None, Some(email.clone()), Some(name.clone())),
            };
            let row = diesel::insert_into(service_transactions::table)
                .values(&NewServiceTransactionRow {
                    id: Uuid::new_v4(),
                    code: code.to_string(),
                    service_id: service.id,
                    creator_id: service.creator_id,
                    customer_member_id: member_id,
                    guest_email,
                    guest_name,
                    status: ServiceStatus::Inquiry.to_string(),
                    deadline: inquiry.requested_deadline,
                    guest_token: guest_access.map(|g| g.token.clone()),
                    guest_token_expires_at: guest_access.map(|g| g.expires_at),
                })
                .returning(ServiceTransactionRow::as_returning())
                .get_result(conn)?;

            let opening = NewMessage::from_participant(
                ParticipantRole::Customer,
                member_id,
                inquiry.message.clone(),
                None,
                vec![],
            )?;
            insert_message(conn, row.id, &opening)?;

            record_event(
                conn,
                SERVICE_AGGREGATE,
                row.id,
                "ServiceInquiryOpened",
                json!({
                    "transaction_id": row.id,
                    "code": row.code,
                    "service_id": service.id,
                    "creator_id": service.creator_id,
                }),
            )?;
            row.into_domain()
        })
    }

    fn find(&self, id: Uuid) -> Result<Option<ServiceTransaction>, DomainError> {
        let mut conn = self.pool.get()?;

        service_transactions::table
            .find(id)
            .select(ServiceTransactionRow::as_select())
            .first(&mut conn)
            .optional()?
            .map(ServiceTransactionRow::into_domain)
            .transpose()
    }

    fn find_by_guest_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<ServiceTransaction>, DomainError> {
        let mut conn = self.pool.get()?;

        service_transactions::table
            .filter(service_transactions::guest_token.eq(token))
            .filter(service_transactions::guest_token_expires_at.gt(now))
            .select(ServiceTransactionRow::as_select())
            .first(&mut conn)
            .optional()?
            .map(ServiceTransactionRow::into_domain)
            .transpose()
    }

    fn find_id_by_payment_reference(&self, reference: &str) -> Result<Option<Uuid>, DomainError> {
        let mut conn = self.pool.get()?;

        Ok(service_transactions::table
            .filter(service_transactions::payment_reference.eq(reference))
            .select(service_transactions::id)
            .first(&mut conn)
            .optional()?)
    }

    fn list_for_participant(
        &self,
        role: ParticipantRole,
        participant_id: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<ServiceTransaction>, DomainError> {
        let mut conn = self.pool.get()?;

        let mut query = service_transactions::table
            .select(ServiceTransactionRow::as_select())
            .order(service_transactions::updated_at.desc())
            .limit(limit)
            .into_boxed();
        query = match (role, participant_id) {
            (ParticipantRole::Customer, Some(id)) => {
                query.filter(service_transactions::customer_member_id.eq(id))
            }
            (ParticipantRole::Creator, Some(id)) => {
                query.filter(service_transactions::creator_id.eq(id))
            }
            (ParticipantRole::Admin, _) => query,
            (_, None) => return Ok(vec![]),
        };

        query
            .load(&mut conn)?
            .into_iter()
            .map(ServiceTransactionRow::into_domain)
            .collect()
    }

    fn apply(
        &self,
        id: Uuid,
        change: &StatusChange,
    ) -> Result<Option<ServiceTransaction>, DomainError> {
        let mut conn = self.pool.get()?;

        conn.transaction::<_, DomainError, _>(|conn| {
            apply_change(conn, id, change)?
                .map(ServiceTransactionRow::into_domain)
                .transpose()
        })
    }

    fn add_quote(
        &self,
        id: Uuid,
        quote: &NewQuote,
        status: QuoteStatus,
        change: &StatusChange,
    ) -> Result<Option<Quote>, DomainError> {
        let mut conn = self.pool.get()?;

        conn.transaction::<_, DomainError, _>(|conn| {
            // 1. Lock the transaction so concurrent quotes get distinct versions
            let locked: Option<String> = service_transactions::table
                .find(id)
                .select(service_transactions::status)
                .for_update()
                .first(conn)
                .optional()?;
            if locked.as_deref() != Some(change.from.as_str()) {
                return Ok(None);
            }

            // 2. Next version number
            let latest: Option<i32> = service_quotes::table
                .filter(service_quotes::transaction_id.eq(id))
                .select(max(service_quotes::version))
                .first(conn)?;
            let items = serde_json::to_value(&quote.items)
                .map_err(|e| DomainError::Internal(e.to_string()))?;
            let row = diesel::insert_into(service_quotes::table)
                .values(&NewServiceQuoteRow {
                    id: Uuid::new_v4(),
                    transaction_id: id,
                    version: latest.unwrap_or(0) + 1,
                    items,
                    subtotal: quote.subtotal,
                    tax: quote.tax,
                    total: quote.total,
                    estimated_delivery_days: quote.estimated_delivery_days,
                    note: quote.note.clone(),
                    status: status.to_string(),
                })
                .returning(ServiceQuoteRow::as_returning())
                .get_result(conn)?;

            // 3. Status step in the same transaction
            if apply_change(conn, id, change)?.is_none() {
                return Err(DomainError::Internal(format!(
                    "service transaction {id} changed while locked"
                )));
            }
            row.into_domain().map(Some)
        })
    }

    fn list_quotes(&self, id: Uuid) -> Result<Vec<Quote>, DomainError> {
        let mut conn = self.pool.get()?;

        service_quotes::table
            .filter(service_quotes::transaction_id.eq(id))
            .order(service_quotes::version.asc())
            .select(ServiceQuoteRow::as_select())
            .load(&mut conn)?
            .into_iter()
            .map(ServiceQuoteRow::into_domain)
            .collect()
    }

    fn current_quote(&self, id: Uuid) -> Result<Option<Quote>, DomainError> {
        let mut conn = self.pool.get()?;

        service_quotes::table
            .filter(service_quotes::transaction_id.eq(id))
            .order(service_quotes::version.desc())
            .select(ServiceQuoteRow::as_select())
            .first(&mut conn)
            .optional()?
            .map(ServiceQuoteRow::into_domain)
            .transpose()
    }
}
