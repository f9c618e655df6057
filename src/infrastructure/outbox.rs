use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde_json::Value;
use uuid::Uuid;

use crate::domain::errors::DomainError;
use crate::schema::commerce_outbox;

use super::models::NewOutboxEventRow;

pub const ORDER_AGGREGATE: &str = "Order";
pub const SERVICE_AGGREGATE: &str = "ServiceTransaction";

/// Appends a domain event to the outbox. Must be called on the connection
/// of the transaction that performs the change, so the event is written if
/// and only if the change commits.
pub fn record_event(
    conn: &mut PgConnection,
    aggregate_type: &str,
    aggregate_id: Uuid,
    event_type: &str,
    payload: Value,
) -> Result<(), DomainError> {
    diesel::insert_into(commerce_outbox::table)
        .values(&NewOutboxEventRow {
            id: Uuid::new_v4(),
            aggregate_type: aggregate_type.to_string(),
            aggregate_id: aggregate_id.to_string(),
            event_type: event_type.to_string(),
            payload,
        })
        .execute(conn)?;
    Ok(())
}
