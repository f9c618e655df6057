use diesel::prelude::*;

use crate::db::DbPool;
use crate::domain::errors::DomainError;
use crate::domain::ports::WebhookEventLog;
use crate::schema::processed_webhook_events;

use super::models::NewProcessedEventRow;

pub struct DieselWebhookEventLog {
    pool: DbPool,
}

impl DieselWebhookEventLog {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl WebhookEventLog for DieselWebhookEventLog {
    fn record(&self, event_id: &str, event_type: &str) -> Result<bool, DomainError> {
        let mut conn = self.pool.get()?;

        let inserted = diesel::insert_into(processed_webhook_events::table)
            .values(&NewProcessedEventRow {
                event_id,
                event_type,
            })
            .on_conflict(processed_webhook_events::event_id)
            .do_nothing()
            .execute(&mut conn)?;
        Ok(inserted == 1)
    }

    fn forget(&self, event_id: &str) -> Result<(), DomainError> {
        let mut conn = self.pool.get()?;

        diesel::delete(processed_webhook_events::table.find(event_id)).execute(&mut conn)?;
        Ok(())
    }
}
