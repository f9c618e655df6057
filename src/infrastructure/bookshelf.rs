use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use uuid::Uuid;

use crate::db::DbPool;
use crate::domain::errors::DomainError;
use crate::domain::ports::{BookshelfItem, BookshelfRepository};
use crate::schema::{bookshelf_entries, products};

use super::models::NewBookshelfEntryRow;

/// Grants a digital product to a member. Owning it already is not an
/// error; returns whether a new entry was written.
pub fn grant(
    conn: &mut PgConnection,
    member_id: Uuid,
    product_id: Uuid,
    order_id: Uuid,
) -> Result<bool, DomainError> {
    let inserted = diesel::insert_into(bookshelf_entries::table)
        .values(&NewBookshelfEntryRow {
            id: Uuid::new_v4(),
            member_id,
            product_id,
            order_id,
        })
        .on_conflict((bookshelf_entries::member_id, bookshelf_entries::product_id))
        .do_nothing()
        .execute(conn)?;
    Ok(inserted == 1)
}

pub struct DieselBookshelfRepository {
    pool: DbPool,
}

impl DieselBookshelfRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl BookshelfRepository for DieselBookshelfRepository {
    fn list(&self, member_id: Uuid) -> Result<Vec<BookshelfItem>, DomainError> {
        let mut conn = self.pool.get()?;

        let rows: Vec<(Uuid, String, Uuid, DateTime<Utc>)> = bookshelf_entries::table
            .inner_join(products::table)
            .filter(bookshelf_entries::member_id.eq(member_id))
            .order(bookshelf_entries::granted_at.desc())
            .select((
                bookshelf_entries::product_id,
                products::name,
                bookshelf_entries::order_id,
                bookshelf_entries::granted_at,
            ))
            .load(&mut conn)?;

        Ok(rows
            .into_iter()
            .map(|(product_id, product_name, order_id, granted_at)| BookshelfItem {
                product_id,
                product_name,
                order_id,
                granted_at,
            })
            .collect())
    }

    fn owns(&self, member_id: Uuid, product_id: Uuid) -> Result<bool, DomainError> {
        let mut conn = self.pool.get()?;

        let owned = diesel::select(diesel::dsl::exists(
            bookshelf_entries::table
                .filter(bookshelf_entries::member_id.eq(member_id))
                .filter(bookshelf_entries::product_id.eq(product_id)),
        ))
        .get_result(&mut conn)?;
        Ok(owned)
    }
}
