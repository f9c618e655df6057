use diesel::pg::upsert::excluded;
use diesel::prelude::*;
use uuid::Uuid;

use crate::db::DbPool;
use crate::domain::cart::{CartLine, ProductSnapshot};
use crate::domain::errors::DomainError;
use crate::domain::ports::CartRepository;
use crate::schema::{cart_items, products};

use super::models::{CartItemRow, NewCartItemRow, ProductRow};

pub struct DieselCartRepository {
    pool: DbPool,
}

impl DieselCartRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl CartRepository for DieselCartRepository {
    fn find_product(&self, product_id: Uuid) -> Result<Option<ProductSnapshot>, DomainError> {
        let mut conn = self.pool.get()?;

        products::table
            .find(product_id)
            .select(ProductRow::as_select())
            .first(&mut conn)
            .optional()?
            .map(ProductRow::into_snapshot)
            .transpose()
    }

    fn upsert_item(
        &self,
        member_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<(), DomainError> {
        let mut conn = self.pool.get()?;

        diesel::insert_into(cart_items::table)
            .values(&NewCartItemRow {
                id: Uuid::new_v4(),
                member_id,
                product_id,
                quantity,
            })
            .on_conflict((cart_items::member_id, cart_items::product_id))
            .do_update()
            .set(cart_items::quantity.eq(excluded(cart_items::quantity)))
            .execute(&mut conn)?;
        Ok(())
    }

    fn remove_item(&self, member_id: Uuid, product_id: Uuid) -> Result<bool, DomainError> {
        let mut conn = self.pool.get()?;

        let deleted = diesel::delete(
            cart_items::table
                .filter(cart_items::member_id.eq(member_id))
                .filter(cart_items::product_id.eq(product_id)),
        )
        .execute(&mut conn)?;
        Ok(deleted > 0)
    }

    fn lines(&self, member_id: Uuid) -> Result<Vec<CartLine>, DomainError> {
        let mut conn = self.pool.get()?;

        let rows: Vec<(CartItemRow, ProductRow)> = cart_items::table
            .inner_join(products::table)
            .filter(cart_items::member_id.eq(member_id))
            .order(cart_items::created_at.asc())
            .select((CartItemRow::as_select(), ProductRow::as_select()))
            .load(&mut conn)?;

        rows.into_iter()
            .map(|(item, product)| {
                Ok(CartLine {
                    product: product.into_snapshot()?,
                    quantity: item.quantity,
                })
            })
            .collect()
    }
}
