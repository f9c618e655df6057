use chrono::Utc;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use uuid::Uuid;

use crate::domain::errors::DomainError;
use crate::schema::products;

/// Takes `quantity` units of a physical product out of stock and flips the
/// out-of-stock flag in the same statement. Both expressions read the
/// pre-update stock value. Returns the remaining stock.
pub fn decrement_stock(
    conn: &mut PgConnection,
    product_id: Uuid,
    quantity: i32,
) -> Result<i32, DomainError> {
    let remaining: i32 = diesel::update(products::table.find(product_id))
        .set((
            products::stock.eq(products::stock - quantity),
            products::is_out_of_stock.eq((products::stock - quantity).le(0)),
            products::updated_at.eq(Utc::now()),
        ))
        .returning(products::stock)
        .get_result(conn)
        .optional()?
        .ok_or(DomainError::NotFound("Product"))?;

    if remaining < 0 {
        log::warn!(
            "product {} oversold: stock is now {} after taking {}",
            product_id,
            remaining,
            quantity
        );
    }
    Ok(remaining)
}
