use uuid::Uuid;

use super::errors::DomainError;
use super::order::{OrderLineDraft, ProductType};

#[derive(Debug, Clone)]
pub struct ProductSnapshot {
    pub id: Uuid,
    pub name: String,
    pub product_type: ProductType,
    pub price: i64,
    pub stock: i32,
    pub is_out_of_stock: bool,
}

impl ProductSnapshot {
    /// Stock check at cart/checkout time. Nothing is reserved here; stock is
    /// only decremented when the payment is confirmed.
    pub fn ensure_available(&self, requested: i32) -> Result<(), DomainError> {
        if requested <= 0 {
            return Err(DomainError::invalid("quantity must be at least 1"));
        }
        match self.product_type {
            ProductType::Digital if requested != 1 => Err(DomainError::invalid(format!(
                "'{}' is a digital item and can only be purchased once",
                self.name
            ))),
            ProductType::Digital => Ok(()),
            ProductType::Physical if self.is_out_of_stock || self.stock <= 0 => Err(
                DomainError::policy(format!("'{}' is out of stock", self.name)),
            ),
            ProductType::Physical if requested > self.stock => {
                Err(DomainError::policy(format!(
                    "only {} of '{}' left in stock",
                    self.stock, self.name
                )))
            }
            ProductType::Physical => Ok(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CartLine {
    pub product: ProductSnapshot,
    pub quantity: i32,
}

impl CartLine {
    pub fn subtotal(&self) -> i64 {
        self.product.price * i64::from(self.quantity)
    }

    /// Re-validates stock and freezes name, type and price for the order.
    pub fn to_order_line(&self) -> Result<OrderLineDraft, DomainError> {
        self.product.ensure_available(self.quantity)?;
        Ok(OrderLineDraft {
            product_id: self.product.id,
            product_name: self.product.name.clone(),
            product_type: self.product.product_type,
            unit_price: self.product.price,
            quantity: self.quantity,
        })
    }
}
