use uuid::Uuid;

use crate::domain::cart::CartLine;
use crate::domain::errors::DomainError;
use crate::domain::order::ProductType;
use crate::domain::ports::{BookshelfRepository, CartRepository};

pub struct CartService<C, B> {
    cart: C,
    bookshelf: B,
}

#[derive(Debug, Clone)]
pub struct CartSummary {
    pub lines: Vec<CartLine>,
    pub subtotal: i64,
}

impl<C: CartRepository, B: BookshelfRepository> CartService<C, B> {
    pub fn new(cart: C, bookshelf: B) -> Self {
        Self { cart, bookshelf }
    }

    pub fn set_quantity(
        &self,
        member_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<CartSummary, DomainError> {
        let product = self
            .cart
            .find_product(product_id)?
            .ok_or(DomainError::NotFound("Product"))?;

        if product.product_type == ProductType::Digital
            && self.bookshelf.owns(member_id, product_id)?
        {
            return Err(DomainError::policy(format!(
                "'{}' is already in your bookshelf",
                product.name
            )));
        }
        product.ensure_available(quantity)?;

        self.cart.upsert_item(member_id, product_id, quantity)?;
        self.summary(member_id)
    }

    pub fn remove(&self, member_id: Uuid, product_id: Uuid) -> Result<CartSummary, DomainError> {
        if !self.cart.remove_item(member_id, product_id)? {
            return Err(DomainError::NotFound("Cart item"));
        }
        self.summary(member_id)
    }

    pub fn summary(&self, member_id: Uuid) -> Result<CartSummary, DomainError> {
        let lines = self.cart.lines(member_id)?;
        let subtotal = lines.iter().map(CartLine::subtotal).sum();
        Ok(CartSummary { lines, subtotal })
    }
}
