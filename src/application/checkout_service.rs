use uuid::Uuid;

use crate::domain::errors::DomainError;
use crate::domain::order::{OrderDraft, OrderView, ShippingAddress, ShippingPolicy};
use crate::domain::payment::{CheckoutLine, CheckoutRequest, CheckoutSession, PaymentSubject};
use crate::domain::ports::{CartRepository, OrderLedger};

/// Where the hosted checkout page sends the buyer afterwards.
#[derive(Debug, Clone)]
pub struct CheckoutUrls {
    pub success_url: String,
    pub cancel_url: String,
}

/// Cart → priced draft → (gateway session) → persisted pending order.
///
/// Nothing is written until the gateway has issued a session, so a failed
/// or timed-out gateway call leaves no ledger rows behind.
pub struct CheckoutService<C, L> {
    cart: C,
    ledger: L,
    shipping: ShippingPolicy,
}

impl<C: CartRepository, L: OrderLedger> CheckoutService<C, L> {
    pub fn new(cart: C, ledger: L, shipping: ShippingPolicy) -> Self {
        Self {
            cart,
            ledger,
            shipping,
        }
    }

    pub fn prepare(
        &self,
        member_id: Uuid,
        shipping: Option<ShippingAddress>,
    ) -> Result<OrderDraft, DomainError> {
        let lines = self
            .cart
            .lines(member_id)?
            .iter()
            .map(|line| line.to_order_line())
            .collect::<Result<Vec<_>, _>>()?;

        OrderDraft::new(member_id, lines, shipping, &self.shipping)
    }

    pub fn place(
        &self,
        draft: &OrderDraft,
        session: &CheckoutSession,
    ) -> Result<OrderView, DomainError> {
        let order = self.ledger.place_order(draft, session)?;
        log::info!(
            "order {} placed for member {} (total {}, session {})",
            order.id,
            order.member_id,
            order.total,
            session.session_id
        );
        Ok(order)
    }
}

pub fn checkout_request(draft: &OrderDraft, currency: &str, urls: CheckoutUrls) -> CheckoutRequest {
    let mut lines: Vec<CheckoutLine> = draft
        .lines
        .iter()
        .map(|l| CheckoutLine {
            name: l.product_name.clone(),
            unit_amount: l.unit_price,
            quantity: l.quantity,
        })
        .collect();
    if draft.shipping_fee > 0 {
        lines.push(CheckoutLine {
            name: "Shipping".to_string(),
            unit_amount: draft.shipping_fee,
            quantity: 1,
        });
    }

    CheckoutRequest {
        subject: PaymentSubject::Order(draft.id),
        lines,
        currency: currency.to_string(),
        success_url: urls.success_url,
        cancel_url: urls.cancel_url,
    }
}
