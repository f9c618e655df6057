use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::errors::DomainError;

status_enum!(
    PaymentStatus, "payment status" {
        Pending => "pending",
        Paid => "paid",
        Failed => "failed",
        Refunded => "refunded",
        PartialRefund => "partial_refund",
    }
);

status_enum!(
    OrderStatus, "order status" {
        Pending => "pending",
        Confirmed => "confirmed",
        Processing => "processing",
        Shipped => "shipped",
        Completed => "completed",
        Cancelled => "cancelled",
        Refunded => "refunded",
    }
);

status_enum!(
    ProductType, "product type" {
        Digital => "digital",
        Physical => "physical",
    }
);

impl OrderStatus {
    /// Fulfilment steps an operator may drive. Payment-driven changes
    /// (pending → confirmed, → refunded) go through the reconciler instead.
    pub fn can_advance_to(self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (OrderStatus::Confirmed, OrderStatus::Processing)
                | (OrderStatus::Processing, OrderStatus::Shipped)
                | (OrderStatus::Shipped, OrderStatus::Completed)
        )
    }
}

impl PaymentStatus {
    /// Statuses from which money can still be returned to the buyer.
    pub fn is_refundable(self) -> bool {
        matches!(self, PaymentStatus::Paid | PaymentStatus::PartialRefund)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ShippingAddress {
    pub name: String,
    pub postal_code: String,
    pub address: String,
    pub phone: Option<String>,
}

impl ShippingAddress {
    fn validate(&self) -> Result<(), DomainError> {
        if self.name.trim().is_empty()
            || self.postal_code.trim().is_empty()
            || self.address.trim().is_empty()
        {
            return Err(DomainError::invalid(
                "shipping name, postal code and address are required",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ShippingPolicy {
    pub flat_fee: i64,
    pub free_threshold: Option<i64>,
}

impl ShippingPolicy {
    /// Flat fee on every order, waived once the subtotal reaches the threshold.
    pub fn fee_for(&self, subtotal: i64) -> i64 {
        match self.free_threshold {
            Some(threshold) if subtotal >= threshold => 0,
            _ => self.flat_fee,
        }
    }
}

/// One cart line frozen at checkout time.
#[derive(Debug, Clone)]
pub struct OrderLineDraft {
    pub product_id: Uuid,
    pub product_name: String,
    pub product_type: ProductType,
    pub unit_price: i64,
    pub quantity: i32,
}

impl OrderLineDraft {
    pub fn subtotal(&self) -> i64 {
        self.unit_price * i64::from(self.quantity)
    }
}

/// An order that has been priced but not yet written. The ledger only
/// persists it once the gateway has issued a checkout session for it.
#[derive(Debug, Clone)]
pub struct OrderDraft {
    pub id: Uuid,
    pub member_id: Uuid,
    pub lines: Vec<OrderLineDraft>,
    pub subtotal: i64,
    pub shipping_fee: i64,
    pub total: i64,
    pub shipping: Option<ShippingAddress>,
}

impl OrderDraft {
    pub fn new(
        member_id: Uuid,
        lines: Vec<OrderLineDraft>,
        shipping: Option<ShippingAddress>,
        policy: &ShippingPolicy,
    ) -> Result<Self, DomainError> {
        if lines.is_empty() {
            return Err(DomainError::policy("your cart is empty"));
        }
        if let Some(line) = lines.iter().find(|l| l.quantity <= 0 || l.unit_price < 0) {
            return Err(DomainError::invalid(format!(
                "invalid quantity or price for '{}'",
                line.product_name
            )));
        }

        let has_physical = lines
            .iter()
            .any(|l| l.product_type == ProductType::Physical);
        let shipping = if has_physical {
            let address = shipping.ok_or_else(|| {
                DomainError::invalid("a shipping address is required for physical items")
            })?;
            address.validate()?;
            Some(address)
        } else {
            None
        };

        let subtotal: i64 = lines.iter().map(OrderLineDraft::subtotal).sum();
        let shipping_fee = policy.fee_for(subtotal);

        Ok(Self {
            id: Uuid::new_v4(),
            member_id,
            lines,
            subtotal,
            shipping_fee,
            total: subtotal + shipping_fee,
            shipping,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderItemView {
    pub id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub product_type: ProductType,
    pub unit_price: i64,
    pub quantity: i32,
    pub subtotal: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderView {
    pub id: Uuid,
    pub member_id: Uuid,
    pub subtotal: i64,
    pub shipping_fee: i64,
    pub total: i64,
    pub payment_status: PaymentStatus,
    pub order_status: OrderStatus,
    pub checkout_session_id: Option<String>,
    pub payment_intent_id: Option<String>,
    pub refund_amount: i64,
    pub external_refund_id: Option<String>,
    pub failure_reason: Option<String>,
    pub tracking_number: Option<String>,
    pub shipping: Option<ShippingAddress>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub items: Vec<OrderItemView>,
}

#[derive(Debug, Clone)]
pub struct ListResult {
    pub items: Vec<OrderView>,
    pub total: i64,
}

/// Absolute refund state reported by the gateway for one charge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundRecord {
    pub amount_refunded: i64,
    pub charge_amount: i64,
    pub refund_id: Option<String>,
}

impl RefundRecord {
    pub fn payment_status(&self) -> PaymentStatus {
        if self.amount_refunded >= self.charge_amount {
            PaymentStatus::Refunded
        } else {
            PaymentStatus::PartialRefund
        }
    }
}

/// An operator-issued refund that passed validation and may be sent to the gateway.
#[derive(Debug, Clone)]
pub struct OrderRefundPlan {
    pub order_id: Uuid,
    pub payment_reference: String,
    pub amount: i64,
    pub already_refunded: i64,
    pub total: i64,
}

impl OrderRefundPlan {
    pub fn for_order(order: &OrderView, amount: Option<i64>) -> Result<Self, DomainError> {
        if !order.payment_status.is_refundable() {
            return Err(DomainError::policy(format!(
                "an order with payment status '{}' cannot be refunded",
                order.payment_status
            )));
        }
        let payment_reference = order
            .payment_intent_id
            .clone()
            .filter(|r| !r.is_empty())
            .ok_or_else(|| DomainError::policy("order has no payment reference to refund"))?;

        let remaining = order.total - order.refund_amount;
        let amount = amount.unwrap_or(remaining);
        if amount <= 0 {
            return Err(DomainError::invalid("refund amount must be positive"));
        }
        if amount > remaining {
            return Err(DomainError::policy(format!(
                "refund amount {amount} exceeds the refundable balance {remaining}"
            )));
        }

        Ok(Self {
            order_id: order.id,
            payment_reference,
            amount,
            already_refunded: order.refund_amount,
            total: order.total,
        })
    }

    pub fn record(&self, refund_id: String) -> RefundRecord {
        RefundRecord {
            amount_refunded: self.already_refunded + self.amount,
            charge_amount: self.total,
            refund_id: Some(refund_id),
        }
    }
}


#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::fixtures::{address, line, paid_order};
    use super::*;

    const POLICY: ShippingPolicy = ShippingPolicy {
        flat_fee: 500,
        free_threshold: None,
    };

    #[test]
    fn draft_totals_sum_lines_and_shipping() {
        let draft = OrderDraft::new(
            Uuid::new_v4(),
            vec![
                line(ProductType::Physical, 1000, 2),
                line(ProductType::Digital, 1000, 1),
            ],
            Some(address()),
            &POLICY,
        )
        .expect("valid draft");

        let line_sum: i64 = draft.lines.iter().map(OrderLineDraft::subtotal).sum();
        assert_eq!(line_sum, draft.subtotal);
        assert_eq!(draft.subtotal, 3000);
        assert_eq!(draft.shipping_fee, 500);
        assert_eq!(draft.total, draft.subtotal + draft.shipping_fee);
    }

    #[test]
    fn digital_only_orders_pay_shipping_but_need_no_address() {
        let draft = OrderDraft::new(
            Uuid::new_v4(),
            vec![line(ProductType::Digital, 3000, 1)],
            None,
            &POLICY,
        )
        .expect("valid draft");

        assert_eq!(draft.shipping_fee, 500);
        assert_eq!(draft.total, 3500);
        assert!(draft.shipping.is_none());
    }

    #[test]
    fn physical_items_require_an_address() {
        let err = OrderDraft::new(
            Uuid::new_v4(),
            vec![line(ProductType::Physical, 800, 1)],
            None,
            &POLICY,
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::InvalidInput(_)));
    }

    #[test]
    fn empty_cart_is_rejected() {
        let err = OrderDraft::new(Uuid::new_v4(), vec![], None, &POLICY).unwrap_err();
        assert_eq!(err.to_string(), "your cart is empty");
    }

    #[test]
    fn free_shipping_threshold_applies() {
        let policy = ShippingPolicy {
            flat_fee: 500,
            free_threshold: Some(5000),
        };
        assert_eq!(policy.fee_for(4999), 500);
        assert_eq!(policy.fee_for(5000), 0);
    }

    #[test]
    fn fulfilment_only_moves_forward() {
        assert!(OrderStatus::Confirmed.can_advance_to(OrderStatus::Processing));
        assert!(OrderStatus::Processing.can_advance_to(OrderStatus::Shipped));
        assert!(OrderStatus::Shipped.can_advance_to(OrderStatus::Completed));
        assert!(!OrderStatus::Pending.can_advance_to(OrderStatus::Processing));
        assert!(!OrderStatus::Shipped.can_advance_to(OrderStatus::Processing));
        assert!(!OrderStatus::Refunded.can_advance_to(OrderStatus::Completed));
    }

    #[test]
    fn stored_status_values_are_stable() {
        let stored: Vec<&str> = PaymentStatus::ALL.iter().map(|s| s.as_str()).collect();
        assert_eq!(
            stored,
            ["pending", "paid", "failed", "refunded", "partial_refund"]
        );
        let stored: Vec<&str> = OrderStatus::ALL.iter().map(|s| s.as_str()).collect();
        assert_eq!(
            stored,
            [
                "pending",
                "confirmed",
                "processing",
                "shipped",
                "completed",
                "cancelled",
                "refunded"
            ]
        );
        assert_eq!(
            PaymentStatus::from_str("partial_refund").unwrap(),
            PaymentStatus::PartialRefund
        );
        assert!(OrderStatus::from_str("lost").is_err());
    }

    #[test]
    fn partial_refund_keeps_partial_status() {
        let record = RefundRecord {
            amount_refunded: 4000,
            charge_amount: 10000,
            refund_id: Some("re_1".to_string()),
        };
        assert_eq!(record.payment_status(), PaymentStatus::PartialRefund);

        let full = RefundRecord {
            amount_refunded: 10000,
            ..record
        };
        assert_eq!(full.payment_status(), PaymentStatus::Refunded);
    }

    #[test]
    fn refund_plan_caps_at_remaining_balance() {
        let mut order = paid_order(10000);
        order.refund_amount = 4000;
        order.payment_status = PaymentStatus::PartialRefund;

        let plan = OrderRefundPlan::for_order(&order, None).expect("plan");
        assert_eq!(plan.amount, 6000);
        assert_eq!(plan.record("re_2".into()).amount_refunded, 10000);

        let err = OrderRefundPlan::for_order(&order, Some(6001)).unwrap_err();
        assert!(matches!(err, DomainError::PolicyViolation(_)));
    }

    #[test]
    fn unpaid_orders_cannot_be_refunded() {
        let mut order = paid_order(10000);
        order.payment_status = PaymentStatus::Pending;
        assert!(OrderRefundPlan::for_order(&order, Some(100)).is_err());
    }
}
