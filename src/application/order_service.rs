use uuid::Uuid;

use crate::domain::actor::Actor;
use crate::domain::errors::DomainError;
use crate::domain::order::{ListResult, OrderRefundPlan, OrderStatus, OrderView};
use crate::domain::ports::OrderLedger;

pub struct OrderService<L> {
    ledger: L,
}

impl<L: OrderLedger> OrderService<L> {
    pub fn new(ledger: L) -> Self {
        Self { ledger }
    }

    /// Members see their own orders; admins see all of them.
    pub fn get_order(&self, actor: &Actor, id: Uuid) -> Result<OrderView, DomainError> {
        let order = self
            .ledger
            .find_by_id(id)?
            .ok_or(DomainError::NotFound("Order"))?;
        match actor {
            Actor::Admin(_) => Ok(order),
            Actor::Member(member_id) if *member_id == order.member_id => Ok(order),
            _ => Err(DomainError::NotFound("Order")),
        }
    }

    pub fn list_orders(
        &self,
        member_id: Uuid,
        page: i64,
        limit: i64,
    ) -> Result<ListResult, DomainError> {
        self.ledger.list_for_member(member_id, page, limit)
    }

    pub fn advance_status(
        &self,
        id: Uuid,
        to: OrderStatus,
        tracking_number: Option<&str>,
    ) -> Result<OrderView, DomainError> {
        let order = self
            .ledger
            .find_by_id(id)?
            .ok_or(DomainError::NotFound("Order"))?;

        if to == OrderStatus::Cancelled {
            if !self.ledger.cancel_unpaid(id)? {
                return Err(DomainError::policy(
                    "only unpaid orders can be cancelled; refund paid orders instead",
                ));
            }
        } else {
            if !order.order_status.can_advance_to(to) {
                return Err(DomainError::InvalidTransition {
                    from: order.order_status.as_str(),
                    action: advance_label(to),
                });
            }
            if !self
                .ledger
                .advance_status(id, order.order_status, to, tracking_number)?
            {
                return Err(DomainError::policy(
                    "the order changed in the meantime; reload and try again",
                ));
            }
        }

        log::info!("order {} moved {} -> {}", id, order.order_status, to);
        self.ledger
            .find_by_id(id)?
            .ok_or(DomainError::NotFound("Order"))
    }

    pub fn plan_refund(&self, id: Uuid, amount: Option<i64>) -> Result<OrderRefundPlan, DomainError> {
        let order = self
            .ledger
            .find_by_id(id)?
            .ok_or(DomainError::NotFound("Order"))?;
        OrderRefundPlan::for_order(&order, amount)
    }
}

fn advance_label(to: OrderStatus) -> &'static str {
    match to {
        OrderStatus::Processing => "start processing",
        OrderStatus::Shipped => "ship",
        OrderStatus::Completed => "complete",
        OrderStatus::Cancelled => "cancel",
        OrderStatus::Refunded => "mark refunded",
        OrderStatus::Pending | OrderStatus::Confirmed => "reset",
    }
}
