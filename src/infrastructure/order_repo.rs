use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde_json::json;
use uuid::Uuid;

use crate::db::DbPool;
use crate::domain::errors::DomainError;
use crate::domain::order::{
    ListResult, OrderDraft, OrderStatus, OrderView, PaymentStatus, ProductType, RefundRecord,
};
use crate::domain::payment::{CheckoutSession, Completion};
use crate::domain::ports::OrderLedger;
use crate::schema::{cart_items, order_items, orders};

use super::models::{NewOrderItemRow, NewOrderRow, OrderItemRow, OrderRow};
use super::outbox::{record_event, ORDER_AGGREGATE};
use super::{bookshelf, inventory};

pub struct DieselOrderLedger {
    pool: DbPool,
}

impl DieselOrderLedger {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn load_view(conn: &mut PgConnection, order_id: Uuid) -> Result<Option<OrderView>, DomainError> {
    let order = orders::table
        .find(order_id)
        .select(OrderRow::as_select())
        .first(conn)
        .optional()?;

    let Some(order) = order else {
        return Ok(None);
    };

    let items = OrderItemRow::belonging_to(&order)
        .select(OrderItemRow::as_select())
        .order((order_items::created_at.asc(), order_items::id.asc()))
        .load(conn)?;

    order.into_view(items).map(Some)
}

fn lock_order(conn: &mut PgConnection, order_id: Uuid) -> Result<Option<OrderRow>, DomainError> {
    Ok(orders::table
        .find(order_id)
        .select(OrderRow::as_select())
        .for_update()
        .first(conn)
        .optional()?)
}

impl OrderLedger for DieselOrderLedger {
    fn place_order(
        &self,
        draft: &OrderDraft,
        session: &CheckoutSession,
    ) -> Result<OrderView, DomainError> {
        let mut conn = self.pool.get()?;

        conn.transaction::<_, DomainError, _>(|conn| {
            // 1. Insert the order with its shipping snapshot
            let shipping = draft.shipping.as_ref();
            diesel::insert_into(orders::table)
                .values(&NewOrderRow {
                    id: draft.id,
                    member_id: draft.member_id,
                    subtotal: draft.subtotal,
                    shipping_fee: draft.shipping_fee,
                    total: draft.total,
                    payment_status: PaymentStatus::Pending.to_string(),
                    order_status: OrderStatus::Pending.to_string(),
                    checkout_session_id: Some(session.session_id.clone()),
                    shipping_name: shipping.map(|s| s.name.clone()),
                    shipping_postal_code: shipping.map(|s| s.postal_code.clone()),
                    shipping_address: shipping.map(|s| s.address.clone()),
                    shipping_phone: shipping.and_then(|s| s.phone.clone()),
                })
                .execute(conn)?;

            // 2. Insert the item snapshots
            let new_items: Vec<NewOrderItemRow> = draft
                .lines
                .iter()
                .map(|l| NewOrderItemRow {
                    id: Uuid::new_v4(),
                    order_id: draft.id,
                    product_id: l.product_id,
                    product_name: l.product_name.clone(),
                    product_type: l.product_type.to_string(),
                    unit_price: l.unit_price,
                    quantity: l.quantity,
                    subtotal: l.subtotal(),
                })
                .collect();
            diesel::insert_into(order_items::table)
                .values(&new_items)
                .execute(conn)?;

            // 3. Outbox event in the same transaction
            record_event(
                conn,
                ORDER_AGGREGATE,
                draft.id,
                "OrderPlaced",
                json!({
                    "order_id": draft.id,
                    "member_id": draft.member_id,
                    "total": draft.total,
                    "checkout_session_id": session.session_id,
                }),
            )?;

            load_view(conn, draft.id)?.ok_or(DomainError::NotFound("Order"))
        })
    }

    fn find_by_id(&self, id: Uuid) -> Result<Option<OrderView>, DomainError> {
        let mut conn = self.pool.get()?;
        load_view(&mut conn, id)
    }

    fn find_id_by_payment_intent(&self, payment_intent: &str) -> Result<Option<Uuid>, DomainError> {
        let mut conn = self.pool.get()?;

        Ok(orders::table
            .filter(orders::payment_intent_id.eq(payment_intent))
            .select(orders::id)
            .first(&mut conn)
            .optional()?)
    }

    fn list_for_member(
        &self,
        member_id: Uuid,
        page: i64,
        limit: i64,
    ) -> Result<ListResult, DomainError> {
        let mut conn = self.pool.get()?;

        let offset = (page.max(1) - 1)
            .checked_mul(limit)
            .ok_or_else(|| DomainError::invalid("page is out of range"))?;
        conn.transaction::<_, DomainError, _>(|conn| {
            let total: i64 = orders::table
                .filter(orders::member_id.eq(member_id))
                .count()
                .get_result(conn)?;

            let rows = orders::table
                .filter(orders::member_id.eq(member_id))
                .select(OrderRow::as_select())
                .order(orders::created_at.desc())
                .limit(limit)
                .offset(offset)
                .load(conn)?;

            let items = OrderItemRow::belonging_to(&rows)
                .select(OrderItemRow::as_select())
                .load(conn)?
                .grouped_by(&rows);

            Ok(ListResult {
                items: rows
                    .into_iter()
                    .zip(items)
                    .map(|(order, items)| order.into_view(items))
                    .collect::<Result<_, _>>()?,
                total,
            })
        })
    }

    fn complete_order(
        &self,
        order_id: Uuid,
        payment_reference: &str,
        paid_at: DateTime<Utc>,
    ) -> Result<Completion<OrderView>, DomainError> {
        let mut conn = self.pool.get()?;

        conn.transaction::<_, DomainError, _>(|conn| {
            // 1. Lock the order; only a pending order may be finalised
            let Some(order) = lock_order(conn, order_id)? else {
                return Ok(Completion::NotFound);
            };
            if order.payment_status != PaymentStatus::Pending.as_str() {
                return Ok(Completion::AlreadyCompleted);
            }

            diesel::update(orders::table.find(order_id))
                .set((
                    orders::payment_status.eq(PaymentStatus::Paid.as_str()),
                    orders::order_status.eq(OrderStatus::Confirmed.as_str()),
                    orders::payment_intent_id.eq(payment_reference),
                    orders::paid_at.eq(paid_at),
                    orders::updated_at.eq(paid_at),
                ))
                .execute(conn)?;

            // 2. Fulfil each item: digital goes to the bookshelf, physical
            //    leaves the stock
            let view = load_view(conn, order_id)?.ok_or(DomainError::NotFound("Order"))?;
            let mut granted = 0;
            for item in &view.items {
                match item.product_type {
                    ProductType::Digital => {
                        if bookshelf::grant(conn, view.member_id, item.product_id, view.id)? {
                            granted += 1;
                        }
                    }
                    ProductType::Physical => {
                        inventory::decrement_stock(conn, item.product_id, item.quantity)?;
                    }
                }
            }

            // 3. Empty the purchaser's cart
            diesel::delete(cart_items::table.filter(cart_items::member_id.eq(view.member_id)))
                .execute(conn)?;

            record_event(
                conn,
                ORDER_AGGREGATE,
                order_id,
                "OrderPaid",
                json!({
                    "order_id": order_id,
                    "payment_reference": payment_reference,
                    "total": view.total,
                    "bookshelf_grants": granted,
                }),
            )?;

            Ok(Completion::Completed(view))
        })
    }

    fn mark_payment_failed(
        &self,
        order_id: Uuid,
        reason: Option<&str>,
    ) -> Result<Option<OrderView>, DomainError> {
        let mut conn = self.pool.get()?;

        conn.transaction::<_, DomainError, _>(|conn| {
            let updated = diesel::update(
                orders::table
                    .filter(orders::id.eq(order_id))
                    .filter(orders::payment_status.eq(PaymentStatus::Pending.as_str())),
            )
            .set((
                orders::payment_status.eq(PaymentStatus::Failed.as_str()),
                orders::failure_reason.eq(reason),
                orders::updated_at.eq(Utc::now()),
            ))
            .execute(conn)?;
            if updated == 0 {
                return Ok(None);
            }

            record_event(
                conn,
                ORDER_AGGREGATE,
                order_id,
                "OrderPaymentFailed",
                json!({ "order_id": order_id, "reason": reason }),
            )?;
            load_view(conn, order_id)
        })
    }

    fn record_refund(
        &self,
        order_id: Uuid,
        refund: &RefundRecord,
    ) -> Result<Option<OrderView>, DomainError> {
        let mut conn = self.pool.get()?;

        conn.transaction::<_, DomainError, _>(|conn| {
            let Some(order) = lock_order(conn, order_id)? else {
                return Ok(None);
            };
            let status: PaymentStatus = super::parse_column(&order.payment_status)?;
            // refund state only moves forward; replays and stale events are ignored
            if !status.is_refundable() || refund.amount_refunded <= order.refund_amount {
                return Ok(None);
            }

            let amount = refund.amount_refunded.min(order.total);
            let payment_status = if amount >= order.total {
                PaymentStatus::Refunded
            } else {
                refund.payment_status()
            };
            diesel::update(orders::table.find(order_id))
                .set((
                    orders::refund_amount.eq(amount),
                    orders::payment_status.eq(payment_status.as_str()),
                    orders::order_status.eq(OrderStatus::Refunded.as_str()),
                    orders::external_refund_id
                        .eq(refund.refund_id.as_deref().or(order.external_refund_id.as_deref())),
                    orders::updated_at.eq(Utc::now()),
                ))
                .execute(conn)?;

            record_event(
                conn,
                ORDER_AGGREGATE,
                order_id,
                "OrderRefunded",
                json!({
                    "order_id": order_id,
                    "refund_amount": amount,
                    "payment_status": payment_status,
                }),
            )?;
            load_view(conn, order_id)
        })
    }

    fn advance_status(
        &self,
        order_id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
        tracking_number: Option<&str>,
    ) -> Result<bool, DomainError> {
        let mut conn = self.pool.get()?;

        conn.transaction::<_, DomainError, _>(|conn| {
            let target = orders::table
                .filter(orders::id.eq(order_id))
                .filter(orders::order_status.eq(from.as_str()));
            let now = Utc::now();
            let updated = match tracking_number {
                Some(tracking) => diesel::update(target)
                    .set((
                        orders::order_status.eq(to.as_str()),
                        orders::tracking_number.eq(tracking),
                        orders::updated_at.eq(now),
                    ))
                    .execute(conn)?,
                None => diesel::update(target)
                    .set((
                        orders::order_status.eq(to.as_str()),
                        orders::updated_at.eq(now),
                    ))
                    .execute(conn)?,
            };
            if updated == 0 {
                return Ok(false);
            }

            record_event(
                conn,
                ORDER_AGGREGATE,
                order_id,
                "OrderStatusChanged",
                json!({ "order_id": order_id, "from": from, "to": to }),
            )?;
            Ok(true)
        })
    }

    fn cancel_unpaid(&self, order_id: Uuid) -> Result<bool, DomainError> {
        let mut conn = self.pool.get()?;

        conn.transaction::<_, DomainError, _>(|conn| {
            let updated = diesel::update(
                orders::table
                    .filter(orders::id.eq(order_id))
                    .filter(orders::payment_status.eq(PaymentStatus::Pending.as_str())),
            )
            .set((
                orders::order_status.eq(OrderStatus::Cancelled.as_str()),
                orders::payment_status.eq(PaymentStatus::Failed.as_str()),
                orders::updated_at.eq(Utc::now()),
            ))
            .execute(conn)?;
            if updated == 0 {
                return Ok(false);
            }

            record_event(
                conn,
                ORDER_AGGREGATE,
                order_id,
                "OrderCancelled",
                json!({ "order_id": order_id }),
            )?;
            Ok(true)
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Barrier};

    use diesel::prelude::*;
    use uuid::Uuid;

    use super::DieselOrderLedger;
    use crate::application::notifications::fakes::RecordingNotifier;
    use crate::application::notifications::NotificationDispatcher;
    use crate::application::order_reconciler::OrderReconciler;
    use crate::application::service_transactions::ServiceTransactionService;
    use crate::application::webhook_processor::{WebhookOutcome, WebhookProcessor};
    use crate::db::DbPool;
    use crate::domain::errors::DomainError;
    use crate::domain::order::{
        OrderDraft, OrderLineDraft, OrderStatus, PaymentStatus, ProductType, RefundRecord,
        ShippingAddress, ShippingPolicy,
    };
    use crate::domain::payment::{
        CheckoutSession, Completion, PaymentSubject, SessionStatus, WebhookEvent, WebhookEventKind,
    };
    use crate::domain::ports::OrderLedger;
    use crate::infrastructure::models::{OutboxEventRow, ProductRow};
    use crate::infrastructure::service_repo::DieselServiceTransactionRepository;
    use crate::infrastructure::test_support::{seed_cart_item, seed_product, setup_db};
    use crate::infrastructure::webhook_events::DieselWebhookEventLog;
    use crate::schema::{bookshelf_entries, cart_items, commerce_outbox, products};

    fn session(id: &str) -> CheckoutSession {
        CheckoutSession {
            session_id: id.to_string(),
            redirect_url: format!("https://checkout.test/{id}"),
        }
    }

    fn line(product: &ProductRow, quantity: i32) -> OrderLineDraft {
        OrderLineDraft {
            product_id: product.id,
            product_name: product.name.clone(),
            product_type: product.product_type.parse().expect("product type"),
            unit_price: product.price,
            quantity,
        }
    }

    fn address() -> ShippingAddress {
        ShippingAddress {
            name: "Aiko Tanaka".to_string(),
            postal_code: "150-0001".to_string(),
            address: "1-2-3 Jingumae, Shibuya".to_string(),
            phone: None,
        }
    }

    fn policy() -> ShippingPolicy {
        ShippingPolicy {
            flat_fee: 500,
            free_threshold: None,
        }
    }

    fn reconciler(pool: &DbPool) -> OrderReconciler<DieselOrderLedger> {
        OrderReconciler::new(
            DieselOrderLedger::new(pool.clone()),
            NotificationDispatcher::new(Arc::new(RecordingNotifier::default())),
        )
    }

    fn webhooks(
        pool: &DbPool,
    ) -> WebhookProcessor<DieselOrderLedger, DieselServiceTransactionRepository, DieselWebhookEventLog>
    {
        let dispatcher = NotificationDispatcher::new(Arc::new(RecordingNotifier::default()));
        WebhookProcessor::new(
            OrderReconciler::new(DieselOrderLedger::new(pool.clone()), dispatcher.clone()),
            ServiceTransactionService::new(
                DieselServiceTransactionRepository::new(pool.clone()),
                dispatcher,
                chrono::Duration::days(7),
            ),
            DieselWebhookEventLog::new(pool.clone()),
        )
    }

    fn session_completed(event_id: &str, session_id: &str, order_id: Uuid) -> WebhookEvent {
        WebhookEvent {
            id: event_id.to_string(),
            event_type: "checkout.session.completed".to_string(),
            kind: WebhookEventKind::CheckoutSessionCompleted {
                session_id: session_id.to_string(),
                payment_intent: Some(format!("pi_{session_id}")),
                paid: true,
                subject: Some(PaymentSubject::Order(order_id)),
            },
        }
    }

    fn count_bookshelf(pool: &DbPool, member: Uuid) -> i64 {
        let mut conn = pool.get().expect("connection");
        bookshelf_entries::table
            .filter(bookshelf_entries::member_id.eq(member))
            .count()
            .get_result(&mut conn)
            .expect("count")
    }

    fn count_cart(pool: &DbPool, member: Uuid) -> i64 {
        let mut conn = pool.get().expect("connection");
        cart_items::table
            .filter(cart_items::member_id.eq(member))
            .count()
            .get_result(&mut conn)
            .expect("count")
    }

    #[tokio::test]
    async fn place_and_find_keeps_totals_consistent() {
        let (_container, pool) = setup_db().await;
        let zine = seed_product(&pool, "Zine", ProductType::Physical, 1500, 10);
        let ebook = seed_product(&pool, "Ebook", ProductType::Digital, 800, 0);
        let ledger = DieselOrderLedger::new(pool);
        let member = Uuid::new_v4();

        let draft = OrderDraft::new(
            member,
            vec![line(&zine, 2), line(&ebook, 1)],
            Some(address()),
            &policy(),
        )
        .expect("draft");
        let placed = ledger.place_order(&draft, &session("cs_1")).expect("place");

        assert_eq!(placed.payment_status, PaymentStatus::Pending);
        assert_eq!(placed.subtotal, 3800);
        assert_eq!(placed.total, placed.subtotal + placed.shipping_fee);
        let item_sum: i64 = placed.items.iter().map(|i| i.subtotal).sum();
        assert_eq!(item_sum, placed.subtotal);
        assert_eq!(placed.shipping, Some(address()));

        let found = ledger
            .find_by_id(placed.id)
            .expect("find")
            .expect("order should exist");
        assert_eq!(found, placed);
    }

    #[tokio::test]
    async fn completion_grants_and_decrements_exactly_once() {
        let (_container, pool) = setup_db().await;
        let zine = seed_product(&pool, "Zine", ProductType::Physical, 3000, 3);
        let ebook = seed_product(&pool, "Ebook", ProductType::Digital, 800, 0);
        let member = Uuid::new_v4();
        seed_cart_item(&pool, member, zine.id, 1);
        seed_cart_item(&pool, member, ebook.id, 1);
        let ledger = DieselOrderLedger::new(pool.clone());

        let draft = OrderDraft::new(
            member,
            vec![line(&zine, 1), line(&ebook, 1)],
            Some(address()),
            &policy(),
        )
        .expect("draft");
        let placed = ledger.place_order(&draft, &session("cs_2")).expect("place");

        let first = ledger
            .complete_order(placed.id, "pi_2", chrono::Utc::now())
            .expect("first completion");
        let second = ledger
            .complete_order(placed.id, "pi_2", chrono::Utc::now())
            .expect("second completion");

        let Completion::Completed(paid) = first else {
            panic!("first completion should win");
        };
        assert_eq!(paid.payment_status, PaymentStatus::Paid);
        assert_eq!(paid.order_status, OrderStatus::Confirmed);
        assert_eq!(paid.total, 3800 + 500);
        assert_eq!(second, Completion::AlreadyCompleted);

        let mut conn = pool.get().expect("connection");
        let entries: i64 = bookshelf_entries::table
            .filter(bookshelf_entries::member_id.eq(member))
            .count()
            .get_result(&mut conn)
            .expect("count");
        assert_eq!(entries, 1);

        let (stock, out_of_stock): (i32, bool) = products::table
            .find(zine.id)
            .select((products::stock, products::is_out_of_stock))
            .first(&mut conn)
            .expect("product");
        assert_eq!((stock, out_of_stock), (2, false));

        let left_in_cart: i64 = cart_items::table
            .filter(cart_items::member_id.eq(member))
            .count()
            .get_result(&mut conn)
            .expect("count");
        assert_eq!(left_in_cart, 0);
    }

    #[tokio::test]
    async fn racing_completions_finalise_once() {
        let (_container, pool) = setup_db().await;
        let zine = seed_product(&pool, "Zine", ProductType::Physical, 3000, 3);
        let ebook = seed_product(&pool, "Ebook", ProductType::Digital, 800, 0);
        let member = Uuid::new_v4();
        let ledger = DieselOrderLedger::new(pool.clone());

        let draft = OrderDraft::new(
            member,
            vec![line(&zine, 1), line(&ebook, 1)],
            Some(address()),
            &policy(),
        )
        .expect("draft");
        let order_id = ledger.place_order(&draft, &session("cs_race")).expect("place").id;

        let barrier = Barrier::new(2);
        let outcomes: Vec<Completion<_>> = std::thread::scope(|scope| {
            let handles: Vec<_> = ["pi_redirect", "pi_webhook"]
                .into_iter()
                .map(|reference| {
                    let (ledger, barrier) = (&ledger, &barrier);
                    scope.spawn(move || {
                        barrier.wait();
                        ledger
                            .complete_order(order_id, reference, chrono::Utc::now())
                            .expect("completion")
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().expect("completion thread panicked"))
                .collect()
        });

        let won = outcomes
            .iter()
            .filter(|o| matches!(o, Completion::Completed(_)))
            .count();
        let lost = outcomes
            .iter()
            .filter(|o| matches!(o, Completion::AlreadyCompleted))
            .count();
        assert_eq!((won, lost), (1, 1));
        assert_eq!(count_bookshelf(&pool, member), 1);

        let mut conn = pool.get().expect("connection");
        let stock: i32 = products::table
            .find(zine.id)
            .select(products::stock)
            .first(&mut conn)
            .expect("product");
        assert_eq!(stock, 2);
    }

    #[tokio::test]
    async fn webhook_after_redirect_changes_nothing() {
        let (_container, pool) = setup_db().await;
        let ebook = seed_product(&pool, "Ebook", ProductType::Digital, 800, 0);
        let member = Uuid::new_v4();
        let ledger = DieselOrderLedger::new(pool.clone());
        let draft =
            OrderDraft::new(member, vec![line(&ebook, 1)], None, &policy()).expect("draft");
        let placed = ledger.place_order(&draft, &session("cs_redirect")).expect("place");

        let redirected = reconciler(&pool)
            .complete_from_redirect(
                placed.id,
                &SessionStatus {
                    session_id: "cs_redirect".to_string(),
                    paid: true,
                    payment_intent: Some("pi_cs_redirect".to_string()),
                    subject: Some(PaymentSubject::Order(placed.id)),
                },
            )
            .expect("redirect");
        assert!(matches!(redirected, Some(Completion::Completed(_))));

        let outcome = webhooks(&pool)
            .process(&session_completed("evt_after_redirect", "cs_redirect", placed.id))
            .expect("webhook");
        assert_eq!(outcome, WebhookOutcome::Ignored);

        let paid = ledger.find_by_id(placed.id).expect("find").expect("exists");
        assert_eq!(paid.payment_status, PaymentStatus::Paid);
        assert_eq!(paid.payment_intent_id.as_deref(), Some("pi_cs_redirect"));
        assert_eq!(count_bookshelf(&pool, member), 1);
    }

    #[tokio::test]
    async fn digital_purchase_paid_by_webhook() {
        let (_container, pool) = setup_db().await;
        let artbook = seed_product(&pool, "Artbook", ProductType::Digital, 3000, 0);
        let member = Uuid::new_v4();
        seed_cart_item(&pool, member, artbook.id, 1);
        let ledger = DieselOrderLedger::new(pool.clone());

        let draft =
            OrderDraft::new(member, vec![line(&artbook, 1)], None, &policy()).expect("draft");
        let placed = ledger.place_order(&draft, &session("cs_artbook")).expect("place");
        assert_eq!(placed.total, 3500);

        let processor = webhooks(&pool);
        let event = session_completed("evt_artbook", "cs_artbook", placed.id);
        assert_eq!(processor.process(&event).expect("webhook"), WebhookOutcome::Applied);

        let paid = ledger.find_by_id(placed.id).expect("find").expect("exists");
        assert_eq!(paid.payment_status, PaymentStatus::Paid);
        assert_eq!(paid.order_status, OrderStatus::Confirmed);
        assert_eq!(paid.total, 3500);
        assert_eq!(count_bookshelf(&pool, member), 1);
        assert_eq!(count_cart(&pool, member), 0);

        assert_eq!(processor.process(&event).expect("replay"), WebhookOutcome::Duplicate);
        assert_eq!(count_bookshelf(&pool, member), 1);
    }

    #[tokio::test]
    async fn completion_empties_the_whole_cart() {
        let (_container, pool) = setup_db().await;
        let ebook = seed_product(&pool, "Ebook", ProductType::Digital, 800, 0);
        let poster = seed_product(&pool, "Poster", ProductType::Physical, 1200, 4);
        let member = Uuid::new_v4();
        let stranger = Uuid::new_v4();
        seed_cart_item(&pool, member, ebook.id, 1);
        // added after checkout, not part of the order
        seed_cart_item(&pool, member, poster.id, 2);
        seed_cart_item(&pool, stranger, poster.id, 1);
        let ledger = DieselOrderLedger::new(pool.clone());

        let draft =
            OrderDraft::new(member, vec![line(&ebook, 1)], None, &policy()).expect("draft");
        let placed = ledger.place_order(&draft, &session("cs_cart")).expect("place");
        ledger
            .complete_order(placed.id, "pi_cart", chrono::Utc::now())
            .expect("complete");

        assert_eq!(count_cart(&pool, member), 0);
        assert_eq!(count_cart(&pool, stranger), 1);
    }

    #[tokio::test]
    async fn last_unit_flips_out_of_stock() {
        let (_container, pool) = setup_db().await;
        let print = seed_product(&pool, "Print", ProductType::Physical, 2000, 1);
        let ledger = DieselOrderLedger::new(pool.clone());

        let draft = OrderDraft::new(
            Uuid::new_v4(),
            vec![line(&print, 1)],
            Some(address()),
            &policy(),
        )
        .expect("draft");
        let placed = ledger.place_order(&draft, &session("cs_3")).expect("place");
        ledger
            .complete_order(placed.id, "pi_3", chrono::Utc::now())
            .expect("complete");

        let mut conn = pool.get().expect("connection");
        let (stock, out_of_stock): (i32, bool) = products::table
            .find(print.id)
            .select((products::stock, products::is_out_of_stock))
            .first(&mut conn)
            .expect("product");
        assert_eq!((stock, out_of_stock), (0, true));
    }

    #[tokio::test]
    async fn unknown_order_completion_is_not_found() {
        let (_container, pool) = setup_db().await;
        let ledger = DieselOrderLedger::new(pool);

        let outcome = ledger
            .complete_order(Uuid::new_v4(), "pi_x", chrono::Utc::now())
            .expect("complete");
        assert_eq!(outcome, Completion::NotFound);
    }

    #[tokio::test]
    async fn partial_then_stale_refund() {
        let (_container, pool) = setup_db().await;
        let ebook = seed_product(&pool, "Course", ProductType::Digital, 10000, 0);
        let ledger = DieselOrderLedger::new(pool);

        let draft = OrderDraft::new(Uuid::new_v4(), vec![line(&ebook, 1)], None, &policy())
            .expect("draft");
        let placed = ledger.place_order(&draft, &session("cs_4")).expect("place");
        ledger
            .complete_order(placed.id, "pi_4", chrono::Utc::now())
            .expect("complete");

        let partial = ledger
            .record_refund(
                placed.id,
                &RefundRecord {
                    amount_refunded: 4000,
                    charge_amount: 10000,
                    refund_id: Some("re_1".to_string()),
                },
            )
            .expect("refund")
            .expect("applied");
        assert_eq!(partial.payment_status, PaymentStatus::PartialRefund);
        assert_eq!(partial.order_status, OrderStatus::Refunded);
        assert_eq!(partial.refund_amount, 4000);

        let stale = ledger
            .record_refund(
                placed.id,
                &RefundRecord {
                    amount_refunded: 4000,
                    charge_amount: 10000,
                    refund_id: Some("re_1".to_string()),
                },
            )
            .expect("refund");
        assert!(stale.is_none());

        let full = ledger
            .record_refund(
                placed.id,
                &RefundRecord {
                    amount_refunded: 10000,
                    charge_amount: 10000,
                    refund_id: Some("re_2".to_string()),
                },
            )
            .expect("refund")
            .expect("applied");
        assert_eq!(full.payment_status, PaymentStatus::Refunded);
        assert_eq!(full.refund_amount, 10000);
    }

    #[tokio::test]
    async fn every_transition_writes_an_outbox_event() {
        let (_container, pool) = setup_db().await;
        let ebook = seed_product(&pool, "Ebook", ProductType::Digital, 800, 0);
        let ledger = DieselOrderLedger::new(pool.clone());

        let draft = OrderDraft::new(Uuid::new_v4(), vec![line(&ebook, 1)], None, &policy())
            .expect("draft");
        let placed = ledger.place_order(&draft, &session("cs_5")).expect("place");
        ledger
            .complete_order(placed.id, "pi_5", chrono::Utc::now())
            .expect("complete");

        let mut conn = pool.get().expect("connection");
        let events: Vec<OutboxEventRow> = commerce_outbox::table
            .filter(commerce_outbox::aggregate_id.eq(placed.id.to_string()))
            .order(commerce_outbox::created_at.asc())
            .select(OutboxEventRow::as_select())
            .load(&mut conn)
            .expect("query failed");

        let types: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(types, ["OrderPlaced", "OrderPaid"]);
        assert!(events.iter().all(|e| e.aggregate_type == "Order"));
    }

    #[tokio::test]
    async fn shipping_snapshot_cannot_be_edited() {
        let (_container, pool) = setup_db().await;
        let zine = seed_product(&pool, "Zine", ProductType::Physical, 1500, 5);
        let ledger = DieselOrderLedger::new(pool.clone());

        let draft = OrderDraft::new(Uuid::new_v4(), vec![line(&zine, 1)], Some(address()), &policy())
            .expect("draft");
        let placed = ledger.place_order(&draft, &session("cs_6")).expect("place");

        let mut conn = pool.get().expect("connection");
        let result = diesel::update(crate::schema::orders::table.find(placed.id))
            .set(crate::schema::orders::shipping_address.eq("somewhere else"))
            .execute(&mut conn);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn unpaid_orders_cancel_and_list_per_member() {
        let (_container, pool) = setup_db().await;
        let ebook = seed_product(&pool, "Ebook", ProductType::Digital, 800, 0);
        let ledger = DieselOrderLedger::new(pool);
        let member = Uuid::new_v4();

        let mut ids = vec![];
        for n in 0..3 {
            let draft = OrderDraft::new(member, vec![line(&ebook, 1)], None, &policy())
                .expect("draft");
            ids.push(
                ledger
                    .place_order(&draft, &session(&format!("cs_list_{n}")))
                    .expect("place")
                    .id,
            );
        }

        assert!(ledger.cancel_unpaid(ids[0]).expect("cancel"));
        let cancelled = ledger.find_by_id(ids[0]).expect("find").expect("exists");
        assert_eq!(cancelled.order_status, OrderStatus::Cancelled);
        assert_eq!(cancelled.payment_status, PaymentStatus::Failed);
        assert!(!ledger.cancel_unpaid(ids[0]).expect("second cancel"));

        let page = ledger.list_for_member(member, 1, 2).expect("list");
        assert_eq!(page.total, 3);
        assert_eq!(page.items.len(), 2);
        assert!(page.items.iter().all(|o| o.items.len() == 1));
        let others = ledger.list_for_member(Uuid::new_v4(), 1, 2).expect("list");
        assert_eq!(others.total, 0);
    }

    #[tokio::test]
    async fn out_of_range_page_is_rejected() {
        let (_container, pool) = setup_db().await;
        let ledger = DieselOrderLedger::new(pool);

        let err = ledger
            .list_for_member(Uuid::new_v4(), i64::MAX, 100)
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidInput(_)));

        let last = ledger
            .list_for_member(Uuid::new_v4(), i64::MAX / 100, 100)
            .expect("list");
        assert!(last.items.is_empty());
    }
}
