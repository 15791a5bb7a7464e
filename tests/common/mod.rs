//! Scenarios shared by every `EconomicsStore` backend.
//!
//! Each scenario takes a fresh, empty store, seeds it through [`Seed`] and then
//! drives it only through the [`Engine`]. The concurrent scenarios start every
//! call before awaiting any of them, so the backend's locking decides the outcome.

use async_trait::async_trait;
use futures::future::join_all;
use opensase_order_economics::domain::aggregates::stock::reason;
use opensase_order_economics::domain::value_objects::CouponCode;
use opensase_order_economics::{
    AdjustmentType, BackorderMode, CartLine, Coupon, CouponType, EconomicsError, EconomicsStore, Engine, MemoryStore, Order, OrderItem, PaymentStatus,
    PgStore, RefundLine, RefundRequest, RefundStatus, Restriction, RestrictionMode, StockAdjustment, StockRecord, StockStatus, StockTarget,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool};
use uuid::Uuid;

/// Test-only way to put rows in front of the engine.
#[async_trait]
pub trait Seed: EconomicsStore + Clone {
    async fn seed_stock(&self, record: StockRecord);
    async fn seed_coupon(&self, coupon: Coupon);
    async fn seed_order(&self, order: Order);
}

#[async_trait]
impl Seed for MemoryStore {
    async fn seed_stock(&self, record: StockRecord) { self.insert_stock(record).await }
    async fn seed_coupon(&self, coupon: Coupon) { self.insert_coupon(coupon).await }
    async fn seed_order(&self, order: Order) { self.insert_order(order).await }
}

#[async_trait]
impl Seed for PgStore {
    async fn seed_stock(&self, record: StockRecord) {
        match record.target {
            StockTarget::Product { product_id } => {
                sqlx::query("INSERT INTO products (id, stock_quantity, stock_status, low_stock_threshold, backorder_mode) VALUES ($1, $2, $3, $4, $5)")
                    .bind(product_id).bind(record.quantity).bind(record.status.as_str()).bind(record.low_stock_threshold).bind(record.backorder_mode.as_str())
                    .execute(self.pool()).await.unwrap();
            }
            StockTarget::Variant { product_id, variant_id } => {
                sqlx::query("INSERT INTO products (id) VALUES ($1) ON CONFLICT (id) DO NOTHING").bind(product_id).execute(self.pool()).await.unwrap();
                sqlx::query("INSERT INTO product_variants (id, product_id, stock_quantity, stock_status, low_stock_threshold) VALUES ($1, $2, $3, $4, $5)")
                    .bind(variant_id).bind(product_id).bind(record.quantity).bind(record.status.as_str()).bind(record.low_stock_threshold)
                    .execute(self.pool()).await.unwrap();
            }
        }
    }

    async fn seed_coupon(&self, c: Coupon) {
        sqlx::query(
            "INSERT INTO coupons (id, code, coupon_type, value, usage_limit, usage_limit_per_user, limit_usage_to_x_items, min_order_value, max_order_value, \
             max_discount, individual_use_only, exclude_sale_items, allowed_emails, is_active, starts_at, expires_at, usage_count) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)",
        )
        .bind(c.id).bind(c.code.as_str()).bind(c.coupon_type.as_str()).bind(c.value).bind(c.usage_limit).bind(c.usage_limit_per_user)
        .bind(c.limit_usage_to_x_items).bind(c.min_order_value).bind(c.max_order_value).bind(c.max_discount).bind(c.individual_use_only)
        .bind(c.exclude_sale_items).bind(&c.allowed_emails).bind(c.is_active).bind(c.starts_at).bind(c.expires_at).bind(c.usage_count)
        .execute(self.pool()).await.unwrap();

        for r in &c.product_restrictions {
            sqlx::query("INSERT INTO coupon_products (coupon_id, product_id, mode) VALUES ($1, $2, $3)")
                .bind(c.id).bind(r.id).bind(r.mode.as_str()).execute(self.pool()).await.unwrap();
        }
        for r in &c.category_restrictions {
            sqlx::query("INSERT INTO coupon_categories (coupon_id, category_id, mode) VALUES ($1, $2, $3)")
                .bind(c.id).bind(r.id).bind(r.mode.as_str()).execute(self.pool()).await.unwrap();
        }
    }

    async fn seed_order(&self, order: Order) {
        sqlx::query("INSERT INTO orders (id, order_number, total, status, payment_status, updated_at) VALUES ($1, $2, $3, $4, $5, $6)")
            .bind(order.id).bind(&order.order_number).bind(order.total).bind(order.status.as_str()).bind(order.payment_status.as_str()).bind(order.updated_at)
            .execute(self.pool()).await.unwrap();
        for item in &order.items {
            sqlx::query("INSERT INTO order_items (id, order_id, product_id, variant_id, quantity, unit_price) VALUES ($1, $2, $3, $4, $5, $6)")
                .bind(item.id).bind(order.id).bind(item.product_id).bind(item.variant_id).bind(item.quantity).bind(item.unit_price)
                .execute(self.pool()).await.unwrap();
        }
    }
}

/// A migrated Postgres schema private to one test.
pub struct TestDb {
    admin: PgPool,
    schema: String,
    pub store: PgStore,
}

impl TestDb {
    pub async fn create() -> Self { Self::create_with(&[]).await }

    /// Runs `prepare` in the empty schema before migrating it.
    pub async fn create_with(prepare: &[&str]) -> Self {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must point at a scratch Postgres database");
        let admin = PgPool::connect(&url).await.unwrap();
        let schema = format!("economics_test_{}", Uuid::new_v4().simple());
        admin.execute(format!("CREATE SCHEMA {schema}").as_str()).await.unwrap();

        let search_path = format!("SET search_path TO {schema}");
        let pool = PgPoolOptions::new()
            .max_connections(16)
            .after_connect(move |conn, _meta| {
                let sql = search_path.clone();
                Box::pin(async move {
                    conn.execute(sql.as_str()).await?;
                    Ok(())
                })
            })
            .connect(&url)
            .await
            .unwrap();
        for sql in prepare { pool.execute(*sql).await.unwrap(); }
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();

        Self { admin, schema, store: PgStore::new(pool) }
    }

    pub async fn teardown(self) {
        self.store.pool().close().await;
        self.admin.execute(format!("DROP SCHEMA {} CASCADE", self.schema).as_str()).await.unwrap();
    }
}

fn coupon(code: &str, kind: CouponType, value: Decimal) -> Coupon {
    Coupon::new(CouponCode::new(code).unwrap(), kind, value)
}

// =============================================================================
// Stock
// =============================================================================

pub async fn stock_adjustments_round_trip<S: Seed>(store: S) {
    let product_id = Uuid::new_v4();
    let parent = StockTarget::product(product_id);
    let variant = StockTarget::variant(product_id, Uuid::new_v4());
    let low = StockTarget::product(Uuid::new_v4());
    store.seed_stock(StockRecord::new(parent.clone(), 4).with_backorder(BackorderMode::Notify).with_low_stock_threshold(5)).await;
    store.seed_stock(StockRecord::new(variant.clone(), 3)).await;
    store.seed_stock(StockRecord::new(low.clone(), 2).with_low_stock_threshold(5)).await;
    let engine = Engine::new(store);

    let outcome = engine.adjust_stock(StockAdjustment::new(variant.clone(), AdjustmentType::Decrease, 5, reason::ADJUSTMENT)).await.unwrap();
    assert_eq!((outcome.previous_qty, outcome.new_qty, outcome.status), (3, 0, StockStatus::OutOfStock));

    let outcome = engine.adjust_stock(StockAdjustment::new(parent.clone(), AdjustmentType::Set, 0, reason::ADJUSTMENT)).await.unwrap();
    assert_eq!(outcome.status, StockStatus::OnBackorder);

    let history = engine.stock_history(&variant, 10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!((history[0].previous_qty, history[0].new_qty, history[0].quantity), (3, 0, 5));
    assert_eq!(engine.stock_history(&parent, 10).await.unwrap().len(), 1);

    let records = engine.low_stock().await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].target, low);
    assert_eq!(records[0].low_stock_threshold, Some(5));
}

pub async fn concurrent_decreases_lose_no_updates<S: Seed>(store: S) {
    let target = StockTarget::product(Uuid::new_v4());
    store.seed_stock(StockRecord::new(target.clone(), 100)).await;
    let engine = Engine::new(store);

    let results = join_all((0..20).map(|_| {
        engine.adjust_stock(StockAdjustment::new(target.clone(), AdjustmentType::Decrease, 3, reason::ADJUSTMENT))
    })).await;
    assert!(results.iter().all(Result::is_ok));

    assert_eq!(engine.stock(&target).await.unwrap().quantity, 40);
    let history = engine.stock_history(&target, 100).await.unwrap();
    assert_eq!(history.len(), 20);
    let mut seen: Vec<i32> = history.iter().map(|e| e.previous_qty).collect();
    seen.sort_unstable();
    seen.dedup();
    assert_eq!(seen.len(), 20, "two decreases observed the same starting quantity");
}

// =============================================================================
// Coupons
// =============================================================================

pub async fn coupon_restrictions_and_usage_round_trip<S: Seed>(store: S) {
    let (shoes, excluded) = (Uuid::new_v4(), Uuid::new_v4());
    let mut c = coupon("SHOES20", CouponType::Percentage, dec!(20));
    c.category_restrictions = vec![Restriction { id: shoes, mode: RestrictionMode::Include }];
    c.product_restrictions = vec![Restriction { id: excluded, mode: RestrictionMode::Exclude }];
    c.allowed_emails = Some(r#"["*@opensase.io"]"#.into());
    c.usage_limit_per_user = Some(2);
    let id = c.id;
    store.seed_coupon(c).await;
    let engine = Engine::new(store);

    let items = vec![
        CartLine::new(Uuid::new_v4(), 2, dec!(50)).in_category(shoes),
        CartLine::new(excluded, 1, dec!(500)).in_category(shoes),
        CartLine::new(Uuid::new_v4(), 1, dec!(300)),
    ];
    let r = engine.validate_coupon("shoes20", &items, dec!(900), None, Some("ada@opensase.io")).await.unwrap();
    assert!(r.valid);
    assert_eq!(r.discount, dec!(20.00));
    let r = engine.validate_coupon("SHOES20", &items, dec!(900), None, Some("ada@gmail.com")).await.unwrap();
    assert_eq!(r.error.as_deref(), Some("Coupon is not valid for your email address"));

    let user = Uuid::new_v4();
    let (first, second) = (Uuid::new_v4(), Uuid::new_v4());
    engine.apply_coupon(id, Some(user), Some(first)).await.unwrap();
    engine.apply_coupon(id, Some(user), Some(second)).await.unwrap();
    assert_eq!(engine.coupon_usage_for_user(id, user).await.unwrap(), 2);
    let r = engine.validate_coupon("SHOES20", &items, dec!(900), Some(user), None).await.unwrap();
    assert_eq!(r.error.as_deref(), Some("You have reached the usage limit for this coupon"));

    assert_eq!(engine.revert_coupon(id, Some(user), Some(first)).await.unwrap(), 1);
    assert_eq!(engine.coupon_usage_for_user(id, user).await.unwrap(), 1);
    assert_eq!(engine.store().coupon(id).await.unwrap().unwrap().usage_count, 1);

    engine.revert_coupon(id, None, None).await.unwrap();
    engine.revert_coupon(id, None, None).await.unwrap();
    assert_eq!(engine.store().coupon(id).await.unwrap().unwrap().usage_count, 0);
}

pub async fn concurrent_applications_are_all_counted<S: Seed>(store: S) {
    let c = coupon("RUSH", CouponType::FixedCart, dec!(1));
    let id = c.id;
    store.seed_coupon(c).await;
    let engine = Engine::new(store);

    let results = join_all((0..25).map(|_| engine.apply_coupon(id, Some(Uuid::new_v4()), Some(Uuid::new_v4())))).await;
    assert!(results.iter().all(Result::is_ok));

    assert_eq!(engine.store().coupon(id).await.unwrap().unwrap().usage_count, 25);
}

// =============================================================================
// Refunds
// =============================================================================

/// An order of 1000 with one line of 4 units, backed by a stock record of 10.
async fn refundable_order<S: Seed>(store: &S) -> (Order, StockTarget) {
    let product_id = Uuid::new_v4();
    let stock = StockTarget::product(product_id);
    store.seed_stock(StockRecord::new(stock.clone(), 10)).await;
    let order = Order::new("ORD-1001", dec!(1000), vec![OrderItem::new(product_id, None, 4, dec!(250))]);
    store.seed_order(order.clone()).await;
    (order, stock)
}

fn refund_request(order: &Order, amount: Decimal, items: Vec<RefundLine>) -> RefundRequest {
    RefundRequest { order_id: order.id, amount, reason: "damaged in transit".into(), items, refund_method: "ORIGINAL".into() }
}

pub async fn refund_completion_restocks<S: Seed>(store: S) {
    let (order, stock) = refundable_order(&store).await;
    let engine = Engine::new(store);

    let line = RefundLine { order_item_id: order.items[0].id, quantity: 2, amount: dec!(400), restock_items: true };
    let refund = engine.create_refund(refund_request(&order, dec!(400), vec![line])).await.unwrap();
    let stored = engine.refunds_for_order(order.id).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].items.len(), 1);
    assert!(stored[0].items[0].restock_items);

    let settlement = engine.update_refund_status(refund.id, RefundStatus::Completed, Some("txn_1".into()), None).await.unwrap();
    assert_eq!(settlement.order.payment_status, PaymentStatus::PartiallyRefunded);
    assert_eq!(engine.stock(&stock).await.unwrap().quantity, 12);
    assert_eq!(engine.stock_history(&stock, 10).await.unwrap()[0].reference_id, Some(refund.id));
    assert_eq!(engine.order_notes(order.id).await.unwrap().len(), 2);

    let err = engine.update_refund_status(refund.id, RefundStatus::Rejected, None, None).await.unwrap_err();
    assert!(matches!(err, EconomicsError::Conflict(_)));
    assert_eq!(engine.refundable_balance(order.id).await.unwrap(), dec!(600));
}

pub async fn concurrent_refunds_never_exceed_order_total<S: Seed>(store: S) {
    let (order, _) = refundable_order(&store).await;
    let engine = Engine::new(store);

    let results = join_all((0..10).map(|_| engine.create_refund(refund_request(&order, dec!(300), vec![])))).await;
    let mut accepted = 0;
    for result in results {
        match result {
            Ok(_) => accepted += 1,
            Err(e) => assert!(matches!(e, EconomicsError::InvalidArgument(_)), "unexpected error: {e:?}"),
        }
    }
    assert_eq!(accepted, 3);
    assert_eq!(engine.refundable_balance(order.id).await.unwrap(), dec!(100));
}
