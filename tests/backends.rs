//! The shared scenarios, run against each store backend.
//!
//! The Postgres half needs a scratch database and is ignored by default. Each
//! test migrates a private schema and drops it afterwards.
//!
//! Run with: DATABASE_URL=postgres://localhost/economics_test cargo test --test backends -- --ignored

mod common;

use common::TestDb;
use opensase_order_economics::domain::aggregates::stock::reason;
use opensase_order_economics::{AdjustmentType, Engine, MemoryStore, StockAdjustment, StockStatus, StockTarget};
use uuid::Uuid;

macro_rules! memory_scenarios {
    ($($name:ident),* $(,)?) => {
        mod memory {
            use super::*;
            $(
                #[tokio::test]
                async fn $name() { common::$name(MemoryStore::new()).await }
            )*
        }
    };
}

macro_rules! postgres_scenarios {
    ($($name:ident),* $(,)?) => {
        mod postgres {
            use super::*;
            $(
                #[tokio::test]
                #[ignore]
                async fn $name() {
                    let db = TestDb::create().await;
                    common::$name(db.store.clone()).await;
                    db.teardown().await;
                }
            )*
        }
    };
}

memory_scenarios!(
    stock_adjustments_round_trip,
    concurrent_decreases_lose_no_updates,
    coupon_restrictions_and_usage_round_trip,
    concurrent_applications_are_all_counted,
    refund_completion_restocks,
    concurrent_refunds_never_exceed_order_total,
);

postgres_scenarios!(
    stock_adjustments_round_trip,
    concurrent_decreases_lose_no_updates,
    coupon_restrictions_and_usage_round_trip,
    concurrent_applications_are_all_counted,
    refund_completion_restocks,
    concurrent_refunds_never_exceed_order_total,
);

/// A catalog-owned `products` table is extended in place, keeping its counts.
#[tokio::test]
#[ignore]
async fn postgres_migration_extends_catalog_products() {
    let product_id = Uuid::new_v4();
    let seed = format!("INSERT INTO products (id, sku, name, price, inventory_quantity) VALUES ('{product_id}', 'SKU-1', 'Mug', 1200, 7)");
    let db = TestDb::create_with(&[
        "CREATE TABLE products (
            id UUID PRIMARY KEY,
            sku TEXT NOT NULL,
            name TEXT NOT NULL,
            price BIGINT NOT NULL,
            inventory_quantity INT NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'active',
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )",
        seed.as_str(),
    ]).await;
    let engine = Engine::new(db.store.clone());
    let target = StockTarget::product(product_id);

    let record = engine.stock(&target).await.unwrap();
    assert_eq!(record.quantity, 7);
    assert_eq!(record.status, StockStatus::InStock);

    let outcome = engine.adjust_stock(StockAdjustment::new(target, AdjustmentType::Decrease, 7, reason::SALE)).await.unwrap();
    assert_eq!((outcome.previous_qty, outcome.new_qty, outcome.status), (7, 0, StockStatus::OutOfStock));
    db.teardown().await;
}
