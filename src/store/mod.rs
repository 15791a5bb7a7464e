//! Storage seam for the economics engine.
//!
//! Every mutating engine operation runs inside one unit of work:
//!
//! 1. `begin()` opens a transaction and returns a `Tx`
//! 2. the `*_for_update` reads lock what they return until the `Tx` ends
//! 3. `commit(tx)` makes every write durable at once
//!
//! Dropping a `Tx` without committing discards its writes. Coupon counters are
//! moved with arithmetic updates in the backend, never read-modify-write.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use uuid::Uuid;
use crate::domain::aggregates::{Coupon, CouponUsage, InventoryLogEntry, Order, OrderNote, Refund, StockRecord, StockTarget};
use crate::Result;

#[async_trait]
pub trait EconomicsStore: Send + Sync + 'static {
    type Tx: Send;

    async fn begin(&self) -> Result<Self::Tx>;
    async fn commit(&self, tx: Self::Tx) -> Result<()>;

    // =========================================================================
    // Stock (within tx)
    // =========================================================================

    async fn stock_for_update(&self, tx: &mut Self::Tx, target: &StockTarget) -> Result<Option<StockRecord>>;
    async fn save_stock(&self, tx: &mut Self::Tx, record: &StockRecord) -> Result<()>;
    async fn append_inventory_log(&self, tx: &mut Self::Tx, entry: &InventoryLogEntry) -> Result<()>;

    // =========================================================================
    // Coupons (within tx)
    // =========================================================================

    /// `usage_count = usage_count + 1`. Returns `false` when the coupon does not exist.
    async fn increment_coupon_usage(&self, tx: &mut Self::Tx, coupon_id: Uuid) -> Result<bool>;
    /// `usage_count = GREATEST(usage_count - 1, 0)`. Returns the count before the update.
    async fn decrement_coupon_usage(&self, tx: &mut Self::Tx, coupon_id: Uuid) -> Result<Option<i64>>;
    async fn insert_coupon_usage(&self, tx: &mut Self::Tx, usage: &CouponUsage) -> Result<()>;
    async fn delete_coupon_usages(&self, tx: &mut Self::Tx, coupon_id: Uuid, order_id: Uuid) -> Result<u64>;

    // =========================================================================
    // Orders and refunds (within tx)
    // =========================================================================

    async fn order_for_update(&self, tx: &mut Self::Tx, order_id: Uuid) -> Result<Option<Order>>;
    async fn save_order_status(&self, tx: &mut Self::Tx, order: &Order) -> Result<()>;
    async fn append_order_note(&self, tx: &mut Self::Tx, note: &OrderNote) -> Result<()>;
    async fn refunds_for_order_in(&self, tx: &mut Self::Tx, order_id: Uuid) -> Result<Vec<Refund>>;
    async fn refund_for_update(&self, tx: &mut Self::Tx, refund_id: Uuid) -> Result<Option<Refund>>;
    async fn insert_refund(&self, tx: &mut Self::Tx, refund: &Refund) -> Result<()>;
    async fn save_refund_status(&self, tx: &mut Self::Tx, refund: &Refund) -> Result<()>;

    // =========================================================================
    // Reads (outside tx)
    // =========================================================================

    async fn stock(&self, target: &StockTarget) -> Result<Option<StockRecord>>;
    async fn low_stock(&self) -> Result<Vec<StockRecord>>;
    /// Newest first.
    async fn inventory_history(&self, target: &StockTarget, limit: usize) -> Result<Vec<InventoryLogEntry>>;
    /// `code` is already upper-cased.
    async fn coupon_by_code(&self, code: &str) -> Result<Option<Coupon>>;
    async fn coupon(&self, coupon_id: Uuid) -> Result<Option<Coupon>>;
    async fn count_user_usages(&self, coupon_id: Uuid, user_id: Uuid) -> Result<i64>;
    async fn order(&self, order_id: Uuid) -> Result<Option<Order>>;
    async fn order_notes(&self, order_id: Uuid) -> Result<Vec<OrderNote>>;
    async fn refunds_for_order(&self, order_id: Uuid) -> Result<Vec<Refund>>;
}
