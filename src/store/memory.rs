//! In-process store. One transaction at a time; a transaction works on a copy
//! of the state and swaps it in on commit.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;
use crate::domain::aggregates::{Coupon, CouponUsage, InventoryLogEntry, Order, OrderNote, Refund, StockRecord, StockTarget};
use crate::store::EconomicsStore;
use crate::Result;

#[derive(Clone, Debug, Default)]
struct MemoryState {
    stock: HashMap<StockTarget, StockRecord>,
    inventory_log: Vec<InventoryLogEntry>,
    coupons: HashMap<Uuid, Coupon>,
    usages: Vec<CouponUsage>,
    orders: HashMap<Uuid, Order>,
    notes: Vec<OrderNote>,
    refunds: Vec<Refund>,
}

#[derive(Clone, Default)]
pub struct MemoryStore { state: Arc<Mutex<MemoryState>> }

pub struct MemoryTx { guard: OwnedMutexGuard<MemoryState>, working: MemoryState }

impl MemoryStore {
    pub fn new() -> Self { Self::default() }

    pub async fn insert_stock(&self, record: StockRecord) { self.state.lock().await.stock.insert(record.target.clone(), record); }
    pub async fn insert_coupon(&self, coupon: Coupon) { self.state.lock().await.coupons.insert(coupon.id, coupon); }
    pub async fn insert_order(&self, order: Order) { self.state.lock().await.orders.insert(order.id, order); }
    pub async fn usages(&self) -> Vec<CouponUsage> { self.state.lock().await.usages.clone() }
}

#[async_trait]
impl EconomicsStore for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<MemoryTx> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(MemoryTx { guard, working })
    }

    async fn commit(&self, tx: MemoryTx) -> Result<()> {
        let MemoryTx { mut guard, working } = tx;
        *guard = working;
        Ok(())
    }

    async fn stock_for_update(&self, tx: &mut MemoryTx, target: &StockTarget) -> Result<Option<StockRecord>> {
        Ok(tx.working.stock.get(target).cloned())
    }

    async fn save_stock(&self, tx: &mut MemoryTx, record: &StockRecord) -> Result<()> {
        tx.working.stock.insert(record.target.clone(), record.clone());
        Ok(())
    }

    async fn append_inventory_log(&self, tx: &mut MemoryTx, entry: &InventoryLogEntry) -> Result<()> {
        tx.working.inventory_log.push(entry.clone());
        Ok(())
    }

    async fn increment_coupon_usage(&self, tx: &mut MemoryTx, coupon_id: Uuid) -> Result<bool> {
        Ok(tx.working.coupons.get_mut(&coupon_id).map(|c| c.usage_count += 1).is_some())
    }

    async fn decrement_coupon_usage(&self, tx: &mut MemoryTx, coupon_id: Uuid) -> Result<Option<i64>> {
        Ok(tx.working.coupons.get_mut(&coupon_id).map(|c| {
            let before = c.usage_count;
            c.usage_count = (before - 1).max(0);
            before
        }))
    }

    async fn insert_coupon_usage(&self, tx: &mut MemoryTx, usage: &CouponUsage) -> Result<()> {
        tx.working.usages.push(usage.clone());
        Ok(())
    }

    async fn delete_coupon_usages(&self, tx: &mut MemoryTx, coupon_id: Uuid, order_id: Uuid) -> Result<u64> {
        let before = tx.working.usages.len();
        tx.working.usages.retain(|u| !(u.coupon_id == coupon_id && u.order_id == Some(order_id)));
        Ok((before - tx.working.usages.len()) as u64)
    }

    async fn order_for_update(&self, tx: &mut MemoryTx, order_id: Uuid) -> Result<Option<Order>> {
        Ok(tx.working.orders.get(&order_id).cloned())
    }

    async fn save_order_status(&self, tx: &mut MemoryTx, order: &Order) -> Result<()> {
        if let Some(stored) = tx.working.orders.get_mut(&order.id) {
            stored.status = order.status;
            stored.payment_status = order.payment_status;
            stored.updated_at = order.updated_at;
        }
        Ok(())
    }

    async fn append_order_note(&self, tx: &mut MemoryTx, note: &OrderNote) -> Result<()> {
        tx.working.notes.push(note.clone());
        Ok(())
    }

    async fn refunds_for_order_in(&self, tx: &mut MemoryTx, order_id: Uuid) -> Result<Vec<Refund>> {
        Ok(tx.working.refunds.iter().filter(|r| r.order_id == order_id).cloned().collect())
    }

    async fn refund_for_update(&self, tx: &mut MemoryTx, refund_id: Uuid) -> Result<Option<Refund>> {
        Ok(tx.working.refunds.iter().find(|r| r.id == refund_id).cloned())
    }

    async fn insert_refund(&self, tx: &mut MemoryTx, refund: &Refund) -> Result<()> {
        tx.working.refunds.push(refund.clone());
        Ok(())
    }

    async fn save_refund_status(&self, tx: &mut MemoryTx, refund: &Refund) -> Result<()> {
        if let Some(stored) = tx.working.refunds.iter_mut().find(|r| r.id == refund.id) {
            stored.status = refund.status;
            stored.transaction_id = refund.transaction_id.clone();
            stored.processed_by = refund.processed_by;
            stored.updated_at = refund.updated_at;
        }
        Ok(())
    }

    async fn stock(&self, target: &StockTarget) -> Result<Option<StockRecord>> {
        Ok(self.state.lock().await.stock.get(target).cloned())
    }

    async fn low_stock(&self) -> Result<Vec<StockRecord>> {
        Ok(self.state.lock().await.stock.values().filter(|r| r.is_low_stock()).cloned().collect())
    }

    async fn inventory_history(&self, target: &StockTarget, limit: usize) -> Result<Vec<InventoryLogEntry>> {
        let state = self.state.lock().await;
        Ok(state.inventory_log.iter().rev().filter(|e| &e.target == target).take(limit).cloned().collect())
    }

    async fn coupon_by_code(&self, code: &str) -> Result<Option<Coupon>> {
        Ok(self.state.lock().await.coupons.values().find(|c| c.code.as_str() == code).cloned())
    }

    async fn coupon(&self, coupon_id: Uuid) -> Result<Option<Coupon>> {
        Ok(self.state.lock().await.coupons.get(&coupon_id).cloned())
    }

    async fn count_user_usages(&self, coupon_id: Uuid, user_id: Uuid) -> Result<i64> {
        let state = self.state.lock().await;
        Ok(state.usages.iter().filter(|u| u.coupon_id == coupon_id && u.user_id == user_id).count() as i64)
    }

    async fn order(&self, order_id: Uuid) -> Result<Option<Order>> {
        Ok(self.state.lock().await.orders.get(&order_id).cloned())
    }

    async fn order_notes(&self, order_id: Uuid) -> Result<Vec<OrderNote>> {
        Ok(self.state.lock().await.notes.iter().filter(|n| n.order_id == order_id).cloned().collect())
    }

    async fn refunds_for_order(&self, order_id: Uuid) -> Result<Vec<Refund>> {
        Ok(self.state.lock().await.refunds.iter().filter(|r| r.order_id == order_id).cloned().collect())
    }
}
