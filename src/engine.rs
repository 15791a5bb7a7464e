//! Engine façade: owns the store and the services, and publishes domain events
//! once the owning transaction has committed.

use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;
use crate::domain::aggregates::stock::reason;
use crate::domain::aggregates::{
    AdjustmentOutcome, BulkStockUpdate, CartLine, CouponValidation, InventoryLogEntry, OrderNote, Refund, RefundRequest, RefundStatus,
    SaleLine, StockAdjustment, StockRecord, StockTarget,
};
use crate::domain::events::{CouponEvent, DomainEvent, RefundEvent, StockEvent};
use crate::services::{CouponEvaluator, RefundReconciler, RefundSettlement, StockLedger, UsageTracker};
use crate::store::EconomicsStore;
use crate::{EconomicsError, Result};

pub struct Engine<S> {
    store: Arc<S>,
    ledger: StockLedger<S>,
    coupons: CouponEvaluator<S>,
    usage: UsageTracker<S>,
    refunds: RefundReconciler<S>,
    nats: Option<async_nats::Client>,
    event_subject: String,
}

impl<S> Clone for Engine<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(), ledger: self.ledger.clone(), coupons: self.coupons.clone(), usage: self.usage.clone(),
            refunds: self.refunds.clone(), nats: self.nats.clone(), event_subject: self.event_subject.clone(),
        }
    }
}

impl<S: EconomicsStore> Engine<S> {
    pub fn new(store: S) -> Self {
        let store = Arc::new(store);
        let ledger = StockLedger::new(store.clone());
        Self {
            coupons: CouponEvaluator::new(store.clone()),
            usage: UsageTracker::new(store.clone()),
            refunds: RefundReconciler::new(store.clone(), ledger.clone()),
            ledger,
            store,
            nats: None,
            event_subject: "economics.events".into(),
        }
    }

    pub fn with_nats(mut self, client: async_nats::Client, event_subject: impl Into<String>) -> Self {
        self.nats = Some(client);
        self.event_subject = event_subject.into();
        self
    }

    pub fn store(&self) -> &S { &self.store }
    pub fn ledger(&self) -> &StockLedger<S> { &self.ledger }
    pub fn coupons(&self) -> &CouponEvaluator<S> { &self.coupons }
    pub fn usage(&self) -> &UsageTracker<S> { &self.usage }
    pub fn refunds(&self) -> &RefundReconciler<S> { &self.refunds }

    // =========================================================================
    // Stock
    // =========================================================================

    pub async fn adjust_stock(&self, adjustment: StockAdjustment) -> Result<AdjustmentOutcome> {
        let outcome = self.ledger.adjust(adjustment).await?;
        self.publish(vec![stock_event(&outcome)]).await;
        Ok(outcome)
    }

    pub async fn bulk_set_stock(&self, updates: &[BulkStockUpdate], notes: Option<String>, actor: Option<Uuid>) -> Result<Vec<AdjustmentOutcome>> {
        let outcomes = self.ledger.bulk_set(updates, reason::BULK_UPDATE, notes, actor).await?;
        self.publish(outcomes.iter().map(stock_event).collect()).await;
        Ok(outcomes)
    }

    pub async fn record_sale(&self, order_id: Uuid, lines: &[SaleLine], actor: Option<Uuid>) -> Result<Vec<AdjustmentOutcome>> {
        let outcomes = self.ledger.record_sale(order_id, lines, actor).await?;
        self.publish(outcomes.iter().map(stock_event).collect()).await;
        Ok(outcomes)
    }

    pub async fn stock(&self, target: &StockTarget) -> Result<StockRecord> { self.ledger.stock(target).await }
    pub async fn stock_history(&self, target: &StockTarget, limit: usize) -> Result<Vec<InventoryLogEntry>> { self.ledger.history(target, limit).await }
    pub async fn low_stock(&self) -> Result<Vec<StockRecord>> { self.ledger.low_stock().await }

    // =========================================================================
    // Coupons
    // =========================================================================

    pub async fn validate_coupon(&self, code: &str, items: &[CartLine], cart_total: Decimal, user_id: Option<Uuid>, email: Option<&str>) -> Result<CouponValidation> {
        self.coupons.validate(code, items, cart_total, user_id, email).await
    }

    pub async fn apply_coupon(&self, coupon_id: Uuid, user_id: Option<Uuid>, order_id: Option<Uuid>) -> Result<()> {
        self.usage.apply(coupon_id, user_id, order_id).await?;
        self.publish(vec![DomainEvent::Coupon(CouponEvent::Applied { coupon_id, user_id, order_id })]).await;
        Ok(())
    }

    pub async fn revert_coupon(&self, coupon_id: Uuid, user_id: Option<Uuid>, order_id: Option<Uuid>) -> Result<u64> {
        let usages_removed = self.usage.revert(coupon_id, user_id, order_id).await?;
        self.publish(vec![DomainEvent::Coupon(CouponEvent::Reverted { coupon_id, user_id, order_id, usages_removed })]).await;
        Ok(usages_removed)
    }

    pub async fn coupon_usage_for_user(&self, coupon_id: Uuid, user_id: Uuid) -> Result<i64> {
        self.usage.usage_count_for_user(coupon_id, user_id).await
    }

    // =========================================================================
    // Refunds
    // =========================================================================

    pub async fn create_refund(&self, request: RefundRequest) -> Result<Refund> {
        let refund = self.refunds.create_refund(request).await?;
        self.publish(vec![DomainEvent::Refund(RefundEvent::Created { refund_id: refund.id, order_id: refund.order_id, amount: refund.amount })]).await;
        Ok(refund)
    }

    pub async fn update_refund_status(&self, refund_id: Uuid, status: RefundStatus, transaction_id: Option<String>, actor: Option<Uuid>) -> Result<RefundSettlement> {
        let settlement = self.refunds.update_refund_status(refund_id, status, transaction_id, actor).await?;
        let refund = &settlement.refund;
        let mut events: Vec<DomainEvent> = settlement.restocked.iter().map(stock_event).collect();
        match refund.status {
            RefundStatus::Completed => events.push(DomainEvent::Refund(RefundEvent::Completed {
                refund_id: refund.id, order_id: refund.order_id, amount: refund.amount,
                transaction_id: refund.transaction_id.clone(), restocked_lines: settlement.restocked.len(),
            })),
            RefundStatus::Rejected => events.push(DomainEvent::Refund(RefundEvent::Rejected { refund_id: refund.id, order_id: refund.order_id, amount: refund.amount })),
            RefundStatus::Pending => {}
        }
        self.publish(events).await;
        Ok(settlement)
    }

    pub async fn refunds_for_order(&self, order_id: Uuid) -> Result<Vec<Refund>> { self.refunds.refunds_for_order(order_id).await }
    pub async fn refundable_balance(&self, order_id: Uuid) -> Result<Decimal> { self.refunds.refundable_balance(order_id).await }

    pub async fn order_notes(&self, order_id: Uuid) -> Result<Vec<OrderNote>> {
        if self.store.order(order_id).await?.is_none() { return Err(EconomicsError::not_found("Order", order_id)); }
        self.store.order_notes(order_id).await
    }

    /// Failures are logged; committed work is never undone.
    async fn publish(&self, events: Vec<DomainEvent>) {
        let Some(client) = &self.nats else { return };
        for event in events {
            let subject = format!("{}.{}", self.event_subject, event.topic());
            match serde_json::to_vec(&event) {
                Ok(payload) => {
                    if let Err(e) = client.publish(subject.clone(), payload.into()).await {
                        warn!(%subject, error = %e, "failed to publish domain event");
                    }
                }
                Err(e) => warn!(%subject, error = %e, "failed to encode domain event"),
            }
        }
    }
}

fn stock_event(outcome: &AdjustmentOutcome) -> DomainEvent {
    let entry = &outcome.log_entry;
    DomainEvent::Stock(StockEvent::Adjusted {
        target: entry.target.clone(), adjustment_type: entry.adjustment_type, previous_qty: outcome.previous_qty,
        new_qty: outcome.new_qty, status: outcome.status, reason: entry.reason.clone(), log_id: entry.id,
    })
}
