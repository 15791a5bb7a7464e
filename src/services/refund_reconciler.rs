//! Refund Reconciler
//!
//! Refunds are recorded PENDING and only restock on completion, since a pending
//! refund may still be rejected before anything comes back.

use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use crate::domain::aggregates::stock::reason;
use crate::domain::aggregates::{
    refunded_total, AdjustmentOutcome, AdjustmentType, Order, OrderNote, Refund, RefundRequest, RefundStatus, StockAdjustment, StockTarget,
};
use crate::domain::value_objects::display_amount;
use crate::services::StockLedger;
use crate::store::EconomicsStore;
use crate::{EconomicsError, Result};

/// What a status change did.
#[derive(Clone, Debug)]
pub struct RefundSettlement {
    pub refund: Refund,
    pub order: Order,
    pub restocked: Vec<AdjustmentOutcome>,
}

pub struct RefundReconciler<S> { store: Arc<S>, ledger: StockLedger<S> }

impl<S> Clone for RefundReconciler<S> {
    fn clone(&self) -> Self { Self { store: self.store.clone(), ledger: self.ledger.clone() } }
}

impl<S: EconomicsStore> RefundReconciler<S> {
    pub fn new(store: Arc<S>, ledger: StockLedger<S>) -> Self { Self { store, ledger } }

    pub async fn create_refund(&self, request: RefundRequest) -> Result<Refund> {
        let mut tx = self.store.begin().await?;
        let mut order = self.store.order_for_update(&mut tx, request.order_id).await?
            .ok_or_else(|| EconomicsError::not_found("Order", request.order_id))?;
        let already_refunded = refunded_total(&self.store.refunds_for_order_in(&mut tx, order.id).await?);
        request.validate(&order, already_refunded)?;

        let refund = request.into_refund();
        self.store.insert_refund(&mut tx, &refund).await?;
        order.settle_refunds(already_refunded + refund.amount);
        self.store.save_order_status(&mut tx, &order).await?;
        let note = format!("Refund of ₹{} requested. Reason: {}", display_amount(refund.amount), refund.reason);
        self.store.append_order_note(&mut tx, &OrderNote::private(order.id, note)).await?;
        self.store.commit(tx).await?;

        info!(refund_id = %refund.id, order_id = %order.id, amount = %refund.amount, payment_status = order.payment_status.as_str(), "refund created");
        Ok(refund)
    }

    pub async fn update_refund_status(&self, refund_id: Uuid, status: RefundStatus, transaction_id: Option<String>, actor: Option<Uuid>) -> Result<RefundSettlement> {
        let mut tx = self.store.begin().await?;
        let mut refund = self.store.refund_for_update(&mut tx, refund_id).await?
            .ok_or_else(|| EconomicsError::not_found("Refund", refund_id))?;
        let mut order = self.store.order_for_update(&mut tx, refund.order_id).await?
            .ok_or_else(|| EconomicsError::not_found("Order", refund.order_id))?;
        refund.transition(status, transaction_id, actor)?;
        self.store.save_refund_status(&mut tx, &refund).await?;

        let mut restocked = Vec::new();
        match status {
            RefundStatus::Completed => {
                for line in refund.restock_lines() {
                    let item = order.item(line.order_item_id).ok_or_else(|| EconomicsError::not_found("Order item", line.order_item_id))?;
                    let adjustment = StockAdjustment::new(StockTarget::from_parts(item.product_id, item.variant_id), AdjustmentType::Increase, line.quantity, reason::REFUND)
                        .reference(refund.id)
                        .actor(actor);
                    restocked.push(self.ledger.adjust_in(&mut tx, &adjustment).await?);
                }
                let note = format!(
                    "Refund of ₹{} processed. Transaction ID: {}",
                    display_amount(refund.amount), refund.transaction_id.as_deref().unwrap_or("N/A")
                );
                self.store.append_order_note(&mut tx, &OrderNote::customer(order.id, note)).await?;
            }
            RefundStatus::Rejected => {
                let others: Decimal = refunded_total(self.store.refunds_for_order_in(&mut tx, order.id).await?.iter().filter(|r| r.id != refund.id));
                order.reopen_after_rejection(others);
                self.store.save_order_status(&mut tx, &order).await?;
                let note = format!("Refund of ₹{} rejected. Reason: {}", display_amount(refund.amount), refund.reason);
                self.store.append_order_note(&mut tx, &OrderNote::private(order.id, note)).await?;
            }
            RefundStatus::Pending => {}
        }
        self.store.commit(tx).await?;

        info!(%refund_id, status = status.as_str(), restocked = restocked.len(), payment_status = order.payment_status.as_str(), "refund status updated");
        Ok(RefundSettlement { refund, order, restocked })
    }

    pub async fn refunds_for_order(&self, order_id: Uuid) -> Result<Vec<Refund>> {
        self.store.refunds_for_order(order_id).await
    }

    /// `order.total` minus every refund that is not REJECTED.
    pub async fn refundable_balance(&self, order_id: Uuid) -> Result<Decimal> {
        let order = self.store.order(order_id).await?.ok_or_else(|| EconomicsError::not_found("Order", order_id))?;
        let refunds = self.store.refunds_for_order(order_id).await?;
        Ok(order.total - refunded_total(&refunds))
    }
}
