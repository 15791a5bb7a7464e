//! Stock Ledger: the only writer of stock quantities.

use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use crate::domain::aggregates::stock::reason;
use crate::domain::aggregates::{AdjustmentOutcome, AdjustmentType, BulkStockUpdate, InventoryLogEntry, SaleLine, StockAdjustment, StockRecord, StockTarget};
use crate::store::EconomicsStore;
use crate::{EconomicsError, Result};

pub struct StockLedger<S> { store: Arc<S> }

impl<S> Clone for StockLedger<S> {
    fn clone(&self) -> Self { Self { store: self.store.clone() } }
}

impl<S: EconomicsStore> StockLedger<S> {
    pub fn new(store: Arc<S>) -> Self { Self { store } }

    pub async fn adjust(&self, adjustment: StockAdjustment) -> Result<AdjustmentOutcome> {
        let mut tx = self.store.begin().await?;
        let outcome = self.adjust_in(&mut tx, &adjustment).await?;
        self.store.commit(tx).await?;
        info!(stock = %adjustment.target.describe(), kind = adjustment.adjustment_type.as_str(), previous = outcome.previous_qty, new = outcome.new_qty, reason = %adjustment.reason, "stock adjusted");
        Ok(outcome)
    }

    /// Sets absolute quantities in one transaction. Targets that no longer exist are skipped.
    pub async fn bulk_set(&self, updates: &[BulkStockUpdate], reason: &str, notes: Option<String>, actor: Option<Uuid>) -> Result<Vec<AdjustmentOutcome>> {
        let mut tx = self.store.begin().await?;
        let mut applied = Vec::with_capacity(updates.len());
        for update in updates {
            let adjustment = StockAdjustment::new(update.target.clone(), AdjustmentType::Set, update.quantity, reason)
                .notes(notes.clone())
                .actor(actor);
            match self.adjust_in(&mut tx, &adjustment).await {
                Ok(outcome) => applied.push(outcome),
                Err(EconomicsError::NotFound { .. }) => debug!(stock = %update.target.describe(), "bulk update skipped missing target"),
                Err(e) => return Err(e),
            }
        }
        self.store.commit(tx).await?;
        info!(requested = updates.len(), applied = applied.len(), "bulk stock update");
        Ok(applied)
    }

    /// Takes the lines of a placed order out of stock. All or nothing.
    pub async fn record_sale(&self, order_id: Uuid, lines: &[SaleLine], actor: Option<Uuid>) -> Result<Vec<AdjustmentOutcome>> {
        let mut tx = self.store.begin().await?;
        let mut outcomes = Vec::with_capacity(lines.len());
        for line in lines {
            let adjustment = StockAdjustment::new(line.target.clone(), AdjustmentType::Decrease, line.quantity, reason::SALE)
                .reference(order_id)
                .actor(actor);
            outcomes.push(self.adjust_in(&mut tx, &adjustment).await?);
        }
        self.store.commit(tx).await?;
        info!(%order_id, lines = lines.len(), "sale recorded against stock");
        Ok(outcomes)
    }

    /// Read-modify-write of one stock record plus its log row, inside `tx`.
    pub(crate) async fn adjust_in(&self, tx: &mut S::Tx, adjustment: &StockAdjustment) -> Result<AdjustmentOutcome> {
        if adjustment.quantity < 0 {
            return Err(EconomicsError::InvalidArgument(format!("adjustment quantity must be non-negative, got {}", adjustment.quantity)));
        }
        let mut record = self.store.stock_for_update(tx, &adjustment.target).await?
            .ok_or_else(|| missing(&adjustment.target))?;
        let (previous_qty, new_qty) = record.apply(adjustment.adjustment_type, adjustment.quantity)?;
        if adjustment.adjustment_type == AdjustmentType::Decrease && adjustment.quantity > previous_qty {
            warn!(stock = %adjustment.target.describe(), previous = previous_qty, requested = adjustment.quantity, "decrease exceeds tracked stock, clamped to zero");
        }
        self.store.save_stock(tx, &record).await?;
        let log_entry = adjustment.log_entry(previous_qty, new_qty);
        self.store.append_inventory_log(tx, &log_entry).await?;
        Ok(AdjustmentOutcome { previous_qty, new_qty, status: record.status, log_entry })
    }

    pub async fn stock(&self, target: &StockTarget) -> Result<StockRecord> {
        self.store.stock(target).await?.ok_or_else(|| missing(target))
    }

    pub async fn history(&self, target: &StockTarget, limit: usize) -> Result<Vec<InventoryLogEntry>> {
        self.store.inventory_history(target, limit).await
    }

    pub async fn low_stock(&self) -> Result<Vec<StockRecord>> { self.store.low_stock().await }
}

fn missing(target: &StockTarget) -> EconomicsError {
    match target {
        StockTarget::Product { product_id } => EconomicsError::not_found("Product", product_id),
        StockTarget::Variant { variant_id, .. } => EconomicsError::not_found("Variant", variant_id),
    }
}
