//! Usage Tracker: moves coupon counters and usage rows.
//!
//! Neither operation is idempotent; callers apply once per successful order.

use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;
use crate::domain::aggregates::CouponUsage;
use crate::store::EconomicsStore;
use crate::{EconomicsError, Result};

pub struct UsageTracker<S> { store: Arc<S> }

impl<S> Clone for UsageTracker<S> {
    fn clone(&self) -> Self { Self { store: self.store.clone() } }
}

impl<S: EconomicsStore> UsageTracker<S> {
    pub fn new(store: Arc<S>) -> Self { Self { store } }

    pub async fn apply(&self, coupon_id: Uuid, user_id: Option<Uuid>, order_id: Option<Uuid>) -> Result<()> {
        let mut tx = self.store.begin().await?;
        if !self.store.increment_coupon_usage(&mut tx, coupon_id).await? {
            return Err(EconomicsError::not_found("Coupon", coupon_id));
        }
        if let Some(user_id) = user_id {
            self.store.insert_coupon_usage(&mut tx, &CouponUsage::record(coupon_id, user_id, order_id)).await?;
        }
        self.store.commit(tx).await?;
        info!(%coupon_id, ?user_id, ?order_id, "coupon usage applied");
        Ok(())
    }

    /// Returns how many usage rows were removed. Without an order id only the counter moves.
    pub async fn revert(&self, coupon_id: Uuid, user_id: Option<Uuid>, order_id: Option<Uuid>) -> Result<u64> {
        let mut tx = self.store.begin().await?;
        let before = self.store.decrement_coupon_usage(&mut tx, coupon_id).await?
            .ok_or_else(|| EconomicsError::not_found("Coupon", coupon_id))?;
        if before <= 0 {
            warn!(%coupon_id, "coupon usage revert with no recorded usage, counter held at zero");
        }
        let removed = match order_id {
            Some(order_id) => self.store.delete_coupon_usages(&mut tx, coupon_id, order_id).await?,
            None => 0,
        };
        self.store.commit(tx).await?;
        info!(%coupon_id, ?user_id, ?order_id, removed, "coupon usage reverted");
        Ok(removed)
    }

    pub async fn usage_count_for_user(&self, coupon_id: Uuid, user_id: Uuid) -> Result<i64> {
        self.store.count_user_usages(coupon_id, user_id).await
    }
}
