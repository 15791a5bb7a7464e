//! Domain events, published after the owning transaction commits
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;
use crate::domain::aggregates::{AdjustmentType, StockStatus, StockTarget};

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "stream", content = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    Stock(StockEvent),
    Coupon(CouponEvent),
    Refund(RefundEvent),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StockEvent {
    Adjusted { target: StockTarget, adjustment_type: AdjustmentType, previous_qty: i32, new_qty: i32, status: StockStatus, reason: String, log_id: Uuid },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CouponEvent {
    Applied { coupon_id: Uuid, user_id: Option<Uuid>, order_id: Option<Uuid> },
    Reverted { coupon_id: Uuid, user_id: Option<Uuid>, order_id: Option<Uuid>, usages_removed: u64 },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RefundEvent {
    Created { refund_id: Uuid, order_id: Uuid, amount: Decimal },
    Completed { refund_id: Uuid, order_id: Uuid, amount: Decimal, transaction_id: Option<String>, restocked_lines: usize },
    Rejected { refund_id: Uuid, order_id: Uuid, amount: Decimal },
}

impl DomainEvent {
    /// Subject suffix used when publishing.
    pub fn topic(&self) -> &'static str {
        match self {
            Self::Stock(StockEvent::Adjusted { .. }) => "stock.adjusted",
            Self::Coupon(CouponEvent::Applied { .. }) => "coupon.applied",
            Self::Coupon(CouponEvent::Reverted { .. }) => "coupon.reverted",
            Self::Refund(RefundEvent::Created { .. }) => "refund.created",
            Self::Refund(RefundEvent::Completed { .. }) => "refund.completed",
            Self::Refund(RefundEvent::Rejected { .. }) => "refund.rejected",
        }
    }
}
