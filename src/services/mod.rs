//! Services: each operation here is one store transaction.
pub mod coupon_evaluator;
pub mod refund_reconciler;
pub mod stock_ledger;
pub mod usage_tracker;

pub use coupon_evaluator::CouponEvaluator;
pub use refund_reconciler::{RefundReconciler, RefundSettlement};
pub use stock_ledger::StockLedger;
pub use usage_tracker::UsageTracker;
