//! Aggregates module
pub mod stock;
pub mod coupon;
pub mod cart;
pub mod order;
pub mod refund;

pub use stock::{AdjustmentOutcome, AdjustmentType, BackorderMode, BulkStockUpdate, InventoryLogEntry, SaleLine, StockAdjustment, StockRecord, StockStatus, StockTarget};
pub use coupon::{Coupon, CouponRejection, CouponType, CouponUsage, CouponValidation, EvaluationContext, Restriction, RestrictionMode};
pub use cart::{cart_total, CartLine};
pub use order::{Order, OrderItem, OrderNote, OrderStatus, PaymentStatus};
pub use refund::{refunded_total, Refund, RefundItem, RefundLine, RefundRequest, RefundStatus};
