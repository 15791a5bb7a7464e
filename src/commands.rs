//! Request/reply command payloads and their dispatch onto the engine.

use opensase_order_economics::{
    AdjustmentType, BulkStockUpdate, CartLine, EconomicsError, EconomicsStore, Engine, RefundLine, RefundRequest, RefundStatus, StockAdjustment,
    StockTarget,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;
use validator::{Validate, ValidationError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command { ValidateCoupon, ApplyCoupon, RevertCoupon, AdjustStock, BulkSetStock, CreateRefund, UpdateRefundStatus }

impl Command {
    pub const ALL: [Command; 7] = [
        Self::ValidateCoupon, Self::ApplyCoupon, Self::RevertCoupon, Self::AdjustStock, Self::BulkSetStock, Self::CreateRefund, Self::UpdateRefundStatus,
    ];

    /// Subject suffix under the configured prefix.
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::ValidateCoupon => "coupons.validate",
            Self::ApplyCoupon => "coupons.apply",
            Self::RevertCoupon => "coupons.revert",
            Self::AdjustStock => "stock.adjust",
            Self::BulkSetStock => "stock.bulk_set",
            Self::CreateRefund => "refunds.create",
            Self::UpdateRefundStatus => "refunds.status",
        }
    }

    pub fn from_subject(prefix: &str, subject: &str) -> Option<Self> {
        let suffix = subject.strip_prefix(prefix)?.strip_prefix('.')?;
        Self::ALL.into_iter().find(|c| c.suffix() == suffix)
    }
}

fn non_negative(value: &Decimal) -> Result<(), ValidationError> {
    if value.is_sign_negative() { return Err(ValidationError::new("negative_amount")); }
    Ok(())
}

fn positive(value: &Decimal) -> Result<(), ValidationError> {
    if *value <= Decimal::ZERO { return Err(ValidationError::new("non_positive_amount")); }
    Ok(())
}

#[derive(Debug, Deserialize, Validate)]
pub struct ValidateCouponRequest {
    /// Bad codes are reported by the evaluator as "Invalid coupon code".
    pub code: String,
    #[serde(default)]
    #[validate]
    pub items: Vec<CartLine>,
    #[validate(custom = "non_negative")]
    pub cart_total: Decimal,
    pub user_id: Option<Uuid>,
    /// Matched against the allow-list as given.
    pub email: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CouponUsageRequest {
    pub coupon_id: Uuid,
    pub user_id: Option<Uuid>,
    pub order_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AdjustStockRequest {
    pub target: StockTarget,
    pub adjustment_type: AdjustmentType,
    #[validate(range(min = 0))]
    pub quantity: i32,
    #[validate(length(min = 1))]
    pub reason: String,
    pub notes: Option<String>,
    pub reference_id: Option<Uuid>,
    pub actor: Option<Uuid>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct BulkSetStockRequest {
    #[validate(length(min = 1))]
    pub updates: Vec<BulkStockUpdate>,
    pub notes: Option<String>,
    pub actor: Option<Uuid>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RefundLineRequest {
    pub order_item_id: Uuid,
    #[validate(range(min = 1))]
    pub quantity: i32,
    #[validate(custom = "non_negative")]
    pub amount: Decimal,
    #[serde(default)]
    pub restock_items: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateRefundRequest {
    pub order_id: Uuid,
    #[validate(custom = "positive")]
    pub amount: Decimal,
    #[validate(length(min = 1))]
    pub reason: String,
    #[serde(default)]
    #[validate]
    pub items: Vec<RefundLineRequest>,
    #[validate(length(min = 1))]
    pub refund_method: String,
}

impl From<CreateRefundRequest> for RefundRequest {
    fn from(r: CreateRefundRequest) -> Self {
        let items = r.items.into_iter()
            .map(|l| RefundLine { order_item_id: l.order_item_id, quantity: l.quantity, amount: l.amount, restock_items: l.restock_items })
            .collect();
        RefundRequest { order_id: r.order_id, amount: r.amount, reason: r.reason, items, refund_method: r.refund_method }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateRefundStatusRequest {
    pub refund_id: Uuid,
    pub status: RefundStatus,
    pub transaction_id: Option<String>,
    pub actor: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody { pub kind: &'static str, pub message: String }

fn error_kind(e: &EconomicsError) -> &'static str {
    match e {
        EconomicsError::NotFound { .. } => "not_found",
        EconomicsError::InvalidArgument(_) => "invalid_argument",
        EconomicsError::Conflict(_) => "conflict",
        EconomicsError::BusinessRuleViolation(_) => "business_rule_violation",
        EconomicsError::Storage(_) => "storage",
    }
}

fn reply_err(kind: &'static str, message: impl Into<String>) -> Value {
    json!({ "ok": false, "error": ErrorBody { kind, message: message.into() } })
}

fn reply<T: Serialize>(result: Result<T, EconomicsError>) -> Value {
    match result {
        Ok(data) => json!({ "ok": true, "data": data }),
        Err(e) => reply_err(error_kind(&e), e.to_string()),
    }
}

fn parse<T: for<'de> Deserialize<'de> + Validate>(payload: &[u8]) -> Result<T, Value> {
    let request: T = serde_json::from_slice(payload).map_err(|e| reply_err("invalid_argument", format!("malformed payload: {e}")))?;
    request.validate().map_err(|e| reply_err("invalid_argument", e.to_string()))?;
    Ok(request)
}

/// Runs one command and returns the JSON reply body.
pub async fn dispatch<S: EconomicsStore>(engine: &Engine<S>, command: Command, payload: &[u8]) -> Value {
    match run(engine, command, payload).await {
        Ok(body) | Err(body) => body,
    }
}

async fn run<S: EconomicsStore>(engine: &Engine<S>, command: Command, payload: &[u8]) -> Result<Value, Value> {
    Ok(match command {
        Command::ValidateCoupon => {
            let r: ValidateCouponRequest = parse(payload)?;
            reply(engine.validate_coupon(&r.code, &r.items, r.cart_total, r.user_id, r.email.as_deref()).await)
        }
        Command::ApplyCoupon => {
            let r: CouponUsageRequest = parse(payload)?;
            reply(engine.apply_coupon(r.coupon_id, r.user_id, r.order_id).await)
        }
        Command::RevertCoupon => {
            let r: CouponUsageRequest = parse(payload)?;
            reply(engine.revert_coupon(r.coupon_id, r.user_id, r.order_id).await.map(|removed| json!({ "usages_removed": removed })))
        }
        Command::AdjustStock => {
            let r: AdjustStockRequest = parse(payload)?;
            let mut adjustment = StockAdjustment::new(r.target, r.adjustment_type, r.quantity, r.reason).notes(r.notes).actor(r.actor);
            if let Some(reference_id) = r.reference_id { adjustment = adjustment.reference(reference_id); }
            reply(engine.adjust_stock(adjustment).await)
        }
        Command::BulkSetStock => {
            let r: BulkSetStockRequest = parse(payload)?;
            reply(engine.bulk_set_stock(&r.updates, r.notes, r.actor).await)
        }
        Command::CreateRefund => {
            let r: CreateRefundRequest = parse(payload)?;
            reply(engine.create_refund(r.into()).await)
        }
        Command::UpdateRefundStatus => {
            let r: UpdateRefundStatusRequest = parse(payload)?;
            reply(engine.update_refund_status(r.refund_id, r.status, r.transaction_id, r.actor).await.map(|s| s.refund))
        }
    })
}
