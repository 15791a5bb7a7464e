//! Refund Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;
use crate::domain::aggregates::order::Order;
use crate::domain::value_objects::display_amount;
use crate::EconomicsError;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefundStatus { #[default] Pending, Completed, Rejected }

impl RefundStatus {
    pub fn as_str(&self) -> &'static str { match self { Self::Pending => "PENDING", Self::Completed => "COMPLETED", Self::Rejected => "REJECTED" } }
    pub fn is_terminal(&self) -> bool { matches!(self, Self::Completed | Self::Rejected) }
}

impl FromStr for RefundStatus {
    type Err = EconomicsError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "COMPLETED" => Ok(Self::Completed),
            "REJECTED" => Ok(Self::Rejected),
            other => Err(EconomicsError::InvalidArgument(format!("invalid refund status: {other}"))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Refund {
    pub id: Uuid,
    pub order_id: Uuid,
    pub amount: Decimal,
    pub reason: String,
    pub status: RefundStatus,
    pub refund_method: String,
    pub transaction_id: Option<String>,
    pub items: Vec<RefundItem>,
    pub processed_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RefundItem {
    pub id: Uuid,
    pub order_item_id: Uuid,
    pub quantity: i32,
    pub amount: Decimal,
    pub restock_items: bool,
}

/// Requested line of a refund.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RefundLine {
    pub order_item_id: Uuid,
    pub quantity: i32,
    pub amount: Decimal,
    #[serde(default)]
    pub restock_items: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RefundRequest {
    pub order_id: Uuid,
    pub amount: Decimal,
    pub reason: String,
    #[serde(default)]
    pub items: Vec<RefundLine>,
    pub refund_method: String,
}

/// Sum of every refund that still counts against the order.
pub fn refunded_total<'a>(refunds: impl IntoIterator<Item = &'a Refund>) -> Decimal {
    refunds.into_iter().filter(|r| r.status != RefundStatus::Rejected).map(|r| r.amount).sum()
}

impl RefundRequest {
    /// Checks the request against the order and what has already been refunded.
    pub fn validate(&self, order: &Order, already_refunded: Decimal) -> Result<(), EconomicsError> {
        if self.amount <= Decimal::ZERO {
            return Err(EconomicsError::InvalidArgument("Refund amount must be greater than zero".into()));
        }
        if self.amount.normalize().scale() > 2 {
            return Err(EconomicsError::InvalidArgument("Refund amount cannot have more than two decimal places".into()));
        }
        let remaining = order.total - already_refunded;
        if self.amount > remaining {
            return Err(EconomicsError::InvalidArgument(format!(
                "Refund amount exceeds remaining order value of ₹{}", display_amount(remaining)
            )));
        }
        for line in &self.items {
            let item = order.item(line.order_item_id).ok_or_else(|| EconomicsError::InvalidArgument(format!(
                "order item {} does not belong to order {}", line.order_item_id, order.id
            )))?;
            if line.quantity <= 0 || line.quantity > item.quantity {
                return Err(EconomicsError::InvalidArgument(format!(
                    "refund quantity {} out of range for order item {} (ordered {})", line.quantity, item.id, item.quantity
                )));
            }
            if line.amount < Decimal::ZERO || line.amount.normalize().scale() > 2 {
                return Err(EconomicsError::InvalidArgument(format!("invalid refund amount {} for order item {}", line.amount, item.id)));
            }
        }
        Ok(())
    }

    pub fn into_refund(self) -> Refund {
        let now = Utc::now();
        let items = self.items.into_iter().map(|l| RefundItem {
            id: Uuid::now_v7(), order_item_id: l.order_item_id, quantity: l.quantity, amount: l.amount, restock_items: l.restock_items,
        }).collect();
        Refund {
            id: Uuid::now_v7(), order_id: self.order_id, amount: self.amount, reason: self.reason, status: RefundStatus::Pending,
            refund_method: self.refund_method, transaction_id: None, items, processed_by: None, created_at: now, updated_at: now,
        }
    }
}

impl Refund {
    /// Moves the refund to `next`. Terminal refunds cannot move.
    pub fn transition(&mut self, next: RefundStatus, transaction_id: Option<String>, actor: Option<Uuid>) -> Result<(), EconomicsError> {
        if self.status.is_terminal() {
            return Err(EconomicsError::Conflict(format!("refund {} is already {}", self.id, self.status.as_str())));
        }
        self.status = next;
        if transaction_id.is_some() { self.transaction_id = transaction_id; }
        self.processed_by = actor.or(self.processed_by);
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn restock_lines(&self) -> impl Iterator<Item = &RefundItem> { self.items.iter().filter(|i| i.restock_items) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::order::OrderItem;
    use rust_decimal_macros::dec;

    fn order_with_item(total: Decimal, qty: i32) -> Order {
        Order::new("ORD-1", total, vec![OrderItem::new(Uuid::new_v4(), None, qty, total / Decimal::from(qty))])
    }

    fn request(order: &Order, amount: Decimal) -> RefundRequest {
        RefundRequest { order_id: order.id, amount, reason: "damaged".into(), items: vec![], refund_method: "original".into() }
    }

    #[test]
    fn test_amount_exceeds_remaining() {
        let order = order_with_item(dec!(1000), 4);
        let err = request(&order, dec!(700)).validate(&order, dec!(400)).unwrap_err();
        assert!(matches!(err, EconomicsError::InvalidArgument(m) if m.starts_with("Refund amount exceeds remaining order value")));
        assert!(request(&order, dec!(600)).validate(&order, dec!(400)).is_ok());
    }

    #[test]
    fn test_non_positive_amount() {
        let order = order_with_item(dec!(10), 1);
        assert!(request(&order, Decimal::ZERO).validate(&order, Decimal::ZERO).is_err());
    }

    #[test]
    fn test_sub_cent_amounts() {
        let order = order_with_item(dec!(10), 1);
        let err = request(&order, dec!(0.001)).validate(&order, Decimal::ZERO).unwrap_err();
        assert!(matches!(err, EconomicsError::InvalidArgument(m) if m == "Refund amount cannot have more than two decimal places"));
        assert!(request(&order, dec!(2.500)).validate(&order, Decimal::ZERO).is_ok());

        let mut req = request(&order, dec!(1));
        req.items.push(RefundLine { order_item_id: order.items[0].id, quantity: 1, amount: dec!(0.999), restock_items: false });
        assert!(matches!(req.validate(&order, Decimal::ZERO), Err(EconomicsError::InvalidArgument(_))));
    }

    #[test]
    fn test_line_must_belong_to_order() {
        let order = order_with_item(dec!(100), 2);
        let mut req = request(&order, dec!(50));
        req.items.push(RefundLine { order_item_id: Uuid::new_v4(), quantity: 1, amount: dec!(50), restock_items: true });
        assert!(req.validate(&order, Decimal::ZERO).is_err());
        req.items[0].order_item_id = order.items[0].id;
        req.items[0].quantity = 3;
        assert!(req.validate(&order, Decimal::ZERO).is_err());
        req.items[0].quantity = 2;
        assert!(req.validate(&order, Decimal::ZERO).is_ok());
    }

    #[test]
    fn test_terminal_states_are_final() {
        let order = order_with_item(dec!(100), 1);
        let mut refund = request(&order, dec!(10)).into_refund();
        refund.transition(RefundStatus::Completed, Some("txn_1".into()), None).unwrap();
        assert_eq!(refund.transaction_id.as_deref(), Some("txn_1"));
        assert!(matches!(refund.transition(RefundStatus::Rejected, None, None), Err(EconomicsError::Conflict(_))));
    }

    #[test]
    fn test_refunded_total_skips_rejected() {
        let order = order_with_item(dec!(100), 1);
        let a = request(&order, dec!(30)).into_refund();
        let mut b = request(&order, dec!(20)).into_refund();
        b.status = RefundStatus::Rejected;
        assert_eq!(refunded_total([&a, &b]), dec!(30));
    }
}
