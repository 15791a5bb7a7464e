//! Order Aggregate
//!
//! Orders are created elsewhere; this crate only moves their payment state in
//! response to refunds and appends notes.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;
use crate::EconomicsError;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub total: Decimal,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub items: Vec<OrderItem>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)] pub struct OrderItem { pub id: Uuid, pub product_id: Uuid, pub variant_id: Option<Uuid>, pub quantity: i32, pub unit_price: Decimal }
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)] #[serde(rename_all = "SCREAMING_SNAKE_CASE")] pub enum OrderStatus { #[default] Pending, Confirmed, Processing, Shipped, Delivered, Cancelled, Refunded }
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)] #[serde(rename_all = "SCREAMING_SNAKE_CASE")] pub enum PaymentStatus { #[default] Pending, Paid, PartiallyRefunded, Refunded, Failed }

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING", Self::Confirmed => "CONFIRMED", Self::Processing => "PROCESSING", Self::Shipped => "SHIPPED",
            Self::Delivered => "DELIVERED", Self::Cancelled => "CANCELLED", Self::Refunded => "REFUNDED",
        }
    }
}

impl FromStr for OrderStatus {
    type Err = EconomicsError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending), "CONFIRMED" => Ok(Self::Confirmed), "PROCESSING" => Ok(Self::Processing),
            "SHIPPED" => Ok(Self::Shipped), "DELIVERED" => Ok(Self::Delivered), "CANCELLED" => Ok(Self::Cancelled),
            "REFUNDED" => Ok(Self::Refunded),
            other => Err(EconomicsError::InvalidArgument(format!("unknown order status: {other}"))),
        }
    }
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Pending => "PENDING", Self::Paid => "PAID", Self::PartiallyRefunded => "PARTIALLY_REFUNDED", Self::Refunded => "REFUNDED", Self::Failed => "FAILED" }
    }
}

impl FromStr for PaymentStatus {
    type Err = EconomicsError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending), "PAID" => Ok(Self::Paid), "PARTIALLY_REFUNDED" => Ok(Self::PartiallyRefunded),
            "REFUNDED" => Ok(Self::Refunded), "FAILED" => Ok(Self::Failed),
            other => Err(EconomicsError::InvalidArgument(format!("unknown payment status: {other}"))),
        }
    }
}

impl Order {
    pub fn new(order_number: impl Into<String>, total: Decimal, items: Vec<OrderItem>) -> Self {
        Self { id: Uuid::now_v7(), order_number: order_number.into(), total, status: OrderStatus::Processing, payment_status: PaymentStatus::Paid, items, updated_at: Utc::now() }
    }

    pub fn item(&self, item_id: Uuid) -> Option<&OrderItem> { self.items.iter().find(|i| i.id == item_id) }

    /// After a refund is recorded, with `refunded` the new non-rejected total.
    pub fn settle_refunds(&mut self, refunded: Decimal) {
        if refunded >= self.total {
            self.payment_status = PaymentStatus::Refunded;
            self.status = OrderStatus::Refunded;
        } else if refunded > Decimal::ZERO {
            self.payment_status = PaymentStatus::PartiallyRefunded;
        }
        self.touch();
    }

    /// After a refund is rejected, with `remaining` the non-rejected total of the others.
    pub fn reopen_after_rejection(&mut self, remaining: Decimal) {
        if remaining <= Decimal::ZERO {
            self.payment_status = PaymentStatus::Paid;
        } else if remaining < self.total {
            self.payment_status = PaymentStatus::PartiallyRefunded;
        }
        self.touch();
    }

    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

impl OrderItem {
    pub fn new(product_id: Uuid, variant_id: Option<Uuid>, quantity: i32, unit_price: Decimal) -> Self {
        Self { id: Uuid::now_v7(), product_id, variant_id, quantity, unit_price }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderNote {
    pub id: Uuid,
    pub order_id: Uuid,
    pub body: String,
    pub customer_visible: bool,
    pub created_at: DateTime<Utc>,
}

impl OrderNote {
    pub fn private(order_id: Uuid, body: impl Into<String>) -> Self { Self::build(order_id, body.into(), false) }
    pub fn customer(order_id: Uuid, body: impl Into<String>) -> Self { Self::build(order_id, body.into(), true) }
    fn build(order_id: Uuid, body: String, customer_visible: bool) -> Self {
        Self { id: Uuid::now_v7(), order_id, body, customer_visible, created_at: Utc::now() }
    }
}
