//! Stock Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;
use crate::EconomicsError;

/// A product, or one variant of a product. Variants carry their parent product id.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StockTarget {
    Product { product_id: Uuid },
    Variant { product_id: Uuid, variant_id: Uuid },
}

impl StockTarget {
    pub fn product(product_id: Uuid) -> Self { Self::Product { product_id } }
    pub fn variant(product_id: Uuid, variant_id: Uuid) -> Self { Self::Variant { product_id, variant_id } }

    pub fn from_parts(product_id: Uuid, variant_id: Option<Uuid>) -> Self {
        match variant_id { Some(variant_id) => Self::variant(product_id, variant_id), None => Self::product(product_id) }
    }

    pub fn product_id(&self) -> Uuid {
        match self { Self::Product { product_id } | Self::Variant { product_id, .. } => *product_id }
    }

    pub fn variant_id(&self) -> Option<Uuid> {
        match self { Self::Product { .. } => None, Self::Variant { variant_id, .. } => Some(*variant_id) }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Product { product_id } => format!("product {product_id}"),
            Self::Variant { variant_id, .. } => format!("variant {variant_id}"),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StockStatus { #[default] InStock, LowStock, OutOfStock, OnBackorder }

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BackorderMode { #[default] No, Allowed, Notify }

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdjustmentType { Increase, Decrease, Set }

impl StockStatus {
    pub fn as_str(&self) -> &'static str {
        match self { Self::InStock => "IN_STOCK", Self::LowStock => "LOW_STOCK", Self::OutOfStock => "OUT_OF_STOCK", Self::OnBackorder => "ON_BACKORDER" }
    }
}

impl FromStr for StockStatus {
    type Err = EconomicsError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IN_STOCK" => Ok(Self::InStock),
            "LOW_STOCK" => Ok(Self::LowStock),
            "OUT_OF_STOCK" => Ok(Self::OutOfStock),
            "ON_BACKORDER" => Ok(Self::OnBackorder),
            other => Err(EconomicsError::InvalidArgument(format!("unknown stock status: {other}"))),
        }
    }
}

impl BackorderMode {
    pub fn as_str(&self) -> &'static str {
        match self { Self::No => "NO", Self::Allowed => "ALLOWED", Self::Notify => "NOTIFY" }
    }
}

impl FromStr for BackorderMode {
    type Err = EconomicsError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NO" => Ok(Self::No),
            "ALLOWED" => Ok(Self::Allowed),
            "NOTIFY" => Ok(Self::Notify),
            other => Err(EconomicsError::InvalidArgument(format!("unknown backorder mode: {other}"))),
        }
    }
}

impl AdjustmentType {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Increase => "INCREASE", Self::Decrease => "DECREASE", Self::Set => "SET" }
    }
}

impl FromStr for AdjustmentType {
    type Err = EconomicsError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "INCREASE" => Ok(Self::Increase),
            "DECREASE" => Ok(Self::Decrease),
            "SET" => Ok(Self::Set),
            other => Err(EconomicsError::InvalidArgument(format!("invalid adjustment type: {other}"))),
        }
    }
}

/// Well-known ledger reasons. The column itself is free-form.
pub mod reason {
    pub const ADJUSTMENT: &str = "ADJUSTMENT";
    pub const REFUND: &str = "REFUND";
    pub const BULK_UPDATE: &str = "BULK_UPDATE";
    pub const SALE: &str = "SALE";
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockRecord {
    pub target: StockTarget,
    pub quantity: i32,
    pub status: StockStatus,
    pub low_stock_threshold: Option<i32>,
    /// Ignored for variants.
    pub backorder_mode: BackorderMode,
    pub updated_at: DateTime<Utc>,
}

impl StockRecord {
    pub fn new(target: StockTarget, quantity: i32) -> Self {
        let mut record = Self { target, quantity, status: StockStatus::InStock, low_stock_threshold: None, backorder_mode: BackorderMode::No, updated_at: Utc::now() };
        record.status = record.derive_status(quantity);
        record
    }

    pub fn with_backorder(mut self, mode: BackorderMode) -> Self { self.backorder_mode = mode; self.status = self.derive_status(self.quantity); self }
    pub fn with_low_stock_threshold(mut self, threshold: i32) -> Self { self.low_stock_threshold = Some(threshold); self }

    /// Variants have no backorder concept.
    pub fn derive_status(&self, quantity: i32) -> StockStatus {
        if quantity > 0 { return StockStatus::InStock; }
        match self.target {
            StockTarget::Variant { .. } => StockStatus::OutOfStock,
            StockTarget::Product { .. } if self.backorder_mode != BackorderMode::No => StockStatus::OnBackorder,
            StockTarget::Product { .. } => StockStatus::OutOfStock,
        }
    }

    pub fn is_low_stock(&self) -> bool {
        self.low_stock_threshold.map(|t| self.quantity > 0 && self.quantity <= t).unwrap_or(false)
    }

    /// Applies an adjustment in place and returns `(previous, new)` quantities.
    pub fn apply(&mut self, kind: AdjustmentType, quantity: i32) -> Result<(i32, i32), EconomicsError> {
        if quantity < 0 {
            return Err(EconomicsError::InvalidArgument(format!("adjustment quantity must be non-negative, got {quantity}")));
        }
        let previous = self.quantity;
        let next = match kind {
            AdjustmentType::Increase => previous.checked_add(quantity).ok_or_else(|| EconomicsError::InvalidArgument("stock quantity overflow".into()))?,
            AdjustmentType::Decrease => previous.saturating_sub(quantity).max(0),
            AdjustmentType::Set => quantity,
        };
        self.quantity = next;
        self.status = self.derive_status(next);
        self.updated_at = Utc::now();
        Ok((previous, next))
    }
}

/// Append-only ledger row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryLogEntry {
    pub id: Uuid,
    pub target: StockTarget,
    pub adjustment_type: AdjustmentType,
    pub quantity: i32,
    pub previous_qty: i32,
    pub new_qty: i32,
    pub reason: String,
    pub notes: Option<String>,
    pub reference_id: Option<Uuid>,
    pub actor: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// One requested adjustment.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StockAdjustment {
    pub target: StockTarget,
    pub adjustment_type: AdjustmentType,
    pub quantity: i32,
    pub reason: String,
    pub notes: Option<String>,
    pub reference_id: Option<Uuid>,
    pub actor: Option<Uuid>,
}

impl StockAdjustment {
    pub fn new(target: StockTarget, adjustment_type: AdjustmentType, quantity: i32, reason: impl Into<String>) -> Self {
        Self { target, adjustment_type, quantity, reason: reason.into(), notes: None, reference_id: None, actor: None }
    }
    pub fn notes(mut self, notes: Option<String>) -> Self { self.notes = notes; self }
    pub fn reference(mut self, reference_id: Uuid) -> Self { self.reference_id = Some(reference_id); self }
    pub fn actor(mut self, actor: Option<Uuid>) -> Self { self.actor = actor; self }

    pub fn log_entry(&self, previous_qty: i32, new_qty: i32) -> InventoryLogEntry {
        InventoryLogEntry {
            id: Uuid::now_v7(), target: self.target.clone(), adjustment_type: self.adjustment_type,
            quantity: self.quantity, previous_qty, new_qty, reason: self.reason.clone(), notes: self.notes.clone(),
            reference_id: self.reference_id, actor: self.actor, created_at: Utc::now(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AdjustmentOutcome {
    pub previous_qty: i32,
    pub new_qty: i32,
    pub status: StockStatus,
    pub log_entry: InventoryLogEntry,
}

/// Absolute quantity for one target in a bulk update.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BulkStockUpdate {
    pub target: StockTarget,
    pub quantity: i32,
}

/// One line of a placed order, consumed by sale recording.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SaleLine {
    pub target: StockTarget,
    pub quantity: i32,
}
