//! OpenSASE Order Economics
//!
//! The money-affecting rules behind checkout and after-sales.
//!
//! ## Features
//! - Stock ledger with an append-only adjustment log
//! - Coupon validation and discount calculation
//! - Coupon usage tracking
//! - Partial refunds with restocking and payment-status settlement

pub mod config;
pub mod domain;
pub mod engine;
pub mod services;
pub mod store;

pub use domain::aggregates::*;
pub use engine::Engine;
pub use store::{EconomicsStore, MemoryStore, PgStore};

use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum EconomicsError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// Carries the shopper-facing message verbatim.
    #[error("{0}")]
    BusinessRuleViolation(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl EconomicsError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound { entity, id: id.to_string() }
    }
}

impl From<sqlx::Error> for EconomicsError {
    fn from(e: sqlx::Error) -> Self { Self::Storage(e.to_string()) }
}

impl From<serde_json::Error> for EconomicsError {
    fn from(e: serde_json::Error) -> Self { Self::Storage(e.to_string()) }
}

pub type Result<T> = std::result::Result<T, EconomicsError>;
