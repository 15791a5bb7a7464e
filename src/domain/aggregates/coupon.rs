//! Coupon Aggregate
//!
//! Eligibility and discount rules. Everything here is pure: the caller supplies
//! the clock and the user's prior redemption count, and nothing mutates usage.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use crate::domain::aggregates::cart::CartLine;
use crate::domain::value_objects::{display_amount, parse_allowed_emails, round2, CouponCode};
use crate::EconomicsError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CouponType { Percentage, FixedCart, FixedProduct, FreeShipping }

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RestrictionMode { Include, Exclude }

impl CouponType {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Percentage => "PERCENTAGE", Self::FixedCart => "FIXED_CART", Self::FixedProduct => "FIXED_PRODUCT", Self::FreeShipping => "FREE_SHIPPING" }
    }
}

impl FromStr for CouponType {
    type Err = EconomicsError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PERCENTAGE" => Ok(Self::Percentage),
            "FIXED_CART" => Ok(Self::FixedCart),
            "FIXED_PRODUCT" => Ok(Self::FixedProduct),
            "FREE_SHIPPING" => Ok(Self::FreeShipping),
            other => Err(EconomicsError::InvalidArgument(format!("unknown coupon type: {other}"))),
        }
    }
}

impl RestrictionMode {
    pub fn as_str(&self) -> &'static str { match self { Self::Include => "INCLUDE", Self::Exclude => "EXCLUDE" } }
}

impl FromStr for RestrictionMode {
    type Err = EconomicsError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INCLUDE" => Ok(Self::Include),
            "EXCLUDE" => Ok(Self::Exclude),
            other => Err(EconomicsError::InvalidArgument(format!("unknown restriction mode: {other}"))),
        }
    }
}

/// A product or category id tagged INCLUDE or EXCLUDE.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Restriction { pub id: Uuid, pub mode: RestrictionMode }

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coupon {
    pub id: Uuid,
    pub code: CouponCode,
    pub coupon_type: CouponType,
    pub value: Decimal,
    pub usage_limit: Option<i64>,
    pub usage_limit_per_user: Option<i64>,
    pub limit_usage_to_x_items: Option<i64>,
    pub min_order_value: Option<Decimal>,
    pub max_order_value: Option<Decimal>,
    pub max_discount: Option<Decimal>,
    pub individual_use_only: bool,
    pub exclude_sale_items: bool,
    /// Serialized JSON list of literal addresses or `*` patterns.
    pub allowed_emails: Option<String>,
    pub is_active: bool,
    pub starts_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub usage_count: i64,
    pub product_restrictions: Vec<Restriction>,
    pub category_restrictions: Vec<Restriction>,
}

/// Why a coupon was refused. `Display` is the message shown to shoppers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CouponRejection {
    UnknownCode,
    Inactive,
    NotYetActive,
    Expired,
    UsageLimitReached,
    UserUsageLimitReached,
    EmailNotAllowed,
    BelowMinimumOrder(Decimal),
    AboveMaximumOrder(Decimal),
    NoApplicableItems,
}

impl fmt::Display for CouponRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownCode => write!(f, "Invalid coupon code"),
            Self::Inactive => write!(f, "Coupon is not active"),
            Self::NotYetActive => write!(f, "Coupon is not yet active"),
            Self::Expired => write!(f, "Coupon has expired"),
            Self::UsageLimitReached => write!(f, "Coupon usage limit reached"),
            Self::UserUsageLimitReached => write!(f, "You have reached the usage limit for this coupon"),
            Self::EmailNotAllowed => write!(f, "Coupon is not valid for your email address"),
            Self::BelowMinimumOrder(min) => write!(f, "Minimum order value of ₹{} required", display_amount(*min)),
            Self::AboveMaximumOrder(max) => write!(f, "Maximum order value of ₹{} exceeded", display_amount(*max)),
            Self::NoApplicableItems => write!(f, "Coupon does not apply to any items in your cart"),
        }
    }
}

/// Result of validating a coupon against a cart.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CouponValidation {
    pub valid: bool,
    pub discount: Decimal,
    pub error: Option<String>,
    pub applies_free_shipping: bool,
    pub coupon_id: Option<Uuid>,
}

impl CouponValidation {
    pub fn accepted(coupon_id: Uuid, discount: Decimal, applies_free_shipping: bool) -> Self {
        Self { valid: true, discount, error: None, applies_free_shipping, coupon_id: Some(coupon_id) }
    }

    pub fn rejected(rejection: &CouponRejection) -> Self {
        Self { valid: false, discount: Decimal::ZERO, error: Some(rejection.to_string()), applies_free_shipping: false, coupon_id: None }
    }

    /// For callers that want a rejection as an error.
    pub fn into_result(self) -> Result<Self, EconomicsError> {
        if self.valid { return Ok(self); }
        let message = self.error.unwrap_or_else(|| CouponRejection::UnknownCode.to_string());
        Err(EconomicsError::BusinessRuleViolation(message))
    }
}

/// Caller-supplied facts for one evaluation.
#[derive(Clone, Debug)]
pub struct EvaluationContext<'a> {
    pub now: DateTime<Utc>,
    pub email: Option<&'a str>,
    /// Prior redemptions by the requesting user; `None` for guests.
    pub user_usage_count: Option<i64>,
}

type ItemFilter = fn(&Coupon, &CartLine) -> bool;

/// Applied in this order; the order matters when restrictions overlap.
const ITEM_FILTERS: [ItemFilter; 5] = [
    Coupon::passes_product_include,
    Coupon::passes_product_exclude,
    Coupon::passes_category_include,
    Coupon::passes_category_exclude,
    Coupon::passes_sale_exclusion,
];

impl Coupon {
    pub fn new(code: CouponCode, coupon_type: CouponType, value: Decimal) -> Self {
        Self {
            id: Uuid::now_v7(), code, coupon_type, value,
            usage_limit: None, usage_limit_per_user: None, limit_usage_to_x_items: None,
            min_order_value: None, max_order_value: None, max_discount: None,
            individual_use_only: false, exclude_sale_items: false, allowed_emails: None,
            is_active: true, starts_at: None, expires_at: None, usage_count: 0,
            product_restrictions: vec![], category_restrictions: vec![],
        }
    }

    pub fn evaluate(&self, cart: &[CartLine], cart_total: Decimal, ctx: &EvaluationContext<'_>) -> Result<CouponValidation, CouponRejection> {
        self.check_window(ctx.now)?;
        self.check_usage(ctx.user_usage_count)?;
        self.check_email(ctx.email)?;
        self.check_order_bounds(cart_total)?;

        let applicable = self.applicable_items(cart);
        if applicable.is_empty() { return Err(CouponRejection::NoApplicableItems); }
        if self.coupon_type == CouponType::FreeShipping {
            return Ok(CouponValidation::accepted(self.id, Decimal::ZERO, true));
        }
        Ok(CouponValidation::accepted(self.id, self.discount_for(&applicable), false))
    }

    fn check_window(&self, now: DateTime<Utc>) -> Result<(), CouponRejection> {
        if !self.is_active { return Err(CouponRejection::Inactive); }
        if self.starts_at.is_some_and(|s| now < s) { return Err(CouponRejection::NotYetActive); }
        if self.expires_at.is_some_and(|e| now > e) { return Err(CouponRejection::Expired); }
        Ok(())
    }

    fn check_usage(&self, user_usage_count: Option<i64>) -> Result<(), CouponRejection> {
        if self.usage_limit.is_some_and(|limit| self.usage_count >= limit) { return Err(CouponRejection::UsageLimitReached); }
        if let (Some(used), Some(limit)) = (user_usage_count, self.usage_limit_per_user) {
            if used >= limit { return Err(CouponRejection::UserUsageLimitReached); }
        }
        Ok(())
    }

    /// An unparseable allow-list is skipped.
    fn check_email(&self, email: Option<&str>) -> Result<(), CouponRejection> {
        let (Some(stored), Some(email)) = (self.allowed_emails.as_deref(), email) else { return Ok(()) };
        match parse_allowed_emails(stored) {
            Some(patterns) if !patterns.iter().any(|p| p.matches(email)) => Err(CouponRejection::EmailNotAllowed),
            _ => Ok(()),
        }
    }

    fn check_order_bounds(&self, cart_total: Decimal) -> Result<(), CouponRejection> {
        if let Some(min) = self.min_order_value.filter(|min| cart_total < *min) { return Err(CouponRejection::BelowMinimumOrder(min)); }
        if let Some(max) = self.max_order_value.filter(|max| cart_total > *max) { return Err(CouponRejection::AboveMaximumOrder(max)); }
        Ok(())
    }

    pub fn applicable_items<'c>(&self, cart: &'c [CartLine]) -> Vec<&'c CartLine> {
        let eligible = cart.iter().filter(|line| ITEM_FILTERS.iter().all(|keep| keep(self, *line)));
        match self.limit_usage_to_x_items {
            Some(n) => eligible.take(usize::try_from(n).unwrap_or(0)).collect(),
            None => eligible.collect(),
        }
    }

    /// Discount over an already-filtered, non-empty subset. Never negative.
    pub fn discount_for(&self, applicable: &[&CartLine]) -> Decimal {
        let applicable_total: Decimal = applicable.iter().map(|l| l.line_total()).sum();
        let raw = match self.coupon_type {
            CouponType::Percentage => applicable_total * self.value / Decimal::ONE_HUNDRED,
            CouponType::FixedCart => self.value,
            CouponType::FixedProduct => self.value * Decimal::from(applicable.iter().map(|l| i64::from(l.quantity)).sum::<i64>()),
            CouponType::FreeShipping => Decimal::ZERO,
        };
        let capped = self.max_discount.map_or(raw, |cap| raw.min(cap));
        round2(capped.min(applicable_total).max(Decimal::ZERO))
    }

    fn includes(rules: &[Restriction]) -> impl Iterator<Item = Uuid> + '_ { rules.iter().filter(|r| r.mode == RestrictionMode::Include).map(|r| r.id) }
    fn excludes(rules: &[Restriction]) -> impl Iterator<Item = Uuid> + '_ { rules.iter().filter(|r| r.mode == RestrictionMode::Exclude).map(|r| r.id) }

    fn passes_product_include(&self, line: &CartLine) -> bool {
        let mut ids = Self::includes(&self.product_restrictions).peekable();
        ids.peek().is_none() || ids.any(|id| id == line.product_id)
    }

    fn passes_product_exclude(&self, line: &CartLine) -> bool {
        !Self::excludes(&self.product_restrictions).any(|id| id == line.product_id)
    }

    fn passes_category_include(&self, line: &CartLine) -> bool {
        let mut ids = Self::includes(&self.category_restrictions).peekable();
        if ids.peek().is_none() { return true; }
        line.category_id.is_some_and(|cat| ids.any(|id| id == cat))
    }

    fn passes_category_exclude(&self, line: &CartLine) -> bool {
        match line.category_id {
            Some(cat) => !Self::excludes(&self.category_restrictions).any(|id| id == cat),
            None => true,
        }
    }

    fn passes_sale_exclusion(&self, line: &CartLine) -> bool { !(self.exclude_sale_items && line.is_on_sale()) }
}

/// A durable marker that a user redeemed a coupon on an order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouponUsage {
    pub id: Uuid,
    pub coupon_id: Uuid,
    pub user_id: Uuid,
    pub order_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl CouponUsage {
    pub fn record(coupon_id: Uuid, user_id: Uuid, order_id: Option<Uuid>) -> Self {
        Self { id: Uuid::now_v7(), coupon_id, user_id, order_id, created_at: Utc::now() }
    }
}
