//! Cart lines as seen by coupon evaluation

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Evaluation input only; carts are owned by the storefront.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Validate)]
pub struct CartLine {
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    #[validate(range(min = 1))]
    pub quantity: i32,
    #[validate(custom = "non_negative_price")]
    pub unit_price: Decimal,
    #[validate(custom = "non_negative_price")]
    pub compare_at_price: Option<Decimal>,
    pub category_id: Option<Uuid>,
}

fn non_negative_price(price: &Decimal) -> Result<(), ValidationError> {
    if *price < Decimal::ZERO { return Err(ValidationError::new("negative_price")); }
    Ok(())
}

impl CartLine {
    pub fn new(product_id: Uuid, quantity: i32, unit_price: Decimal) -> Self {
        Self { product_id, variant_id: None, quantity, unit_price, compare_at_price: None, category_id: None }
    }
    pub fn in_category(mut self, category_id: Uuid) -> Self { self.category_id = Some(category_id); self }
    pub fn compare_at(mut self, price: Decimal) -> Self { self.compare_at_price = Some(price); self }
    pub fn variant(mut self, variant_id: Uuid) -> Self { self.variant_id = Some(variant_id); self }

    pub fn line_total(&self) -> Decimal { self.unit_price * Decimal::from(self.quantity) }

    /// On sale only when the compare-at price is strictly above the unit price.
    pub fn is_on_sale(&self) -> bool { self.compare_at_price.map(|c| c > self.unit_price).unwrap_or(false) }
}

pub fn cart_total(lines: &[CartLine]) -> Decimal { lines.iter().map(CartLine::line_total).sum() }
