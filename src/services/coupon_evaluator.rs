//! Coupon Evaluator. Read-only with respect to usage counters.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;
use crate::domain::aggregates::{CartLine, CouponRejection, CouponValidation, EvaluationContext};
use crate::domain::value_objects::CouponCode;
use crate::store::EconomicsStore;
use crate::Result;

pub struct CouponEvaluator<S> { store: Arc<S> }

impl<S> Clone for CouponEvaluator<S> {
    fn clone(&self) -> Self { Self { store: self.store.clone() } }
}

impl<S: EconomicsStore> CouponEvaluator<S> {
    pub fn new(store: Arc<S>) -> Self { Self { store } }

    pub async fn validate(&self, code: &str, items: &[CartLine], cart_total: Decimal, user_id: Option<Uuid>, email: Option<&str>) -> Result<CouponValidation> {
        self.validate_at(Utc::now(), code, items, cart_total, user_id, email).await
    }

    pub async fn validate_at(
        &self,
        now: DateTime<Utc>,
        code: &str,
        items: &[CartLine],
        cart_total: Decimal,
        user_id: Option<Uuid>,
        email: Option<&str>,
    ) -> Result<CouponValidation> {
        let Ok(code) = CouponCode::new(code) else { return Ok(CouponValidation::rejected(&CouponRejection::UnknownCode)) };
        let Some(coupon) = self.store.coupon_by_code(code.as_str()).await? else {
            debug!(%code, "unknown coupon code");
            return Ok(CouponValidation::rejected(&CouponRejection::UnknownCode));
        };

        let user_usage_count = match (user_id, coupon.usage_limit_per_user) {
            (Some(user_id), Some(_)) => Some(self.store.count_user_usages(coupon.id, user_id).await?),
            _ => None,
        };
        let ctx = EvaluationContext { now, email, user_usage_count };

        match coupon.evaluate(items, cart_total, &ctx) {
            Ok(validation) => {
                debug!(%code, discount = %validation.discount, free_shipping = validation.applies_free_shipping, "coupon accepted");
                Ok(validation)
            }
            Err(rejection) => {
                debug!(%code, %rejection, "coupon rejected");
                Ok(CouponValidation::rejected(&rejection))
            }
        }
    }
}
