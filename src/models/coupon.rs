use bigdecimal::{BigDecimal, RoundingMode};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::schema::coupons;

pub const DISCOUNT_PERCENTAGE: &str = "percentage";
pub const DISCOUNT_FIXED: &str = "fixed";

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = coupons)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Coupon {
    pub id: Uuid,
    pub code: String,
    pub description: Option<String>,
    pub discount_type: String,
    pub discount_value: BigDecimal,
    pub min_order_amount: BigDecimal,
    pub max_discount_amount: Option<BigDecimal>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub max_uses: Option<i32>,
    pub max_uses_per_user: Option<i32>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = coupons)]
pub struct NewCoupon {
    pub id: Uuid,
    pub code: String,
    pub description: Option<String>,
    pub discount_type: String,
    pub discount_value: BigDecimal,
    pub min_order_amount: BigDecimal,
    pub max_discount_amount: Option<BigDecimal>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub max_uses: Option<i32>,
    pub max_uses_per_user: Option<i32>,
    pub is_active: bool,
}

impl Coupon {
    /// Discount owed against `order_total`, rounded half-up to 2 decimal
    /// places.
    ///
    /// Percentage discounts are capped at `max_discount_amount` when one is
    /// set; fixed discounts never exceed the order total. A discount type
    /// outside the enum is an internal inconsistency (creation validates the
    /// enum), so it surfaces as a server fault rather than a caller error.
    pub fn compute_discount(&self, order_total: &BigDecimal) -> Result<BigDecimal, AppError> {
        let raw = match self.discount_type.as_str() {
            DISCOUNT_PERCENTAGE => {
                let raw = order_total * &self.discount_value / BigDecimal::from(100);
                match &self.max_discount_amount {
                    Some(cap) if &raw > cap => cap.clone(),
                    _ => raw,
                }
            }
            DISCOUNT_FIXED => self.discount_value.clone().min(order_total.clone()),
            other => {
                return Err(AppError::Internal(format!(
                    "Invalid discount type: {}",
                    other
                )))
            }
        };

        Ok(raw.with_scale_round(2, RoundingMode::HalfUp))
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).expect("valid decimal")
    }

    fn coupon(discount_type: &str, value: &str, cap: Option<&str>) -> Coupon {
        Coupon {
            id: Uuid::new_v4(),
            code: "TEST".to_string(),
            description: None,
            discount_type: discount_type.to_string(),
            discount_value: dec(value),
            min_order_amount: dec("0"),
            max_discount_amount: cap.map(dec),
            valid_from: None,
            valid_until: None,
            max_uses: None,
            max_uses_per_user: None,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn percentage_discount() {
        let c = coupon(DISCOUNT_PERCENTAGE, "10", None);
        assert_eq!(c.compute_discount(&dec("50.00")).unwrap(), dec("5.00"));
    }

    #[test]
    fn percentage_discount_capped_at_max() {
        let c = coupon(DISCOUNT_PERCENTAGE, "20", Some("15.00"));
        assert_eq!(c.compute_discount(&dec("100.00")).unwrap(), dec("15.00"));
    }

    #[test]
    fn percentage_discount_below_cap_is_untouched() {
        let c = coupon(DISCOUNT_PERCENTAGE, "20", Some("15.00"));
        assert_eq!(c.compute_discount(&dec("50.00")).unwrap(), dec("10.00"));
    }

    #[test]
    fn percentage_discount_rounds_half_up() {
        // 33.33 * 15% = 4.9995 -> 5.00
        let c = coupon(DISCOUNT_PERCENTAGE, "15", None);
        assert_eq!(c.compute_discount(&dec("33.33")).unwrap(), dec("5.00"));
    }

    #[test]
    fn fixed_discount() {
        let c = coupon(DISCOUNT_FIXED, "5.00", None);
        assert_eq!(c.compute_discount(&dec("50.00")).unwrap(), dec("5.00"));
    }

    #[test]
    fn fixed_discount_never_exceeds_order_total() {
        let c = coupon(DISCOUNT_FIXED, "25.00", None);
        assert_eq!(c.compute_discount(&dec("10.00")).unwrap(), dec("10.00"));
    }

    #[test]
    fn unknown_discount_type_is_a_server_fault() {
        let c = coupon("bogus", "5.00", None);
        assert!(matches!(
            c.compute_discount(&dec("50.00")),
            Err(AppError::Internal(_))
        ));
    }
}
