use actix_web::{web, HttpResponse};
use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::db::DbPool;
use crate::errors::AppError;
use crate::handlers::orders::{order_response, OrderResponse};
use crate::models::coupon::{Coupon, NewCoupon, DISCOUNT_FIXED, DISCOUNT_PERCENTAGE};
use crate::models::coupon_usage::NewCouponUsage;
use crate::models::order::{Order, STATUS_PENDING};
use crate::models::order_item::OrderItem;
use crate::schema::{coupon_usage, coupons, order_items, orders};

// ── Request / response DTOs ──────────────────────────────────────────────────

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateCouponRequest {
    pub code: String,
    pub description: Option<String>,
    pub discount_type: String,
    /// Decimal value as a string: a percentage for "percentage" coupons, an
    /// absolute amount for "fixed" ones.
    pub discount_value: String,
    pub min_order_amount: Option<String>,
    pub max_discount_amount: Option<String>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub max_uses: Option<i32>,
    pub max_uses_per_user: Option<i32>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CouponResponse {
    pub id: Uuid,
    pub code: String,
    pub description: Option<String>,
    pub discount_type: String,
    pub discount_value: String,
    pub min_order_amount: String,
    pub max_discount_amount: Option<String>,
    pub valid_from: Option<String>,
    pub valid_until: Option<String>,
    pub max_uses: Option<i32>,
    pub max_uses_per_user: Option<i32>,
    pub is_active: bool,
}

fn coupon_response(c: Coupon) -> CouponResponse {
    CouponResponse {
        id: c.id,
        code: c.code,
        description: c.description,
        discount_type: c.discount_type,
        discount_value: c.discount_value.to_string(),
        min_order_amount: c.min_order_amount.to_string(),
        max_discount_amount: c.max_discount_amount.map(|v| v.to_string()),
        valid_from: c.valid_from.map(|t| t.to_rfc3339()),
        valid_until: c.valid_until.map(|t| t.to_rfc3339()),
        max_uses: c.max_uses,
        max_uses_per_user: c.max_uses_per_user,
        is_active: c.is_active,
    }
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApplyCouponRequest {
    pub coupon_code: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DiscountSummary {
    pub code: String,
    pub amount: String,
    pub original_total: String,
    pub new_total: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ApplyCouponResponse {
    pub order: OrderResponse,
    pub discount: DiscountSummary,
}

// ── Handlers ─────────────────────────────────────────────────────────────────

/// GET /coupons
///
/// Lists active coupons whose validity window has not closed, newest first.
#[utoipa::path(
    get,
    path = "/coupons",
    responses(
        (status = 200, description = "Active coupons", body = [CouponResponse]),
        (status = 500, description = "Internal server error"),
    ),
    tag = "coupons"
)]
pub async fn list_coupons(pool: web::Data<DbPool>) -> Result<HttpResponse, AppError> {
    let rows = web::block(move || {
        let mut conn = pool.get()?;

        coupons::table
            .filter(coupons::is_active.eq(true))
            .filter(
                coupons::valid_until
                    .is_null()
                    .or(coupons::valid_until.gt(Utc::now())),
            )
            .select(Coupon::as_select())
            .order(coupons::created_at.desc())
            .load(&mut conn)
            .map_err(AppError::from)
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))??;

    let items: Vec<CouponResponse> = rows.into_iter().map(coupon_response).collect();
    Ok(HttpResponse::Ok().json(items))
}

/// POST /coupons
///
/// Creates a coupon. The discount type is validated against the enum here,
/// which is what lets the redemption path treat an unknown type as a server
/// fault.
#[utoipa::path(
    post,
    path = "/coupons",
    request_body = CreateCouponRequest,
    responses(
        (status = 201, description = "Coupon created", body = CouponResponse),
        (status = 400, description = "Invalid coupon fields or duplicate code"),
        (status = 401, description = "Missing or invalid credential"),
        (status = 500, description = "Internal server error"),
    ),
    tag = "coupons"
)]
pub async fn create_coupon(
    pool: web::Data<DbPool>,
    _user: AuthenticatedUser,
    body: web::Json<CreateCouponRequest>,
) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();

    if body.code.trim().is_empty() {
        return Err(AppError::Validation("code is required".to_string()));
    }
    if body.discount_type != DISCOUNT_PERCENTAGE && body.discount_type != DISCOUNT_FIXED {
        return Err(AppError::Validation(
            "discount_type must be 'percentage' or 'fixed'".to_string(),
        ));
    }

    let discount_value = parse_amount("discount_value", &body.discount_value)?;
    if discount_value <= BigDecimal::zero() {
        return Err(AppError::Validation(
            "discount_value must be positive".to_string(),
        ));
    }
    if body.discount_type == DISCOUNT_PERCENTAGE && discount_value > BigDecimal::from(100) {
        return Err(AppError::Validation(
            "percentage discount cannot exceed 100".to_string(),
        ));
    }

    let min_order_amount = match &body.min_order_amount {
        Some(raw) => parse_amount("min_order_amount", raw)?,
        None => BigDecimal::zero(),
    };
    if min_order_amount < BigDecimal::zero() {
        return Err(AppError::Validation(
            "min_order_amount must be non-negative".to_string(),
        ));
    }

    let max_discount_amount = match &body.max_discount_amount {
        Some(raw) => {
            let value = parse_amount("max_discount_amount", raw)?;
            if value < BigDecimal::zero() {
                return Err(AppError::Validation(
                    "max_discount_amount must be non-negative".to_string(),
                ));
            }
            Some(value)
        }
        None => None,
    };

    let coupon = web::block(move || {
        let mut conn = pool.get()?;

        let new_coupon = NewCoupon {
            id: Uuid::new_v4(),
            code: body.code,
            description: body.description,
            discount_type: body.discount_type,
            discount_value,
            min_order_amount,
            max_discount_amount,
            valid_from: body.valid_from,
            valid_until: body.valid_until,
            max_uses: body.max_uses,
            max_uses_per_user: body.max_uses_per_user,
            is_active: true,
        };
        diesel::insert_into(coupons::table)
            .values(&new_coupon)
            .returning(Coupon::as_returning())
            .get_result(&mut conn)
            .map_err(|e| match e {
                DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                    AppError::Conflict("Coupon code already exists".to_string())
                }
                other => AppError::from(other),
            })
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))??;

    Ok(HttpResponse::Created().json(coupon_response(coupon)))
}

fn parse_amount(field: &str, raw: &str) -> Result<BigDecimal, AppError> {
    BigDecimal::from_str(raw)
        .map_err(|_| AppError::Validation(format!("Invalid {} '{}'", field, raw)))
}

/// POST /orders/{order_id}/apply-coupon
///
/// Applies a coupon to a pending order: reduces the order total and records
/// the usage, all inside one transaction. The checks run in a fixed order
/// and the first violation aborts with no mutation.
#[utoipa::path(
    post,
    path = "/orders/{order_id}/apply-coupon",
    params(
        ("order_id" = Uuid, Path, description = "Order UUID"),
    ),
    request_body = ApplyCouponRequest,
    responses(
        (status = 200, description = "Coupon applied", body = ApplyCouponResponse),
        (status = 400, description = "Business-rule violation"),
        (status = 401, description = "Missing or invalid credential"),
        (status = 404, description = "Order or coupon not found"),
        (status = 500, description = "Internal server error"),
    ),
    tag = "coupons"
)]
pub async fn apply_coupon(
    pool: web::Data<DbPool>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
    body: web::Json<ApplyCouponRequest>,
) -> Result<HttpResponse, AppError> {
    let order_id = path.into_inner();
    let code = body.into_inner().coupon_code;

    if code.trim().is_empty() {
        return Err(AppError::Validation("couponCode is required".to_string()));
    }

    let user_id = user.user_id;
    let response = web::block(move || {
        let mut conn = pool.get()?;
        conn.transaction::<_, AppError, _>(|conn| redeem_coupon(conn, user_id, order_id, &code))
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))??;

    Ok(HttpResponse::Ok().json(response))
}

fn redeem_coupon(
    conn: &mut PgConnection,
    user_id: Uuid,
    order_id: Uuid,
    code: &str,
) -> Result<ApplyCouponResponse, AppError> {
    // Locked so concurrent applications to the same order serialize here;
    // the UNIQUE(order_id) constraint on coupon_usage backs this up.
    let order = orders::table
        .filter(orders::id.eq(order_id))
        .filter(orders::user_id.eq(user_id))
        .for_update()
        .select(Order::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| AppError::NotFound("Order not found".to_string()))?;

    if order.status != STATUS_PENDING {
        return Err(AppError::Conflict(
            "Can only apply coupons to pending orders".to_string(),
        ));
    }

    let already_used: i64 = coupon_usage::table
        .filter(coupon_usage::order_id.eq(order.id))
        .count()
        .get_result(conn)?;
    if already_used > 0 {
        return Err(AppError::Conflict("Order already has a coupon".to_string()));
    }

    // Locked so the usage-cap counts below cannot race another redemption
    // of the same code.
    let coupon = coupons::table
        .filter(coupons::code.eq(code))
        .for_update()
        .select(Coupon::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| AppError::NotFound("Coupon not found".to_string()))?;

    if !coupon.is_active {
        return Err(AppError::Conflict("Coupon is not active".to_string()));
    }

    let now = Utc::now();
    if let Some(valid_from) = coupon.valid_from {
        if valid_from > now {
            return Err(AppError::Conflict("Coupon is not yet valid".to_string()));
        }
    }
    if let Some(valid_until) = coupon.valid_until {
        if valid_until < now {
            return Err(AppError::Conflict("Coupon has expired".to_string()));
        }
    }

    if order.total_amount < coupon.min_order_amount {
        return Err(AppError::Conflict(format!(
            "Order must be at least ${}",
            coupon.min_order_amount
        )));
    }

    if let Some(max_uses) = coupon.max_uses {
        let used: i64 = coupon_usage::table
            .filter(coupon_usage::coupon_id.eq(coupon.id))
            .count()
            .get_result(conn)?;
        if used >= i64::from(max_uses) {
            return Err(AppError::Conflict("Coupon usage limit reached".to_string()));
        }
    }

    if let Some(max_uses_per_user) = coupon.max_uses_per_user {
        let used: i64 = coupon_usage::table
            .filter(coupon_usage::coupon_id.eq(coupon.id))
            .filter(coupon_usage::user_id.eq(user_id))
            .count()
            .get_result(conn)?;
        if used >= i64::from(max_uses_per_user) {
            return Err(AppError::Conflict(
                "You reached max usage for this coupon".to_string(),
            ));
        }
    }

    let discount_amount = coupon.compute_discount(&order.total_amount)?;
    let new_total = &order.total_amount - &discount_amount;
    if new_total < BigDecimal::zero() {
        return Err(AppError::Internal(format!(
            "Discount {} exceeds order total {}",
            discount_amount, order.total_amount
        )));
    }

    let updated: Order = diesel::update(orders::table.filter(orders::id.eq(order.id)))
        .set((
            orders::total_amount.eq(&new_total),
            orders::updated_at.eq(now),
        ))
        .returning(Order::as_returning())
        .get_result(conn)?;

    diesel::insert_into(coupon_usage::table)
        .values(&NewCouponUsage {
            id: Uuid::new_v4(),
            coupon_id: coupon.id,
            user_id,
            order_id: order.id,
            discount_amount: discount_amount.clone(),
        })
        .execute(conn)?;

    let items = order_items::table
        .filter(order_items::order_id.eq(order.id))
        .select(OrderItem::as_select())
        .load(conn)?;

    Ok(ApplyCouponResponse {
        order: order_response(updated, &items),
        discount: DiscountSummary {
            code: coupon.code,
            amount: discount_amount.to_string(),
            original_total: order.total_amount.to_string(),
            new_total: new_total.to_string(),
        },
    })
}
