use actix_web::{web, HttpResponse};
use bigdecimal::BigDecimal;
use chrono::Utc;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::db::DbPool;
use crate::errors::AppError;
use crate::models::order::{NewOrder, Order, STATUS_CANCELLED, STATUS_PENDING};
use crate::models::order_item::{NewOrderItem, OrderItem};
use crate::models::product::Product;
use crate::schema::{order_items, orders, products};

// ── Request / response DTOs ──────────────────────────────────────────────────

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemRequest {
    pub product_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateOrderRequest {
    pub items: Vec<OrderItemRequest>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderItemResponse {
    pub product_id: Uuid,
    pub quantity: i32,
    /// Unit price captured at order time.
    pub unit_price: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub total_amount: String,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
    pub items: Vec<OrderItemResponse>,
}

pub(crate) fn order_response(order: Order, items: &[OrderItem]) -> OrderResponse {
    OrderResponse {
        id: order.id,
        user_id: order.user_id,
        total_amount: order.total_amount.to_string(),
        status: order.status,
        created_at: order.created_at.to_rfc3339(),
        updated_at: order.updated_at.to_rfc3339(),
        items: items
            .iter()
            .map(|item| OrderItemResponse {
                product_id: item.product_id,
                quantity: item.quantity,
                unit_price: item.unit_price.to_string(),
            })
            .collect(),
    }
}

// ── Handlers ─────────────────────────────────────────────────────────────────

/// POST /orders
///
/// Creates an order together with its items, decrementing product stock as a
/// side effect. Everything runs in one database transaction: any failure
/// rolls back every mutation, including stock already decremented for
/// earlier items.
#[utoipa::path(
    post,
    path = "/orders",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Order created", body = OrderResponse),
        (status = 400, description = "Empty order, bad quantity, or insufficient stock"),
        (status = 401, description = "Missing or invalid credential"),
        (status = 404, description = "Product not found"),
        (status = 500, description = "Internal server error"),
    ),
    tag = "orders"
)]
pub async fn create_order(
    pool: web::Data<DbPool>,
    user: AuthenticatedUser,
    body: web::Json<CreateOrderRequest>,
) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();

    if body.items.is_empty() {
        return Err(AppError::Validation(
            "Order must contain at least one item".to_string(),
        ));
    }
    if body.items.iter().any(|item| item.quantity <= 0) {
        return Err(AppError::Validation(
            "Item quantity must be positive".to_string(),
        ));
    }

    let user_id = user.user_id;
    let order = web::block(move || {
        let mut conn = pool.get()?;
        conn.transaction::<_, AppError, _>(|conn| place_order(conn, user_id, &body.items))
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))??;

    Ok(HttpResponse::Created().json(order))
}

fn place_order(
    conn: &mut PgConnection,
    user_id: Uuid,
    items: &[OrderItemRequest],
) -> Result<OrderResponse, AppError> {
    let order_id = Uuid::new_v4();
    let mut total_amount = BigDecimal::from(0);
    let mut new_items = Vec::with_capacity(items.len());

    for item in items {
        // Lock the product row so the stock check and the decrement are
        // atomic under concurrent order placement.
        let product = products::table
            .filter(products::id.eq(item.product_id))
            .filter(products::deleted_at.is_null())
            .for_update()
            .select(Product::as_select())
            .first(conn)
            .optional()?
            .ok_or_else(|| {
                AppError::NotFound(format!("Product {} not found", item.product_id))
            })?;

        if product.stock < item.quantity {
            return Err(AppError::Conflict(format!(
                "Insufficient stock for product {}. Available: {}, Requested: {}",
                product.name, product.stock, item.quantity
            )));
        }

        diesel::update(products::table.filter(products::id.eq(product.id)))
            .set((
                products::stock.eq(products::stock - item.quantity),
                products::updated_at.eq(Utc::now()),
            ))
            .execute(conn)?;

        total_amount += &product.price * BigDecimal::from(item.quantity);
        new_items.push(NewOrderItem {
            id: Uuid::new_v4(),
            order_id,
            product_id: product.id,
            quantity: item.quantity,
            unit_price: product.price,
        });
    }

    let new_order = NewOrder {
        id: order_id,
        user_id,
        total_amount,
        status: STATUS_PENDING.to_string(),
    };
    let order: Order = diesel::insert_into(orders::table)
        .values(&new_order)
        .returning(Order::as_returning())
        .get_result(conn)?;

    diesel::insert_into(order_items::table)
        .values(&new_items)
        .execute(conn)?;

    Ok(OrderResponse {
        id: order.id,
        user_id: order.user_id,
        total_amount: order.total_amount.to_string(),
        status: order.status,
        created_at: order.created_at.to_rfc3339(),
        updated_at: order.updated_at.to_rfc3339(),
        items: new_items
            .iter()
            .map(|item| OrderItemResponse {
                product_id: item.product_id,
                quantity: item.quantity,
                unit_price: item.unit_price.to_string(),
            })
            .collect(),
    })
}

/// GET /orders
///
/// Returns all of the caller's orders, each joined with its items, newest
/// first.
#[utoipa::path(
    get,
    path = "/orders",
    responses(
        (status = 200, description = "The caller's orders", body = [OrderResponse]),
        (status = 401, description = "Missing or invalid credential"),
        (status = 500, description = "Internal server error"),
    ),
    tag = "orders"
)]
pub async fn get_user_orders(
    pool: web::Data<DbPool>,
    user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    let user_id = user.user_id;

    let result = web::block(move || {
        let mut conn = pool.get()?;

        let order_rows = orders::table
            .filter(orders::user_id.eq(user_id))
            .select(Order::as_select())
            .order(orders::created_at.desc())
            .load(&mut conn)?;

        let item_rows = OrderItem::belonging_to(&order_rows)
            .select(OrderItem::as_select())
            .load(&mut conn)?;

        let grouped = item_rows.grouped_by(&order_rows);
        Ok::<_, AppError>(
            order_rows
                .into_iter()
                .zip(grouped)
                .map(|(order, items)| order_response(order, &items))
                .collect::<Vec<_>>(),
        )
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))??;

    Ok(HttpResponse::Ok().json(result))
}

/// POST /orders/{id}/cancel
///
/// Cancels a pending order, restoring each item's quantity to its product's
/// stock in the same transaction that flips the status. Does not reverse an
/// already-applied coupon usage or discount.
#[utoipa::path(
    post,
    path = "/orders/{id}/cancel",
    params(
        ("id" = Uuid, Path, description = "Order UUID"),
    ),
    responses(
        (status = 200, description = "Order cancelled"),
        (status = 400, description = "Order is not pending"),
        (status = 401, description = "Missing or invalid credential"),
        (status = 404, description = "Order not found"),
        (status = 500, description = "Internal server error"),
    ),
    tag = "orders"
)]
pub async fn cancel_order(
    pool: web::Data<DbPool>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let order_id = path.into_inner();
    let user_id = user.user_id;

    web::block(move || {
        let mut conn = pool.get()?;
        conn.transaction::<_, AppError, _>(|conn| {
            // Locked so a concurrent cancel or coupon application on the
            // same order serializes behind this transaction.
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
                    "Can only cancel pending orders".to_string(),
                ));
            }

            let items = order_items::table
                .filter(order_items::order_id.eq(order.id))
                .select(OrderItem::as_select())
                .load(conn)?;

            for item in &items {
                diesel::update(products::table.filter(products::id.eq(item.product_id)))
                    .set((
                        products::stock.eq(products::stock + item.quantity),
                        products::updated_at.eq(Utc::now()),
                    ))
                    .execute(conn)?;
            }

            diesel::update(orders::table.filter(orders::id.eq(order.id)))
                .set((
                    orders::status.eq(STATUS_CANCELLED),
                    orders::updated_at.eq(Utc::now()),
                ))
                .execute(conn)?;

            Ok(())
        })
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))??;

    Ok(HttpResponse::Ok().json(json!({ "message": "Order cancelled successfully" })))
}
