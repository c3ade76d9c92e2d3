use actix_web::{web, HttpResponse};
use bigdecimal::{BigDecimal, Zero};
use chrono::Utc;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::db::DbPool;
use crate::errors::AppError;
use crate::models::product::{NewProduct, Product};
use crate::schema::products;

// ── Request / response DTOs ──────────────────────────────────────────────────

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateProductRequest {
    pub name: String,
    pub description: Option<String>,
    /// Decimal price as a string to avoid floating-point issues, e.g. "9.99"
    pub price: String,
    pub stock: i32,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateStockRequest {
    pub stock: i32,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProductResponse {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub price: String,
    pub stock: i32,
    pub created_at: String,
    pub updated_at: String,
}

fn product_response(p: Product) -> ProductResponse {
    ProductResponse {
        id: p.id,
        name: p.name,
        description: p.description,
        price: p.price.to_string(),
        stock: p.stock,
        created_at: p.created_at.to_rfc3339(),
        updated_at: p.updated_at.to_rfc3339(),
    }
}

// ── Handlers ─────────────────────────────────────────────────────────────────

/// GET /products
///
/// Returns all non-soft-deleted products, newest first.
#[utoipa::path(
    get,
    path = "/products",
    responses(
        (status = 200, description = "List of products", body = [ProductResponse]),
        (status = 500, description = "Internal server error"),
    ),
    tag = "products"
)]
pub async fn list_products(pool: web::Data<DbPool>) -> Result<HttpResponse, AppError> {
    let rows = web::block(move || {
        let mut conn = pool.get()?;

        products::table
            .filter(products::deleted_at.is_null())
            .select(Product::as_select())
            .order(products::created_at.desc())
            .load(&mut conn)
            .map_err(AppError::from)
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))??;

    let items: Vec<ProductResponse> = rows.into_iter().map(product_response).collect();
    Ok(HttpResponse::Ok().json(items))
}

/// POST /products
///
/// Inserts a product. Price and stock must be non-negative.
#[utoipa::path(
    post,
    path = "/products",
    request_body = CreateProductRequest,
    responses(
        (status = 201, description = "Product created", body = ProductResponse),
        (status = 400, description = "Invalid price or stock"),
        (status = 401, description = "Missing or invalid credential"),
        (status = 500, description = "Internal server error"),
    ),
    tag = "products"
)]
pub async fn create_product(
    pool: web::Data<DbPool>,
    _user: AuthenticatedUser,
    body: web::Json<CreateProductRequest>,
) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();

    if body.name.trim().is_empty() {
        return Err(AppError::Validation("name is required".to_string()));
    }
    let price = BigDecimal::from_str(&body.price)
        .map_err(|_| AppError::Validation(format!("Invalid price '{}'", body.price)))?;
    if price < BigDecimal::zero() {
        return Err(AppError::Validation("price must be non-negative".to_string()));
    }
    if body.stock < 0 {
        return Err(AppError::Validation("stock must be non-negative".to_string()));
    }

    let product = web::block(move || {
        let mut conn = pool.get()?;

        let new_product = NewProduct {
            id: Uuid::new_v4(),
            name: body.name,
            description: body.description,
            price,
            stock: body.stock,
        };
        diesel::insert_into(products::table)
            .values(&new_product)
            .returning(Product::as_returning())
            .get_result(&mut conn)
            .map_err(AppError::from)
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))??;

    Ok(HttpResponse::Created().json(product_response(product)))
}

/// PATCH /products/{id}/stock
///
/// Absolute overwrite of a product's stock level, distinct from the relative
/// increments the order flow performs. Requires a valid caller; no admin
/// role exists.
#[utoipa::path(
    patch,
    path = "/products/{id}/stock",
    params(
        ("id" = Uuid, Path, description = "Product UUID"),
    ),
    request_body = UpdateStockRequest,
    responses(
        (status = 200, description = "Stock updated", body = ProductResponse),
        (status = 400, description = "Negative stock"),
        (status = 401, description = "Missing or invalid credential"),
        (status = 404, description = "Product not found"),
        (status = 500, description = "Internal server error"),
    ),
    tag = "products"
)]
pub async fn update_stock(
    pool: web::Data<DbPool>,
    _user: AuthenticatedUser,
    path: web::Path<Uuid>,
    body: web::Json<UpdateStockRequest>,
) -> Result<HttpResponse, AppError> {
    let product_id = path.into_inner();
    let stock = body.into_inner().stock;

    if stock < 0 {
        return Err(AppError::Validation("stock must be non-negative".to_string()));
    }

    let product = web::block(move || {
        let mut conn = pool.get()?;

        diesel::update(
            products::table
                .filter(products::id.eq(product_id))
                .filter(products::deleted_at.is_null()),
        )
        .set((products::stock.eq(stock), products::updated_at.eq(Utc::now())))
        .returning(Product::as_returning())
        .get_result(&mut conn)
        .optional()?
        .ok_or_else(|| AppError::NotFound("Product not found".to_string()))
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))??;

    Ok(HttpResponse::Ok().json(product_response(product)))
}
