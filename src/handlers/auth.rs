use actix_web::{web, HttpResponse};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::{self, TokenManager};
use crate::db::DbPool;
use crate::errors::AppError;
use crate::models::user::{NewUser, User};
use crate::schema::users;

// ── Request / response DTOs ──────────────────────────────────────────────────

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub name: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserResponse,
}

// ── Handlers ─────────────────────────────────────────────────────────────────

/// POST /register
///
/// Creates a user account. The password is stored as an argon2 hash.
#[utoipa::path(
    post,
    path = "/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User created", body = UserResponse),
        (status = 400, description = "Missing fields or email already taken"),
        (status = 500, description = "Internal server error"),
    ),
    tag = "auth"
)]
pub async fn register(
    pool: web::Data<DbPool>,
    body: web::Json<RegisterRequest>,
) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();

    if body.email.trim().is_empty() || body.password.is_empty() || body.name.trim().is_empty() {
        return Err(AppError::Validation(
            "email, password and name are required".to_string(),
        ));
    }

    let user = web::block(move || {
        let mut conn = pool.get()?;

        let existing = users::table
            .filter(users::email.eq(&body.email))
            .select(users::id)
            .first::<Uuid>(&mut conn)
            .optional()?;
        if existing.is_some() {
            return Err(AppError::Validation("User already exists".to_string()));
        }

        // Hashing stays on the blocking pool alongside the query work.
        let password_hash = auth::hash_password(&body.password)?;

        let new_user = NewUser {
            id: Uuid::new_v4(),
            email: body.email,
            password_hash,
            name: body.name,
        };
        diesel::insert_into(users::table)
            .values(&new_user)
            .execute(&mut conn)?;

        Ok::<_, AppError>(UserResponse {
            id: new_user.id,
            email: new_user.email,
            name: new_user.name,
        })
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))??;

    Ok(HttpResponse::Created().json(user))
}

/// POST /login
///
/// Verifies credentials and returns a 24-hour bearer token. Unknown email
/// and wrong password produce the same message, so the response does not
/// reveal which accounts exist.
#[utoipa::path(
    post,
    path = "/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Authenticated", body = LoginResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 500, description = "Internal server error"),
    ),
    tag = "auth"
)]
pub async fn login(
    pool: web::Data<DbPool>,
    tokens: web::Data<TokenManager>,
    body: web::Json<LoginRequest>,
) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();

    let response = web::block(move || {
        let mut conn = pool.get()?;

        let user = users::table
            .filter(users::email.eq(&body.email))
            .select(User::as_select())
            .first(&mut conn)
            .optional()?
            .ok_or_else(|| AppError::Unauthorized("Invalid credentials".to_string()))?;

        if !auth::verify_password(&body.password, &user.password_hash)? {
            return Err(AppError::Unauthorized("Invalid credentials".to_string()));
        }

        let token = tokens.issue(user.id, &user.email)?;

        Ok::<_, AppError>(LoginResponse {
            token,
            user: UserResponse {
                id: user.id,
                email: user.email,
                name: user.name,
            },
        })
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))??;

    Ok(HttpResponse::Ok().json(response))
}
