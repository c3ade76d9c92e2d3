//! Bearer-token authentication: JWT issue/verify, password hashing, and the
//! request extractor that resolves a caller to a user id.

use std::future::{ready, Ready};

use actix_web::http::header::AUTHORIZATION;
use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, SaltString};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;

/// Tokens are valid for 24 hours from issue.
pub const TOKEN_LIFETIME_SECS: i64 = 24 * 60 * 60;

/// JWT claims structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user id)
    pub sub: Uuid,
    pub email: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration (Unix timestamp)
    pub exp: i64,
}

/// Signs and validates the HS256 bearer tokens handed out by `/login`.
pub struct TokenManager {
    secret: String,
}

impl TokenManager {
    pub fn new(secret: String) -> Self {
        TokenManager { secret }
    }

    pub fn issue(&self, user_id: Uuid, email: &str) -> Result<String, AppError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id,
            email: email.to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::seconds(TOKEN_LIFETIME_SECS)).timestamp(),
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| AppError::Internal(format!("Failed to generate token: {}", e)))
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AppError> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .map(|data| data.claims)
        .map_err(|_| AppError::Unauthorized("Invalid token".to_string()))
    }
}

pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, AppError> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| AppError::Internal(format!("Stored password hash is malformed: {}", e)))?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(AppError::Internal(format!(
            "Password verification failed: {}",
            e
        ))),
    }
}

/// The authenticated caller, resolved from the `Authorization: Bearer` header.
/// Handlers that take this as a parameter reject unauthenticated requests
/// with 401 before any of their own logic runs.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub email: String,
}

impl FromRequest for AuthenticatedUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(resolve_caller(req))
    }
}

fn resolve_caller(req: &HttpRequest) -> Result<AuthenticatedUser, AppError> {
    let tokens = req
        .app_data::<web::Data<TokenManager>>()
        .ok_or_else(|| AppError::Internal("TokenManager is not configured".to_string()))?;

    let header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Unauthorized".to_string()))?;

    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::Unauthorized("Unauthorized".to_string()))?;

    let claims = tokens.verify(token)?;

    Ok(AuthenticatedUser {
        user_id: claims.sub,
        email: claims.email,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_and_verify_roundtrip() {
        let tokens = TokenManager::new("test-secret".to_string());
        let user_id = Uuid::new_v4();

        let token = tokens.issue(user_id, "a@example.com").expect("issue failed");
        let claims = tokens.verify(&token).expect("verify failed");

        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.email, "a@example.com");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn verify_rejects_garbage() {
        let tokens = TokenManager::new("test-secret".to_string());
        let err = tokens.verify("not-a-token").unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[test]
    fn verify_rejects_token_signed_with_other_secret() {
        let issuer = TokenManager::new("secret-a".to_string());
        let verifier = TokenManager::new("secret-b".to_string());

        let token = issuer
            .issue(Uuid::new_v4(), "a@example.com")
            .expect("issue failed");

        assert!(matches!(
            verifier.verify(&token),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn password_hash_and_verify() {
        let hash = hash_password("hunter2").expect("hash failed");
        assert_ne!(hash, "hunter2");
        assert!(verify_password("hunter2", &hash).expect("verify failed"));
        assert!(!verify_password("wrong", &hash).expect("verify failed"));
    }

    #[test]
    fn verify_password_rejects_malformed_hash() {
        assert!(matches!(
            verify_password("hunter2", "not-a-phc-string"),
            Err(AppError::Internal(_))
        ));
    }
}
