use anyhow::{Context, Result};
use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::api::AppState;
use crate::errors::{ApiError, ApiFailure, ErrorContext};
use crate::models::{Role, User};

pub const BCRYPT_COST: u32 = 10;
pub const RESET_TOKEN_BYTES: usize = 32;
pub const RESET_TOKEN_TTL_MINUTES: i64 = 60;

pub const NO_TOKEN_MESSAGE: &str = "Not authorized, no token";
pub const TOKEN_FAILED_MESSAGE: &str = "Not authorized, token failed";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

/// HS256 signer/verifier for session tokens.
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
}

impl JwtService {
    pub fn new(secret: &str, ttl_days: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::days(ttl_days),
        }
    }

    pub fn issue(&self, user: &User) -> Result<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: user.id.to_string(),
            role: user.role,
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .context("Failed to sign token")
    }

    pub fn verify(&self, token: &str) -> Result<Claims> {
        let validation = Validation::new(Algorithm::HS256);
        let data = decode::<Claims>(token, &self.decoding_key, &validation)?;
        Ok(data.claims)
    }

    pub fn user_id(claims: &Claims) -> Result<Uuid> {
        Uuid::parse_str(&claims.sub).context("Token subject is not a user id")
    }
}

pub async fn hash_password(password: String) -> Result<String> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, BCRYPT_COST))
        .await
        .context("Password hashing task failed")?
        .context("Failed to hash password")
}

pub async fn verify_password(password: String, password_hash: String) -> Result<bool> {
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &password_hash))
        .await
        .context("Password verification task failed")?
        .context("Failed to verify password")
}

/// Returns the raw token for the email link and the digest to store.
pub fn generate_reset_token() -> (String, String) {
    let mut bytes = [0u8; RESET_TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    let raw = hex::encode(bytes);
    let digest = hash_reset_token(&raw);
    (raw, digest)
}

pub fn hash_reset_token(raw: &str) -> String {
    hex::encode(Sha256::digest(raw.as_bytes()))
}

/// The authenticated caller, resolved from the bearer token.
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiFailure;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok());

        let Some(header) = header.filter(|h| h.starts_with("Bearer")) else {
            return Err(ApiError::Unauthorized(NO_TOKEN_MESSAGE.to_string())
                .to_response_with_context(ErrorContext::new("authenticate", "token")));
        };

        let token = header.split_whitespace().nth(1).unwrap_or_default();
        if token.is_empty() || token == "undefined" || token == "null" {
            return Err(ApiError::Unauthorized(TOKEN_FAILED_MESSAGE.to_string())
                .to_response_with_context(ErrorContext::new("authenticate", "token")));
        }

        state
            .accounts
            .authenticate(token)
            .await
            .map(AuthUser)
            .map_err(|e| e.to_response_with_context(ErrorContext::new("authenticate", "token")))
    }
}

impl AuthUser {
    pub fn id(&self) -> Uuid {
        self.0.id
    }

    pub fn role(&self) -> Role {
        self.0.role
    }

    pub fn is_staff(&self) -> bool {
        matches!(self.0.role, Role::Teacher | Role::Admin)
    }

    pub fn require_teacher(&self, operation: &str) -> Result<(), ApiFailure> {
        self.require(self.0.role == Role::Teacher, operation, "Access denied: teachers only")
    }

    pub fn require_admin(&self, operation: &str) -> Result<(), ApiFailure> {
        self.require(self.0.role == Role::Admin, operation, "Not authorized as an admin")
    }

    pub fn require_student(&self, operation: &str) -> Result<(), ApiFailure> {
        self.require(self.0.role == Role::Student, operation, "Access denied. Students only.")
    }

    pub fn require_staff(&self, operation: &str) -> Result<(), ApiFailure> {
        self.require(self.is_staff(), operation, "Access denied: teachers or admins only")
    }

    fn require(&self, allowed: bool, operation: &str, message: &str) -> Result<(), ApiFailure> {
        if allowed {
            return Ok(());
        }
        Err(ApiError::Forbidden(message.to_string()).to_response_with_context(
            ErrorContext::new(operation, "role").with_id(&self.0.id.to_string()),
        ))
    }
}

/// Declares an extractor that authenticates the caller and checks their role
/// before any request body is read.
macro_rules! role_extractor {
    ($(#[$meta:meta])* $name:ident, $check:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        pub struct $name(pub AuthUser);

        #[axum::async_trait]
        impl FromRequestParts<AppState> for $name {
            type Rejection = ApiFailure;

            async fn from_request_parts(
                parts: &mut Parts,
                state: &AppState,
            ) -> Result<Self, Self::Rejection> {
                let user = AuthUser::from_request_parts(parts, state).await?;
                user.$check(parts.uri.path())?;
                Ok($name(user))
            }
        }
    };
}

role_extractor!(
    /// Caller with the student role.
    StudentUser,
    require_student
);
role_extractor!(TeacherUser, require_teacher);
role_extractor!(AdminUser, require_admin);
role_extractor!(
    /// Caller who is a teacher or an admin.
    StaffUser,
    require_staff
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DisabilityType;

    fn user(role: Role) -> User {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            name: "Ravi".to_string(),
            email: "ravi@example.com".to_string(),
            password_hash: String::new(),
            role,
            disability_type: DisabilityType::None,
            reset_password_token: None,
            reset_password_expires: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_token_round_trip_carries_subject_and_role() {
        let service = JwtService::new("test-secret", 30);
        let teacher = user(Role::Teacher);

        let token = service.issue(&teacher).unwrap();
        let claims = service.verify(&token).unwrap();

        assert_eq!(JwtService::user_id(&claims).unwrap(), teacher.id);
        assert_eq!(claims.role, Role::Teacher);
        assert_eq!(claims.exp - claims.iat, 30 * 24 * 60 * 60);
    }

    #[test]
    fn test_token_signed_with_other_secret_is_rejected() {
        let token = JwtService::new("secret-a", 30).issue(&user(Role::Student)).unwrap();
        assert!(JwtService::new("secret-b", 30).verify(&token).is_err());
        assert!(JwtService::new("secret-a", 30).verify("not.a.token").is_err());
    }

    #[test]
    fn test_reset_token_digest_matches_stored_hash() {
        let (raw, digest) = generate_reset_token();
        assert_eq!(raw.len(), RESET_TOKEN_BYTES * 2);
        assert_eq!(hash_reset_token(&raw), digest);
        assert_ne!(raw, digest);

        let (other, _) = generate_reset_token();
        assert_ne!(raw, other);
    }

    #[tokio::test]
    async fn test_password_hash_verifies() {
        let hash = hash_password("secret1".to_string()).await.unwrap();
        assert!(verify_password("secret1".to_string(), hash.clone()).await.unwrap());
        assert!(!verify_password("wrong".to_string(), hash).await.unwrap());
    }

    #[test]
    fn test_role_guards() {
        let student = AuthUser(user(Role::Student));
        assert!(student.require_student("chat").is_ok());
        let (status, body) = student.require_teacher("list_students").unwrap_err();
        assert_eq!(status, axum::http::StatusCode::FORBIDDEN);
        assert_eq!(body.0.message, "Access denied: teachers only");

        let admin = AuthUser(user(Role::Admin));
        assert!(admin.require_admin("list_users").is_ok());
        assert!(admin.require_staff("list_progress").is_ok());
        assert!(admin.require_student("chat").is_err());
    }
}
