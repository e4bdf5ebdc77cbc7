use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::{
    generate_reset_token, hash_password, hash_reset_token, verify_password, JwtService,
    RESET_TOKEN_TTL_MINUTES, TOKEN_FAILED_MESSAGE,
};
use crate::database::Database;
use crate::email_service::Mailer;
use crate::errors::{classify_database_error, ApiError};
use crate::models::*;
use crate::{log_service_error, log_service_start, log_service_success, log_service_warn};

pub const MIN_PASSWORD_LENGTH: usize = 6;
pub const FORGOT_PASSWORD_MESSAGE: &str = "If that email exists, a reset link has been sent.";
pub const RESET_EMAIL_FAILED_MESSAGE: &str = "Could not send reset email. Please try again.";
pub const INVALID_RESET_TOKEN_MESSAGE: &str = "Password reset token is invalid or has expired";

const SERVICE: &str = "account_service";

/// Registration, login, password recovery and admin user management.
#[derive(Clone)]
pub struct AccountService {
    db: Database,
    jwt: JwtService,
    mailer: Arc<dyn Mailer>,
    frontend_url: String,
}

impl AccountService {
    pub fn new(db: Database, jwt: JwtService, mailer: Arc<dyn Mailer>, frontend_url: String) -> Self {
        Self {
            db,
            jwt,
            mailer,
            frontend_url: frontend_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn register(&self, request: RegisterRequest) -> Result<AuthResponse, ApiError> {
        log_service_start!(SERVICE, "register");

        let role = request.role.unwrap_or(Role::Student);
        if role == Role::Admin {
            return Err(ApiError::ValidationError(
                "Admin accounts cannot be self-registered".to_string(),
            ));
        }

        let user = self
            .build_user(
                request.name,
                request.email,
                request.password,
                role,
                request.disability_type.unwrap_or_default(),
            )
            .await?;
        self.insert_user(&user).await?;

        let mailer = Arc::clone(&self.mailer);
        let (to_email, to_name) = (user.email.clone(), user.name.clone());
        tokio::spawn(async move {
            if let Err(e) = mailer.send_welcome(&to_email, &to_name).await {
                log_service_warn!(SERVICE, "send_welcome", format!("welcome email not sent: {:#}", e));
            }
        });

        log_service_success!(SERVICE, "register", resource_id = user.id, "user registered");
        self.auth_response(&user)
    }

    pub async fn login(&self, request: LoginRequest) -> Result<AuthResponse, ApiError> {
        let invalid = || ApiError::Unauthorized("Invalid email or password".to_string());

        let email = normalize_email(&request.email);
        let Some(user) = self.db.get_user_by_email(&email).await? else {
            return Err(invalid());
        };

        if !verify_password(request.password, user.password_hash.clone())
            .await
            .map_err(internal)?
        {
            return Err(invalid());
        }

        log_service_success!(SERVICE, "login", resource_id = user.id, "user logged in");
        self.auth_response(&user)
    }

    /// Resolves a bearer token to its user; every failure reads the same to the caller.
    pub async fn authenticate(&self, token: &str) -> Result<User, ApiError> {
        let failed = || ApiError::Unauthorized(TOKEN_FAILED_MESSAGE.to_string());

        let claims = self.jwt.verify(token).map_err(|e| {
            log_service_warn!(SERVICE, "authenticate", format!("token rejected: {}", e));
            failed()
        })?;
        let user_id = JwtService::user_id(&claims).map_err(|_| failed())?;

        self.db.get_user(user_id).await?.ok_or_else(failed)
    }

    /// Answers identically whether or not the address is registered.
    pub async fn forgot_password(&self, request: ForgotPasswordRequest) -> Result<String, ApiError> {
        log_service_start!(SERVICE, "forgot_password");

        let email = normalize_email(&request.email);
        let Some(user) = self.db.get_user_by_email(&email).await? else {
            return Ok(FORGOT_PASSWORD_MESSAGE.to_string());
        };

        let (raw_token, token_hash) = generate_reset_token();
        let expires = Utc::now() + Duration::minutes(RESET_TOKEN_TTL_MINUTES);
        self.db
            .set_reset_token(user.id, Some(&token_hash), Some(expires))
            .await?;

        let reset_url = format!("{}/reset-password/{}", self.frontend_url, raw_token);
        if let Err(e) = self
            .mailer
            .send_password_reset(&user.email, &user.name, &reset_url)
            .await
        {
            log_service_error!(SERVICE, "forgot_password", user_id = user.id, error = format!("{:#}", e));
            self.db.set_reset_token(user.id, None, None).await?;
            return Err(ApiError::EmailError(RESET_EMAIL_FAILED_MESSAGE.to_string()));
        }

        log_service_success!(SERVICE, "forgot_password", resource_id = user.id, "reset email sent");
        Ok(FORGOT_PASSWORD_MESSAGE.to_string())
    }

    pub async fn reset_password(
        &self,
        raw_token: &str,
        request: ResetPasswordRequest,
    ) -> Result<String, ApiError> {
        validate_password(&request.password)?;

        let invalid = || ApiError::ValidationError(INVALID_RESET_TOKEN_MESSAGE.to_string());
        let Some(mut user) = self.db.get_user_by_reset_token(&hash_reset_token(raw_token)).await? else {
            return Err(invalid());
        };

        let now = Utc::now();
        if user.reset_password_expires.is_none_or(|expires| expires <= now) {
            self.db.set_reset_token(user.id, None, None).await?;
            return Err(invalid());
        }

        user.password_hash = hash_password(request.password).await.map_err(internal)?;
        user.reset_password_token = None;
        user.reset_password_expires = None;
        user.updated_at = now;
        self.db.update_user(&user).await?;

        log_service_success!(SERVICE, "reset_password", resource_id = user.id, "password reset");
        Ok("Password has been reset. You can now log in.".to_string())
    }

    // Admin user management

    pub async fn list_users(&self) -> Result<Vec<User>, ApiError> {
        Ok(self.db.list_users().await?)
    }

    pub async fn create_user(&self, request: CreateUserRequest) -> Result<User, ApiError> {
        let user = self
            .build_user(
                request.name,
                request.email,
                request.password,
                request.role,
                request.disability_type.unwrap_or_default(),
            )
            .await?;
        self.insert_user(&user).await?;

        log_service_success!(SERVICE, "create_user", resource_id = user.id, "user created by admin");
        Ok(user)
    }

    pub async fn update_user(&self, id: Uuid, request: UpdateUserRequest) -> Result<User, ApiError> {
        let mut user = self
            .db
            .get_user(id)
            .await?
            .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

        if let Some(name) = request.name {
            user.name = validate_name(&name)?;
        }
        if let Some(email) = request.email {
            user.email = validate_email(&email)?;
        }
        if let Some(password) = request.password {
            validate_password(&password)?;
            user.password_hash = hash_password(password).await.map_err(internal)?;
        }
        if let Some(role) = request.role {
            user.role = role;
        }
        if let Some(disability_type) = request.disability_type {
            user.disability_type = disability_type;
        }
        user.updated_at = Utc::now();

        self.db
            .update_user(&user)
            .await
            .map_err(|e| classify_database_error(&e))?;
        Ok(user)
    }

    pub async fn delete_user(&self, id: Uuid) -> Result<(), ApiError> {
        if !self.db.delete_user(id).await? {
            return Err(ApiError::NotFound("User not found".to_string()));
        }
        log_service_success!(SERVICE, "delete_user", resource_id = id, "user removed");
        Ok(())
    }

    async fn build_user(
        &self,
        name: String,
        email: String,
        password: String,
        role: Role,
        disability_type: DisabilityType,
    ) -> Result<User, ApiError> {
        let name = validate_name(&name)?;
        let email = validate_email(&email)?;
        validate_password(&password)?;

        if self.db.get_user_by_email(&email).await?.is_some() {
            return Err(ApiError::DuplicateResource("User already exists".to_string()));
        }

        let now = Utc::now();
        Ok(User {
            id: Uuid::new_v4(),
            name,
            email,
            password_hash: hash_password(password).await.map_err(internal)?,
            role,
            disability_type,
            reset_password_token: None,
            reset_password_expires: None,
            created_at: now,
            updated_at: now,
        })
    }

    // A concurrent registration can still race past the lookup; the unique index decides.
    async fn insert_user(&self, user: &User) -> Result<(), ApiError> {
        self.db
            .insert_user(user)
            .await
            .map_err(|e| classify_database_error(&e))
    }

    fn auth_response(&self, user: &User) -> Result<AuthResponse, ApiError> {
        Ok(AuthResponse {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role,
            disability_type: user.disability_type,
            token: self.jwt.issue(user).map_err(internal)?,
        })
    }
}

fn internal(error: anyhow::Error) -> ApiError {
    ApiError::InternalError(format!("{:#}", error))
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn validate_name(name: &str) -> Result<String, ApiError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ApiError::ValidationError("Name is required".to_string()));
    }
    Ok(name.to_string())
}

fn validate_email(email: &str) -> Result<String, ApiError> {
    let email = normalize_email(email);
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
        _ => Err(ApiError::ValidationError("Please provide a valid email".to_string())),
    }
}

fn validate_password(password: &str) -> Result<(), ApiError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(ApiError::ValidationError(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_is_normalized_and_checked() {
        assert_eq!(validate_email("  Asha@Example.COM ").unwrap(), "asha@example.com");
        assert!(validate_email("not-an-email").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("a@localhost").is_err());
    }

    #[test]
    fn test_password_and_name_rules() {
        assert!(validate_password("12345").is_err());
        assert!(validate_password("123456").is_ok());
        assert!(validate_name("   ").is_err());
        assert_eq!(validate_name(" Asha ").unwrap(), "Asha");
    }
}
