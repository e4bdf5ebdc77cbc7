use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::env;
use tracing::{info, warn};

use crate::{log_system_event, log_validation};

pub const PLACEHOLDER_JWT_SECRET: &str = "change-me-in-production";

/// Complete application configuration loaded from environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub ai: AiConfig,
    pub email: EmailConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

/// Database connection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

/// Token signing configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub token_ttl_days: i64,
}

/// Hosted generative model used by the student chat
#[derive(Debug, Clone, Deserialize)]
pub struct AiConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
}

/// SMTP relay used for transactional email
#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    pub from_email: Option<String>,
    pub from_name: String,
    pub smtp_key: Option<String>,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub frontend_url: String,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

/// Logging system configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file_enabled: bool,
    pub console_enabled: bool,
    pub log_directory: String,
}

impl Config {
    /// Load configuration from environment variables with sensible defaults
    pub fn from_env() -> Result<Self> {
        log_system_event!(config, "Loading application configuration from environment variables");

        let config = Config {
            database: DatabaseConfig::from_env()?,
            auth: AuthConfig::from_env()?,
            ai: AiConfig::from_env()?,
            email: EmailConfig::from_env()?,
            server: ServerConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
        };

        log_system_event!(config, "Configuration loaded successfully");
        config.log_configuration_summary();

        Ok(config)
    }

    /// Log a summary of loaded configuration (without sensitive data)
    fn log_configuration_summary(&self) {
        info!(
            database_url_masked = %mask_sensitive_data(&self.database.url),
            ai_model = %self.ai.model,
            ai_configured = self.ai.api_key.is_some(),
            email_configured = self.email.is_configured(),
            frontend_url = %self.email.frontend_url,
            server_address = %format!("{}:{}", self.server.host, self.server.port),
            log_level = %self.logging.level,
            "Configuration summary"
        );
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if !self.database.url.starts_with("sqlite:") {
            return Err(anyhow!("DATABASE_URL must start with 'sqlite:'"));
        }

        if self.server.port == 0 {
            return Err(anyhow!("Server port must be greater than 0"));
        }

        if self.auth.jwt_secret.is_empty() {
            return Err(anyhow!("JWT_SECRET must not be empty"));
        }

        if self.auth.token_ttl_days <= 0 {
            return Err(anyhow!("JWT_TTL_DAYS must be a positive number of days"));
        }

        if self.auth.jwt_secret == PLACEHOLDER_JWT_SECRET {
            warn!("JWT_SECRET is the built-in placeholder - tokens are forgeable, set a real secret");
        }

        if self.ai.api_key.is_none() {
            warn!("GEMINI_API_KEY not set - /api/ai/chat will answer 'AI service not configured.'");
        }

        if !self.email.is_configured() {
            warn!("BREVO_FROM_EMAIL/BREVO_SMTP_KEY not set - password reset emails cannot be sent");
        }

        if !["trace", "debug", "info", "warn", "error"]
            .iter()
            .any(|level| self.logging.level.to_lowercase().starts_with(level))
        {
            warn!("Invalid log level '{}', using 'info' as fallback", self.logging.level);
        }

        log_validation!(success, "configuration", "Configuration validation completed successfully");
        Ok(())
    }
}

impl DatabaseConfig {
    fn from_env() -> Result<Self> {
        let url = env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:equaled.db".to_string());

        Ok(DatabaseConfig { url })
    }
}

impl AuthConfig {
    fn from_env() -> Result<Self> {
        let jwt_secret =
            env::var("JWT_SECRET").unwrap_or_else(|_| PLACEHOLDER_JWT_SECRET.to_string());

        let ttl_str = env::var("JWT_TTL_DAYS").unwrap_or_else(|_| "30".to_string());
        let token_ttl_days = ttl_str
            .parse::<i64>()
            .map_err(|_| anyhow!("Invalid JWT_TTL_DAYS value: '{}'", ttl_str))?;

        Ok(AuthConfig {
            jwt_secret,
            token_ttl_days,
        })
    }
}

impl AiConfig {
    fn from_env() -> Result<Self> {
        let api_key = env::var("GEMINI_API_KEY").ok().filter(|key| !key.trim().is_empty());

        let base_url = env::var("GEMINI_BASE_URL")
            .unwrap_or_else(|_| "https://generativelanguage.googleapis.com/v1beta".to_string());

        let model = env::var("GEMINI_MODEL").unwrap_or_else(|_| "gemini-1.5-flash".to_string());

        Ok(AiConfig {
            api_key,
            base_url,
            model,
        })
    }
}

impl EmailConfig {
    fn from_env() -> Result<Self> {
        let from_email = env::var("BREVO_FROM_EMAIL").ok().filter(|v| !v.is_empty());
        let smtp_key = env::var("BREVO_SMTP_KEY").ok().filter(|v| !v.is_empty());
        let from_name = env::var("BREVO_FROM_NAME").unwrap_or_else(|_| "EqualEd".to_string());
        let smtp_host =
            env::var("SMTP_HOST").unwrap_or_else(|_| "smtp-relay.brevo.com".to_string());

        let port_str = env::var("SMTP_PORT").unwrap_or_else(|_| "587".to_string());
        let smtp_port = port_str
            .parse::<u16>()
            .map_err(|_| anyhow!("Invalid SMTP_PORT value: '{}'", port_str))?;

        let frontend_url =
            env::var("FRONTEND_URL").unwrap_or_else(|_| "http://localhost:5173".to_string());

        Ok(EmailConfig {
            from_email,
            from_name,
            smtp_key,
            smtp_host,
            smtp_port,
            frontend_url,
        })
    }

    pub fn is_configured(&self) -> bool {
        self.from_email.is_some() && self.smtp_key.is_some()
    }
}

impl ServerConfig {
    fn from_env() -> Result<Self> {
        let port_str = env::var("PORT").unwrap_or_else(|_| "5000".to_string());

        let port = port_str.parse::<u16>().map_err(|_| {
            anyhow!("Invalid PORT value: '{}'. Must be a number between 1-65535", port_str)
        })?;

        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        Ok(ServerConfig { port, host })
    }
}

impl LoggingConfig {
    fn from_env() -> Result<Self> {
        let level = env::var("RUST_LOG").unwrap_or_else(|_| "info,equaled=debug".to_string());

        let file_enabled = env::var("LOG_FILE_ENABLED")
            .unwrap_or_else(|_| "true".to_string())
            .parse::<bool>()
            .unwrap_or(true);

        let console_enabled = env::var("LOG_CONSOLE_ENABLED")
            .unwrap_or_else(|_| "true".to_string())
            .parse::<bool>()
            .unwrap_or(true);

        let log_directory = env::var("LOG_DIRECTORY").unwrap_or_else(|_| "logs".to_string());

        Ok(LoggingConfig {
            level,
            file_enabled,
            console_enabled,
            log_directory,
        })
    }
}

/// Mask sensitive data in configuration for safe logging
pub fn mask_sensitive_data(data: &str) -> String {
    let chars: Vec<char> = data.chars().collect();
    if chars.len() <= 8 {
        "*".repeat(chars.len())
    } else {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}***{}", head, tail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> Config {
        Config {
            database: DatabaseConfig {
                url: "sqlite::memory:".to_string(),
            },
            auth: AuthConfig {
                jwt_secret: "unit-test-secret".to_string(),
                token_ttl_days: 30,
            },
            ai: AiConfig {
                api_key: Some("key".to_string()),
                base_url: "http://127.0.0.1:9".to_string(),
                model: "gemini-1.5-flash".to_string(),
            },
            email: EmailConfig {
                from_email: Some("noreply@equaled.test".to_string()),
                from_name: "EqualEd".to_string(),
                smtp_key: Some("smtp-key".to_string()),
                smtp_host: "smtp-relay.brevo.com".to_string(),
                smtp_port: 587,
                frontend_url: "http://localhost:5173".to_string(),
            },
            server: ServerConfig {
                port: 5000,
                host: "0.0.0.0".to_string(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                file_enabled: false,
                console_enabled: true,
                log_directory: "logs".to_string(),
            },
        }
    }

    #[test]
    fn test_mask_sensitive_data() {
        assert_eq!(mask_sensitive_data("short"), "*****");
        assert_eq!(mask_sensitive_data("sqlite:equaled.db"), "sqli***d.db");
        assert_eq!(mask_sensitive_data("AIzaSy1234567890abcd"), "AIza***abcd");
    }

    #[test]
    fn test_config_validation() {
        let config = sample_config();
        assert!(config.validate().is_ok());

        let mut invalid = config.clone();
        invalid.server.port = 0;
        assert!(invalid.validate().is_err());

        let mut invalid = config.clone();
        invalid.database.url = "postgres://localhost/equaled".to_string();
        assert!(invalid.validate().is_err());

        let mut invalid = config.clone();
        invalid.auth.jwt_secret.clear();
        assert!(invalid.validate().is_err());

        let mut invalid = config;
        invalid.auth.token_ttl_days = 0;
        assert!(invalid.validate().is_err());
    }

    #[test]
    fn test_email_configured_requires_sender_and_key() {
        let mut email = sample_config().email;
        assert!(email.is_configured());
        email.smtp_key = None;
        assert!(!email.is_configured());
    }
}
