use equaled::config::{mask_sensitive_data, Config};
use std::env;

const VARS: &[&str] = &[
    "DATABASE_URL",
    "JWT_SECRET",
    "JWT_TTL_DAYS",
    "GEMINI_API_KEY",
    "GEMINI_MODEL",
    "BREVO_FROM_EMAIL",
    "BREVO_SMTP_KEY",
    "FRONTEND_URL",
    "PORT",
    "HOST",
];

fn clear_env() {
    for var in VARS {
        // Only one test in this binary reads or writes these variables.
        unsafe { env::remove_var(var) };
    }
}

#[test]
fn test_config_from_environment() {
    clear_env();

    let defaults = Config::from_env().unwrap();
    assert_eq!(defaults.database.url, "sqlite:equaled.db");
    assert_eq!(defaults.server.port, 5000);
    assert_eq!(defaults.auth.token_ttl_days, 30);
    assert_eq!(defaults.ai.model, "gemini-1.5-flash");
    assert!(defaults.ai.api_key.is_none());
    assert!(!defaults.email.is_configured());
    assert!(defaults.validate().is_ok());

    unsafe {
        env::set_var("DATABASE_URL", "sqlite::memory:");
        env::set_var("JWT_SECRET", "a-real-secret");
        env::set_var("GEMINI_API_KEY", "   ");
        env::set_var("BREVO_FROM_EMAIL", "noreply@equaled.test");
        env::set_var("BREVO_SMTP_KEY", "smtp-key");
        env::set_var("PORT", "8080");
    }
    let configured = Config::from_env().unwrap();
    assert_eq!(configured.database.url, "sqlite::memory:");
    assert_eq!(configured.server.port, 8080);
    assert!(configured.ai.api_key.is_none(), "blank key counts as unset");
    assert!(configured.email.is_configured());

    unsafe { env::set_var("PORT", "not-a-port") };
    assert!(Config::from_env().is_err());

    unsafe {
        env::set_var("PORT", "5000");
        env::set_var("DATABASE_URL", "postgres://localhost/equaled");
    }
    let wrong_store = Config::from_env().unwrap();
    assert!(wrong_store.validate().is_err());

    unsafe { env::set_var("JWT_TTL_DAYS", "0") };
    assert!(Config::from_env().unwrap().validate().is_err());

    clear_env();
    println!("✅ configuration defaults, overrides and validation behave");
}

#[test]
fn test_mask_sensitive_data() {
    assert_eq!(mask_sensitive_data("short"), "*****");
    assert_eq!(mask_sensitive_data("sqlite:equaled.db"), "sqli***d.db");
}
