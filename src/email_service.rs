use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::info;

use crate::config::EmailConfig;

/// Outbound transactional email.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_password_reset(&self, to_email: &str, to_name: &str, reset_url: &str) -> Result<()>;

    async fn send_welcome(&self, to_email: &str, to_name: &str) -> Result<()>;
}

/// Brevo SMTP relay over STARTTLS.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &EmailConfig) -> Result<Self> {
        let from_email = config
            .from_email
            .clone()
            .ok_or_else(|| anyhow!("BREVO_FROM_EMAIL is not configured"))?;
        let smtp_key = config
            .smtp_key
            .clone()
            .ok_or_else(|| anyhow!("BREVO_SMTP_KEY is not configured"))?;

        let from: Mailbox = format!("{} <{}>", config.from_name, from_email)
            .parse()
            .context("Invalid from email address")?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
            .context("Invalid SMTP relay host")?
            .port(config.smtp_port)
            .credentials(Credentials::new(from_email, smtp_key))
            .build();

        Ok(Self { transport, from })
    }

    async fn send_html(&self, to_email: &str, to_name: &str, subject: &str, html: String) -> Result<()> {
        let to: Mailbox = format!("{} <{}>", to_name, to_email)
            .parse()
            .or_else(|_| to_email.parse())
            .context("Invalid recipient email address")?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html)
            .context("Failed to build email message")?;

        self.transport
            .send(message)
            .await
            .with_context(|| format!("Failed to send '{}'", subject))?;

        info!(component = "email_service", to = %to_email, subject, "Email sent");
        Ok(())
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_password_reset(&self, to_email: &str, to_name: &str, reset_url: &str) -> Result<()> {
        self.send_html(
            to_email,
            to_name,
            "Reset your EqualEd password",
            password_reset_html(to_name, reset_url),
        )
        .await
    }

    async fn send_welcome(&self, to_email: &str, to_name: &str) -> Result<()> {
        self.send_html(
            to_email,
            to_name,
            "Welcome to EqualEd!",
            format!("<p>Hi {}, welcome to EqualEd! Start learning today.</p>", to_name),
        )
        .await
    }
}

/// Stand-in when SMTP credentials are absent; every send fails.
pub struct DisabledMailer;

#[async_trait]
impl Mailer for DisabledMailer {
    async fn send_password_reset(&self, _to_email: &str, _to_name: &str, _reset_url: &str) -> Result<()> {
        Err(anyhow!("Email is not configured"))
    }

    async fn send_welcome(&self, _to_email: &str, _to_name: &str) -> Result<()> {
        Err(anyhow!("Email is not configured"))
    }
}

pub fn password_reset_html(to_name: &str, reset_url: &str) -> String {
    let name = if to_name.trim().is_empty() { "there" } else { to_name };
    format!(
        r#"<!DOCTYPE html>
<html>
<body style="font-family: 'Segoe UI', Arial, sans-serif; background:#f4f6f9; margin:0; padding:40px 0;">
  <div style="max-width:520px; margin:0 auto; background:#fff; border-radius:16px; overflow:hidden;">
    <div style="background:#4f46e5; padding:32px; text-align:center;">
      <h1 style="color:#fff; margin:0;">EqualEd</h1>
      <p style="color:#e0e7ff; margin:6px 0 0;">Inclusive Learning for Everyone</p>
    </div>
    <div style="padding:36px 40px;">
      <h2 style="color:#1e1b4b;">Reset your password</h2>
      <p style="color:#4b5563; line-height:1.7;">
        Hi {name},<br/>
        We received a request to reset your password. Click the button below to create a new one.
        This link expires in <strong>1 hour</strong>.
      </p>
      <p style="text-align:center; margin:28px 0;">
        <a href="{url}" style="background:#4f46e5; color:#fff; text-decoration:none; font-weight:700; padding:14px 36px; border-radius:50px;">Reset Password</a>
      </p>
      <p style="color:#6b7280; font-size:13px;">
        If you didn't request this, you can safely ignore this email. Your password will not be changed.
      </p>
      <p style="color:#6b7280; font-size:12px;">Or copy this link into your browser:</p>
      <p style="color:#4f46e5; font-size:12px; word-break:break-all;">{url}</p>
    </div>
  </div>
</body>
</html>"#,
        name = name,
        url = reset_url
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_email_contains_link_and_name() {
        let html = password_reset_html("Meera", "http://localhost:5173/reset-password/abc123");
        assert!(html.contains("Hi Meera"));
        assert_eq!(html.matches("http://localhost:5173/reset-password/abc123").count(), 2);
        assert!(password_reset_html("  ", "x").contains("Hi there"));
    }

    #[test]
    fn test_smtp_mailer_requires_credentials() {
        let config = EmailConfig {
            from_email: None,
            from_name: "EqualEd".to_string(),
            smtp_key: Some("key".to_string()),
            smtp_host: "smtp-relay.brevo.com".to_string(),
            smtp_port: 587,
            frontend_url: "http://localhost:5173".to_string(),
        };
        assert!(SmtpMailer::new(&config).is_err());
    }

    #[tokio::test]
    async fn test_disabled_mailer_always_fails() {
        let mailer = DisabledMailer;
        assert!(mailer.send_welcome("a@b.c", "A").await.is_err());
        assert!(mailer.send_password_reset("a@b.c", "A", "url").await.is_err());
    }
}
