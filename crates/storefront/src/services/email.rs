//! Email service for verification code delivery.
//!
//! Uses SMTP via lettre for delivery with Askama text and HTML templates.

use askama::Template;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{MultiPart, SinglePart, header::ContentType},
    transport::smtp::{Error as SmtpError, authentication::Credentials},
};
use secrecy::ExposeSecret;
use thiserror::Error;

use orchard_core::{Email, VerificationCode};

use crate::config::{EmailConfig, Environment};
use crate::services::auth::email_hash;

/// HTML template for verification code email.
#[derive(Template)]
#[template(path = "email/verification_code.html")]
struct VerificationCodeEmailHtml<'a> {
    code: &'a str,
    minutes: u64,
}

/// Plain text template for verification code email.
#[derive(Template)]
#[template(path = "email/verification_code.txt")]
struct VerificationCodeEmailText<'a> {
    code: &'a str,
    minutes: u64,
}

/// Errors that can occur when sending email.
#[derive(Debug, Error)]
pub enum EmailError {
    /// SMTP transport error.
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    /// Failed to build email message.
    #[error("Failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Template rendering error.
    #[error("Template error: {0}")]
    Template(#[from] askama::Error),
}

/// Email service for sending transactional emails.
#[derive(Clone)]
pub struct EmailService {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
}

impl EmailService {
    /// Create a new email service from configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the SMTP relay cannot be configured.
    pub fn new(config: &EmailConfig) -> Result<Self, SmtpError> {
        let credentials = Credentials::new(
            config.smtp_username.clone(),
            config.smtp_password.expose_secret().to_string(),
        );

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port)
            .credentials(credentials)
            .build();

        Ok(Self {
            mailer,
            from_address: config.from_address.clone(),
        })
    }

    /// Send a sign-in code.
    ///
    /// # Errors
    ///
    /// Returns error if email fails to send or template fails to render.
    pub async fn send_verification_code(
        &self,
        to: &Email,
        code: &VerificationCode,
        minutes: u64,
    ) -> Result<(), EmailError> {
        let html = VerificationCodeEmailHtml {
            code: code.as_str(),
            minutes,
        }
        .render()?;
        let text = VerificationCodeEmailText {
            code: code.as_str(),
            minutes,
        }
        .render()?;

        self.send_multipart_email(to, "Your Orchard sign-in code", &text, &html)
            .await
    }

    /// Send a multipart email with both plain text and HTML versions.
    async fn send_multipart_email(
        &self,
        to: &Email,
        subject: &str,
        text_body: &str,
        html_body: &str,
    ) -> Result<(), EmailError> {
        let email = Message::builder()
            .from(
                self.from_address
                    .parse()
                    .map_err(|_| EmailError::InvalidAddress(self.from_address.clone()))?,
            )
            .to(to
                .as_str()
                .parse()
                .map_err(|_| EmailError::InvalidAddress(email_hash(to)))?)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text_body.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body.to_string()),
                    ),
            )?;

        self.mailer.send(email).await?;

        tracing::info!(email_hash = %email_hash(to), subject = %subject, "Email sent successfully");
        Ok(())
    }
}

/// Deliver a freshly issued code.
///
/// Delivery failures are logged and swallowed: issuance has already happened
/// and the shopper can request another code. Without SMTP in development the
/// code is logged at WARN so sign-in can be tested locally.
pub async fn deliver_code(
    service: Option<&EmailService>,
    environment: Environment,
    to: &Email,
    code: &VerificationCode,
    minutes: u64,
) {
    match service {
        Some(service) => {
            if let Err(e) = service.send_verification_code(to, code, minutes).await {
                tracing::error!(
                    error = %e,
                    email_hash = %email_hash(to),
                    "Failed to deliver verification code"
                );
            }
        }
        None if !environment.is_production() => {
            tracing::warn!(
                email = %to.as_str(),
                code = %code.as_str(),
                "SMTP not configured; verification code for local testing"
            );
        }
        None => {
            tracing::error!(
                email_hash = %email_hash(to),
                "No email service configured; verification code not delivered"
            );
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_templates_render_code_and_lifetime() {
        let text = VerificationCodeEmailText {
            code: "042917",
            minutes: 10,
        }
        .render()
        .unwrap();
        assert!(text.contains("042917"));
        assert!(text.contains("10 minutes"));

        let html = VerificationCodeEmailHtml {
            code: "042917",
            minutes: 10,
        }
        .render()
        .unwrap();
        assert!(html.contains("042917"));
    }
}
