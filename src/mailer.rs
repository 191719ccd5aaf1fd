//! Outbound mail over SMTP.
//!
//! Delivery is always invoked from a supervised background task, never on a
//! request's critical path. Transient SMTP failures are retried a few times
//! with a short pause; a final failure is the spawning task's to log.

use std::time::Duration;

use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::warn;

use crate::error::{AppError, AppResult};

/// Per-dial SMTP timeout.
const SMTP_TIMEOUT: Duration = Duration::from_secs(5);

/// Delivery attempts before giving up.
const SEND_ATTEMPTS: u32 = 3;

/// Pause between delivery attempts.
const RETRY_DELAY: Duration = Duration::from_millis(500);

const WELCOME_TEMPLATE: &str = include_str!("templates/user_welcome.txt");
const WELCOME_SUBJECT: &str = "Welcome to Marquee!";

/// SMTP mail dispatcher.
#[derive(Clone)]
pub struct Mailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    sender: Mailbox,
}

impl Mailer {
    pub fn new(
        host: &str,
        port: u16,
        username: &str,
        password: &str,
        sender: &str,
    ) -> AppResult<Self> {
        let sender: Mailbox = sender
            .parse()
            .map_err(|e| AppError::Config(format!("invalid SMTP sender: {e}")))?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
            .port(port)
            .credentials(Credentials::new(username.to_string(), password.to_string()))
            .timeout(Some(SMTP_TIMEOUT))
            .build();

        Ok(Self { transport, sender })
    }

    /// Send the welcome/activation mail for a freshly issued token.
    pub async fn send_welcome(
        &self,
        recipient: &str,
        user_id: i64,
        activation_token: &str,
    ) -> AppResult<()> {
        let body = render_welcome(user_id, activation_token);
        self.send(recipient, WELCOME_SUBJECT, body).await
    }

    async fn send(&self, recipient: &str, subject: &str, body: String) -> AppResult<()> {
        let recipient: Mailbox = recipient
            .parse()
            .map_err(|e| AppError::Mail(format!("invalid recipient: {e}")))?;

        let message = Message::builder()
            .from(self.sender.clone())
            .to(recipient)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body)
            .map_err(|e| AppError::Mail(format!("failed to build message: {e}")))?;

        let mut last_error = String::new();
        for attempt in 1..=SEND_ATTEMPTS {
            match self.transport.send(message.clone()).await {
                Ok(_) => return Ok(()),
                Err(e) => {
                    warn!(attempt, error = %e, "mail delivery attempt failed");
                    last_error = e.to_string();
                }
            }
            if attempt < SEND_ATTEMPTS {
                tokio::time::sleep(RETRY_DELAY).await;
            }
        }

        Err(AppError::Mail(last_error))
    }
}

fn render_welcome(user_id: i64, activation_token: &str) -> String {
    WELCOME_TEMPLATE
        .replace("{{user_id}}", &user_id.to_string())
        .replace("{{activation_token}}", activation_token)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_render_welcome_substitutes_placeholders() {
        let body = render_welcome(42, "ABCDEFGHIJKLMNOPQRSTUVWXYZ");

        assert!(body.contains("your user ID number is 42"));
        assert!(body.contains(r#"{"token": "ABCDEFGHIJKLMNOPQRSTUVWXYZ"}"#));
        assert!(!body.contains("{{user_id}}"));
        assert!(!body.contains("{{activation_token}}"));
    }

    #[test]
    fn test_new_rejects_invalid_sender() {
        let result = Mailer::new("smtp.example.com", 2525, "user", "pass", "not a mailbox");
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[tokio::test]
    async fn test_new_accepts_named_sender() {
        let result = Mailer::new(
            "smtp.example.com",
            2525,
            "user",
            "pass",
            "Marquee <no-reply@marquee.example>",
        );
        assert!(result.is_ok());
    }
}
