use anyhow::Context;
use axum::async_trait;
use lettre::{
    message::header::ContentType, transport::smtp::authentication::Credentials, Message,
    SmtpTransport, Transport,
};
use tracing::info;

use crate::config::SmtpConfig;

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html_body: String) -> anyhow::Result<()>;
}

/// SMTP delivery via lettre. The transport is synchronous, so sends run on
/// the blocking pool.
pub struct SmtpMailer {
    config: SmtpConfig,
}

impl SmtpMailer {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    fn build_transport(&self) -> anyhow::Result<SmtpTransport> {
        let transport = SmtpTransport::starttls_relay(&self.config.host)
            .context("create smtp transport")?
            .credentials(Credentials::new(
                self.config.username.clone(),
                self.config.password.clone(),
            ))
            .build();
        Ok(transport)
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, html_body: String) -> anyhow::Result<()> {
        let message = Message::builder()
            .from(self.config.from.parse().context("invalid from address")?)
            .to(to.parse().context("invalid to address")?)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html_body)
            .context("build message")?;

        let transport = self.build_transport()?;
        tokio::task::spawn_blocking(move || {
            transport.send(&message).context("smtp send")?;
            Ok::<_, anyhow::Error>(())
        })
        .await
        .context("join smtp task")??;

        info!(%to, "reset email sent");
        Ok(())
    }
}

/// Body of the password-reset email; the link stays valid for the reset
/// token's TTL.
pub fn reset_email_body(username: &str, reset_link: &str, ttl_minutes: i64) -> String {
    format!(
        "<p>Hi <b>{username}</b>,</p>\
         <p>We received a request to change your account password.</p>\
         <p><a href=\"{reset_link}\">Click here to reset your password</a> \
         (valid for {ttl_minutes} minutes)</p>"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_body_embeds_link_and_ttl() {
        let body = reset_email_body("alice", "http://localhost:3000/auth/reset-password/1?token=t", 10);
        assert!(body.contains("alice"));
        assert!(body.contains("http://localhost:3000/auth/reset-password/1?token=t"));
        assert!(body.contains("10 minutes"));
    }
}
