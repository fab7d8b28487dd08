//! Outbound email
//!
//! Handlers hand an [`OutboundEmail`] to a [`Mailer`]. Production uses the
//! lettre SMTP transport; without an SMTP host the message is only logged.

use crate::config::MailConfig;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use lettre::{
    message::{
        header::{ContentType, HeaderName, HeaderValue},
        Mailbox,
    },
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::sync::Arc;

/// Category header understood by the SMTP relay
const SMTP_API_HEADER: &str = "X-SMTPAPI";

/// Plain-text message ready to be sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEmail {
    pub subject: String,
    pub body: String,
    pub to: Vec<String>,
    /// Relay category, sent as `X-SMTPAPI: {"category": "..."}`
    pub smtp_category: Option<String>,
}

impl OutboundEmail {
    /// Value of the `X-SMTPAPI` header, if the message has a category
    pub fn smtp_api_header(&self) -> Option<String> {
        self.smtp_category.as_ref().map(|category| {
            let quoted = serde_json::Value::String(category.clone()).to_string();
            format!("{{\"category\": {}}}", quoted)
        })
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &OutboundEmail) -> Result<()>;
}

/// Mailer speaking SMTP through lettre
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &MailConfig, host: &str) -> Result<Self> {
        let from: Mailbox = config
            .from
            .parse()
            .map_err(|e| anyhow!("Invalid from address: {}", e))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(host)
            .map_err(|e| anyhow!("Failed to create SMTP transport: {}", e))?
            .port(config.smtp_port);
        if let (Some(username), Some(password)) = (&config.smtp_username, &config.smtp_password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }

    fn build_message(&self, email: &OutboundEmail) -> Result<Message> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(email.subject.clone())
            .header(ContentType::TEXT_PLAIN);
        for to in &email.to {
            let mailbox: Mailbox = to
                .parse()
                .map_err(|e| anyhow!("Invalid to address {}: {}", to, e))?;
            builder = builder.to(mailbox);
        }
        if let Some(value) = email.smtp_api_header() {
            builder = builder.raw_header(HeaderValue::new(
                HeaderName::new_from_ascii_str(SMTP_API_HEADER),
                value,
            ));
        }
        builder
            .body(email.body.clone())
            .map_err(|e| anyhow!("Failed to build email: {}", e))
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: &OutboundEmail) -> Result<()> {
        let message = self.build_message(email)?;
        self.transport
            .send(message)
            .await
            .map_err(|e| anyhow!("Failed to send email: {}", e))?;
        Ok(())
    }
}

/// Mailer used when no SMTP host is configured
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &OutboundEmail) -> Result<()> {
        tracing::info!(
            to = ?email.to,
            subject = %email.subject,
            category = ?email.smtp_category,
            "SMTP not configured, email not sent"
        );
        Ok(())
    }
}

/// Pick the mailer for `config`
pub fn create_mailer(config: &MailConfig) -> Result<Arc<dyn Mailer>> {
    match config.smtp_host.as_deref().filter(|h| !h.trim().is_empty()) {
        Some(host) => {
            tracing::info!("Sending email through SMTP host {}", host);
            Ok(Arc::new(SmtpMailer::new(config, host)?))
        }
        None => Ok(Arc::new(LogMailer)),
    }
}

/// Send and swallow failures; contact and alert mail never fails a request
pub async fn send_best_effort(mailer: &dyn Mailer, email: &OutboundEmail) {
    if email.to.is_empty() {
        tracing::warn!(subject = %email.subject, "Email has no recipients, skipped");
        return;
    }
    if let Err(e) = mailer.send(email).await {
        tracing::warn!(subject = %email.subject, "Failed to send email: {:#}", e);
    }
}
