use std::sync::Arc;

use async_trait::async_trait;
use lettre::{
    message::header::ContentType, transport::smtp::authentication::Credentials, AsyncSmtpTransport,
    AsyncTransport, Message, Tokio1Executor,
};

use crate::util::{HttpClient, HttpError};

#[derive(thiserror::Error, Debug)]
pub enum NotifyError {
    #[error("invalid address: {0}")]
    Address(#[from] lettre::address::AddressError),
    #[error("could not build message: {0}")]
    Message(#[from] lettre::error::Error),
    #[error("smtp error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
    #[error("webhook error: {0}")]
    Webhook(#[from] HttpError),
    #[error("mail is not configured")]
    NotConfigured,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, subject: &str, html: &str) -> Result<(), NotifyError>;
}

#[async_trait]
pub trait Webhook: Send + Sync {
    async fn push(&self, text: &str) -> Result<(), NotifyError>;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
    to: String,
}

impl SmtpMailer {
    /// STARTTLS relay authenticated as the sender.
    pub fn new(host: &str, port: u16, from: &str, password: &str, to: &str) -> Result<Self, NotifyError> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)?
            .port(port)
            .credentials(Credentials::new(from.to_string(), password.to_string()))
            .build();

        Ok(Self {
            transport,
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, subject: &str, html: &str) -> Result<(), NotifyError> {
        let message = Message::builder()
            .from(self.from.parse()?)
            .to(self.to.parse()?)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html.to_string())?;

        self.transport.send(message).await?;
        Ok(())
    }
}

/// Posts the message as the plain-text request body.
pub struct HttpWebhook {
    pub client: Arc<HttpClient>,
    pub url: String,
}

#[async_trait]
impl Webhook for HttpWebhook {
    async fn push(&self, text: &str) -> Result<(), NotifyError> {
        self.client.post_text(&self.url, text.to_string()).await?;
        Ok(())
    }
}

/// Stand-in used when mail is not configured. Logs the digest and reports
/// that nothing was delivered.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, subject: &str, html: &str) -> Result<(), NotifyError> {
        info!("Digest {:?} ({} bytes) not mailed", subject, html.len());
        Err(NotifyError::NotConfigured)
    }
}
