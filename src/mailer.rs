use std::path::{Path, PathBuf};

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use log::debug;
use thiserror::Error;
use uuid::Uuid;

use crate::config::{SmtpSecurity, SmtpSettings};
use crate::inliner::InlineAttachment;

#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("Invalid recipient address {address}: {reason}")]
    Address { address: String, reason: String },

    #[error("Failed to read inline image {path}: {source}")]
    Attachment {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to build message: {0}")]
    Build(String),

    #[error("SMTP error: {0}")]
    Smtp(String),
}

/// A single message to one recipient. Everything but the address is shared
/// by all recipients of a template.
#[derive(Debug, Clone, Copy)]
pub struct OutgoingEmail<'a> {
    pub to: &'a str,
    pub subject: &'a str,
    pub html: &'a str,
    pub attachments: &'a [InlineAttachment],
}

#[async_trait]
pub trait Mailer: Send + Sync {
    /// Deliver `email` and return its `Message-ID`.
    async fn send(&self, email: &OutgoingEmail<'_>) -> Result<String, DeliveryError>;
}

/// Mailer over one pooled SMTP transport, built once and shared by every send.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    sender: Mailbox,
}

impl SmtpMailer {
    pub fn new(smtp: &SmtpSettings, sender: Mailbox) -> Result<Self, DeliveryError> {
        let creds = Credentials::new(smtp.username.clone(), smtp.password.clone());

        let transport = match smtp.security {
            SmtpSecurity::SSL => {
                let tls_params = TlsParameters::new(smtp.host.clone())
                    .map_err(|e| DeliveryError::Smtp(e.to_string()))?;

                AsyncSmtpTransport::<Tokio1Executor>::relay(&smtp.host)
                    .map_err(|e| DeliveryError::Smtp(e.to_string()))?
                    .credentials(creds)
                    .port(smtp.port)
                    .tls(Tls::Wrapper(tls_params))
                    .build()
            }
            SmtpSecurity::StartTLS => {
                let tls_params = TlsParameters::new(smtp.host.clone())
                    .map_err(|e| DeliveryError::Smtp(e.to_string()))?;

                AsyncSmtpTransport::<Tokio1Executor>::relay(&smtp.host)
                    .map_err(|e| DeliveryError::Smtp(e.to_string()))?
                    .credentials(creds)
                    .port(smtp.port)
                    .tls(Tls::Required(tls_params))
                    .build()
            }
            SmtpSecurity::None => {
                AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&smtp.host)
                    .credentials(creds)
                    .port(smtp.port)
                    .build()
            }
        };

        Ok(Self { transport, sender })
    }

    /// Build the MIME message: a `multipart/related` body with the HTML first
    /// and one inline part per attachment. Image bytes are read here, so a
    /// missing file fails only this message.
    pub async fn build_message(
        &self,
        email: &OutgoingEmail<'_>,
    ) -> Result<(Message, String), DeliveryError> {
        let to: Mailbox = email.to.parse().map_err(|e: lettre::address::AddressError| {
            DeliveryError::Address {
                address: email.to.to_string(),
                reason: e.to_string(),
            }
        })?;

        let mut related = MultiPart::related().singlepart(SinglePart::html(email.html.to_string()));

        for attachment in email.attachments {
            let body = tokio::fs::read(&attachment.path)
                .await
                .map_err(|source| DeliveryError::Attachment {
                    path: attachment.path.clone(),
                    source,
                })?;
            let mime = mime_type(&attachment.path);
            let content_type = ContentType::parse(mime)
                .map_err(|_| DeliveryError::Build(format!("Invalid content type {}", mime)))?;

            related = related.singlepart(
                Attachment::new_inline(attachment.content_id.clone()).body(body, content_type),
            );
        }

        let message_id = format!("<{}@{}>", Uuid::new_v4(), self.sender.email.domain());

        let message = Message::builder()
            .from(self.sender.clone())
            .to(to)
            .subject(email.subject)
            .message_id(Some(message_id.clone()))
            .multipart(related)
            .map_err(|e| DeliveryError::Build(e.to_string()))?;

        Ok((message, message_id))
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: &OutgoingEmail<'_>) -> Result<String, DeliveryError> {
        let (message, message_id) = self.build_message(email).await?;

        let response = self
            .transport
            .send(message)
            .await
            .map_err(|e| DeliveryError::Smtp(e.to_string()))?;
        debug!("Relay answered {} for {}", response.code(), email.to);

        Ok(message_id)
    }
}

fn mime_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());

    match ext.as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        _ => "application/octet-stream",
    }
}
