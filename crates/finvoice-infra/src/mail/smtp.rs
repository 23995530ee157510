//! SMTP delivery over lettre's tokio transport.

use std::path::Path;

use finvoice_core::error::{FinvoiceError, FinvoiceResult};
use finvoice_core::external::{Email, Mailer};
use lettre::message::header::ContentType;
use lettre::message::{Attachment as MimeAttachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    /// 465 uses implicit TLS; any other port upgrades with STARTTLS.
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// `From` address, optionally with a display name.
    pub sender: String,
    pub use_tls: bool,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 587,
            username: None,
            password: None,
            sender: "Finvoice <no-reply@finvoice.local>".into(),
            use_tls: true,
        }
    }
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: SmtpConfig) -> FinvoiceResult<Self> {
        let from: Mailbox = config.sender.parse().map_err(|e| invalid_config(format!(
            "sender address {:?}: {e}",
            config.sender
        )))?;

        let mut builder = if config.use_tls {
            let tls = TlsParameters::new(config.host.clone())
                .map_err(|e| invalid_config(format!("TLS parameters: {e}")))?;
            if config.port == 465 {
                AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
                    .map_err(|e| invalid_config(format!("SMTP relay: {e}")))?
                    .port(config.port)
                    .tls(Tls::Wrapper(tls))
            } else {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                    .map_err(|e| invalid_config(format!("SMTP relay: {e}")))?
                    .port(config.port)
                    .tls(Tls::Required(tls))
            }
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host).port(config.port)
        };

        if let (Some(user), Some(pass)) = (config.username, config.password) {
            builder = builder.credentials(Credentials::new(user, pass));
        }

        debug!(host = %config.host, port = config.port, tls = config.use_tls, "SMTP transport configured");
        Ok(Self {
            transport: builder.build(),
            from,
        })
    }

    /// Assemble the MIME message. With an attachment the body and the
    /// file travel as `multipart/mixed`.
    async fn compose(&self, email: &Email) -> FinvoiceResult<Message> {
        let to: Mailbox = email.to.parse().map_err(|e| FinvoiceError::Validation {
            message: format!("recipient address {:?}: {e}", email.to),
        })?;
        let builder = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(email.subject.as_str());
        let body = SinglePart::builder()
            .header(ContentType::TEXT_PLAIN)
            .body(email.body.clone());

        let message = match &email.attachment {
            None => builder.singlepart(body),
            Some(attachment) => {
                let content = tokio::fs::read(&attachment.path).await.map_err(|e| {
                    FinvoiceError::Collaborator(format!(
                        "read attachment {}: {e}",
                        attachment.path.display()
                    ))
                })?;
                let content_type = ContentType::parse(mime_type(&attachment.file_name))
                    .map_err(|e| FinvoiceError::Internal(format!("content type: {e}")))?;
                builder.multipart(
                    MultiPart::mixed().singlepart(body).singlepart(
                        MimeAttachment::new(attachment.file_name.clone())
                            .body(content, content_type),
                    ),
                )
            }
        };
        message.map_err(|e| FinvoiceError::Validation {
            message: format!("build email: {e}"),
        })
    }
}

impl Mailer for SmtpMailer {
    async fn send(&self, email: Email) -> FinvoiceResult<()> {
        let message = self.compose(&email).await?;
        self.transport
            .send(message)
            .await
            .map_err(|e| FinvoiceError::Collaborator(format!("SMTP send to {}: {e}", email.to)))?;
        info!(to = %email.to, subject = %email.subject, "Email sent");
        Ok(())
    }
}

fn invalid_config(message: String) -> FinvoiceError {
    FinvoiceError::Validation { message }
}

fn mime_type(file_name: &str) -> &'static str {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("pdf") => "application/pdf",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        _ => "application/octet-stream",
    }
}
