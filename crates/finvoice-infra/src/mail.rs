//! Outbound email: SMTP delivery, plus a log-only mailer for local
//! development where no relay is configured.

mod smtp;

use finvoice_core::error::FinvoiceResult;
use finvoice_core::external::{Email, Mailer};
use tracing::info;

pub use smtp::{SmtpConfig, SmtpMailer};

/// Writes each message, body included, to the log and sends nothing.
#[derive(Debug, Clone, Default)]
pub struct TracingMailer;

impl Mailer for TracingMailer {
    async fn send(&self, email: Email) -> FinvoiceResult<()> {
        info!(
            to = %email.to,
            subject = %email.subject,
            body = %email.body,
            attachment = email.attachment.as_ref().map(|a| a.file_name.as_str()),
            "DEV MODE: email not sent"
        );
        Ok(())
    }
}

/// Mailer chosen at startup.
pub enum OutboundMailer {
    Smtp(SmtpMailer),
    Log(TracingMailer),
}

impl OutboundMailer {
    /// SMTP when a relay is configured, the log mailer otherwise.
    pub fn from_config(smtp: Option<SmtpConfig>) -> FinvoiceResult<Self> {
        match smtp {
            Some(config) => Ok(Self::Smtp(SmtpMailer::new(config)?)),
            None => Ok(Self::Log(TracingMailer)),
        }
    }

    pub fn delivers(&self) -> bool {
        matches!(self, Self::Smtp(_))
    }
}

impl Mailer for OutboundMailer {
    async fn send(&self, email: Email) -> FinvoiceResult<()> {
        match self {
            Self::Smtp(mailer) => mailer.send(email).await,
            Self::Log(mailer) => mailer.send(email).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn log_mailer_accepts_everything() {
        let mailer = OutboundMailer::from_config(None).unwrap();
        assert!(!mailer.delivers());
        mailer
            .send(Email::new("a@x.com", "Your login code", "Your code is 123456"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn relay_config_selects_smtp() {
        let mailer = OutboundMailer::from_config(Some(SmtpConfig {
            host: "localhost".into(),
            port: 2525,
            use_tls: false,
            ..SmtpConfig::default()
        }))
        .unwrap();
        assert!(mailer.delivers());
    }
}
