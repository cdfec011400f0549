use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::message::{header, Mailbox, Message};
use lettre::transport::smtp::{authentication::Credentials, AsyncSmtpTransport};
use lettre::{AsyncTransport, Tokio1Executor};

use super::{EmailMessage, EmailSender};
use crate::config::SmtpConfig;

/// SMTP adapter for the host email channel.
pub struct SmtpEmailSender {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    reply_to: Option<Mailbox>,
}

impl SmtpEmailSender {
    pub fn from_config(cfg: &SmtpConfig, timeout_secs: u64) -> Result<Self> {
        let creds = Credentials::new(cfg.user.clone(), cfg.pass.clone());
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(&cfg.host)
            .context("invalid SMTP_HOST")?
            .credentials(creds)
            .timeout(Some(Duration::from_secs(timeout_secs)))
            .build();

        let from = cfg.from.parse().context("invalid NOTIFY_EMAIL_FROM")?;
        let reply_to = match &cfg.reply_to {
            Some(addr) => Some(addr.parse().context("invalid NOTIFY_EMAIL_REPLY_TO")?),
            None => None,
        };

        Ok(Self {
            mailer,
            from,
            reply_to,
        })
    }
}

#[async_trait]
impl EmailSender for SmtpEmailSender {
    async fn send(&self, msg: &EmailMessage) -> Result<String> {
        let to: Mailbox = msg.to.parse().context("invalid recipient address")?;

        let mut builder = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(msg.subject.clone())
            .header(header::ContentType::TEXT_HTML);
        if let Some(reply_to) = &self.reply_to {
            builder = builder.reply_to(reply_to.clone());
        }
        let message = builder.body(msg.html.clone()).context("build email")?;

        let response = self.mailer.send(message).await.context("send email")?;
        Ok(response.message().collect::<Vec<_>>().join(" "))
    }
}
